//! Live Audio Duplex Pipeline
//!
//! One bidirectional voice call at a time: microphone blocks stream up over
//! the session WebSocket while inbound audio chunks are scheduled for
//! gapless playback, with server-triggered barge-in discarding anything
//! pending. The whole pipeline lives on one worker thread that owns the
//! socket, the capture stream and the playback stream; the UI only flips an
//! atomic stop flag and reads the state.

pub mod capture;
pub mod playback;
pub mod websocket;

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tungstenite::Message;

use playback::LivePlayer;
use websocket::{
    connect_live_websocket, is_setup_complete, parse_server_events, send_live_setup,
    send_realtime_audio, ServerEvent,
};

/// Fixed-size microphone block sent per realtime input chunk.
const SEND_BLOCK_SAMPLES: usize = 4096;

/// How long to wait for the setup acknowledgment before giving up.
const SETUP_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LiveState {
    Disconnected,
    Connecting,
    Active,
}

impl LiveState {
    fn to_u8(self) -> u8 {
        match self {
            LiveState::Disconnected => 0,
            LiveState::Connecting => 1,
            LiveState::Active => 2,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            1 => LiveState::Connecting,
            2 => LiveState::Active,
            _ => LiveState::Disconnected,
        }
    }
}

#[derive(Clone)]
pub struct LiveConfig {
    pub api_key: String,
    pub model: String,
    pub voice: String,
}

/// Handle to the active voice call. Dropping it hangs up.
pub struct LiveSession {
    state: Arc<AtomicU8>,
    stop: Arc<AtomicBool>,
    worker: Option<std::thread::JoinHandle<()>>,
}

impl LiveSession {
    /// Begin connecting. Returns immediately; the session reports
    /// `Connecting` until the server acknowledges setup and the microphone
    /// is running, then `Active`.
    pub fn connect(config: LiveConfig) -> Self {
        let state = Arc::new(AtomicU8::new(LiveState::Connecting.to_u8()));
        let stop = Arc::new(AtomicBool::new(false));

        let worker_state = state.clone();
        let worker_stop = stop.clone();
        let worker = std::thread::spawn(move || {
            run_live_worker(config, worker_state, worker_stop);
        });

        Self {
            state,
            stop,
            worker: Some(worker),
        }
    }

    pub fn state(&self) -> LiveState {
        LiveState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_disconnected(&self) -> bool {
        self.state() == LiveState::Disconnected
    }

    /// Hang up. Idempotent: calling it when already disconnected is a no-op.
    pub fn disconnect(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn run_live_worker(config: LiveConfig, state: Arc<AtomicU8>, stop: Arc<AtomicBool>) {
    let set_state = |s: LiveState| state.store(s.to_u8(), Ordering::SeqCst);

    let mut socket = match connect_live_websocket(&config.api_key) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("[Live] connection failed: {}", e);
            set_state(LiveState::Disconnected);
            return;
        }
    };

    if let Err(e) = send_live_setup(&mut socket, &config.model, &config.voice) {
        eprintln!("[Live] setup failed: {}", e);
        let _ = socket.close(None);
        set_state(LiveState::Disconnected);
        return;
    }

    // Wait for the open acknowledgment before touching the microphone.
    let setup_start = Instant::now();
    let mut setup_complete = false;
    while !setup_complete {
        if stop.load(Ordering::SeqCst) || setup_start.elapsed() > SETUP_TIMEOUT {
            break;
        }
        match socket.read() {
            Ok(Message::Text(msg)) => {
                if is_setup_complete(msg.as_str()) {
                    setup_complete = true;
                }
            }
            Ok(Message::Binary(data)) => {
                if let Ok(text) = String::from_utf8(data.to_vec()) {
                    if is_setup_complete(&text) {
                        setup_complete = true;
                    }
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(tungstenite::Error::Io(ref e))
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                eprintln!("[Live] setup error: {}", e);
                break;
            }
        }
    }

    if !setup_complete {
        let _ = socket.close(None);
        set_state(LiveState::Disconnected);
        return;
    }

    // The pipeline owns the capture device and both audio paths for its
    // lifetime.
    let capture_buffer: Arc<Mutex<Vec<i16>>> = Arc::new(Mutex::new(Vec::new()));
    let _mic = match capture::start_mic_capture(capture_buffer.clone(), stop.clone()) {
        Ok(stream) => stream,
        Err(e) => {
            eprintln!("[Live] microphone unavailable: {}", e);
            let _ = socket.close(None);
            set_state(LiveState::Disconnected);
            return;
        }
    };
    let mut player = LivePlayer::new();

    // Short read timeout so the loop alternates between draining the
    // microphone and polling the socket.
    {
        let tcp_stream = socket.get_mut().get_mut();
        let _ = tcp_stream.set_read_timeout(Some(Duration::from_millis(20)));
    }

    set_state(LiveState::Active);
    println!("[Live] session active");

    'session: loop {
        if stop.load(Ordering::SeqCst) {
            break;
        }

        // Fire-and-forget every full microphone block that has accumulated.
        loop {
            let block: Option<Vec<i16>> = {
                let mut buf = capture_buffer.lock().unwrap();
                if buf.len() >= SEND_BLOCK_SAMPLES {
                    Some(buf.drain(..SEND_BLOCK_SAMPLES).collect())
                } else {
                    None
                }
            };
            match block {
                Some(samples) => {
                    if let Err(e) = send_realtime_audio(&mut socket, &samples) {
                        eprintln!("[Live] send failed: {}", e);
                        break 'session;
                    }
                }
                None => break,
            }
        }

        match socket.read() {
            Ok(Message::Text(msg)) => {
                if !handle_server_message(msg.as_str(), &mut player) {
                    break;
                }
            }
            Ok(Message::Binary(data)) => {
                if let Ok(text) = String::from_utf8(data.to_vec()) {
                    if !handle_server_message(&text, &mut player) {
                        break;
                    }
                }
            }
            Ok(Message::Close(_)) => {
                println!("[Live] server closed the session");
                break;
            }
            Ok(_) => {}
            Err(tungstenite::Error::Io(ref e))
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => {
                eprintln!("[Live] read error: {}", e);
                break;
            }
        }
    }

    // Tear-down order matters: stop feeding the buffer before the socket
    // goes away.
    stop.store(true, Ordering::SeqCst);
    let _ = socket.close(None);
    set_state(LiveState::Disconnected);
    println!("[Live] session closed");
}

/// Apply one server message to the playback pipeline. Returns false when
/// the session must end.
fn handle_server_message(msg: &str, player: &mut LivePlayer) -> bool {
    for event in parse_server_events(msg) {
        match event {
            ServerEvent::Audio(bytes) => player.enqueue(&bytes),
            ServerEvent::Interrupted => player.interrupt(),
            ServerEvent::TurnComplete => {}
            ServerEvent::Error(e) => {
                eprintln!("[Live] server error: {}", e);
                return false;
            }
        }
    }
    true
}
