pub mod api;
pub mod app;
pub mod config;
pub mod gui;
pub mod pcm;
