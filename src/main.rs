use pyramid_keepers::gui::KeepersApp;

fn main() -> eframe::Result<()> {
    let options = eframe::NativeOptions {
        viewport: eframe::egui::ViewportBuilder::default()
            .with_inner_size([1100.0, 720.0])
            .with_min_inner_size([800.0, 560.0])
            .with_title("The Pyramid Keepers"),
        ..Default::default()
    };
    eframe::run_native(
        "The Pyramid Keepers",
        options,
        Box::new(|cc| Ok(Box::new(KeepersApp::new(cc)))),
    )
}
