use eframe::egui;

pub enum SignInAction {
    Stay,
    SignIn,
}

pub fn ui(ui: &mut egui::Ui, last_error: Option<&str>) -> SignInAction {
    let mut action = SignInAction::Stay;
    ui.vertical_centered(|ui| {
        ui.add_space(80.0);
        ui.heading("Welcome to Riddler");
        ui.add_space(8.0);
        ui.label("Upload video, image and audio clues, then let the solver answer your riddle.");
        ui.label("Sign in to get started.");
        ui.add_space(16.0);
        if ui.button("Sign in").clicked() {
            action = SignInAction::SignIn;
        }
        if let Some(err) = last_error {
            ui.add_space(8.0);
            ui.colored_label(egui::Color32::LIGHT_RED, format!("Sign in failed: {err}"));
        }
    });
    action
}
