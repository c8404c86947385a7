use eframe::egui;

pub enum ProfileSetupAction {
    Stay,
    Save,
}

/// First-run dialog asking for a display name.
pub fn ui(ctx: &egui::Context, name: &mut String, saving: bool) -> ProfileSetupAction {
    let mut action = ProfileSetupAction::Stay;
    egui::Window::new("Welcome!")
        .collapsible(false)
        .resizable(false)
        .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
        .show(ctx, |ui| {
            ui.label("Please tell us your name to get started.");
            ui.add_space(8.0);
            let response = ui.add(
                egui::TextEdit::singleline(name)
                    .hint_text("Your name")
                    .desired_width(280.0),
            );
            let can_save = !saving && !name.trim().is_empty();
            let submitted =
                response.lost_focus() && ui.input(|input| input.key_pressed(egui::Key::Enter));

            ui.add_space(8.0);
            ui.horizontal(|ui| {
                let label = if saving { "Saving..." } else { "Save" };
                let clicked = ui
                    .add_enabled(can_save, egui::Button::new(label))
                    .clicked();
                if saving {
                    ui.spinner();
                }
                if clicked || (submitted && can_save) {
                    action = ProfileSetupAction::Save;
                }
            });
        });
    action
}
