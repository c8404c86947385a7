use eframe::egui;

pub fn ui(ui: &mut egui::Ui, riddle_text: &mut String) {
    egui::Frame::group(ui.style()).show(ui, |ui| {
        ui.horizontal(|ui| {
            ui.label(egui::RichText::new("Riddle Text").strong());
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if ui
                    .add_enabled(!riddle_text.is_empty(), egui::Button::new("Clear"))
                    .clicked()
                {
                    riddle_text.clear();
                }
            });
        });
        ui.add_space(4.0);
        ui.add(
            egui::TextEdit::multiline(riddle_text)
                .hint_text("Enter your riddle here...")
                .desired_rows(4)
                .desired_width(f32::INFINITY),
        );
    });
}
