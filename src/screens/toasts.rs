use eframe::egui;

use crate::services::notifications::{ToastLevel, Toasts};

pub enum ToastAction {
    Stay,
    SignIn,
    Dismiss(u64),
}

pub fn ui(ctx: &egui::Context, toasts: &Toasts) -> ToastAction {
    let mut action = ToastAction::Stay;
    if toasts.is_empty() {
        return action;
    }

    egui::Area::new(egui::Id::new("riddler_toasts"))
        .anchor(egui::Align2::RIGHT_BOTTOM, [-16.0, -16.0])
        .order(egui::Order::Foreground)
        .show(ctx, |ui| {
            for toast in toasts.visible() {
                let (fill, stroke) = match toast.notice.level {
                    ToastLevel::Success => (
                        egui::Color32::from_rgb(22, 58, 30),
                        egui::Color32::from_rgb(70, 180, 90),
                    ),
                    ToastLevel::Error => (
                        egui::Color32::from_rgb(58, 22, 22),
                        egui::Color32::from_rgb(180, 60, 60),
                    ),
                };
                egui::Frame::group(ui.style())
                    .fill(fill)
                    .stroke(egui::Stroke::new(1.0, stroke))
                    .show(ui, |ui| {
                        ui.set_max_width(360.0);
                        ui.horizontal(|ui| {
                            ui.label(&toast.notice.message);
                            if toast.notice.sign_in_prompt && ui.button("Sign in").clicked() {
                                action = ToastAction::SignIn;
                            }
                            if ui.small_button("x").clicked() {
                                action = ToastAction::Dismiss(toast.id);
                            }
                        });
                    });
                ui.add_space(4.0);
            }
        });
    action
}
