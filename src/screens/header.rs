use eframe::egui;

use crate::models::{Identity, UserRole};

pub enum HeaderAction {
    Stay,
    SignIn,
    SignOut,
    Retry,
}

pub fn ui(
    ui: &mut egui::Ui,
    identity: Option<&Identity>,
    profile_name: Option<&str>,
    role: Option<UserRole>,
    account_failed: bool,
) -> HeaderAction {
    let mut action = HeaderAction::Stay;
    ui.horizontal(|ui| {
        ui.heading("Riddler");
        ui.label(egui::RichText::new("AI riddle solver").weak());

        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            match identity {
                Some(identity) => {
                    if ui.button("Sign out").clicked() {
                        action = HeaderAction::SignOut;
                    }
                    if let Some(role) = role {
                        ui.label(egui::RichText::new(role.label()).small().weak());
                    }
                    ui.monospace(identity.principal.abbreviated())
                        .on_hover_text(identity.principal.as_str());
                    if let Some(name) = profile_name {
                        ui.label(egui::RichText::new(name).strong());
                    }
                    if account_failed {
                        if ui.button("Retry").clicked() {
                            action = HeaderAction::Retry;
                        }
                        ui.colored_label(egui::Color32::LIGHT_RED, "Account unavailable");
                    }
                }
                None => {
                    if ui.button("Sign in").clicked() {
                        action = HeaderAction::SignIn;
                    }
                }
            }
        });
    });
    action
}
