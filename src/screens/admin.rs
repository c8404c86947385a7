use eframe::egui;

use crate::models::{Principal, UserRole};
use crate::services::query_cache::{QueryState, QueryValue};
use crate::services::remote_data::RemoteData;

pub enum AdminAction {
    Stay,
    Assign,
    LookUp,
}

pub struct AdminForm {
    pub principal: String,
    pub role: UserRole,
    /// Principal whose profile is shown under the form.
    pub looked_up: Option<Principal>,
}

impl Default for AdminForm {
    fn default() -> Self {
        Self {
            principal: String::new(),
            role: UserRole::User,
            looked_up: None,
        }
    }
}

pub fn ui(ui: &mut egui::Ui, form: &mut AdminForm, remote: &mut RemoteData) -> AdminAction {
    let pending = remote.role_assign_pending();
    let mut action = AdminAction::Stay;
    egui::Frame::group(ui.style())
        .stroke(egui::Stroke::new(1.0, egui::Color32::from_rgb(190, 160, 70)))
        .show(ui, |ui| {
            ui.set_min_width(ui.available_width());
            ui.label(egui::RichText::new("Admin: assign roles").strong());
            ui.add_space(4.0);
            ui.horizontal(|ui| {
                ui.label("Principal");
                ui.add(
                    egui::TextEdit::singleline(&mut form.principal)
                        .hint_text("xxxxx-xxxxx-...")
                        .desired_width(320.0),
                );
                egui::ComboBox::from_id_salt("admin_role")
                    .selected_text(form.role.label())
                    .show_ui(ui, |ui| {
                        for role in UserRole::ALL {
                            ui.selectable_value(&mut form.role, role, role.label());
                        }
                    });
                if ui
                    .add_enabled(!pending, egui::Button::new("Assign"))
                    .clicked()
                {
                    action = AdminAction::Assign;
                }
                if ui.button("Look up").clicked() {
                    action = AdminAction::LookUp;
                }
                if pending {
                    ui.spinner();
                }
            });
            if let Some(principal) = &form.looked_up {
                lookup_row(ui, principal, remote);
            }
        });
    action
}

fn lookup_row(ui: &mut egui::Ui, principal: &Principal, remote: &mut RemoteData) {
    ui.horizontal(|ui| {
        ui.monospace(principal.abbreviated())
            .on_hover_text(principal.as_str());
        match remote.user_profile(Some(principal)) {
            QueryState::Ready {
                value: QueryValue::Profile(Some(profile)),
                ..
            } => {
                ui.label(egui::RichText::new(&profile.name).strong());
            }
            QueryState::Ready { .. } => {
                ui.label(egui::RichText::new("No profile").weak());
            }
            QueryState::Failed(err) => {
                ui.colored_label(egui::Color32::LIGHT_RED, err.to_string());
            }
            QueryState::Loading | QueryState::Disabled | QueryState::Skipped => {
                ui.spinner();
            }
        }
    });
}
