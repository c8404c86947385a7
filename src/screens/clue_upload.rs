use eframe::egui;
use rfd::FileDialog;
use tracing::{info, warn};

use crate::models::{ClueUploadItem, LocalId, SourceFile, UploadStatus};
use crate::services::media;
use crate::services::upload_queue::UploadQueue;

pub enum ClueUploadAction {
    Stay,
    Selected(Vec<SourceFile>),
    Upload(LocalId),
    UploadAllPending,
    Remove(LocalId),
    ClearAll,
}

pub fn ui(ui: &mut egui::Ui, queue: &UploadQueue) -> ClueUploadAction {
    let kind = queue.kind();
    let counts = queue.counts();
    let mut action = ClueUploadAction::Stay;

    egui::Frame::group(ui.style()).show(ui, |ui| {
        ui.set_min_width(ui.available_width());
        ui.horizontal(|ui| {
            ui.label(egui::RichText::new(format!("{} Clues", kind.title())).strong());
            if !queue.is_empty() {
                ui.label(
                    egui::RichText::new(format!(
                        "{} file(s): {} pending | {} uploading | {} done | {} failed",
                        queue.len(),
                        counts.pending,
                        counts.uploading,
                        counts.success,
                        counts.error
                    ))
                    .small()
                    .weak(),
                );
            }
        });
        ui.add_space(4.0);

        ui.horizontal(|ui| {
            if ui.button(format!("Select {} files", kind.label())).clicked() {
                let extensions = media::picker_extensions(kind);
                if let Some(paths) = FileDialog::new()
                    .set_directory(".")
                    .add_filter(kind.title(), extensions.as_slice())
                    .pick_files()
                {
                    let mut files = Vec::with_capacity(paths.len());
                    for path in paths {
                        match media::source_file(path) {
                            Ok(file) => files.push(file),
                            Err(err) => warn!("Skipping unreadable selection: {err:#}"),
                        }
                    }
                    info!("Selected {} {} file(s)", files.len(), kind);
                    action = ClueUploadAction::Selected(files);
                }
            }
            if ui
                .add_enabled(counts.pending > 0, egui::Button::new("Upload all"))
                .clicked()
            {
                action = ClueUploadAction::UploadAllPending;
            }
            if ui
                .add_enabled(!queue.is_empty(), egui::Button::new("Clear All"))
                .clicked()
            {
                action = ClueUploadAction::ClearAll;
            }
        });

        if queue.is_empty() {
            ui.label(egui::RichText::new(format!("No {} clues selected", kind.label())).weak());
            ui.label(
                egui::RichText::new("or drop files onto the window")
                    .small()
                    .weak(),
            );
            return;
        }

        ui.add_space(4.0);
        for item in queue.items() {
            if let Some(item_action) = item_row(ui, item) {
                action = item_action;
            }
        }
    });
    action
}

fn item_row(ui: &mut egui::Ui, item: &ClueUploadItem) -> Option<ClueUploadAction> {
    let mut action = None;
    ui.separator();
    ui.horizontal(|ui| {
        ui.label(&item.source.name);
        ui.label(
            egui::RichText::new(format!("{:.2} MB", item.source.size_mb()))
                .small()
                .weak(),
        );

        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            if ui
                .add_enabled(item.is_removable(), egui::Button::new("Remove"))
                .clicked()
            {
                action = Some(ClueUploadAction::Remove(item.local_id));
            }
            match item.status {
                UploadStatus::Pending => {
                    if ui.button("Upload").clicked() {
                        action = Some(ClueUploadAction::Upload(item.local_id));
                    }
                }
                UploadStatus::Error => {
                    if ui.button("Retry").clicked() {
                        action = Some(ClueUploadAction::Upload(item.local_id));
                    }
                }
                UploadStatus::Uploading | UploadStatus::Success => {}
            }
        });
    });

    match item.status {
        UploadStatus::Pending => {
            ui.label(egui::RichText::new("Ready to upload").small().weak());
        }
        UploadStatus::Uploading => {
            ui.add(
                egui::ProgressBar::new(f32::from(item.progress) / 100.0)
                    .show_percentage()
                    .animate(true),
            );
        }
        UploadStatus::Success => {
            if let Some(clue_id) = item.remote_clue_id {
                ui.colored_label(egui::Color32::LIGHT_GREEN, format!("Clue ID: {clue_id}"));
            }
        }
        UploadStatus::Error => {
            let message = item.error_message.as_deref().unwrap_or("Upload failed");
            ui.colored_label(egui::Color32::LIGHT_RED, message);
        }
    }
    action
}
