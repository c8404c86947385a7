use std::collections::HashMap;

use eframe::egui;

use crate::models::{Answer, AnswerId, ClueId, ClueKind};
use crate::services::answer_flow::{AnswerDraft, GeneratedAnswer};
use crate::services::media::{self, DecodedImageData};
use crate::services::query_cache::{QueryRequest, QueryState, QueryValue};
use crate::services::remote_data::RemoteData;
use crate::services::validation::ValidationError;

pub enum AnswerAction {
    Stay,
    Generate,
    Rejected(ValidationError),
    /// The displayed answer passed the echo check.
    Verified,
}

/// Answer card state: the draft plus thumbnails of clues already decoded.
#[derive(Default)]
pub struct AnswerPanel {
    pub draft: AnswerDraft,
    thumbnails: HashMap<ClueId, Option<egui::TextureHandle>>,
}

impl AnswerPanel {
    pub fn reset(&mut self) {
        self.draft.reset();
        self.thumbnails.clear();
    }
}

enum Loaded<T> {
    Waiting,
    Missing,
    Ready(T),
    Failed(String),
}

fn load_answer(remote: &mut RemoteData, id: AnswerId) -> Loaded<Answer> {
    match remote.answer(Some(id)) {
        QueryState::Ready {
            value: QueryValue::Answer(Some(answer)),
            ..
        } => Loaded::Ready(answer.clone()),
        QueryState::Ready { .. } => Loaded::Missing,
        QueryState::Failed(err) => Loaded::Failed(err.to_string()),
        QueryState::Loading | QueryState::Disabled | QueryState::Skipped => Loaded::Waiting,
    }
}

fn load_image_clue(
    remote: &mut RemoteData,
    id: ClueId,
    max_dimension: u32,
) -> Loaded<Option<DecodedImageData>> {
    match remote.clue(ClueKind::Image, Some(id)) {
        QueryState::Ready {
            value: QueryValue::Clue(Some(clue)),
            ..
        } => Loaded::Ready(media::decode_preview(clue.blob.bytes(), max_dimension)),
        QueryState::Ready { .. } => Loaded::Missing,
        QueryState::Failed(err) => Loaded::Failed(err.to_string()),
        QueryState::Loading | QueryState::Disabled | QueryState::Skipped => Loaded::Waiting,
    }
}

pub fn ui(
    ui: &mut egui::Ui,
    panel: &mut AnswerPanel,
    remote: &mut RemoteData,
    riddle_text: &str,
    preview_max_dimension: u32,
) -> AnswerAction {
    let mut action = AnswerAction::Stay;

    egui::Frame::group(ui.style()).show(ui, |ui| {
        ui.set_min_width(ui.available_width());
        ui.label(egui::RichText::new("Generate Answer").strong());
        ui.add_space(4.0);

        ui.label("Image clue IDs (comma separated)");
        ui.add(
            egui::TextEdit::singleline(&mut panel.draft.clue_ids_input)
                .hint_text("e.g. 1, 3, 5")
                .desired_width(f32::INFINITY),
        );
        let parsed = panel.draft.parsed_ids();
        if !parsed.is_empty() {
            ui.horizontal_wrapped(|ui| {
                for id in &parsed {
                    egui::Frame::new()
                        .fill(egui::Color32::from_rgb(40, 60, 90))
                        .corner_radius(4.0)
                        .inner_margin(egui::Margin::symmetric(6, 2))
                        .show(ui, |ui| {
                            ui.label(egui::RichText::new(format!("#{id}")).small());
                        });
                }
            });
        }
        if riddle_text.trim().is_empty() {
            ui.label(egui::RichText::new("Enter riddle text above to generate an answer").weak());
        }

        ui.add_space(6.0);
        ui.horizontal(|ui| {
            let enabled = panel.draft.can_generate(riddle_text);
            if ui
                .add_enabled(enabled, egui::Button::new("Generate Answer"))
                .clicked()
            {
                action = AnswerAction::Generate;
            }
            if panel.draft.is_pending() {
                ui.spinner();
                ui.label("Generating...");
            }
        });

        let Some(generated) = panel.draft.generated().cloned() else {
            return;
        };
        ui.separator();
        if let Some(output_action) =
            answer_output(ui, panel, remote, &generated, preview_max_dimension)
        {
            action = output_action;
        }
    });
    action
}

fn answer_output(
    ui: &mut egui::Ui,
    panel: &mut AnswerPanel,
    remote: &mut RemoteData,
    generated: &GeneratedAnswer,
    preview_max_dimension: u32,
) -> Option<AnswerAction> {
    let mut action = None;
    ui.horizontal(|ui| {
        ui.label(egui::RichText::new(format!("Answer #{}", generated.answer_id)).strong());
        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            if ui.button("Clear").clicked() {
                panel.draft.clear_output();
            }
        });
    });

    match load_answer(remote, generated.answer_id) {
        Loaded::Waiting => {
            ui.horizontal(|ui| {
                ui.spinner();
                ui.label("Loading answer...");
            });
        }
        Loaded::Missing => {
            ui.colored_label(egui::Color32::LIGHT_RED, "Answer not found");
        }
        Loaded::Failed(message) => {
            ui.colored_label(egui::Color32::LIGHT_RED, message);
            if ui.button("Retry").clicked() {
                remote.retry(QueryRequest::Answer(generated.answer_id));
            }
        }
        Loaded::Ready(answer) => {
            match panel.draft.check_loaded(&answer) {
                Ok(true) => action = Some(AnswerAction::Verified),
                Ok(false) => {}
                Err(err) => return Some(AnswerAction::Rejected(err)),
            }
            ui.label(egui::RichText::new(&answer.answer_text).size(18.0));
            let key = QueryRequest::Answer(generated.answer_id).key();
            if let Some(err) = remote.last_error(&key) {
                ui.colored_label(
                    egui::Color32::from_rgb(220, 170, 60),
                    format!("Refresh failed: {err}"),
                );
            }
            ui.label(
                egui::RichText::new(format!(
                    "Generated {}",
                    answer.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
                ))
                .small()
                .weak(),
            );
            ui.add_space(4.0);
            ui.label("Based on image clues:");
            ui.horizontal_wrapped(|ui| {
                for id in &answer.image_clue_ids {
                    thumbnail(ui, panel, remote, *id, preview_max_dimension);
                }
            });
        }
    }
    action
}

fn thumbnail(
    ui: &mut egui::Ui,
    panel: &mut AnswerPanel,
    remote: &mut RemoteData,
    id: ClueId,
    max_dimension: u32,
) {
    let size = egui::vec2(max_dimension as f32, max_dimension as f32);
    if let Some(cached) = panel.thumbnails.get(&id) {
        match cached {
            Some(texture) => {
                ui.add(egui::Image::new(texture).max_size(size))
                    .on_hover_text(format!("Clue {id}"));
            }
            None => placeholder(ui, id, size, "no preview"),
        }
        return;
    }

    match load_image_clue(remote, id, max_dimension) {
        Loaded::Waiting => {
            ui.spinner();
        }
        Loaded::Missing => placeholder(ui, id, size, "not found"),
        Loaded::Failed(_) => placeholder(ui, id, size, "unavailable"),
        Loaded::Ready(decoded) => {
            let texture = decoded
                .as_ref()
                .map(|image| load_texture_from_decoded(ui.ctx(), &format!("clue_{id}"), image));
            panel.thumbnails.insert(id, texture);
        }
    }
}

fn placeholder(ui: &mut egui::Ui, id: ClueId, size: egui::Vec2, note: &str) {
    egui::Frame::group(ui.style()).show(ui, |ui| {
        ui.set_min_size(size * 0.5);
        ui.vertical_centered(|ui| {
            ui.label(format!("#{id}"));
            ui.label(egui::RichText::new(note).small().weak());
        });
    });
}

fn load_texture_from_decoded(
    ctx: &egui::Context,
    texture_id: &str,
    image: &DecodedImageData,
) -> egui::TextureHandle {
    let color_image =
        egui::ColorImage::from_rgba_unmultiplied([image.width, image.height], &image.rgba);
    ctx.load_texture(
        texture_id.to_string(),
        color_image,
        egui::TextureOptions::LINEAR,
    )
}
