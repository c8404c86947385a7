use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::{ClueId, ClueKind, ClueUploadItem, LocalId, SourceFile, UploadStatus};
use crate::services::backend::BackendResult;
use crate::services::media;
use crate::services::notifications::{Notice, ToastLevel, UserAction, describe_failure};
use crate::services::validation::ValidationError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("no queued file {0}")]
    UnknownItem(LocalId),
    #[error("file {0} is still uploading")]
    InFlight(LocalId),
    #[error("file {0} has already been uploaded")]
    AlreadyUploaded(LocalId),
}

#[derive(Debug, Default)]
pub struct SelectionOutcome {
    pub accepted: Vec<LocalId>,
    pub rejected: Vec<ValidationError>,
}

/// Everything an upload task needs, handed out when an item enters `Uploading`.
#[derive(Debug, Clone)]
pub struct UploadTicket {
    pub kind: ClueKind,
    pub local_id: LocalId,
    pub source: SourceFile,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct QueueCounts {
    pub pending: usize,
    pub uploading: usize,
    pub success: usize,
    pub error: usize,
}

/// Per-surface list of selected files and their upload lifecycle.
pub struct UploadQueue {
    kind: ClueKind,
    items: Vec<ClueUploadItem>,
    next_local_id: u64,
}

impl UploadQueue {
    pub fn new(kind: ClueKind) -> Self {
        Self {
            kind,
            items: Vec::new(),
            next_local_id: 0,
        }
    }

    pub fn kind(&self) -> ClueKind {
        self.kind
    }

    pub fn items(&self) -> &[ClueUploadItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[cfg(test)]
    pub fn get(&self, local_id: LocalId) -> Option<&ClueUploadItem> {
        self.items.iter().find(|item| item.local_id == local_id)
    }

    fn get_mut(&mut self, local_id: LocalId) -> Option<&mut ClueUploadItem> {
        self.items.iter_mut().find(|item| item.local_id == local_id)
    }

    pub fn counts(&self) -> QueueCounts {
        let mut counts = QueueCounts::default();
        for item in &self.items {
            match item.status {
                UploadStatus::Pending => counts.pending += 1,
                UploadStatus::Uploading => counts.uploading += 1,
                UploadStatus::Success => counts.success += 1,
                UploadStatus::Error => counts.error += 1,
            }
        }
        counts
    }

    /// Enqueues every file whose declared media type matches this queue's kind.
    /// The same file picked twice becomes two independent items.
    pub fn select_files(&mut self, files: Vec<SourceFile>) -> SelectionOutcome {
        let mut outcome = SelectionOutcome::default();
        for file in files {
            if !media::matches_kind(file.media_type.as_deref(), self.kind) {
                warn!(
                    "Rejected {} for {} queue (media type {:?})",
                    file.name, self.kind, file.media_type
                );
                outcome.rejected.push(ValidationError::WrongMediaType {
                    file_name: file.name,
                    kind: self.kind,
                });
                continue;
            }

            self.next_local_id += 1;
            let local_id = LocalId(self.next_local_id);
            debug!("Queued {} as {} in {} queue", file.name, local_id, self.kind);
            self.items.push(ClueUploadItem::new(file, local_id));
            outcome.accepted.push(local_id);
        }
        outcome
    }

    /// `Pending` or `Error` -> `Uploading`. Progress restarts from zero.
    pub fn begin_upload(&mut self, local_id: LocalId) -> Result<UploadTicket, QueueError> {
        let kind = self.kind;
        let item = self
            .get_mut(local_id)
            .ok_or(QueueError::UnknownItem(local_id))?;
        match item.status {
            UploadStatus::Uploading => return Err(QueueError::InFlight(local_id)),
            UploadStatus::Success => return Err(QueueError::AlreadyUploaded(local_id)),
            UploadStatus::Pending | UploadStatus::Error => {}
        }

        item.status = UploadStatus::Uploading;
        item.progress = 0;
        item.error_message = None;
        info!("Uploading {} ({}) as {} clue", item.source.name, local_id, kind);
        Ok(UploadTicket {
            kind,
            local_id,
            source: item.source.clone(),
        })
    }

    /// Applies a progress report. Lower values than already shown are ignored.
    pub fn record_progress(&mut self, local_id: LocalId, percent: u8) -> bool {
        let Some(item) = self.get_mut(local_id) else {
            return false;
        };
        if item.status != UploadStatus::Uploading {
            return false;
        }
        let percent = percent.min(100);
        if percent < item.progress {
            return false;
        }
        item.progress = percent;
        true
    }

    /// Returns false when the item is gone (removed or cleared) or not uploading.
    pub fn record_success(&mut self, local_id: LocalId, clue_id: ClueId) -> bool {
        let Some(item) = self.get_mut(local_id) else {
            debug!("Dropping upload result for discarded item {}", local_id);
            return false;
        };
        if item.status != UploadStatus::Uploading {
            warn!("Ignoring success for {} in state {:?}", local_id, item.status);
            return false;
        }
        item.status = UploadStatus::Success;
        item.progress = 100;
        item.remote_clue_id = Some(clue_id);
        item.error_message = None;
        true
    }

    pub fn record_failure(&mut self, local_id: LocalId, message: impl Into<String>) -> bool {
        let Some(item) = self.get_mut(local_id) else {
            debug!("Dropping upload failure for discarded item {}", local_id);
            return false;
        };
        if item.status != UploadStatus::Uploading {
            warn!("Ignoring failure for {} in state {:?}", local_id, item.status);
            return false;
        }
        item.status = UploadStatus::Error;
        item.remote_clue_id = None;
        item.error_message = Some(message.into());
        true
    }

    /// Applies the outcome of an upload call. The item keeps the same
    /// user-facing message the returned notice carries; `None` means the item
    /// is gone and nothing should be shown.
    pub fn record_result(
        &mut self,
        local_id: LocalId,
        result: BackendResult<ClueId>,
    ) -> Option<Notice> {
        match result {
            Ok(clue_id) => self.record_success(local_id, clue_id).then(|| Notice {
                level: ToastLevel::Success,
                message: format!("{} uploaded! Clue ID: {}", self.kind.title(), clue_id),
                sign_in_prompt: false,
            }),
            Err(err) => {
                let notice = describe_failure(&err, UserAction::UploadClue(self.kind));
                self.record_failure(local_id, notice.message.clone())
                    .then_some(notice)
            }
        }
    }

    /// Uploading items stay put; anything else is dropped from the list.
    pub fn remove(&mut self, local_id: LocalId) -> Result<ClueUploadItem, QueueError> {
        let index = self
            .items
            .iter()
            .position(|item| item.local_id == local_id)
            .ok_or(QueueError::UnknownItem(local_id))?;
        if !self.items[index].is_removable() {
            return Err(QueueError::InFlight(local_id));
        }
        Ok(self.items.remove(index))
    }

    /// Empties the queue. In-flight uploads keep running; their results find
    /// no item and are dropped. Returns how many were in flight.
    pub fn clear(&mut self) -> usize {
        let in_flight = self.counts().uploading;
        if in_flight > 0 {
            info!(
                "Clearing {} queue with {} upload(s) still in flight",
                self.kind, in_flight
            );
        }
        self.items.clear();
        in_flight
    }
}
