use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::models::ClueKind;
use crate::services::backend::BackendError;
use crate::services::query_cache::QueryKind;
use crate::services::validation::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
    Success,
    Error,
}

/// What the user was trying to do when a remote call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAction {
    UploadClue(ClueKind),
    GenerateAnswer,
    SaveProfile,
    AssignRole,
    Load(QueryKind),
}

impl UserAction {
    fn plural_phrase(self) -> String {
        match self {
            UserAction::UploadClue(kind) => format!("upload {} clues", kind.label()),
            UserAction::GenerateAnswer => "generate answers".to_string(),
            UserAction::SaveProfile => "save your profile".to_string(),
            UserAction::AssignRole => "assign roles".to_string(),
            UserAction::Load(kind) => format!("view {}", read_subject(kind, true)),
        }
    }

    fn singular_phrase(self) -> String {
        match self {
            UserAction::UploadClue(kind) => format!("upload {} clue", kind.label()),
            UserAction::GenerateAnswer => "generate answer".to_string(),
            UserAction::SaveProfile => "save profile".to_string(),
            UserAction::AssignRole => "assign role".to_string(),
            UserAction::Load(kind) => format!("load {}", read_subject(kind, false)),
        }
    }
}

fn read_subject(kind: QueryKind, plural: bool) -> String {
    let (one, many) = match kind {
        QueryKind::CallerProfile | QueryKind::CallerRole | QueryKind::CallerIsAdmin => {
            ("your account", "your account")
        }
        QueryKind::UserProfile => ("user profile", "user profiles"),
        QueryKind::Answer => ("answer", "answers"),
        QueryKind::VideoClue => ("video clue", "video clues"),
        QueryKind::ImageClue => ("image clue", "image clues"),
        QueryKind::AudioClue => ("audio clue", "audio clues"),
    };
    if plural { many } else { one }.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: ToastLevel,
    pub message: String,
    pub sign_in_prompt: bool,
}

pub fn describe_failure(err: &BackendError, action: UserAction) -> Notice {
    let message = match err {
        BackendError::Unauthenticated | BackendError::Unauthorized(_) => {
            format!("You must be signed in to {}", action.plural_phrase())
        }
        BackendError::Remote(_) => {
            format!("Failed to {}. Please try again.", action.singular_phrase())
        }
    };
    Notice {
        level: ToastLevel::Error,
        message,
        sign_in_prompt: err.needs_sign_in(),
    }
}

#[derive(Debug, Clone)]
pub struct Toast {
    pub id: u64,
    pub notice: Notice,
    created_at: Instant,
}

pub struct Toasts {
    items: VecDeque<Toast>,
    ttl: Duration,
    max_visible: usize,
    next_id: u64,
}

impl Toasts {
    pub fn new(ttl: Duration, max_visible: usize) -> Self {
        Self {
            items: VecDeque::new(),
            ttl,
            max_visible: max_visible.max(1),
            next_id: 0,
        }
    }

    pub fn push(&mut self, notice: Notice) {
        match notice.level {
            ToastLevel::Success => info!("Notice: {}", notice.message),
            ToastLevel::Error => warn!("Notice: {}", notice.message),
        }
        self.next_id += 1;
        self.items.push_back(Toast {
            id: self.next_id,
            notice,
            created_at: Instant::now(),
        });
        while self.items.len() > self.max_visible {
            self.items.pop_front();
        }
    }

    pub fn success(&mut self, message: impl Into<String>) {
        self.push(Notice {
            level: ToastLevel::Success,
            message: message.into(),
            sign_in_prompt: false,
        });
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push(Notice {
            level: ToastLevel::Error,
            message: message.into(),
            sign_in_prompt: false,
        });
    }

    pub fn failure(&mut self, err: &BackendError, action: UserAction) {
        self.push(describe_failure(err, action));
    }

    pub fn invalid(&mut self, err: &ValidationError) {
        self.error(err.to_string());
    }

    pub fn prune(&mut self, now: Instant) {
        let ttl = self.ttl;
        self.items
            .retain(|toast| now.saturating_duration_since(toast.created_at) < ttl);
    }

    pub fn dismiss(&mut self, id: u64) {
        self.items.retain(|toast| toast.id != id);
    }

    pub fn visible(&self) -> impl Iterator<Item = &Toast> {
        self.items.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
