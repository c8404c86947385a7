use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{
    Answer, AnswerId, Clue, ClueId, ClueKind, Identity, Principal, UserProfile, UserRole,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("anonymous caller: sign in required")]
    Unauthenticated,
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("{0}")]
    Remote(String),
}

impl BackendError {
    /// Session or permission problems, which the UI answers with a sign-in prompt.
    pub fn needs_sign_in(&self) -> bool {
        matches!(
            self,
            BackendError::Unauthenticated | BackendError::Unauthorized(_)
        )
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

pub type ProgressFn = Arc<dyn Fn(u8) + Send + Sync>;

/// Bytes handed to an upload call, with an optional best-effort progress sink.
#[derive(Clone)]
pub struct BlobPayload {
    bytes: Arc<[u8]>,
    on_progress: Option<ProgressFn>,
}

impl BlobPayload {
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            bytes: bytes.into(),
            on_progress: None,
        }
    }

    pub fn with_upload_progress(mut self, on_progress: ProgressFn) -> Self {
        self.on_progress = Some(on_progress);
        self
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    pub fn report_progress(&self, percent: u8) {
        if let Some(on_progress) = &self.on_progress {
            on_progress(percent.min(100));
        }
    }
}

impl fmt::Debug for BlobPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobPayload")
            .field("len", &self.bytes.len())
            .field("tracks_progress", &self.on_progress.is_some())
            .finish()
    }
}

/// Operations exposed by the riddle service. Every call carries the caller
/// identity; `None` stands for an anonymous caller.
#[async_trait]
pub trait RiddleBackend: Send + Sync {
    async fn get_caller_user_profile(
        &self,
        caller: Option<&Identity>,
    ) -> BackendResult<Option<UserProfile>>;

    async fn save_caller_user_profile(
        &self,
        caller: Option<&Identity>,
        profile: UserProfile,
    ) -> BackendResult<()>;

    async fn get_user_profile(
        &self,
        caller: Option<&Identity>,
        user: &Principal,
    ) -> BackendResult<Option<UserProfile>>;

    async fn upload_clue(
        &self,
        caller: Option<&Identity>,
        kind: ClueKind,
        payload: BlobPayload,
    ) -> BackendResult<ClueId>;

    async fn get_clue(
        &self,
        caller: Option<&Identity>,
        kind: ClueKind,
        id: ClueId,
    ) -> BackendResult<Option<Clue>>;

    async fn generate_answer(
        &self,
        caller: Option<&Identity>,
        image_clue_ids: Vec<ClueId>,
        riddle_text: String,
    ) -> BackendResult<AnswerId>;

    async fn get_answer(
        &self,
        caller: Option<&Identity>,
        id: AnswerId,
    ) -> BackendResult<Option<Answer>>;

    async fn get_caller_user_role(&self, caller: Option<&Identity>) -> BackendResult<UserRole>;

    async fn is_caller_admin(&self, caller: Option<&Identity>) -> BackendResult<bool>;

    async fn assign_caller_user_role(
        &self,
        caller: Option<&Identity>,
        user: Principal,
        role: UserRole,
    ) -> BackendResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn progress_is_clamped_before_reaching_the_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let payload = BlobPayload::from_bytes(vec![1u8, 2, 3]).with_upload_progress(Arc::new(
            move |percent| sink.lock().unwrap().push(percent),
        ));
        payload.report_progress(40);
        payload.report_progress(250);
        assert_eq!(*seen.lock().unwrap(), vec![40, 100]);
        assert_eq!(payload.bytes(), &[1, 2, 3]);
    }

    #[test]
    fn session_errors_are_told_apart_from_remote_ones() {
        assert!(BackendError::Unauthenticated.needs_sign_in());
        assert!(BackendError::Unauthorized("admin only".into()).needs_sign_in());
        assert!(!BackendError::Remote("boom".into()).needs_sign_in());
    }
}
