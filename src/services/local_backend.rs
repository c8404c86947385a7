use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use crate::models::{
    Answer, AnswerId, Clue, ClueId, ClueKind, Identity, MediaBlob, Principal, UserProfile,
    UserRole,
};
use crate::services::backend::{BackendError, BackendResult, BlobPayload, RiddleBackend};
use crate::services::config_loader::BackendConfig;

const KNOWN_RIDDLES: &[(&str, &str)] = &[
    ("keys but no locks", "A piano"),
    ("gets wetter the more it dries", "A towel"),
    ("has hands but can't clap", "A clock"),
    ("has hands but cannot clap", "A clock"),
    ("has a neck but no head", "A bottle"),
    ("has to be broken before you can use it", "An egg"),
    ("goes up but never comes down", "Your age"),
];

#[derive(Default)]
struct ClueShelf {
    next_id: u64,
    clues: BTreeMap<ClueId, Clue>,
}

#[derive(Default)]
struct LocalStore {
    profiles: HashMap<Principal, UserProfile>,
    roles: HashMap<Principal, UserRole>,
    video: ClueShelf,
    image: ClueShelf,
    audio: ClueShelf,
    next_answer_id: u64,
    answers: BTreeMap<AnswerId, Answer>,
}

impl LocalStore {
    fn shelf(&mut self, kind: ClueKind) -> &mut ClueShelf {
        match kind {
            ClueKind::Video => &mut self.video,
            ClueKind::Image => &mut self.image,
            ClueKind::Audio => &mut self.audio,
        }
    }

    /// The first principal ever seen becomes admin.
    fn role_of(&mut self, principal: &Principal) -> UserRole {
        if let Some(role) = self.roles.get(principal) {
            return *role;
        }
        let role = if self.roles.is_empty() {
            UserRole::Admin
        } else {
            UserRole::User
        };
        info!("Registered {} as {}", principal, role.label());
        self.roles.insert(principal.clone(), role);
        role
    }
}

/// In-process implementation of the riddle service used for offline runs and tests.
pub struct LocalBackend {
    store: Mutex<LocalStore>,
    chunk_bytes: usize,
    chunk_delay: Duration,
}

impl LocalBackend {
    pub fn new(config: &BackendConfig) -> Self {
        Self {
            store: Mutex::new(LocalStore::default()),
            chunk_bytes: config.upload_chunk_bytes.max(1),
            chunk_delay: Duration::from_millis(config.chunk_delay_ms),
        }
    }

    fn store(&self) -> BackendResult<MutexGuard<'_, LocalStore>> {
        self.store
            .lock()
            .map_err(|_| BackendError::Remote("backend state lock poisoned".to_string()))
    }

    fn authenticate<'a>(&self, caller: Option<&'a Identity>) -> BackendResult<&'a Principal> {
        let identity = caller.ok_or(BackendError::Unauthenticated)?;
        self.store()?.role_of(&identity.principal);
        Ok(&identity.principal)
    }

    async fn transmit(&self, payload: &BlobPayload) {
        let total = payload.bytes().len();
        if total == 0 {
            payload.report_progress(100);
            return;
        }
        let mut sent = 0usize;
        while sent < total {
            sent = (sent + self.chunk_bytes).min(total);
            if !self.chunk_delay.is_zero() {
                tokio::time::sleep(self.chunk_delay).await;
            }
            payload.report_progress((sent * 100 / total) as u8);
        }
    }
}

fn compose_answer(riddle_text: &str, clue_count: usize) -> String {
    let lowered = riddle_text.to_lowercase();
    let guess = KNOWN_RIDDLES
        .iter()
        .find(|(needle, _)| lowered.contains(needle))
        .map(|(_, answer)| (*answer).to_string());

    match guess {
        Some(answer) => format!("{answer}. Cross-checked against {clue_count} image clue(s)."),
        None => format!(
            "No confident answer for this riddle yet. {clue_count} image clue(s) were examined; \
             try adding more clues."
        ),
    }
}

#[async_trait]
impl RiddleBackend for LocalBackend {
    async fn get_caller_user_profile(
        &self,
        caller: Option<&Identity>,
    ) -> BackendResult<Option<UserProfile>> {
        let principal = self.authenticate(caller)?;
        Ok(self.store()?.profiles.get(principal).cloned())
    }

    async fn save_caller_user_profile(
        &self,
        caller: Option<&Identity>,
        profile: UserProfile,
    ) -> BackendResult<()> {
        let principal = self.authenticate(caller)?;
        info!("Saving profile for {}", principal);
        self.store()?.profiles.insert(principal.clone(), profile);
        Ok(())
    }

    async fn get_user_profile(
        &self,
        caller: Option<&Identity>,
        user: &Principal,
    ) -> BackendResult<Option<UserProfile>> {
        let principal = self.authenticate(caller)?;
        let mut store = self.store()?;
        if principal != user && store.role_of(principal) != UserRole::Admin {
            return Err(BackendError::Unauthorized(
                "can only view your own profile".to_string(),
            ));
        }
        Ok(store.profiles.get(user).cloned())
    }

    async fn upload_clue(
        &self,
        caller: Option<&Identity>,
        kind: ClueKind,
        payload: BlobPayload,
    ) -> BackendResult<ClueId> {
        let owner = self.authenticate(caller)?.clone();
        self.transmit(&payload).await;

        let mut store = self.store()?;
        let shelf = store.shelf(kind);
        shelf.next_id += 1;
        let id = ClueId(shelf.next_id);
        shelf.clues.insert(
            id,
            Clue {
                id,
                kind,
                owner,
                blob: MediaBlob::from_bytes(payload.shared_bytes()),
                timestamp: Utc::now(),
            },
        );
        info!(
            "Stored {} clue {} ({} bytes)",
            kind,
            id,
            payload.bytes().len()
        );
        Ok(id)
    }

    async fn get_clue(
        &self,
        caller: Option<&Identity>,
        kind: ClueKind,
        id: ClueId,
    ) -> BackendResult<Option<Clue>> {
        self.authenticate(caller)?;
        Ok(self.store()?.shelf(kind).clues.get(&id).cloned())
    }

    async fn generate_answer(
        &self,
        caller: Option<&Identity>,
        image_clue_ids: Vec<ClueId>,
        riddle_text: String,
    ) -> BackendResult<AnswerId> {
        let owner = self.authenticate(caller)?.clone();
        if image_clue_ids.is_empty() {
            return Err(BackendError::Remote(
                "at least one image clue is required".to_string(),
            ));
        }

        let mut store = self.store()?;
        if let Some(missing) = image_clue_ids
            .iter()
            .find(|id| !store.image.clues.contains_key(*id))
        {
            return Err(BackendError::Remote(format!(
                "image clue {missing} not found"
            )));
        }

        store.next_answer_id += 1;
        let id = AnswerId(store.next_answer_id);
        let answer_text = compose_answer(&riddle_text, image_clue_ids.len());
        debug!("Answer {} composed from clues {:?}", id, image_clue_ids);
        store.answers.insert(
            id,
            Answer {
                id,
                owner,
                timestamp: Utc::now(),
                answer_text,
                image_clue_ids,
            },
        );
        Ok(id)
    }

    async fn get_answer(
        &self,
        caller: Option<&Identity>,
        id: AnswerId,
    ) -> BackendResult<Option<Answer>> {
        self.authenticate(caller)?;
        Ok(self.store()?.answers.get(&id).cloned())
    }

    async fn get_caller_user_role(&self, caller: Option<&Identity>) -> BackendResult<UserRole> {
        let principal = self.authenticate(caller)?;
        Ok(self.store()?.role_of(principal))
    }

    async fn is_caller_admin(&self, caller: Option<&Identity>) -> BackendResult<bool> {
        Ok(self.get_caller_user_role(caller).await? == UserRole::Admin)
    }

    async fn assign_caller_user_role(
        &self,
        caller: Option<&Identity>,
        user: Principal,
        role: UserRole,
    ) -> BackendResult<()> {
        let principal = self.authenticate(caller)?;
        let mut store = self.store()?;
        if store.role_of(principal) != UserRole::Admin {
            return Err(BackendError::Unauthorized(
                "only admins can assign user roles".to_string(),
            ));
        }
        info!("{} assigned role {} to {}", principal, role.label(), user);
        store.roles.insert(user, role);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn backend() -> LocalBackend {
        LocalBackend::new(&BackendConfig {
            upload_chunk_bytes: 4,
            chunk_delay_ms: 0,
        })
    }

    fn identity(name: &str) -> Identity {
        Identity {
            principal: Principal(name.to_string()),
        }
    }

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap()
    }

    #[test]
    fn anonymous_callers_are_rejected_everywhere() {
        let rt = runtime();
        let backend = backend();
        rt.block_on(async {
            assert_eq!(
                backend.get_caller_user_profile(None).await,
                Err(BackendError::Unauthenticated)
            );
            assert_eq!(
                backend
                    .upload_clue(None, ClueKind::Image, BlobPayload::from_bytes(vec![1u8]))
                    .await,
                Err(BackendError::Unauthenticated)
            );
            assert_eq!(
                backend
                    .generate_answer(None, vec![ClueId(1)], "riddle".to_string())
                    .await,
                Err(BackendError::Unauthenticated)
            );
        });
    }

    #[test]
    fn missing_entities_resolve_to_none() {
        let rt = runtime();
        let backend = backend();
        let alice = identity("alice");
        rt.block_on(async {
            assert_eq!(
                backend
                    .get_clue(Some(&alice), ClueKind::Video, ClueId(9))
                    .await,
                Ok(None)
            );
            assert_eq!(backend.get_answer(Some(&alice), AnswerId(9)).await, Ok(None));
            assert_eq!(backend.get_caller_user_profile(Some(&alice)).await, Ok(None));
        });
    }

    #[test]
    fn upload_progress_climbs_to_completion() {
        let rt = runtime();
        let backend = backend();
        let alice = identity("alice");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let payload = BlobPayload::from_bytes(vec![7u8; 10])
            .with_upload_progress(Arc::new(move |p| sink.lock().unwrap().push(p)));

        let id = rt
            .block_on(backend.upload_clue(Some(&alice), ClueKind::Audio, payload))
            .unwrap();
        assert_eq!(id, ClueId(1));

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen, vec![40, 80, 100]);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));

        let clue = rt
            .block_on(backend.get_clue(Some(&alice), ClueKind::Audio, id))
            .unwrap()
            .unwrap();
        assert_eq!(clue.blob.len(), 10);
        assert_eq!(clue.owner, alice.principal);
    }

    #[test]
    fn clue_ids_are_counted_per_kind() {
        let rt = runtime();
        let backend = backend();
        let alice = identity("alice");
        rt.block_on(async {
            let image = backend
                .upload_clue(Some(&alice), ClueKind::Image, BlobPayload::from_bytes(vec![1u8]))
                .await
                .unwrap();
            let video = backend
                .upload_clue(Some(&alice), ClueKind::Video, BlobPayload::from_bytes(vec![1u8]))
                .await
                .unwrap();
            assert_eq!(image, ClueId(1));
            assert_eq!(video, ClueId(1));
        });
    }

    #[test]
    fn generation_keeps_clue_order_and_rejects_unknown_ids() {
        let rt = runtime();
        let backend = backend();
        let alice = identity("alice");
        rt.block_on(async {
            for _ in 0..5 {
                backend
                    .upload_clue(Some(&alice), ClueKind::Image, BlobPayload::from_bytes(vec![0u8]))
                    .await
                    .unwrap();
            }

            let ids = vec![ClueId(5), ClueId(1), ClueId(3)];
            let answer_id = backend
                .generate_answer(Some(&alice), ids.clone(), "What has keys but no locks?".into())
                .await
                .unwrap();
            let answer = backend
                .get_answer(Some(&alice), answer_id)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(answer.image_clue_ids, ids);
            assert!(answer.answer_text.starts_with("A piano"));

            let err = backend
                .generate_answer(Some(&alice), vec![ClueId(42)], "riddle".into())
                .await
                .unwrap_err();
            assert_eq!(err, BackendError::Remote("image clue 42 not found".into()));
        });
    }

    #[test]
    fn only_the_first_principal_may_assign_roles() {
        let rt = runtime();
        let backend = backend();
        let admin = identity("first");
        let user = identity("second");
        rt.block_on(async {
            assert_eq!(backend.is_caller_admin(Some(&admin)).await, Ok(true));
            assert_eq!(
                backend.get_caller_user_role(Some(&user)).await,
                Ok(UserRole::User)
            );

            let denied = backend
                .assign_caller_user_role(Some(&user), admin.principal.clone(), UserRole::Guest)
                .await;
            assert!(matches!(denied, Err(BackendError::Unauthorized(_))));

            backend
                .assign_caller_user_role(Some(&admin), user.principal.clone(), UserRole::Admin)
                .await
                .unwrap();
            assert_eq!(backend.is_caller_admin(Some(&user)).await, Ok(true));
        });
    }

    #[test]
    fn profiles_are_private_to_their_owner() {
        let rt = runtime();
        let backend = backend();
        let admin = identity("first");
        let user = identity("second");
        rt.block_on(async {
            backend
                .save_caller_user_profile(Some(&admin), UserProfile { name: "Ada".into() })
                .await
                .unwrap();
            let denied = backend
                .get_user_profile(Some(&user), &admin.principal)
                .await;
            assert!(matches!(denied, Err(BackendError::Unauthorized(_))));

            let seen = backend
                .get_user_profile(Some(&admin), &admin.principal)
                .await
                .unwrap();
            assert_eq!(seen, Some(UserProfile { name: "Ada".into() }));
        });
    }
}
