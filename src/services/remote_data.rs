use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use crate::models::{
    AnswerId, ClueId, ClueKind, FileContents, Identity, LocalId, Principal, SourceFile,
    UserProfile, UserRole,
};
use crate::services::answer_flow::GenerateRequest;
use crate::services::backend::{BackendError, BackendResult, BlobPayload, RiddleBackend};
use crate::services::query_cache::{
    FetchTicket, MutationKind, QueryCache, QueryKey, QueryRequest, QueryState, QueryValue,
};
use crate::services::upload_queue::UploadTicket;
use crate::services::validation::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MutationId(pub u64);

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

/// Messages sent back from runtime tasks to the UI thread.
enum RemoteEvent {
    QueryFinished {
        ticket: FetchTicket,
        result: BackendResult<QueryValue>,
    },
    UploadProgress {
        epoch: u64,
        kind: ClueKind,
        local_id: LocalId,
        percent: u8,
    },
    UploadFinished {
        epoch: u64,
        kind: ClueKind,
        local_id: LocalId,
        result: BackendResult<ClueId>,
    },
    MutationFinished {
        epoch: u64,
        mutation: MutationId,
        kind: MutationKind,
        result: BackendResult<Option<AnswerId>>,
    },
}

/// Mutation results surfaced to the screens after the cache has been updated.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteOutcome {
    UploadProgress {
        kind: ClueKind,
        local_id: LocalId,
        percent: u8,
    },
    UploadFinished {
        kind: ClueKind,
        local_id: LocalId,
        result: BackendResult<ClueId>,
    },
    ProfileSaved(BackendResult<()>),
    AnswerGenerated {
        mutation: MutationId,
        result: BackendResult<AnswerId>,
    },
    RoleAssigned {
        principal: Principal,
        role: UserRole,
        result: BackendResult<()>,
    },
    /// A fetch came back with an error. Reported once per attempt.
    ReadFailed { key: QueryKey, error: BackendError },
}

/// Reads that decide what the signed-in shell shows.
const ACCOUNT_READS: [QueryRequest; 3] = [
    QueryRequest::CallerProfile,
    QueryRequest::CallerRole,
    QueryRequest::CallerIsAdmin,
];

/// Cached reads and fire-and-forget mutations against the riddle service.
/// Calls run on the async runtime; results are applied on `pump`.
pub struct RemoteData {
    runtime: Handle,
    backend: Arc<dyn RiddleBackend>,
    identity: Option<Identity>,
    cache: QueryCache,
    tx: Sender<RemoteEvent>,
    rx: Receiver<RemoteEvent>,
    next_mutation: u64,
    tasks_in_flight: usize,
    profile_save_pending: bool,
    role_assignments: HashMap<MutationId, (Principal, UserRole)>,
}

impl RemoteData {
    pub fn new(runtime: Handle, backend: Arc<dyn RiddleBackend>) -> Self {
        let (tx, rx) = mpsc::channel::<RemoteEvent>();
        Self {
            runtime,
            backend,
            identity: None,
            cache: QueryCache::new(),
            tx,
            rx,
            next_mutation: 0,
            tasks_in_flight: 0,
            profile_save_pending: false,
            role_assignments: HashMap::new(),
        }
    }

    /// Switching identity (including signing out) drops every cached entity.
    pub fn set_identity(&mut self, identity: Option<Identity>) {
        if self.identity == identity {
            return;
        }
        info!(
            "Remote identity changed: {} -> {}",
            describe_identity(self.identity.as_ref()),
            describe_identity(identity.as_ref())
        );
        let abandoned = self.cache.in_flight();
        if abandoned > 0 {
            debug!("Abandoning {} in-flight read(s)", abandoned);
        }
        self.identity = identity;
        self.cache.clear();
        self.profile_save_pending = false;
        self.role_assignments.clear();
    }

    pub fn is_busy(&self) -> bool {
        self.tasks_in_flight > 0
    }

    pub fn profile_save_pending(&self) -> bool {
        self.profile_save_pending
    }

    pub fn role_assign_pending(&self) -> bool {
        !self.role_assignments.is_empty()
    }

    fn read(&mut self, request: QueryRequest) -> QueryState<'_> {
        if self.identity.is_none() {
            return QueryState::Disabled;
        }
        let key = request.key();
        if let Some(ticket) = self.cache.begin_fetch(&key) {
            self.spawn_fetch(request, ticket);
        }
        self.cache.state(&key)
    }

    pub fn caller_profile(&mut self) -> QueryState<'_> {
        self.read(QueryRequest::CallerProfile)
    }

    /// Profile of another principal, used by the admin lookup.
    pub fn user_profile(&mut self, principal: Option<&Principal>) -> QueryState<'_> {
        match principal {
            Some(principal) => self.read(QueryRequest::UserProfile(principal.clone())),
            None => QueryState::Skipped,
        }
    }

    pub fn clue(&mut self, kind: ClueKind, id: Option<ClueId>) -> QueryState<'_> {
        match id {
            Some(id) => self.read(QueryRequest::Clue(kind, id)),
            None => QueryState::Skipped,
        }
    }

    pub fn answer(&mut self, id: Option<AnswerId>) -> QueryState<'_> {
        match id {
            Some(id) => self.read(QueryRequest::Answer(id)),
            None => QueryState::Skipped,
        }
    }

    pub fn caller_role(&mut self) -> QueryState<'_> {
        self.read(QueryRequest::CallerRole)
    }

    pub fn caller_is_admin(&mut self) -> QueryState<'_> {
        self.read(QueryRequest::CallerIsAdmin)
    }

    pub fn last_error(&self, key: &QueryKey) -> Option<&BackendError> {
        self.cache.last_error(key)
    }

    pub fn retry(&mut self, request: QueryRequest) -> bool {
        self.cache.retry(&request.key())
    }

    pub fn account_read_failed(&self) -> bool {
        ACCOUNT_READS
            .iter()
            .any(|request| matches!(self.cache.state(&request.key()), QueryState::Failed(_)))
    }

    /// Re-arms whichever account reads failed; they re-fetch on the next frame.
    pub fn retry_account(&mut self) {
        let rearmed = ACCOUNT_READS
            .into_iter()
            .filter(|request| self.cache.retry(&request.key()))
            .count();
        info!("Retrying {} account read(s)", rearmed);
    }

    fn spawn_fetch(&mut self, request: QueryRequest, ticket: FetchTicket) {
        let backend = Arc::clone(&self.backend);
        let caller = self.identity.clone();
        let tx = self.tx.clone();
        self.tasks_in_flight += 1;
        self.runtime.spawn(async move {
            let result = run_query(backend.as_ref(), caller.as_ref(), request).await;
            let _ = tx.send(RemoteEvent::QueryFinished { ticket, result });
        });
    }

    fn next_mutation_id(&mut self) -> MutationId {
        self.next_mutation += 1;
        MutationId(self.next_mutation)
    }

    pub fn save_profile(&mut self, name: &str) -> Result<MutationId, ValidationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::BlankProfileName);
        }
        let profile = UserProfile {
            name: name.to_string(),
        };
        let mutation = self.next_mutation_id();
        self.profile_save_pending = true;
        self.spawn_mutation(mutation, MutationKind::SaveProfile, move |backend, caller| {
            Box::pin(async move {
                backend
                    .save_caller_user_profile(caller.as_ref(), profile)
                    .await
                    .map(|_| None)
            })
        });
        Ok(mutation)
    }

    pub fn generate_answer(&mut self, request: GenerateRequest) -> MutationId {
        let mutation = self.next_mutation_id();
        let (image_clue_ids, riddle_text) = request.into_parts();
        info!(
            "Requesting answer {} for clues {:?}",
            mutation, image_clue_ids
        );
        self.spawn_mutation(mutation, MutationKind::GenerateAnswer, move |backend, caller| {
            Box::pin(async move {
                backend
                    .generate_answer(caller.as_ref(), image_clue_ids, riddle_text)
                    .await
                    .map(Some)
            })
        });
        mutation
    }

    pub fn assign_role(
        &mut self,
        principal: &str,
        role: UserRole,
    ) -> Result<MutationId, ValidationError> {
        let principal = principal.trim();
        if principal.is_empty() {
            return Err(ValidationError::BlankPrincipal);
        }
        let target = Principal(principal.to_string());
        let mutation = self.next_mutation_id();
        self.role_assignments
            .insert(mutation, (target.clone(), role));
        self.spawn_mutation(mutation, MutationKind::AssignRole, move |backend, caller| {
            Box::pin(async move {
                backend
                    .assign_caller_user_role(caller.as_ref(), target, role)
                    .await
                    .map(|_| None)
            })
        });
        Ok(mutation)
    }

    fn spawn_mutation<F>(&mut self, mutation: MutationId, kind: MutationKind, call: F)
    where
        F: FnOnce(Arc<dyn RiddleBackend>, Option<Identity>) -> MutationFuture + Send + 'static,
    {
        let backend = Arc::clone(&self.backend);
        let caller = self.identity.clone();
        let tx = self.tx.clone();
        let epoch = self.cache.epoch();
        self.tasks_in_flight += 1;
        self.runtime.spawn(async move {
            let result = call(backend, caller).await;
            let _ = tx.send(RemoteEvent::MutationFinished {
                epoch,
                mutation,
                kind,
                result,
            });
        });
    }

    /// Reads the selected file and uploads it, streaming progress back per local id.
    pub fn upload_clue(&mut self, ticket: UploadTicket) {
        let backend = Arc::clone(&self.backend);
        let caller = self.identity.clone();
        let tx = self.tx.clone();
        let epoch = self.cache.epoch();
        let UploadTicket {
            kind,
            local_id,
            source,
        } = ticket;
        self.tasks_in_flight += 1;
        self.runtime.spawn(async move {
            let result = match read_source(&source).await {
                Ok(bytes) => {
                    let progress_tx = tx.clone();
                    let payload = BlobPayload::from_bytes(bytes).with_upload_progress(Arc::new(
                        move |percent| {
                            let _ = progress_tx.send(RemoteEvent::UploadProgress {
                                epoch,
                                kind,
                                local_id,
                                percent,
                            });
                        },
                    ));
                    backend.upload_clue(caller.as_ref(), kind, payload).await
                }
                Err(err) => Err(err),
            };
            let _ = tx.send(RemoteEvent::UploadFinished {
                epoch,
                kind,
                local_id,
                result,
            });
        });
    }

    /// Drains finished work: fills the cache, fires invalidations for
    /// successful mutations and returns what the screens need to react to.
    pub fn pump(&mut self) -> Vec<RemoteOutcome> {
        let mut outcomes = Vec::new();
        loop {
            let event = match self.rx.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            };

            match event {
                RemoteEvent::QueryFinished { ticket, result } => {
                    self.tasks_in_flight = self.tasks_in_flight.saturating_sub(1);
                    let failure = match &result {
                        Ok(_) => None,
                        Err(err) => {
                            error!("Read {} failed: {}", ticket.key, err);
                            Some((ticket.key.clone(), err.clone()))
                        }
                    };
                    if self.cache.complete(ticket, result) {
                        if let Some((key, error)) = failure {
                            outcomes.push(RemoteOutcome::ReadFailed { key, error });
                        }
                    }
                }
                RemoteEvent::UploadProgress {
                    epoch,
                    kind,
                    local_id,
                    percent,
                } => {
                    if epoch == self.cache.epoch() {
                        outcomes.push(RemoteOutcome::UploadProgress {
                            kind,
                            local_id,
                            percent,
                        });
                    }
                }
                RemoteEvent::UploadFinished {
                    epoch,
                    kind,
                    local_id,
                    result,
                } => {
                    self.tasks_in_flight = self.tasks_in_flight.saturating_sub(1);
                    if epoch != self.cache.epoch() {
                        warn!("Discarding {} upload {} from a previous session", kind, local_id);
                        continue;
                    }
                    match &result {
                        Ok(clue_id) => {
                            info!("Uploaded {} clue {} for {}", kind, clue_id, local_id);
                            self.cache.invalidate(MutationKind::UploadClue(kind));
                        }
                        Err(err) => error!("Upload of {} {} failed: {}", kind, local_id, err),
                    }
                    outcomes.push(RemoteOutcome::UploadFinished {
                        kind,
                        local_id,
                        result,
                    });
                }
                RemoteEvent::MutationFinished {
                    epoch,
                    mutation,
                    kind,
                    result,
                } => {
                    self.tasks_in_flight = self.tasks_in_flight.saturating_sub(1);
                    if epoch != self.cache.epoch() {
                        warn!("Discarding {:?} {} from a previous session", kind, mutation);
                        continue;
                    }
                    if let Some(outcome) = self.finish_mutation(mutation, kind, result) {
                        outcomes.push(outcome);
                    }
                }
            }
        }
        outcomes
    }

    fn finish_mutation(
        &mut self,
        mutation: MutationId,
        kind: MutationKind,
        result: BackendResult<Option<AnswerId>>,
    ) -> Option<RemoteOutcome> {
        match &result {
            Ok(_) => {
                debug!("{:?} {} succeeded", kind, mutation);
                self.cache.invalidate(kind);
            }
            Err(err) => error!("{:?} {} failed: {}", kind, mutation, err),
        }

        match kind {
            MutationKind::SaveProfile => {
                self.profile_save_pending = false;
                Some(RemoteOutcome::ProfileSaved(result.map(|_| ())))
            }
            MutationKind::AssignRole => {
                let Some((principal, role)) = self.role_assignments.remove(&mutation) else {
                    warn!("Role assignment {} finished without a pending request", mutation);
                    return None;
                };
                Some(RemoteOutcome::RoleAssigned {
                    principal,
                    role,
                    result: result.map(|_| ()),
                })
            }
            MutationKind::GenerateAnswer => {
                let result = result.and_then(|id| {
                    id.ok_or_else(|| BackendError::Remote("no answer id returned".to_string()))
                });
                Some(RemoteOutcome::AnswerGenerated { mutation, result })
            }
            MutationKind::UploadClue(_) => None,
        }
    }
}

type MutationFuture = std::pin::Pin<
    Box<dyn std::future::Future<Output = BackendResult<Option<AnswerId>>> + Send + 'static>,
>;

async fn run_query(
    backend: &dyn RiddleBackend,
    caller: Option<&Identity>,
    request: QueryRequest,
) -> BackendResult<QueryValue> {
    match request {
        QueryRequest::CallerProfile => backend
            .get_caller_user_profile(caller)
            .await
            .map(QueryValue::Profile),
        QueryRequest::UserProfile(user) => backend
            .get_user_profile(caller, &user)
            .await
            .map(QueryValue::Profile),
        QueryRequest::Clue(kind, id) => backend
            .get_clue(caller, kind, id)
            .await
            .map(QueryValue::Clue),
        QueryRequest::Answer(id) => backend.get_answer(caller, id).await.map(QueryValue::Answer),
        QueryRequest::CallerRole => backend
            .get_caller_user_role(caller)
            .await
            .map(QueryValue::Role),
        QueryRequest::CallerIsAdmin => backend.is_caller_admin(caller).await.map(QueryValue::Flag),
    }
}

async fn read_source(source: &SourceFile) -> BackendResult<Arc<[u8]>> {
    match &source.contents {
        FileContents::InMemory(bytes) => Ok(Arc::clone(bytes)),
        FileContents::OnDisk(path) => tokio::fs::read(path)
            .await
            .map(Arc::from)
            .map_err(|err| {
                BackendError::Remote(format!("failed to read {}: {err}", path.display()))
            }),
    }
}

fn describe_identity(identity: Option<&Identity>) -> String {
    identity
        .map(|identity| identity.principal.abbreviated())
        .unwrap_or_else(|| "anonymous".to_string())
}
