use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use crate::models::{Answer, AnswerId, Clue, ClueId, ClueKind, Principal, UserProfile, UserRole};
use crate::services::backend::BackendError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    CallerProfile,
    UserProfile,
    VideoClue,
    ImageClue,
    AudioClue,
    Answer,
    CallerRole,
    CallerIsAdmin,
}

impl QueryKind {
    pub fn for_clue(kind: ClueKind) -> Self {
        match kind {
            ClueKind::Video => QueryKind::VideoClue,
            ClueKind::Image => QueryKind::ImageClue,
            ClueKind::Audio => QueryKind::AudioClue,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            QueryKind::CallerProfile => "currentUserProfile",
            QueryKind::UserProfile => "userProfile",
            QueryKind::VideoClue => "videoClue",
            QueryKind::ImageClue => "imageClue",
            QueryKind::AudioClue => "audioClue",
            QueryKind::Answer => "answer",
            QueryKind::CallerRole => "callerRole",
            QueryKind::CallerIsAdmin => "isCallerAdmin",
        }
    }
}

/// Cache key: query kind plus its argument rendered as decimal text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    pub kind: QueryKind,
    pub arg: Option<String>,
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.arg {
            Some(arg) => write!(f, "{}/{}", self.kind.name(), arg),
            None => f.write_str(self.kind.name()),
        }
    }
}

/// A read the client knows how to issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryRequest {
    CallerProfile,
    UserProfile(Principal),
    Clue(ClueKind, ClueId),
    Answer(AnswerId),
    CallerRole,
    CallerIsAdmin,
}

impl QueryRequest {
    pub fn key(&self) -> QueryKey {
        match self {
            QueryRequest::CallerProfile => QueryKey {
                kind: QueryKind::CallerProfile,
                arg: None,
            },
            QueryRequest::UserProfile(principal) => QueryKey {
                kind: QueryKind::UserProfile,
                arg: Some(principal.as_str().to_string()),
            },
            QueryRequest::Clue(kind, id) => QueryKey {
                kind: QueryKind::for_clue(*kind),
                arg: Some(id.0.to_string()),
            },
            QueryRequest::Answer(id) => QueryKey {
                kind: QueryKind::Answer,
                arg: Some(id.0.to_string()),
            },
            QueryRequest::CallerRole => QueryKey {
                kind: QueryKind::CallerRole,
                arg: None,
            },
            QueryRequest::CallerIsAdmin => QueryKey {
                kind: QueryKind::CallerIsAdmin,
                arg: None,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    SaveProfile,
    UploadClue(ClueKind),
    GenerateAnswer,
    AssignRole,
}

impl MutationKind {
    /// Collections whose cached reads go stale once this mutation succeeds.
    pub fn invalidates(self) -> &'static [QueryKind] {
        match self {
            MutationKind::SaveProfile => &[QueryKind::CallerProfile, QueryKind::UserProfile],
            MutationKind::UploadClue(ClueKind::Video) => &[QueryKind::VideoClue],
            MutationKind::UploadClue(ClueKind::Image) => &[QueryKind::ImageClue],
            MutationKind::UploadClue(ClueKind::Audio) => &[QueryKind::AudioClue],
            MutationKind::GenerateAnswer => &[QueryKind::Answer],
            MutationKind::AssignRole => &[QueryKind::CallerRole, QueryKind::CallerIsAdmin],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Profile(Option<UserProfile>),
    Clue(Option<Clue>),
    Answer(Option<Answer>),
    Role(UserRole),
    Flag(bool),
}

/// Proof that a fetch was started; handed back with its result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub key: QueryKey,
    epoch: u64,
    generation: u64,
}

struct CacheEntry {
    data: Option<QueryValue>,
    error: Option<BackendError>,
    in_flight: bool,
    stale: bool,
    generation: u64,
}

impl CacheEntry {
    fn unfetched() -> Self {
        Self {
            data: None,
            error: None,
            in_flight: false,
            stale: true,
            generation: 0,
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum QueryState<'a> {
    /// No session, so the read is not attempted.
    Disabled,
    /// The identifier is unset.
    Skipped,
    Loading,
    Ready {
        value: &'a QueryValue,
        refreshing: bool,
    },
    Failed(&'a BackendError),
}

#[derive(Default)]
pub struct QueryCache {
    entries: HashMap<QueryKey, CacheEntry>,
    epoch: u64,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Starts a fetch unless one is already in flight for the key, the cached
    /// value is still fresh, or the last attempt failed and awaits a retry.
    pub fn begin_fetch(&mut self, key: &QueryKey) -> Option<FetchTicket> {
        let entry = self
            .entries
            .entry(key.clone())
            .or_insert_with(CacheEntry::unfetched);

        if entry.in_flight {
            return None;
        }
        if !entry.stale {
            return None;
        }

        entry.in_flight = true;
        debug!("Fetching {} (generation {})", key, entry.generation);
        Some(FetchTicket {
            key: key.clone(),
            epoch: self.epoch,
            generation: entry.generation,
        })
    }

    /// Stores a fetch result. Results from before the last `clear` are dropped.
    pub fn complete(
        &mut self,
        ticket: FetchTicket,
        result: Result<QueryValue, BackendError>,
    ) -> bool {
        if ticket.epoch != self.epoch {
            debug!("Dropping result for {} from a previous session", ticket.key);
            return false;
        }
        let Some(entry) = self.entries.get_mut(&ticket.key) else {
            return false;
        };

        entry.in_flight = false;
        // An invalidation while this fetch was running keeps the entry stale.
        entry.stale = ticket.generation != entry.generation;
        match result {
            Ok(value) => {
                entry.data = Some(value);
                entry.error = None;
            }
            Err(err) => {
                if entry.data.is_some() {
                    debug!("Keeping cached {} after failed refresh: {}", ticket.key, err);
                }
                entry.error = Some(err);
            }
        }
        true
    }

    pub fn state(&self, key: &QueryKey) -> QueryState<'_> {
        let Some(entry) = self.entries.get(key) else {
            return QueryState::Loading;
        };
        if let Some(value) = &entry.data {
            return QueryState::Ready {
                value,
                refreshing: entry.in_flight,
            };
        }
        if entry.in_flight {
            return QueryState::Loading;
        }
        match &entry.error {
            Some(err) => QueryState::Failed(err),
            None => QueryState::Loading,
        }
    }

    /// Error of the most recent attempt, even when older data is still served.
    pub fn last_error(&self, key: &QueryKey) -> Option<&BackendError> {
        self.entries.get(key).and_then(|entry| entry.error.as_ref())
    }

    /// Marks every cached read of the affected collections for re-fetch.
    pub fn invalidate(&mut self, mutation: MutationKind) -> usize {
        let kinds = mutation.invalidates();
        let mut touched = 0;
        for (key, entry) in self.entries.iter_mut() {
            if kinds.contains(&key.kind) {
                entry.generation += 1;
                entry.stale = true;
                touched += 1;
            }
        }
        debug!("{:?} invalidated {} cached read(s)", mutation, touched);
        touched
    }

    /// Re-arms a key whose last fetch failed. Healthy entries are left alone.
    pub fn retry(&mut self, key: &QueryKey) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) if entry.error.is_some() && !entry.in_flight => {
                entry.stale = true;
                true
            }
            _ => false,
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.epoch += 1;
    }

    pub fn in_flight(&self) -> usize {
        self.entries.values().filter(|entry| entry.in_flight).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn answer(id: u64, text: &str) -> QueryValue {
        QueryValue::Answer(Some(Answer {
            id: AnswerId(id),
            owner: Principal("owner".into()),
            timestamp: Utc::now(),
            answer_text: text.to_string(),
            image_clue_ids: vec![ClueId(1)],
        }))
    }

    #[test]
    fn keys_render_arguments_as_decimal_text() {
        let key = QueryRequest::Clue(ClueKind::Image, ClueId(u64::MAX)).key();
        assert_eq!(key.arg.as_deref(), Some("18446744073709551615"));
        assert_eq!(key.to_string(), "imageClue/18446744073709551615");
        assert_eq!(QueryRequest::CallerProfile.key().to_string(), "currentUserProfile");
    }

    #[test]
    fn identical_reads_share_one_fetch() {
        let mut cache = QueryCache::new();
        let key = QueryRequest::Answer(AnswerId(1)).key();
        let ticket = cache.begin_fetch(&key).expect("first read fetches");
        assert!(cache.begin_fetch(&key).is_none());
        assert_eq!(cache.state(&key), QueryState::Loading);
        assert_eq!(cache.in_flight(), 1);

        cache.complete(ticket, Ok(answer(1, "A piano")));
        assert!(cache.begin_fetch(&key).is_none(), "fresh data is served from cache");
        assert!(matches!(
            cache.state(&key),
            QueryState::Ready {
                refreshing: false,
                ..
            }
        ));
    }

    #[test]
    fn first_failure_is_an_error_state_until_retried() {
        let mut cache = QueryCache::new();
        let key = QueryRequest::CallerProfile.key();
        let ticket = cache.begin_fetch(&key).unwrap();
        cache.complete(ticket, Err(BackendError::Remote("down".into())));

        assert_eq!(
            cache.state(&key),
            QueryState::Failed(&BackendError::Remote("down".into()))
        );
        assert!(cache.begin_fetch(&key).is_none(), "no automatic refetch loop");

        cache.retry(&key);
        let ticket = cache.begin_fetch(&key).unwrap();
        cache.complete(ticket, Ok(QueryValue::Profile(None)));
        assert_eq!(
            cache.state(&key),
            QueryState::Ready {
                value: &QueryValue::Profile(None),
                refreshing: false,
            }
        );
        assert!(cache.last_error(&key).is_none());
    }

    #[test]
    fn failed_refresh_keeps_previous_data() {
        let mut cache = QueryCache::new();
        let key = QueryRequest::Answer(AnswerId(2)).key();
        let ticket = cache.begin_fetch(&key).unwrap();
        cache.complete(ticket, Ok(answer(2, "A towel")));

        cache.invalidate(MutationKind::GenerateAnswer);
        let ticket = cache.begin_fetch(&key).unwrap();
        cache.complete(ticket, Err(BackendError::Remote("flaky".into())));

        match cache.state(&key) {
            QueryState::Ready {
                value: QueryValue::Answer(Some(cached)),
                refreshing: false,
            } => assert_eq!(cached.answer_text, "A towel"),
            other => panic!("unexpected state {other:?}"),
        }
        assert_eq!(
            cache.last_error(&key),
            Some(&BackendError::Remote("flaky".into()))
        );
    }

    #[test]
    fn nothing_is_served_before_a_successful_fetch() {
        let mut cache = QueryCache::new();
        let key = QueryRequest::Clue(ClueKind::Video, ClueId(4)).key();
        assert_eq!(cache.state(&key), QueryState::Loading);
        let ticket = cache.begin_fetch(&key).unwrap();
        cache.complete(ticket, Err(BackendError::Unauthenticated));
        assert!(!matches!(cache.state(&key), QueryState::Ready { .. }));
    }

    #[test]
    fn invalidation_follows_the_mutation_table() {
        let mut cache = QueryCache::new();
        let video = QueryRequest::Clue(ClueKind::Video, ClueId(1)).key();
        let image = QueryRequest::Clue(ClueKind::Image, ClueId(1)).key();
        let role = QueryRequest::CallerRole.key();
        let admin = QueryRequest::CallerIsAdmin.key();
        for (key, value) in [
            (&video, QueryValue::Clue(None)),
            (&image, QueryValue::Clue(None)),
            (&role, QueryValue::Role(UserRole::User)),
            (&admin, QueryValue::Flag(false)),
        ] {
            let ticket = cache.begin_fetch(key).unwrap();
            cache.complete(ticket, Ok(value));
        }

        assert_eq!(cache.invalidate(MutationKind::UploadClue(ClueKind::Video)), 1);
        assert!(cache.begin_fetch(&video).is_some());
        assert!(cache.begin_fetch(&image).is_none());

        assert_eq!(cache.invalidate(MutationKind::AssignRole), 2);
        assert!(cache.begin_fetch(&role).is_some());
        assert!(cache.begin_fetch(&admin).is_some());
    }

    #[test]
    fn fetch_overtaken_by_invalidation_stays_stale() {
        let mut cache = QueryCache::new();
        let key = QueryRequest::Clue(ClueKind::Image, ClueId(3)).key();
        let ticket = cache.begin_fetch(&key).unwrap();

        cache.invalidate(MutationKind::UploadClue(ClueKind::Image));
        cache.complete(ticket, Ok(QueryValue::Clue(None)));

        assert!(matches!(cache.state(&key), QueryState::Ready { .. }));
        assert!(
            cache.begin_fetch(&key).is_some(),
            "data fetched before the upload must be re-read"
        );
    }

    #[test]
    fn retry_only_rearms_failed_reads() {
        let mut cache = QueryCache::new();
        let healthy = QueryRequest::CallerRole.key();
        let broken = QueryRequest::CallerIsAdmin.key();
        let ticket = cache.begin_fetch(&healthy).unwrap();
        cache.complete(ticket, Ok(QueryValue::Role(UserRole::User)));
        let ticket = cache.begin_fetch(&broken).unwrap();
        cache.complete(ticket, Err(BackendError::Remote("down".into())));

        assert!(!cache.retry(&healthy));
        assert!(cache.begin_fetch(&healthy).is_none());
        assert!(cache.retry(&broken));
        assert!(cache.begin_fetch(&broken).is_some());
        assert!(!cache.retry(&QueryRequest::CallerProfile.key()), "unknown keys are ignored");
    }

    #[test]
    fn saving_a_profile_refreshes_every_profile_read() {
        let mut cache = QueryCache::new();
        let own = QueryRequest::CallerProfile.key();
        let other = QueryRequest::UserProfile(Principal("bob-0001".into())).key();
        assert_eq!(other.to_string(), "userProfile/bob-0001");
        for key in [&own, &other] {
            let ticket = cache.begin_fetch(key).unwrap();
            cache.complete(ticket, Ok(QueryValue::Profile(None)));
        }
        assert_eq!(cache.invalidate(MutationKind::SaveProfile), 2);
    }

    #[test]
    fn clear_drops_entries_and_late_results() {
        let mut cache = QueryCache::new();
        let key = QueryRequest::CallerProfile.key();
        let ticket = cache.begin_fetch(&key).unwrap();

        cache.clear();
        assert!(!cache.complete(ticket, Ok(QueryValue::Profile(None))));
        assert_eq!(cache.state(&key), QueryState::Loading);
        assert_eq!(cache.in_flight(), 0);
        assert_eq!(cache.epoch(), 1);
    }
}
