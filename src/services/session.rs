use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{Identity, Principal};

/// Source of authenticated identities. Sign-in is delegated entirely to it.
pub trait IdentityProvider: Send {
    /// Silent restore on start-up; `None` when there is nothing to restore.
    fn restore(&self) -> Result<Option<Identity>>;
    fn login(&self) -> Result<Identity>;
    fn logout(&self) -> Result<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredSession {
    principal: Principal,
    signed_in_at: DateTime<Utc>,
}

/// Keeps the signed-in principal in a JSON file so it survives restarts.
pub struct FileIdentityProvider {
    session_file: PathBuf,
}

impl FileIdentityProvider {
    pub fn new(session_file: PathBuf) -> Self {
        Self { session_file }
    }
}

fn generate_principal() -> Principal {
    let raw = Uuid::new_v4().simple().to_string();
    let groups: Vec<String> = raw
        .as_bytes()
        .chunks(5)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect();
    Principal(groups.join("-"))
}

impl IdentityProvider for FileIdentityProvider {
    fn restore(&self) -> Result<Option<Identity>> {
        if !self.session_file.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.session_file).with_context(|| {
            format!("Failed to read session file {}", self.session_file.display())
        })?;
        let stored: StoredSession = serde_json::from_str(&raw).with_context(|| {
            format!("Failed to parse session file {}", self.session_file.display())
        })?;
        info!(
            "Restored session for {} (signed in {})",
            stored.principal.abbreviated(),
            stored.signed_in_at
        );
        Ok(Some(Identity {
            principal: stored.principal,
        }))
    }

    fn login(&self) -> Result<Identity> {
        let stored = StoredSession {
            principal: generate_principal(),
            signed_in_at: Utc::now(),
        };
        if let Some(parent) = self.session_file.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let raw = serde_json::to_string_pretty(&stored)?;
        fs::write(&self.session_file, raw).with_context(|| {
            format!("Failed to write session file {}", self.session_file.display())
        })?;
        Ok(Identity {
            principal: stored.principal,
        })
    }

    fn logout(&self) -> Result<()> {
        if self.session_file.exists() {
            fs::remove_file(&self.session_file).with_context(|| {
                format!("Failed to remove session file {}", self.session_file.display())
            })?;
        }
        Ok(())
    }
}

/// Current identity plus the provider that issued it.
pub struct Session {
    provider: Box<dyn IdentityProvider>,
    identity: Option<Identity>,
    last_error: Option<String>,
}

impl Session {
    pub fn new(provider: Box<dyn IdentityProvider>) -> Self {
        Self {
            provider,
            identity: None,
            last_error: None,
        }
    }

    /// Attempts a silent restore. A broken session file leaves the user signed out.
    pub fn init(&mut self) {
        match self.provider.restore() {
            Ok(identity) => self.identity = identity,
            Err(err) => {
                warn!("Session restore failed: {err:#}");
                self.identity = None;
            }
        }
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn sign_in(&mut self) -> Result<Identity> {
        if let Some(identity) = &self.identity {
            return Ok(identity.clone());
        }
        match self.provider.login() {
            Ok(identity) => {
                info!("Signed in as {}", identity.principal.abbreviated());
                self.last_error = None;
                self.identity = Some(identity.clone());
                Ok(identity)
            }
            Err(err) => {
                self.last_error = Some(format!("{err:#}"));
                Err(err)
            }
        }
    }

    /// Forgets the identity even when the provider fails to clean up.
    pub fn sign_out(&mut self) -> Result<()> {
        let previous = self.identity.take();
        if let Some(identity) = previous {
            info!("Signing out {}", identity.principal.abbreviated());
        }
        self.provider.logout()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_in(dir: &tempfile::TempDir) -> (Session, PathBuf) {
        let path = dir.path().join("nested").join("session.json");
        let session = Session::new(Box::new(FileIdentityProvider::new(path.clone())));
        (session, path)
    }

    #[test]
    fn fresh_install_starts_signed_out() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, _) = session_in(&dir);
        session.init();
        assert!(!session.is_authenticated());
    }

    #[test]
    fn sign_in_survives_a_restart() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, path) = session_in(&dir);
        let identity = session.sign_in().unwrap();
        assert!(path.exists());
        assert_eq!(session.sign_in().unwrap(), identity, "signing in twice is a no-op");

        let (mut restarted, _) = session_in(&dir);
        restarted.init();
        assert_eq!(restarted.identity(), Some(&identity));
    }

    #[test]
    fn sign_out_forgets_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, path) = session_in(&dir);
        session.sign_in().unwrap();
        session.sign_out().unwrap();
        assert!(!session.is_authenticated());
        assert!(!path.exists());

        let (mut restarted, _) = session_in(&dir);
        restarted.init();
        assert!(!restarted.is_authenticated());
    }

    #[test]
    fn corrupt_session_file_is_treated_as_signed_out() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, path) = session_in(&dir);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{ not json").unwrap();
        session.init();
        assert!(!session.is_authenticated());
    }

    #[test]
    fn generated_principals_are_grouped() {
        let principal = generate_principal();
        assert!(principal.as_str().split('-').all(|g| g.len() <= 5));
        assert_ne!(principal, generate_principal());
    }
}
