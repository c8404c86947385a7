use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClueKind {
    #[serde(rename = "video")]
    Video,
    #[serde(rename = "image")]
    Image,
    #[serde(rename = "audio")]
    Audio,
}

impl ClueKind {
    pub const ALL: [ClueKind; 3] = [ClueKind::Video, ClueKind::Image, ClueKind::Audio];

    pub fn label(self) -> &'static str {
        match self {
            ClueKind::Video => "video",
            ClueKind::Image => "image",
            ClueKind::Audio => "audio",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            ClueKind::Video => "Video",
            ClueKind::Image => "Image",
            ClueKind::Audio => "Audio",
        }
    }

    /// Top-level media type a selected file must declare to join this queue.
    pub fn media_prefix(self) -> &'static str {
        match self {
            ClueKind::Video => "video/",
            ClueKind::Image => "image/",
            ClueKind::Audio => "audio/",
        }
    }
}

impl fmt::Display for ClueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClueId(pub u64);

impl fmt::Display for ClueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnswerId(pub u64);

impl fmt::Display for AnswerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
pub struct Principal(pub String);

impl Principal {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form used in the header, e.g. `abcde...xyz`.
    pub fn abbreviated(&self) -> String {
        format_principal(&self.0, 5, 3)
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn format_principal(principal: &str, prefix_len: usize, suffix_len: usize) -> String {
    let chars: Vec<char> = principal.chars().collect();
    if chars.len() <= prefix_len + suffix_len {
        return principal.to_string();
    }
    let prefix: String = chars[..prefix_len].iter().collect();
    let suffix: String = chars[chars.len() - suffix_len..].iter().collect();
    format!("{prefix}...{suffix}")
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Identity {
    pub principal: Principal,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum UserRole {
    #[serde(rename = "admin")]
    Admin,
    #[serde(rename = "user")]
    User,
    #[serde(rename = "guest")]
    Guest,
}

impl UserRole {
    pub const ALL: [UserRole; 3] = [UserRole::Admin, UserRole::User, UserRole::Guest];

    pub fn label(self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::User => "user",
            UserRole::Guest => "guest",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub name: String,
}

/// Opaque handle to the bytes stored behind a clue.
#[derive(Clone, PartialEq, Eq)]
pub struct MediaBlob {
    bytes: Arc<[u8]>,
}

impl MediaBlob {
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }
}

impl fmt::Debug for MediaBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MediaBlob({} bytes)", self.bytes.len())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Clue {
    pub id: ClueId,
    pub kind: ClueKind,
    pub owner: Principal,
    pub blob: MediaBlob,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub id: AnswerId,
    pub owner: Principal,
    pub timestamp: DateTime<Utc>,
    pub answer_text: String,
    pub image_clue_ids: Vec<ClueId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileContents {
    OnDisk(PathBuf),
    InMemory(Arc<[u8]>),
}

/// A file picked by the user, not read until its upload starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub name: String,
    pub size: u64,
    pub media_type: Option<String>,
    pub contents: FileContents,
}

impl SourceFile {
    pub fn size_mb(&self) -> f64 {
        self.size as f64 / 1024.0 / 1024.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalId(pub u64);

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    Pending,
    Uploading,
    Success,
    Error,
}

#[derive(Debug, Clone)]
pub struct ClueUploadItem {
    pub source: SourceFile,
    pub local_id: LocalId,
    pub status: UploadStatus,
    pub progress: u8,
    pub remote_clue_id: Option<ClueId>,
    pub error_message: Option<String>,
}

impl ClueUploadItem {
    pub fn new(source: SourceFile, local_id: LocalId) -> Self {
        Self {
            source,
            local_id,
            status: UploadStatus::Pending,
            progress: 0,
            remote_clue_id: None,
            error_message: None,
        }
    }

    pub fn is_removable(&self) -> bool {
        self.status != UploadStatus::Uploading
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_principals_are_not_abbreviated() {
        assert_eq!(format_principal("abcdefgh", 5, 3), "abcdefgh");
        assert_eq!(format_principal("", 5, 3), "");
    }

    #[test]
    fn long_principals_keep_prefix_and_suffix() {
        let principal = Principal("rrkah-fqaaa-aaaaa-aaaaq-cai".to_string());
        assert_eq!(principal.abbreviated(), "rrkah...cai");
    }

    #[test]
    fn only_uploading_items_are_pinned() {
        let source = SourceFile {
            name: "a.png".to_string(),
            size: 10,
            media_type: Some("image/png".to_string()),
            contents: FileContents::InMemory(Arc::from(vec![0u8; 10])),
        };
        let mut item = ClueUploadItem::new(source, LocalId(1));
        assert!(item.is_removable());
        item.status = UploadStatus::Uploading;
        assert!(!item.is_removable());
        item.status = UploadStatus::Error;
        assert!(item.is_removable());
    }
}
