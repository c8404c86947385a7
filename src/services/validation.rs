use thiserror::Error;

use crate::models::ClueKind;

/// Problems caught before anything is sent to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{file_name} is not a valid {kind} file")]
    WrongMediaType { file_name: String, kind: ClueKind },
    #[error("{file_name} is not a video, image or audio file")]
    UnsupportedFile { file_name: String },
    #[error("Please provide at least one image clue ID")]
    NoClueIds,
    #[error("Please enter riddle text in the Riddle Text card above")]
    BlankRiddle,
    #[error("Please enter your name")]
    BlankProfileName,
    #[error("Please enter a principal")]
    BlankPrincipal,
    #[error("Generated answer is invalid (echoed input). Please try again.")]
    EchoedRiddle,
}
