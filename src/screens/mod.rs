pub mod admin;
pub mod answer_generation;
pub mod clue_upload;
pub mod header;
pub mod profile_setup;
pub mod riddle_text;
pub mod sign_in;
pub mod toasts;
