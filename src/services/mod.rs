pub mod answer_flow;
pub mod backend;
pub mod config_loader;
pub mod local_backend;
pub mod media;
pub mod notifications;
pub mod query_cache;
pub mod remote_data;
pub mod session;
pub mod upload_queue;
pub mod validation;
