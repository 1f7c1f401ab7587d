pub mod captions;
pub mod config;
pub mod error;
pub mod slug;
pub mod template;
pub mod timing;
pub mod types;
