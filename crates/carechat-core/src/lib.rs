pub mod client;
pub mod composer;
pub mod config;
pub mod error;
pub mod state;
pub mod timeline;

// Re-export main types for convenience
pub use client::{ChatClient, ChatTransport, extract_reply, reply_from_body};
pub use composer::{Behavior, ComposeMode, Composed, Draft, DEFAULT_BEHAVIORS, OTHER_BEHAVIOR};
pub use config::{Config, Endpoint, UrlSource};
pub use error::{ChatError, ComposeError, SendRejected, FAILURE_NOTICE};
pub use state::{ChatMessage, ChatRole, Conversation, PendingSend};
pub use timeline::{TimelineItem, local_timeline, with_date_separators};
