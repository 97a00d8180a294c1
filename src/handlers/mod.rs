pub mod chat;
pub mod embeddings;
pub mod health;
pub mod recommendations;

pub use chat::chat_config;
pub use embeddings::embeddings_config;
pub use health::{health_check, health_options};
pub use recommendations::recommendations_config;
