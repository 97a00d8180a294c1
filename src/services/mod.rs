pub mod chat;
pub mod recommendation;

pub use chat::ChatService;
pub use recommendation::RecommendationService;
