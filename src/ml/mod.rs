pub mod embedding;
pub mod genre;
pub mod intent;
pub mod sentence_encoder;
pub mod similarity;
pub mod vector_cache;

// Re-export public types
pub use embedding::EmbeddingGenerator;
pub use genre::GenreClassifier;
pub use intent::IntentMatcher;
pub use sentence_encoder::{HuggingFaceEncoder, TextEncoder};
pub use similarity::{SimilarityEngine, SimilarityResult};
pub use vector_cache::VectorCache;
