use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

pub use book::{BookRecord, RecommendedBook, ScoredBook};

mod book;

fn default_top_k() -> usize {
    10
}

/// Request for books similar to a catalog entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarRequest {
    pub book_id: i64,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

/// Request for personalized recommendations from signed ratings.
///
/// Ratings are keyed by book id in a `BTreeMap` so the "first N liked books"
/// seed selection is deterministic for a given input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonalizedRequest {
    pub ratings: BTreeMap<i64, f32>,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub preferred_genres: Vec<String>,
}

/// Free-text content search: any combination of fields may be present;
/// absent ones simply don't participate in the query embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentSearchRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub genre: String,
    #[serde(default)]
    pub synopsis: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonalizedResponse {
    pub analysis: Option<PreferenceAnalysis>,
    pub recommendations: Vec<RecommendedBook>,
}

/// Summary of a user's taste derived from their ratings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreferenceAnalysis {
    pub total_ratings: usize,
    pub liked_books: usize,
    pub disliked_books: usize,
    pub favorite_genres: Vec<LabelCount>,
    pub favorite_authors: Vec<LabelCount>,
    pub avg_liked_rating: f32,
    pub avg_disliked_rating: f32,
    pub preferred_genres: Vec<String>,
    pub preferred_authors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelCount {
    pub label: String,
    pub count: usize,
}

/// Outcome of keyword-based genre classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenreClassification {
    /// Top-ranked category, or `"unknown"` when nothing scored.
    pub primary_genre: String,
    /// All categories that scored, best first.
    pub all_genres: Vec<String>,
    /// Per-category confidence in [0, 1].
    pub confidence_scores: HashMap<String, f32>,
    /// `primary_genre` formatted for display ("science_fiction" -> "Science Fiction").
    pub suggested_genre: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// A chat turn's reply. Always well-formed: internal failures surface as the
/// unknown-intent fallback text, never as an error payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReply {
    pub text: String,
    #[serde(rename = "type")]
    pub reply_type: String,
    pub suggestions: Vec<String>,
    pub books: Vec<BookRecord>,
    pub intent: String,
    pub confidence: f32,
    pub entities: HashMap<String, String>,
    pub timestamp: String,
}

impl Default for ChatReply {
    fn default() -> Self {
        Self {
            text: String::new(),
            reply_type: "text".to_string(),
            suggestions: Vec::new(),
            books: Vec::new(),
            intent: String::new(),
            confidence: 0.0,
            entities: HashMap::new(),
            timestamp: String::new(),
        }
    }
}

/// Classifier-derived view of the whole catalog: how often each detected
/// genre occurs and how well books carrying it are rated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenreAnalysis {
    pub total_books: usize,
    pub genre_distribution: HashMap<String, usize>,
    pub top_genres: Vec<LabelCount>,
    pub avg_rating_by_genre: HashMap<String, f32>,
    pub unique_genres: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryStats {
    pub total_books: i64,
    pub total_genres: i64,
    pub avg_rating: f64,
}
