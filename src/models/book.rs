use serde::{Deserialize, Serialize};

fn default_rating() -> f32 {
    0.0
}

/// A catalog entry as stored in the book store.
///
/// Empty strings stand for absent text fields and a rating of 0.0 stands
/// for an unrated book, matching the catalog's storage conventions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct BookRecord {
    pub id: i64,
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub synopsis: String,
    #[serde(default)]
    pub genre: String,
    #[serde(default = "default_rating")]
    pub rating: f32,
    #[serde(default)]
    pub cover_url: Option<String>,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub published_date: Option<String>,
    #[serde(default)]
    pub date_added: Option<String>,
}

impl BookRecord {
    pub fn has_synopsis(&self) -> bool {
        !self.synopsis.trim().is_empty()
    }
}

/// A book joined with the similarity score that surfaced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredBook {
    #[serde(flatten)]
    pub book: BookRecord,
    pub similarity_score: f32,
    /// `round(similarity * 100)`, for display.
    pub match_percentage: i32,
}

/// A book surfaced by the personalized ranking, with its accumulated score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendedBook {
    #[serde(flatten)]
    pub book: BookRecord,
    pub recommendation_score: f32,
    #[serde(default)]
    pub genre_match: bool,
}
