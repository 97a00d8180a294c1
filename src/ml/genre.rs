use crate::error::Result;
use crate::ml::sentence_encoder::TextEncoder;
use crate::models::{BookRecord, GenreClassification};
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Sentinel returned when no category scores at all.
pub const UNKNOWN_GENRE: &str = "unknown";

/// A classification never reports more than this many candidate genres.
const MAX_GENRES: usize = 3;

/// Curated genre lexicon: category -> cue phrases counted as whole words.
const GENRE_CATEGORIES: &[(&str, &[&str])] = &[
    ("fiction", &["fiction", "novel", "story", "literature", "prose"]),
    (
        "non_fiction",
        &["non-fiction", "biography", "memoir", "autobiography", "history", "science"],
    ),
    (
        "fantasy",
        &["fantasy", "magic", "dragon", "wizard", "mythical", "epic", "quest"],
    ),
    (
        "science_fiction",
        &["science fiction", "sci-fi", "space", "future", "alien", "cyberpunk", "dystopian"],
    ),
    (
        "mystery",
        &["mystery", "crime", "detective", "thriller", "suspense", "noir", "whodunit"],
    ),
    (
        "romance",
        &["romance", "love", "relationship", "dating", "wedding", "passion"],
    ),
    (
        "horror",
        &["horror", "terror", "ghost", "haunted", "supernatural", "paranormal"],
    ),
    (
        "young_adult",
        &["young adult", "ya", "teen", "adolescent", "coming of age"],
    ),
    ("classic", &["classic", "literature", "canonical", "masterpiece"]),
    ("poetry", &["poetry", "poem", "verse", "rhyme", "sonnet"]),
    ("drama", &["drama", "play", "theater", "tragedy", "comedy", "stage"]),
    ("comedy", &["comedy", "humor", "funny", "satire", "parody", "wit"]),
    (
        "adventure",
        &["adventure", "action", "journey", "expedition", "quest", "exploration"],
    ),
    (
        "historical",
        &["historical", "history", "period", "era", "ancient", "medieval"],
    ),
    (
        "self_help",
        &["self-help", "self improvement", "motivational", "inspirational", "personal growth"],
    ),
    (
        "biography",
        &["biography", "memoir", "autobiography", "life story", "diary"],
    ),
    ("cooking", &["cooking", "recipe", "culinary", "food", "gastronomy"]),
    ("travel", &["travel", "guide", "journey", "exploration", "destination"]),
    (
        "business",
        &["business", "economics", "finance", "management", "entrepreneurship"],
    ),
];

struct CompiledCategory {
    name: &'static str,
    cues: Vec<Regex>,
}

lazy_static! {
    static ref COMPILED_CATEGORIES: Vec<CompiledCategory> = GENRE_CATEGORIES
        .iter()
        .map(|(name, cues)| CompiledCategory {
            name,
            cues: cues
                .iter()
                .map(|cue| {
                    Regex::new(&format!(r"\b{}\b", regex::escape(cue)))
                        .expect("static cue pattern must compile")
                })
                .collect(),
        })
        .collect();
}

/// Human-readable form of a category key ("science_fiction" -> "Science Fiction").
pub fn format_genre_name(genre: &str) -> String {
    genre
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Genre suggestion for a specific catalog entry.
#[derive(Debug, Clone, Serialize)]
pub struct GenreSuggestion {
    pub book_id: i64,
    pub title: String,
    pub existing_genre: String,
    pub suggested_genre: String,
    pub all_suggestions: Vec<String>,
    pub confidence_scores: HashMap<String, f32>,
    pub matches_existing: bool,
}

/// Keyword-lexicon genre classifier, with a side table of genre-label
/// embeddings to support embedding-based genre-to-book ranking.
pub struct GenreClassifier {
    encoder: Arc<dyn TextEncoder>,
    label_embeddings: RwLock<HashMap<String, Vec<f32>>>,
}

impl GenreClassifier {
    pub fn new(encoder: Arc<dyn TextEncoder>) -> Self {
        Self {
            encoder,
            label_embeddings: RwLock::new(HashMap::new()),
        }
    }

    /// Classify free text into genre categories.
    ///
    /// A category's raw score is how many cue occurrences appear as whole
    /// words in the lower-cased text; its confidence is the fraction of its
    /// distinct cues that matched. Categories that scored zero are dropped.
    pub fn classify(&self, text: &str) -> GenreClassification {
        let lower = text.to_lowercase();

        // (name, occurrence score, distinct matched cues, total cues)
        let mut scored: Vec<(&'static str, usize, usize, usize)> = Vec::new();

        for category in COMPILED_CATEGORIES.iter() {
            let mut occurrences = 0;
            let mut matched_cues = 0;

            for cue in &category.cues {
                let count = cue.find_iter(&lower).count();
                if count > 0 {
                    matched_cues += 1;
                    occurrences += count;
                }
            }

            if occurrences > 0 {
                scored.push((category.name, occurrences, matched_cues, category.cues.len()));
            }
        }

        // Stable sort: ties keep lexicon table order.
        scored.sort_by(|a, b| b.1.cmp(&a.1));
        scored.truncate(MAX_GENRES);

        let all_genres: Vec<String> = scored.iter().map(|(name, ..)| name.to_string()).collect();
        let confidence_scores: HashMap<String, f32> = scored
            .iter()
            .map(|(name, _, matched, total)| {
                (name.to_string(), (*matched as f32 / *total as f32).min(1.0))
            })
            .collect();

        let primary_genre = all_genres
            .first()
            .cloned()
            .unwrap_or_else(|| UNKNOWN_GENRE.to_string());
        let suggested_genre = format_genre_name(&primary_genre);

        GenreClassification {
            primary_genre,
            all_genres,
            confidence_scores,
            suggested_genre,
        }
    }

    /// Classify a book from its combined title, synopsis and stored genre.
    pub fn classify_book(&self, book: &BookRecord) -> GenreClassification {
        let mut parts = Vec::new();
        if !book.title.is_empty() {
            parts.push(book.title.as_str());
        }
        if !book.synopsis.is_empty() {
            parts.push(book.synopsis.as_str());
        }
        if !book.genre.is_empty() {
            parts.push(book.genre.as_str());
        }
        self.classify(&parts.join(" "))
    }

    /// Classification plus a comparison against the book's stored genre.
    pub fn suggest_genre(&self, book: &BookRecord) -> GenreSuggestion {
        let classification = self.classify_book(book);
        let matches_existing = !book.genre.is_empty()
            && book
                .genre
                .to_lowercase()
                .contains(&classification.suggested_genre.to_lowercase());

        GenreSuggestion {
            book_id: book.id,
            title: book.title.clone(),
            existing_genre: book.genre.clone(),
            suggested_genre: classification.suggested_genre.clone(),
            all_suggestions: classification
                .all_genres
                .iter()
                .map(|g| format_genre_name(g))
                .collect(),
            confidence_scores: classification.confidence_scores,
            matches_existing,
        }
    }

    /// Embedding of a bare genre label, memoized per label. Used to rank
    /// book embeddings against a target genre.
    pub async fn embed_genre(&self, genre: &str) -> Result<Vec<f32>> {
        if let Ok(memo) = self.label_embeddings.read() {
            if let Some(embedding) = memo.get(genre) {
                return Ok(embedding.clone());
            }
        }

        debug!("Embedding genre label '{}'", genre);
        let embedding = self.encoder.encode(genre).await?;
        if let Ok(mut memo) = self.label_embeddings.write() {
            memo.insert(genre.to_string(), embedding.clone());
        }
        Ok(embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::sentence_encoder::stub::StubEncoder;

    fn classifier() -> GenreClassifier {
        GenreClassifier::new(Arc::new(StubEncoder::new(4)))
    }

    #[test]
    fn classify_counts_whole_words_only() {
        let c = classifier();
        // "dragonfly" must not count as the fantasy cue "dragon".
        let result = c.classify("a dragonfly hovered over the pond");
        assert_eq!(result.primary_genre, UNKNOWN_GENRE);

        let result = c.classify("a dragon and a wizard on an epic quest");
        assert_eq!(result.primary_genre, "fantasy");
    }

    #[test]
    fn classify_ranks_by_occurrence_count() {
        let c = classifier();
        let result = c.classify("magic magic magic dragon, with one detective");
        assert_eq!(result.primary_genre, "fantasy");
        assert!(result.all_genres.contains(&"mystery".to_string()));
        assert!(result.all_genres.len() <= 3);
    }

    #[test]
    fn confidences_are_bounded_and_primary_absent_only_when_nothing_scored() {
        let c = classifier();
        let result = c.classify("love and romance at a wedding, a real passion story");
        assert_eq!(result.primary_genre, "romance");
        for confidence in result.confidence_scores.values() {
            assert!((0.0..=1.0).contains(confidence));
        }

        let empty = c.classify("zzz qqq");
        assert_eq!(empty.primary_genre, UNKNOWN_GENRE);
        assert!(empty.all_genres.is_empty());
        assert!(empty.confidence_scores.is_empty());
    }

    #[test]
    fn format_genre_name_title_cases_categories() {
        assert_eq!(format_genre_name("science_fiction"), "Science Fiction");
        assert_eq!(format_genre_name("fantasy"), "Fantasy");
        assert_eq!(format_genre_name("unknown"), "Unknown");
    }

    #[test]
    fn suggest_genre_flags_agreement_with_stored_genre() {
        let c = classifier();
        let book = BookRecord {
            id: 7,
            title: "The Haunted House".to_string(),
            author: "A. Writer".to_string(),
            synopsis: "A ghost terrorizes a haunted mansion. Pure horror.".to_string(),
            genre: "Horror".to_string(),
            rating: 4.0,
            cover_url: None,
            publisher: None,
            published_date: None,
            date_added: None,
        };

        let suggestion = c.suggest_genre(&book);
        assert_eq!(suggestion.suggested_genre, "Horror");
        assert!(suggestion.matches_existing);
    }

    #[tokio::test]
    async fn embed_genre_memoizes_per_label() {
        let encoder = Arc::new(StubEncoder::new(4));
        let c = GenreClassifier::new(encoder.clone());

        let first = c.embed_genre("fantasy").await.unwrap();
        let second = c.embed_genre("fantasy").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(encoder.call_count(), 1);

        c.embed_genre("mystery").await.unwrap();
        assert_eq!(encoder.call_count(), 2);
    }
}
