use crate::error::Result;
use crate::ml::sentence_encoder::TextEncoder;
use crate::ml::similarity::cosine;
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

/// Intent label returned when nothing matches.
pub const UNKNOWN_INTENT: &str = "unknown";

/// Embedding-similarity floor below which a query is treated as unknown.
/// A hard threshold, not tunable per call.
const INTENT_SIMILARITY_THRESHOLD: f32 = 0.3;

/// Confidence assigned to short-input keyword matches.
const KEYWORD_MATCH_CONFIDENCE: f32 = 0.9;

/// One conversational intent: its trigger phrases and canned responses.
/// Static configuration, immutable for the process lifetime.
#[derive(Debug, Clone)]
pub struct IntentDefinition {
    pub intent: &'static str,
    pub patterns: &'static [&'static str],
    pub responses: &'static [&'static str],
}

const INTENTS: &[IntentDefinition] = &[
    IntentDefinition {
        intent: "greeting",
        patterns: &["hello", "hi", "hey", "greetings", "good morning"],
        responses: &[
            "Hello! How can I help you with books today?",
            "Hi there! Looking for a good book?",
        ],
    },
    IntentDefinition {
        intent: "recommendation",
        patterns: &["recommend", "suggest", "what should i read", "find me a book"],
        responses: &[
            "I'd love to recommend some books! What genre are you interested in?",
            "Tell me what kind of books you like, and I'll suggest some!",
        ],
    },
    IntentDefinition {
        intent: "search",
        patterns: &["search", "find", "look for", "where can i find"],
        responses: &[
            "I can help you search for books. What's the title or author you're looking for?",
        ],
    },
    IntentDefinition {
        intent: "genres",
        patterns: &["genre", "type", "category", "what genres"],
        responses: &[
            "We have books in various genres: Fiction, Fantasy, Sci-Fi, Mystery, Romance, Non-fiction. Which interests you?",
        ],
    },
    IntentDefinition {
        intent: "rating",
        patterns: &["rate", "rating", "how good", "is it good"],
        responses: &["I can tell you about book ratings. Which book are you curious about?"],
    },
    IntentDefinition {
        intent: "author",
        patterns: &["author", "who wrote", "writer"],
        responses: &[
            "I can help you find books by specific authors. Which author are you interested in?",
        ],
    },
    IntentDefinition {
        intent: "summary",
        patterns: &["summary", "synopsis", "what is about", "plot"],
        responses: &[
            "I can give you a summary of any book in our library. Which book would you like to know about?",
        ],
    },
    IntentDefinition {
        intent: "help",
        patterns: &["help", "what can you do", "capabilities"],
        responses: &[
            "I can help you: search for books, get recommendations, check ratings, find authors, read summaries, and browse by genre.",
        ],
    },
    IntentDefinition {
        intent: "thanks",
        patterns: &["thanks", "thank you", "appreciate", "bye", "goodbye"],
        responses: &[
            "You're welcome! Happy reading!",
            "Glad I could help! Come back anytime!",
        ],
    },
    IntentDefinition {
        intent: "popular",
        patterns: &["popular", "trending", "best sellers", "top books"],
        responses: &["I can show you our most popular books. Would you like to see them?"],
    },
    IntentDefinition {
        intent: "library_info",
        patterns: &["how many books", "library size", "collection"],
        responses: &["Let me check our library collection for you..."],
    },
];

const UNKNOWN_RESPONSES: &[&str] = &[
    "I'm not sure I understand. Could you rephrase that?",
    "I'm here to help with books! Try asking about recommendations, genres, or searching for books.",
];

/// Genre vocabulary scanned for during entity extraction. First substring
/// hit wins, so compound labels must precede their suffixes ("science
/// fiction" before "fiction").
const ENTITY_GENRES: &[&str] = &[
    "science fiction",
    "non-fiction",
    "fiction",
    "fantasy",
    "sci-fi",
    "mystery",
    "romance",
    "thriller",
    "horror",
    "biography",
    "history",
    "science",
    "technology",
];

/// Author-introducing phrases, most specific first.
const AUTHOR_KEYWORDS: &[&str] = &["written by", "author", "by"];

static NORMALIZE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\s?!.]").expect("static pattern"));
static QUOTED_TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""([^"]*)""#).expect("static pattern"));

/// The outcome of intent classification.
#[derive(Debug, Clone)]
pub struct IntentMatch {
    pub intent: String,
    pub confidence: f32,
    pub responses: Vec<String>,
}

impl IntentMatch {
    pub fn unknown() -> Self {
        Self {
            intent: UNKNOWN_INTENT.to_string(),
            confidence: 0.0,
            responses: UNKNOWN_RESPONSES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

struct UserContext {
    values: HashMap<String, String>,
    last_seen: Instant,
}

/// Per-user conversational key/value memory.
///
/// The store is bounded: entries idle longer than the TTL are evicted on
/// write, and when the user count hits the cap the longest-idle user is
/// dropped to make room.
pub struct ContextStore {
    inner: Mutex<HashMap<String, UserContext>>,
    max_users: usize,
    ttl: Duration,
}

impl ContextStore {
    pub fn new(max_users: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            max_users,
            ttl,
        }
    }

    pub fn set(&self, user_id: &str, key: &str, value: &str) {
        let Ok(mut users) = self.inner.lock() else {
            return;
        };

        users.retain(|_, ctx| ctx.last_seen.elapsed() <= self.ttl);

        if !users.contains_key(user_id) && users.len() >= self.max_users {
            if let Some(oldest) = users
                .iter()
                .max_by_key(|(_, ctx)| ctx.last_seen.elapsed())
                .map(|(id, _)| id.clone())
            {
                users.remove(&oldest);
            }
        }

        let ctx = users.entry(user_id.to_string()).or_insert_with(|| UserContext {
            values: HashMap::new(),
            last_seen: Instant::now(),
        });
        ctx.values.insert(key.to_string(), value.to_string());
        ctx.last_seen = Instant::now();
    }

    pub fn get(&self, user_id: &str, key: &str) -> Option<String> {
        let users = self.inner.lock().ok()?;
        let ctx = users.get(user_id)?;
        if ctx.last_seen.elapsed() > self.ttl {
            return None;
        }
        ctx.values.get(key).cloned()
    }
}

/// Two-tier free-text intent classifier: exact keyword matching for short
/// inputs, embedding similarity against per-intent trigger phrases for the
/// rest. Also owns lightweight entity extraction and per-user context.
pub struct IntentMatcher {
    encoder: Arc<dyn TextEncoder>,
    intents: Vec<IntentDefinition>,
    // Trigger-phrase embeddings, computed once per intent.
    pattern_embeddings: RwLock<HashMap<&'static str, Vec<Vec<f32>>>>,
    context: ContextStore,
}

impl IntentMatcher {
    pub fn new(encoder: Arc<dyn TextEncoder>, max_users: usize, context_ttl: Duration) -> Self {
        Self::with_intents(encoder, INTENTS.to_vec(), max_users, context_ttl)
    }

    fn with_intents(
        encoder: Arc<dyn TextEncoder>,
        intents: Vec<IntentDefinition>,
        max_users: usize,
        context_ttl: Duration,
    ) -> Self {
        Self {
            encoder,
            intents,
            pattern_embeddings: RwLock::new(HashMap::new()),
            context: ContextStore::new(max_users, context_ttl),
        }
    }

    /// Lower-case, trim, and strip everything except word characters,
    /// whitespace and `?`, `!`, `.`.
    pub fn normalize(text: &str) -> String {
        let lowered = text.to_lowercase();
        NORMALIZE_RE.replace_all(&lowered, "").trim().to_string()
    }

    /// Classify free text into one of the configured intents.
    ///
    /// Inputs shorter than two tokens go through substring matching against
    /// trigger phrases (first hit wins at fixed confidence 0.9). Longer
    /// inputs are matched by maximum embedding similarity against each
    /// intent's phrases; a global best below the threshold, or an encoder
    /// failure, yields the unknown intent at confidence 0.0.
    pub async fn classify(&self, text: &str) -> IntentMatch {
        let normalized = Self::normalize(text);

        if normalized.split_whitespace().count() < 2 {
            for intent in &self.intents {
                for pattern in intent.patterns {
                    if normalized.contains(pattern) {
                        return IntentMatch {
                            intent: intent.intent.to_string(),
                            confidence: KEYWORD_MATCH_CONFIDENCE,
                            responses: intent.responses.iter().map(|s| s.to_string()).collect(),
                        };
                    }
                }
            }
        }

        let input_embedding = match self.encoder.encode(&normalized).await {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!("Intent classification falling back to unknown: {}", e);
                return IntentMatch::unknown();
            }
        };

        let mut best: Option<(&IntentDefinition, f32)> = None;

        for intent in &self.intents {
            let patterns = match self.patterns_for(intent).await {
                Ok(patterns) => patterns,
                Err(e) => {
                    warn!("Could not embed patterns for intent '{}': {}", intent.intent, e);
                    continue;
                }
            };

            let score = patterns
                .iter()
                .filter_map(|p| cosine(&input_embedding, p).ok())
                .fold(f32::NEG_INFINITY, f32::max);

            if score.is_finite() && best.map_or(true, |(_, s)| score > s) {
                best = Some((intent, score));
            }
        }

        match best {
            Some((intent, score)) if score > INTENT_SIMILARITY_THRESHOLD => {
                debug!("Matched intent '{}' at {:.3}", intent.intent, score);
                IntentMatch {
                    intent: intent.intent.to_string(),
                    confidence: score,
                    responses: intent.responses.iter().map(|s| s.to_string()).collect(),
                }
            }
            _ => IntentMatch::unknown(),
        }
    }

    async fn patterns_for(&self, intent: &IntentDefinition) -> Result<Vec<Vec<f32>>> {
        if let Ok(memo) = self.pattern_embeddings.read() {
            if let Some(embeddings) = memo.get(intent.intent) {
                return Ok(embeddings.clone());
            }
        }

        let mut embeddings = Vec::with_capacity(intent.patterns.len());
        for pattern in intent.patterns {
            embeddings.push(self.encoder.encode(pattern).await?);
        }

        if let Ok(mut memo) = self.pattern_embeddings.write() {
            memo.insert(intent.intent, embeddings.clone());
        }
        Ok(embeddings)
    }

    /// Extract genre / author / title entities from free text. All three
    /// extractions run unconditionally and may all fire on one input.
    pub fn extract_entities(&self, text: &str) -> HashMap<String, String> {
        let mut entities = HashMap::new();
        let lower = text.to_lowercase();

        for genre in ENTITY_GENRES {
            if lower.contains(genre) {
                entities.insert("genre".to_string(), genre.to_string());
                break;
            }
        }

        for keyword in AUTHOR_KEYWORDS {
            if let Some((_, rest)) = lower.split_once(keyword) {
                let author = rest.trim();
                if !author.is_empty() {
                    entities.insert("author".to_string(), author.to_string());
                    break;
                }
            }
        }

        if let Some(captures) = QUOTED_TITLE_RE.captures(text) {
            entities.insert("title".to_string(), captures[1].to_string());
        }

        entities
    }

    pub fn set_context(&self, user_id: &str, key: &str, value: &str) {
        self.context.set(user_id, key, value);
    }

    pub fn get_context(&self, user_id: &str, key: &str) -> Option<String> {
        self.context.get(user_id, key)
    }
}
