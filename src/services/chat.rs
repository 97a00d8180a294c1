use crate::error::Result;
use crate::ml::IntentMatcher;
use crate::ml::intent::IntentMatch;
use crate::models::ChatReply;
use crate::services::RecommendationService;
use crate::store::BookStore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

/// Synopsis previews in chat replies are cut at this many characters.
const SUMMARY_PREVIEW_CHARS: usize = 300;

/// Genre chips offered when a recommendation request names no genre.
const GENRE_SUGGESTIONS: &[&str] = &["Fiction", "Fantasy", "Mystery", "Sci-Fi", "Romance"];

/// Conversational front end over the intent matcher, the recommender and
/// the book store. Every message produces a well-formed reply; store or
/// model failures degrade to the unknown-intent response instead of
/// surfacing an error to the caller.
pub struct ChatService {
    matcher: Arc<IntentMatcher>,
    recommender: Arc<RecommendationService>,
    store: Arc<dyn BookStore>,
}

/// Pick one of several canned responses without dragging in an RNG.
fn pick_response(responses: &[String]) -> String {
    if responses.is_empty() {
        return String::new();
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0) as usize;
    responses[nanos % responses.len()].clone()
}

impl ChatService {
    pub fn new(
        matcher: Arc<IntentMatcher>,
        recommender: Arc<RecommendationService>,
        store: Arc<dyn BookStore>,
    ) -> Self {
        Self {
            matcher,
            recommender,
            store,
        }
    }

    /// Classify a message, dispatch on the intent and assemble the reply.
    pub async fn process_message(&self, text: &str, user_id: &str) -> ChatReply {
        info!("Processing chat message from {}", user_id);

        let intent = self.matcher.classify(text).await;
        let entities = self.matcher.extract_entities(text);

        let mut reply = match self.respond(&intent, &entities, user_id).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Chat dispatch for intent '{}' failed: {}", intent.intent, e);
                ChatReply {
                    text: pick_response(&IntentMatch::unknown().responses),
                    ..ChatReply::default()
                }
            }
        };

        reply.intent = intent.intent;
        reply.confidence = intent.confidence;
        reply.entities = entities;
        reply.timestamp = chrono::Utc::now().to_rfc3339();
        reply
    }

    async fn respond(
        &self,
        intent: &IntentMatch,
        entities: &HashMap<String, String>,
        user_id: &str,
    ) -> Result<ChatReply> {
        let base = pick_response(&intent.responses);
        let mut reply = ChatReply {
            text: base.clone(),
            ..ChatReply::default()
        };

        match intent.intent.as_str() {
            "greeting" => {
                if let Some(name) = self.matcher.get_context(user_id, "name") {
                    reply.text = format!("Hello {}! {}", name, base);
                }
            }

            "recommendation" => match entities.get("genre") {
                Some(genre) => {
                    let scored = self.recommender.recommend_by_genre(genre, 3).await?;
                    if scored.is_empty() {
                        reply.text = format!(
                            "I couldn't find any {} books in our library. Try another genre!",
                            genre
                        );
                    } else {
                        reply.text = format!("Here are some {} books you might enjoy:", genre);
                        reply.books = scored.into_iter().map(|s| s.book).collect();
                        reply.reply_type = "book_list".to_string();
                        self.matcher.set_context(user_id, "last_genre", genre);
                    }
                }
                None => {
                    reply.suggestions =
                        GENRE_SUGGESTIONS.iter().map(|s| s.to_string()).collect();
                }
            },

            "search" => {
                let title = entities.get("title").map(String::as_str);
                let author = entities.get("author").map(String::as_str);
                if title.is_some() || author.is_some() {
                    let results = self.store.search_books(title, author, 5).await?;
                    if results.is_empty() {
                        reply.text =
                            "I couldn't find any books matching your search.".to_string();
                    } else {
                        reply.text = format!("I found {} book(s):", results.len());
                        reply.books = results;
                        reply.reply_type = "book_list".to_string();
                    }
                } else {
                    reply.text = "What would you like to search for? Tell me a book title or author name."
                        .to_string();
                }
            }

            "genres" => {
                let genres = self.store.all_genres().await?;
                if !genres.is_empty() {
                    let listed: Vec<&str> =
                        genres.iter().take(10).map(String::as_str).collect();
                    reply.text =
                        format!("We have books in these genres: {}", listed.join(", "));
                    reply.suggestions = genres.into_iter().take(5).collect();
                }
            }

            "rating" => {
                let title = entities
                    .get("title")
                    .cloned()
                    .or_else(|| self.matcher.get_context(user_id, "last_book"));
                match title {
                    Some(title) => {
                        reply.text = match self.store.book_rating_by_title(&title).await? {
                            Some(rating) => {
                                format!("'{}' has a rating of {}/5", title, rating)
                            }
                            None => format!(
                                "I couldn't find rating information for '{}'.",
                                title
                            ),
                        };
                    }
                    None => {
                        reply.text = "Which book's rating would you like to know?".to_string();
                    }
                }
            }

            "popular" => {
                let books = self.recommender.recommend_popular(5).await?;
                if !books.is_empty() {
                    reply.text = "Here are our most popular books:".to_string();
                    reply.books = books;
                    reply.reply_type = "book_list".to_string();
                }
            }

            "library_info" => {
                let stats = self.store.library_stats().await?;
                reply.text = format!(
                    "Our library has {} books across {} genres. The average rating is {:.1}/5.",
                    stats.total_books, stats.total_genres, stats.avg_rating
                );
            }

            "author" => match entities.get("author") {
                Some(author) => {
                    let books = self.store.books_by_author(author, 5).await?;
                    if books.is_empty() {
                        reply.text = format!("I couldn't find any books by {}.", author);
                    } else {
                        reply.text = format!("Books by {}:", author);
                        reply.books = books;
                        reply.reply_type = "book_list".to_string();
                    }
                }
                None => {
                    reply.text = "Which author are you looking for?".to_string();
                }
            },

            "summary" => match entities.get("title") {
                Some(title) => match self.store.synopsis_by_title(title).await? {
                    Some(synopsis) => {
                        let preview: String =
                            synopsis.chars().take(SUMMARY_PREVIEW_CHARS).collect();
                        reply.text = format!("Summary of '{}':\n\n{}...", title, preview);
                        if synopsis.chars().count() > SUMMARY_PREVIEW_CHARS {
                            reply.text.push_str("\n\n[Ask for more details if you want!]");
                        }
                        self.matcher.set_context(user_id, "last_book", title);
                    }
                    None => {
                        reply.text =
                            format!("I don't have a summary for '{}' yet.", title);
                    }
                },
                None => {
                    reply.text = "Which book would you like a summary of?".to_string();
                }
            },

            // help, thanks and unknown speak for themselves.
            _ => {}
        }

        Ok(reply)
    }

    /// Starter questions shown in an empty chat window.
    pub fn get_suggestions(&self) -> Vec<String> {
        [
            "Recommend a fantasy book",
            "Search for books by Stephen King",
            "What are the top rated books?",
            "Tell me about mystery books",
            "How many books are in the library?",
            "Get a book summary",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }
}
