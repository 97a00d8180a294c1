use crate::error::Result;
use crate::models::{BookRecord, LibraryStats};
use async_trait::async_trait;
use std::collections::HashMap;

pub use memory::MemoryBookStore;
pub use sqlite::SqliteBookStore;

pub mod memory;
pub mod sqlite;

/// The catalog boundary. The recommendation core only reads book records
/// and writes back two things: auto-classified genres and the per-id
/// embedding mirror used by the "similar to this exact book" path.
#[async_trait]
pub trait BookStore: Send + Sync {
    async fn get_book(&self, id: i64) -> Result<Option<BookRecord>>;

    /// All records, optionally restricted to those with a non-empty synopsis.
    async fn all_books(&self, only_with_synopsis: bool) -> Result<Vec<BookRecord>>;

    /// Records rated at least 4.0, ordered rating descending then most
    /// recently added first.
    async fn popular_books(&self, top_k: usize) -> Result<Vec<BookRecord>>;

    /// Substring match on the stored genre field, best-rated first.
    async fn books_by_genre_like(&self, genre: &str, top_k: usize) -> Result<Vec<BookRecord>>;

    async fn search_books(
        &self,
        title: Option<&str>,
        author: Option<&str>,
        limit: usize,
    ) -> Result<Vec<BookRecord>>;

    async fn books_by_author(&self, author: &str, limit: usize) -> Result<Vec<BookRecord>>;

    async fn all_genres(&self) -> Result<Vec<String>>;

    async fn library_stats(&self) -> Result<LibraryStats>;

    async fn book_rating_by_title(&self, title: &str) -> Result<Option<f32>>;

    async fn synopsis_by_title(&self, title: &str) -> Result<Option<String>>;

    async fn update_genre(&self, id: i64, genre: &str) -> Result<()>;

    /// Mirror a book's embedding into durable storage, keyed by id.
    async fn put_embedding(&self, id: i64, embedding: &[f32]) -> Result<()>;

    /// Restore the id -> embedding mirror.
    async fn load_embeddings(&self) -> Result<HashMap<i64, Vec<f32>>>;
}
