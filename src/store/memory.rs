use crate::error::Result;
use crate::models::{BookRecord, LibraryStats};
use crate::store::BookStore;
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory catalog with the same query semantics as the SQLite store.
/// Used by tests and local development.
#[derive(Default)]
pub struct MemoryBookStore {
    books: RwLock<Vec<BookRecord>>,
    embeddings: RwLock<HashMap<i64, Vec<f32>>>,
}

impl MemoryBookStore {
    pub fn new(books: Vec<BookRecord>) -> Self {
        Self {
            books: RwLock::new(books),
            embeddings: RwLock::new(HashMap::new()),
        }
    }

    fn snapshot(&self) -> Vec<BookRecord> {
        self.books.read().map(|b| b.clone()).unwrap_or_default()
    }

    fn contains_ci(haystack: &str, needle: &str) -> bool {
        haystack.to_lowercase().contains(&needle.to_lowercase())
    }
}

#[async_trait]
impl BookStore for MemoryBookStore {
    async fn get_book(&self, id: i64) -> Result<Option<BookRecord>> {
        Ok(self.snapshot().into_iter().find(|b| b.id == id))
    }

    async fn all_books(&self, only_with_synopsis: bool) -> Result<Vec<BookRecord>> {
        let mut books = self.snapshot();
        if only_with_synopsis {
            books.retain(|b| b.has_synopsis());
        }
        books.sort_by_key(|b| b.id);
        Ok(books)
    }

    async fn popular_books(&self, top_k: usize) -> Result<Vec<BookRecord>> {
        let mut books = self.snapshot();
        books.retain(|b| b.rating >= 4.0);
        books.sort_by(|a, b| {
            b.rating
                .partial_cmp(&a.rating)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.date_added.cmp(&a.date_added))
        });
        books.truncate(top_k);
        Ok(books)
    }

    async fn books_by_genre_like(&self, genre: &str, top_k: usize) -> Result<Vec<BookRecord>> {
        let mut books = self.snapshot();
        books.retain(|b| Self::contains_ci(&b.genre, genre));
        books.sort_by(|a, b| b.rating.partial_cmp(&a.rating).unwrap_or(Ordering::Equal));
        books.truncate(top_k);
        Ok(books)
    }

    async fn search_books(
        &self,
        title: Option<&str>,
        author: Option<&str>,
        limit: usize,
    ) -> Result<Vec<BookRecord>> {
        let mut books = self.snapshot();
        if let Some(title) = title {
            books.retain(|b| Self::contains_ci(&b.title, title));
        }
        if let Some(author) = author {
            books.retain(|b| Self::contains_ci(&b.author, author));
        }
        books.truncate(limit);
        Ok(books)
    }

    async fn books_by_author(&self, author: &str, limit: usize) -> Result<Vec<BookRecord>> {
        let mut books = self.snapshot();
        books.retain(|b| Self::contains_ci(&b.author, author));
        books.sort_by(|a, b| b.rating.partial_cmp(&a.rating).unwrap_or(Ordering::Equal));
        books.truncate(limit);
        Ok(books)
    }

    async fn all_genres(&self) -> Result<Vec<String>> {
        let mut genres: Vec<String> = self
            .snapshot()
            .into_iter()
            .map(|b| b.genre)
            .filter(|g| !g.is_empty())
            .collect();
        genres.sort();
        genres.dedup();
        Ok(genres)
    }

    async fn library_stats(&self) -> Result<LibraryStats> {
        let books = self.snapshot();
        let rated: Vec<f32> = books
            .iter()
            .filter(|b| b.rating > 0.0)
            .map(|b| b.rating)
            .collect();
        let avg_rating = if rated.is_empty() {
            0.0
        } else {
            rated.iter().sum::<f32>() as f64 / rated.len() as f64
        };

        let mut genres: Vec<&str> = books
            .iter()
            .map(|b| b.genre.as_str())
            .filter(|g| !g.is_empty())
            .collect();
        genres.sort();
        genres.dedup();

        Ok(LibraryStats {
            total_books: books.len() as i64,
            total_genres: genres.len() as i64,
            avg_rating,
        })
    }

    async fn book_rating_by_title(&self, title: &str) -> Result<Option<f32>> {
        Ok(self
            .snapshot()
            .into_iter()
            .find(|b| Self::contains_ci(&b.title, title))
            .map(|b| b.rating))
    }

    async fn synopsis_by_title(&self, title: &str) -> Result<Option<String>> {
        Ok(self
            .snapshot()
            .into_iter()
            .find(|b| Self::contains_ci(&b.title, title) && b.has_synopsis())
            .map(|b| b.synopsis))
    }

    async fn update_genre(&self, id: i64, genre: &str) -> Result<()> {
        if let Ok(mut books) = self.books.write() {
            if let Some(book) = books.iter_mut().find(|b| b.id == id) {
                book.genre = genre.to_string();
            }
        }
        Ok(())
    }

    async fn put_embedding(&self, id: i64, embedding: &[f32]) -> Result<()> {
        if let Ok(mut map) = self.embeddings.write() {
            map.insert(id, embedding.to_vec());
        }
        Ok(())
    }

    async fn load_embeddings(&self) -> Result<HashMap<i64, Vec<f32>>> {
        Ok(self
            .embeddings
            .read()
            .map(|m| m.clone())
            .unwrap_or_default())
    }
}
