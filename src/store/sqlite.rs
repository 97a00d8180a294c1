use crate::error::Result;
use crate::models::{BookRecord, LibraryStats};
use crate::store::BookStore;
use async_trait::async_trait;
use chrono::Utc;
use log::info;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

const BOOK_COLUMNS: &str = "id, title, author, \
    COALESCE(synopsis, '') AS synopsis, \
    COALESCE(genre, '') AS genre, \
    COALESCE(rating, 0.0) AS rating, \
    cover_url, publisher, published_date, date_added";

/// SQLite-backed catalog. Embeddings are mirrored in a `book_embeddings`
/// table as little-endian f32 blobs so the per-book path never has to
/// re-derive a text cache key.
#[derive(Clone)]
pub struct SqliteBookStore {
    pool: SqlitePool,
}

fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn embedding_from_bytes(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
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

impl SqliteBookStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS books (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                author TEXT NOT NULL,
                synopsis TEXT,
                genre TEXT,
                rating REAL,
                cover_url TEXT,
                publisher TEXT,
                published_date TEXT,
                date_added TEXT
            )",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS book_embeddings (
                book_id INTEGER PRIMARY KEY,
                embedding BLOB,
                last_updated TEXT,
                FOREIGN KEY (book_id) REFERENCES books(id)
            )",
        )
        .execute(&pool)
        .await?;

        info!("Connected to book store at {}", database_url);
        Ok(Self { pool })
    }
}

#[async_trait]
impl BookStore for SqliteBookStore {
    async fn get_book(&self, id: i64) -> Result<Option<BookRecord>> {
        let book = sqlx::query_as::<_, BookRecord>(&format!(
            "SELECT {} FROM books WHERE id = ?",
            BOOK_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(book)
    }

    async fn all_books(&self, only_with_synopsis: bool) -> Result<Vec<BookRecord>> {
        let filter = if only_with_synopsis {
            " WHERE synopsis IS NOT NULL AND synopsis != ''"
        } else {
            ""
        };

        let books = sqlx::query_as::<_, BookRecord>(&format!(
            "SELECT {} FROM books{} ORDER BY id",
            BOOK_COLUMNS, filter
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(books)
    }

    async fn popular_books(&self, top_k: usize) -> Result<Vec<BookRecord>> {
        let books = sqlx::query_as::<_, BookRecord>(&format!(
            "SELECT {} FROM books WHERE rating >= 4.0 \
             ORDER BY rating DESC, date_added DESC LIMIT ?",
            BOOK_COLUMNS
        ))
        .bind(top_k as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(books)
    }

    async fn books_by_genre_like(&self, genre: &str, top_k: usize) -> Result<Vec<BookRecord>> {
        let books = sqlx::query_as::<_, BookRecord>(&format!(
            "SELECT {} FROM books WHERE genre LIKE ? OR genre LIKE ? \
             ORDER BY rating DESC LIMIT ?",
            BOOK_COLUMNS
        ))
        .bind(format!("%{}%", genre))
        .bind(format!("%{}%", title_case(genre)))
        .bind(top_k as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(books)
    }

    async fn search_books(
        &self,
        title: Option<&str>,
        author: Option<&str>,
        limit: usize,
    ) -> Result<Vec<BookRecord>> {
        let mut sql = format!("SELECT {} FROM books WHERE 1=1", BOOK_COLUMNS);
        if title.is_some() {
            sql.push_str(" AND title LIKE ?");
        }
        if author.is_some() {
            sql.push_str(" AND author LIKE ?");
        }
        sql.push_str(" LIMIT ?");

        let mut query = sqlx::query_as::<_, BookRecord>(&sql);
        if let Some(title) = title {
            query = query.bind(format!("%{}%", title));
        }
        if let Some(author) = author {
            query = query.bind(format!("%{}%", author));
        }
        let books = query.bind(limit as i64).fetch_all(&self.pool).await?;

        Ok(books)
    }

    async fn books_by_author(&self, author: &str, limit: usize) -> Result<Vec<BookRecord>> {
        let books = sqlx::query_as::<_, BookRecord>(&format!(
            "SELECT {} FROM books WHERE author LIKE ? ORDER BY rating DESC LIMIT ?",
            BOOK_COLUMNS
        ))
        .bind(format!("%{}%", author))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(books)
    }

    async fn all_genres(&self) -> Result<Vec<String>> {
        let genres: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT genre FROM books \
             WHERE genre IS NOT NULL AND genre != '' ORDER BY genre",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(genres)
    }

    async fn library_stats(&self) -> Result<LibraryStats> {
        let total_books: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM books")
            .fetch_one(&self.pool)
            .await?;

        let total_genres: i64 = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT genre) FROM books WHERE genre IS NOT NULL AND genre != ''",
        )
        .fetch_one(&self.pool)
        .await?;

        let avg_rating: Option<f64> =
            sqlx::query_scalar("SELECT AVG(rating) FROM books WHERE rating IS NOT NULL")
                .fetch_one(&self.pool)
                .await?;

        Ok(LibraryStats {
            total_books,
            total_genres,
            avg_rating: avg_rating.unwrap_or(0.0),
        })
    }

    async fn book_rating_by_title(&self, title: &str) -> Result<Option<f32>> {
        let rating: Option<f32> =
            sqlx::query_scalar("SELECT COALESCE(rating, 0.0) FROM books WHERE title LIKE ?")
                .bind(format!("%{}%", title))
                .fetch_optional(&self.pool)
                .await?;

        Ok(rating)
    }

    async fn synopsis_by_title(&self, title: &str) -> Result<Option<String>> {
        let synopsis: Option<String> =
            sqlx::query_scalar("SELECT COALESCE(synopsis, '') FROM books WHERE title LIKE ?")
                .bind(format!("%{}%", title))
                .fetch_optional(&self.pool)
                .await?;

        Ok(synopsis.filter(|s| !s.is_empty()))
    }

    async fn update_genre(&self, id: i64, genre: &str) -> Result<()> {
        sqlx::query("UPDATE books SET genre = ? WHERE id = ?")
            .bind(genre)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn put_embedding(&self, id: i64, embedding: &[f32]) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO book_embeddings (book_id, embedding, last_updated) \
             VALUES (?, ?, ?)",
        )
        .bind(id)
        .bind(embedding_to_bytes(embedding))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_embeddings(&self) -> Result<HashMap<i64, Vec<f32>>> {
        let rows = sqlx::query("SELECT book_id, embedding FROM book_embeddings")
            .fetch_all(&self.pool)
            .await?;

        let mut embeddings = HashMap::with_capacity(rows.len());
        for row in rows {
            let book_id: i64 = row.try_get("book_id")?;
            let bytes: Vec<u8> = row.try_get("embedding")?;
            embeddings.insert(book_id, embedding_from_bytes(&bytes));
        }

        Ok(embeddings)
    }
}
