use crate::error::Result;
use crate::ml::sentence_encoder::TextEncoder;
use crate::ml::vector_cache::{cache_key, VectorCache};
use crate::models::BookRecord;
use crate::store::BookStore;
use indicatif::ProgressBar;
use log::{info, warn};
use std::collections::HashMap;
use std::sync::Arc;

/// Maximum number of synopsis characters that participate in the blob.
const MAX_SYNOPSIS_CHARS: usize = 500;

/// Concatenate the present fields, each prefixed with its label, in fixed
/// order. Absent fields are omitted entirely rather than contributing an
/// empty label.
pub fn build_embedding_text(title: &str, author: &str, genre: &str, synopsis: &str) -> String {
    let mut parts = Vec::new();

    if !title.trim().is_empty() {
        parts.push(format!("Title: {}", title));
    }
    if !author.trim().is_empty() {
        parts.push(format!("Author: {}", author));
    }
    if !genre.trim().is_empty() {
        parts.push(format!("Genre: {}", genre));
    }
    if !synopsis.trim().is_empty() {
        let clipped: String = synopsis.chars().take(MAX_SYNOPSIS_CHARS).collect();
        parts.push(format!("Synopsis: {}", clipped));
    }

    parts.join(" ")
}

/// Turns book records into embeddings, going through the vector cache so an
/// unchanged book is never re-encoded.
pub struct EmbeddingGenerator {
    encoder: Arc<dyn TextEncoder>,
    cache: Arc<VectorCache>,
}

impl EmbeddingGenerator {
    pub fn new(encoder: Arc<dyn TextEncoder>, cache: Arc<VectorCache>) -> Self {
        Self { encoder, cache }
    }

    pub fn dimension(&self) -> usize {
        self.encoder.dimension()
    }

    pub fn cache(&self) -> &VectorCache {
        &self.cache
    }

    /// Embed one book, serving from the cache when its derived text is
    /// unchanged. A book with no embeddable text at all gets the zero
    /// vector instead of a model call.
    pub async fn embed(&self, book: &BookRecord) -> Result<Vec<f32>> {
        let text = build_embedding_text(&book.title, &book.author, &book.genre, &book.synopsis);
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.encoder.dimension()]);
        }

        let key = cache_key(&book.title, &book.author, &book.synopsis);
        if let Some(embedding) = self.cache.get(&key) {
            return Ok(embedding);
        }

        let embedding = self.encoder.encode(&text).await?;
        self.cache.put(key, embedding.clone());
        Ok(embedding)
    }

    /// Embed freeform fields directly, bypassing the cache: ad-hoc queries
    /// have no stable identity to key on.
    pub async fn embed_text(
        &self,
        title: &str,
        author: &str,
        genre: &str,
        synopsis: &str,
    ) -> Result<Vec<f32>> {
        let text = build_embedding_text(title, author, genre, synopsis);
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.encoder.dimension()]);
        }
        self.encoder.encode(&text).await
    }

    /// Embed every catalog record that has a synopsis, mirroring each
    /// vector to the store's per-id table and persisting the cache once at
    /// the end. Records without a synopsis are skipped outright, not
    /// embedded with a fallback.
    ///
    /// Not incremental: the whole store is re-scanned each run, with
    /// unchanged books served from the cache.
    pub async fn embed_all(&self, store: &dyn BookStore) -> Result<HashMap<i64, Vec<f32>>> {
        let books = store.all_books(true).await?;
        if books.is_empty() {
            info!("No books with a synopsis to embed");
            return Ok(HashMap::new());
        }

        info!("Generating embeddings for {} books...", books.len());
        let bar = ProgressBar::new(books.len() as u64);
        let mut embeddings = HashMap::with_capacity(books.len());

        for (i, book) in books.iter().enumerate() {
            match self.embed(book).await {
                Ok(embedding) => {
                    store.put_embedding(book.id, &embedding).await?;
                    embeddings.insert(book.id, embedding);
                }
                Err(e) => {
                    warn!("Error generating embedding for book {}: {}", book.id, e);
                }
            }

            bar.inc(1);
            if i % 10 == 0 {
                info!("Processed {}/{} books", i, books.len());
            }
        }
        bar.finish();

        self.cache.persist()?;
        Ok(embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::sentence_encoder::stub::StubEncoder;
    use crate::store::memory::MemoryBookStore;

    fn book(id: i64, title: &str, author: &str, genre: &str, synopsis: &str) -> BookRecord {
        BookRecord {
            id,
            title: title.to_string(),
            author: author.to_string(),
            synopsis: synopsis.to_string(),
            genre: genre.to_string(),
            rating: 0.0,
            cover_url: None,
            publisher: None,
            published_date: None,
            date_added: None,
        }
    }

    fn generator(dimension: usize) -> (Arc<StubEncoder>, EmbeddingGenerator, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let encoder = Arc::new(StubEncoder::new(dimension));
        let cache = Arc::new(VectorCache::load(dir.path().join("cache.json")));
        let generator = EmbeddingGenerator::new(encoder.clone(), cache);
        (encoder, generator, dir)
    }

    #[test]
    fn blob_keeps_field_order_and_omits_absent_fields() {
        let text = build_embedding_text("Dune", "Frank Herbert", "", "A desert planet");
        assert_eq!(
            text,
            "Title: Dune Author: Frank Herbert Synopsis: A desert planet"
        );

        let all = build_embedding_text("T", "A", "G", "S");
        assert_eq!(all, "Title: T Author: A Genre: G Synopsis: S");

        assert_eq!(build_embedding_text("", "  ", "", ""), "");
    }

    #[test]
    fn blob_truncates_synopsis_to_500_chars() {
        let synopsis = "s".repeat(600);
        let text = build_embedding_text("", "", "", &synopsis);
        assert_eq!(text, format!("Synopsis: {}", "s".repeat(500)));
    }

    #[tokio::test]
    async fn empty_book_gets_zero_vector_without_model_call() {
        let (encoder, generator, _dir) = generator(4);
        let empty = book(1, "", "", "", "   ");

        let embedding = generator.embed(&empty).await.unwrap();
        assert_eq!(embedding, vec![0.0; 4]);
        assert_eq!(encoder.call_count(), 0);
    }

    #[tokio::test]
    async fn embed_text_bypasses_the_cache() {
        let (encoder, generator, _dir) = generator(4);
        assert_eq!(generator.dimension(), 4);

        let first = generator.embed_text("Dune", "", "", "").await.unwrap();
        let second = generator.embed_text("Dune", "", "", "").await.unwrap();
        assert_eq!(first, second);
        // Two calls, two encodes: nothing lands in the cache.
        assert_eq!(encoder.call_count(), 2);
        assert!(generator.cache().is_empty());

        let blank = generator.embed_text("", "", "", " ").await.unwrap();
        assert_eq!(blank, vec![0.0; 4]);
    }

    #[tokio::test]
    async fn embed_is_idempotent_and_served_from_cache() {
        let (encoder, generator, _dir) = generator(8);
        let b = book(1, "Dune", "Frank Herbert", "sci-fi", "A desert planet saga");

        let first = generator.embed(&b).await.unwrap();
        let second = generator.embed(&b).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(encoder.call_count(), 1);
    }

    #[tokio::test]
    async fn identical_text_fields_share_a_cache_entry_across_ids() {
        let (encoder, generator, _dir) = generator(8);
        let a = book(1, "Dune", "Frank Herbert", "sci-fi", "A desert planet saga");
        let mut b = a.clone();
        b.id = 2;

        generator.embed(&a).await.unwrap();
        generator.embed(&b).await.unwrap();

        assert_eq!(encoder.call_count(), 1);
        assert_eq!(generator.cache().len(), 1);
    }

    #[tokio::test]
    async fn embed_all_skips_books_without_synopsis() {
        let (encoder, generator, _dir) = generator(8);
        let store = MemoryBookStore::new(vec![
            book(1, "Has synopsis", "A", "", "Some text"),
            book(2, "No synopsis", "B", "fantasy", ""),
        ]);

        let embeddings = generator.embed_all(&store).await.unwrap();
        assert_eq!(embeddings.len(), 1);
        assert!(embeddings.contains_key(&1));
        assert_eq!(encoder.call_count(), 1);

        // The per-id mirror only holds the embedded book too.
        assert_eq!(store.load_embeddings().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn embed_all_with_no_eligible_books_never_invokes_the_model() {
        let (encoder, generator, _dir) = generator(8);
        let store = MemoryBookStore::new(vec![book(1, "No synopsis", "B", "fantasy", "")]);

        let embeddings = generator.embed_all(&store).await.unwrap();
        assert!(embeddings.is_empty());
        assert_eq!(encoder.call_count(), 0);
    }
}
