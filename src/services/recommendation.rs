use crate::config::RecommendationSettings;
use crate::error::Result;
use crate::ml::genre::UNKNOWN_GENRE;
use crate::ml::{EmbeddingGenerator, GenreClassifier, SimilarityEngine, SimilarityResult};
use crate::models::{
    BookRecord, GenreAnalysis, LabelCount, PersonalizedResponse, PreferenceAnalysis,
    RecommendedBook, ScoredBook,
};
use crate::store::BookStore;
use futures::future;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Orchestrates embeddings, similarity search and genre classification over
/// the book store.
///
/// Holds an in-memory id -> embedding index, loaded from the store's mirror
/// table at startup and refreshed by `rebuild_index`.
pub struct RecommendationService {
    store: Arc<dyn BookStore>,
    generator: Arc<EmbeddingGenerator>,
    genres: Arc<GenreClassifier>,
    similarity: SimilarityEngine,
    settings: RecommendationSettings,
    index: RwLock<HashMap<i64, Vec<f32>>>,
}

impl RecommendationService {
    pub fn new(
        store: Arc<dyn BookStore>,
        generator: Arc<EmbeddingGenerator>,
        genres: Arc<GenreClassifier>,
        settings: RecommendationSettings,
    ) -> Self {
        Self {
            store,
            generator,
            genres,
            similarity: SimilarityEngine::new(),
            settings,
            index: RwLock::new(HashMap::new()),
        }
    }

    /// Restore the embedding index from the store's per-id mirror table.
    pub async fn load_index(&self) -> Result<usize> {
        let embeddings = self.store.load_embeddings().await?;
        let count = embeddings.len();
        if let Ok(mut index) = self.index.write() {
            *index = embeddings;
        }
        info!("Loaded {} book embeddings into the index", count);
        Ok(count)
    }

    /// Re-embed the catalog and swap in the fresh index. Unchanged books are
    /// served from the vector cache, but the whole store is re-scanned.
    pub async fn rebuild_index(&self) -> Result<usize> {
        let embeddings = self.generator.embed_all(self.store.as_ref()).await?;
        let count = embeddings.len();
        if let Ok(mut index) = self.index.write() {
            *index = embeddings;
        }
        info!("Rebuilt embedding index with {} entries", count);
        Ok(count)
    }

    pub fn index_len(&self) -> usize {
        self.index.read().map(|i| i.len()).unwrap_or(0)
    }

    /// Books most similar to a catalog entry, joined for display with a
    /// 0-100 match percentage. An unindexed book yields an empty list.
    pub async fn recommend_similar(&self, book_id: i64, top_k: usize) -> Result<Vec<ScoredBook>> {
        let hits = {
            let index = self
                .index
                .read()
                .map_err(|_| crate::error::ApiError::InternalError("index lock poisoned".into()))?;
            self.similarity.find_similar(
                book_id,
                &index,
                top_k,
                self.settings.similar_min_similarity,
            )?
        };

        self.join_scored(hits).await
    }

    /// Books closest to a free-text description built from any combination
    /// of title, author, genre and synopsis. All indexed books participate,
    /// with no similarity floor; a query with no usable text is empty input,
    /// not an error.
    pub async fn find_similar_to_text(
        &self,
        title: &str,
        author: &str,
        genre: &str,
        synopsis: &str,
        top_k: usize,
    ) -> Result<Vec<ScoredBook>> {
        if [title, author, genre, synopsis]
            .iter()
            .all(|f| f.trim().is_empty())
        {
            return Ok(Vec::new());
        }

        let query = self
            .generator
            .embed_text(title, author, genre, synopsis)
            .await?;

        let hits = {
            let index = self
                .index
                .read()
                .map_err(|_| crate::error::ApiError::InternalError("index lock poisoned".into()))?;
            self.similarity.rank_against(&query, &index, top_k)?
        };

        self.join_scored(hits).await
    }

    async fn join_scored(&self, hits: Vec<SimilarityResult>) -> Result<Vec<ScoredBook>> {
        let books =
            future::try_join_all(hits.iter().map(|hit| self.store.get_book(hit.book_id))).await?;

        let mut results = Vec::with_capacity(hits.len());
        for (hit, book) in hits.iter().zip(books) {
            match book {
                Some(book) => results.push(ScoredBook {
                    book,
                    similarity_score: hit.score,
                    match_percentage: (hit.score * 100.0).round() as i32,
                }),
                None => debug!("Indexed book {} no longer in store, skipping", hit.book_id),
            }
        }

        Ok(results)
    }

    /// Personalized picks from signed ratings.
    ///
    /// Liked books (rating >= 4) seed the candidate pool; a candidate's
    /// similarity accumulates additively across liked seeds, so a book close
    /// to several liked books outranks one close to a single seed. Disliked
    /// books (rating <= 2) soften scores of candidates already in the pool
    /// but never remove them. Ratings in (2, 4) are neutral. With no liked
    /// books the popular list is returned unchanged.
    pub async fn recommend_personalized(
        &self,
        ratings: &BTreeMap<i64, f32>,
        top_k: usize,
        preferred_genres: &[String],
    ) -> Result<PersonalizedResponse> {
        let analysis = if ratings.is_empty() {
            None
        } else {
            Some(self.analyze_preferences(ratings).await?)
        };

        let liked: Vec<i64> = ratings
            .iter()
            .filter(|(_, &r)| r >= 4.0)
            .map(|(&id, _)| id)
            .collect();
        let disliked: Vec<i64> = ratings
            .iter()
            .filter(|(_, &r)| r <= 2.0)
            .map(|(&id, _)| id)
            .collect();

        if liked.is_empty() {
            debug!("No liked books in ratings, falling back to popular");
            let recommendations = self
                .recommend_popular(top_k)
                .await?
                .into_iter()
                .map(|book| RecommendedBook {
                    recommendation_score: book.rating,
                    genre_match: false,
                    book,
                })
                .collect();
            return Ok(PersonalizedResponse {
                analysis,
                recommendations,
            });
        }

        let mut scores: HashMap<i64, f32> = HashMap::new();
        {
            let index = self
                .index
                .read()
                .map_err(|_| crate::error::ApiError::InternalError("index lock poisoned".into()))?;

            for &liked_id in liked.iter().take(self.settings.max_liked_seeds) {
                let hits = self.similarity.find_similar(
                    liked_id,
                    &index,
                    top_k * 3,
                    self.settings.liked_min_similarity,
                )?;
                for hit in hits {
                    if ratings.contains_key(&hit.book_id) {
                        continue;
                    }
                    *scores.entry(hit.book_id).or_insert(0.0) += hit.score;
                }
            }

            for &disliked_id in disliked.iter().take(self.settings.max_disliked_seeds) {
                let hits = self.similarity.find_similar(
                    disliked_id,
                    &index,
                    top_k * 2,
                    self.settings.disliked_min_similarity,
                )?;
                for hit in hits {
                    if let Some(score) = scores.get_mut(&hit.book_id) {
                        *score -= self.settings.dislike_penalty * hit.score;
                    }
                }
            }
        }

        let mut ranked: Vec<(i64, f32)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        ranked.truncate(top_k);

        let mut recommendations = Vec::with_capacity(ranked.len());
        for (book_id, score) in ranked {
            let Some(book) = self.store.get_book(book_id).await? else {
                debug!("Ranked book {} no longer in store, skipping", book_id);
                continue;
            };

            let mut recommendation_score = score;
            let mut genre_match = false;
            if !book.genre.is_empty() {
                let book_genre = book.genre.to_lowercase();
                for preferred in preferred_genres {
                    if book_genre.contains(&preferred.to_lowercase()) {
                        recommendation_score += self.settings.genre_boost;
                        genre_match = true;
                        break;
                    }
                }
            }

            recommendations.push(RecommendedBook {
                book,
                recommendation_score,
                genre_match,
            });
        }

        Ok(PersonalizedResponse {
            analysis,
            recommendations,
        })
    }

    /// Summarize a user's taste from their ratings: liked/disliked counts,
    /// most-rated genres and authors, and average stored ratings.
    pub async fn analyze_preferences(
        &self,
        ratings: &BTreeMap<i64, f32>,
    ) -> Result<PreferenceAnalysis> {
        let mut liked_ratings = Vec::new();
        let mut disliked_ratings = Vec::new();
        let mut genre_counts: HashMap<String, usize> = HashMap::new();
        let mut author_counts: HashMap<String, usize> = HashMap::new();

        for (&book_id, &user_rating) in ratings {
            let Some(book) = self.store.get_book(book_id).await? else {
                continue;
            };

            if user_rating >= 4.0 {
                liked_ratings.push(book.rating);
            } else if user_rating <= 2.0 {
                disliked_ratings.push(book.rating);
            }

            if !book.genre.is_empty() {
                *genre_counts.entry(book.genre.clone()).or_insert(0) += 1;
            }
            if !book.author.is_empty() {
                *author_counts.entry(book.author.clone()).or_insert(0) += 1;
            }
        }

        let favorite_genres = top_counts(genre_counts, 3);
        let favorite_authors = top_counts(author_counts, 3);

        Ok(PreferenceAnalysis {
            total_ratings: ratings.len(),
            liked_books: liked_ratings.len(),
            disliked_books: disliked_ratings.len(),
            preferred_genres: favorite_genres.iter().map(|c| c.label.clone()).collect(),
            preferred_authors: favorite_authors.iter().map(|c| c.label.clone()).collect(),
            favorite_genres,
            favorite_authors,
            avg_liked_rating: average(&liked_ratings),
            avg_disliked_rating: average(&disliked_ratings),
        })
    }

    /// Best-rated books, most recent first among equals. A pure store query
    /// with no embeddings involved; this is the degradation target for every
    /// path that loses its model.
    pub async fn recommend_popular(&self, top_k: usize) -> Result<Vec<BookRecord>> {
        self.store.popular_books(top_k).await
    }

    /// Rank indexed books by similarity of their embedding to the genre
    /// label's own embedding. Degrades to a substring match on the stored
    /// genre field when no embeddings exist or the encoder is unavailable.
    pub async fn recommend_by_genre(&self, genre: &str, top_k: usize) -> Result<Vec<ScoredBook>> {
        if self.index_len() == 0 {
            debug!("Embedding index empty, using stored-genre lookup for '{}'", genre);
            return self.genre_fallback(genre, top_k).await;
        }

        let genre_embedding = match self.genres.embed_genre(genre).await {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!(
                    "Could not embed genre '{}' ({}), using stored-genre lookup",
                    genre, e
                );
                return self.genre_fallback(genre, top_k).await;
            }
        };

        let hits = {
            let index = self
                .index
                .read()
                .map_err(|_| crate::error::ApiError::InternalError("index lock poisoned".into()))?;
            self.similarity.rank_against(&genre_embedding, &index, top_k)?
        };

        self.join_scored(hits).await
    }

    async fn genre_fallback(&self, genre: &str, top_k: usize) -> Result<Vec<ScoredBook>> {
        let books = self.store.books_by_genre_like(genre, top_k).await?;
        Ok(books
            .into_iter()
            .map(|book| ScoredBook {
                book,
                similarity_score: 0.0,
                match_percentage: 0,
            })
            .collect())
    }

    /// Classify every record with a synopsis and write the suggested genre
    /// back to the store. Returns how many records were updated.
    pub async fn auto_classify_genres(&self) -> Result<usize> {
        let books = self.store.all_books(true).await?;
        let mut updated = 0;

        for book in &books {
            let classification = self.genres.classify_book(book);
            if classification.primary_genre == UNKNOWN_GENRE {
                continue;
            }
            self.store
                .update_genre(book.id, &classification.suggested_genre)
                .await?;
            updated += 1;
        }

        info!("Updated genres for {} of {} books", updated, books.len());
        Ok(updated)
    }

    /// Classifier-derived genre distribution over every record with a
    /// synopsis: occurrence counts per detected genre (a book counts toward
    /// all of its detected genres, not just the primary), the ten most
    /// common, and the average stored rating per genre over rated books.
    pub async fn analyze_library_genres(&self) -> Result<GenreAnalysis> {
        let books = self.store.all_books(true).await?;

        let mut distribution: HashMap<String, usize> = HashMap::new();
        let mut rating_sums: HashMap<String, (f32, usize)> = HashMap::new();

        for book in &books {
            let classification = self.genres.classify_book(book);
            for genre in &classification.all_genres {
                *distribution.entry(genre.clone()).or_insert(0) += 1;
                if book.rating > 0.0 {
                    let entry = rating_sums.entry(genre.clone()).or_insert((0.0, 0));
                    entry.0 += book.rating;
                    entry.1 += 1;
                }
            }
        }

        let avg_rating_by_genre = rating_sums
            .into_iter()
            .map(|(genre, (total, count))| (genre, total / count as f32))
            .collect();
        let unique_genres = distribution.len();

        Ok(GenreAnalysis {
            total_books: books.len(),
            top_genres: top_counts(distribution.clone(), 10),
            genre_distribution: distribution,
            avg_rating_by_genre,
            unique_genres,
        })
    }

    pub fn store(&self) -> &dyn BookStore {
        self.store.as_ref()
    }
}

fn top_counts(counts: HashMap<String, usize>, n: usize) -> Vec<LabelCount> {
    let mut entries: Vec<LabelCount> = counts
        .into_iter()
        .map(|(label, count)| LabelCount { label, count })
        .collect();
    entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    entries.truncate(n);
    entries
}

fn average(values: &[f32]) -> f32 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f32>() / values.len() as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::sentence_encoder::stub::StubEncoder;
    use crate::ml::vector_cache::VectorCache;
    use crate::store::memory::MemoryBookStore;

    fn book(id: i64, title: &str, genre: &str, rating: f32, date_added: &str) -> BookRecord {
        BookRecord {
            id,
            title: title.to_string(),
            author: format!("Author {}", id),
            synopsis: format!("Synopsis of {}", title),
            genre: genre.to_string(),
            rating,
            cover_url: None,
            publisher: None,
            published_date: None,
            date_added: Some(date_added.to_string()),
        }
    }

    struct Fixture {
        service: RecommendationService,
        encoder: Arc<StubEncoder>,
        _dir: tempfile::TempDir,
    }

    async fn fixture(books: Vec<BookRecord>, embeddings: &[(i64, Vec<f32>)]) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let encoder = Arc::new(StubEncoder::new(4));
        let cache = Arc::new(VectorCache::load(dir.path().join("cache.json")));
        let generator = Arc::new(EmbeddingGenerator::new(encoder.clone(), cache));
        let genres = Arc::new(GenreClassifier::new(encoder.clone()));

        let store = Arc::new(MemoryBookStore::new(books));
        for (id, embedding) in embeddings {
            store.put_embedding(*id, embedding).await.unwrap();
        }

        let service = RecommendationService::new(
            store,
            generator,
            genres,
            RecommendationSettings::default(),
        );
        service.load_index().await.unwrap();

        Fixture {
            service,
            encoder,
            _dir: dir,
        }
    }

    fn ratings(entries: &[(i64, f32)]) -> BTreeMap<i64, f32> {
        entries.iter().cloned().collect()
    }

    #[tokio::test]
    async fn recommend_similar_joins_books_and_scales_percentage() {
        let f = fixture(
            vec![
                book(1, "Reference", "sci-fi", 4.0, "2024-01-01"),
                book(2, "Close", "sci-fi", 3.0, "2024-01-02"),
                book(3, "Far", "poetry", 2.0, "2024-01-03"),
            ],
            &[
                (1, vec![1.0, 0.0, 0.0, 0.0]),
                (2, vec![0.9, 0.1, 0.0, 0.0]),
                (3, vec![0.0, 1.0, 0.0, 0.0]),
            ],
        )
        .await;

        let results = f.service.recommend_similar(1, 5).await.unwrap();
        assert_eq!(results.len(), 1); // book 3 is below the 0.3 floor
        assert_eq!(results[0].book.id, 2);
        assert_eq!(
            results[0].match_percentage,
            (results[0].similarity_score * 100.0).round() as i32
        );
    }

    #[tokio::test]
    async fn text_search_ranks_all_indexed_books_without_a_floor() {
        let f = fixture(
            vec![
                book(1, "Dragon story", "fantasy", 4.0, "2024-01-01"),
                book(2, "Romance story", "romance", 4.0, "2024-01-02"),
            ],
            &[
                (1, vec![1.0, 0.0, 0.0, 0.0]),
                (2, vec![0.0, 1.0, 0.0, 0.0]),
            ],
        )
        .await;
        f.encoder
            .insert("Synopsis: dragons in space", vec![0.9, 0.1, 0.0, 0.0]);

        let results = f
            .service
            .find_similar_to_text("", "", "", "dragons in space", 10)
            .await
            .unwrap();

        // Both books come back: near-orthogonal candidates are ranked, not
        // filtered.
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].book.id, 1);
        assert!(results[0].similarity_score > results[1].similarity_score);
        assert_eq!(
            results[0].match_percentage,
            (results[0].similarity_score * 100.0).round() as i32
        );
    }

    #[tokio::test]
    async fn text_search_with_no_usable_fields_is_empty_without_a_model_call() {
        let f = fixture(
            vec![book(1, "Only", "", 3.0, "2024-01-01")],
            &[(1, vec![1.0, 0.0, 0.0, 0.0])],
        )
        .await;

        let results = f
            .service
            .find_similar_to_text("", "  ", "", "", 10)
            .await
            .unwrap();

        assert!(results.is_empty());
        assert_eq!(f.encoder.call_count(), 0);
    }

    #[tokio::test]
    async fn recommend_similar_for_unindexed_book_is_empty() {
        let f = fixture(
            vec![book(1, "Only", "", 3.0, "2024-01-01")],
            &[(1, vec![1.0, 0.0, 0.0, 0.0])],
        )
        .await;

        let results = f.service.recommend_similar(42, 5).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn personalized_accumulates_across_liked_seeds_and_penalizes_disliked() {
        // Books 1 and 2 are liked and both point at 4; 6 matches only book 1
        // at the same per-match similarity; 5 matches book 1 weakly and the
        // disliked book 3 strongly.
        let f = fixture(
            vec![
                book(1, "Liked A", "", 4.0, "2024-01-01"),
                book(2, "Liked B", "", 4.0, "2024-01-02"),
                book(3, "Disliked", "", 2.0, "2024-01-03"),
                book(4, "Double match", "", 3.0, "2024-01-04"),
                book(5, "Penalized", "", 3.0, "2024-01-05"),
                book(6, "Single match", "", 3.0, "2024-01-06"),
            ],
            &[
                (1, vec![1.0, 0.0, 0.0, 0.0]),
                (2, vec![0.0, 1.0, 0.0, 0.0]),
                (3, vec![0.0, 0.0, 0.0, 1.0]),
                (4, vec![1.0, 1.0, 0.0, 0.0]),
                (5, vec![0.5, 0.0, 0.0, 0.85]),
                (6, vec![1.0, 0.0, 1.0, 0.0]),
            ],
        )
        .await;

        let response = f
            .service
            .recommend_personalized(&ratings(&[(1, 5.0), (2, 4.5), (3, 1.0)]), 10, &[])
            .await
            .unwrap();

        let recs = &response.recommendations;
        let score_of = |id: i64| {
            recs.iter()
                .find(|r| r.book.id == id)
                .map(|r| r.recommendation_score)
        };

        // Already-rated books never come back.
        assert!(recs.iter().all(|r| ![1, 2, 3].contains(&r.book.id)));

        // Two accumulated matches beat one at equal per-match similarity.
        let double = score_of(4).unwrap();
        let single = score_of(6).unwrap();
        assert!(double > single);
        assert!((double - 2.0 * single).abs() < 1e-4);

        // Book 5 survives the penalty with a lowered, still-present score.
        let penalized = score_of(5).unwrap();
        assert!(penalized < 0.51);
        assert!(recs.iter().any(|r| r.book.id == 5));

        // Output ordering follows the accumulated score.
        assert_eq!(recs[0].book.id, 4);
        assert_eq!(recs[1].book.id, 6);

        let analysis = response.analysis.unwrap();
        assert_eq!(analysis.liked_books, 2);
        assert_eq!(analysis.disliked_books, 1);
        assert_eq!(analysis.total_ratings, 3);
    }

    #[tokio::test]
    async fn personalized_applies_genre_boost_after_ranking() {
        let f = fixture(
            vec![
                book(1, "Liked", "", 5.0, "2024-01-01"),
                book(2, "Fantasy pick", "Epic Fantasy", 3.0, "2024-01-02"),
            ],
            &[
                (1, vec![1.0, 0.0, 0.0, 0.0]),
                (2, vec![0.9, 0.1, 0.0, 0.0]),
            ],
        )
        .await;

        let response = f
            .service
            .recommend_personalized(&ratings(&[(1, 5.0)]), 10, &["Fantasy".to_string()])
            .await
            .unwrap();

        let pick = &response.recommendations[0];
        assert_eq!(pick.book.id, 2);
        assert!(pick.genre_match);

        let unboosted = f
            .service
            .recommend_personalized(&ratings(&[(1, 5.0)]), 10, &[])
            .await
            .unwrap();
        let base = unboosted.recommendations[0].recommendation_score;
        assert!((pick.recommendation_score - (base + 0.2)).abs() < 1e-5);
    }

    #[tokio::test]
    async fn personalized_with_empty_ratings_matches_popular_exactly() {
        let books = vec![
            book(1, "Top", "fiction", 4.8, "2024-01-01"),
            book(2, "Also top", "fiction", 4.8, "2024-02-01"),
            book(3, "Good", "fiction", 4.2, "2024-01-15"),
            book(4, "Meh", "fiction", 3.0, "2024-03-01"),
        ];
        let f = fixture(books, &[]).await;

        let popular = f.service.recommend_popular(3).await.unwrap();
        let response = f
            .service
            .recommend_personalized(&BTreeMap::new(), 3, &[])
            .await
            .unwrap();

        assert!(response.analysis.is_none());
        let ids: Vec<i64> = response.recommendations.iter().map(|r| r.book.id).collect();
        let popular_ids: Vec<i64> = popular.iter().map(|b| b.id).collect();
        assert_eq!(ids, popular_ids);
        // Most recent first among equal ratings.
        assert_eq!(popular_ids[0], 2);
    }

    #[tokio::test]
    async fn personalized_without_liked_books_falls_back_to_popular() {
        let f = fixture(
            vec![
                book(1, "Rated low", "fiction", 4.5, "2024-01-01"),
                book(2, "Popular", "fiction", 4.9, "2024-01-02"),
            ],
            &[
                (1, vec![1.0, 0.0, 0.0, 0.0]),
                (2, vec![0.9, 0.1, 0.0, 0.0]),
            ],
        )
        .await;

        let response = f
            .service
            .recommend_personalized(&ratings(&[(1, 1.0)]), 5, &[])
            .await
            .unwrap();

        let ids: Vec<i64> = response.recommendations.iter().map(|r| r.book.id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert!(response.analysis.is_some());
    }

    #[tokio::test]
    async fn by_genre_falls_back_to_stored_genre_when_index_empty() {
        let f = fixture(
            vec![
                book(1, "Spooky", "Horror", 4.0, "2024-01-01"),
                book(2, "Sweet", "Romance", 4.5, "2024-01-02"),
            ],
            &[],
        )
        .await;

        let results = f.service.recommend_by_genre("horror", 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].book.id, 1);
        assert_eq!(f.encoder.call_count(), 0);
    }

    #[tokio::test]
    async fn by_genre_ranks_index_against_label_embedding() {
        let f = fixture(
            vec![
                book(1, "Dragons", "", 3.0, "2024-01-01"),
                book(2, "Spaceships", "", 3.0, "2024-01-02"),
            ],
            &[
                (1, vec![1.0, 0.0, 0.0, 0.0]),
                (2, vec![0.0, 1.0, 0.0, 0.0]),
            ],
        )
        .await;
        f.encoder.insert("fantasy", vec![0.95, 0.05, 0.0, 0.0]);

        let results = f.service.recommend_by_genre("fantasy", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].book.id, 1);
        assert!(results[0].similarity_score > results[1].similarity_score);
    }

    #[tokio::test]
    async fn auto_classify_writes_suggested_genres_back() {
        let mut spooky = book(1, "The Haunting", "", 3.0, "2024-01-01");
        spooky.synopsis = "A ghost haunts a haunted manor. Supernatural terror.".to_string();
        let mut blank = book(2, "Untitled", "", 3.0, "2024-01-02");
        blank.synopsis = "qqq zzz".to_string();

        let f = fixture(vec![spooky, blank], &[]).await;

        let updated = f.service.auto_classify_genres().await.unwrap();
        assert_eq!(updated, 1);
        assert_eq!(
            f.service.store().get_book(1).await.unwrap().unwrap().genre,
            "Horror"
        );
        assert_eq!(f.service.store().get_book(2).await.unwrap().unwrap().genre, "");
    }

    #[tokio::test]
    async fn library_genre_analysis_counts_every_detected_genre() {
        let mut spooky = book(1, "Alpha", "", 4.0, "2024-01-01");
        spooky.synopsis = "A ghost haunts a haunted manor.".to_string();
        let mut crossover = book(2, "Beta", "", 2.0, "2024-01-02");
        crossover.synopsis = "A detective chases a ghost.".to_string();
        let mut unrated = book(3, "Gamma", "", 0.0, "2024-01-03");
        unrated.synopsis = "A paranormal haunting.".to_string();

        let f = fixture(vec![spooky, crossover, unrated], &[]).await;

        let analysis = f.service.analyze_library_genres().await.unwrap();

        assert_eq!(analysis.total_books, 3);
        assert_eq!(analysis.genre_distribution["horror"], 3);
        assert_eq!(analysis.genre_distribution["mystery"], 1);
        assert_eq!(analysis.unique_genres, 2);
        assert_eq!(analysis.top_genres[0].label, "horror");
        assert_eq!(analysis.top_genres[0].count, 3);
        // The unrated book counts toward the distribution but not the
        // per-genre average.
        assert!((analysis.avg_rating_by_genre["horror"] - 3.0).abs() < 1e-6);
        assert!((analysis.avg_rating_by_genre["mystery"] - 2.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn analyze_preferences_counts_favorites() {
        let mut a = book(1, "A", "Fantasy", 4.5, "2024-01-01");
        a.author = "Le Guin".to_string();
        let mut b = book(2, "B", "Fantasy", 4.0, "2024-01-02");
        b.author = "Le Guin".to_string();
        let mut c = book(3, "C", "Horror", 2.5, "2024-01-03");
        c.author = "King".to_string();

        let f = fixture(vec![a, b, c], &[]).await;

        let analysis = f
            .service
            .analyze_preferences(&ratings(&[(1, 5.0), (2, 4.0), (3, 1.0)]))
            .await
            .unwrap();

        assert_eq!(analysis.favorite_genres[0].label, "Fantasy");
        assert_eq!(analysis.favorite_genres[0].count, 2);
        assert_eq!(analysis.favorite_authors[0].label, "Le Guin");
        assert_eq!(analysis.preferred_genres[0], "Fantasy");
        assert!((analysis.avg_liked_rating - 4.25).abs() < 1e-5);
        assert!((analysis.avg_disliked_rating - 2.5).abs() < 1e-5);
    }
}
