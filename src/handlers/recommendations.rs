use crate::{
    error::ApiError,
    models::{ContentSearchRequest, PersonalizedRequest, SimilarRequest},
    services::RecommendationService,
};
use actix_web::{
    web::{self, Json},
    HttpResponse,
};
use serde::Deserialize;

const DEFAULT_TOP_K: usize = 10;
const MAX_TOP_K: usize = 50;

#[derive(Debug, Deserialize)]
pub struct TopKQuery {
    pub top_k: Option<usize>,
}

impl TopKQuery {
    fn resolve(&self) -> Result<usize, ApiError> {
        let top_k = self.top_k.unwrap_or(DEFAULT_TOP_K);
        if top_k == 0 || top_k > MAX_TOP_K {
            return Err(ApiError::InvalidInput(format!(
                "top_k must be between 1 and {}",
                MAX_TOP_K
            )));
        }
        Ok(top_k)
    }
}

pub fn recommendations_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/recommendations/similar").route(web::post().to(similar_books)),
    )
    .service(
        web::resource("/recommendations/personalized")
            .route(web::post().to(personalized_recommendations)),
    )
    .service(web::resource("/recommendations/search").route(web::post().to(search_by_content)))
    .service(web::resource("/recommendations/popular").route(web::get().to(popular_books)))
    .service(
        web::resource("/recommendations/genre/{genre}").route(web::get().to(books_by_genre)),
    )
    .service(web::resource("/genres/classify").route(web::post().to(classify_genres)))
    .service(web::resource("/genres/analyze").route(web::get().to(analyze_genres)));
}

/// Books most similar to a known catalog entry. An id with no embedding
/// yields an empty list, not an error.
pub async fn similar_books(
    request: Json<SimilarRequest>,
    service: web::Data<RecommendationService>,
) -> Result<HttpResponse, ApiError> {
    if request.top_k == 0 || request.top_k > MAX_TOP_K {
        return Err(ApiError::InvalidInput(format!(
            "top_k must be between 1 and {}",
            MAX_TOP_K
        )));
    }

    let recommendations = service
        .recommend_similar(request.book_id, request.top_k)
        .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "book_id": request.book_id,
        "recommendations": recommendations,
    })))
}

pub async fn personalized_recommendations(
    request: Json<PersonalizedRequest>,
    service: web::Data<RecommendationService>,
) -> Result<HttpResponse, ApiError> {
    if request.top_k == 0 || request.top_k > MAX_TOP_K {
        return Err(ApiError::InvalidInput(format!(
            "top_k must be between 1 and {}",
            MAX_TOP_K
        )));
    }

    let response = service
        .recommend_personalized(&request.ratings, request.top_k, &request.preferred_genres)
        .await?;

    Ok(HttpResponse::Ok().json(response))
}

/// Books ranked against a free-form description. Fields may be left blank;
/// a request with no usable text at all yields an empty list.
pub async fn search_by_content(
    request: Json<ContentSearchRequest>,
    service: web::Data<RecommendationService>,
) -> Result<HttpResponse, ApiError> {
    if request.top_k == 0 || request.top_k > MAX_TOP_K {
        return Err(ApiError::InvalidInput(format!(
            "top_k must be between 1 and {}",
            MAX_TOP_K
        )));
    }

    let recommendations = service
        .find_similar_to_text(
            &request.title,
            &request.author,
            &request.genre,
            &request.synopsis,
            request.top_k,
        )
        .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "recommendations": recommendations,
    })))
}

pub async fn popular_books(
    query: web::Query<TopKQuery>,
    service: web::Data<RecommendationService>,
) -> Result<HttpResponse, ApiError> {
    let top_k = query.resolve()?;
    let books = service.recommend_popular(top_k).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "recommendations": books,
    })))
}

pub async fn books_by_genre(
    path: web::Path<String>,
    query: web::Query<TopKQuery>,
    service: web::Data<RecommendationService>,
) -> Result<HttpResponse, ApiError> {
    let genre = path.into_inner();
    if genre.trim().is_empty() {
        return Err(ApiError::InvalidInput("Genre cannot be empty".to_string()));
    }

    let top_k = query.resolve()?;
    let recommendations = service.recommend_by_genre(&genre, top_k).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "genre": genre,
        "recommendations": recommendations,
    })))
}

/// Re-derive genres for every book with a synopsis and persist them.
pub async fn classify_genres(
    service: web::Data<RecommendationService>,
) -> Result<HttpResponse, ApiError> {
    let updated = service.auto_classify_genres().await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "updated": updated,
    })))
}

/// Genre distribution and per-genre average rating across the catalog.
pub async fn analyze_genres(
    service: web::Data<RecommendationService>,
) -> Result<HttpResponse, ApiError> {
    let analysis = service.analyze_library_genres().await?;

    Ok(HttpResponse::Ok().json(analysis))
}
