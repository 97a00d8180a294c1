//! Embedding index maintenance, the slow path behind every similarity query.

use crate::{error::ApiError, services::RecommendationService};
use actix_web::{web, HttpResponse};
use log::info;

pub fn embeddings_config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/embeddings/rebuild").route(web::post().to(rebuild_embeddings)));
}

/// Re-embed the whole catalog and swap in the fresh index. Unchanged books
/// hit the vector cache, so reruns after small catalog edits are cheap.
pub async fn rebuild_embeddings(
    service: web::Data<RecommendationService>,
) -> Result<HttpResponse, ApiError> {
    info!("Rebuilding the embedding index...");
    let indexed = service.rebuild_index().await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "indexed": indexed,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })))
}
