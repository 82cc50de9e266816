//! HTTP request handlers.

use crate::covers::{
    CacheStats, Cover, CoverError, CoverInfo, CoverVariant, PLACEHOLDER_MAX_AGE, placeholder,
};
use crate::error::{AppError, Result};
use crate::server::AppState;
use axum::{
    Json,
    body::Body,
    extract::{Query, State, rejection::QueryRejection},
    http::{StatusCode, header},
    response::Response,
};
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;

/// JPEG content type.
const JPEG_MIME: &str = "image/jpeg";

/// Query parameters of `/cover`.
#[derive(Debug, Default, Deserialize)]
pub struct CoverParams {
    /// Book ID, validated by the handler.
    pub id: Option<String>,
    /// Present (with any value) to request the thumbnail.
    pub thumb: Option<String>,
}

impl CoverParams {
    /// Parse the book ID, rejecting missing, non-integer and non-positive values.
    fn book_id(&self) -> Result<i64> {
        self.id
            .as_deref()
            .map(str::trim)
            .and_then(|id| id.parse::<i64>().ok())
            .filter(|id| *id > 0)
            .ok_or_else(|| AppError::InvalidRequest("Invalid book ID".to_string()))
    }

    fn variant(&self) -> CoverVariant {
        CoverVariant::from_thumb_flag(self.thumb.is_some())
    }

    /// Unwrap the extracted query; an undecodable one has no usable ID.
    fn from_query(query: std::result::Result<Query<Self>, QueryRejection>) -> Result<Self> {
        query.map(|Query(params)| params).map_err(|rejection| {
            tracing::debug!(error = %rejection, "Rejected cover query");
            AppError::InvalidRequest("Invalid book ID".to_string())
        })
    }
}

/// Build a JPEG response with the cover's cache policy.
fn jpeg_response(cache_control: &str, body: Body) -> Response<Body> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, JPEG_MIME)
        .header(header::CACHE_CONTROL, cache_control)
        .body(body)
        .unwrap_or_else(|_| Response::default())
}

/// Cover image: `GET /cover?id=<int>[&thumb]`.
pub async fn cover(
    State(state): State<AppState>,
    query: std::result::Result<Query<CoverParams>, QueryRejection>,
) -> Result<Response<Body>> {
    let params = CoverParams::from_query(query)?;
    let book_id = params.book_id()?;
    let variant = params.variant();

    let cover = state.covers.get_cover(book_id, variant).await;
    let cache_control = cover.cache_control();

    match cover {
        Cover::Cached(path) => match tokio::fs::File::open(&path).await {
            Ok(file) => Ok(jpeg_response(
                &cache_control,
                Body::from_stream(ReaderStream::new(file)),
            )),
            Err(e) => {
                // Cache file vanished between lookup and open, e.g. a concurrent clear.
                tracing::warn!(book_id, %variant, path = %path.display(), error = %e, "Cached cover unreadable");
                Ok(jpeg_response(
                    &format!("public, max-age={}", PLACEHOLDER_MAX_AGE),
                    Body::from(placeholder::render(variant)),
                ))
            }
        },
        Cover::Placeholder(data) => Ok(jpeg_response(&cache_control, Body::from(data))),
    }
}

/// API: Cover extraction diagnostics, `GET /api/cover/info?id=<int>`.
pub async fn cover_info(
    State(state): State<AppState>,
    query: std::result::Result<Query<CoverParams>, QueryRejection>,
) -> Result<Json<CoverInfo>> {
    let book_id = CoverParams::from_query(query)?.book_id()?;

    let info = state.covers.inspect(book_id).await.map_err(|e| match e {
        CoverError::BookNotFound(_) => AppError::NotFound(e.to_string()),
        CoverError::LookupFailed(inner) => inner,
        other => AppError::Internal(other.to_string()),
    })?;
    Ok(Json(info))
}

// ============================================================================
// CACHE API
// ============================================================================

/// API: Cover cache statistics.
pub async fn cache_stats(State(state): State<AppState>) -> Json<CacheStats> {
    Json(state.covers.stats())
}

/// Cache clear response.
#[derive(Serialize)]
pub struct ClearResponse {
    removed: usize,
}

/// API: Delete every cached cover.
pub async fn cache_clear(State(state): State<AppState>) -> Result<Json<ClearResponse>> {
    let removed = state.covers.clear()?;
    Ok(Json(ClearResponse { removed }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::{BookRecord, Database};
    use axum::response::IntoResponse;
    use base64::Engine;
    use std::io::Cursor;

    fn test_state(dir: &std::path::Path) -> AppState {
        let mut config = Config::default();
        config.cache.covers_dir = dir.join("covers");
        AppState::new_with_db(&config, Database::open_memory().unwrap())
    }

    fn params(id: Option<&str>, thumb: Option<&str>) -> CoverParams {
        CoverParams {
            id: id.map(String::from),
            thumb: thumb.map(String::from),
        }
    }

    fn query(uri: &str) -> std::result::Result<Query<CoverParams>, QueryRejection> {
        Query::try_from_uri(&uri.parse().unwrap())
    }

    fn header_value(response: &Response<Body>, name: header::HeaderName) -> String {
        response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    }

    async fn body_bytes(response: Response<Body>) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    fn add_book(state: &AppState, dir: &std::path::Path, id: i64) -> Vec<u8> {
        let mut cover = Vec::new();
        image::DynamicImage::ImageRgb8(image::RgbImage::new(400, 600))
            .write_to(&mut Cursor::new(&mut cover), image::ImageFormat::Jpeg)
            .unwrap();
        let document = format!(
            r##"<FictionBook><description><coverpage><image l:href="#c"/></coverpage></description>
<binary id="c" content-type="image/jpeg">{}</binary></FictionBook>"##,
            base64::engine::general_purpose::STANDARD.encode(&cover)
        );
        let path = dir.join(format!("{}.fb2", id));
        std::fs::write(&path, document).unwrap();
        state.db.save_book(&BookRecord::new(id, &path, "fb2")).unwrap();
        cover
    }

    #[tokio::test]
    async fn test_malformed_id_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());

        for id in [None, Some(""), Some("abc"), Some("12x"), Some("0"), Some("-4")] {
            let result = cover(State(state.clone()), Ok(Query(params(id, None)))).await;
            let Err(err) = result else {
                panic!("id {:?} accepted", id);
            };
            let response = err.into_response();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert_eq!(body_bytes(response).await, b"Invalid book ID");
        }
    }

    #[tokio::test]
    async fn test_unknown_id_serves_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());

        let response = cover(State(state.clone()), Ok(Query(params(Some("404"), Some("")))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_value(&response, header::CONTENT_TYPE), "image/jpeg");
        assert_eq!(
            header_value(&response, header::CACHE_CONTROL),
            "public, max-age=3600"
        );

        let img = image::load_from_memory(&body_bytes(response).await).unwrap();
        assert_eq!((img.width(), img.height()), (200, 300));
    }

    #[tokio::test]
    async fn test_real_cover_is_streamed_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let original = add_book(&state, dir.path(), 12);

        let response = cover(State(state.clone()), Ok(Query(params(Some("12"), None))))
            .await
            .unwrap();
        assert_eq!(
            header_value(&response, header::CACHE_CONTROL),
            "public, max-age=86400"
        );
        assert_eq!(body_bytes(response).await, original);

        let response = cover(State(state.clone()), Ok(Query(params(Some("12"), Some("1")))))
            .await
            .unwrap();
        let img = image::load_from_memory(&body_bytes(response).await).unwrap();
        assert_eq!((img.width(), img.height()), (200, 300));
    }

    #[tokio::test]
    async fn test_query_string_selects_variant() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());

        let response = cover(State(state.clone()), query("/cover?id=5&thumb"))
            .await
            .unwrap();
        let img = image::load_from_memory(&body_bytes(response).await).unwrap();
        assert_eq!((img.width(), img.height()), (200, 300));

        let response = cover(State(state.clone()), query("/cover?id=5"))
            .await
            .unwrap();
        let img = image::load_from_memory(&body_bytes(response).await).unwrap();
        assert_eq!((img.width(), img.height()), (600, 800));
    }

    #[tokio::test]
    async fn test_undecodable_query_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());

        let rejected = query("/cover?id=1&id=2");
        assert!(rejected.is_err());

        let err = cover(State(state), rejected).await.unwrap_err();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_bytes(response).await, b"Invalid book ID");
    }

    #[tokio::test]
    async fn test_cover_info() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let original = add_book(&state, dir.path(), 7);
        state.covers.get_cover(7, CoverVariant::Full).await;

        let Json(info) = cover_info(State(state.clone()), query("/api/cover/info?id=7"))
            .await
            .unwrap();
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["strategy"], "l_href");
        assert_eq!(json["image"]["mime"], "image/jpeg");
        assert_eq!(json["image"]["width"], 400);
        assert_eq!(json["image"]["height"], 600);
        assert_eq!(json["image"]["size"], original.len());
        assert_eq!(json["source_exists"], true);
        assert_eq!(json["cached_full"], true);
        assert_eq!(json["cached_thumb"], false);
        assert!(json["error"].is_null());

        let err = cover_info(State(state.clone()), query("/api/cover/info?id=99"))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);

        let err = cover_info(State(state), query("/api/cover/info?id=x"))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_cache_api() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        add_book(&state, dir.path(), 5);
        state.covers.get_cover(5, CoverVariant::Thumb).await;

        let Json(stats) = cache_stats(State(state.clone())).await;
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["thumbnails"], 1);
        assert_eq!(json["full_covers"], 0);
        assert_eq!(json["exists"], true);
        assert!(json["total_bytes"].as_u64().unwrap() > 0);
        assert!(json["covers_dir"].as_str().unwrap().ends_with("covers"));

        let Json(cleared) = cache_clear(State(state.clone())).await.unwrap();
        assert_eq!(serde_json::to_value(&cleared).unwrap(), serde_json::json!({ "removed": 1 }));

        let Json(stats) = cache_stats(State(state)).await;
        assert_eq!(stats.thumbnails, 0);
    }
}
