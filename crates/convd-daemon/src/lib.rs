// SPDX-License-Identifier: MIT OR Apache-2.0
//! HTTP frontends over the conversion façade.
//!
//! The REST surface (`/docs`) and the XML-RPC surface (`/RPC2`) are pure
//! translators: they map requests onto [`convert_doc`] and the cache
//! lookups, and map outcomes back onto status codes and bodies. No cache
//! or conversion policy lives here.

#![deny(unsafe_code)]

pub mod config;
mod fileiter;
mod mime;
pub mod xmlrpc;

pub use fileiter::{CHUNK_SIZE, FileIterator};
pub use mime::get_mimetype;

use axum::Json;
use axum::body::Body;
use axum::extract::{Multipart, Path as AxPath, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use convd_convert::{Converter, Options, convert_doc};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shared daemon state: the optional cache and the converter.
pub struct AppState {
    /// Cache directory; `None` disables caching entirely.
    pub cache_dir: Option<PathBuf>,
    /// Converter driving conversions for both frontends.
    pub converter: Arc<dyn Converter>,
}

impl AppState {
    /// Build state from a converter and an optional cache directory.
    pub fn new(converter: Arc<dyn Converter>, cache_dir: Option<PathBuf>) -> Self {
        Self {
            cache_dir,
            converter,
        }
    }
}

/// Structured API error: status code plus a JSON `error` body.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn internal(message: impl ToString) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

/// Build the Axum router with all frontend routes.
pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(cmd_health))
        .route("/docs", get(cmd_list_docs).post(cmd_create_doc))
        .route("/docs/new", get(cmd_new_doc_form))
        .route("/docs/{cache_key}", get(cmd_show_doc))
        .route("/RPC2", get(cmd_rpc_get).post(cmd_rpc_post))
        .with_state(state)
}

async fn cmd_health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

const NEW_DOC_FORM: &str = r#"<html>
 <head><title>Convert a document</title></head>
 <body>
  <form action="/docs" method="POST" enctype="multipart/form-data">
   <input type="file" name="doc" />
   <select name="out_fmt">
    <option value="html">HTML</option>
    <option value="pdf">PDF</option>
    <option value="txt">Text</option>
   </select>
   <input type="submit" name="CREATE" value="Send" />
  </form>
 </body>
</html>
"#;

const DOCS_INDEX: &str = r#"<html>
 <head><title>Documents</title></head>
 <body>
  <p>POST a document to this resource or use the
     <a href="/docs/new">upload form</a>.</p>
 </body>
</html>
"#;

async fn cmd_new_doc_form() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/html; charset=UTF-8")],
        NEW_DOC_FORM,
    )
}

async fn cmd_list_docs() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/html; charset=UTF-8")],
        DOCS_INDEX,
    )
}

async fn cmd_create_doc(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut doc: Option<(String, Vec<u8>)> = None;
    let mut option_fields: Vec<(String, String)> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "doc" => {
                let filename = field
                    .file_name()
                    .and_then(|f| Path::new(f).file_name())
                    .and_then(|f| f.to_str())
                    .map(str::to_string)
                    .ok_or_else(|| {
                        ApiError::new(StatusCode::BAD_REQUEST, "doc field needs a filename")
                    })?;
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.to_string()))?;
                doc = Some((filename, bytes.to_vec()));
            }
            // Submit-button value, not an option.
            "CREATE" => {
                let _ = field.text().await;
            }
            _ => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.to_string()))?;
                option_fields.push((name, value));
            }
        }
    }

    let (filename, bytes) = doc.ok_or_else(|| {
        ApiError::new(StatusCode::BAD_REQUEST, "multipart field 'doc' is required")
    })?;
    let options = Options::from_form_fields(option_fields)
        .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.to_string()))?;

    debug!(%filename, "conversion requested");
    let cache_dir = state.cache_dir.clone();
    let converter = Arc::clone(&state.converter);
    let converted = tokio::task::spawn_blocking(move || {
        let upload_dir = tempfile::Builder::new()
            .prefix("convd-upload-")
            .tempdir()
            .map_err(|e| convd_convert::ConvertError::Io {
                op: "create upload dir",
                path: PathBuf::from("<tempdir>"),
                source: e,
            })?;
        let src = upload_dir.path().join(&filename);
        std::fs::write(&src, &bytes).map_err(|e| convd_convert::ConvertError::Io {
            op: "write upload",
            path: src.clone(),
            source: e,
        })?;
        convert_doc(converter.as_ref(), &src, &options, cache_dir.as_deref())
    })
    .await
    .map_err(ApiError::internal)?
    .map_err(ApiError::internal)?;

    if converted.metadata.error {
        warn!(status = converted.metadata.oocp_status, "conversion failed");
        return Ok((
            StatusCode::BAD_GATEWAY,
            Json(serde_json::to_value(&converted.metadata).map_err(ApiError::internal)?),
        )
            .into_response());
    }
    let artifact = converted
        .path
        .ok_or_else(|| ApiError::internal("converter returned no artifact"))?;

    let body = tokio::fs::read(&artifact).await.map_err(ApiError::internal)?;
    let content_type = get_mimetype(artifact.file_name().and_then(|n| n.to_str()));

    let response = match converted.cache_key {
        Some(cache_key) => {
            info!(%cache_key, "conversion stored");
            (
                StatusCode::CREATED,
                [
                    (header::CONTENT_TYPE, content_type),
                    (header::LOCATION, format!("/docs/{cache_key}")),
                ],
                body,
            )
                .into_response()
        }
        None => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, content_type)],
            body,
        )
            .into_response(),
    };
    Ok(response)
}

async fn cmd_show_doc(
    AxPath(cache_key): AxPath<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let Some(cache_dir) = state.cache_dir.clone() else {
        return Err(ApiError::new(StatusCode::NOT_FOUND, "no cache configured"));
    };

    let lookup_key = cache_key.clone();
    let cached = tokio::task::spawn_blocking(move || {
        convd_cache::CacheManager::new(&cache_dir)?.cached_file(&lookup_key)
    })
    .await
    .map_err(ApiError::internal)?
    .map_err(ApiError::internal)?;

    let Some(path) = cached else {
        debug!(%cache_key, "document not cached");
        return Err(ApiError::new(StatusCode::NOT_FOUND, "document not found"));
    };

    let content_type = get_mimetype(path.file_name().and_then(|n| n.to_str()));
    let iter = FileIterator::new(&path).map_err(ApiError::internal)?;
    let body = Body::from_stream(tokio_stream::iter(iter));
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type)],
        body,
    )
        .into_response())
}

// -- XML-RPC ----------------------------------------------------------------

async fn cmd_rpc_get() -> impl IntoResponse {
    // XML-RPC is POST-only.
    ApiError::new(StatusCode::BAD_REQUEST, "XML-RPC requires POST")
}

async fn cmd_rpc_post(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Result<Response, ApiError> {
    let is_xml = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("text/xml") || ct.starts_with("application/xml"));
    if !is_xml {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "XML-RPC requires a text/xml body",
        ));
    }

    let response_xml = tokio::task::spawn_blocking(move || xmlrpc::handle(&state, &body))
        .await
        .map_err(ApiError::internal)?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/xml")],
        response_xml,
    )
        .into_response())
}
