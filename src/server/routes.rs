//! HTTP routes for the remote document store.
//!
//! - `GET /health`: health check (no auth required)
//! - `PUT /collections/{collection}/{id}`: replace a document
//! - `GET /collections/{collection}/{id}`: fetch a document
//! - `DELETE /collections/{collection}/{id}`: remove a document
//! - `POST /collections/{collection}/query`: filtered, ordered listing

use axum::{
    extract::{Path, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path as FsPath;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::storage::{ServerStorage, ServerStorageError};
use crate::remote::{Document, RemoteErrorKind, RemoteQuery};

/// API key entry in config
#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeyEntry {
    pub key: String,
    pub user_id: String,
}

/// Config file structure
#[derive(Debug, Clone, Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    api_keys: Vec<ApiKeyEntry>,
}

/// Authenticated user info, added to request extensions after auth
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
}

/// API key store - maps key -> AuthUser
#[derive(Debug, Clone, Default)]
pub struct ApiKeyStore {
    keys: HashMap<String, AuthUser>,
}

impl ApiKeyStore {
    pub fn from_entries(entries: impl IntoIterator<Item = ApiKeyEntry>) -> Self {
        let keys = entries
            .into_iter()
            .map(|entry| {
                (
                    entry.key,
                    AuthUser {
                        user_id: entry.user_id,
                    },
                )
            })
            .collect();
        Self { keys }
    }

    /// Load API keys from config file. A missing or unreadable file leaves
    /// the store empty so every authenticated request is refused.
    pub fn load(config_path: &FsPath) -> Self {
        let store = match std::fs::read_to_string(config_path) {
            Ok(contents) => match serde_yaml::from_str::<ConfigFile>(&contents) {
                Ok(config) => Self::from_entries(config.api_keys),
                Err(e) => {
                    tracing::warn!("Failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!(
                    "Failed to read config file {}: {}",
                    config_path.display(),
                    e
                );
                Self::default()
            }
        };

        if store.keys.is_empty() {
            tracing::warn!("No API keys loaded - all authenticated requests will fail");
        } else {
            tracing::info!("Loaded {} API key(s)", store.keys.len());
        }
        store
    }

    fn validate(&self, key: &str) -> Option<AuthUser> {
        self.keys.get(key).cloned()
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub api_keys: Arc<ApiKeyStore>,
    pub storage: Arc<ServerStorage>,
}

/// Error body returned by every failing route.
#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

fn error_response(status: StatusCode, error: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error,
            message: message.into(),
        }),
    )
        .into_response()
}

impl IntoResponse for ServerStorageError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        match self {
            ServerStorageError::UnknownCollection(_) => {
                error_response(StatusCode::BAD_REQUEST, "unknown_collection", message)
            }
            ServerStorageError::InvalidId(_) => {
                error_response(StatusCode::BAD_REQUEST, "invalid_id", message)
            }
            ServerStorageError::Rejected(e) if e.kind == RemoteErrorKind::Stale => {
                error_response(StatusCode::CONFLICT, "stale", message)
            }
            ServerStorageError::Rejected(_) => {
                error_response(StatusCode::UNPROCESSABLE_ENTITY, "malformed", message)
            }
            ServerStorageError::IoError(_, _) | ServerStorageError::CorruptCollection(_, _) => {
                tracing::error!("Storage failure: {}", message);
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "storage", message)
            }
        }
    }
}

/// Authentication middleware
async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let api_key = match auth_header {
        Some(h) => match h.strip_prefix("Bearer ") {
            Some(key) => key,
            None => {
                return error_response(
                    StatusCode::UNAUTHORIZED,
                    "invalid_auth",
                    "Authorization header must use Bearer scheme",
                );
            }
        },
        None => {
            return error_response(
                StatusCode::UNAUTHORIZED,
                "missing_auth",
                "Authorization header required",
            );
        }
    };

    match state.api_keys.validate(api_key) {
        Some(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        None => error_response(StatusCode::UNAUTHORIZED, "invalid_key", "Invalid API key"),
    }
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Health check endpoint (no auth required)
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn put_document(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((collection, id)): Path<(String, String)>,
    Json(document): Json<Document>,
) -> Result<StatusCode, ServerStorageError> {
    let kind = ServerStorage::collection(&collection)?;
    state.storage.upsert(kind, &id, document)?;
    tracing::debug!(user = %user.user_id, %kind, id = %id, "Document stored");
    Ok(StatusCode::NO_CONTENT)
}

async fn get_document(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<Response, ServerStorageError> {
    let kind = ServerStorage::collection(&collection)?;
    Ok(match state.storage.get(kind, &id)? {
        Some(document) => Json(document).into_response(),
        None => error_response(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("No document '{}' in {}", id, kind),
        ),
    })
}

async fn delete_document(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<StatusCode, ServerStorageError> {
    let kind = ServerStorage::collection(&collection)?;
    let removed = state.storage.delete(kind, &id)?;
    tracing::debug!(user = %user.user_id, %kind, id = %id, removed, "Document deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn query_documents(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Json(query): Json<RemoteQuery>,
) -> Result<Json<Vec<Document>>, ServerStorageError> {
    let kind = ServerStorage::collection(&collection)?;
    Ok(Json(state.storage.query(kind, &query)?))
}

/// Builds the full application: public routes, authenticated document
/// routes and request tracing.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new().route("/health", get(health));

    let protected_routes = Router::new()
        .route("/collections/{collection}/query", post(query_documents))
        .route(
            "/collections/{collection}/{id}",
            get(get_document).put(put_document).delete(delete_document),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request as HttpRequest;
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    const KEY: &str = "test-key";

    fn setup() -> (Router, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let state = AppState {
            api_keys: Arc::new(ApiKeyStore::from_entries([ApiKeyEntry {
                key: KEY.to_string(),
                user_id: "farmer".to_string(),
            }])),
            storage: Arc::new(ServerStorage::new(temp_dir.path())),
        };
        (router(state), temp_dir)
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        key: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = HttpRequest::builder().method(method).uri(uri);
        if let Some(key) = key {
            builder = builder.header("authorization", format!("Bearer {}", key));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, payload)
    }

    #[tokio::test]
    async fn test_health_needs_no_auth() {
        let (app, _temp) = setup();
        let (status, body) = send(&app, "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_document_routes_require_valid_key() {
        let (app, _temp) = setup();
        let (status, body) = send(&app, "GET", "/collections/animals/a1", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "missing_auth");

        let (status, body) =
            send(&app, "GET", "/collections/animals/a1", Some("wrong"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "invalid_key");
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let (app, _temp) = setup();
        let document = json!({"id": "a1", "updatedAt": "2025-01-01T00:00:00Z", "name": "Bella"});

        let (status, _) = send(&app, "PUT", "/collections/animals/a1", Some(KEY), Some(document)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = send(&app, "GET", "/collections/animals/a1", Some(KEY), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Bella");

        let (status, _) = send(&app, "DELETE", "/collections/animals/a1", Some(KEY), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, "DELETE", "/collections/animals/a1", Some(KEY), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = send(&app, "GET", "/collections/animals/a1", Some(KEY), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");
    }

    #[tokio::test]
    async fn test_stale_put_is_conflict() {
        let (app, _temp) = setup();
        let newer = json!({"id": "a1", "updatedAt": "2025-01-02T00:00:00Z"});
        let older = json!({"id": "a1", "updatedAt": "2025-01-01T00:00:00Z"});
        send(&app, "PUT", "/collections/animals/a1", Some(KEY), Some(newer)).await;

        let (status, body) =
            send(&app, "PUT", "/collections/animals/a1", Some(KEY), Some(older)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "stale");

        let missing = json!({"id": "a1"});
        let (status, _) =
            send(&app, "PUT", "/collections/animals/a1", Some(KEY), Some(missing)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_unknown_collection_is_bad_request() {
        let (app, _temp) = setup();
        let (status, body) = send(&app, "GET", "/collections/pastures/p1", Some(KEY), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "unknown_collection");
    }

    #[tokio::test]
    async fn test_query_route() {
        let (app, _temp) = setup();
        for (id, animal) in [("m1", "a1"), ("m2", "a2"), ("m3", "a1")] {
            let document = json!({"id": id, "updatedAt": "2025-01-01T00:00:00Z", "animalId": animal});
            send(
                &app,
                "PUT",
                &format!("/collections/milk_production/{}", id),
                Some(KEY),
                Some(document),
            )
            .await;
        }

        let query = serde_json::to_value(RemoteQuery::new().where_eq("animalId", "a1")).unwrap();
        let (status, body) = send(
            &app,
            "POST",
            "/collections/milk_production/query",
            Some(KEY),
            Some(query),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 2);
    }
}
