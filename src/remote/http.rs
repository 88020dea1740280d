use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;

use super::{Document, RemoteError, RemoteErrorKind, RemoteQuery, RemoteStore};

/// Client for the `finca-server` document protocol.
pub struct HttpRemoteStore {
    server_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpRemoteStore {
    pub fn new(
        server_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::unavailable(e.to_string()))?;

        Ok(Self {
            server_url: server_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    fn document_url(&self, collection: &str, id: &str) -> String {
        format!(
            "{}/collections/{}/{}",
            self.server_url,
            urlencoding::encode(collection),
            urlencoding::encode(id)
        )
    }

    fn query_url(&self, collection: &str) -> String {
        format!(
            "{}/collections/{}/query",
            self.server_url,
            urlencoding::encode(collection)
        )
    }

    fn authorization(&self) -> String {
        format!("Bearer {}", self.api_key)
    }
}

fn transport_error(e: reqwest::Error) -> RemoteError {
    if e.is_timeout() {
        RemoteError::new(RemoteErrorKind::Timeout, e.to_string())
    } else if e.is_decode() {
        RemoteError::malformed(e.to_string())
    } else {
        RemoteError::unavailable(e.to_string())
    }
}

/// Maps a non-success response status onto the error taxonomy.
fn status_error(status: StatusCode, body: String) -> RemoteError {
    let kind = match status {
        StatusCode::UNAUTHORIZED => RemoteErrorKind::Unauthorized,
        StatusCode::FORBIDDEN => RemoteErrorKind::PermissionDenied,
        StatusCode::TOO_MANY_REQUESTS => RemoteErrorKind::QuotaExceeded,
        StatusCode::CONFLICT => RemoteErrorKind::Stale,
        StatusCode::NOT_FOUND => RemoteErrorKind::NotFound,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => RemoteErrorKind::Timeout,
        s if s.is_server_error() => RemoteErrorKind::Unavailable,
        _ => RemoteErrorKind::Malformed,
    };
    let message = if body.is_empty() {
        format!("server returned status {}", status)
    } else {
        format!("server returned status {}: {}", status, body)
    };
    RemoteError::new(kind, message)
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, body))
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn upsert(&self, collection: &str, id: &str, document: Document) -> Result<(), RemoteError> {
        let response = self
            .client
            .put(self.document_url(collection, id))
            .header("Authorization", self.authorization())
            .json(&document)
            .send()
            .await
            .map_err(transport_error)?;

        check(response).await?;
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), RemoteError> {
        let response = self
            .client
            .delete(self.document_url(collection, id))
            .header("Authorization", self.authorization())
            .send()
            .await
            .map_err(transport_error)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check(response).await?;
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, RemoteError> {
        let response = self
            .client
            .get(self.document_url(collection, id))
            .header("Authorization", self.authorization())
            .send()
            .await
            .map_err(transport_error)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let document = check(response)
            .await?
            .json::<Document>()
            .await
            .map_err(transport_error)?;
        Ok(Some(document))
    }

    async fn query(&self, collection: &str, query: &RemoteQuery) -> Result<Vec<Document>, RemoteError> {
        let response = self
            .client
            .post(self.query_url(collection))
            .header("Authorization", self.authorization())
            .json(query)
            .send()
            .await
            .map_err(transport_error)?;

        check(response)
            .await?
            .json::<Vec<Document>>()
            .await
            .map_err(transport_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (StatusCode::UNAUTHORIZED, RemoteErrorKind::Unauthorized),
            (StatusCode::FORBIDDEN, RemoteErrorKind::PermissionDenied),
            (StatusCode::TOO_MANY_REQUESTS, RemoteErrorKind::QuotaExceeded),
            (StatusCode::CONFLICT, RemoteErrorKind::Stale),
            (StatusCode::BAD_REQUEST, RemoteErrorKind::Malformed),
            (StatusCode::UNPROCESSABLE_ENTITY, RemoteErrorKind::Malformed),
            (StatusCode::SERVICE_UNAVAILABLE, RemoteErrorKind::Unavailable),
            (StatusCode::INTERNAL_SERVER_ERROR, RemoteErrorKind::Unavailable),
        ];
        for (status, kind) in cases {
            assert_eq!(status_error(status, String::new()).kind, kind, "{}", status);
        }
    }

    #[test]
    fn test_urls_are_encoded() {
        let store =
            HttpRemoteStore::new("http://localhost:8080/", "key", Duration::from_secs(1)).unwrap();
        assert_eq!(
            store.document_url("animals", "a 1/x"),
            "http://localhost:8080/collections/animals/a%201%2Fx"
        );
        assert_eq!(
            store.query_url("milk_production"),
            "http://localhost:8080/collections/milk_production/query"
        );
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transient() {
        // Port 9 (discard) is closed on test machines.
        let store =
            HttpRemoteStore::new("http://127.0.0.1:9", "key", Duration::from_secs(2)).unwrap();
        let err = store.get("animals", "a1").await.unwrap_err();
        assert!(err.is_transient(), "{:?}", err);
    }
}
