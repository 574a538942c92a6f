use async_trait::async_trait;
use axum::body::Bytes;
use reqwest::header::CONTENT_TYPE;
use tracing::{info, warn};

use super::AssetSink;
use crate::error::{BoardError, Result};

pub const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";

/// Uploads attachments to a Google Cloud Storage bucket as public objects.
///
/// Uses the JSON API's single-request media upload; the object is readable
/// as soon as the request returns.
pub struct GcsSink {
    http: reqwest::Client,
    bucket: String,
    access_token: Option<String>,
    endpoint: String,
}

impl GcsSink {
    pub fn new(bucket: impl Into<String>, access_token: Option<String>) -> Self {
        let bucket = bucket.into();
        info!(%bucket, "storing attachments in cloud storage");

        Self {
            http: reqwest::Client::new(),
            bucket,
            access_token,
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }

    /// Points uploads and public URLs at another host, e.g. a storage emulator.
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.trim_end_matches('/').to_string();
        self
    }

    fn public_url(&self, object_name: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket, object_name)
    }
}

#[async_trait]
impl AssetSink for GcsSink {
    async fn put(&self, object_name: &str, content_type: &str, bytes: Bytes) -> Result<String> {
        let url = format!("{}/upload/storage/v1/b/{}/o", self.endpoint, self.bucket);

        let mut request = self
            .http
            .post(url)
            .query(&[
                ("uploadType", "media"),
                ("name", object_name),
                ("predefinedAcl", "publicRead"),
            ])
            .header(CONTENT_TYPE, content_type)
            .body(bytes);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|err| BoardError::Upload(format!("{object_name}: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!(%status, object_name, %detail, "bucket rejected upload");
            return Err(BoardError::Upload(format!(
                "bucket {} rejected {object_name} with {status}",
                self.bucket
            )));
        }

        Ok(self.public_url(object_name))
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::Arc};

    use axum::{
        extract::{Path, Query, State},
        http::{HeaderMap, StatusCode},
        routing::post,
        Router,
    };
    use tokio::{net::TcpListener, sync::Mutex};

    use super::*;

    type Received = Arc<Mutex<Vec<(String, String, Option<String>, Vec<u8>)>>>;

    async fn fake_bucket(status: StatusCode) -> (String, Received) {
        let received: Received = Arc::default();

        let app = Router::new()
            .route(
                "/upload/storage/v1/b/:bucket/o",
                post(
                    move |State(received): State<Received>,
                          Path(bucket): Path<String>,
                          Query(params): Query<HashMap<String, String>>,
                          headers: HeaderMap,
                          body: Bytes| async move {
                        let auth = headers
                            .get("authorization")
                            .and_then(|value| value.to_str().ok())
                            .map(str::to_string);
                        let name = params.get("name").cloned().unwrap_or_default();
                        received.lock().await.push((bucket, name, auth, body.to_vec()));
                        status
                    },
                ),
            )
            .with_state(Arc::clone(&received));

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        (format!("http://{addr}"), received)
    }

    #[tokio::test]
    async fn uploads_with_token_and_returns_public_url() {
        let (endpoint, received) = fake_bucket(StatusCode::OK).await;
        let sink = GcsSink::new("messagesapi", Some("secret".into())).with_endpoint(&endpoint);

        let url = sink
            .put("x1-cat.png", "image/png", Bytes::from_static(b"png"))
            .await
            .expect("upload");

        assert_eq!(url, format!("{endpoint}/messagesapi/x1-cat.png"));
        let received = received.lock().await;
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].0, "messagesapi");
        assert_eq!(received[0].1, "x1-cat.png");
        assert_eq!(received[0].2.as_deref(), Some("Bearer secret"));
        assert_eq!(received[0].3, b"png");
    }

    #[tokio::test]
    async fn rejected_upload_is_an_upload_error() {
        let (endpoint, _received) = fake_bucket(StatusCode::FORBIDDEN).await;
        let sink = GcsSink::new("messagesapi", None).with_endpoint(&endpoint);

        let result = sink
            .put("x1-cat.png", "image/png", Bytes::from_static(b"png"))
            .await;

        assert!(matches!(result, Err(BoardError::Upload(_))));
    }
}
