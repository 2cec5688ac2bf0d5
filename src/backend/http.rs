use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::common::{NewMessage, StoredDocument};
use crate::error::BackendError;

use super::{ChatBackend, Snapshot, Subscription};

const API_KEY_HEADER: &str = "x-api-key";

#[derive(Serialize)]
struct TokenRequest<'a> {
    token: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponse {
    user_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AppendRequest<'a> {
    #[serde(flatten)]
    record: &'a NewMessage,
    /// Field the store fills with its own commit time.
    server_timestamp: &'a str,
}

#[derive(Deserialize)]
struct AppendResponse {
    id: String,
}

/// One frame of the listen stream.
#[derive(Deserialize)]
struct ListenFrame {
    #[serde(default)]
    documents: Vec<StoredDocument>,
}

/// Client for a REST document store.
pub struct HttpBackend {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    request_timeout: Duration,
}

impl HttpBackend {
    pub fn new(
        endpoint: &str,
        api_key: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self, BackendError> {
        // No whole-request timeout on the client: the listen stream stays open.
        let client = Client::builder()
            .connect_timeout(request_timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
            request_timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.endpoint, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match &self.api_key {
            Some(key) => builder.header(API_KEY_HEADER, key),
            None => builder,
        }
    }
}

async fn ensure_success(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        Err(BackendError::Auth(format!("{status}: {message}")))
    } else {
        Err(BackendError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

/// Split complete newline-terminated frames off the front of `buffer`.
///
/// A trailing partial line stays in the buffer; blank lines are heartbeats.
fn drain_frames(buffer: &mut Vec<u8>) -> Vec<Result<Snapshot, BackendError>> {
    let mut frames = Vec::new();
    while let Some(end) = buffer.iter().position(|byte| *byte == b'\n') {
        let line: Vec<u8> = buffer.drain(..=end).collect();
        let line = line.trim_ascii();
        if line.is_empty() {
            continue;
        }
        frames.push(
            serde_json::from_slice::<ListenFrame>(line)
                .map(|frame| frame.documents)
                .map_err(BackendError::from),
        );
    }
    frames
}

/// Size of a truncated frame left behind when the stream ends.
fn unterminated_len(buffer: &[u8]) -> usize {
    buffer.trim_ascii().len()
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn authenticate(&self, credential: Option<&str>) -> Result<String, BackendError> {
        let request = match credential {
            Some(token) => self
                .request(Method::POST, "auth/token")
                .json(&TokenRequest { token }),
            None => self.request(Method::POST, "auth/anonymous"),
        };

        let response = request.timeout(self.request_timeout).send().await?;
        let body: AuthResponse = ensure_success(response).await?.json().await?;
        Ok(body.user_id)
    }

    async fn subscribe(
        &self,
        collection: &str,
        order_by: &str,
    ) -> Result<Subscription, BackendError> {
        let response = self
            .request(Method::GET, &format!("{collection}:listen"))
            .query(&[("orderBy", order_by)])
            .send()
            .await?;
        let mut chunks = Box::pin(ensure_success(response).await?.bytes_stream());
        log::info!("Listening on {collection}");

        let stream = async_stream::stream! {
            let mut buffer = Vec::new();
            while let Some(chunk) = chunks.next().await {
                match chunk {
                    Ok(bytes) => {
                        buffer.extend_from_slice(&bytes);
                        for frame in drain_frames(&mut buffer) {
                            yield frame;
                        }
                    }
                    Err(err) => {
                        yield Err(BackendError::from(err));
                        break;
                    }
                }
            }
            let leftover = unterminated_len(&buffer);
            if leftover > 0 {
                log::warn!("Listen stream ended inside a frame; dropped {leftover} bytes");
            }
        };

        let path = collection.to_string();
        Ok(Subscription::new(stream, move || {
            log::debug!("Closing listen connection for {path}");
        }))
    }

    async fn append(&self, collection: &str, record: NewMessage) -> Result<String, BackendError> {
        let body = AppendRequest {
            record: &record,
            server_timestamp: crate::config::ORDER_FIELD,
        };
        let response = self
            .request(Method::POST, &format!("{collection}/documents"))
            .json(&body)
            .timeout(self.request_timeout)
            .send()
            .await?;

        let created: AppendResponse = ensure_success(response).await?.json().await?;
        Ok(created.id)
    }
}
