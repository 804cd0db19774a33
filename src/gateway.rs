//! Draft Store / Publish Gateway
//!
//! The backend contract a composite is persisted through:
//! - `POST /save-draft` multipart `image`, `model`, `position`, `rotation`, `scale`
//! - `POST /publish` multipart `image`, `model`, answers `{"jsonUrl": ...}`
//! - `GET /drafts` answers `[{"id", "imageUrl", "modelUrl", ...}]`
//!
//! [`HttpBackend`] speaks that protocol over HTTP. [`MemoryBackend`] keeps
//! everything in process.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use url::Url;
use uuid::Uuid;

use crate::composite::{FilePart, TransferForm};
use crate::config::{ConfigError, EditorConfig};
use crate::transform::Transform;

pub const SAVE_DRAFT_ENDPOINT: &str = "/save-draft";
pub const PUBLISH_ENDPOINT: &str = "/publish";
pub const DRAFTS_ENDPOINT: &str = "/drafts";

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Backend returned status {status} for {endpoint}")]
    Status { endpoint: String, status: u16 },

    #[error("Invalid response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },

    #[error("Invalid form field: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Cannot resolve `{reference}` against the backend URL: {source}")]
    InvalidUrl {
        reference: String,
        #[source]
        source: url::ParseError,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type TransportResult<T> = Result<T, TransportError>;

/// Server-assigned draft identifier. Backends send it as a string or a number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct DraftId(pub String);

impl fmt::Display for DraftId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for DraftId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(serde_json::Number),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(text) => DraftId(text),
            RawId::Number(number) => DraftId(number.to_string()),
        })
    }
}

/// A persisted composite as the backend lists it. Read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    #[serde(alias = "_id")]
    pub id: DraftId,
    pub image_url: String,
    pub model_url: String,
    #[serde(default = "zero3", deserialize_with = "vector_field")]
    pub position: [f64; 3],
    #[serde(default = "zero3", deserialize_with = "vector_field")]
    pub rotation: [f64; 3],
    #[serde(default = "one3", deserialize_with = "vector_field")]
    pub scale: [f64; 3],
}

fn zero3() -> [f64; 3] { [0.0; 3] }
fn one3() -> [f64; 3] { [1.0; 3] }

/// Vectors arrive either as arrays or as the JSON-encoded strings they were uploaded as.
fn vector_field<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[f64; 3], D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum VectorField {
        Array([f64; 3]),
        Encoded(String),
    }

    match VectorField::deserialize(deserializer)? {
        VectorField::Array(v) => Ok(v),
        VectorField::Encoded(text) => serde_json::from_str(&text).map_err(serde::de::Error::custom),
    }
}

impl Draft {
    pub fn transform(&self) -> Transform {
        Transform {
            position: self.position,
            rotation: self.rotation,
            scale: self.scale,
        }
    }
}

/// Public reference of a published artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishReceipt {
    pub json_url: String,
}

impl PublishReceipt {
    fn checked(self, endpoint: &str) -> TransportResult<Self> {
        if self.json_url.trim().is_empty() {
            return Err(TransportError::Decode {
                endpoint: endpoint.to_string(),
                message: "empty jsonUrl".to_string(),
            });
        }
        Ok(self)
    }
}

/// Backend contract for drafts and publishing.
#[async_trait::async_trait]
pub trait ArtifactBackend: Send + Sync {
    /// Persist a draft. Only an acknowledgement comes back.
    async fn save_draft(&self, form: &TransferForm) -> TransportResult<()>;

    /// Snapshot of all saved drafts, in backend order.
    async fn list_drafts(&self) -> TransportResult<Vec<Draft>>;

    /// Publish the layers. The transform is not part of a publish request.
    async fn publish(&self, form: &TransferForm) -> TransportResult<PublishReceipt>;

    /// Download an asset referenced by a draft.
    async fn fetch_asset(&self, url: &str) -> TransportResult<Vec<u8>>;
}

// --- HTTP ---

pub struct HttpBackend {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpBackend {
    pub fn new(config: &EditorConfig) -> TransportResult<Self> {
        Self::with_builder(config, reqwest::Client::builder())
    }

    /// Build on a caller-prepared client builder (proxies, TLS roots). The
    /// configured request timeout is applied on top.
    pub fn with_builder(config: &EditorConfig, builder: reqwest::ClientBuilder) -> TransportResult<Self> {
        let base_url = config.base_url()?;
        let client = builder.timeout(config.request_timeout()).build()?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Endpoint beneath the base path, e.g. `/drafts` under `https://host/api/`.
    pub fn endpoint_url(&self, endpoint: &str) -> TransportResult<Url> {
        self.resolve(endpoint.trim_start_matches('/'))
    }

    /// Resolve a reference the backend handed out (`imageUrl`, `modelUrl`).
    ///
    /// Absolute, protocol-relative and server-relative references follow
    /// the usual URL resolution rules against the base URL.
    pub fn resolve(&self, reference: &str) -> TransportResult<Url> {
        self.base_url.join(reference).map_err(|source| TransportError::InvalidUrl {
            reference: reference.to_string(),
            source,
        })
    }

    fn layer_form(form: &TransferForm) -> TransportResult<Form> {
        Ok(Form::new()
            .part("image", file_part(&form.image)?)
            .part("model", file_part(&form.model)?))
    }

    async fn send(&self, endpoint: &str, request: reqwest::RequestBuilder) -> TransportResult<reqwest::Response> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            log::warn!("event=backend_error endpoint={} status={}", endpoint, status.as_u16());
            return Err(TransportError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

fn file_part(file: &FilePart) -> TransportResult<Part> {
    let part = Part::bytes(file.bytes.clone()).file_name(file.file_name.clone());
    if file.media_type.is_empty() {
        Ok(part)
    } else {
        Ok(part.mime_str(&file.media_type)?)
    }
}

fn decode<T: serde::de::DeserializeOwned>(endpoint: &str, body: &[u8]) -> TransportResult<T> {
    serde_json::from_slice(body).map_err(|e| TransportError::Decode {
        endpoint: endpoint.to_string(),
        message: e.to_string(),
    })
}

#[async_trait::async_trait]
impl ArtifactBackend for HttpBackend {
    async fn save_draft(&self, form: &TransferForm) -> TransportResult<()> {
        let mut body = Self::layer_form(form)?;
        for (name, value) in form.transform.form_fields()? {
            body = body.text(name, value);
        }

        let request = self.client.post(self.endpoint_url(SAVE_DRAFT_ENDPOINT)?).multipart(body);
        self.send(SAVE_DRAFT_ENDPOINT, request).await?;
        Ok(())
    }

    async fn list_drafts(&self) -> TransportResult<Vec<Draft>> {
        let request = self.client.get(self.endpoint_url(DRAFTS_ENDPOINT)?);
        let body = self.send(DRAFTS_ENDPOINT, request).await?.bytes().await?;
        decode(DRAFTS_ENDPOINT, &body)
    }

    async fn publish(&self, form: &TransferForm) -> TransportResult<PublishReceipt> {
        let request = self
            .client
            .post(self.endpoint_url(PUBLISH_ENDPOINT)?)
            .multipart(Self::layer_form(form)?);
        let body = self.send(PUBLISH_ENDPOINT, request).await?.bytes().await?;
        decode::<PublishReceipt>(PUBLISH_ENDPOINT, &body)?.checked(PUBLISH_ENDPOINT)
    }

    async fn fetch_asset(&self, url: &str) -> TransportResult<Vec<u8>> {
        let request = self.client.get(self.resolve(url)?);
        let body = self.send(url, request).await?.bytes().await?;
        Ok(body.to_vec())
    }
}

// --- In-process ---

#[derive(Debug, Clone, PartialEq)]
pub struct PublishedArtifact {
    pub json_url: String,
    pub image: FilePart,
    pub model: FilePart,
}

#[derive(Debug, Default)]
struct MemoryState {
    drafts: Vec<Draft>,
    published: Vec<PublishedArtifact>,
    assets: HashMap<String, Vec<u8>>,
}

/// Backend that lives in the editor process.
///
/// Writes become visible only once they complete; `with_latency` delays
/// every write so that ordering can be observed.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
    requests: AtomicUsize,
    offline: AtomicBool,
    latency: Option<Duration>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of requests received so far, failed ones included.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// While offline every request fails with status 503.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<PublishedArtifact> {
        self.state().published.clone()
    }

    async fn begin(&self, endpoint: &str, write: bool) -> TransportResult<()> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if write {
            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(TransportError::Status {
                endpoint: endpoint.to_string(),
                status: 503,
            });
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ArtifactBackend for MemoryBackend {
    async fn save_draft(&self, form: &TransferForm) -> TransportResult<()> {
        self.begin(SAVE_DRAFT_ENDPOINT, true).await?;

        let id = Uuid::new_v4().to_string();
        let image_url = format!("memory://drafts/{}/{}", id, form.image.file_name);
        let model_url = format!("memory://drafts/{}/{}", id, form.model.file_name);

        let mut state = self.state();
        state.assets.insert(image_url.clone(), form.image.bytes.clone());
        state.assets.insert(model_url.clone(), form.model.bytes.clone());
        state.drafts.push(Draft {
            id: DraftId(id),
            image_url,
            model_url,
            position: form.transform.position,
            rotation: form.transform.rotation,
            scale: form.transform.scale,
        });
        Ok(())
    }

    async fn list_drafts(&self) -> TransportResult<Vec<Draft>> {
        self.begin(DRAFTS_ENDPOINT, false).await?;
        Ok(self.state().drafts.clone())
    }

    async fn publish(&self, form: &TransferForm) -> TransportResult<PublishReceipt> {
        self.begin(PUBLISH_ENDPOINT, true).await?;

        let json_url = format!("memory://artifacts/{}.json", Uuid::new_v4());
        self.state().published.push(PublishedArtifact {
            json_url: json_url.clone(),
            image: form.image.clone(),
            model: form.model.clone(),
        });
        PublishReceipt { json_url }.checked(PUBLISH_ENDPOINT)
    }

    async fn fetch_asset(&self, url: &str) -> TransportResult<Vec<u8>> {
        self.begin(url, false).await?;
        self.state().assets.get(url).cloned().ok_or_else(|| TransportError::Status {
            endpoint: url.to_string(),
            status: 404,
        })
    }
}
