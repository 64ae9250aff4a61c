//! Object Storage client
//!
//! [`ObjectStorage`] is the seam the uploader talks to. The real
//! implementation, [`OciObjectStorageClient`], issues one signed
//! `PUT /n/{namespace}/b/{bucket}/o/{objectName}` per object.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, ETAG};
use reqwest::{Method, Url};
use serde::Deserialize;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

use super::config::OciOutputConfig;
use super::error::{OciError, OciResult};
use super::signer::{BodySigning, RequestSigner};

/// Request id echoed back by the service
pub const OPC_REQUEST_ID: &str = "opc-request-id";

/// Request id chosen by the client
pub const OPC_CLIENT_REQUEST_ID: &str = "opc-client-request-id";

/// One object to store
#[derive(Debug, Clone, PartialEq)]
pub struct PutObjectRequest {
    pub namespace: String,
    pub bucket: String,
    pub object_name: String,
    pub content_type: String,
    pub body: Vec<u8>,
}

/// What the service returned for a stored object
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PutObjectResponse {
    pub etag: Option<String>,
    pub opc_request_id: Option<String>,
}

/// Object store the uploader writes to
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store one object, overwriting any object with the same name
    async fn put_object(&self, request: PutObjectRequest) -> OciResult<PutObjectResponse>;
}

/// Error document returned by the service
#[derive(Debug, Default, Deserialize)]
struct ServiceErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Signed HTTP client for OCI Object Storage
#[derive(Debug, Clone)]
pub struct OciObjectStorageClient {
    http: reqwest::Client,
    endpoint: Url,
    signer: RequestSigner,
}

impl OciObjectStorageClient {
    /// Build a client from a normalized configuration and the PEM key text
    pub fn new(config: &OciOutputConfig, private_key_pem: &str) -> OciResult<Self> {
        let signer = RequestSigner::from_pem(
            &config.tenancy,
            &config.user,
            &config.fingerprint,
            private_key_pem,
            config.passphrase(),
        )?;
        Self::with_signer(
            &config.endpoint(),
            signer,
            config.request_timeout_secs.map(Duration::from_secs),
        )
    }

    /// Build a client for an explicit endpoint
    pub fn with_signer(
        endpoint: &str,
        signer: RequestSigner,
        timeout: Option<Duration>,
    ) -> OciResult<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| OciError::Client(format!("invalid endpoint {}: {}", endpoint, e)))?;
        if endpoint.cannot_be_a_base() {
            return Err(OciError::Client(format!("invalid endpoint {}", endpoint)));
        }

        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("sidekick/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| OciError::Client(e.to_string()))?;

        Ok(Self {
            http,
            endpoint,
            signer,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// URL of an object; the name is one path segment, so `/` becomes `%2F`
    pub fn object_url(&self, namespace: &str, bucket: &str, object_name: &str) -> OciResult<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| OciError::Client(format!("invalid endpoint {}", self.endpoint)))?
            .pop_if_empty()
            .extend(["n", namespace, "b", bucket, "o", object_name]);
        Ok(url)
    }

    /// Unique id for request tracing
    fn generate_request_id() -> String {
        format!(
            "sidekick-{}-{}",
            std::process::id(),
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_micros())
                .unwrap_or(0)
        )
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[async_trait]
impl ObjectStorage for OciObjectStorageClient {
    async fn put_object(&self, request: PutObjectRequest) -> OciResult<PutObjectResponse> {
        let url = self.object_url(&request.namespace, &request.bucket, &request.object_name)?;

        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_str(&request.content_type)
                .map_err(|e| OciError::Client(format!("invalid content type: {}", e)))?,
        );
        headers.insert(CONTENT_LENGTH, HeaderValue::from(request.body.len()));
        let client_request_id = Self::generate_request_id();
        headers.insert(
            HeaderName::from_static(OPC_CLIENT_REQUEST_ID),
            HeaderValue::from_str(&client_request_id)
                .map_err(|e| OciError::Client(e.to_string()))?,
        );
        self.signer
            .sign_request(&Method::PUT, &url, &mut headers, &request.body, BodySigning::Exempt)?;

        debug!(
            object = %request.object_name,
            bytes = request.body.len(),
            request_id = %client_request_id,
            "PUT {}",
            url
        );

        let response = self
            .http
            .put(url)
            .headers(headers)
            .body(request.body)
            .send()
            .await?;

        let status = response.status();
        let opc_request_id = header_str(response.headers(), OPC_REQUEST_ID);

        if status.is_success() {
            return Ok(PutObjectResponse {
                etag: header_str(response.headers(), ETAG.as_str()),
                opc_request_id,
            });
        }

        let text = response.text().await.unwrap_or_default();
        let body: ServiceErrorBody = serde_json::from_str(&text).unwrap_or_default();
        Err(OciError::Service {
            status: status.as_u16(),
            code: if body.code.is_empty() {
                status.canonical_reason().unwrap_or("Unknown").to_string()
            } else {
                body.code
            },
            message: if body.message.is_empty() { text } else { body.message },
            opc_request_id: opc_request_id.unwrap_or_default(),
        })
    }
}
