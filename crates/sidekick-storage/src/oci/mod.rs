//! OCI Object Storage output
//!
//! Every event becomes one JSON object named
//! `{prefix}/{YYYY-MM-DD}/{RFC3339Nano}.json` in the configured bucket.
//! Delivery is best effort: one `PutObject`, no retry, and the outcome is
//! recorded once in every metrics sink of the output's [`OutputReporter`].
//!
//! ```rust,no_run
//! use sidekick_core::{FalcoPayload, OutputReporter};
//! use sidekick_storage::{OciObjectStorageOutput, OciOutputConfig};
//!
//! # async fn example(config: OciOutputConfig) {
//! let output = OciObjectStorageOutput::new(config, OutputReporter::local("ociobjectstorage"));
//! match output.try_upload(&FalcoPayload::default()).await {
//!     Ok(receipt) => println!("stored {}", receipt.object_name),
//!     Err(e) => eprintln!("upload failed: {}", e),
//! }
//! # }
//! ```

mod client;
mod config;
mod error;
mod object_name;
mod signer;

pub use client::{
    ObjectStorage, OciObjectStorageClient, PutObjectRequest, PutObjectResponse,
    OPC_CLIENT_REQUEST_ID, OPC_REQUEST_ID,
};
pub use config::{KeySource, ObjectStorageConfig, OciOutputConfig, CONFIG_SECTION};
pub use error::{OciError, OciResult};
pub use object_name::{date_partition, object_name, rfc3339_nano};
pub use signer::{
    host_header, http_date, key_fingerprint, parse_private_key, signing_string, BodySigning,
    RequestSigner, REQUEST_TARGET, X_CONTENT_SHA256,
};

use async_trait::async_trait;
use serde::Serialize;
use sidekick_core::{FalcoPayload, Output, OutputReporter, OutputStatus};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{error, info};

/// Destination name used in statistics and metric tags
pub const DESTINATION: &str = "ociobjectstorage";

/// Content type of every stored object
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Outcome of a stored event
#[derive(Debug, Clone, PartialEq)]
pub struct UploadReceipt {
    pub object_name: String,
    pub etag: Option<String>,
    pub opc_request_id: Option<String>,
    pub bytes: usize,
}

/// Uploads events to an OCI Object Storage bucket
pub struct OciObjectStorageOutput {
    config: OciOutputConfig,
    reporter: OutputReporter,
    client: OnceCell<Arc<dyn ObjectStorage>>,
}

impl std::fmt::Debug for OciObjectStorageOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OciObjectStorageOutput")
            .field("config", &self.config)
            .field("reporter", &self.reporter)
            .field("client_ready", &self.client.initialized())
            .finish()
    }
}

impl OciObjectStorageOutput {
    /// Create the output; the client is built on first upload.
    ///
    /// The configuration is trimmed here and not validated.
    pub fn new(config: OciOutputConfig, reporter: OutputReporter) -> Self {
        Self {
            config: config.normalized(),
            reporter,
            client: OnceCell::new(),
        }
    }

    /// Create the output around an existing client
    pub fn with_client(
        config: OciOutputConfig,
        reporter: OutputReporter,
        client: Arc<dyn ObjectStorage>,
    ) -> Self {
        Self {
            config: config.normalized(),
            reporter,
            client: OnceCell::from(client),
        }
    }

    pub fn config(&self) -> &OciOutputConfig {
        &self.config
    }

    pub fn reporter(&self) -> &OutputReporter {
        &self.reporter
    }

    /// Shared client, built once. A failed build is retried on the next call.
    async fn client(&self) -> OciResult<Arc<dyn ObjectStorage>> {
        self.client
            .get_or_try_init(|| async {
                let pem = self.config.private_key_pem().inspect_err(|e| {
                    error!("OCIObjectStorage - Error while reading Private Key from file - {}", e)
                })?;

                let client = OciObjectStorageClient::new(&self.config, pem.expose_secret())
                    .inspect_err(|e| {
                        error!("OCIObjectStorage - Error while creating Object Storage Client - {}", e)
                    })?;

                Ok::<_, OciError>(Arc::new(client) as Arc<dyn ObjectStorage>)
            })
            .await
            .map(Arc::clone)
    }

    /// Store one event and return what the service answered.
    ///
    /// Records no metrics; see [`upload`](Self::upload).
    pub async fn try_upload<T>(&self, event: &T) -> OciResult<UploadReceipt>
    where
        T: Serialize + ?Sized + Sync,
    {
        let body = serde_json::to_vec(event)?;
        let object_name = object_name(
            &self.config.objectstorage.objectnameprefix,
            &chrono::Utc::now(),
        );
        let client = self.client().await?;

        let bytes = body.len();
        let response = client
            .put_object(PutObjectRequest {
                namespace: self.config.objectstorage.namespace.clone(),
                bucket: self.config.objectstorage.bucket.clone(),
                object_name: object_name.clone(),
                content_type: CONTENT_TYPE_JSON.to_string(),
                body,
            })
            .await?;

        Ok(UploadReceipt {
            object_name,
            etag: response.etag,
            opc_request_id: response.opc_request_id,
            bytes,
        })
    }

    /// Store one event, then record the outcome and log it
    pub async fn upload<T>(&self, event: &T)
    where
        T: Serialize + ?Sized + Sync,
    {
        match self.try_upload(event).await {
            Ok(receipt) => {
                self.reporter.record(OutputStatus::Ok);
                info!(
                    bucket = %self.config.objectstorage.bucket,
                    object = %receipt.object_name,
                    bytes = receipt.bytes,
                    opc_request_id = receipt.opc_request_id.as_deref().unwrap_or_default(),
                    "OCIObjectStorage - Upload to bucket OK"
                );
            }
            Err(e) => {
                self.reporter.record(OutputStatus::Error);
                error!(
                    status = e.status(),
                    "OCIObjectStorage - Error while Uploading message - {}",
                    e
                );
            }
        }
    }
}

#[async_trait]
impl Output for OciObjectStorageOutput {
    fn destination(&self) -> &str {
        self.reporter.destination()
    }

    async fn send(&self, payload: &FalcoPayload) {
        self.upload(payload).await;
    }
}
