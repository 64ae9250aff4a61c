//! Configuration of the OCI Object Storage output
//!
//! ```yaml
//! oci:
//!   tenancy: ocid1.tenancy.oc1..aaaa
//!   user: ocid1.user.oc1..aaaa
//!   region: us-ashburn-1
//!   fingerprint: "20:3b:97:13:55:1c:5b:0d:d3:37:d8:50:4e:c5:3a:34"
//!   privatekey: /etc/sidekick/oci_api_key.pem   # or the PEM text itself
//!   passphrase: ${OCI_KEY_PASSPHRASE:-}
//!   objectstorage:
//!     namespace: axaxnpcrorw5
//!     bucket: falco-events
//!     objectnameprefix: falco
//! ```
//!
//! Every string is whitespace-trimmed by [`OciOutputConfig::normalized`],
//! passphrase included.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sidekick_core::SensitiveString;
use std::path::PathBuf;
use validator::{Validate, ValidationError};

use super::error::{OciError, OciResult};

/// Top-level section name in the sidekick configuration
pub const CONFIG_SECTION: &str = "oci";

/// Configuration for the OCI Object Storage output
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate, JsonSchema)]
pub struct OciOutputConfig {
    /// Tenancy OCID
    #[serde(default)]
    #[validate(length(min = 1))]
    pub tenancy: String,

    /// User OCID owning the API signing key
    #[serde(default)]
    #[validate(length(min = 1))]
    pub user: String,

    /// Region identifier (e.g. `us-ashburn-1`)
    #[serde(default)]
    #[validate(length(min = 1))]
    pub region: String,

    /// Fingerprint of the API signing key
    #[serde(default)]
    #[validate(length(min = 1))]
    pub fingerprint: String,

    /// Path to the PEM private key, or the PEM text itself
    #[serde(default, alias = "private_key")]
    #[validate(custom(function = "validate_not_blank"))]
    pub privatekey: SensitiveString,

    /// Passphrase of an encrypted private key
    #[serde(default)]
    pub passphrase: SensitiveString,

    /// Bucket settings
    #[serde(default, alias = "object_storage")]
    #[validate(nested)]
    pub objectstorage: ObjectStorageConfig,

    /// Override of `https://objectstorage.{region}.oraclecloud.com`
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Request timeout; unset means no timeout beyond the transport's own
    #[serde(default)]
    #[validate(range(min = 1, max = 3600))]
    pub request_timeout_secs: Option<u64>,
}

/// Bucket settings of the OCI output
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate, JsonSchema)]
pub struct ObjectStorageConfig {
    /// Object Storage namespace of the tenancy
    #[serde(default)]
    #[validate(length(min = 1))]
    pub namespace: String,

    /// Target bucket
    #[serde(default)]
    #[validate(length(min = 1, max = 256))]
    pub bucket: String,

    /// Prefix of every object name; empty yields names starting with `/`
    #[serde(default, alias = "object_name_prefix")]
    pub objectnameprefix: String,
}

fn validate_not_blank(value: &SensitiveString) -> Result<(), ValidationError> {
    if value.expose_secret().trim().is_empty() {
        return Err(ValidationError::new("must_not_be_blank"));
    }
    Ok(())
}

/// Where the private key material comes from
#[derive(Debug, Clone, PartialEq)]
pub enum KeySource {
    /// PEM text embedded in configuration
    Inline,
    /// PEM file on disk
    File(PathBuf),
}

impl OciOutputConfig {
    /// Copy with every string trimmed
    pub fn normalized(&self) -> Self {
        Self {
            tenancy: self.tenancy.trim().to_string(),
            user: self.user.trim().to_string(),
            region: self.region.trim().to_string(),
            fingerprint: self.fingerprint.trim().to_string(),
            privatekey: self.privatekey.trimmed(),
            passphrase: self.passphrase.trimmed(),
            objectstorage: ObjectStorageConfig {
                namespace: self.objectstorage.namespace.trim().to_string(),
                bucket: self.objectstorage.bucket.trim().to_string(),
                objectnameprefix: self.objectstorage.objectnameprefix.trim().to_string(),
            },
            endpoint: self
                .endpoint
                .as_deref()
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(str::to_string),
            request_timeout_secs: self.request_timeout_secs,
        }
    }

    /// Validate the trimmed configuration
    pub fn check(&self) -> OciResult<()> {
        self.normalized()
            .validate()
            .map_err(|e| OciError::config(format!("invalid oci configuration: {}", e)))
    }

    /// `{tenancy}/{user}/{fingerprint}`, the signature key id
    pub fn key_id(&self) -> String {
        format!("{}/{}/{}", self.tenancy, self.user, self.fingerprint)
    }

    /// Whether `privatekey` holds PEM text or a path
    pub fn key_source(&self) -> KeySource {
        let value = self.privatekey.expose_secret().trim();
        if value.starts_with("-----BEGIN") {
            KeySource::Inline
        } else {
            KeySource::File(PathBuf::from(value))
        }
    }

    /// Resolve the PEM text, reading the key file when configured as a path
    pub fn private_key_pem(&self) -> OciResult<SensitiveString> {
        match self.key_source() {
            KeySource::Inline => Ok(self.privatekey.trimmed()),
            KeySource::File(path) => std::fs::read_to_string(&path)
                .map(SensitiveString::from)
                .map_err(|source| OciError::KeyRead { path, source }),
        }
    }

    /// Passphrase, `None` when unset
    pub fn passphrase(&self) -> Option<&str> {
        Some(self.passphrase.expose_secret()).filter(|p| !p.is_empty())
    }

    /// Service endpoint for the configured region
    pub fn endpoint(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://objectstorage.{}.oraclecloud.com", self.region),
        }
    }
}
