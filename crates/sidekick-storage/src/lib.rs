//! Object storage outputs for sidekick
//!
//! This crate provides outputs that archive each event as one object:
//!
//! - **OCI** - Oracle Cloud Infrastructure Object Storage
//!
//! # Feature Flags
//!
//! ```toml
//! # OCI only
//! sidekick-storage = { version = "0.1", features = ["oci"] }
//!
//! # All providers
//! sidekick-storage = { version = "0.1", features = ["full"] }
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use sidekick_core::{OutputReporter, SidekickConfig};
//!
//! let config = SidekickConfig::from_file("sidekick.yaml")?;
//! let outputs = sidekick_storage::outputs_from_config(&config, |name| OutputReporter::local(name))?;
//! for output in &outputs {
//!     output.send(&payload).await;
//! }
//! ```

#[cfg(feature = "oci")]
pub mod oci;

// Re-exports for convenience
#[cfg(feature = "oci")]
pub use oci::{
    ObjectStorage, OciError, OciObjectStorageClient, OciObjectStorageOutput, OciOutputConfig,
    PutObjectRequest, PutObjectResponse, UploadReceipt,
};

use sidekick_core::{Output, OutputReporter, SidekickConfig};
use std::sync::Arc;

/// Build every storage output that has a section in `config`.
///
/// `reporter` is called once per output with its destination name.
pub fn outputs_from_config<F>(
    config: &SidekickConfig,
    reporter: F,
) -> sidekick_core::Result<Vec<Arc<dyn Output>>>
where
    F: Fn(&str) -> OutputReporter,
{
    let mut outputs: Vec<Arc<dyn Output>> = Vec::new();

    #[cfg(feature = "oci")]
    if let Some(oci_config) = config.output::<OciOutputConfig>(oci::CONFIG_SECTION)? {
        let output = OciObjectStorageOutput::new(oci_config, reporter(oci::DESTINATION));
        outputs.push(Arc::new(output));
    }

    // Suppress unused warnings when no features are enabled
    let _ = (config, &reporter);

    Ok(outputs)
}
