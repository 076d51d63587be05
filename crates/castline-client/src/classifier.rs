//! Software classification
//!
//! Works out which broadcast software answered by asking for its version
//! and matching the vendor string. The match is a heuristic; a stricter
//! scheme can replace [`VendorClassifier`] through the [`Classifier`] trait.

use async_trait::async_trait;
use castline_core::{request, SoftwareVariant, VersionReply, SECONDARY_VENDOR_MARKER};
use castline_transport::RpcConnection;
use tracing::{debug, warn};

/// Decides which software variant is on the other end of a connection
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Never fails; anything that cannot be determined is `Unknown`
    async fn classify(&self, connection: &dyn RpcConnection) -> SoftwareVariant;
}

/// Case-insensitive substring match on `GetVersion`'s `vendorName`
#[derive(Debug, Clone)]
pub struct VendorClassifier {
    marker: String,
}

impl VendorClassifier {
    /// Classify vendors containing `marker` as Streamlabs
    pub fn new(marker: &str) -> Self {
        Self {
            marker: marker.to_lowercase(),
        }
    }

    pub fn classify_vendor(&self, vendor: &str) -> SoftwareVariant {
        if vendor.to_lowercase().contains(&self.marker) {
            SoftwareVariant::Streamlabs
        } else {
            SoftwareVariant::Obs
        }
    }
}

impl Default for VendorClassifier {
    fn default() -> Self {
        Self::new(SECONDARY_VENDOR_MARKER)
    }
}

#[async_trait]
impl Classifier for VendorClassifier {
    async fn classify(&self, connection: &dyn RpcConnection) -> SoftwareVariant {
        let data = match connection.call(request::GET_VERSION, None).await {
            Ok(data) => data,
            Err(e) => {
                warn!("Version query failed, software unknown: {}", e);
                return SoftwareVariant::Unknown;
            }
        };

        match VersionReply::from_value(data) {
            Ok(reply) => {
                let variant = self.classify_vendor(reply.vendor());
                debug!("Vendor {:?} classified as {}", reply.vendor(), variant);
                variant
            }
            Err(e) => {
                warn!("Unreadable version reply, software unknown: {}", e);
                SoftwareVariant::Unknown
            }
        }
    }
}
