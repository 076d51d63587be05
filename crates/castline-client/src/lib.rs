//! Castline Client Library
//!
//! Session manager for the control connection to OBS Studio or
//! Streamlabs Desktop.
//!
//! # Example
//!
//! ```ignore
//! use castline_client::SessionManager;
//! use castline_core::DEFAULT_PRIMARY_ADDRESS;
//!
//! #[tokio::main]
//! async fn main() {
//!     let session = SessionManager::new();
//!
//!     // Falls back to Streamlabs' default port if OBS is not running
//!     if !session.connect(DEFAULT_PRIMARY_ADDRESS, None).await {
//!         return;
//!     }
//!     println!("talking to {}", session.software_type());
//!
//!     for scene in session.get_scenes().await {
//!         println!("{}", scene.scene_name);
//!     }
//!     session.set_current_scene("Intro").await;
//!     session.disconnect().await;
//! }
//! ```

pub mod builder;
pub mod classifier;
pub mod error;
pub mod publisher;
pub mod session;

pub use builder::{SessionConfig, SessionManagerBuilder};
pub use classifier::{Classifier, VendorClassifier};
pub use error::{ClientError, Result};
pub use publisher::{StatePublisher, StateSubscriber};
pub use session::SessionManager;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::builder::{SessionConfig, SessionManagerBuilder};
    pub use crate::error::{ClientError, Result};
    pub use crate::publisher::StateSubscriber;
    pub use crate::session::SessionManager;
    pub use castline_core::{ConnectionTarget, Scene, SessionState, SoftwareVariant};
}
