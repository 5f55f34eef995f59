pub mod codec;
pub mod config;
pub mod embed;
pub mod error;
pub mod funnel;
pub mod narration;
pub mod package;
pub mod settle;
pub mod store;
pub mod validation;
pub mod viewer;

// Re-export commonly used types for convenience
pub use codec::{DecodeFailure, Encoded, LinkCodec};
pub use config::AppConfig;
pub use error::Error;
pub use package::{Field, PitchPackage};
pub use store::{FileStore, KeyValueStore, MemoryStore, PitchStore};
pub use viewer::{ViewState, Viewer, ViewerCommand, ViewerHandle};
