// Public modules
pub mod archive;
pub mod artifact;
pub mod deploy;
pub mod digest;
pub mod error;
pub mod fetch;
pub mod layout;
pub mod pipeline;
pub mod release;
pub mod request;
pub mod ssh;
pub mod unit;

// Internal modules - not part of public API
pub(crate) mod paths;

// Public modules for CLI access
pub mod defaults;

// Re-export common types for convenience
pub use error::{Error, ErrorCode, Result};
