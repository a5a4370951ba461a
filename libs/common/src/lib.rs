//! canhub common library
//!
//! Process-level plumbing shared by the broker daemon and the CLI tools:
//! - logging initialisation and runtime level changes
//! - shutdown signal handling

pub mod logging;
pub mod shutdown;

// Re-export common dependencies
pub use tokio;
pub use tokio_util::sync::CancellationToken;
