//! # Audio backends
//!
//! A backend adapts a concrete audio driver to the IO node's process
//! contract: it mirrors the node's channels as driver ports, checks that the
//! driver's sample rate and block size match the domain, and invokes
//! [`Node::process`](crate::Node::process) from the driver's realtime
//! thread.
//!
//! Currently one backend ships, behind the corresponding cargo feature:
//!
//! - [`jack`](https://github.com/RustAudio/rust-jack)

#[cfg(feature = "jack")]
pub mod jack;

use std::sync::Arc;

use crate::node::Node;

/// Unified API for audio backends.
pub trait AudioBackend {
    /// Start the driver stream, driving `node` from the driver's realtime
    /// callback.
    fn start(&mut self, node: Arc<Node>) -> Result<(), AudioBackendError>;
    /// Stop the backend.
    fn stop(&mut self) -> Result<(), AudioBackendError>;
    /// The native sample rate of the backend.
    fn sample_rate(&self) -> u32;
    /// The native block size of the backend, if there is one.
    fn block_size(&self) -> Option<usize>;
}

#[allow(missing_docs)]
#[derive(thiserror::Error, Debug)]
pub enum AudioBackendError {
    #[error(
        "You tried to start a backend that was already running. A backend can only be started once."
    )]
    BackendAlreadyRunning,
    #[error("You tried to stop a backend that was already stopped.")]
    BackendNotRunning,
    #[cfg(feature = "jack")]
    #[error(transparent)]
    JackError(#[from] ::jack::Error),
}
