//! The daemon process library: NDJSON protocol, shared state, and the
//! UNIX-domain socket server loop. The binary in `main.rs` is a thin
//! wrapper around [`server::serve`].

pub mod circuit;
pub mod error;
pub mod protocol;
pub mod server;
pub mod state;

pub use error::DaemonError;
pub use state::DaemonState;
