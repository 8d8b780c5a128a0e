//! Feedback Collector Core Library
//!
//! Resource lifecycle core for an ephemeral feedback-collection server.
//! Provides functionality to:
//! - Acquire a TCP port across platforms (preferred, fallback range, random)
//! - Identify and safely terminate processes occupying a port
//! - Track time-bounded feedback sessions settled by an external event
//!
//! # Architecture
//! - `port`: availability probing and the port conflict state machine
//! - `inspect`: platform-specific port-to-process lookup
//! - `kill`: safety-gated, progressive process termination
//! - `session`: keyed registry of pending sessions with timeout sweeps
//! - `config`: environment-driven server configuration
//!
//! The HTTP/WebSocket transport, the MCP tool registration, and the UI
//! live outside this crate; they consume the interfaces re-exported
//! below and treat payloads and feedback entries as opaque.
//!
//! # Platform Support
//! - macOS: uses `lsof` and `ps`
//! - Linux: uses `ss` and `ps`
//! - Windows: uses `netstat` and `tasklist`

pub mod config;
pub mod error;
pub mod inspect;
pub mod kill;
pub mod models;
pub mod port;
pub mod session;

// Re-export commonly used types (primary API)
pub use config::ServerConfig;
pub use error::{Error, Result};
pub use inspect::{Inspect, ProcessInspector};
pub use kill::{ProcessKiller, SafetyPolicy, Terminate};
pub use models::{PortStatus, ProcessRecord};
pub use port::{is_port_available, PortManager, Probe, TcpProbe};
pub use session::{generate_session_id, SessionStats, SessionStore, SessionView};
