//! Session layer: wire protocol, the cross-call session table, and the
//! per-call handler that wires transcription to suggestions.

pub mod handler;
pub mod manager;
pub mod protocol;

pub use handler::{InboundFrame, SessionHandler};
pub use manager::{ManagerStatus, SessionCounters, SessionManager, SessionSnapshot};
pub use protocol::{ClientMessage, ControlKind, ControlParams, ServerMessage};
