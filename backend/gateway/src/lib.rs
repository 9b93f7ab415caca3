//! locshare gateway.
//!
//! WebSocket transport, session protocol handling, fan-out and idle-session
//! reaping on top of `locshare-core`.

pub mod broadcaster;
pub mod handler;
pub mod server;
pub mod session_reaper;
pub mod ws_protocol;
pub mod ws_server;

pub use broadcaster::Broadcaster;
pub use handler::{JoinOutcome, SessionProtocolHandler};
pub use server::{build_router, start_server, GatewayConfig, GatewayState};
pub use session_reaper::SessionReaper;
