//! Call-orchestration gateway.
//!
//! Hosts the inbound-call webhook and the media-stream WebSocket
//! endpoint, and runs one bridge per call: telephony frames in, engine
//! commands out, synthesized audio back, with turn-taking, barge-in,
//! and hangup sequencing in between.

pub mod bridge;
pub mod call_control;
pub mod connection;
pub mod server;
pub mod state;
pub mod transport;
pub mod twiml;

pub use server::start_gateway;
pub use state::GatewayState;
