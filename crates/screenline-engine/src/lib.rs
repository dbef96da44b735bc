//! Speech session client — one outbound WebSocket per call to the
//! conversational speech engine.

pub mod client;
pub mod events;

pub use client::{connect, EngineCommand, EngineHandle, EngineSettings};
pub use events::EngineEvent;
