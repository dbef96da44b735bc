//! Core types, config, errors, and the call session model for Screenline.

pub mod classify;
pub mod config;
pub mod error;
pub mod prompts;
pub mod session;
pub mod turn;
