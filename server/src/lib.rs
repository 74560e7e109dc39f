//! Callback Gateway Server
//!
//! Receives signed, encrypted webhook callbacks from the messaging platform,
//! dispatches the decrypted messages through an ordered rule table, and
//! issues outbound API calls back to the platform.

pub mod api;
pub mod config;
pub mod endpoint;
pub mod router;
pub mod xml;
