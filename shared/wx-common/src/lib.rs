//! Gateway Common Library
//!
//! Shared message model used by the router, the XML layer, and the outbound
//! API client.

pub mod message;

pub use message::*;
