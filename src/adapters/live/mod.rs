//! Network-backed adapters.

pub mod http;
