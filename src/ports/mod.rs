//! Port traits defining external boundaries.
//!
//! Each trait represents a boundary between the client core and an
//! external system. Implementations live in `src/adapters/`.

pub mod transport;

pub use transport::{ExecuteFuture, Method, Transport, WireRequest, WireResponse};
