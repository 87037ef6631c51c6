//! [`Transport`](crate::ports::Transport) implementations.
//!
//! `live` talks to a running webui. `recording` wraps it and captures each
//! exchange in a cassette, which `replaying` serves back offline.

pub mod live;
pub mod recording;
pub mod replaying;
