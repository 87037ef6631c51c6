//! Live transport wrapped so every exchange lands in a cassette.

pub mod transport;
