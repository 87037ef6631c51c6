//! Transport answered from a cassette instead of the network.

pub mod transport;
