//! Network Module
//!
//! Framed TCP transport.
//!
//! ## Architecture
//! - One `TaggedConnection` per TCP socket
//! - Independent send and receive critical sections
//! - Used from both ends of the wire: clients connect, servers wrap
//!   accepted streams with `TaggedConnection::from_stream`

mod connection;

pub use connection::TaggedConnection;
