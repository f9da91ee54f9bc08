//! Unix-socket transport for CSI messages.
//!
//! A connection carries exactly one JSON-encoded request, terminated by the
//! client shutting down its write half, followed by one JSON-encoded response
//! terminated by the server closing the connection.

pub mod client;
pub mod server;

/// Upper bound on a single encoded message.
pub const MAX_MESSAGE_BYTES: u64 = 16 * 1024 * 1024;
