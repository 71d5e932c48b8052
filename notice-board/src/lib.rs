//! A shared notice board served over TCP.
//!
//! Clients connect, receive a `HELLO` line describing the board, then send
//! one text command per line to post, query, pin, unpin, shake or clear
//! notes. See `README.md` for the wire format. Each module focuses on one
//! responsibility:
//!
//! - [`config`] holds the immutable board geometry and color palette.
//! - [`board`] owns the notes and pins behind a single readers-writer lock.
//! - [`protocol`] parses command lines, runs them against the board and
//!   formats replies, including the closed `ERROR` taxonomy.
//! - [`session`] runs the handshake and read/reply loop for one connection.
//! - [`server`] accepts TCP connections and spawns a session per client.
//! - [`cli`] parses the command-line interface for server and client modes.
//! - [`client`] is a terminal peer that relays stdin to a server.
//!
//! Integration tests use this crate directly to drive real TCP sessions
//! against a [`server::Server`] bound to an ephemeral port.

pub mod board;
pub mod cli;
pub mod client;
pub mod config;
pub mod protocol;
pub mod server;
pub mod session;
