//! molbar Protocol - Text line protocol for the molecule bar
//!
//! This crate provides the command grammar shared by the stream,
//! datagram and console transports, and the reply payloads sent back to
//! datagram clients.

pub mod command;
pub mod reply;

pub use command::{parse_for, parse_line, Command, ParseError, Transport, MAX_LINE_LEN};
pub use reply::Reply;
