//! IPC Layer - wire format for the daemon's command and event sockets
//!
//! This module provides:
//! - Value escaping (`sanitize` / `desanitize`)
//! - Message types and protocol constants
//! - A line codec plus argument-block framing
//! - A resumable transaction decoder for pushed events
//!
//! No I/O happens here; the channels own the sockets.

pub mod codec;
pub mod escape;
pub mod messages;
pub mod transaction;

pub use codec::{
    ArgBlock, ArgLine, DEFAULT_MAX_LINE_LENGTH, LineCodec, decode_response_header, encode_request,
    parse_arg_line,
};
pub use escape::{desanitize, sanitize};
pub use messages::{Args, DONE, MAX_ARG_LINES, OK, Request, Response, ResponseHeader, Transaction};
pub use transaction::TransactionDecoder;
