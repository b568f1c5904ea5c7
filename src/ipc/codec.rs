//! Line codec and argument framing for the daemon protocol.
//!
//! Provides:
//! - `parse_arg_line` / `encode_request` / `decode_response_header` pure transforms
//! - `ArgBlock`, the bounded accumulator for `key\tv1\tv2` lines up to `done`
//! - `LineCodec`, a tokio-util codec that reads newline-terminated lines and writes requests

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{BridgeError, Result};
use crate::ipc::escape::{desanitize, sanitize};
use crate::ipc::messages::{Args, DONE, MAX_ARG_LINES, OK, Request, ResponseHeader};

/// Default cap on a single protocol line (1 MiB).
pub const DEFAULT_MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Parse one `key\tvalue1\tvalue2...` line.
///
/// A line without any tab has no value fields and is rejected. Key and values
/// are unescaped.
pub fn parse_arg_line(line: &str) -> Result<(String, Vec<String>)> {
    let mut fields = line.split('\t');
    let key = fields.next().unwrap_or_default();
    let values: Vec<String> = fields.map(desanitize).collect();

    if values.is_empty() {
        return Err(BridgeError::ProtocolViolation(format!(
            "malformed argument line: {:?}",
            line
        )));
    }

    Ok((desanitize(key), values))
}

/// Encode a command: name line, one line per argument key, then `done`.
pub fn encode_request(name: &str, args: &Args) -> Vec<u8> {
    let mut out = String::with_capacity(name.len() + 8);
    out.push_str(&sanitize(name));
    out.push('\n');

    for (key, values) in args {
        out.push_str(&sanitize(key));
        for value in values {
            out.push('\t');
            out.push_str(&sanitize(value));
        }
        out.push('\n');
    }

    out.push_str(DONE);
    out.push('\n');
    out.into_bytes()
}

/// Classify the first line of a command reply.
pub fn decode_response_header(line: &str) -> ResponseHeader {
    if line == OK {
        ResponseHeader::Ok
    } else {
        ResponseHeader::Failed(line.to_string())
    }
}

/// Outcome of feeding one line to an [`ArgBlock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgLine {
    /// Argument recorded; keep reading.
    More,
    /// `done` seen; the block is complete.
    Done,
}

/// Accumulates argument lines until `done`, enforcing [`MAX_ARG_LINES`].
#[derive(Debug, Default)]
pub struct ArgBlock {
    args: Args,
    lines: usize,
}

impl ArgBlock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line (without its terminator).
    pub fn push(&mut self, line: &str) -> Result<ArgLine> {
        if line == DONE {
            return Ok(ArgLine::Done);
        }

        self.lines += 1;
        if self.lines > MAX_ARG_LINES {
            return Err(BridgeError::ProtocolViolation(format!(
                "more than {} argument lines",
                MAX_ARG_LINES
            )));
        }

        let (key, values) = parse_arg_line(line)?;
        self.args.insert(key, values);
        Ok(ArgLine::More)
    }

    /// Number of argument lines consumed so far.
    pub fn line_count(&self) -> usize {
        self.lines
    }

    pub fn into_args(self) -> Args {
        self.args
    }
}

/// Newline-terminated line codec.
///
/// Decoding yields lines without the `\n`. A partial line stays in the read
/// buffer and scanning resumes where it stopped, so suspended reads never
/// rescan bytes they already looked at.
#[derive(Debug, Clone)]
pub struct LineCodec {
    next_index: usize,
    max_length: usize,
}

impl LineCodec {
    /// Create a codec with the default max line length.
    pub fn new() -> Self {
        Self::with_max_length(DEFAULT_MAX_LINE_LENGTH)
    }

    /// Create a codec with a custom max line length.
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            next_index: 0,
            max_length,
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = BridgeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        let search_from = self.next_index.min(src.len());

        match src[search_from..].iter().position(|&b| b == b'\n') {
            Some(offset) => {
                let pos = search_from + offset;
                self.next_index = 0;

                if pos > self.max_length {
                    return Err(BridgeError::ProtocolViolation(format!(
                        "line too long: {} > {}",
                        pos, self.max_length
                    )));
                }

                let line = src.split_to(pos);
                src.advance(1);

                String::from_utf8(line.to_vec())
                    .map(Some)
                    .map_err(|_| BridgeError::ProtocolViolation("line is not valid UTF-8".into()))
            }
            None => {
                if src.len() > self.max_length {
                    return Err(BridgeError::ProtocolViolation(format!(
                        "line too long: {} > {}",
                        src.len(),
                        self.max_length
                    )));
                }
                self.next_index = src.len();
                Ok(None)
            }
        }
    }
}

impl Encoder<Request> for LineCodec {
    type Error = BridgeError;

    fn encode(&mut self, item: Request, dst: &mut BytesMut) -> Result<()> {
        let encoded = encode_request(&item.name, &item.args);
        dst.reserve(encoded.len());
        dst.extend_from_slice(&encoded);
        Ok(())
    }
}
