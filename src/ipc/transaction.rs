//! Resumable transaction reader for daemon-pushed events.
//!
//! A transaction is a name line, argument lines, and `done`. The decoder keeps
//! its position (`Mode`) and the unread tail of the socket buffer between calls,
//! so a transaction split across any number of reads is assembled exactly once.

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::error::{BridgeError, Result};
use crate::ipc::codec::{ArgBlock, ArgLine, LineCodec};
use crate::ipc::escape::desanitize;
use crate::ipc::messages::Transaction;

/// Where the reader is inside the current transaction.
#[derive(Debug, Default)]
enum Mode {
    #[default]
    ReadingName,
    ReadingArgs {
        name: String,
        block: ArgBlock,
    },
}

/// Decoder yielding one [`Transaction`] per `name ... done` block.
#[derive(Debug, Default)]
pub struct TransactionDecoder {
    lines: LineCodec,
    mode: Mode,
}

impl TransactionDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a decoder with a custom max line length.
    pub fn with_max_line_length(max_length: usize) -> Self {
        Self {
            lines: LineCodec::with_max_length(max_length),
            mode: Mode::ReadingName,
        }
    }

    /// True while no part of a transaction has been consumed.
    pub fn is_idle(&self) -> bool {
        matches!(self.mode, Mode::ReadingName)
    }
}

impl Decoder for TransactionDecoder {
    type Item = Transaction;
    type Error = BridgeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        while let Some(line) = self.lines.decode(src)? {
            match std::mem::take(&mut self.mode) {
                Mode::ReadingName => {
                    self.mode = Mode::ReadingArgs {
                        name: desanitize(&line),
                        block: ArgBlock::new(),
                    };
                }
                Mode::ReadingArgs { name, mut block } => match block.push(&line)? {
                    ArgLine::Done => {
                        return Ok(Some(Transaction {
                            name,
                            args: block.into_args(),
                        }));
                    }
                    ArgLine::More => {
                        self.mode = Mode::ReadingArgs { name, block };
                    }
                },
            }
        }
        Ok(None)
    }
}
