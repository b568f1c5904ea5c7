//! One request/reply exchange on the command socket.

use std::path::Path;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;

use crate::command::types::FileInfo;
use crate::error::{BridgeError, Result};
use crate::ipc::codec::{ArgBlock, ArgLine, LineCodec, decode_response_header};
use crate::ipc::messages::{DONE, MAX_ARG_LINES, Request, Response, ResponseHeader};

/// Send `request` and read the reply.
///
/// `Ok(Some(args))` for an `ok` reply, `Ok(None)` when the daemon refused the
/// command (its argument block is read and discarded). Any error means the
/// socket is no longer in a known state and must be dropped.
pub async fn send_request<S>(
    framed: &mut Framed<S, LineCodec>,
    request: Request,
    io_timeout: Duration,
) -> Result<Option<Response>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let name = request.name.clone();
    match tokio::time::timeout(io_timeout, framed.send(request)).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(BridgeError::TransactionIo(format!(
                "timed out sending {}",
                name
            )));
        }
    }

    let header = read_line(framed, io_timeout).await?;
    match decode_response_header(&header) {
        ResponseHeader::Ok => {
            let mut block = ArgBlock::new();
            loop {
                let line = read_line(framed, io_timeout).await?;
                if block.push(&line)? == ArgLine::Done {
                    break;
                }
            }
            tracing::trace!(command = %name, lines = block.line_count(), "reply ok");
            Ok(Some(block.into_args()))
        }
        ResponseHeader::Failed(status) => {
            tracing::debug!(command = %name, status = %status, "daemon refused command");
            drain_block(framed, io_timeout).await?;
            Ok(None)
        }
    }
}

/// Skip lines up to `done`, bounded by [`MAX_ARG_LINES`].
async fn drain_block<S>(framed: &mut Framed<S, LineCodec>, io_timeout: Duration) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut skipped = 0;
    loop {
        let line = read_line(framed, io_timeout).await?;
        if line == DONE {
            return Ok(());
        }
        skipped += 1;
        if skipped > MAX_ARG_LINES {
            return Err(BridgeError::ProtocolViolation(format!(
                "more than {} lines after failed reply",
                MAX_ARG_LINES
            )));
        }
    }
}

async fn read_line<S>(framed: &mut Framed<S, LineCodec>, io_timeout: Duration) -> Result<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match tokio::time::timeout(io_timeout, framed.next()).await {
        Ok(Some(line)) => line,
        Ok(None) => Err(BridgeError::TransactionIo(
            "connection closed mid-transaction".into(),
        )),
        Err(_) => Err(BridgeError::TransactionIo(format!(
            "no reply within {:?}",
            io_timeout
        ))),
    }
}

/// Run the file-info sequence for one path.
///
/// `get_emblems` first; if the daemon answers, that is all. Otherwise
/// `icon_overlay_file_status`, plus `get_folder_tag` for folders. A path that
/// is not valid UTF-8 cannot be sent and yields an empty result.
pub async fn file_info<S>(
    framed: &mut Framed<S, LineCodec>,
    path: &Path,
    is_directory: bool,
    io_timeout: Duration,
) -> Result<FileInfo>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut info = FileInfo::empty(is_directory);
    let Some(path_str) = path.to_str() else {
        log::debug!("path is not valid UTF-8, skipping: {}", path.display());
        return Ok(info);
    };

    let emblems = Request::with_path("get_emblems", path_str);
    info.emblems = send_request(framed, emblems, io_timeout).await?;
    if info.emblems.is_some() {
        return Ok(info);
    }

    info.file_status = send_request(
        framed,
        Request::with_path("icon_overlay_file_status", path_str),
        io_timeout,
    )
    .await?;

    if is_directory {
        info.folder_tag = send_request(
            framed,
            Request::with_path("get_folder_tag", path_str),
            io_timeout,
        )
        .await?;
    }

    Ok(info)
}
