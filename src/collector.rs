// ABOUTME: Stream collector that feeds stdin and drains stdout/stderr of a scoring process
// ABOUTME: Drain loops append to per-request growable buffers until end-of-stream
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 dravr.ai

use std::fmt;
use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, enabled, trace, Level};

/// Read chunk size for drain loops
const READ_CHUNK_BYTES: usize = 8192;

/// Which standard stream a drain loop is reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamName {
    /// Standard output
    Stdout,
    /// Standard error
    Stderr,
}

impl fmt::Display for StreamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => write!(f, "stdout"),
            Self::Stderr => write!(f, "stderr"),
        }
    }
}

/// Output collected from one scoring process
///
/// Owned by the request; the drain futures only borrow the buffers, so
/// whatever arrived before a timeout is still available afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectedOutput {
    /// Every byte written to standard output
    pub stdout: Vec<u8>,
    /// Every byte written to standard error
    pub stderr: Vec<u8>,
}

impl CollectedOutput {
    /// Standard error as lossy UTF-8 text
    #[must_use]
    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Read `reader` until end-of-stream, appending everything to `buf`
///
/// There is no size cap: stopping early would leave the subprocess blocked
/// on a full pipe. When `trace` logging is enabled, stderr lines are
/// mirrored to it; each byte is scanned for a newline once.
///
/// # Errors
///
/// Returns the underlying I/O error if a read fails.
pub async fn drain_into<R>(
    mut reader: R,
    buf: &mut Vec<u8>,
    stream: StreamName,
) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mirror = stream == StreamName::Stderr && enabled!(Level::TRACE);
    let mut tmp = [0u8; READ_CHUNK_BYTES];
    let mut line_start = buf.len();
    loop {
        let n = reader.read(&mut tmp).await?;
        if n == 0 {
            break;
        }
        let mut cursor = buf.len();
        buf.extend_from_slice(&tmp[..n]);

        if mirror {
            while let Some(offset) = buf[cursor..].iter().position(|b| *b == b'\n') {
                let end = cursor + offset;
                mirror_line(stream, &buf[line_start..end]);
                line_start = end + 1;
                cursor = line_start;
            }
        }
    }
    if mirror && line_start < buf.len() {
        mirror_line(stream, &buf[line_start..]);
    }
    debug!(%stream, bytes = buf.len(), "Stream reached end of file");
    Ok(buf.len())
}

fn mirror_line(stream: StreamName, line: &[u8]) {
    let line = String::from_utf8_lossy(line);
    trace!(%stream, line = %line.trim_end(), "Scoring process output");
}

/// Write the encoded request body, then close the write end
///
/// The writer is consumed, so end-of-input is signalled exactly once. A
/// broken pipe means the process exited or closed its input early; that
/// is not an error here because the exit status decides the outcome.
///
/// # Errors
///
/// Returns any I/O error other than a broken pipe.
pub async fn feed_stdin<W>(mut writer: W, body: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let written = async {
        writer.write_all(body).await?;
        writer.flush().await?;
        writer.shutdown().await
    }
    .await;
    drop(writer);

    match written {
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
            debug!(error = %e, "Scoring process closed stdin before reading the full request");
            Ok(())
        }
        other => other,
    }
}
