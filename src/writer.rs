//! Dedicated writer task for async links.
//!
//! Contexts and invokers send through the synchronous [`Transport`] trait.
//! On an async link that transport is a [`ChannelTransport`] queueing encoded
//! packets for this task, which drains them into the `AsyncWrite` half of the
//! stream.
//!
//! # Architecture
//!
//! ```text
//! ProtocolContext ─┐
//! Invoker ─────────┼─► ChannelTransport ─► mpsc ─► Writer Task ─► stream
//! Forwarding peer ─┘
//! ```
//!
//! Packets ready at the same time are batched into one vectored write. A full
//! queue surfaces as `Busy` to the sender, whose retry policy then applies.
//!
//! [`Transport`]: crate::transport::Transport

use std::io::IoSlice;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{MlfError, Result};
use crate::transport::ChannelTransport;

/// Maximum packets to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 16;

/// Spawn the writer task and return the transport feeding it.
///
/// The task ends cleanly once every clone of the transport is dropped, or
/// with an error if the stream fails.
pub fn spawn_writer_task<W>(
    writer: W,
    capacity: usize,
) -> (ChannelTransport, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let task = tokio::spawn(writer_loop(rx, writer));
    (ChannelTransport::new(tx), task)
}

/// Main writer loop - receives packets and writes them to the stream.
async fn writer_loop<W>(mut rx: mpsc::Receiver<Bytes>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);

    loop {
        // Wait for first packet
        let first = match rx.recv().await {
            Some(packet) => packet,
            None => {
                tracing::debug!("Writer queue closed, stopping");
                return Ok(());
            }
        };

        batch.clear();
        batch.push(first);
        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(packet) => batch.push(packet),
                Err(_) => break,
            }
        }

        if let Err(e) = write_batch(&mut writer, &batch).await {
            tracing::error!(error = %e, packets = batch.len(), "Write failed, stopping writer");
            return Err(e);
        }
    }
}

/// Write a batch of packets using scatter/gather I/O (write_vectored).
async fn write_batch<W>(writer: &mut W, batch: &[Bytes]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if batch.is_empty() {
        return Ok(());
    }

    let total_size: usize = batch.iter().map(Bytes::len).sum();
    let mut total_written = 0;

    while total_written < total_size {
        let slices = build_remaining_slices(batch, total_written);
        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(MlfError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }
        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// Build IoSlice array for the data remaining after `skip_bytes` were written.
fn build_remaining_slices(batch: &[Bytes], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len());
    let mut offset = 0;

    for packet in batch {
        let end = offset + packet.len();
        if skip_bytes < end {
            let start = skip_bytes.saturating_sub(offset);
            slices.push(IoSlice::new(&packet[start..]));
        }
        offset = end;
    }

    slices
}
