//! Streaming a tree into a chart loader
//!
//! The chart loader consumes a tar.gz stream. Rather than building the whole
//! archive in memory first, a writer task encodes the tree into a bounded
//! pipe while a reader task decodes from the other end. Both run as blocking
//! tasks in one `JoinSet`; the pipeline waits for both and returns the first
//! error in completion order.

use bundlekit_core::archive::write_tar_gz;
use bundlekit_core::{BundleFs, Chart, CoreError};
use std::io::{self, Read, Write};
use std::sync::mpsc::{Receiver, SyncSender, sync_channel};
use tokio::task::JoinSet;
use tracing::debug;

use crate::error::{ProvisionerError, Result};

/// Chunks buffered between the two stages
const PIPE_CAPACITY: usize = 16;

type Chunk = io::Result<Vec<u8>>;

/// Writing end of the pipe
pub struct PipeWriter {
    tx: SyncSender<Chunk>,
}

/// Reading end of the pipe
///
/// Reports end of stream once the writer is dropped, or the writer's error
/// if it closed the pipe with one.
pub struct PipeReader {
    rx: Receiver<Chunk>,
    buf: Vec<u8>,
    pos: usize,
}

/// Create a bounded in-memory pipe
pub fn pipe() -> (PipeWriter, PipeReader) {
    let (tx, rx) = sync_channel(PIPE_CAPACITY);
    (
        PipeWriter { tx },
        PipeReader {
            rx,
            buf: Vec::new(),
            pos: 0,
        },
    )
}

impl PipeWriter {
    /// Close the pipe so the reader fails with `err` instead of seeing EOF
    pub fn close_with_error(self, err: io::Error) {
        // a reader that already went away has nothing left to report to
        let _ = self.tx.send(Err(err));
    }
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.tx
            .send(Ok(buf.to_vec()))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "archive reader closed"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for PipeReader {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        while self.pos >= self.buf.len() {
            match self.rx.recv() {
                Ok(Ok(chunk)) => {
                    self.buf = chunk;
                    self.pos = 0;
                }
                Ok(Err(e)) => return Err(e),
                // writer dropped: end of stream
                Err(_) => return Ok(0),
            }
        }
        let n = out.len().min(self.buf.len() - self.pos);
        out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// Run a writer and a reader stage connected by a pipe
///
/// The writer closes the pipe with its error on failure. If the reader gives
/// up first, the writer stops quietly and the reader's error is reported.
/// Data the reader leaves unread is drained so the writer can finish.
pub async fn run<T, W, R>(write: W, read: R) -> Result<T>
where
    T: Send + 'static,
    W: FnOnce(&mut PipeWriter) -> Result<()> + Send + 'static,
    R: FnOnce(&mut PipeReader) -> Result<T> + Send + 'static,
{
    let (mut writer, mut reader) = pipe();
    let mut tasks: JoinSet<Result<Option<T>>> = JoinSet::new();

    tasks.spawn_blocking(move || match write(&mut writer) {
        Ok(()) => Ok(None),
        Err(e) if is_broken_pipe(&e) => Ok(None),
        Err(e) => {
            writer.close_with_error(io::Error::other(e.to_string()));
            Err(e)
        }
    });

    tasks.spawn_blocking(move || {
        let value = read(&mut reader)?;
        io::copy(&mut reader, &mut io::sink()).map_err(CoreError::from)?;
        Ok(Some(value))
    });

    let mut first_error = None;
    let mut output = None;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(Some(value))) => output = Some(value),
            Ok(Ok(None)) => {}
            Ok(Err(e)) => {
                first_error.get_or_insert(e);
            }
            Err(e) => {
                first_error.get_or_insert(ProvisionerError::Pipeline(e.to_string()));
            }
        }
    }

    if let Some(e) = first_error {
        return Err(e);
    }
    output.ok_or_else(|| ProvisionerError::Pipeline("reader stage produced no output".to_string()))
}

/// Stream a tree through the chart loader and validate the result
pub async fn load_chart(fs: BundleFs) -> Result<Chart> {
    let files = fs.len();
    let chart = run(
        move |writer| {
            write_tar_gz(&fs, writer)?;
            Ok(())
        },
        |reader| {
            let chart = Chart::load_archive(reader)?;
            chart.validate()?;
            Ok(chart)
        },
    )
    .await?;

    debug!(chart = chart.name(), files, "Loaded chart");
    Ok(chart)
}

fn is_broken_pipe(err: &ProvisionerError) -> bool {
    matches!(err, ProvisionerError::Core(CoreError::Io(e)) if e.kind() == io::ErrorKind::BrokenPipe)
}
