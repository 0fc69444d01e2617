//! Line-oriented console surface

use std::io::{self, BufRead, Cursor};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::io::StreamReader;
use tracing::debug;

use crate::error::Result;

/// Async view over lines read on a dedicated thread
pub type LineReader =
    StreamReader<ReceiverStream<io::Result<Cursor<Vec<u8>>>>, Cursor<Vec<u8>>>;

/// Read `input` line by line on its own OS thread.
///
/// The thread is detached, so a read that never returns does not hold up
/// runtime shutdown the way `tokio::io::stdin()` does.
pub fn spawn_line_reader<R>(input: R) -> Result<LineReader>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(16);
    std::thread::Builder::new()
        .name("line-reader".into())
        .spawn(move || forward_lines(input, tx))?;
    Ok(StreamReader::new(ReceiverStream::new(rx)))
}

/// Process stdin as a [`LineReader`]
pub fn stdin_lines() -> Result<LineReader> {
    spawn_line_reader(io::BufReader::new(io::stdin()))
}

fn forward_lines<R: BufRead>(mut input: R, tx: mpsc::Sender<io::Result<Cursor<Vec<u8>>>>) {
    loop {
        let mut line = Vec::new();
        let item = match input.read_until(b'\n', &mut line) {
            Ok(0) => break,
            Ok(_) => Ok(Cursor::new(line)),
            Err(e) => Err(e),
        };
        let failed = item.is_err();
        if tx.blocking_send(item).is_err() || failed {
            break;
        }
    }
    debug!("Line reader finished");
}

/// Async line reader paired with an incrementally flushed writer
pub struct Console<R, W> {
    input: R,
    output: W,
}

impl<R, W> Console<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Next line without its terminator, or `None` once input is closed
    pub async fn read_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        if self.input.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        let trimmed_len = line.trim_end_matches(['\r', '\n']).len();
        line.truncate(trimmed_len);
        Ok(Some(line))
    }

    /// Write and flush immediately
    pub async fn write(&mut self, text: &str) -> Result<()> {
        self.output.write_all(text.as_bytes()).await?;
        self.output.flush().await?;
        Ok(())
    }

    pub fn output(&self) -> &W {
        &self.output
    }

    pub fn into_output(self) -> W {
        self.output
    }
}
