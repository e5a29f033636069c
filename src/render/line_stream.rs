//! Merged, lossily decoded line reader over a child's stdout and stderr.
//!
//! Each pipe gets a reader thread that splits on `\n`, decodes with
//! `String::from_utf8_lossy` and forwards the line over a channel. The
//! consumer polls with a timeout so it can interleave other work (cancel
//! checks) without blocking on a silent process.

use std::io::{self, BufRead, BufReader, Read};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Outcome of a single poll.
#[derive(Debug)]
pub enum LinePoll {
    /// A decoded line, without its trailing `\r\n` / `\n`.
    Line(String),
    /// Nothing arrived within the timeout.
    Pending,
    /// Every pipe reached end of file.
    Ended,
    /// Reading a pipe failed.
    Failed(io::Error),
}

enum Message {
    Line(String),
    Closed,
    Failed(io::Error),
}

/// One-shot line sequence for a single process instance.
pub struct LineStream {
    rx: Receiver<Message>,
    open: usize,
    readers: Vec<JoinHandle<()>>,
}

impl LineStream {
    /// Start reading from the given pipes (typically stdout and stderr).
    pub fn spawn<R>(sources: Vec<R>) -> Self
    where
        R: Read + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let open = sources.len();
        let readers = sources
            .into_iter()
            .map(|source| {
                let tx = tx.clone();
                thread::spawn(move || pump(source, tx))
            })
            .collect();

        Self { rx, open, readers }
    }

    /// Wait up to `timeout` for the next line.
    ///
    /// Once `Ended` or `Failed` has been returned the stream is finished and
    /// further polls return `Ended`.
    pub fn poll(&mut self, timeout: Duration) -> LinePoll {
        loop {
            if self.open == 0 {
                return LinePoll::Ended;
            }
            match self.rx.recv_timeout(timeout) {
                Ok(Message::Line(line)) => return LinePoll::Line(line),
                Ok(Message::Closed) => {
                    self.open -= 1;
                }
                Ok(Message::Failed(e)) => {
                    self.open = 0;
                    return LinePoll::Failed(e);
                }
                Err(RecvTimeoutError::Timeout) => return LinePoll::Pending,
                Err(RecvTimeoutError::Disconnected) => {
                    self.open = 0;
                    return LinePoll::Ended;
                }
            }
        }
    }
}

impl Iterator for LineStream {
    type Item = io::Result<String>;

    /// Blocking iteration, mostly useful for tests and one-shot tools.
    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.poll(Duration::from_millis(100)) {
                LinePoll::Line(line) => return Some(Ok(line)),
                LinePoll::Pending => continue,
                LinePoll::Ended => return None,
                LinePoll::Failed(e) => return Some(Err(e)),
            }
        }
    }
}

impl Drop for LineStream {
    fn drop(&mut self) {
        // Readers finish on their own once the pipes close; only reap the
        // ones that already have.
        for handle in self.readers.drain(..) {
            if handle.is_finished() {
                let _ = handle.join();
            }
        }
    }
}

fn pump<R: Read>(source: R, tx: Sender<Message>) {
    let mut reader = BufReader::new(source);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => {
                let _ = tx.send(Message::Closed);
                return;
            }
            Ok(_) => {
                let line = decode_line(&buf);
                if tx.send(Message::Line(line)).is_err() {
                    return;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                let _ = tx.send(Message::Failed(e));
                return;
            }
        }
    }
}

/// Lossy UTF-8 decode with the line terminator removed.
pub fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}
