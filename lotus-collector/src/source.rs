//! Line stream sources.
//!
//! A [`StreamSource`] opens a live, blocking sequence of text lines. The capture
//! loop pulls from the returned [`LineStream`] on its own thread; the stream's
//! [`Interrupt`] handle lets another thread unblock a pending read.

use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

/// Errors from opening a stream source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("stream command is empty")]
    EmptyCommand,

    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("'{0}' did not expose a stdout pipe")]
    NoStdout(String),

    #[error("stream unavailable: {0}")]
    Unavailable(String),
}

/// Best-effort interruption of a blocked read.
pub trait Interrupt: Send + Sync {
    fn interrupt(&self);
}

/// A live sequence of lines.
pub trait LineStream: Send {
    /// Block until the next line, end-of-stream (`None`) or a read error.
    fn next_line(&mut self) -> Option<io::Result<String>>;

    /// Handle that unblocks `next_line` from another thread.
    fn interrupter(&self) -> Arc<dyn Interrupt>;
}

/// Producer of line streams.
pub trait StreamSource: Send + Sync {
    fn open(&self) -> Result<Box<dyn LineStream>, SourceError>;
}

impl<S: StreamSource + ?Sized> StreamSource for Arc<S> {
    fn open(&self) -> Result<Box<dyn LineStream>, SourceError> {
        (**self).open()
    }
}

/// Reads the stdout of an external command, one line at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSource {
    program: String,
    args: Vec<String>,
}

impl CommandSource {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build from `[program, args...]`.
    pub fn from_command_line(parts: &[String]) -> Result<Self, SourceError> {
        match parts.split_first() {
            Some((program, args)) if !program.is_empty() => {
                Ok(Self::new(program.clone(), args.to_vec()))
            }
            _ => Err(SourceError::EmptyCommand),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl StreamSource for CommandSource {
    fn open(&self) -> Result<Box<dyn LineStream>, SourceError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| SourceError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(SourceError::NoStdout(self.program.clone()));
            }
        };

        Ok(Box::new(CommandStream {
            reader: BufReader::new(stdout),
            buf: Vec::new(),
            child: Arc::new(ChildHandle {
                child: Mutex::new(child),
            }),
        }))
    }
}

struct ChildHandle {
    child: Mutex<Child>,
}

impl Interrupt for ChildHandle {
    fn interrupt(&self) {
        // Killing the child closes its end of the pipe, which ends a blocked read.
        let _ = self.child.lock().kill();
    }
}

struct CommandStream {
    reader: BufReader<ChildStdout>,
    buf: Vec<u8>,
    child: Arc<ChildHandle>,
}

impl LineStream for CommandStream {
    fn next_line(&mut self) -> Option<io::Result<String>> {
        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => None,
            Ok(_) => {
                if self.buf.last() == Some(&b'\n') {
                    self.buf.pop();
                    if self.buf.last() == Some(&b'\r') {
                        self.buf.pop();
                    }
                }
                Some(Ok(String::from_utf8_lossy(&self.buf).into_owned()))
            }
            Err(e) => Some(Err(e)),
        }
    }

    fn interrupter(&self) -> Arc<dyn Interrupt> {
        self.child.clone()
    }
}

impl Drop for CommandStream {
    fn drop(&mut self) {
        let mut child = self.child.child.lock();
        let _ = child.kill();
        let _ = child.wait();
    }
}

/// Flag-only interrupter used by the in-memory sources.
#[derive(Debug, Default)]
struct FlagInterrupt {
    interrupted: AtomicBool,
}

impl Interrupt for FlagInterrupt {
    fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }
}

/// Replays a fixed list of lines, for tests.
#[derive(Debug, Clone, Default)]
pub struct MockSource {
    lines: Vec<String>,
    read_error: Option<String>,
    open_error: Option<String>,
    opened: Arc<AtomicUsize>,
}

impl MockSource {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// End the stream with a read error instead of end-of-stream.
    pub fn with_read_error(mut self, message: impl Into<String>) -> Self {
        self.read_error = Some(message.into());
        self
    }

    /// Make `open` fail.
    pub fn failing_open(message: impl Into<String>) -> Self {
        Self {
            open_error: Some(message.into()),
            ..Self::default()
        }
    }

    /// How many times `open` succeeded.
    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

impl StreamSource for MockSource {
    fn open(&self) -> Result<Box<dyn LineStream>, SourceError> {
        if let Some(message) = &self.open_error {
            return Err(SourceError::Unavailable(message.clone()));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockStream {
            lines: self.lines.iter().cloned().collect(),
            read_error: self.read_error.clone(),
            interrupt: Arc::new(FlagInterrupt::default()),
        }))
    }
}

struct MockStream {
    lines: VecDeque<String>,
    read_error: Option<String>,
    interrupt: Arc<FlagInterrupt>,
}

impl LineStream for MockStream {
    fn next_line(&mut self) -> Option<io::Result<String>> {
        if self.interrupt.interrupted.load(Ordering::SeqCst) {
            return None;
        }
        match self.lines.pop_front() {
            Some(line) => Some(Ok(line)),
            None => self.read_error.take().map(|m| Err(io::Error::other(m))),
        }
    }

    fn interrupter(&self) -> Arc<dyn Interrupt> {
        self.interrupt.clone()
    }
}

enum Feed {
    Line(String),
    Fail(String),
    End,
}

/// Test side of a [`ChannelSource`]: pushes lines into an open stream.
#[derive(Clone)]
pub struct ChannelFeed {
    tx: Sender<Feed>,
}

impl ChannelFeed {
    pub fn send_line(&self, line: impl Into<String>) {
        let _ = self.tx.send(Feed::Line(line.into()));
    }

    /// Make the stream's next read fail.
    pub fn fail(&self, message: impl Into<String>) {
        let _ = self.tx.send(Feed::Fail(message.into()));
    }

    /// End the stream.
    pub fn close(&self) {
        let _ = self.tx.send(Feed::End);
    }
}

/// A source whose reads block until the paired [`ChannelFeed`] supplies a line.
/// Can be opened once.
pub struct ChannelSource {
    tx: Sender<Feed>,
    rx: Mutex<Option<Receiver<Feed>>>,
}

impl ChannelSource {
    pub fn new() -> (ChannelFeed, Self) {
        let (tx, rx) = mpsc::channel();
        let feed = ChannelFeed { tx: tx.clone() };
        (
            feed,
            Self {
                tx,
                rx: Mutex::new(Some(rx)),
            },
        )
    }
}

impl StreamSource for ChannelSource {
    fn open(&self) -> Result<Box<dyn LineStream>, SourceError> {
        let rx = self
            .rx
            .lock()
            .take()
            .ok_or_else(|| SourceError::Unavailable("channel already opened".to_string()))?;
        Ok(Box::new(ChannelStream {
            rx,
            interrupt: Arc::new(ChannelInterrupt {
                tx: Mutex::new(self.tx.clone()),
            }),
        }))
    }
}

struct ChannelInterrupt {
    tx: Mutex<Sender<Feed>>,
}

impl Interrupt for ChannelInterrupt {
    fn interrupt(&self) {
        let _ = self.tx.lock().send(Feed::End);
    }
}

struct ChannelStream {
    rx: Receiver<Feed>,
    interrupt: Arc<ChannelInterrupt>,
}

impl LineStream for ChannelStream {
    fn next_line(&mut self) -> Option<io::Result<String>> {
        match self.rx.recv() {
            Ok(Feed::Line(line)) => Some(Ok(line)),
            Ok(Feed::Fail(message)) => Some(Err(io::Error::other(message))),
            Ok(Feed::End) | Err(_) => None,
        }
    }

    fn interrupter(&self) -> Arc<dyn Interrupt> {
        self.interrupt.clone()
    }
}
