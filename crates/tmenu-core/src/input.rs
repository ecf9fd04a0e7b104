//! Raw-mode key input
//!
//! [`read_token`] reads raw bytes from a tty and yields one token per
//! call: a registered [`Key`], a decoded text character, or the raw
//! bytes when nothing else applies. Matching is longest-match against
//! the registry's sequences, and no byte is consumed beyond what the
//! decision requires.
//!
//! Control chords mapped to terminal signals (VINTR/VSUSP/VQUIT) are
//! either delivered as keys or raised as real signals, depending on the
//! caller's [`Capture`] set. The control-character table is read from
//! the tty itself, never hard-coded.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::keys::{Key, KeyRegistry};

/// Errors from the input reader
#[derive(Debug, Error)]
pub enum InputError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("end of input")]
    Eof,
}

/// One decoded unit of input
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// A key registered in the registry
    Key(Key),
    /// Decoded text (usually a single character)
    Text(String),
    /// Bytes that are neither a key nor valid UTF-8
    Bytes(Vec<u8>),
}

impl Token {
    pub fn key(&self) -> Option<&Key> {
        match self {
            Self::Key(key) => Some(key),
            _ => None,
        }
    }

    /// The byte sequence this token was decoded from
    pub fn seq(&self) -> &[u8] {
        match self {
            Self::Key(key) => key.seq(),
            Self::Text(s) => s.as_bytes(),
            Self::Bytes(b) => b,
        }
    }
}

/// Tokens compare against strings the way keys do: by alias or by the
/// literal decoded text.
impl PartialEq<&str> for Token {
    fn eq(&self, other: &&str) -> bool {
        match self {
            Self::Key(key) => key == other,
            Self::Text(s) => s == other,
            Self::Bytes(b) => b == other.as_bytes(),
        }
    }
}

impl PartialEq<&[u8]> for Token {
    fn eq(&self, other: &&[u8]) -> bool {
        self.seq() == *other
    }
}

/// The tty's current signal-generating control characters
#[derive(Debug, Clone, Copy)]
pub struct ControlChars {
    pub vintr: u8,
    pub vsusp: u8,
    pub vquit: u8,
}

impl Default for ControlChars {
    fn default() -> Self {
        Self {
            vintr: 0x03,
            vsusp: 0x1a,
            vquit: 0x1c,
        }
    }
}

/// Which signal chords are delivered as keys instead of raised
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capture {
    pub int: bool,
    pub susp: bool,
    pub quit: bool,
}

impl Capture {
    pub const ALL: Self = Self {
        int: true,
        susp: true,
        quit: true,
    };

    pub const NONE: Self = Self {
        int: false,
        susp: false,
        quit: false,
    };

    /// Build a capture set from key names ("ctrl-c", "^Z", "fs", …).
    /// Unknown names capture nothing.
    pub fn from_names(names: &[&str], registry: &KeyRegistry) -> Self {
        let mut capture = Self::NONE;
        for name in names {
            let Some(key) = registry.lookup_alias(name) else {
                continue;
            };
            match key.seq() {
                [0x03] => capture.int = true,
                [0x1a] => capture.susp = true,
                [0x1c] => capture.quit = true,
                _ => {}
            }
        }
        capture
    }
}

impl Default for Capture {
    fn default() -> Self {
        Self::ALL
    }
}

/// A pollable source of raw input bytes
pub trait ByteSource {
    /// Wait for readability; `None` blocks, `Some(ZERO)` just peeks
    fn poll(&mut self, timeout: Option<Duration>) -> io::Result<bool>;

    /// Read one byte; `None` means end of input
    fn read_byte(&mut self) -> io::Result<Option<u8>>;

    /// The tty's current control-character table
    fn control_chars(&self) -> ControlChars {
        ControlChars::default()
    }

    /// Deliver a signal to the current process
    fn raise_signal(&mut self, signal: i32) -> io::Result<()>;
}

/// Read one token from `source`.
///
/// Returns `Ok(None)` when `timeout` expires before any byte arrives.
/// The accumulated bytes resolve, in order of preference, to a
/// registered key, decoded text, or the raw bytes themselves.
pub fn read_token<S: ByteSource>(
    source: &mut S,
    registry: &KeyRegistry,
    timeout: Option<Duration>,
    capture: Capture,
) -> Result<Option<Token>, InputError> {
    if !source.poll(timeout)? {
        return Ok(None);
    }

    let cc = source.control_chars();
    let signal_table = [
        (cc.vintr, libc::SIGINT, capture.int),
        (cc.vsusp, libc::SIGTSTP, capture.susp),
        (cc.vquit, libc::SIGQUIT, capture.quit),
    ];

    let mut acc: Vec<u8> = Vec::new();
    let mut candidates: Vec<Vec<u8>> = registry.seqs().map(<[u8]>::to_vec).collect();

    loop {
        match source.read_byte()? {
            Some(byte) => acc.push(byte),
            None if acc.is_empty() => return Err(InputError::Eof),
            None => break,
        }

        for (byte, signal, captured) in signal_table {
            if acc.last() == Some(&byte) {
                if !captured {
                    log::debug!("raising signal {signal} for control byte {byte:#04x}");
                    source.raise_signal(signal)?;
                }
                break;
            }
        }

        if !source.poll(Some(Duration::ZERO))? {
            break;
        }

        if !candidates.is_empty() {
            candidates.retain(|seq| seq.starts_with(&acc));
            if candidates.len() == 1 && candidates[0] == acc {
                break;
            }
            if !candidates.is_empty() {
                continue;
            }
        }

        // Not a key; collect enough bytes to decode at least one char
        if std::str::from_utf8(&acc).is_ok() {
            break;
        }
    }

    if let Some(key) = registry.lookup_seq(&acc) {
        return Ok(Some(Token::Key(key.clone())));
    }
    Ok(Some(match String::from_utf8(acc) {
        Ok(text) => Token::Text(text),
        Err(err) => Token::Bytes(err.into_bytes()),
    }))
}

#[cfg(unix)]
pub use tty::{getch, TtySource};

#[cfg(unix)]
mod tty {
    use std::fs::File;
    use std::os::unix::io::{AsRawFd, RawFd};
    use std::time::Duration;

    use super::*;

    /// Puts a descriptor into raw mode; restores the saved attributes on
    /// drop, so every exit path (panics included) leaves the terminal
    /// usable.
    struct RawModeGuard {
        fd: RawFd,
        saved: libc::termios,
    }

    impl RawModeGuard {
        fn new(fd: RawFd) -> io::Result<Self> {
            let mut saved: libc::termios = unsafe { std::mem::zeroed() };
            // SAFETY: tcgetattr fills the termios we hand it
            if unsafe { libc::tcgetattr(fd, &mut saved) } != 0 {
                return Err(io::Error::last_os_error());
            }
            let mut raw = saved;
            // SAFETY: cfmakeraw only mutates the struct
            unsafe { libc::cfmakeraw(&mut raw) };
            // SAFETY: raw is a valid termios for this descriptor
            if unsafe { libc::tcsetattr(fd, libc::TCSADRAIN, &raw) } != 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(Self { fd, saved })
        }
    }

    impl Drop for RawModeGuard {
        fn drop(&mut self) {
            // SAFETY: restoring the attributes we read at construction
            unsafe { libc::tcsetattr(self.fd, libc::TCSADRAIN, &self.saved) };
        }
    }

    /// A real tty descriptor in raw mode
    pub struct TtySource {
        fd: RawFd,
        control: ControlChars,
        _file: Option<File>,
        _guard: RawModeGuard,
    }

    impl TtySource {
        /// Raw-mode reader over stdin
        pub fn stdin() -> io::Result<Self> {
            Self::from_fd(libc::STDIN_FILENO, None)
        }

        /// Raw-mode reader over `/dev/tty`
        pub fn open_tty() -> io::Result<Self> {
            let file = File::open("/dev/tty")?;
            let fd = file.as_raw_fd();
            Self::from_fd(fd, Some(file))
        }

        fn from_fd(fd: RawFd, file: Option<File>) -> io::Result<Self> {
            let guard = RawModeGuard::new(fd)?;
            let cc = &guard.saved.c_cc;
            let control = ControlChars {
                vintr: cc[libc::VINTR],
                vsusp: cc[libc::VSUSP],
                vquit: cc[libc::VQUIT],
            };
            Ok(Self {
                fd,
                control,
                _file: file,
                _guard: guard,
            })
        }
    }

    impl ByteSource for TtySource {
        fn poll(&mut self, timeout: Option<Duration>) -> io::Result<bool> {
            let mut pollfd = libc::pollfd {
                fd: self.fd,
                events: libc::POLLIN,
                revents: 0,
            };
            let millis = match timeout {
                Some(t) => t.as_millis().min(libc::c_int::MAX as u128) as libc::c_int,
                None => -1,
            };
            loop {
                // SAFETY: pollfd points at one valid struct for the call
                let ret = unsafe { libc::poll(&mut pollfd, 1, millis) };
                if ret < 0 {
                    let err = io::Error::last_os_error();
                    if err.kind() == io::ErrorKind::Interrupted {
                        continue;
                    }
                    return Err(err);
                }
                return Ok(ret > 0);
            }
        }

        fn read_byte(&mut self) -> io::Result<Option<u8>> {
            let mut byte = 0u8;
            // SAFETY: reading one byte into a valid buffer
            let n = unsafe { libc::read(self.fd, (&mut byte as *mut u8).cast(), 1) };
            match n {
                n if n < 0 => Err(io::Error::last_os_error()),
                0 => Ok(None),
                _ => Ok(Some(byte)),
            }
        }

        fn control_chars(&self) -> ControlChars {
            self.control
        }

        fn raise_signal(&mut self, signal: i32) -> io::Result<()> {
            // SAFETY: signalling our own pid
            if unsafe { libc::kill(libc::getpid(), signal) } != 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        }
    }

    /// Read one token from stdin using the process-wide key registry.
    ///
    /// The terminal is placed in raw mode for the duration of the call
    /// and restored on every exit path.
    pub fn getch(timeout: Option<Duration>, capture: Capture) -> Result<Option<Token>, InputError> {
        let registry = crate::keys::default_registry().read().clone();
        let mut source = TtySource::stdin()?;
        read_token(&mut source, &registry, timeout, capture)
    }
}
