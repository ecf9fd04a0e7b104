//! Terminal output backends
//!
//! The pager renders through the [`Terminal`] trait so the UI can go to
//! stdout, straight to `/dev/tty` (keeping piped stdout clean), or to a
//! capturing fake in tests. Size is queried on every render, so a resize
//! is observed without any callback.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
#[cfg(unix)]
use std::os::unix::io::{AsRawFd, RawFd};

/// Terminal dimensions in character cells
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TermSize {
    pub cols: usize,
    pub rows: usize,
}

impl Default for TermSize {
    fn default() -> Self {
        Self { cols: 80, rows: 24 }
    }
}

/// A surface the pager can draw on
pub trait Terminal: Send {
    /// Current size; consulted on every render
    fn size(&self) -> TermSize;

    /// Write a chunk of output (text and escape sequences)
    fn write_str(&mut self, s: &str) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn is_tty(&self) -> bool {
        false
    }
}

#[cfg(unix)]
fn fd_size(fd: RawFd) -> Option<TermSize> {
    let mut ws: libc::winsize = unsafe { std::mem::zeroed() };
    // SAFETY: TIOCGWINSZ writes a winsize through the pointer and nothing else
    let ret = unsafe { libc::ioctl(fd, libc::TIOCGWINSZ, &mut ws) };
    if ret == 0 && ws.ws_col > 0 && ws.ws_row > 0 {
        Some(TermSize {
            cols: ws.ws_col as usize,
            rows: ws.ws_row as usize,
        })
    } else {
        None
    }
}

fn env_size() -> Option<TermSize> {
    let cols = std::env::var("COLUMNS").ok()?.parse().ok()?;
    let rows = std::env::var("LINES").ok()?.parse().ok()?;
    Some(TermSize { cols, rows })
}

/// Whether stdout is attached to a terminal
pub fn stdout_is_tty() -> bool {
    // SAFETY: isatty only inspects the descriptor
    unsafe { libc::isatty(libc::STDOUT_FILENO) == 1 }
}

/// Terminal backed by the process's stdout
#[derive(Debug, Default)]
pub struct StdoutTerminal;

impl StdoutTerminal {
    pub fn new() -> Self {
        Self
    }
}

impl Terminal for StdoutTerminal {
    fn size(&self) -> TermSize {
        fd_size(libc::STDOUT_FILENO)
            .or_else(env_size)
            .unwrap_or_default()
    }

    fn write_str(&mut self, s: &str) -> io::Result<()> {
        io::stdout().write_all(s.as_bytes())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()
    }

    fn is_tty(&self) -> bool {
        stdout_is_tty()
    }
}

/// Terminal backed by `/dev/tty`, bypassing redirected stdio
#[derive(Debug)]
pub struct TtyTerminal {
    file: File,
}

impl TtyTerminal {
    pub fn open() -> io::Result<Self> {
        let file = OpenOptions::new().write(true).open("/dev/tty")?;
        Ok(Self { file })
    }
}

impl Terminal for TtyTerminal {
    fn size(&self) -> TermSize {
        fd_size(self.file.as_raw_fd())
            .or_else(env_size)
            .unwrap_or_default()
    }

    fn write_str(&mut self, s: &str) -> io::Result<()> {
        self.file.write_all(s.as_bytes())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }

    fn is_tty(&self) -> bool {
        true
    }
}
