//! Fake terminal for render tests
//!
//! Interprets the escape subset the pager emits (`\r`, `\n`, `ESC[K`,
//! cursor moves, SGR) over a cell canvas with wide-character handling,
//! and records every written chunk so tests can assert on the exact
//! escape stream.

use std::sync::Arc;

use parking_lot::Mutex;
use tmenu_core::term::{TermSize, Terminal};
use tmenu_core::typeset::charwidth;

/// One canvas slot; `None` is the right half of a wide character
type Slot = Option<char>;

pub struct FakeTerminal {
    cols: usize,
    rows: usize,
    canvas: Vec<Vec<Slot>>,
    cx: usize,
    cy: usize,
    pending: String,
    recording: Option<Vec<String>>,
}

impl FakeTerminal {
    pub fn new(cols: usize, rows: usize) -> Self {
        Self {
            cols,
            rows,
            canvas: vec![Vec::new()],
            cx: 0,
            cy: 0,
            pending: String::new(),
            recording: None,
        }
    }

    pub fn lines(&self) -> Vec<String> {
        self.canvas
            .iter()
            .map(|row| {
                let text: String = row.iter().filter_map(|slot| *slot).collect();
                text.trim_end_matches(' ').to_string()
            })
            .collect()
    }

    pub fn cursor(&self) -> (usize, usize) {
        (self.cy, self.cx)
    }

    fn feed(&mut self, text: &str) {
        for c in text.chars() {
            self.pending.push(c);
            if self.control() {
                continue;
            }
            if !self.pending.is_empty() && self.pending.chars().all(|c| !c.is_control()) {
                let chars = std::mem::take(&mut self.pending);
                for c in chars.chars() {
                    self.putc(c);
                }
            }
        }
        if let Some(recording) = &mut self.recording {
            recording.push(text.to_string());
        }
    }

    /// Handle a complete control sequence in `pending`. Returns false
    /// when `pending` is not (yet) a recognized sequence; incomplete
    /// escape prefixes stay pending because they are unprintable.
    fn control(&mut self) -> bool {
        let pending = self.pending.clone();
        match pending.as_str() {
            "\r" => self.cx = 0,
            "\n" => {
                self.cx = 0;
                self.cy += 1;
            }
            "\x1b[K" => self.erase_to_eol(),
            seq => {
                if let Some((count, dir)) = parse_cursor_move(seq) {
                    match dir {
                        'A' => self.cy = self.cy.saturating_sub(count),
                        'B' => self.cy += count,
                        'C' => self.cx += count,
                        _ => self.cx = self.cx.saturating_sub(count),
                    }
                } else if is_sgr(seq) {
                    // attributes are not modeled
                } else if seq.starts_with('\x1b')
                    && seq.chars().last().is_some_and(|c| c.is_ascii_alphabetic())
                {
                    // terminated but unknown escape sequence, drop it
                } else {
                    return false;
                }
            }
        }
        self.pending.clear();
        self.ensure_cursor();
        true
    }

    fn ensure_cursor(&mut self) {
        if self.rows > 0 {
            self.cy = self.cy.min(self.rows);
        }
        if self.cols > 0 {
            self.cx = self.cx.min(self.cols);
        }
        while self.cy >= self.canvas.len() {
            self.canvas.push(Vec::new());
        }
    }

    fn putc(&mut self, c: char) {
        let width = charwidth(c);
        self.ensure_cursor();

        let row = &mut self.canvas[self.cy];
        while row.len() < self.cx + width {
            row.push(Some(' '));
        }

        if row[self.cx].is_none() {
            // overwriting the right half of a wide char on the left
            row[self.cx - 1] = Some(' ');
        }
        row[self.cx] = Some(c);

        if width == 2 {
            if let Some(Some(next)) = row.get(self.cx + 1) {
                if charwidth(*next) == 2 {
                    row[self.cx + 2] = Some(' ');
                }
            }
            row[self.cx + 1] = None;
        }

        if self.cols > 0 && self.cx >= self.cols {
            self.cy += 1;
            self.cx = 0;
        }
        self.cx += width;
    }

    fn erase_to_eol(&mut self) {
        self.ensure_cursor();
        let cx = self.cx;
        let row = &mut self.canvas[self.cy];
        row.truncate(cx);
        if cx > 0 {
            if let Some(last) = row.last_mut() {
                // a wide char cut in half becomes a space
                if last.is_some_and(|c| charwidth(c) == 2) {
                    *last = Some(' ');
                }
            }
        }
    }
}

fn parse_cursor_move(seq: &str) -> Option<(usize, char)> {
    let rest = seq.strip_prefix("\x1b[")?;
    let dir = rest.chars().last()?;
    if !matches!(dir, 'A' | 'B' | 'C' | 'D') {
        return None;
    }
    let digits = &rest[..rest.len() - 1];
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some((digits.parse().unwrap_or(1), dir))
}

fn is_sgr(seq: &str) -> bool {
    seq.strip_prefix("\x1b[")
        .and_then(|rest| rest.strip_suffix('m'))
        .is_some_and(|params| params.chars().all(|c| c.is_ascii_digit() || c == ';'))
}

/// Clonable [`Terminal`] handle over a shared [`FakeTerminal`]
#[derive(Clone)]
pub struct FakeTermHandle(Arc<Mutex<FakeTerminal>>);

impl FakeTermHandle {
    pub fn new(cols: usize, rows: usize) -> Self {
        Self(Arc::new(Mutex::new(FakeTerminal::new(cols, rows))))
    }

    pub fn boxed(&self) -> Box<dyn Terminal> {
        Box::new(self.clone())
    }

    pub fn lines(&self) -> Vec<String> {
        self.0.lock().lines()
    }

    pub fn cursor(&self) -> (usize, usize) {
        self.0.lock().cursor()
    }

    pub fn start_recording(&self) {
        self.0.lock().recording = Some(Vec::new());
    }

    pub fn take_recording(&self) -> Vec<String> {
        self.0.lock().recording.take().unwrap_or_default()
    }
}

impl Terminal for FakeTermHandle {
    fn size(&self) -> TermSize {
        let term = self.0.lock();
        TermSize {
            cols: term.cols,
            rows: term.rows,
        }
    }

    fn write_str(&mut self, s: &str) -> std::io::Result<()> {
        self.0.lock().feed(s);
        Ok(())
    }

    fn is_tty(&self) -> bool {
        true
    }
}
