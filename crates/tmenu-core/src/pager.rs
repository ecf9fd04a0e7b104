//! Segmented differential pager
//!
//! The pager owns three line sections (header, body, footer), budgets the
//! terminal height between them, and reconciles the screen with the
//! desired frame by emitting a minimal escape stream. It keeps a model of
//! what is currently drawn (`display`) below the application's prior
//! output, so only dirty lines are repainted.
//!
//! Height allocation is deterministic: the first header line wins the
//! first row, the first footer line the second, then the header grows,
//! then the footer, and the body gets whatever remains (a window starting
//! at `scroll`). With `flex`, padding rows fill the gap between body and
//! footer.

use std::io;
use std::ops::Range;

use crate::term::{StdoutTerminal, TermSize, Terminal};
use crate::typeset::wrap;

/// Which section of the pager a line belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Header,
    Body,
    Padding,
    Footer,
}

/// One pager line with its layout placement
#[derive(Debug, Clone, PartialEq)]
pub struct PageLine {
    pub text: String,
    pub section: Section,
    /// Row index relative to the top of the frame; may be negative for
    /// body lines scrolled off the top
    pub offset: isize,
    /// Whether the line is part of the currently visible frame
    pub visible: bool,
}

/// An insertion-ordered list of lines backing one pager section
#[derive(Debug, Clone, Default)]
pub struct Lines {
    lines: Vec<String>,
}

impl Lines {
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.lines.get(index).map(String::as_str)
    }

    pub fn set(&mut self, index: usize, line: impl Into<String>) {
        if let Some(slot) = self.lines.get_mut(index) {
            *slot = line.into();
        }
    }

    pub fn append(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub fn extend<I>(&mut self, lines: I)
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        for line in lines {
            self.append(line);
        }
    }

    pub fn insert(&mut self, index: usize, line: impl Into<String>) {
        self.lines.insert(index.min(self.lines.len()), line.into());
    }

    pub fn remove(&mut self, index: usize) -> Option<String> {
        (index < self.lines.len()).then(|| self.lines.remove(index))
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }
}

/// The segmented differential renderer
pub struct Pager {
    pub header: Lines,
    pub body: Lines,
    pub footer: Lines,
    max_height: Option<usize>,
    max_width: Option<usize>,
    flex: bool,
    scroll: usize,
    display: Vec<Option<String>>,
    term: Box<dyn Terminal>,
}

impl Default for Pager {
    fn default() -> Self {
        Self::new()
    }
}

impl Pager {
    /// A pager drawing to stdout
    pub fn new() -> Self {
        Self::with_terminal(Box::new(StdoutTerminal::new()))
    }

    pub fn with_terminal(term: Box<dyn Terminal>) -> Self {
        Self {
            header: Lines::default(),
            body: Lines::default(),
            footer: Lines::default(),
            max_height: None,
            max_width: None,
            flex: false,
            scroll: 0,
            display: Vec::new(),
            term,
        }
    }

    /// Swap the output terminal, returning the previous one
    pub fn replace_terminal(&mut self, term: Box<dyn Terminal>) -> Box<dyn Terminal> {
        std::mem::replace(&mut self.term, term)
    }

    pub fn terminal_mut(&mut self) -> &mut dyn Terminal {
        &mut *self.term
    }

    pub fn max_height(&self) -> Option<usize> {
        self.max_height
    }

    pub fn set_max_height(&mut self, max_height: Option<usize>) {
        self.max_height = max_height;
    }

    pub fn max_width(&self) -> Option<usize> {
        self.max_width
    }

    pub fn set_max_width(&mut self, max_width: Option<usize>) {
        self.max_width = max_width;
    }

    pub fn flex(&self) -> bool {
        self.flex
    }

    /// With flex on, the pager occupies `max_height` rows regardless of
    /// content, padding the gap between body and footer
    pub fn set_flex(&mut self, flex: bool) {
        self.flex = flex;
    }

    pub fn term_size(&self) -> TermSize {
        self.term.size()
    }

    /// Effective frame height for the current content and terminal
    pub fn height(&self) -> usize {
        let rows = self.term.size().rows;
        let content_total = match (self.flex, self.max_height) {
            (true, Some(h)) => h,
            _ => self.header.len() + self.body.len() + self.footer.len(),
        };
        self.max_height.unwrap_or(rows).min(rows).min(content_total)
    }

    /// Effective frame width for the current terminal
    pub fn width(&self) -> usize {
        let cols = self.term.size().cols;
        self.max_width.unwrap_or(cols).min(cols)
    }

    /// Number of body lines in the current frame
    fn content_height(&self) -> usize {
        self.height()
            .saturating_sub(self.header.len() + self.footer.len())
    }

    /// Body line count
    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// True when the frame has no lines at all
    pub fn is_blank(&self) -> bool {
        self.frame().is_empty()
    }

    pub fn append(&mut self, line: impl Into<String>) {
        self.body.append(line);
    }

    pub fn extend<I>(&mut self, lines: I)
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.body.extend(lines);
    }

    pub fn insert(&mut self, index: usize, line: impl Into<String>) {
        self.body.insert(index, line);
    }

    pub fn pop(&mut self, index: usize) -> Option<String> {
        self.body.remove(index)
    }

    /// Set a body line, extending with empty lines as needed
    pub fn set_line(&mut self, index: usize, line: impl Into<String>) {
        while self.body.len() <= index {
            self.body.append("");
        }
        self.body.set(index, line);
    }

    /// Replace a body range with the given lines (slice assignment)
    pub fn splice<I>(&mut self, range: Range<usize>, lines: I)
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        while self.body.len() < range.start {
            self.body.append("");
        }
        let end = range.end.min(self.body.len());
        self.body
            .lines
            .splice(range.start..end, lines.into_iter().map(Into::into));
    }

    pub fn clear(&mut self) {
        self.header.clear();
        self.body.clear();
        self.footer.clear();
    }

    /// Current scroll offset, clamped to the valid window.
    ///
    /// The clamp is recomputed against the live terminal size on every
    /// read; `refresh_scroll` persists it.
    pub fn scroll(&self) -> usize {
        self.clamp_scroll(self.scroll)
    }

    fn clamp_scroll(&self, value: usize) -> usize {
        value.min(self.body.len().saturating_sub(self.content_height()))
    }

    pub fn set_scroll(&mut self, value: usize) {
        self.scroll = self.clamp_scroll(value);
    }

    pub fn scroll_by(&mut self, delta: isize) {
        let target = self.scroll() as isize + delta;
        self.set_scroll(target.max(0) as usize);
    }

    /// Scroll as far down as the body allows (the "end" sentinel)
    pub fn scroll_to_end(&mut self) {
        self.set_scroll(usize::MAX);
    }

    /// Write the current clamp back to the stored offset
    pub fn refresh_scroll(&mut self) {
        self.scroll = self.scroll();
    }

    /// The body line at `index` with its current window visibility
    pub fn line(&self, index: usize) -> Option<PageLine> {
        let text = self.body.get(index)?;
        let scroll = self.scroll();
        let content_height = self.content_height();
        Some(PageLine {
            text: text.to_string(),
            section: Section::Body,
            offset: index as isize + self.header.len() as isize - scroll as isize,
            visible: content_height > 0 && index >= scroll && index < scroll + content_height,
        })
    }

    /// Every line of every section, placed and tagged with visibility
    pub fn frame(&self) -> Vec<PageLine> {
        let height = self.height();
        let scroll = self.scroll();
        let header_len = self.header.len();
        let body_len = self.body.len();
        let footer_len = self.footer.len();

        let mut header_q = 0usize;
        let mut body_q = 0usize;
        let mut padding_q = 0usize;
        let mut footer_q = 0usize;
        for _ in 0..height {
            if header_len > 0 && header_q == 0 {
                header_q += 1;
            } else if footer_len > 0 && footer_q == 0 {
                footer_q += 1;
            } else if header_q < header_len {
                header_q += 1;
            } else if footer_q < footer_len {
                footer_q += 1;
            } else if body_q < body_len {
                body_q += 1;
            } else {
                padding_q += 1;
            }
        }

        fn emit<'a>(
            out: &mut Vec<PageLine>,
            quota: &mut usize,
            at_line: &mut usize,
            section: Section,
            base: isize,
            lines: impl Iterator<Item = &'a str>,
        ) {
            for (idx, text) in lines.enumerate() {
                let offset = idx as isize + base;
                let visible = *quota > 0 && offset >= *at_line as isize;
                out.push(PageLine {
                    text: text.to_string(),
                    section,
                    offset,
                    visible,
                });
                if visible {
                    *quota -= 1;
                    *at_line += 1;
                }
            }
        }

        let (alloc_header, alloc_body, alloc_padding) = (header_q, body_q, padding_q);

        let mut out = Vec::new();
        let mut at_line = 0usize;
        emit(
            &mut out,
            &mut header_q,
            &mut at_line,
            Section::Header,
            0,
            self.header.iter(),
        );
        emit(
            &mut out,
            &mut body_q,
            &mut at_line,
            Section::Body,
            header_len as isize - scroll as isize,
            self.body.iter(),
        );
        emit(
            &mut out,
            &mut padding_q,
            &mut at_line,
            Section::Padding,
            (alloc_header + alloc_body) as isize,
            std::iter::repeat("").take(alloc_padding),
        );
        emit(
            &mut out,
            &mut footer_q,
            &mut at_line,
            Section::Footer,
            (alloc_header + alloc_body + alloc_padding) as isize,
            self.footer.iter(),
        );
        out
    }

    /// All frame texts, in section order, visible or not
    pub fn lines(&self) -> Vec<String> {
        self.frame().into_iter().map(|line| line.text).collect()
    }

    /// The texts of the currently visible frame, top to bottom
    pub fn preview(&self) -> Vec<String> {
        self.frame()
            .into_iter()
            .filter(|line| line.visible)
            .map(|line| line.text)
            .collect()
    }

    /// What the last render left on screen
    pub fn display(&self) -> Vec<String> {
        self.display
            .iter()
            .map(|line| line.clone().unwrap_or_default())
            .collect()
    }

    /// Reconcile the screen with the current frame.
    ///
    /// Emits only `\r`, `\n`, `\x1b[K`, and `\x1b[NA`/`\x1b[NB`; SGR runs
    /// inside user lines pass through untouched. Unchanged lines are
    /// skipped unless `force_all`, except the last line, which is always
    /// repainted so the cursor ends at a known position.
    pub fn render(&mut self, force_all: bool) -> io::Result<()> {
        let term_rows = self.term.size().rows;

        // Lines that scrolled off the top when the terminal shrank are
        // no longer ours to repaint
        if self.display.len() > term_rows {
            let excess = self.display.len() - term_rows;
            self.display.drain(..excess);
        }
        if self.display.is_empty() {
            self.display.push(None);
        }

        let visible = self.preview();
        let width = self.width();
        log::trace!("render: {} visible lines, width {}", visible.len(), width);

        // Cursor starts at the last row of the previous frame
        let mut cursor = self.display.len() - 1;
        let floor = visible.len().saturating_sub(1);
        while cursor > floor {
            self.term.write_str("\r\x1b[K\x1b[A")?;
            self.display.pop();
            cursor -= 1;
        }

        if visible.is_empty() {
            self.term.write_str("\r\x1b[K")?;
            self.display.pop();
            return self.term.flush();
        }

        let last_idx = visible.len() - 1;
        for (idx, line) in visible.iter().enumerate() {
            let is_last = idx == last_idx;

            while self.display.len() < idx + 1 {
                self.display.push(None);
            }

            if !force_all && !is_last && self.display[idx].as_deref() == Some(line.as_str()) {
                continue;
            }

            if cursor != idx {
                let dist = cursor.abs_diff(idx).min(self.display.len() - 1);
                let dir = if cursor > idx { 'A' } else { 'B' };
                self.term.write_str(&format!("\r\x1b[{dist}{dir}"))?;
            }

            let (head, _) = wrap(line, width);
            self.display[idx] = Some(head.to_string());
            let end = if is_last { "" } else { "\n" };
            self.term.write_str(&format!("\r{head}\x1b[K{end}"))?;

            cursor = idx + usize::from(!is_last);
        }

        self.term.flush()
    }
}
