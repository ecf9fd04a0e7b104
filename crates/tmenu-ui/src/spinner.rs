//! Threaded progress spinner
//!
//! Repaints `\r{icon}\x1b[K {text}` from a background thread: an entry
//! phase played once, a loop phase cycled until the spinner is told to
//! finish, and a leave phase played on the way out.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;

use tmenu_core::term::{StdoutTerminal, Terminal};

/// The three icon phases of a spinner
#[derive(Debug, Clone)]
pub struct SpinnerStyle {
    pub entry: Vec<String>,
    pub cycle: Vec<String>,
    pub leave: Vec<String>,
}

impl SpinnerStyle {
    fn frames(s: &str) -> Vec<String> {
        s.chars().map(String::from).collect()
    }

    /// A cycle-only style with a `.` leave frame
    pub fn cycle_only(frames: &[&str]) -> Self {
        Self {
            entry: Vec::new(),
            cycle: frames.iter().map(|s| s.to_string()).collect(),
            leave: vec![".".to_string()],
        }
    }
}

impl Default for SpinnerStyle {
    fn default() -> Self {
        Self {
            entry: Self::frames("⠉⠛⠿⣿⠿⠛⠉⠙"),
            cycle: Self::frames("⠹⢸⣰⣤⣆⡇⠏⠛"),
            leave: Self::frames("⣿"),
        }
    }
}

struct SpinnerInner {
    term: Mutex<Box<dyn Terminal>>,
    text: Mutex<String>,
    style: SpinnerStyle,
    delay: Duration,
    stop: AtomicBool,
    frame: Mutex<Option<String>>,
}

impl SpinnerInner {
    fn paint(&self) {
        let icon = self.frame.lock().clone().unwrap_or_default();
        let text = self.text.lock().clone();
        let mut term = self.term.lock();
        if let Err(err) = term
            .write_str(&format!("\r{icon}\x1b[K {text}"))
            .and_then(|()| term.flush())
        {
            log::error!("spinner paint failed: {err}");
        }
    }

    fn animate(&self) {
        let entry_then_cycle = self
            .style
            .entry
            .iter()
            .chain(self.style.cycle.iter().cycle());
        for icon in entry_then_cycle {
            if self.stop.load(Ordering::SeqCst) {
                break;
            }
            *self.frame.lock() = Some(icon.clone());
            self.paint();
            std::thread::sleep(self.delay);
        }

        for icon in &self.style.leave {
            *self.frame.lock() = Some(icon.clone());
            self.paint();
            std::thread::sleep(self.delay);
        }

        let mut term = self.term.lock();
        let _ = term.write_str("\n").and_then(|()| term.flush());
    }
}

/// A background-thread spinner with a live status text
pub struct Spinner {
    inner: Arc<SpinnerInner>,
    thread: Option<JoinHandle<()>>,
}

impl Spinner {
    pub fn new() -> Self {
        Self::with_terminal(Box::new(StdoutTerminal::new()))
    }

    pub fn with_terminal(term: Box<dyn Terminal>) -> Self {
        Self {
            inner: Arc::new(SpinnerInner {
                term: Mutex::new(term),
                text: Mutex::new(String::new()),
                style: SpinnerStyle::default(),
                delay: Duration::from_millis(100),
                stop: AtomicBool::new(false),
                frame: Mutex::new(None),
            }),
            thread: None,
        }
    }

    pub fn style(mut self, style: SpinnerStyle) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.style = style;
        }
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.delay = delay;
        }
        self
    }

    pub fn text(&self) -> String {
        self.inner.text.lock().clone()
    }

    /// Update the status text; repaints immediately while spinning
    pub fn set_text(&self, text: impl Into<String>) {
        *self.inner.text.lock() = text.into();
        if self.thread.is_some() {
            self.inner.paint();
        }
    }

    /// Start the animation thread; a second start is a no-op
    pub fn start(&mut self) {
        if self.thread.is_some() {
            return;
        }
        let inner = Arc::clone(&self.inner);
        self.thread = Some(std::thread::spawn(move || inner.animate()));
    }

    /// Play the leave phase and wait for the thread to finish
    pub fn finish(&mut self) {
        self.inner.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Default for Spinner {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.finish();
        }
    }
}
