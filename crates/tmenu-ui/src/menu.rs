//! The interactive menu engine
//!
//! A [`Menu`] owns a pager, a cursor, and a list of items, and runs the
//! interactive session: render, read a key, dispatch it through the
//! current item's bindings and then the menu's own (bubbling), commit
//! the resulting frame, repeat. Rendering is throttled to 60 Hz for
//! background callers and synchronous inside the loop.
//!
//! The menu is a cheap-to-clone handle; worker threads spawned through
//! [`Menu::spawn`] get their own clone and may call `refresh` at any
//! time. All state sits behind one lock that is never held while user
//! callbacks run.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;

use tmenu_core::input::{read_token, Capture, InputError, Token, TtySource};
use tmenu_core::keys::KeyRegistry;
use tmenu_core::pager::Pager;
use tmenu_core::term::{stdout_is_tty, Terminal, TtyTerminal};
use tmenu_core::typeset::strwidth;

use crate::handler::{Callback, Flow, KeyEvent, KeyHandler, Owner};
use crate::throttle::Throttler;

/// Errors from the menu engine
#[derive(Debug, Error)]
pub enum MenuError {
    #[error("stdout should be a tty for using an interactive menu")]
    NotATty,

    #[error("item is not in this menu")]
    ForeignItem,

    #[error("item index {0} out of range")]
    OutOfRange(usize),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Selection discipline of a checkbox
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxStyle {
    /// Radio buttons: at most one item selected
    Single,
    /// Checkboxes: any subset selected
    Multi,
    /// Curly braces, used by meta rows
    Curly,
}

impl BoxStyle {
    pub fn pair(self) -> (&'static str, &'static str) {
        match self {
            Self::Single => ("(", ")"),
            Self::Multi => ("[", "]"),
            Self::Curly => ("{", "}"),
        }
    }
}

/// A parsed checkbox spec: the check glyph and the box style
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Checkbox {
    pub check: Option<String>,
    pub style: Option<BoxStyle>,
}

impl Checkbox {
    /// Parse a checkbox spec the way menus accept them:
    /// `"()"`/`"single"`/`"radio"` and `"[]"`/`"multi"`/`"multiple"`/
    /// `"checkbox"` pick the style with a `*` check; `"(x)"` and
    /// `"[x]"` forms override the glyph. Anything else means no box.
    pub fn parse(spec: &str) -> Self {
        match spec {
            "" => Self::default(),
            "()" | "single" | "radio" => Self {
                check: Some("*".to_string()),
                style: Some(BoxStyle::Single),
            },
            "[]" | "multi" | "multiple" | "checkbox" => Self {
                check: Some("*".to_string()),
                style: Some(BoxStyle::Multi),
            },
            other => {
                if let Some(inner) = other.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
                    Self {
                        check: Some(inner.to_string()),
                        style: Some(BoxStyle::Single),
                    }
                } else if let Some(inner) =
                    other.strip_prefix('[').and_then(|s| s.strip_suffix(']'))
                {
                    Self {
                        check: Some(inner.to_string()),
                        style: Some(BoxStyle::Multi),
                    }
                } else {
                    Self::default()
                }
            }
        }
    }
}

/// What a formatter sees for one menu row
pub struct FormatCtx<'a> {
    /// Cursor glyph on the cursor row, a same-width blank elsewhere
    pub cursor: &'a str,
    /// Check glyph when selected (or meta), a same-width blank elsewhere
    pub check: &'a str,
    /// Opening and closing box characters, empty without a box
    pub box_pair: (&'a str, &'a str),
    pub text: &'a str,
    pub index: usize,
    pub selected: bool,
    pub meta: bool,
}

/// A custom per-item or menu-wide row renderer
pub type Formatter = Arc<dyn Fn(&FormatCtx<'_>) -> String + Send + Sync>;

/// Stable identity of a menu item; survives reordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemId(u64);

/// Addressing an item by position or by identity
#[derive(Clone, Copy)]
pub enum Target<'a> {
    Index(usize),
    Item(&'a ItemHandle),
}

impl<'a> From<usize> for Target<'a> {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl<'a> From<&'a ItemHandle> for Target<'a> {
    fn from(item: &'a ItemHandle) -> Self {
        Self::Item(item)
    }
}

struct ItemState {
    id: ItemId,
    text: String,
    meta: bool,
    selected: bool,
    data: HashMap<String, String>,
    checkbox: Checkbox,
    cursor_symbol: Option<String>,
    format: Option<Formatter>,
    handler: KeyHandler,
}

impl ItemState {
    fn new(id: ItemId, text: String, meta: bool) -> Self {
        let mut checkbox = Checkbox::default();
        if meta {
            checkbox.check = Some("*".to_string());
            checkbox.style = Some(BoxStyle::Curly);
        }
        Self {
            id,
            text,
            meta,
            selected: false,
            data: HashMap::new(),
            checkbox,
            cursor_symbol: None,
            format: None,
            handler: KeyHandler::new(),
        }
    }
}

struct MenuState {
    pager: Pager,
    title: String,
    message: String,
    items: Vec<ItemState>,
    cursor: usize,
    wrap: bool,
    cursor_symbol: String,
    checkbox: Checkbox,
    format: Option<Formatter>,
    handler: KeyHandler,
    registry: KeyRegistry,
}

struct MenuInner {
    state: Mutex<MenuState>,
    throttler: OnceLock<Throttler<bool>>,
    active: AtomicBool,
    threads: Mutex<Vec<JoinHandle<()>>>,
    next_item_id: AtomicU64,
}

/// The result of a finished session
#[derive(Debug, Clone)]
pub enum Selection {
    /// Single or boxless menus yield one item
    One(ItemHandle),
    /// Multi menus yield every selected non-meta item
    Many(Vec<ItemHandle>),
}

/// Handle to an interactive menu; clones share the same menu
#[derive(Clone)]
pub struct Menu {
    inner: Arc<MenuInner>,
}

/// Handle to one menu item, valid across reordering
#[derive(Clone)]
pub struct ItemHandle {
    menu: Weak<MenuInner>,
    id: ItemId,
}

impl Menu {
    /// A menu rendering to stdout
    pub fn new(title: impl Into<String>) -> Self {
        Self::build(title.into(), Pager::new())
    }

    /// A menu rendering to the given terminal (tests, headless use)
    pub fn with_terminal(title: impl Into<String>, term: Box<dyn Terminal>) -> Self {
        Self::build(title.into(), Pager::with_terminal(term))
    }

    fn build(title: String, pager: Pager) -> Self {
        let inner = Arc::new(MenuInner {
            state: Mutex::new(MenuState {
                pager,
                title,
                message: String::new(),
                items: Vec::new(),
                cursor: 0,
                wrap: false,
                cursor_symbol: ">".to_string(),
                checkbox: Checkbox::default(),
                format: None,
                handler: KeyHandler::new(),
                registry: tmenu_core::keys::default_registry().read().clone(),
            }),
            throttler: OnceLock::new(),
            active: AtomicBool::new(false),
            threads: Mutex::new(Vec::new()),
            next_item_id: AtomicU64::new(0),
        });

        let weak = Arc::downgrade(&inner);
        let throttler = Throttler::new(Duration::from_secs_f64(1.0 / 60.0), move |force| {
            if let Some(inner) = weak.upgrade() {
                Menu { inner }.do_render(force);
            }
        });
        let _ = inner.throttler.set(throttler);

        Menu { inner }
    }

    fn throttler(&self) -> &Throttler<bool> {
        self.inner
            .throttler
            .get()
            .expect("throttler installed at construction")
    }

    fn handle_for(&self, id: ItemId) -> ItemHandle {
        ItemHandle {
            menu: Arc::downgrade(&self.inner),
            id,
        }
    }

    fn resolve(&self, state: &MenuState, target: Target<'_>) -> Result<usize, MenuError> {
        match target {
            Target::Index(index) => {
                if index < state.items.len() {
                    Ok(index)
                } else {
                    Err(MenuError::OutOfRange(index))
                }
            }
            Target::Item(handle) => {
                if !std::ptr::eq(Weak::as_ptr(&handle.menu), Arc::as_ptr(&self.inner)) {
                    return Err(MenuError::ForeignItem);
                }
                state
                    .items
                    .iter()
                    .position(|item| item.id == handle.id)
                    .ok_or(MenuError::ForeignItem)
            }
        }
    }

    // ---- configuration ----

    pub fn title(&self) -> String {
        self.inner.state.lock().title.clone()
    }

    pub fn set_title(&self, title: impl Into<String>) {
        self.inner.state.lock().title = title.into();
    }

    pub fn message(&self) -> String {
        self.inner.state.lock().message.clone()
    }

    /// The persistent status line shown in the footer
    pub fn set_message(&self, message: impl Into<String>) {
        self.inner.state.lock().message = message.into();
    }

    /// Configure the menu-wide checkbox (see [`Checkbox::parse`])
    pub fn set_checkbox(&self, spec: &str) {
        self.inner.state.lock().checkbox = Checkbox::parse(spec);
    }

    pub fn set_format(&self, format: Formatter) {
        self.inner.state.lock().format = Some(format);
    }

    pub fn set_cursor_symbol(&self, symbol: impl Into<String>) {
        self.inner.state.lock().cursor_symbol = symbol.into();
    }

    pub fn wrap(&self) -> bool {
        self.inner.state.lock().wrap
    }

    /// Wrapping cursor motion (modular) instead of clamping
    pub fn set_wrap(&self, wrap: bool) {
        self.inner.state.lock().wrap = wrap;
    }

    pub fn max_height(&self) -> Option<usize> {
        self.inner.state.lock().pager.max_height()
    }

    pub fn set_max_height(&self, max_height: Option<usize>) {
        self.inner.state.lock().pager.set_max_height(max_height);
    }

    /// Whether an interactive session is running
    pub fn active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    // ---- items ----

    pub fn len(&self) -> usize {
        self.inner.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().items.is_empty()
    }

    fn new_item(&self, text: impl Into<String>, meta: bool) -> ItemState {
        let id = ItemId(self.inner.next_item_id.fetch_add(1, Ordering::SeqCst));
        ItemState::new(id, text.into(), meta)
    }

    pub fn append(&self, text: impl Into<String>) -> ItemHandle {
        let item = self.new_item(text, false);
        let id = item.id;
        self.inner.state.lock().items.push(item);
        self.handle_for(id)
    }

    /// Append a non-selectable UI row (e.g. a "Done" affordance)
    pub fn append_meta(&self, text: impl Into<String>) -> ItemHandle {
        let item = self.new_item(text, true);
        let id = item.id;
        self.inner.state.lock().items.push(item);
        self.handle_for(id)
    }

    pub fn insert(&self, index: usize, text: impl Into<String>) -> ItemHandle {
        let item = self.new_item(text, false);
        let id = item.id;
        {
            let mut state = self.inner.state.lock();
            let index = index.min(state.items.len());
            state.items.insert(index, item);
        }
        self.handle_for(id)
    }

    pub fn extend<I>(&self, texts: I) -> Vec<ItemHandle>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        texts.into_iter().map(|text| self.append(text)).collect()
    }

    pub fn items(&self) -> Vec<ItemHandle> {
        let state = self.inner.state.lock();
        state
            .items
            .iter()
            .map(|item| self.handle_for(item.id))
            .collect()
    }

    pub fn item(&self, index: usize) -> Option<ItemHandle> {
        let state = self.inner.state.lock();
        state.items.get(index).map(|item| self.handle_for(item.id))
    }

    /// First item of the currently visible body window
    pub fn top(&self) -> Option<ItemHandle> {
        let state = self.inner.state.lock();
        (0..state.items.len())
            .find(|&index| state.pager.line(index).is_some_and(|line| line.visible))
            .map(|index| self.handle_for(state.items[index].id))
    }

    /// Last item of the currently visible body window
    pub fn bottom(&self) -> Option<ItemHandle> {
        let state = self.inner.state.lock();
        (0..state.items.len())
            .rev()
            .find(|&index| state.pager.line(index).is_some_and(|line| line.visible))
            .map(|index| self.handle_for(state.items[index].id))
    }

    pub fn swap(&self, a: Target<'_>, b: Target<'_>) -> Result<(), MenuError> {
        let mut state = self.inner.state.lock();
        let a = self.resolve(&state, a)?;
        let b = self.resolve(&state, b)?;
        state.items.swap(a, b);
        Ok(())
    }

    /// Move an item to another position; everything in between shifts
    pub fn move_to(&self, item: Target<'_>, to: Target<'_>) -> Result<(), MenuError> {
        let mut state = self.inner.state.lock();
        let from = self.resolve(&state, item)?;
        let to = self.resolve(&state, to)?;
        if from != to {
            let item = state.items.remove(from);
            state.items.insert(to, item);
        }
        Ok(())
    }

    // ---- selection ----

    fn apply_select(state: &mut MenuState, index: usize) {
        if state.checkbox.style == Some(BoxStyle::Single) {
            for item in &mut state.items {
                item.selected = false;
            }
        }
        if let Some(item) = state.items.get_mut(index) {
            item.selected = true;
        }
    }

    pub fn select(&self, target: Target<'_>) -> Result<(), MenuError> {
        let mut state = self.inner.state.lock();
        let index = self.resolve(&state, target)?;
        Self::apply_select(&mut state, index);
        Ok(())
    }

    pub fn unselect(&self, target: Target<'_>) -> Result<(), MenuError> {
        let mut state = self.inner.state.lock();
        let index = self.resolve(&state, target)?;
        if let Some(item) = state.items.get_mut(index) {
            item.selected = false;
        }
        Ok(())
    }

    pub fn toggle(&self, target: Target<'_>) -> Result<(), MenuError> {
        let mut state = self.inner.state.lock();
        let index = self.resolve(&state, target)?;
        if state.items[index].selected {
            state.items[index].selected = false;
        } else {
            Self::apply_select(&mut state, index);
        }
        Ok(())
    }

    /// Select every item; only meaningful with a multi box
    pub fn select_all(&self) {
        let mut state = self.inner.state.lock();
        if state.checkbox.style == Some(BoxStyle::Multi) {
            for item in &mut state.items {
                item.selected = true;
            }
        }
    }

    pub fn unselect_all(&self) {
        let mut state = self.inner.state.lock();
        for item in &mut state.items {
            item.selected = false;
        }
    }

    /// The current selection; meta items never appear
    pub fn selected(&self) -> Option<Selection> {
        let state = self.inner.state.lock();
        let picked: Vec<ItemHandle> = state
            .items
            .iter()
            .filter(|item| item.selected && !item.meta)
            .map(|item| self.handle_for(item.id))
            .collect();
        match state.checkbox.style {
            Some(BoxStyle::Multi) => Some(Selection::Many(picked)),
            _ => picked.into_iter().next().map(Selection::One),
        }
    }

    // ---- cursor ----

    fn cal_index(state: &MenuState, value: isize) -> usize {
        let len = state.items.len() as isize;
        if len == 0 {
            return 0;
        }
        if state.wrap {
            (((value % len) + len) % len) as usize
        } else {
            value.clamp(0, len - 1) as usize
        }
    }

    pub fn cursor(&self) -> usize {
        self.inner.state.lock().cursor
    }

    pub fn cursor_item(&self) -> Option<ItemHandle> {
        let state = self.inner.state.lock();
        state
            .items
            .get(state.cursor)
            .map(|item| self.handle_for(item.id))
    }

    /// Move the cursor to an item; indexes wrap or clamp per the wrap
    /// setting, and the window scrolls to reveal the new position
    pub fn cursor_to(&self, target: Target<'_>) -> Result<(), MenuError> {
        let mut state = self.inner.state.lock();
        let index = match target {
            Target::Index(index) => index as isize,
            Target::Item(_) => self.resolve(&state, target)? as isize,
        };
        state.cursor = Self::cal_index(&state, index);
        Self::scroll_to_contain(&mut state);
        Ok(())
    }

    pub fn cursor_up(&self, count: usize) {
        self.cursor_move(-(count as isize));
    }

    pub fn cursor_down(&self, count: usize) {
        self.cursor_move(count as isize);
    }

    fn cursor_move(&self, delta: isize) {
        let mut state = self.inner.state.lock();
        let target = state.cursor as isize + delta;
        state.cursor = Self::cal_index(&state, target);
        Self::scroll_to_contain(&mut state);
    }

    fn scroll_to_contain(state: &mut MenuState) {
        let cursor = state.cursor;
        let Some(line) = state.pager.line(cursor) else {
            return;
        };
        if line.visible {
            return;
        }
        if cursor < state.pager.scroll() {
            state.pager.set_scroll(cursor);
            return;
        }
        for index in (1..=cursor).rev() {
            if state.pager.line(index).is_some_and(|line| line.visible) {
                state.pager.scroll_by((cursor - index) as isize);
                break;
            }
        }
    }

    /// Pull the cursor back onto the visible window after a scroll
    fn pull_cursor(state: &mut MenuState) {
        let cursor = state.cursor;
        if state
            .pager
            .line(cursor)
            .map_or(true, |line| line.visible)
        {
            return;
        }
        if cursor < state.pager.scroll() {
            state.cursor = state.pager.scroll();
            return;
        }
        for index in (1..=cursor).rev() {
            if state.pager.line(index).is_some_and(|line| line.visible) {
                state.cursor = index;
                break;
            }
        }
    }

    /// Scroll the body window; the cursor follows if it would fall off
    pub fn scroll(&self, delta: isize) {
        let mut state = self.inner.state.lock();
        state.pager.scroll_by(delta);
        Self::pull_cursor(&mut state);
    }

    // ---- key handling ----

    /// Bind `callback` under menu-level keys (catch-all with no keys)
    pub fn bind(&self, keys: &[&str], callback: Callback) {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        state.handler.bind(&state.registry, keys, callback);
    }

    pub fn unbind(&self, keys: &[&str], callback: &Callback) {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        state.handler.unbind(&state.registry, keys, callback);
    }

    pub fn unbind_key(&self, key: &str) {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        state.handler.unbind_key(&state.registry, key);
    }

    pub fn clear_bindings(&self) {
        self.inner.state.lock().handler.clear();
    }

    /// Dispatch a key: the current item's bindings first, bubbling to
    /// the menu's own on pass-through. Also usable directly in tests.
    pub fn feed_key(&self, token: Token) -> Flow {
        let (item_callbacks, menu_callbacks, item_handle) = {
            let state = self.inner.state.lock();
            let item = state.items.get(state.cursor);
            (
                item.map(|item| item.handler.callbacks_for(&state.registry, &token))
                    .unwrap_or_default(),
                state.handler.callbacks_for(&state.registry, &token),
                item.map(|item| self.handle_for(item.id)),
            )
        };

        if let Some(handle) = item_handle {
            let event = KeyEvent {
                token: token.clone(),
                owner: Owner::Item(handle),
            };
            for callback in item_callbacks {
                let flow = callback(self, &event);
                if !flow.is_pass() {
                    return flow;
                }
            }
        }

        let event = KeyEvent {
            token,
            owner: Owner::Menu,
        };
        for callback in menu_callbacks {
            let flow = callback(self, &event);
            if !flow.is_pass() {
                return flow;
            }
        }
        Flow::Pass
    }

    // ---- rendering ----

    /// Schedule a render; `force` renders synchronously under the main
    /// render lock (and even when no session is active).
    ///
    /// Key callbacks run with the render lock held, so they must use the
    /// throttled path (`force = false`).
    pub fn refresh(&self, force: bool) {
        if force {
            self.throttler().hipri(true);
        } else {
            self.throttler().lopri(false);
        }
    }

    fn do_render(&self, force: bool) {
        if !self.active() && !force {
            return;
        }

        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        state.pager.clear();

        if !state.title.is_empty() {
            state.pager.header.extend(state.title.split('\n'));
        }

        let lines: Vec<String> = (0..state.items.len())
            .map(|index| format_item(&*state, index))
            .collect();
        for (index, line) in lines.into_iter().enumerate() {
            state.pager.set_line(index, line);
        }

        let message = state.message.clone();
        state.pager.footer.append(message);

        if let Err(err) = state.pager.render(false) {
            log::error!("menu render failed: {err}");
        }
    }

    // ---- lifecycle ----

    /// Run one interactive session and return the selection, or `None`
    /// when the user cancels.
    ///
    /// The UI goes to `/dev/tty` and keys are read from `/dev/tty`, so a
    /// piped stdout stays clean. Teardown (terminal restore, final
    /// render, trailing newline, thread join) runs on every exit path.
    pub fn interact(&self) -> Result<Option<Selection>, MenuError> {
        if !stdout_is_tty() {
            return Err(MenuError::NotATty);
        }

        let tty = TtyTerminal::open()?;
        let previous = {
            let mut state = self.inner.state.lock();
            state.pager.replace_terminal(Box::new(tty))
        };

        self.inner.active.store(true, Ordering::SeqCst);
        let result = match TtySource::open_tty() {
            Ok(mut source) => self.interact_loop(&mut source),
            Err(err) => Err(MenuError::Io(err)),
        };

        self.inner.active.store(false, Ordering::SeqCst);
        self.refresh(true);
        {
            let mut state = self.inner.state.lock();
            if let Err(err) = state.pager.terminal_mut().write_str("\n") {
                log::error!("failed to finish menu output: {err}");
            }
            state.pager.replace_terminal(previous);
        }
        self.join();
        result
    }

    fn interact_loop(&self, source: &mut TtySource) -> Result<Option<Selection>, MenuError> {
        let registry = self.inner.state.lock().registry.clone();

        loop {
            self.refresh(true);

            let token = match read_token(source, &registry, None, Capture::ALL) {
                Ok(Some(token)) => token,
                Ok(None) => continue,
                Err(InputError::Eof) => return Ok(None),
                Err(InputError::Io(err)) => return Err(MenuError::Io(err)),
            };
            log::trace!("menu key: {token:?}");

            // Hold the render lock while callbacks mutate menu state so a
            // background refresh cannot interleave with the dispatch
            let flow = {
                let _render = self.throttler().main_lock();
                self.feed_key(token.clone())
            };

            match flow {
                Flow::Done => {
                    {
                        let mut state = self.inner.state.lock();
                        if state.checkbox.style.is_none() {
                            let cursor = state.cursor;
                            Self::apply_select(&mut state, cursor);
                        }
                    }
                    return Ok(self.selected());
                }
                Flow::Quit => return Ok(None),
                Flow::Pass if token.seq() == [0x03] => return Ok(None),
                _ => {}
            }
        }
    }

    /// Spawn a tracked worker thread owning a clone of this menu.
    /// Workers should poll [`Menu::active`] and exit when it turns off.
    pub fn spawn<F>(&self, f: F)
    where
        F: FnOnce(Menu) + Send + 'static,
    {
        let menu = self.clone();
        let handle = std::thread::spawn(move || f(menu));
        self.inner.threads.lock().push(handle);
    }

    /// Join every worker spawned through [`Menu::spawn`]
    pub fn join(&self) {
        loop {
            let handle = self.inner.threads.lock().pop();
            match handle {
                Some(handle) => {
                    if handle.join().is_err() {
                        log::error!("menu worker thread panicked");
                    }
                }
                None => break,
            }
        }
    }
}

fn pad(s: &str) -> String {
    " ".repeat(strwidth(s))
}

fn format_item(state: &MenuState, index: usize) -> String {
    let item = &state.items[index];

    let check = item
        .checkbox
        .check
        .as_ref()
        .or(state.checkbox.check.as_ref())
        .cloned()
        .unwrap_or_default();
    let style = item.checkbox.style.or(state.checkbox.style);

    let symbol = item
        .cursor_symbol
        .as_ref()
        .unwrap_or(&state.cursor_symbol);
    let cursor = if state.cursor == index {
        symbol.clone()
    } else {
        pad(symbol)
    };
    let check = if item.selected || item.meta {
        check
    } else {
        pad(&check)
    };

    let ctx = FormatCtx {
        cursor: &cursor,
        check: &check,
        box_pair: style.map(BoxStyle::pair).unwrap_or(("", "")),
        text: &item.text,
        index,
        selected: item.selected,
        meta: item.meta,
    };

    match item.format.as_ref().or(state.format.as_ref()) {
        Some(format) => format(&ctx),
        None if style.is_some() => format!(
            "{} {}{}{} {}",
            ctx.cursor, ctx.box_pair.0, ctx.check, ctx.box_pair.1, ctx.text
        ),
        None => format!("{} {}", ctx.cursor, ctx.text),
    }
}

impl ItemHandle {
    fn menu(&self) -> Option<Menu> {
        self.menu.upgrade().map(|inner| Menu { inner })
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut ItemState) -> R) -> Option<R> {
        let menu = self.menu()?;
        let mut state = menu.inner.state.lock();
        let state = &mut *state;
        let item = state.items.iter_mut().find(|item| item.id == self.id)?;
        Some(f(item))
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    /// Current position in the menu, or `None` once detached
    pub fn index(&self) -> Option<usize> {
        let menu = self.menu()?;
        let state = menu.inner.state.lock();
        state.items.iter().position(|item| item.id == self.id)
    }

    pub fn text(&self) -> String {
        self.with_state(|item| item.text.clone()).unwrap_or_default()
    }

    pub fn set_text(&self, text: impl Into<String>) {
        let text = text.into();
        self.with_state(|item| item.text = text);
    }

    pub fn is_meta(&self) -> bool {
        self.with_state(|item| item.meta).unwrap_or(false)
    }

    pub fn is_selected(&self) -> bool {
        self.with_state(|item| item.selected).unwrap_or(false)
    }

    pub fn select(&self) {
        if let Some(menu) = self.menu() {
            let _ = menu.select(Target::Item(self));
        }
    }

    pub fn unselect(&self) {
        if let Some(menu) = self.menu() {
            let _ = menu.unselect(Target::Item(self));
        }
    }

    pub fn toggle(&self) {
        if let Some(menu) = self.menu() {
            let _ = menu.toggle(Target::Item(self));
        }
    }

    /// Override the menu-wide checkbox for this row
    pub fn set_checkbox(&self, spec: &str) {
        let checkbox = Checkbox::parse(spec);
        self.with_state(|item| item.checkbox = checkbox);
    }

    pub fn set_cursor_symbol(&self, symbol: impl Into<String>) {
        let symbol = symbol.into();
        self.with_state(|item| item.cursor_symbol = Some(symbol));
    }

    pub fn set_format(&self, format: Formatter) {
        self.with_state(|item| item.format = Some(format));
    }

    /// Per-item state bag; setting `None` removes the key
    pub fn data(&self, key: &str) -> Option<String> {
        self.with_state(|item| item.data.get(key).cloned()).flatten()
    }

    pub fn set_data(&self, key: &str, value: Option<String>) {
        self.with_state(|item| match value {
            Some(value) => {
                item.data.insert(key.to_string(), value);
            }
            None => {
                item.data.remove(key);
            }
        });
    }

    /// Bind `callback` under item-level keys; item bindings run before
    /// menu bindings and short-circuit them on anything but `Pass`
    pub fn bind(&self, keys: &[&str], callback: Callback) {
        if let Some(menu) = self.menu() {
            let mut guard = menu.inner.state.lock();
            let state = &mut *guard;
            if let Some(item) = state.items.iter_mut().find(|item| item.id == self.id) {
                item.handler.bind(&state.registry, keys, callback);
            }
        }
    }

    pub fn unbind(&self, keys: &[&str], callback: &Callback) {
        if let Some(menu) = self.menu() {
            let mut guard = menu.inner.state.lock();
            let state = &mut *guard;
            if let Some(item) = state.items.iter_mut().find(|item| item.id == self.id) {
                item.handler.unbind(&state.registry, keys, callback);
            }
        }
    }
}

impl PartialEq for ItemHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && Weak::ptr_eq(&self.menu, &other.menu)
    }
}

impl Eq for ItemHandle {}

impl fmt::Debug for ItemHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemHandle")
            .field("id", &self.id)
            .field("index", &self.index())
            .field("text", &self.text())
            .finish()
    }
}
