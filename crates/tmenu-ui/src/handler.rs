//! Key binding tables and dispatch
//!
//! Every menu and every item owns a [`KeyHandler`]: an ordered mapping
//! from normalized keys to callback lists, plus a catch-all bucket.
//! Dispatch walks the specific list first and then the catch-all; the
//! first callback returning something other than [`Flow::Pass`]
//! short-circuits. Item handlers bubble to the menu handler.

use std::collections::HashMap;
use std::sync::Arc;

use tmenu_core::input::Token;
use tmenu_core::keys::KeyRegistry;

use crate::menu::{ItemHandle, Menu};

/// Outcome of a key callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Not handled; keep dispatching
    Pass,
    /// Handled; stop dispatching
    Handled,
    /// Finish the session and return the current selection
    Done,
    /// Abandon the session
    Quit,
}

impl Flow {
    pub fn is_pass(self) -> bool {
        matches!(self, Self::Pass)
    }
}

/// Which handler a binding fired from
#[derive(Clone)]
pub enum Owner {
    Menu,
    Item(ItemHandle),
}

/// A key arriving at a handler
#[derive(Clone)]
pub struct KeyEvent {
    pub token: Token,
    pub owner: Owner,
}

impl KeyEvent {
    /// The item the binding belongs to, when it fired from one
    pub fn item(&self) -> Option<&ItemHandle> {
        match &self.owner {
            Owner::Item(item) => Some(item),
            Owner::Menu => None,
        }
    }
}

pub type Callback = Arc<dyn Fn(&Menu, &KeyEvent) -> Flow + Send + Sync>;

/// Wrap a closure into a bindable [`Callback`]
pub fn callback<F>(f: F) -> Callback
where
    F: Fn(&Menu, &KeyEvent) -> Flow + Send + Sync + 'static,
{
    Arc::new(f)
}

/// A binding key after normalization through the alias table
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum BindKey {
    Seq(Vec<u8>),
    Lit(String),
}

fn normalize_name(registry: &KeyRegistry, name: &str) -> BindKey {
    match registry.lookup_alias(name) {
        Some(key) => BindKey::Seq(key.seq().to_vec()),
        None => BindKey::Lit(name.to_string()),
    }
}

fn normalize_token(registry: &KeyRegistry, token: &Token) -> BindKey {
    match token {
        Token::Key(key) => BindKey::Seq(key.seq().to_vec()),
        Token::Text(text) => match registry.lookup_alias(text) {
            Some(key) => BindKey::Seq(key.seq().to_vec()),
            None => BindKey::Lit(text.clone()),
        },
        Token::Bytes(bytes) => BindKey::Seq(bytes.clone()),
    }
}

fn push_unique(list: &mut Vec<Callback>, callback: Callback) {
    if !list.iter().any(|existing| Arc::ptr_eq(existing, &callback)) {
        list.push(callback);
    }
}

/// Per-owner binding table
#[derive(Default)]
pub struct KeyHandler {
    table: HashMap<BindKey, Vec<Callback>>,
    catch_all: Vec<Callback>,
}

impl KeyHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `callback` under each key; with no keys it becomes a
    /// catch-all. Binding the same callback twice under one key keeps a
    /// single entry.
    pub fn bind(&mut self, registry: &KeyRegistry, keys: &[&str], callback: Callback) {
        if keys.is_empty() {
            push_unique(&mut self.catch_all, callback);
            return;
        }
        for name in keys {
            let key = normalize_name(registry, name);
            push_unique(self.table.entry(key).or_default(), callback.clone());
        }
    }

    /// Remove `callback` from each listed key, or from everything when
    /// no keys are given
    pub fn unbind(&mut self, registry: &KeyRegistry, keys: &[&str], callback: &Callback) {
        let drop_from = |list: &mut Vec<Callback>| {
            list.retain(|existing| !Arc::ptr_eq(existing, callback));
        };

        if keys.is_empty() {
            for list in self.table.values_mut() {
                drop_from(list);
            }
            drop_from(&mut self.catch_all);
        } else {
            for name in keys {
                if let Some(list) = self.table.get_mut(&normalize_name(registry, name)) {
                    drop_from(list);
                }
            }
        }
        self.table.retain(|_, list| !list.is_empty());
    }

    /// Drop every callback bound under `name`
    pub fn unbind_key(&mut self, registry: &KeyRegistry, name: &str) {
        self.table.remove(&normalize_name(registry, name));
    }

    pub fn clear(&mut self) {
        self.table.clear();
        self.catch_all.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty() && self.catch_all.is_empty()
    }

    /// The dispatch list for `token`: specific bindings first, then the
    /// catch-all bucket
    pub fn callbacks_for(&self, registry: &KeyRegistry, token: &Token) -> Vec<Callback> {
        let key = normalize_token(registry, token);
        let mut callbacks = self.table.get(&key).cloned().unwrap_or_default();
        callbacks.extend(self.catch_all.iter().cloned());
        callbacks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Callback {
        callback(|_menu, _event| Flow::Handled)
    }

    fn text(s: &str) -> Token {
        Token::Text(s.to_string())
    }

    #[test]
    fn test_bind_is_unique_per_key() {
        let registry = KeyRegistry::with_defaults();
        let mut handler = KeyHandler::new();
        let cb = noop();

        handler.bind(&registry, &["up"], cb.clone());
        handler.bind(&registry, &["up"], cb.clone());
        assert_eq!(handler.callbacks_for(&registry, &text("up")).len(), 1);

        // a different callback with the same code is a separate binding
        handler.bind(&registry, &["up"], noop());
        assert_eq!(handler.callbacks_for(&registry, &text("up")).len(), 2);
    }

    #[test]
    fn test_aliases_share_one_bucket() {
        let registry = KeyRegistry::with_defaults();
        let mut handler = KeyHandler::new();

        handler.bind(&registry, &["ctrl-m"], noop());
        assert_eq!(handler.callbacks_for(&registry, &text("enter")).len(), 1);
        assert_eq!(handler.callbacks_for(&registry, &text("^M")).len(), 1);
        assert_eq!(handler.callbacks_for(&registry, &text("tab")).len(), 0);
    }

    #[test]
    fn test_catch_all_comes_last() {
        let registry = KeyRegistry::with_defaults();
        let mut handler = KeyHandler::new();
        let specific = noop();
        let fallback = noop();

        handler.bind(&registry, &[], fallback.clone());
        handler.bind(&registry, &["q"], specific.clone());

        let callbacks = handler.callbacks_for(&registry, &text("q"));
        assert_eq!(callbacks.len(), 2);
        assert!(Arc::ptr_eq(&callbacks[0], &specific));
        assert!(Arc::ptr_eq(&callbacks[1], &fallback));

        let callbacks = handler.callbacks_for(&registry, &text("x"));
        assert_eq!(callbacks.len(), 1);
        assert!(Arc::ptr_eq(&callbacks[0], &fallback));
    }

    #[test]
    fn test_unbind() {
        let registry = KeyRegistry::with_defaults();
        let mut handler = KeyHandler::new();
        let cb = noop();

        handler.bind(&registry, &["up", "down"], cb.clone());
        handler.unbind(&registry, &["up"], &cb);
        assert_eq!(handler.callbacks_for(&registry, &text("up")).len(), 0);
        assert_eq!(handler.callbacks_for(&registry, &text("down")).len(), 1);

        handler.unbind(&registry, &[], &cb);
        assert!(handler.is_empty());
    }

    #[test]
    fn test_unbind_key_drops_whole_list() {
        let registry = KeyRegistry::with_defaults();
        let mut handler = KeyHandler::new();

        let space = Token::Key(registry.lookup_alias("space").unwrap().clone());
        handler.bind(&registry, &["space"], noop());
        handler.bind(&registry, &["space"], noop());
        assert_eq!(handler.callbacks_for(&registry, &space).len(), 2);
        handler.unbind_key(&registry, "space");
        assert_eq!(handler.callbacks_for(&registry, &space).len(), 0);
    }

    #[test]
    fn test_unknown_names_bind_literally() {
        let registry = KeyRegistry::with_defaults();
        let mut handler = KeyHandler::new();

        handler.bind(&registry, &["a"], noop());
        assert_eq!(handler.callbacks_for(&registry, &text("a")).len(), 1);
        assert_eq!(handler.callbacks_for(&registry, &text("b")).len(), 0);
    }
}
