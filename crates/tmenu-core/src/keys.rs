//! Key tokens and the key registry
//!
//! A [`Key`] is a canonical, hashable token for one recognized input
//! sequence. Each key carries any number of human-readable aliases
//! (`"up"`, `"ctrl-c"`, `"^C"`, …). A [`KeyRegistry`] maps byte sequences
//! to keys and aliases back to their keys; the input reader matches
//! incoming bytes against the registry's sequences.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::LazyLock;

use parking_lot::RwLock;
use thiserror::Error;

/// Errors from registry operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("empty key sequence")]
    EmptySeq,
}

/// One recognized key: an immutable byte sequence plus its aliases
#[derive(Debug, Clone, Eq)]
pub struct Key {
    seq: Vec<u8>,
    aliases: Vec<String>,
}

impl Key {
    pub fn new(seq: impl Into<Vec<u8>>, aliases: &[&str]) -> Self {
        let mut key = Self {
            seq: seq.into(),
            aliases: Vec::new(),
        };
        for name in aliases {
            key.alias(name);
        }
        key
    }

    /// The byte sequence that uniquely identifies this key
    pub fn seq(&self) -> &[u8] {
        &self.seq
    }

    /// All aliases, in registration order
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.aliases.iter().map(String::as_str)
    }

    /// The primary alias, if any
    pub fn name(&self) -> Option<&str> {
        self.aliases.first().map(String::as_str)
    }

    /// Add an alias; duplicates are ignored
    pub fn alias(&mut self, name: &str) {
        if !self.aliases.iter().any(|a| a == name) {
            self.aliases.push(name.to_string());
        }
    }
}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.seq.hash(state);
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl PartialEq<[u8]> for Key {
    fn eq(&self, other: &[u8]) -> bool {
        self.seq == other
    }
}

impl PartialEq<&[u8]> for Key {
    fn eq(&self, other: &&[u8]) -> bool {
        self.seq == *other
    }
}

/// A key equals a string when it is one of the aliases, or when the
/// string's UTF-8 bytes are the key's sequence.
impl PartialEq<str> for Key {
    fn eq(&self, other: &str) -> bool {
        self.seq == other.as_bytes() || self.aliases.iter().any(|a| a == other)
    }
}

impl PartialEq<&str> for Key {
    fn eq(&self, other: &&str) -> bool {
        self == *other
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = self.name() {
            return write!(f, "{name}");
        }
        match std::str::from_utf8(&self.seq) {
            Ok(s) => write!(f, "{s:?}"),
            Err(_) => write!(f, "{:02x?}", self.seq),
        }
    }
}

/// Canonical keys seeded into every default registry.
///
/// Byte sequences are the common xterm set; F1–F4 use SS3, F5–F12 the
/// CSI tilde codes. Ctrl chords are generated separately.
const CANONICAL: &[(&[u8], &[&str])] = &[
    (b"\x1b", &["esc", "escape"]),
    (b"\x7f", &["backspace"]),
    (b"\t", &["tab", "ctrl-i", "ctrl+i", "^I"]),
    (b"\r", &["enter", "ctrl-m", "ctrl+m", "^M"]),
    (b" ", &["space"]),
    (b"\x1c", &["fs", "ctrl-\\", "ctrl+\\", "^\\"]),
    (b"\x1b[A", &["up"]),
    (b"\x1b[B", &["down"]),
    (b"\x1b[C", &["right"]),
    (b"\x1b[D", &["left"]),
    (b"\x1b[1~", &["home"]),
    (b"\x1b[4~", &["end"]),
    (b"\x1b[5~", &["pgup", "pageup"]),
    (b"\x1b[6~", &["pgdn", "pagedown"]),
    (b"\x1bOP", &["F1"]),
    (b"\x1bOQ", &["F2"]),
    (b"\x1bOR", &["F3"]),
    (b"\x1bOS", &["F4"]),
    (b"\x1b[15~", &["F5"]),
    (b"\x1b[17~", &["F6"]),
    (b"\x1b[18~", &["F7"]),
    (b"\x1b[19~", &["F8"]),
    (b"\x1b[20~", &["F9"]),
    (b"\x1b[21~", &["F10"]),
    (b"\x1b[23~", &["F11"]),
    (b"\x1b[24~", &["F12"]),
];

/// Two mappings: `seq -> Key` and `alias -> seq`.
///
/// Invariant: at most one key per sequence; every alias on a registered
/// key is present in the reverse index.
#[derive(Debug, Clone, Default)]
pub struct KeyRegistry {
    by_seq: HashMap<Vec<u8>, Key>,
    by_alias: HashMap<String, Vec<u8>>,
}

impl KeyRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry seeded with the canonical key set
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for (seq, aliases) in CANONICAL {
            let _ = registry.register(*seq, aliases);
        }
        // ctrl-a .. ctrl-z; i and m alias tab/enter, backslash aliases fs
        for c in b'a'..=b'z' {
            if c == b'i' || c == b'm' {
                continue;
            }
            let chord = [c - b'a' + 1];
            let lower = c as char;
            let upper = lower.to_ascii_uppercase();
            let aliases = [
                format!("ctrl-{lower}"),
                format!("ctrl+{lower}"),
                format!("^{upper}"),
            ];
            let names: Vec<&str> = aliases.iter().map(String::as_str).collect();
            let _ = registry.register(&chord[..], &names);
        }
        registry
    }

    /// Register `seq` under the given aliases.
    ///
    /// An already-registered sequence gains the new aliases instead.
    /// Returns a snapshot of the registered key.
    pub fn register(&mut self, seq: impl Into<Vec<u8>>, aliases: &[&str]) -> Result<Key, KeyError> {
        let seq = seq.into();
        if seq.is_empty() {
            return Err(KeyError::EmptySeq);
        }

        let key = self
            .by_seq
            .entry(seq.clone())
            .or_insert_with(|| Key::new(seq.clone(), &[]));
        for name in aliases {
            key.alias(name);
        }
        let snapshot = key.clone();
        for name in snapshot.aliases() {
            self.by_alias.insert(name.to_string(), seq.clone());
        }
        Ok(snapshot)
    }

    /// Merge a prebuilt key (and any extra aliases) into the registry
    pub fn register_key(&mut self, key: &Key, extra: &[&str]) -> Result<Key, KeyError> {
        let mut aliases: Vec<&str> = key.aliases().collect();
        aliases.extend_from_slice(extra);
        self.register(key.seq().to_vec(), &aliases)
    }

    /// Remove a key from both indices; returns the removed key
    pub fn deregister(&mut self, seq: &[u8]) -> Option<Key> {
        let key = self.by_seq.remove(seq)?;
        for alias in key.aliases() {
            self.by_alias.remove(alias);
        }
        Some(key)
    }

    pub fn lookup_seq(&self, seq: &[u8]) -> Option<&Key> {
        self.by_seq.get(seq)
    }

    pub fn lookup_alias(&self, alias: &str) -> Option<&Key> {
        self.by_seq.get(self.by_alias.get(alias)?)
    }

    /// All registered sequences (the input decoder's candidate set)
    pub fn seqs(&self) -> impl Iterator<Item = &[u8]> {
        self.by_seq.keys().map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.by_seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_seq.is_empty()
    }
}

static DEFAULT_REGISTRY: LazyLock<RwLock<KeyRegistry>> =
    LazyLock::new(|| RwLock::new(KeyRegistry::with_defaults()));

/// The process-wide registry used by [`crate::input::getch`]
pub fn default_registry() -> &'static RwLock<KeyRegistry> {
    &DEFAULT_REGISTRY
}

/// Register a sequence in the process-wide registry
pub fn register_key(seq: impl Into<Vec<u8>>, aliases: &[&str]) -> Result<Key, KeyError> {
    DEFAULT_REGISTRY.write().register(seq, aliases)
}

/// Remove a sequence from the process-wide registry
pub fn deregister_key(seq: &[u8]) -> Option<Key> {
    DEFAULT_REGISTRY.write().deregister(seq)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_keys() {
        let registry = KeyRegistry::with_defaults();

        let cases: &[(&[u8], &[&str])] = &[
            (b"\x1b", &["esc", "escape"]),
            (b"\x7f", &["backspace"]),
            (b"\t", &["tab", "ctrl-i", "ctrl+i", "^I"]),
            (b"\r", &["enter", "ctrl-m", "ctrl+m", "^M"]),
            (b" ", &["space"]),
            (b"\x1c", &["fs", "ctrl-\\", "ctrl+\\", "^\\"]),
            (b"\x1b[A", &["up"]),
            (b"\x1b[B", &["down"]),
            (b"\x1b[C", &["right"]),
            (b"\x1b[D", &["left"]),
            (b"\x1b[1~", &["home"]),
            (b"\x1b[4~", &["end"]),
            (b"\x1b[5~", &["pgup", "pageup"]),
            (b"\x1b[6~", &["pgdn", "pagedown"]),
            (b"\x1bOP", &["F1"]),
            (b"\x1bOQ", &["F2"]),
            (b"\x1bOR", &["F3"]),
            (b"\x1bOS", &["F4"]),
            (b"\x1b[15~", &["F5"]),
            (b"\x1b[17~", &["F6"]),
            (b"\x1b[18~", &["F7"]),
            (b"\x1b[19~", &["F8"]),
            (b"\x1b[20~", &["F9"]),
            (b"\x1b[21~", &["F10"]),
            (b"\x1b[23~", &["F11"]),
            (b"\x1b[24~", &["F12"]),
        ];

        for (seq, aliases) in cases {
            let key = registry.lookup_seq(seq).expect("canonical key registered");
            for alias in *aliases {
                assert_eq!(key, *alias, "alias {alias} on {key}");
                assert_eq!(
                    registry.lookup_alias(alias).expect("alias indexed"),
                    key,
                    "reverse index for {alias}"
                );
            }
        }
    }

    #[test]
    fn test_ctrl_chords() {
        let registry = KeyRegistry::with_defaults();
        for c in b'a'..=b'z' {
            if c == b'i' || c == b'm' {
                continue;
            }
            let lower = c as char;
            let upper = lower.to_ascii_uppercase();
            let key = registry
                .lookup_alias(&format!("ctrl-{lower}"))
                .expect("ctrl chord registered");
            assert_eq!(key.seq(), &[c - b'a' + 1]);
            assert_eq!(key, format!("ctrl+{lower}").as_str());
            assert_eq!(key, format!("^{upper}").as_str());
        }
        // i, m, and backslash land on tab / enter / fs
        assert_eq!(registry.lookup_alias("ctrl-i").map(Key::seq), Some(&b"\t"[..]));
        assert_eq!(registry.lookup_alias("ctrl-m").map(Key::seq), Some(&b"\r"[..]));
        assert_eq!(registry.lookup_alias("ctrl-\\").map(Key::seq), Some(&b"\x1c"[..]));
    }

    #[test]
    fn test_key_equality() {
        let registry = KeyRegistry::with_defaults();
        let up = registry.lookup_alias("up").unwrap();
        assert_eq!(up, &b"\x1b[A"[..]);
        assert_eq!(up, "\x1b[A");
        assert_eq!(up, "up");
        assert_ne!(up, "down");
    }

    #[test]
    fn test_key_alias_dedup() {
        let mut key = Key::new("test_key", &[]);
        assert_ne!(key, "wah");
        key.alias("wah");
        assert_eq!(key, "wah");
        key.alias("wah");
        assert_eq!(key.aliases().count(), 1);
    }

    #[test]
    fn test_key_display() {
        let registry = KeyRegistry::with_defaults();
        assert_eq!(registry.lookup_alias("up").unwrap().to_string(), "up");
        assert_eq!(Key::new("測", &[]).to_string(), "\"測\"");
    }

    #[test]
    fn test_register_empty_seq() {
        let mut registry = KeyRegistry::new();
        assert_eq!(registry.register("", &[]), Err(KeyError::EmptySeq));
    }

    #[test]
    fn test_register_merges_aliases() {
        let mut registry = KeyRegistry::with_defaults();
        let my_home = registry.register(&b"\x1b[1~"[..], &["MY_HOME"]).unwrap();
        assert_eq!(my_home, "home");
        assert_eq!(my_home, "MY_HOME");
        assert_eq!(registry.lookup_alias("MY_HOME").unwrap().seq(), b"\x1b[1~");
    }

    #[test]
    fn test_register_key_object() {
        let mut registry = KeyRegistry::new();
        let new_key = Key::new(r"\033[[[[[[", &["wow"]);
        let nkey = registry.register_key(&new_key, &["wah", "haha"]).unwrap();
        assert_eq!(new_key.seq(), nkey.seq());
        assert_eq!(new_key, "wow");
        assert_eq!(nkey, "wah");
        assert_eq!(nkey, "haha");
        assert_eq!(registry.deregister(new_key.seq()), Some(nkey));
    }

    #[test]
    fn test_deregister_clears_reverse_index() {
        let mut registry = KeyRegistry::with_defaults();
        let up = registry.deregister(b"\x1b[A").unwrap();
        assert_eq!(up, "up");
        assert!(registry.lookup_seq(b"\x1b[A").is_none());
        assert!(registry.lookup_alias("up").is_none());
        assert!(registry.deregister(b"\x1b[A").is_none());
    }
}
