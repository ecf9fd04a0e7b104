//! Display-cell typesetting helpers
//!
//! Widths are measured in terminal display cells: East Asian wide and
//! fullwidth characters occupy two cells, everything else one. SGR runs
//! (`ESC [ … m`) are invisible, so they measure zero and are never split
//! by wrapping.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use unicode_width::UnicodeWidthChar;

static SGR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("\x1b\\[[0-9;]*m").expect("SGR pattern is valid"));

/// Errors from typesetting operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypesetError {
    #[error("clip should be a single width char")]
    WideClip,
}

/// Number of display cells occupied by `c`
pub fn charwidth(c: char) -> usize {
    UnicodeWidthChar::width(c).unwrap_or(1)
}

/// Strip SGR escape runs from `s`
pub fn decolor(s: &str) -> Cow<'_, str> {
    SGR_RE.replace_all(s, "")
}

/// Number of display cells occupied by `s`, ignoring SGR runs
pub fn strwidth(s: &str) -> usize {
    decolor(s).chars().map(charwidth).sum()
}

/// Byte length of an SGR run at the start of `s`, if one is there
fn sgr_len(s: &str) -> Option<usize> {
    let rest = s.strip_prefix("\x1b[")?;
    let end = rest.find(|c: char| !c.is_ascii_digit() && c != ';')?;
    (rest.as_bytes()[end] == b'm').then_some(2 + end + 1)
}

/// Find the byte offset where `s` stops fitting in `width` cells.
///
/// Returns the split offset and the cell width consumed by the head.
fn wrap_point(s: &str, width: usize) -> (usize, usize) {
    let mut w = 0;
    let mut i = 0;
    while i < s.len() {
        if let Some(len) = sgr_len(&s[i..]) {
            i += len;
            continue;
        }
        let Some(c) = s[i..].chars().next() else {
            break;
        };
        let cw = charwidth(c);
        if w + cw > width {
            return (i, w);
        }
        w += cw;
        i += c.len_utf8();
    }
    (s.len(), w)
}

/// Hard-wrap `s` at `width` display cells.
///
/// The head never exceeds `width` cells and `head + tail == s`.
pub fn wrap(s: &str, width: usize) -> (&str, &str) {
    let (at, _) = wrap_point(s, width);
    s.split_at(at)
}

/// Like [`wrap`], but mark a clipped head with `clip` when it fits.
///
/// `clip` must be a single-width character.
pub fn wrap_with_clip(s: &str, width: usize, clip: char) -> Result<(String, &str), TypesetError> {
    if charwidth(clip) != 1 {
        return Err(TypesetError::WideClip);
    }

    let (at, used) = wrap_point(s, width);
    if at == s.len() {
        return Ok((s.to_string(), ""));
    }

    let mut head = s[..at].to_string();
    if used + 1 <= width {
        head.push(clip);
    }
    Ok((head, &s[at..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORANGE: &str = "\x1b[38;5;214m";
    const RESET: &str = "\x1b[m";

    #[test]
    fn test_charwidth() {
        assert_eq!(charwidth('t'), 1);
        assert_eq!(charwidth('哇'), 2);
        assert_eq!(charwidth('嗚'), 2);
        assert_eq!(charwidth('😂'), 2);
    }

    #[test]
    fn test_strwidth() {
        assert_eq!(strwidth("test"), 4);
        assert_eq!(strwidth(&format!("{ORANGE}test{RESET}")), 4);
        assert_eq!(strwidth("哇嗚"), 4);
    }

    #[test]
    fn test_decolor() {
        assert_eq!(decolor("plain"), "plain");
        assert_eq!(decolor(&format!("{ORANGE}test{RESET}")), "test");
    }

    #[test]
    fn test_wrap() {
        assert_eq!(wrap("嗚啦呀哈", 1), ("", "嗚啦呀哈"));
        assert_eq!(wrap("嗚啦呀哈", 2), ("嗚", "啦呀哈"));
        assert_eq!(wrap("嗚啦呀哈", 3), ("嗚", "啦呀哈"));
        assert_eq!(wrap("嗚啦呀哈", 4), ("嗚啦", "呀哈"));
        assert_eq!(wrap("嗚啦呀哈", 5), ("嗚啦", "呀哈"));
        assert_eq!(wrap("嗚啦呀哈", 6), ("嗚啦呀", "哈"));
        assert_eq!(wrap("嗚啦呀哈", 7), ("嗚啦呀", "哈"));
        assert_eq!(wrap("嗚啦呀哈", 8), ("嗚啦呀哈", ""));
        assert_eq!(wrap("嗚啦呀哈", 9), ("嗚啦呀哈", ""));
    }

    #[test]
    fn test_wrap_with_clip() {
        let wrapc = |s, w| wrap_with_clip(s, w, '>').unwrap();
        assert_eq!(wrapc("嗚啦呀哈", 1), (">".to_string(), "嗚啦呀哈"));
        assert_eq!(wrapc("嗚啦呀哈", 2), ("嗚".to_string(), "啦呀哈"));
        assert_eq!(wrapc("嗚啦呀哈", 3), ("嗚>".to_string(), "啦呀哈"));
        assert_eq!(wrapc("嗚啦呀哈", 4), ("嗚啦".to_string(), "呀哈"));
        assert_eq!(wrapc("嗚啦呀哈", 5), ("嗚啦>".to_string(), "呀哈"));
        assert_eq!(wrapc("嗚啦呀哈", 6), ("嗚啦呀".to_string(), "哈"));
        assert_eq!(wrapc("嗚啦呀哈", 7), ("嗚啦呀>".to_string(), "哈"));
        assert_eq!(wrapc("嗚啦呀哈", 8), ("嗚啦呀哈".to_string(), ""));
        assert_eq!(wrapc("嗚啦呀哈", 9), ("嗚啦呀哈".to_string(), ""));
    }

    #[test]
    fn test_wrap_wide_clip_rejected() {
        assert_eq!(wrap_with_clip("whatever", 1, '蛤'), Err(TypesetError::WideClip));
    }

    #[test]
    fn test_wrap_preserves_sgr_runs() {
        let s = format!("{ORANGE}哇哇{RESET}!");
        let (head, tail) = wrap(&s, 4);
        assert_eq!(head, format!("{ORANGE}哇哇{RESET}"));
        assert_eq!(tail, "!");
        assert_eq!(strwidth(head), 4);
        assert_eq!(format!("{head}{tail}"), s);
    }

    #[test]
    fn test_wrap_width_roundtrip() {
        for width in 1..12 {
            let s = "mixed 哇 width 嗚 text";
            let (head, tail) = wrap(s, width);
            assert!(strwidth(head) <= width);
            assert_eq!(format!("{head}{tail}"), s);
        }
    }
}
