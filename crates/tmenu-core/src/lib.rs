//! tmenu-core: Terminal building blocks for tmenu
//!
//! This crate provides the low-level pieces the menu engine is built on:
//! - Display-cell width measurement and hard wrapping
//! - Key tokens, the key registry, and alias tables
//! - A raw-mode input reader that decodes byte sequences into key tokens
//! - A segmented (header/body/footer) differential pager

pub mod input;
pub mod keys;
pub mod pager;
pub mod term;
pub mod typeset;

pub use input::{getch, read_token, ByteSource, Capture, InputError, Token};
pub use keys::{Key, KeyError, KeyRegistry};
pub use pager::{PageLine, Pager, Section};
pub use term::{StdoutTerminal, TermSize, Terminal, TtyTerminal};
pub use typeset::{charwidth, decolor, strwidth, wrap, wrap_with_clip};
