//! tmenu-ui: The tmenu menu engine
//!
//! This crate builds the interactive layer on top of tmenu-core:
//! - Key binding tables with bubbling dispatch
//! - A one-shot timer and a render throttler
//! - The menu itself: items, cursor, selection, the interactive loop
//! - A threaded progress spinner

pub mod handler;
pub mod menu;
pub mod spinner;
pub mod throttle;

pub use handler::{callback, Callback, Flow, KeyEvent, KeyHandler, Owner};
pub use menu::{
    BoxStyle, Checkbox, FormatCtx, Formatter, ItemHandle, ItemId, Menu, MenuError, Selection,
    Target,
};
pub use spinner::{Spinner, SpinnerStyle};
pub use throttle::{Throttler, Timer};
