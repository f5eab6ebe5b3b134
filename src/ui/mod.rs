//! User interface rendering and input handling.
//!
//! - **render**: draws the menu, a running test and results with ratatui
//! - **input**: turns raw terminal bytes from remote clients into key events

pub mod input;
pub mod render;

pub use input::{Input, InputDecoder};
