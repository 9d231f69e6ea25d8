//! Tauri Commands
//!
//! IPC handlers exposed to the frontend.

pub mod streaming;

pub use streaming::*;
