//! Data Models
//!
//! Contains the data structures shared by the streaming services and commands.

pub mod response;
pub mod settings;
pub mod streaming;

pub use response::*;
pub use settings::*;
pub use streaming::*;
