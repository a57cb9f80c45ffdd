//! Configuration components
//!
//! One serde struct per concern, each with defaults that run without a file.

pub mod blob;
pub mod consumer;
pub mod logging;
pub mod reaper;
pub mod storage;

pub use blob::*;
pub use consumer::*;
pub use logging::*;
pub use reaper::*;
pub use storage::*;
