pub mod budget;
pub mod config;
pub mod decode;
pub mod diff;
pub mod error;
pub mod identity;
pub mod net;
pub mod preload;
pub mod render_cache;
pub mod scroll;

pub use diff::{DiffRequest, DiffResponse, DiffResult};
pub use identity::{Identified, MessageRef};
