pub mod io_utils;
pub mod sync;

pub use sync::engine::SyncEngine;
pub use sync::{default_engine, SyncEvent};
