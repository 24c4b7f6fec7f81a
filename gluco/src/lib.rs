mod app;
pub mod app_core;
mod background;
pub mod events;
pub mod logging;
pub mod state;
pub mod stream;

pub use app::{App, Exit};

// Always expose testing module (integration tests need it)
pub mod testing;
