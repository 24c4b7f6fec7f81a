mod models;

pub use models::{Session, User};
