pub mod commands;
pub mod store;
pub mod task;

pub use commands::{check, last};
