pub mod commands;
pub mod error;
pub mod handler;
pub mod supervisor;
pub mod transport;

pub use commands::{confine, confined, release};
