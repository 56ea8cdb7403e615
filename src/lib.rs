pub mod audio;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod format;
pub mod import;
pub mod library;
pub mod logging;
pub mod models;
pub mod playback;
pub mod spectrum;


pub use error::*;
pub use models::*;
