//! Developer toolkit library
//!
//! This library provides local persistence for notes and code snippets, a
//! drag-and-drop task board, zip backups of the stored data, and a handful of
//! text tools.

mod backup;
mod board;
mod cli;
mod config;
mod errors;
mod helper;
pub mod ids;
mod kv;
pub mod migrate;
mod note;
mod record;
mod snippet;
mod store;
mod task;
pub mod tools;
mod types;

// Re-export key components
pub use backup::*;
pub use board::*;
pub use cli::*;
pub use config::*;
pub use errors::*;
pub use helper::*;
pub use kv::*;
pub use note::*;
pub use record::*;
pub use snippet::*;
pub use store::*;
pub use task::*;
pub use types::*;
