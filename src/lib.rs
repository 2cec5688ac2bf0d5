pub mod backend;
pub mod common;
pub mod config;
pub mod error;
pub mod sync;
pub mod ui;
