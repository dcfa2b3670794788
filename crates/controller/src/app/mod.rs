//! Application module
//!
//! Wires configuration into running components and supervises their tasks.

pub mod builder;
pub mod core;
pub mod tasks;

pub use builder::ApplicationBuilder;
pub use core::Application;
