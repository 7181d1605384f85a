//! # shunt
//!
//! Assembly of the forwarder: the default plugin set, configuration fan-out
//! and lifecycle. The binary in `main.rs` is a thin CLI over this.

pub mod forwarder;
pub mod memory;
pub mod querylogger;
pub mod service;

pub use forwarder::{default_registry, Forwarder};
