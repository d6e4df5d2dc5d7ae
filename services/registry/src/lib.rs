//! imgreg registry service library.
//!
//! This crate primarily ships the `registry` binary, but we expose a small
//! library surface to enable integration testing.

pub mod api;
pub mod config;
pub mod logging;
pub mod state;
