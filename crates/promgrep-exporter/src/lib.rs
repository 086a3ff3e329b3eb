//! promgrep exporter library entry.
//!
//! This crate wires the stream dispatcher, the per-rule workers, the
//! instrument registry and the HTTP exposition endpoint into a running engine.
//! It is intended to be consumed by the binary (`main.rs`) and by integration
//! tests.

pub mod app_state;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod obs;
pub mod ops;
pub mod output;
pub mod process;
pub mod router;
