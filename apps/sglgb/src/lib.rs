//! # SGLGB Portal Application
//!
//! HTTP API, CLI and configuration around [`sglgb_core`]. The binary in
//! `main.rs` is a thin wrapper; everything here is reachable from the
//! integration tests.

pub mod api;
pub mod cli;
pub mod config;
