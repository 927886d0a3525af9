//! # Engine Module
//!
//! Stateful services used by the module runtime.
//!
//! - **Caches** ([`cache`]) - Per-module-key value stores, policies and the distribution worker
//! - **Checkpoints** ([`checkpoint`]) - Saving and restoring persistent cache entries
//! - **Configuration** ([`config`]) - Runtime settings, built in code or read from TOML
//! - **Output** ([`output`]) - The structured output sink handed to every module instance

pub mod cache;
pub mod checkpoint;
pub mod config;
pub mod output;
