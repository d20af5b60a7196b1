//! Configuration utilities re-exported at the crate root.
//!
//! This exposes [`ClaimConfig`] and [`StoreConfig`] so applications can load
//! settings from `config/config.toml` or `HALO__`-prefixed environment
//! variables using `ClaimConfig::load()` / `StoreConfig::load()`.

pub use crate::store::config::*;
