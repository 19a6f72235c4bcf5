//! Larder Core - Shared types library.
//!
//! This crate provides the types shared by every Larder component:
//! - `store` - Persistent medium, TTL cache and identity-scoped sets
//! - `cli` - Command-line inspection and maintenance of a store directory
//!
//! # Architecture
//!
//! The core crate contains only types and traits - no I/O, no clocks, no
//! storage access. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Store keys, identities, cache entries and scoped sets

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
