//! Tagforged - background conversion queue and shared task state
//!
//! This library crate exposes the coordination layer used by the tagforged
//! binary and by integration tests:
//!
//! - [`queue`]: FIFO conversion queue driving one ffmpeg process at a time
//! - [`state`]: thread-safe registry of tasks, entities, selection and counters
//! - [`events`]: topic publish/subscribe, typed job observers and a broadcast
//!   stream
//! - [`config`]: TOML configuration

pub mod config;
pub mod events;
pub mod queue;
pub mod state;

pub use tagforged_common::{AudioFormat, Error, JobId, Quality, Result};
