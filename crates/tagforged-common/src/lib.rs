//! Tagforged-Common: Shared types, identifiers, and errors.
//!
//! This crate provides common functionality used across tagforged:
//!
//! - **Typed IDs**: UUID wrappers for jobs, tasks, entities and subscriptions
//! - **Core Types**: [`AudioFormat`] and [`Quality`], the conversion domain
//! - **Path Utilities**: audio extension detection and collision-free naming
//! - **Error Handling**: the error taxonomy shared by every crate
//!
//! # Examples
//!
//! ```
//! use tagforged_common::{AudioFormat, Error, JobId, Quality};
//!
//! let id = JobId::new();
//! let format: AudioFormat = "flac".parse()?;
//! assert_eq!(format.extension(), "flac");
//! assert_eq!(Quality::default(), Quality::Standard);
//! # let _ = id;
//! # Ok::<(), Error>(())
//! ```

pub mod error;
pub mod ids;
pub mod paths;
pub mod types;

pub use error::{Error, Result};
pub use ids::*;
pub use types::*;
