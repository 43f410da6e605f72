//! # tagforged-av
//!
//! Everything tagforged knows about the external transcoder.
//!
//! This crate provides:
//! - **Tool probing** ([`probe_tool`]) -- resolve the ffmpeg executable and
//!   check that it answers a version query within a short timeout
//! - **Command construction** ([`command`]) -- the pure mapping from
//!   `(AudioFormat, Quality)` to an ffmpeg argument list
//! - **Process adapter** ([`ProcessLauncher`], [`ProcessHandle`]) -- launch
//!   one tool process, poll it without blocking, terminate it, and collect
//!   its stderr once it exits
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::time::Duration;
//! use tagforged_av::{command, probe_tool, ProcessLauncher, SystemLauncher};
//! use tagforged_common::{AudioFormat, Quality};
//!
//! # async fn example() -> tagforged_common::Result<()> {
//! let tool = probe_tool("ffmpeg", None, "-version", Duration::from_secs(5)).await;
//! let program = tool.require()?;
//! let args = command::conversion_args(
//!     Path::new("track.wav"),
//!     Path::new("track.mp3"),
//!     AudioFormat::Mp3,
//!     Quality::Standard,
//! );
//! let mut process = SystemLauncher.launch(program, &args)?;
//! let _state = process.poll()?;
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod process;
pub mod tools;

// Re-exports
pub use process::{ProcessHandle, ProcessLauncher, ProcessState, SystemLauncher, ToolProcess};
pub use tools::{probe_tool, resolve_tool_path, ToolInfo};
