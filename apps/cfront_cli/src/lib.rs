//! cfrontc - command-line driver for the cfront C front end.
//!
//! Provides the `cfrontc` binary: reads one or more C source files, runs
//! them through [`cfront_core::session::Session`], and prints diagnostics to
//! stderr. The binary is a thin wrapper; all argument parsing and dispatch
//! logic lives here so it stays testable without spawning a subprocess.
//!
//! # Module Structure
//!
//! - [`cli`] - argument parsing and the compile-one-file dispatch loop
//!
//! # Exit Codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | `0` | success, no diagnostics |
//! | `1` | lexical/syntactic errors, or failed file I/O |
//! | `2` | internal/fatal error |

pub mod cli;

/// Entry point for the CLI. See [`cli::run_cli`] for details.
pub use cli::run_cli;
