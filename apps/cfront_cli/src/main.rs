//! cfrontc - standalone binary
//!
//! Thin wrapper around [`cfront_cli::run_cli`], handling error display and
//! exit codes. All command logic lives in the library crate for testability.
//!
//! # Exit Codes
//!
//! - `0` - success, no diagnostics
//! - `1` - lexical/syntactic errors, or failed file I/O
//! - `2` - internal/fatal error

fn main() {
    std::process::exit(cfront_cli::run_cli());
}
