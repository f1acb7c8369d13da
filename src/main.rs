//! clusterkeeper CLI entry point
//!
//! Parses arguments and dispatches through `cli::run`. Errors have
//! already been reported as JSON on stdout; they are repeated on stderr
//! and the process exits non-zero.

use clusterkeeper::cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
