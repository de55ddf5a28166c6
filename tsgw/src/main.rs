//! The gateway binary.
//!
//! Authenticates metric submissions of many organizations, normalizes them and hands them to the
//! downstream publishing pipeline. Searches are proxied to the search cluster. Run `tsgw --help`
//! for the available commands.

mod cli;
mod cliapp;
mod setup;

use std::process;

pub fn main() {
    let exit_code = match cli::execute() {
        Ok(()) => 0,
        Err(err) => {
            tsgw_log::ensure_error(&err);
            1
        }
    };

    process::exit(exit_code);
}
