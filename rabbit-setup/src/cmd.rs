// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Facilities used by command-line programs

use std::process::exit;

/// Exit code for incorrect invocations.
pub const EXIT_USAGE: i32 = 2;
/// Exit code for runtime failures.
pub const EXIT_FAILURE: i32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum CmdError {
    /// Incorrect command-line arguments
    #[error("usage error: {0}")]
    Usage(String),
    /// The command itself failed
    #[error(transparent)]
    Failure(#[from] anyhow::Error),
}

/// Prints an appropriate message and exits with a status reflecting the kind
/// of failure.
pub fn fatal(cmd_error: CmdError) -> ! {
    let (code, message) = match &cmd_error {
        CmdError::Usage(message) => (EXIT_USAGE, message.clone()),
        CmdError::Failure(error) => (EXIT_FAILURE, format!("{error:#}")),
    };
    eprintln!("rabbit-setup: {message}");
    exit(code);
}
