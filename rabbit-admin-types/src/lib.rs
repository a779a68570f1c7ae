// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Parsed representations of `rabbitmqctl` output.
//!
//! The administrative CLI prints whitespace-delimited tabular text, sometimes
//! framed by decoration lines (`Listing users ...` / `...done.`) depending on
//! the tool's version and quiet flag.  The parsers here tolerate both forms
//! and are kept in their own crate so the parsing strategy can be swapped for
//! a structured management API without touching the callers.

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("output is not valid UTF-8")]
    NonUtf8(#[source] std::str::Utf8Error),
}

// Framing emitted by older `rabbitmqctl` versions when run without `-q`.
fn is_decoration(line: &str) -> bool {
    line.starts_with("Listing ") || line.starts_with("...done")
}

/// A single row of `rabbitmqctl list_users` output.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct UserEntry {
    /// User id: the first column of the row, matched exactly by callers.
    pub name: String,
    /// Remaining columns, verbatim (typically a `[tags]` list).
    pub tags: String,
}

impl UserEntry {
    /// Parses the stdout of `rabbitmqctl list_users`.
    pub fn parse_from_table(stdout: &[u8]) -> Result<Vec<UserEntry>, ParseError> {
        let text = std::str::from_utf8(stdout).map_err(ParseError::NonUtf8)?;
        let mut entries = Vec::new();
        for line in text.lines() {
            if is_decoration(line) {
                continue;
            }
            let mut columns = line.split_whitespace();
            let Some(name) = columns.next() else {
                continue;
            };
            entries.push(UserEntry {
                name: name.to_string(),
                tags: columns.collect::<Vec<_>>().join(" "),
            });
        }
        Ok(entries)
    }
}

/// Parses the stdout of `rabbitmqctl list_vhosts`: one vhost name per row.
pub fn parse_vhosts(stdout: &[u8]) -> Result<Vec<String>, ParseError> {
    let text = std::str::from_utf8(stdout).map_err(ParseError::NonUtf8)?;
    Ok(text
        .lines()
        .filter(|line| !is_decoration(line))
        .filter_map(|line| line.split_whitespace().next())
        .map(String::from)
        .collect())
}
