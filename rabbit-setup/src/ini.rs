// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Keyed edits to INI-style consumer config files.
//!
//! The files touched here are shared with other writers, so edits are keyed
//! (section, key) replacements that leave every other line untouched, rather
//! than whole-file generation.

use camino::{Utf8Path, Utf8PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum IniError {
    #[error("failed to read {path}")]
    Read {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("failed to write {path}")]
    Write {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
}

/// In-memory view of an INI-style config file.
#[derive(Debug)]
pub struct IniFile {
    path: Utf8PathBuf,
    lines: Vec<String>,
}

impl IniFile {
    /// Loads `path`, treating a missing file as empty.
    pub fn load(path: &Utf8Path) -> Result<Self, IniError> {
        let path = path.to_owned();
        let lines = match std::fs::read_to_string(&path) {
            Ok(contents) => contents.lines().map(String::from).collect(),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Vec::new()
            }
            Err(err) => return Err(IniError::Read { path, err }),
        };
        Ok(Self { path, lines })
    }

    /// Sets `key = value` within `section`, replacing an existing assignment
    /// for `key` or appending one to the section; the section is created at
    /// the end of the file if missing.
    pub fn set(&mut self, section: &str, key: &str, value: &str) {
        let header = format!("[{section}]");
        let assignment = format!("{key} = {value}");

        let Some(start) =
            self.lines.iter().position(|line| line.trim() == header)
        else {
            if self.lines.last().is_some_and(|line| !line.trim().is_empty()) {
                self.lines.push(String::new());
            }
            self.lines.push(header);
            self.lines.push(assignment);
            return;
        };

        // The section body runs until the next header or end of file.
        let end = self.lines[start + 1..]
            .iter()
            .position(|line| line.trim_start().starts_with('['))
            .map(|offset| start + 1 + offset)
            .unwrap_or(self.lines.len());

        for line in &mut self.lines[start + 1..end] {
            let Some((candidate, _)) = line.split_once('=') else {
                continue;
            };
            if candidate.trim() == key {
                *line = assignment;
                return;
            }
        }
        self.lines.insert(end, assignment);
    }

    pub fn store(&self) -> Result<(), IniError> {
        let mut contents = self.lines.join("\n");
        if !contents.is_empty() {
            contents.push('\n');
        }
        std::fs::write(&self.path, contents).map_err(|err| IniError::Write {
            path: self.path.clone(),
            err,
        })
    }
}
