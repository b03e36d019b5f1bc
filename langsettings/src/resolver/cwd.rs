// SPDX-License-Identifier: GPL-3.0-or-later

use std::path::{Path, PathBuf};

/// Follows the working directory of a build by its output.
///
/// Make reports directory changes with lines like
/// `make[1]: Entering directory '/path'` and the matching
/// `Leaving directory` line. The tracker keeps them as a stack.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkingDirectoryTracker {
    stack: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum DirectoryChange {
    Entering(PathBuf),
    Leaving(PathBuf),
}

impl WorkingDirectoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, directory: impl Into<PathBuf>) {
        self.stack.push(directory.into());
    }

    pub fn pop(&mut self) -> Option<PathBuf> {
        self.stack.pop()
    }

    /// The current working directory of the build, if known.
    pub fn top(&self) -> Option<&Path> {
        self.stack.last().map(PathBuf::as_path)
    }

    /// Updates the stack from a build output line.
    ///
    /// Returns true if the line was a directory change message.
    pub fn process_line(&mut self, line: &str) -> bool {
        match parse_directory_change(line) {
            Some(DirectoryChange::Entering(directory)) => {
                log::debug!("Entering directory: {}", directory.display());
                self.stack.push(directory);
                true
            }
            Some(DirectoryChange::Leaving(directory)) => {
                log::debug!("Leaving directory: {}", directory.display());
                // Pop up to the matching entry, or just the top when there is none.
                if let Some(position) = self.stack.iter().rposition(|entry| *entry == directory) {
                    self.stack.truncate(position);
                } else {
                    self.stack.pop();
                }
                true
            }
            None => false,
        }
    }
}

fn parse_directory_change(line: &str) -> Option<DirectoryChange> {
    let line = crate::tokenizer::strip_eol(line).trim_end();
    let (prefix, rest) = line.split_once(": ")?;
    if !is_make_program(prefix) {
        return None;
    }
    if let Some(quoted) = rest.strip_prefix("Entering directory ") {
        return unquote(quoted).map(|path| DirectoryChange::Entering(PathBuf::from(path)));
    }
    if let Some(quoted) = rest.strip_prefix("Leaving directory ") {
        return unquote(quoted).map(|path| DirectoryChange::Leaving(PathBuf::from(path)));
    }
    None
}

/// Matches `make`, `gmake`, `/usr/bin/make` and `make[2]` style prefixes.
fn is_make_program(prefix: &str) -> bool {
    let program = match prefix.split_once('[') {
        Some((program, level)) if level.ends_with(']') => program,
        Some(_) => return false,
        None => prefix,
    };
    let name = program.rsplit('/').next().unwrap_or(program);
    name == "make" || name == "gmake" || name == "mingw32-make"
}

fn unquote(quoted: &str) -> Option<&str> {
    let mut chars = quoted.chars();
    let open = chars.next()?;
    let close = quoted.chars().last()?;
    let matching = matches!((open, close), ('\'', '\'') | ('`', '\'') | ('"', '"'));
    if quoted.len() < 2 || !matching {
        return None;
    }
    Some(&quoted[open.len_utf8()..quoted.len() - close.len_utf8()])
}
