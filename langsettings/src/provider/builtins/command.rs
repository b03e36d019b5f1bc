// SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const VAR_COMMAND: &str = "COMMAND";
pub const VAR_INPUTS: &str = "INPUTS";
pub const VAR_EXT: &str = "EXT";
pub const VAR_FLAGS: &str = "FLAGS";

/// Resolves variables the detector itself does not know.
#[cfg_attr(test, mockall::automock)]
pub trait VariableResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Option<String>;
}

/// Resolves variables from an environment snapshot.
pub struct EnvironmentVariables<'a>(pub &'a BTreeMap<String, String>);

impl VariableResolver for EnvironmentVariables<'_> {
    fn resolve(&self, name: &str) -> Option<String> {
        self.0.get(name).cloned()
    }
}

/// Values of the variables specific to one language run.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandInputs<'a> {
    pub compiler: Option<&'a str>,
    pub flags: &'a [String],
    pub inputs: Option<&'a Path>,
    pub extension: Option<&'a str>,
}

/// Substitutes `${NAME}` references in the command template.
///
/// The substitution is a single pass: replaced text is not scanned again.
/// References that nothing resolves are kept as written.
pub fn resolve_command(template: &str, inputs: &CommandInputs<'_>, variables: &dyn VariableResolver) -> String {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            result.push_str(&rest[start..]);
            return result;
        };
        let name = &after[..end];
        let value = match name {
            VAR_COMMAND => inputs.compiler.map(str::to_string),
            VAR_INPUTS => inputs.inputs.map(|path| path.to_string_lossy().into_owned()),
            VAR_EXT => inputs.extension.map(str::to_string),
            VAR_FLAGS => Some(inputs.flags.join(" ")),
            other => variables.resolve(other),
        };
        match value {
            Some(value) => result.push_str(&value),
            None => result.push_str(&rest[start..start + 2 + end + 1]),
        }
        rest = &after[end + 1..];
    }
    result.push_str(rest);
    result
}

pub fn uses_variable(template: &str, name: &str) -> bool {
    template.contains(&format!("${{{name}}}"))
}

/// The empty input file the compiler is run on.
///
/// It is named `spec.<ext>` and lives in the state directory. A file
/// that was there before is left in place, a created one is removed
/// when this value is dropped.
#[derive(Debug)]
pub struct SpecFile {
    path: PathBuf,
    preserve: bool,
}

impl SpecFile {
    pub fn prepare(directory: &Path, extension: &str) -> io::Result<Self> {
        let path = directory.join(format!("spec.{extension}"));
        let preserve = path.exists();
        if !preserve {
            fs::create_dir_all(directory)?;
            fs::File::create(&path)?;
        }
        Ok(Self { path, preserve })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SpecFile {
    fn drop(&mut self) {
        if !self.preserve {
            if let Err(error) = fs::remove_file(&self.path) {
                log::debug!("Failed to remove {}: {error}", self.path.display());
            }
        }
    }
}
