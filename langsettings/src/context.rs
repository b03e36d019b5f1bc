// SPDX-License-Identifier: GPL-3.0-or-later

use crate::environment;
use crate::environment::KEY_OS__PATH;
use anyhow::{Context as AnyhowContext, Result};
use std::collections::{BTreeMap, HashMap};
use std::env;
use std::fmt;
use std::path::PathBuf;

/// Application context containing runtime environment information.
///
/// Captured once at startup, so configuration and wiring can be done without
/// further I/O. The environment captured here is the one the compiler probes
/// run with.
#[derive(Debug, Clone)]
pub struct Context {
    /// Path to the current executable
    pub current_executable: PathBuf,
    /// Current working directory when the application was invoked
    pub current_directory: PathBuf,
    /// All environment variables at startup
    pub environment: HashMap<String, String>,
}

impl Context {
    /// Capture the current application context.
    pub fn capture() -> Result<Self> {
        let current_executable = env::current_exe().with_context(|| "Failed to get current executable path")?;

        let current_directory = env::current_dir().with_context(|| "Failed to get current working directory")?;

        let environment = env::vars().collect::<HashMap<String, String>>();

        Ok(Context { current_executable, current_directory, environment })
    }

    /// Returns the PATH environment variable key and value.
    ///
    /// This is relevant for Windows where the PATH is not capitalized and the lookup
    /// should be case insensitive.
    pub fn path(&self) -> Option<(String, String)> {
        self.environment
            .iter()
            .find(|(key, _)| key.to_uppercase() == KEY_OS__PATH)
            .map(|(key, value)| (key.clone(), value.clone()))
    }

    /// The environment in a stable order, with the PATH under its canonical key.
    pub fn environment_snapshot(&self) -> BTreeMap<String, String> {
        let mut snapshot: BTreeMap<String, String> =
            self.environment.iter().map(|(key, value)| (key.clone(), value.clone())).collect();
        if let Some((key, value)) = self.path()
            && key != KEY_OS__PATH
        {
            snapshot.remove(&key);
            snapshot.insert(KEY_OS__PATH.to_string(), value);
        }
        snapshot
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Application Context:")?;
        writeln!(f, "Current Executable: {}", self.current_executable.display())?;
        writeln!(f, "Current Directory: {}", self.current_directory.display())?;
        writeln!(f, "Total Environment Variables: {} entries", self.environment.len())?;

        writeln!(f, "Relevant Environment Variables:")?;
        let relevant: BTreeMap<_, _> =
            self.environment.iter().filter(|(key, _)| environment::relevant_env(key)).collect();
        for (key, value) in relevant {
            writeln!(f, "  {key}={value}")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(variables: &[(&str, &str)]) -> Context {
        Context {
            current_executable: PathBuf::from("/usr/bin/langsettings"),
            current_directory: PathBuf::from("/home/user/src"),
            environment: variables.iter().map(|(key, value)| (key.to_string(), value.to_string())).collect(),
        }
    }

    #[test]
    fn test_context_capture() {
        let context = Context::capture().unwrap();

        assert!(context.current_directory.is_absolute());
        assert!(context.current_executable.is_absolute());
    }

    #[test]
    fn test_display_includes_relevant_env_vars() {
        let context = context(&[
            ("PATH", "/usr/bin:/bin"),
            ("CC", "gcc"),
            ("IRRELEVANT_VAR", "value"),
            ("CPATH", "/opt/include"),
        ]);

        let display_output = format!("{context}");

        assert!(display_output.contains("Application Context:"));
        assert!(display_output.contains("PATH=/usr/bin:/bin"));
        assert!(display_output.contains("CC=gcc"));
        assert!(display_output.contains("CPATH=/opt/include"));
        assert!(!display_output.contains("IRRELEVANT_VAR=value"));
        assert!(display_output.contains("Total Environment Variables: 4 entries"));
    }

    #[test]
    fn test_snapshot_renames_path() {
        let context = context(&[("Path", "C:\\bin"), ("HOME", "/home/user")]);

        let snapshot = context.environment_snapshot();

        assert_eq!(snapshot.get("PATH"), Some(&"C:\\bin".to_string()));
        assert_eq!(snapshot.get("Path"), None);
        assert_eq!(snapshot.len(), 2);
    }
}
