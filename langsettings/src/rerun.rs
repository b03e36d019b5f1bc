// SPDX-License-Identifier: GPL-3.0-or-later

//! Decides whether a builtin-specs detector has to run again.
//!
//! A run is described by its [`RunSignature`]: the command template with
//! the toolchain it expands to, the compiler binaries with their
//! modification times, and the environment variables the compiler or the
//! command reads. A provider that ran with an equal signature is not run
//! again unless forced.

use crate::environment::{KEY_OS__PATH, relevant_env};
use crate::provider::RunContext;
use crate::provider::builtins::command::uses_variable;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// A compiler binary as found on the disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerStamp {
    pub language: String,
    pub compiler: String,
    /// The binary after following every symbolic link, if it was found.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Modification time of the binary in milliseconds since the epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSignature {
    pub command: String,
    #[serde(default)]
    pub flags: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub compilers: Vec<CompilerStamp>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

impl RunSignature {
    /// Captures the signature of running `command` for the languages.
    pub fn capture(command: &str, languages: &[String], context: &RunContext) -> Self {
        let search_path = context.environment.get(KEY_OS__PATH).cloned();
        let cwd = context.builder_cwd.clone().unwrap_or_else(|| PathBuf::from("."));

        let mut flags = BTreeMap::new();
        let mut compilers = vec![];
        for language in languages {
            let Some(toolchain) = context.toolchain_for(language) else {
                continue;
            };
            flags.insert(language.clone(), toolchain.flags.clone());
            let path = locate(&toolchain.compiler, search_path.as_deref(), &cwd);
            let modified = path.as_deref().and_then(modified_millis);
            compilers.push(CompilerStamp {
                language: language.clone(),
                compiler: toolchain.compiler.clone(),
                path,
                modified,
            });
        }

        let environment = context
            .environment
            .iter()
            .filter(|(key, _)| relevant_env(key) || uses_variable(command, key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Self { command: command.to_string(), flags, compilers, environment }
    }
}

/// Finds the compiler binary and resolves it to its final target.
fn locate(compiler: &str, search_path: Option<&str>, cwd: &Path) -> Option<PathBuf> {
    let found = match which::which_in(compiler, search_path, cwd) {
        Ok(found) => found,
        Err(error) => {
            log::debug!("Compiler '{compiler}' not found: {error}");
            return None;
        }
    };
    found.canonicalize().ok().or(Some(found))
}

fn modified_millis(path: &Path) -> Option<u64> {
    let modified = std::fs::metadata(path).and_then(|metadata| metadata.modified()).ok()?;
    let duration = modified.duration_since(UNIX_EPOCH).ok()?;
    u64::try_from(duration.as_millis()).ok()
}

/// Remembers the signature of the last successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RerunPolicy {
    last: Option<RunSignature>,
}

impl RerunPolicy {
    pub fn new(last: Option<RunSignature>) -> Self {
        Self { last }
    }

    pub fn should_run(&self, signature: &RunSignature, force: bool) -> bool {
        force || self.last.as_ref() != Some(signature)
    }

    pub fn record(&mut self, signature: RunSignature) {
        self.last = Some(signature);
    }

    pub fn last(&self) -> Option<&RunSignature> {
        self.last.as_ref()
    }

    pub fn forget(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Toolchain;
    use crate::testing::{ScriptedLauncher, TestWorkspace, run_context};
    use std::fs;
    use std::sync::Arc;
    use std::time::{Duration, SystemTime};

    fn set_modified(path: &Path, time: SystemTime) {
        let file = fs::OpenOptions::new().write(true).open(path).unwrap();
        file.set_modified(time).unwrap();
    }

    #[cfg(unix)]
    fn executable(path: &Path) {
        use std::os::unix::fs::PermissionsExt;
        fs::write(path, "#!/bin/sh\n").unwrap();
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[cfg(unix)]
    fn context_with_compiler(workspace: &TestWorkspace) -> RunContext {
        let bin = workspace.folder("bin");
        executable(&bin.join("gcc-12"));
        std::os::unix::fs::symlink(bin.join("gcc-12"), bin.join("gcc")).unwrap();

        let mut context = run_context(workspace, Arc::new(ScriptedLauncher::new(vec![])));
        context.environment.insert("PATH".into(), bin.to_string_lossy().into_owned());
        context.toolchain = vec![Toolchain { language: "c".into(), compiler: "gcc".into(), flags: vec![] }];
        context
    }

    #[cfg(unix)]
    #[test]
    fn test_compiler_followed_through_symlink() {
        let workspace = TestWorkspace::new();
        let context = context_with_compiler(&workspace);

        let signature = RunSignature::capture("${COMMAND} -E", &["c".to_string()], &context);

        assert_eq!(signature.compilers.len(), 1);
        assert_eq!(signature.compilers[0].path, Some(workspace.path("bin/gcc-12")));
        assert!(signature.compilers[0].modified.is_some());
    }

    #[cfg(unix)]
    #[test]
    fn test_touching_the_compiler_triggers_a_run() {
        let workspace = TestWorkspace::new();
        let context = context_with_compiler(&workspace);
        let languages = ["c".to_string()];
        let target = workspace.path("bin/gcc-12");
        set_modified(&target, SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000));

        let mut sut = RerunPolicy::default();
        let first = RunSignature::capture("${COMMAND} -E", &languages, &context);
        assert!(sut.should_run(&first, false));
        sut.record(first);

        let unchanged = RunSignature::capture("${COMMAND} -E", &languages, &context);
        assert!(!sut.should_run(&unchanged, false));
        assert!(sut.should_run(&unchanged, true));

        set_modified(&target, SystemTime::UNIX_EPOCH + Duration::from_secs(2_000_000));
        let touched = RunSignature::capture("${COMMAND} -E", &languages, &context);
        assert!(sut.should_run(&touched, false));
    }

    #[test]
    fn test_command_and_environment_changes() {
        let workspace = TestWorkspace::new();
        let context = run_context(&workspace, Arc::new(ScriptedLauncher::new(vec![])));
        let languages = ["c".to_string(), "c++".to_string()];
        let mut sut = RerunPolicy::default();
        sut.record(RunSignature::capture("${COMMAND} -E -dM", &languages, &context));

        let command = RunSignature::capture("${COMMAND} -E -dD", &languages, &context);
        assert!(sut.should_run(&command, false));

        let mut changed = context.clone();
        changed.environment.insert("CPATH".into(), "/opt/include".into());
        let environment = RunSignature::capture("${COMMAND} -E -dM", &languages, &changed);
        assert!(sut.should_run(&environment, false));

        let mut changed = context.clone();
        changed.toolchain[1].flags.push("-m32".into());
        let flags = RunSignature::capture("${COMMAND} -E -dM", &languages, &changed);
        assert!(sut.should_run(&flags, false));
    }

    #[test]
    fn test_unrelated_environment_is_ignored() {
        let workspace = TestWorkspace::new();
        let context = run_context(&workspace, Arc::new(ScriptedLauncher::new(vec![])));
        let languages = ["c".to_string()];
        let command = "${COMMAND} --sysroot=${SYSROOT} -E -dM";
        let mut sut = RerunPolicy::default();
        sut.record(RunSignature::capture(command, &languages, &context));

        let mut shell = context.clone();
        shell.environment.insert("PWD".into(), "/somewhere/else".into());
        shell.environment.insert("SHLVL".into(), "3".into());
        let signature = RunSignature::capture(command, &languages, &shell);
        assert!(!sut.should_run(&signature, false));
        assert!(!signature.environment.contains_key("PWD"));

        let mut sysroot = context.clone();
        sysroot.environment.insert("SYSROOT".into(), "/opt/sysroot".into());
        let signature = RunSignature::capture(command, &languages, &sysroot);
        assert!(sut.should_run(&signature, false));
    }

    #[test]
    fn test_missing_compiler_has_no_stamp() {
        let workspace = TestWorkspace::new();
        let mut context = run_context(&workspace, Arc::new(ScriptedLauncher::new(vec![])));
        context.environment.insert("PATH".into(), workspace.path("empty").to_string_lossy().into_owned());

        let signature = RunSignature::capture("${COMMAND}", &["c".to_string()], &context);

        assert_eq!(signature.compilers[0].path, None);
        assert_eq!(signature.compilers[0].modified, None);
    }
}
