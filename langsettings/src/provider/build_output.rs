// SPDX-License-Identifier: GPL-3.0-or-later

//! Collects settings from the compiler invocations a build prints.

use super::ProviderError;
use super::state::{Configuration, Detector, ProviderState};
use crate::entry::{self, Entry};
use crate::options::compiler::CompilerRecognizer;
use crate::options::{CommandLine, parse_command};
use crate::resolver::{BuildLocation, LinePaths, PathResolver, WorkingDirectoryTracker};
use crate::tokenizer::tokenize;
use crate::workspace::{MemberIndex, Resource, ResourceLookup};
use std::path::Path;

/// What a parser needs to know about the workspace while reading lines.
#[derive(Clone, Copy)]
pub struct ParseContext<'a> {
    pub lookup: &'a dyn ResourceLookup,
    pub project: Option<&'a Resource>,
    pub builder_cwd: Option<&'a Path>,
}

#[derive(Debug, Clone)]
pub struct BuildCommandParser {
    state: ProviderState,
    recognizer: CompilerRecognizer,
}

impl PartialEq for BuildCommandParser {
    fn eq(&self, other: &Self) -> bool {
        self.state == other.state
    }
}

impl BuildCommandParser {
    pub fn new(configuration: Configuration) -> Result<Self, ProviderError> {
        Self::from_state(ProviderState::new(configuration))
    }

    pub(crate) fn from_state(state: ProviderState) -> Result<Self, ProviderError> {
        let Detector::BuildOutput { compiler_pattern, version_pattern } = &state.configuration.detector else {
            return Err(ProviderError::WrongKind {
                id: state.configuration.id.clone(),
                expected: "build-output",
            });
        };
        let recognizer = CompilerRecognizer::new(compiler_pattern, version_pattern).map_err(|source| {
            ProviderError::CompilerPattern { id: state.configuration.id.clone(), source }
        })?;
        Ok(Self { state, recognizer })
    }

    pub fn state(&self) -> &ProviderState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ProviderState {
        &mut self.state
    }

    /// A never-run parser with the same configuration.
    pub fn shallow_copy(&self) -> Self {
        Self { state: self.state.shallow_copy(), recognizer: self.recognizer.clone() }
    }

    /// Runs the parser over a complete build log.
    ///
    /// Make's directory messages drive the working directory used to
    /// resolve relative names. Returns the number of lines that produced
    /// entries.
    pub fn parse_build_output<I>(&mut self, lines: I, context: ParseContext<'_>) -> usize
    where
        I: IntoIterator<Item = String>,
    {
        let members = MemberIndex::new(context.lookup);
        let context = ParseContext { lookup: &members, ..context };
        let mut tracker = WorkingDirectoryTracker::new();
        let mut recognized = 0;

        self.state.startup();
        for line in lines {
            if tracker.process_line(&line) {
                continue;
            }
            if self.process_line(&line, context, &tracker) {
                recognized += 1;
            }
        }
        self.state.shutdown();
        log::info!("{}: {recognized} compiler invocations recognized", self.state.configuration.id);
        recognized
    }

    /// Processes one line of build output.
    ///
    /// Returns true if the line was a compiler invocation whose entries
    /// were stored.
    pub fn process_line(
        &mut self,
        line: &str,
        context: ParseContext<'_>,
        tracker: &WorkingDirectoryTracker,
    ) -> bool {
        let tokens = tokenize(line);
        let location = BuildLocation { tracker_top: tracker.top(), builder_cwd: context.builder_cwd };
        self.process_tokens(&tokens, context, location, None)
    }

    /// Processes an already tokenized command.
    ///
    /// With `source` given, the command is attributed to that resource
    /// under the given name instead of looking for the source among the
    /// arguments.
    pub fn process_tokens(
        &mut self,
        tokens: &[String],
        context: ParseContext<'_>,
        location: BuildLocation<'_>,
        source: Option<(&Resource, &str)>,
    ) -> bool {
        let Some(command) = parse_command(tokens, &self.recognizer) else {
            return false;
        };

        let resolver = PathResolver::new(context.lookup, context.project);
        let (resource, parsed_name) = match source {
            Some((resource, name)) => (Some(resource.clone()), name.to_string()),
            None => find_source(&command, &resolver, location),
        };

        let language = determine_language(context.lookup, resource.as_ref(), &parsed_name);
        if !self.state.configuration.is_language_in_scope(language.as_deref()) {
            log::debug!("{}: language {language:?} not in scope", self.state.configuration.id);
            return false;
        }

        let entries = self.collect_entries(&command, &resolver, resource.as_ref(), &parsed_name, location);

        if resource.is_none() && self.state.configuration.resource_scope() != super::ResourceScope::Global {
            log::debug!("{}: no workspace resource for '{parsed_name}'", self.state.configuration.id);
            return false;
        }
        let key = self.state.key_resource(resource.as_ref());
        log::debug!("{}: {} entries for {key:?}", self.state.configuration.id, entries.len());
        self.state.set_entries(key, language, entries);
        true
    }

    fn collect_entries(
        &self,
        command: &CommandLine,
        resolver: &PathResolver<'_>,
        resource: Option<&Resource>,
        parsed_name: &str,
        location: BuildLocation<'_>,
    ) -> Vec<Entry> {
        let resolving = self.state.configuration.resolve_paths;
        let paths = if resolving {
            resolver.line_paths(resource, parsed_name, location)
        } else {
            LinePaths::default()
        };

        let entries = command
            .options
            .iter()
            .filter_map(|option| match option.path_kind() {
                Some((kind, flags)) if resolving => {
                    let (name, resolved) = resolver.resolve(kind, &option.argument, &paths);
                    Some(Entry::path(kind, name, flags | resolved))
                }
                Some((kind, flags)) => Some(Entry::path(kind, option.argument.as_str(), flags)),
                None => option.plain_entry(),
            })
            .collect();

        entry::group_by_kind(entry::dedup(entries))
    }
}

/// Picks the compiled source: the first candidate found in the workspace,
/// otherwise the first candidate by name only.
fn find_source(
    command: &CommandLine,
    resolver: &PathResolver<'_>,
    location: BuildLocation<'_>,
) -> (Option<Resource>, String) {
    command
        .source_candidates
        .iter()
        .find_map(|candidate| {
            resolver.find_resource(candidate, location).map(|resource| (Some(resource), candidate.clone()))
        })
        .or_else(|| command.source_candidates.first().map(|candidate| (None, candidate.clone())))
        .unwrap_or_default()
}

fn determine_language(lookup: &dyn ResourceLookup, resource: Option<&Resource>, parsed_name: &str) -> Option<String> {
    let file_name = match resource {
        Some(resource) => resource.location.file_name()?.to_string_lossy().into_owned(),
        None => parsed_name.rsplit(['/', '\\']).next()?.to_string(),
    };
    lookup.languages(&file_name).into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{Flags, Kind};
    use crate::provider::ResourceScope;
    use crate::testing::{CountingLookup, TestWorkspace, build_output_configuration};
    use crate::workspace::FsWorkspace;

    const WORKSPACE: Flags = Flags::from_bits(Flags::WORKSPACE_PATH.bits() | Flags::RESOLVED.bits());

    fn run_lines(workspace: &TestWorkspace, configuration: Configuration, lines: &[&str]) -> BuildCommandParser {
        let lookup = workspace.lookup();
        let project = workspace.project("Project");
        let context = ParseContext { lookup: &lookup, project: Some(&project), builder_cwd: None };

        let mut sut = BuildCommandParser::new(configuration).unwrap();
        sut.parse_build_output(lines.iter().map(|line| line.to_string()), context);
        sut
    }

    fn entries_of(workspace: &TestWorkspace, sut: &BuildCommandParser, relative: &str) -> Option<Vec<Entry>> {
        let lookup: FsWorkspace = workspace.lookup();
        let resource = lookup.find_member(&workspace.project("Project"), Path::new(relative))?;
        let language = lookup.languages(relative).into_iter().next();
        sut.state().entries(Some(&resource), language.as_deref())
    }

    fn include(name: impl Into<String>, flags: Flags) -> Entry {
        Entry::include_path(name, flags)
    }

    #[test]
    fn test_entries_grouped_by_kind() {
        let workspace = TestWorkspace::new().with_project("Project", &[]);
        workspace.file("Project/file.cpp");
        let configuration = Configuration { resolve_paths: false, ..build_output_configuration("gcc.build") };

        let sut = run_lines(
            &workspace,
            configuration,
            &[r#"gcc -I/path0 -DMACRO1=value -ldomain -I/path1 -DMACRO2="value with spaces" -L/usr/lib file.cpp"#],
        );

        assert_eq!(
            entries_of(&workspace, &sut, "file.cpp"),
            Some(vec![
                include("/path0", Flags::NONE),
                include("/path1", Flags::NONE),
                Entry::macro_defined("MACRO1", "value", Flags::NONE),
                Entry::macro_defined("MACRO2", "value with spaces", Flags::NONE),
                Entry::path(Kind::LibraryPath, "/usr/lib", Flags::NONE),
                Entry::path(Kind::LibraryFile, "libdomain.a", Flags::NONE),
            ])
        );
    }

    #[test]
    fn test_macro_variants() {
        let workspace = TestWorkspace::new().with_project("Project", &[]);
        workspace.file("Project/file.cpp");

        let sut = run_lines(
            &workspace,
            build_output_configuration("gcc.build"),
            &[concat!(
                "gcc -DMACRO0 -DMACRO1=value -DMACRO2=\"value with spaces\" -DMACRO3='value with spaces'",
                " -DMACRO4='\"quoted value\"' -D'MACRO5=\"quoted value\"' -DMACRO6=\\\"escape-quoted value\\\"",
                " -DMACRO7=\"'single-quoted value'\" -UMACRO8 file.cpp"
            )],
        );

        assert_eq!(
            entries_of(&workspace, &sut, "file.cpp"),
            Some(vec![
                Entry::macro_defined("MACRO0", "", Flags::NONE),
                Entry::macro_defined("MACRO1", "value", Flags::NONE),
                Entry::macro_defined("MACRO2", "value with spaces", Flags::NONE),
                Entry::macro_defined("MACRO3", "value with spaces", Flags::NONE),
                Entry::macro_defined("MACRO4", "\"quoted value\"", Flags::NONE),
                Entry::macro_defined("MACRO5", "\"quoted value\"", Flags::NONE),
                Entry::macro_defined("MACRO6", "\"escape-quoted value\"", Flags::NONE),
                Entry::macro_defined("MACRO7", "'single-quoted value'", Flags::NONE),
                Entry::macro_undefined("MACRO8", Flags::NONE),
            ])
        );
    }

    #[test]
    fn test_expand_relative_paths() {
        let workspace = TestWorkspace::new().with_project("Project", &[]);
        workspace.file("Project/file.cpp");
        workspace.folder("Project/Folder");

        let sut = run_lines(
            &workspace,
            build_output_configuration("gcc.build"),
            &["gcc -I. -I.. -IFolder -IMissing -IFolder file.cpp"],
        );

        assert_eq!(
            entries_of(&workspace, &sut, "file.cpp"),
            Some(vec![
                include("/Project", WORKSPACE),
                include(workspace.root.to_string_lossy(), Flags::NONE),
                include("/Project/Folder", WORKSPACE),
                include("/Project/Missing", WORKSPACE),
            ])
        );
    }

    #[test]
    fn test_do_not_expand_relative_paths() {
        let workspace = TestWorkspace::new().with_project("Project", &[]);
        workspace.file("Project/file.cpp");
        workspace.folder("Project/Folder");
        let configuration = Configuration { resolve_paths: false, ..build_output_configuration("gcc.build") };

        let sut = run_lines(&workspace, configuration, &["gcc -I. -I.. -IFolder file.cpp"]);

        assert_eq!(
            entries_of(&workspace, &sut, "file.cpp"),
            Some(vec![include(".", Flags::NONE), include("..", Flags::NONE), include("Folder", Flags::NONE)])
        );
    }

    #[test]
    fn test_include_and_macro_files() {
        let workspace = TestWorkspace::new().with_project("Project", &[]);
        workspace.file("Project/file.cpp");
        workspace.file("Project/config.h");

        let sut = run_lines(
            &workspace,
            build_output_configuration("gcc.build"),
            &["gcc -include config.h -imacros /missing/macros.h -F/Framework file.cpp"],
        );

        assert_eq!(
            entries_of(&workspace, &sut, "file.cpp"),
            Some(vec![
                include("/Framework", Flags::FRAMEWORK),
                Entry::path(Kind::IncludeFile, "/Project/config.h", WORKSPACE),
                Entry::path(Kind::MacroFile, "/missing/macros.h", Flags::NONE),
            ])
        );
    }

    #[test]
    fn test_working_directory_from_make() {
        let workspace = TestWorkspace::new().with_project("Project", &[]);
        workspace.file("Project/BuildDir/file.cpp");
        workspace.file("Project/file.cpp");
        let build_dir = workspace.path("Project/BuildDir");

        let sut = run_lines(
            &workspace,
            build_output_configuration("gcc.build"),
            &[
                &format!("make[1]: Entering directory '{}'", build_dir.display()),
                "gcc -IFolder -c file.cpp",
                &format!("make[1]: Leaving directory '{}'", build_dir.display()),
            ],
        );

        assert_eq!(
            entries_of(&workspace, &sut, "BuildDir/file.cpp"),
            Some(vec![include("/Project/BuildDir/Folder", WORKSPACE)])
        );
        assert_eq!(entries_of(&workspace, &sut, "file.cpp"), None);
    }

    #[test]
    fn test_guess_working_directory_from_unique_source() {
        let workspace = TestWorkspace::new().with_project("Project", &[]);
        workspace.file("Project/BuildDir/file.cpp");

        let sut = run_lines(&workspace, build_output_configuration("gcc.build"), &["gcc -IFolder file.cpp"]);

        assert_eq!(
            entries_of(&workspace, &sut, "BuildDir/file.cpp"),
            Some(vec![include("/Project/BuildDir/Folder", WORKSPACE)])
        );
    }

    #[test]
    fn test_project_trees_are_walked_once_per_log() {
        let workspace = TestWorkspace::new().with_project("Project", &[]).with_project("Other", &[]);
        workspace.file("Project/BuildDir/file.cpp");
        workspace.file("Project/BuildDir/util.cpp");
        workspace.folder("Other/api");
        let lookup = CountingLookup::new(workspace.lookup());
        let project = workspace.project("Project");
        let context = ParseContext { lookup: &lookup, project: Some(&project), builder_cwd: None };
        let lines = [
            "gcc -I/nowhere/include -I/elsewhere/inc -c file.cpp",
            "gcc -I/nowhere/other -c util.cpp",
            "gcc -I/nowhere/include -c file.cpp",
        ];

        let mut sut = BuildCommandParser::new(build_output_configuration("gcc.build")).unwrap();
        assert_eq!(sut.parse_build_output(lines.iter().map(|line| line.to_string()), context), 3);

        assert_eq!(
            entries_of(&workspace, &sut, "BuildDir/file.cpp"),
            Some(vec![include("/nowhere/include", Flags::NONE)])
        );
        assert_eq!(lookup.member_walks(), 2);
    }

    #[test]
    fn test_mapped_root_of_absolute_source() {
        let workspace = TestWorkspace::new().with_project("Project", &[]);
        workspace.file("Project/Local/BuildDir/file.cpp");
        workspace.folder("Project/Local/BuildDir/include");

        let sut = run_lines(
            &workspace,
            build_output_configuration("gcc.build"),
            &["gcc -I/BuildDir/include -I/BuildDir/missing /BuildDir/file.cpp"],
        );

        assert_eq!(
            entries_of(&workspace, &sut, "Local/BuildDir/file.cpp"),
            Some(vec![
                include("/Project/Local/BuildDir/include", WORKSPACE),
                include("/BuildDir/missing", Flags::NONE),
            ])
        );
    }

    #[test]
    fn test_folder_heuristics() {
        let workspace = TestWorkspace::new()
            .with_project("Project", &["Library"])
            .with_project("Library", &[])
            .with_project("Other", &[]);
        workspace.file("Project/file.cpp");
        workspace.folder("Project/Folder");
        workspace.folder("Library/LibraryFolder");
        workspace.folder("Other/deep/OtherFolder");
        workspace.folder("Project/a/Ambiguous");
        workspace.folder("Project/b/Ambiguous");

        let sut = run_lines(
            &workspace,
            build_output_configuration("gcc.build"),
            &["gcc -I/Folder -I/LibraryFolder -I/OtherFolder -I/Ambiguous -I/Missing/Folder2 file.cpp"],
        );

        assert_eq!(
            entries_of(&workspace, &sut, "file.cpp"),
            Some(vec![
                include("/Project/Folder", WORKSPACE),
                include("/Library/LibraryFolder", WORKSPACE),
                include("/Other/deep/OtherFolder", WORKSPACE),
                include("/Ambiguous", Flags::NONE),
                include("/Missing/Folder2", Flags::NONE),
            ])
        );
    }

    #[test]
    fn test_remote_mapping() {
        let workspace = TestWorkspace::new().with_project("Project", &[]);
        let local = workspace.folder("local");
        workspace.folder("local/Folder");
        workspace.file("Project/file.cpp");
        let workspace = workspace.with_mapping("/BeingMappedFrom", &local);

        let sut = run_lines(
            &workspace,
            build_output_configuration("gcc.build"),
            &["gcc -I/BeingMappedFrom/Folder -I/BeingMappedFrom/Missing file.cpp"],
        );

        assert_eq!(
            entries_of(&workspace, &sut, "file.cpp"),
            Some(vec![
                include(local.join("Folder").to_string_lossy(), Flags::NONE),
                include(local.join("Missing").to_string_lossy(), Flags::NONE),
            ])
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_parent_is_physical() {
        let workspace = TestWorkspace::new().with_project("Project", &[]);
        workspace.file("Project/file.cpp");
        let target = workspace.folder("Project/folder/sub");
        std::os::unix::fs::symlink(&target, workspace.path("Project/linked")).unwrap();

        let sut = run_lines(&workspace, build_output_configuration("gcc.build"), &["gcc -Ilinked/.. file.cpp"]);

        assert_eq!(entries_of(&workspace, &sut, "file.cpp"), Some(vec![include("/Project/folder", WORKSPACE)]));
    }

    #[test]
    fn test_file_with_spaces_and_line_endings() {
        let workspace = TestWorkspace::new().with_project("Project", &[]);
        workspace.file("Project/file with spaces.cpp");
        workspace.file("Project/other.cpp");

        let sut = run_lines(
            &workspace,
            build_output_configuration("gcc.build"),
            &["gcc -DA \"file with spaces.cpp\"\n", "g++ -DB other.cpp\r\n"],
        );

        assert_eq!(
            entries_of(&workspace, &sut, "file with spaces.cpp"),
            Some(vec![Entry::macro_defined("A", "", Flags::NONE)])
        );
        assert_eq!(entries_of(&workspace, &sut, "other.cpp"), Some(vec![Entry::macro_defined("B", "", Flags::NONE)]));
    }

    #[test]
    fn test_unknown_lines_and_missing_files() {
        let workspace = TestWorkspace::new().with_project("Project", &[]);
        workspace.file("Project/file.cpp");
        let lookup = workspace.lookup();
        let project = workspace.project("Project");
        let context = ParseContext { lookup: &lookup, project: Some(&project), builder_cwd: None };
        let tracker = WorkingDirectoryTracker::new();

        let mut sut = BuildCommandParser::new(build_output_configuration("gcc.build")).unwrap();
        sut.state_mut().startup();
        assert!(!sut.process_line("", context, &tracker));
        assert!(!sut.process_line("make all", context, &tracker));
        assert!(!sut.process_line("gcc -I/path missing.cpp", context, &tracker));
        assert!(sut.process_line("gcc -I/path file.cpp", context, &tracker));
        sut.state_mut().shutdown();

        assert_eq!(sut.state().storage().len(), 1);
    }

    #[test]
    fn test_language_scope() {
        let workspace = TestWorkspace::new().with_project("Project", &[]);
        workspace.file("Project/file.c");
        workspace.file("Project/file.cpp");
        let configuration = Configuration { languages: vec!["c++".into()], ..build_output_configuration("gcc.build") };

        let sut = run_lines(&workspace, configuration, &["gcc -DC file.c", "g++ -DCXX file.cpp"]);

        assert_eq!(entries_of(&workspace, &sut, "file.c"), None);
        assert_eq!(entries_of(&workspace, &sut, "file.cpp"), Some(vec![Entry::macro_defined("CXX", "", Flags::NONE)]));
    }

    #[test]
    fn test_folder_scope() {
        let workspace = TestWorkspace::new().with_project("Project", &[]);
        workspace.file("Project/Folder/file.cpp");
        let configuration =
            Configuration { scope: Some(ResourceScope::Folder), ..build_output_configuration("gcc.build") };

        let sut = run_lines(&workspace, configuration, &["gcc -DA Folder/file.cpp"]);

        let lookup = workspace.lookup();
        let folder = lookup.find_member(&workspace.project("Project"), Path::new("Folder")).unwrap();
        assert_eq!(
            sut.state().entries(Some(&folder), Some("c++")),
            Some(vec![Entry::macro_defined("A", "", Flags::NONE)])
        );
        assert_eq!(entries_of(&workspace, &sut, "Folder/file.cpp"), None);
    }

    #[test]
    fn test_shallow_copy_is_fresh() {
        let workspace = TestWorkspace::new().with_project("Project", &[]);
        workspace.file("Project/file.cpp");

        let sut = run_lines(&workspace, build_output_configuration("gcc.build"), &["gcc -DA file.cpp"]);
        let copy = sut.shallow_copy();

        assert!(!sut.state().is_empty());
        assert!(copy.state().is_empty());
        assert_eq!(copy.state().configuration, sut.state().configuration);
    }
}
