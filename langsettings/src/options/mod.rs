// SPDX-License-Identifier: GPL-3.0-or-later

//! Option parsers for compiler command lines.
//!
//! [`parse_command`] walks the tokens of one command line, recognizes the
//! compiler, and splits the rest into settings options and source file
//! candidates. It does not touch the filesystem: turning option arguments
//! into entries with resolved paths is the job of the build output parser.

pub mod compiler;
pub mod matchers;
pub mod source;

use crate::entry::{Entry, Flags, Kind};
use compiler::CompilerRecognizer;
use matchers::{FlagAnalyzer, FlagPattern, FlagRule, sort_rules};
use std::sync::LazyLock;

/// The meaning of a recognized flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    IncludePath,
    FrameworkPath,
    IncludeFile,
    Define,
    Undefine,
    MacroFile,
    LibraryPath,
    LibraryFile,
    /// A flag whose argument is consumed but not reported.
    Discard,
}

#[rustfmt::skip]
static OPTION_RULES: LazyLock<Vec<FlagRule<OptionKind>>> = LazyLock::new(|| {
    let mut rules = vec![
        FlagRule::new(FlagPattern::ExactlyWithGluedOrSep("-I"), OptionKind::IncludePath),
        FlagRule::new(FlagPattern::ExactlyWithGluedOrSep("-F"), OptionKind::FrameworkPath),
        FlagRule::new(FlagPattern::ExactlyWithGluedOrSep("-iframework"), OptionKind::FrameworkPath),
        FlagRule::new(FlagPattern::ExactlyWithGluedOrSep("-include"), OptionKind::IncludeFile),
        FlagRule::new(FlagPattern::ExactlyWithGluedOrSep("-D"), OptionKind::Define),
        FlagRule::new(FlagPattern::ExactlyWithGluedOrSep("-U"), OptionKind::Undefine),
        FlagRule::new(FlagPattern::ExactlyWithGluedOrSep("-macros"), OptionKind::MacroFile),
        FlagRule::new(FlagPattern::ExactlyWithGluedOrSep("-imacros"), OptionKind::MacroFile),
        FlagRule::new(FlagPattern::ExactlyWithGluedOrSep("-L"), OptionKind::LibraryPath),
        FlagRule::new(FlagPattern::ExactlyWithGluedOrSep("-l"), OptionKind::LibraryFile),
        // flags with a separate argument that must not be taken for a source file
        FlagRule::new(FlagPattern::Exactly("-o", 1), OptionKind::Discard),
        FlagRule::new(FlagPattern::Exactly("-x", 1), OptionKind::Discard),
        FlagRule::new(FlagPattern::Exactly("-MF", 1), OptionKind::Discard),
        FlagRule::new(FlagPattern::Exactly("-MT", 1), OptionKind::Discard),
        FlagRule::new(FlagPattern::Exactly("-MQ", 1), OptionKind::Discard),
        FlagRule::new(FlagPattern::Exactly("-arch", 1), OptionKind::Discard),
        FlagRule::new(FlagPattern::Exactly("-include-pch", 1), OptionKind::Discard),
        FlagRule::new(FlagPattern::ExactlyWithGluedOrSep("-isystem"), OptionKind::Discard),
        FlagRule::new(FlagPattern::ExactlyWithGluedOrSep("-iquote"), OptionKind::Discard),
        FlagRule::new(FlagPattern::ExactlyWithGluedOrSep("-idirafter"), OptionKind::Discard),
    ];
    sort_rules(&mut rules);
    rules
});

/// A settings option found on the command line, with its raw argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedOption {
    pub kind: OptionKind,
    pub argument: String,
}

impl ParsedOption {
    /// The entry kind and flags this option produces, for path-like options.
    pub fn path_kind(&self) -> Option<(Kind, Flags)> {
        match self.kind {
            OptionKind::IncludePath => Some((Kind::IncludePath, Flags::NONE)),
            OptionKind::FrameworkPath => Some((Kind::IncludePath, Flags::FRAMEWORK)),
            OptionKind::IncludeFile => Some((Kind::IncludeFile, Flags::NONE)),
            OptionKind::MacroFile => Some((Kind::MacroFile, Flags::NONE)),
            OptionKind::LibraryPath => Some((Kind::LibraryPath, Flags::NONE)),
            _ => None,
        }
    }

    /// The entry of an option that does not name a filesystem location.
    pub fn plain_entry(&self) -> Option<Entry> {
        match self.kind {
            OptionKind::Define => Some(match self.argument.split_once('=') {
                Some((name, value)) => Entry::macro_defined(name, value, Flags::NONE),
                None => Entry::macro_defined(self.argument.as_str(), "", Flags::NONE),
            }),
            OptionKind::Undefine => Some(Entry::macro_undefined(self.argument.as_str(), Flags::NONE)),
            OptionKind::LibraryFile => {
                Some(Entry::path(Kind::LibraryFile, format!("lib{}.a", self.argument), Flags::NONE))
            }
            _ => None,
        }
    }
}

/// The settings-relevant content of one compiler invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub compiler: String,
    pub options: Vec<ParsedOption>,
    /// Arguments that look like source files, in command line order.
    pub source_candidates: Vec<String>,
}

/// Parses the tokens of a command line.
///
/// Returns `None` when no compiler is recognized.
pub fn parse_command(tokens: &[String], recognizer: &CompilerRecognizer) -> Option<CommandLine> {
    let position = recognizer.find(tokens)?;
    let compiler = tokens[position].clone();

    let analyzer = FlagAnalyzer::new(&OPTION_RULES);
    let mut options = Vec::new();
    let mut source_candidates = Vec::new();

    let mut remaining = &tokens[position + 1..];
    while let Some(current) = remaining.first() {
        if let Some(matched) = analyzer.match_flag(remaining) {
            if let (kind, Some(argument)) = (matched.kind, matched.argument) {
                if kind != OptionKind::Discard && !argument.is_empty() {
                    options.push(ParsedOption { kind, argument });
                }
            }
            remaining = &remaining[matched.consumed_args.len()..];
            continue;
        }
        if source::looks_like_a_source_file(current) {
            source_candidates.push(current.clone());
        }
        remaining = &remaining[1..];
    }

    Some(CommandLine { compiler, options, source_candidates })
}
