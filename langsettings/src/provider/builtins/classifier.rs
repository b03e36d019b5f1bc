// SPDX-License-Identifier: GPL-3.0-or-later

//! Classifies the lines a compiler prints when asked for its defaults.
//!
//! GCC and Clang print the include search lists between marker lines on
//! the error stream, and the predefined macros as `#define` lines on the
//! output stream. Each stream gets its own classifier.

use crate::entry::{Entry, Flags};

const QUOTE_INCLUDES_MARKER: &str = "#include \"...\" search starts here:";
const ANGLE_INCLUDES_MARKER: &str = "#include <...> search starts here:";
const FRAMEWORK_MARKER: &str = "Framework search starts here:";
const END_OF_SEARCH_LIST: &str = "End of search list.";
const END_OF_FRAMEWORK_LIST: &str = "End of framework search list.";
const FRAMEWORK_ANNOTATION: &str = "(framework directory)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    BeforeIncludes,
    QuoteIncludes,
    AngleIncludes,
    FrameworkIncludes,
    AfterIncludes,
}

/// A line that carries a setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    /// An include path as printed, before any resolution.
    IncludePath { path: String, flags: Flags },
    Macro(Entry),
}

#[derive(Debug)]
pub struct OutputClassifier {
    section: Section,
}

impl Default for OutputClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputClassifier {
    pub fn new() -> Self {
        Self { section: Section::BeforeIncludes }
    }

    pub fn classify(&mut self, line: &str) -> Option<Classified> {
        let trimmed = line.trim();
        if let Some(section) = marker_section(trimmed) {
            self.section = section;
            return None;
        }

        match self.section {
            Section::QuoteIncludes | Section::AngleIncludes | Section::FrameworkIncludes => {
                if trimmed.is_empty() || trimmed.starts_with("#undef") {
                    return None;
                }
                Some(self.include_path(trimmed))
            }
            Section::BeforeIncludes | Section::AfterIncludes => parse_define(line).map(Classified::Macro),
        }
    }

    fn include_path(&self, line: &str) -> Classified {
        let (path, annotated) = match line.strip_suffix(FRAMEWORK_ANNOTATION) {
            Some(path) => (path.trim_end(), true),
            None => (line, false),
        };
        let flags = match self.section {
            Section::QuoteIncludes => Flags::LOCAL,
            Section::FrameworkIncludes => Flags::FRAMEWORK,
            _ => Flags::NONE,
        };
        let flags = if annotated { flags | Flags::FRAMEWORK } else { flags };
        Classified::IncludePath { path: path.to_string(), flags }
    }
}

fn marker_section(line: &str) -> Option<Section> {
    match line {
        QUOTE_INCLUDES_MARKER => Some(Section::QuoteIncludes),
        ANGLE_INCLUDES_MARKER => Some(Section::AngleIncludes),
        FRAMEWORK_MARKER => Some(Section::FrameworkIncludes),
        END_OF_SEARCH_LIST | END_OF_FRAMEWORK_LIST => Some(Section::AfterIncludes),
        _ => None,
    }
}

/// Parses `#define NAME`, `#define NAME VALUE` and `#define NAME(P1, P2) VALUE`.
fn parse_define(line: &str) -> Option<Entry> {
    let rest = line.trim_start().strip_prefix("#define")?;
    if !rest.starts_with([' ', '\t']) {
        return None;
    }
    let rest = rest.trim_start_matches([' ', '\t']);

    let name_end = rest.find([' ', '\t', '(']).unwrap_or(rest.len());
    let (name, rest) = if rest[name_end..].starts_with('(') {
        let close = rest[name_end..].find(')').map(|position| name_end + position + 1)?;
        rest.split_at(close)
    } else {
        rest.split_at(name_end)
    };
    if name.is_empty() {
        return None;
    }

    let flags = Flags::BUILTIN | Flags::READONLY;
    let value = rest.trim_matches([' ', '\t', '\r', '\n']);
    if value.is_empty() {
        Some(Entry::macro_without_value(name, flags))
    } else {
        Some(Entry::macro_defined(name, value, flags))
    }
}
