// SPDX-License-Identifier: GPL-3.0-or-later

//! The value type for one discovered language setting.
//!
//! An [`Entry`] is immutable once created. Parsers create them, providers
//! store them, and the persistence layer writes them out unchanged.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;

/// The kind of setting an entry describes.
///
/// The declaration order is the order entries are grouped in when a
/// parser reports the settings of one command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Kind {
    IncludePath,
    IncludeFile,
    Macro,
    MacroFile,
    LibraryPath,
    LibraryFile,
}

impl Kind {
    /// Whether the name of this kind of entry is a filesystem location.
    pub fn is_path(&self) -> bool {
        !matches!(self, Kind::Macro)
    }

    /// Whether the entry points to a directory rather than a file.
    pub fn is_container(&self) -> bool {
        matches!(self, Kind::IncludePath | Kind::LibraryPath)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::IncludePath => "include-path",
            Kind::IncludeFile => "include-file",
            Kind::Macro => "macro",
            Kind::MacroFile => "macro-file",
            Kind::LibraryPath => "library-path",
            Kind::LibraryFile => "library-file",
        };
        write!(f, "{name}")
    }
}

/// Bit-set of entry attributes. Persisted as its numeric value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Flags(u32);

impl Flags {
    pub const NONE: Flags = Flags(0);
    pub const BUILTIN: Flags = Flags(1);
    pub const READONLY: Flags = Flags(2);
    /// Quote include (`#include "..."`) search path.
    pub const LOCAL: Flags = Flags(4);
    /// The name is a workspace path, not a filesystem path.
    pub const WORKSPACE_PATH: Flags = Flags(8);
    pub const RESOLVED: Flags = Flags(16);
    pub const UNDEFINED: Flags = Flags(32);
    pub const FRAMEWORK: Flags = Flags(64);

    pub const fn bits(&self) -> u32 {
        self.0
    }

    pub const fn from_bits(bits: u32) -> Self {
        Flags(bits)
    }

    pub const fn contains(&self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(Flags, &str); 7] = [
            (Flags::BUILTIN, "builtin"),
            (Flags::READONLY, "readonly"),
            (Flags::LOCAL, "local"),
            (Flags::WORKSPACE_PATH, "workspace"),
            (Flags::RESOLVED, "resolved"),
            (Flags::UNDEFINED, "undefined"),
            (Flags::FRAMEWORK, "framework"),
        ];
        let names: Vec<&str> =
            NAMES.iter().filter(|(flag, _)| self.contains(*flag)).map(|(_, name)| *name).collect();
        write!(f, "[{}]", names.join("|"))
    }
}

/// One discovered setting.
///
/// For macros `value` distinguishes "defined without value" (`Some("")`)
/// from "undefined" (`None`). Path kinds never carry a value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entry {
    pub kind: Kind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Flags::is_empty")]
    pub flags: Flags,
}

impl Entry {
    pub fn path(kind: Kind, name: impl Into<String>, flags: Flags) -> Self {
        Entry { kind, name: name.into(), value: None, flags }
    }

    pub fn include_path(name: impl Into<String>, flags: Flags) -> Self {
        Self::path(Kind::IncludePath, name, flags)
    }

    pub fn macro_defined(name: impl Into<String>, value: impl Into<String>, flags: Flags) -> Self {
        Entry { kind: Kind::Macro, name: name.into(), value: Some(value.into()), flags }
    }

    /// A macro reported without a value, as in `#define NAME` probe output.
    pub fn macro_without_value(name: impl Into<String>, flags: Flags) -> Self {
        Entry { kind: Kind::Macro, name: name.into(), value: None, flags }
    }

    pub fn macro_undefined(name: impl Into<String>, flags: Flags) -> Self {
        Entry { kind: Kind::Macro, name: name.into(), value: None, flags: flags | Flags::UNDEFINED }
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{} {}={} {}", self.kind, self.name, value, self.flags),
            None => write!(f, "{} {} {}", self.kind, self.name, self.flags),
        }
    }
}

/// Removes structural duplicates, keeping the first occurrence in place.
pub fn dedup(entries: Vec<Entry>) -> Vec<Entry> {
    let mut seen = std::collections::HashSet::with_capacity(entries.len());
    entries.into_iter().filter(|entry| seen.insert(entry.clone())).collect()
}

/// Groups entries by kind, keeping the relative order within each kind.
pub fn group_by_kind(mut entries: Vec<Entry>) -> Vec<Entry> {
    // `sort_by_key` is stable.
    entries.sort_by_key(|entry| entry.kind);
    entries
}
