// SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::HashSet;
use std::sync::LazyLock;

/// Checks whether a command line argument looks like a compiled source file.
///
/// The extension is compared case-insensitively, so `file.CPP` and
/// `file.C` are candidates as well.
pub fn looks_like_a_source_file(argument: &str) -> bool {
    // not a command line flag
    if argument.starts_with('-') {
        return false;
    }
    match argument.rsplit_once('.') {
        Some((stem, extension)) if !stem.is_empty() && !extension.contains(['/', '\\']) => {
            SOURCE_EXTENSIONS.contains(extension.to_lowercase().as_str())
        }
        _ => false,
    }
}

#[rustfmt::skip]
static SOURCE_EXTENSIONS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    HashSet::from([
        // C
        "c",
        // C++
        "cc", "c++", "cxx", "cpp", "cp",
        // CUDA
        "cu",
        // ObjectiveC
        "m", "mm",
        // Assembly with preprocessor
        "s", "sx",
    ])
});
