// SPDX-License-Identifier: GPL-3.0-or-later

//! Recognizes the compiler token of a build command line.
//!
//! Only the file name of the token is matched, so absolute and relative
//! paths work the same way. The name may carry a cross-compilation prefix
//! (`arm-none-eabi-gcc`), a version suffix (`gcc-4.2`) and a `.exe` suffix.

use regex_lite::Regex;

/// Default pattern for the compiler names.
pub const DEFAULT_COMPILER_PATTERN: &str = r"gcc|[gc]\+\+|cc|clang(?:\+\+)?";
/// Default pattern for the version suffix of a compiler name.
pub const DEFAULT_VERSION_PATTERN: &str = r"-?\d+(?:\.\d+)*";

#[derive(Debug, Clone)]
pub struct CompilerRecognizer {
    pattern: Regex,
}

impl CompilerRecognizer {
    /// Builds a recognizer from a compiler name pattern and a version pattern.
    pub fn new(compiler_pattern: &str, version_pattern: &str) -> Result<Self, regex_lite::Error> {
        let pattern = Regex::new(&format!(
            r"^(?:[^/\\]*-)?(?:{compiler_pattern})(?:{version_pattern})?(?:\.exe)?$"
        ))?;
        Ok(Self { pattern })
    }

    /// Checks whether the token names a compiler.
    ///
    /// ```
    /// use langsettings::options::compiler::{CompilerRecognizer, DEFAULT_COMPILER_PATTERN, DEFAULT_VERSION_PATTERN};
    ///
    /// let recognizer = CompilerRecognizer::new(DEFAULT_COMPILER_PATTERN, DEFAULT_VERSION_PATTERN).unwrap();
    ///
    /// assert!(recognizer.recognize("gcc"));
    /// assert!(recognizer.recognize("/usr/bin/x86_64-linux-gnu-g++-12"));
    /// assert!(!recognizer.recognize("make"));
    /// ```
    pub fn recognize(&self, token: &str) -> bool {
        let file_name = token.rsplit(['/', '\\']).next().unwrap_or(token);
        self.pattern.is_match(file_name)
    }

    /// Finds the compiler token index.
    ///
    /// The compiler is the first token, or the first recognized token
    /// before any flag. This accepts wrappers like `ccache gcc`.
    pub fn find(&self, tokens: &[String]) -> Option<usize> {
        tokens
            .iter()
            .take_while(|token| !token.starts_with('-'))
            .position(|token| self.recognize(token))
    }
}
