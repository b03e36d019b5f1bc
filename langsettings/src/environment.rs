// SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::HashSet;

// man page for `exec` (Linux system call)
pub const KEY_OS__PATH: &str = "PATH";

// https://www.gnu.org/software/gettext/manual/html_node/Locale-Environment-Variables.html
pub const KEY_LOCALE__LANGUAGE: &str = "LANGUAGE";
pub const KEY_LOCALE__LC_ALL: &str = "LC_ALL";
pub const KEY_LOCALE__LANG: &str = "LANG";

// https://gcc.gnu.org/onlinedocs/cpp/Environment-Variables.html
pub const KEY_GCC__C_INCLUDE_1: &str = "CPATH";
pub const KEY_GCC__C_INCLUDE_2: &str = "C_INCLUDE_PATH";
pub const KEY_GCC__C_INCLUDE_3: &str = "CPLUS_INCLUDE_PATH";
pub const KEY_GCC__OBJC_INCLUDE: &str = "OBJC_INCLUDE_PATH";
pub const KEY_GCC__EXEC_PREFIX: &str = "GCC_EXEC_PREFIX";

// https://www.gnu.org/software/make/manual/html_node/Implicit-Variables.html
pub const KEY_MAKE__C_COMPILER: &str = "CC";
pub const KEY_MAKE__CXX_COMPILER: &str = "CXX";
pub const KEY_MAKE__C_PREPROCESSOR: &str = "CPP";
pub const KEY_MAKE__C_FLAGS: &str = "CFLAGS";
pub const KEY_MAKE__CXX_FLAGS: &str = "CXXFLAGS";
pub const KEY_MAKE__C_PREPROCESSOR_FLAGS: &str = "CPPFLAGS";

/// Values forced into the environment of a compiler probe, so the
/// compiler prints its section markers in English.
pub const PROBE_ENVIRONMENT: [(&str, &str); 2] = [(KEY_LOCALE__LANGUAGE, "en"), (KEY_LOCALE__LC_ALL, "C.UTF-8")];

static LOCALE_KEYS: std::sync::LazyLock<HashSet<&'static str>> = std::sync::LazyLock::new(|| {
    [KEY_LOCALE__LANGUAGE, KEY_LOCALE__LC_ALL, KEY_LOCALE__LANG].iter().cloned().collect()
});

static GCC_KEYS: std::sync::LazyLock<HashSet<&'static str>> = std::sync::LazyLock::new(|| {
    [KEY_GCC__C_INCLUDE_1, KEY_GCC__C_INCLUDE_2, KEY_GCC__C_INCLUDE_3, KEY_GCC__OBJC_INCLUDE, KEY_GCC__EXEC_PREFIX]
        .iter()
        .cloned()
        .collect()
});

static MAKE_KEYS: std::sync::LazyLock<HashSet<&'static str>> = std::sync::LazyLock::new(|| {
    [
        KEY_MAKE__C_COMPILER,
        KEY_MAKE__CXX_COMPILER,
        KEY_MAKE__C_PREPROCESSOR,
        KEY_MAKE__C_FLAGS,
        KEY_MAKE__CXX_FLAGS,
        KEY_MAKE__C_PREPROCESSOR_FLAGS,
    ]
    .iter()
    .cloned()
    .collect()
});

/// Variables which change what a compiler probe reports.
pub fn relevant_env(key: &str) -> bool {
    LOCALE_KEYS.contains(key)
        || GCC_KEYS.contains(key)
        || MAKE_KEYS.contains(key)
        // Windows PATH variable is case sensitive and not always capitalized
        || key.to_uppercase() == KEY_OS__PATH
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relevant_env() {
        for key in ["PATH", "Path", "CPATH", "CXX", "CPPFLAGS", "LC_ALL"] {
            assert!(relevant_env(key), "{key}");
        }
        for key in ["HOME", "USER", "PWD", "RUSTFLAGS"] {
            assert!(!relevant_env(key), "{key}");
        }
    }
}
