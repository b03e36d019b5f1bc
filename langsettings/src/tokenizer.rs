// SPDX-License-Identifier: GPL-3.0-or-later

//! Splits a build command line into tokens.
//!
//! The rules follow what a POSIX shell would do for the common cases seen
//! in build logs, but never fail: unbalanced quotes run to the end of the
//! line. Supported forms:
//!
//! - `'single quoted'`: everything literal until the next `'`.
//! - `"double quoted"`: `\"` inside produces a literal `"`.
//! - `\"escape quoted\"` outside of quotes: the quote characters are kept
//!   and whitespace between them does not split the token.
//!
//! A backslash that does not precede a double quote is kept as it is.

/// Removes one trailing line terminator (`\n` or `\r\n`).
pub fn strip_eol(line: &str) -> &str {
    line.strip_suffix('\n').map(|rest| rest.strip_suffix('\r').unwrap_or(rest)).unwrap_or(line)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Outside,
    Single,
    Double,
    Escaped,
}

/// Splits the line into tokens.
pub fn tokenize(line: &str) -> Vec<String> {
    let line = strip_eol(line);

    let mut tokens = Vec::new();
    let mut current = String::new();
    // A token was started even if it is still empty (e.g. `''`).
    let mut started = false;
    let mut state = State::Outside;

    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match state {
            State::Outside => match c {
                c if c.is_whitespace() => {
                    if started {
                        tokens.push(std::mem::take(&mut current));
                        started = false;
                    }
                }
                '\'' => {
                    state = State::Single;
                    started = true;
                }
                '"' => {
                    state = State::Double;
                    started = true;
                }
                '\\' if chars.peek() == Some(&'"') => {
                    chars.next();
                    current.push('"');
                    state = State::Escaped;
                    started = true;
                }
                c => {
                    current.push(c);
                    started = true;
                }
            },
            State::Single => match c {
                '\'' => state = State::Outside,
                c => current.push(c),
            },
            State::Double => match c {
                '"' => state = State::Outside,
                '\\' if chars.peek() == Some(&'"') => {
                    chars.next();
                    current.push('"');
                }
                c => current.push(c),
            },
            State::Escaped => match c {
                '\\' if chars.peek() == Some(&'"') => {
                    chars.next();
                    current.push('"');
                    state = State::Outside;
                }
                c => current.push(c),
            },
        }
    }
    if started {
        tokens.push(current);
    }
    tokens
}
