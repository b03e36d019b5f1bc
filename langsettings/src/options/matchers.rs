// SPDX-License-Identifier: GPL-3.0-or-later

//! Flag pattern matching over a tokenized command line.
//!
//! A [`FlagPattern`] says HOW a flag consumes tokens, the rule's kind says
//! WHAT the flag means. Rules are tried in order, so tables are sorted by
//! flag length descending to let `-include` win over `-I`.

/// Describes the syntactic form of a flag and its argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagPattern {
    /// The flag alone, followed by the given number of separate arguments: "-o file".
    Exactly(&'static str, u32),

    /// The flag with one required argument, glued or separate: "-I/usr/include", "-I /usr/include".
    ExactlyWithGluedOrSep(&'static str),
}

impl FlagPattern {
    pub fn flag(&self) -> &'static str {
        match self {
            FlagPattern::Exactly(flag, _) => flag,
            FlagPattern::ExactlyWithGluedOrSep(flag) => flag,
        }
    }
}

/// A flag pattern paired with its meaning.
#[derive(Debug, Clone, Copy)]
pub struct FlagRule<K> {
    pub pattern: FlagPattern,
    pub kind: K,
}

impl<K> FlagRule<K> {
    pub const fn new(pattern: FlagPattern, kind: K) -> Self {
        Self { pattern, kind }
    }
}

/// Result of matching one rule at the head of the remaining tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagMatch<K> {
    pub kind: K,
    /// The tokens consumed, the flag token included.
    pub consumed_args: Vec<String>,
    /// The flag argument with the flag itself removed, if the pattern takes one.
    pub argument: Option<String>,
}

impl<K> FlagMatch<K> {
    pub fn consumed_args_count(&self) -> usize {
        self.consumed_args.len()
    }
}

/// Matches flags against a fixed, pre-sorted rule table.
pub struct FlagAnalyzer<K: 'static> {
    rules: &'static [FlagRule<K>],
}

impl<K: Copy + 'static> FlagAnalyzer<K> {
    /// The rules must be sorted by flag length in descending order.
    pub fn new(rules: &'static [FlagRule<K>]) -> Self {
        Self { rules }
    }

    /// Returns the first rule matching the head of `args`.
    pub fn match_flag(&self, args: &[String]) -> Option<FlagMatch<K>> {
        if args.is_empty() {
            return None;
        }
        self.rules.iter().find_map(|rule| Self::try_match_definition(rule, args))
    }

    fn try_match_definition(rule: &FlagRule<K>, args: &[String]) -> Option<FlagMatch<K>> {
        let current_arg = &args[0];
        let flag = rule.pattern.flag();

        match rule.pattern {
            FlagPattern::Exactly(_, required_count) => {
                let required_args = required_count as usize;
                if current_arg != flag || args.len() <= required_args {
                    return None;
                }
                let consumed: Vec<String> = args.iter().take(required_args + 1).cloned().collect();
                let argument = consumed.get(1).cloned();
                Some(FlagMatch { kind: rule.kind, consumed_args: consumed, argument })
            }
            FlagPattern::ExactlyWithGluedOrSep(_) => {
                if current_arg == flag && args.len() > 1 {
                    Some(FlagMatch {
                        kind: rule.kind,
                        consumed_args: vec![current_arg.clone(), args[1].clone()],
                        argument: Some(args[1].clone()),
                    })
                } else if current_arg.len() > flag.len() {
                    current_arg.strip_prefix(flag).map(|glued| FlagMatch {
                        kind: rule.kind,
                        consumed_args: vec![current_arg.clone()],
                        argument: Some(glued.to_string()),
                    })
                } else {
                    None
                }
            }
        }
    }
}

/// Sorts a rule table so that longer flags are tried first.
pub fn sort_rules<K>(rules: &mut [FlagRule<K>]) {
    rules.sort_by(|a, b| b.pattern.flag().len().cmp(&a.pattern.flag().len()));
}
