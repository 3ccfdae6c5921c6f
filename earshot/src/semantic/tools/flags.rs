// SPDX-License-Identifier: GPL-3.0-or-later

//! The declarative flag table the compiler recognisers are built from.
//!
//! A flag definition matches either by exact name or by an anchored regex
//! pattern, and states how many separate operand tokens the flag consumes.
//! A table is a fixed list of definitions consulted in order; the first
//! definition that matches the front token wins.

use super::super::FlagKind;
use regex::Regex;

/// How a definition matches the front token.
#[derive(Debug, Clone, Copy)]
pub(super) enum Matcher {
    Name(&'static str),
    Pattern(&'static str),
}

/// One row of a flag table.
#[derive(Debug, Clone, Copy)]
pub(super) struct FlagDefinition {
    matcher: Matcher,
    count: usize,
    kind: FlagKind,
}

impl FlagDefinition {
    pub(super) const fn by_name(name: &'static str, count: usize, kind: FlagKind) -> Self {
        Self {
            matcher: Matcher::Name(name),
            count,
            kind,
        }
    }

    pub(super) const fn by_pattern(pattern: &'static str, count: usize, kind: FlagKind) -> Self {
        Self {
            matcher: Matcher::Pattern(pattern),
            count,
            kind,
        }
    }
}

/// A compiled flag table.
///
/// The regex patterns are compiled once, when the table is built (the
/// tables live in `LazyLock` statics).
pub(super) struct FlagTable {
    rows: Vec<(Option<Regex>, FlagDefinition)>,
}

impl FlagTable {
    pub(super) fn new(definitions: &'static [FlagDefinition]) -> Self {
        let rows = definitions
            .iter()
            .map(|definition| {
                let regex = match definition.matcher {
                    Matcher::Name(_) => None,
                    Matcher::Pattern(pattern) => Some(
                        Regex::new(&format!("^(?:{pattern})$"))
                            .unwrap_or_else(|_| panic!("Invalid flag pattern: {pattern}")),
                    ),
                };
                (regex, *definition)
            })
            .collect();
        Self { rows }
    }

    /// Matches the front token; returns how many operand tokens the flag
    /// consumes beyond itself, and its classification.
    pub(super) fn matches(&self, front: &str) -> Option<(usize, FlagKind)> {
        for (regex, definition) in &self.rows {
            let matched = match (&definition.matcher, regex) {
                (Matcher::Name(name), _) => front == *name,
                (Matcher::Pattern(_), Some(regex)) => regex.is_match(front),
                (Matcher::Pattern(_), None) => false,
            };
            if matched {
                return Some((definition.count, definition.kind));
            }
        }
        None
    }
}
