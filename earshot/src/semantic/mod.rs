// SPDX-License-Identifier: GPL-3.0-or-later

//! Semantic analysis of the intercepted executions.
//!
//! The module turns the commands of the execution report into compilation
//! database entries. A command is handed to a chain of tool recognisers;
//! the first one that recognises the program parses the command line into
//! typed compiler flags and projects them to zero or more entries, one per
//! source file.

pub mod tools;

use crate::intercept::report;
use crate::output::Entry;
use thiserror::Error;

/// A classified segment of the compiler command line.
///
/// One flag covers the tokens that belong together: the flag itself plus
/// its required operands. Consumers dispatch on the kind.
#[derive(Debug, Clone, PartialEq)]
pub struct CompilerFlag {
    pub arguments: Vec<String>,
    pub kind: FlagKind,
}

/// The closed set of compiler flag classifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagKind {
    KindOfOutput,
    KindOfOutputNoLinking,
    KindOfOutputInfo,
    KindOfOutputOutput,
    Preprocessor,
    PreprocessorMake,
    Linker,
    LinkerObjectFile,
    DirectorySearch,
    DirectorySearchLinker,
    Source,
    Other,
}

/// Why a command produced no compilation database entries.
#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("Not recognized program name: {0}")]
    UnknownProgram(String),
    #[error("Failed to recognize: {0}")]
    UnknownArgument(String),
}

/// Responsible for recognising the semantic meaning of an executed command.
///
/// Implementers hold a program match pattern and a parse routine. A
/// recognised invocation yields its compilation database entries (possibly
/// none, e.g. for a dependency-only preprocessor call); an error means the
/// command is not this tool's, or its command line could not be parsed.
pub trait Tool: Send {
    fn recognize(&self, command: &report::Command) -> Result<Vec<Entry>, RecognitionError>;
}
