// SPDX-License-Identifier: GPL-3.0-or-later

//! This module provides support for reading and writing JSON compilation
//! database files.
//!
//! A compilation database is a set of records which describe the compilation
//! of the source files in a given project. It describes the compiler
//! invocation command to compile a source module to an object file.
//!
//! The format is defined by the LLVM project
//! [documentation](https://clang.llvm.org/docs/JSONCompilationDatabase.html):
//! a JSON array of objects carrying either an `arguments` array or a
//! `command` shell string. The loader accepts both shapes; the writer emits
//! the shape the format configuration asks for.

pub mod filter;

use crate::config;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::{fs, io};
use thiserror::Error;

/// Represents an entry of the compilation database.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Entry {
    /// The main translation unit source processed by this compilation step.
    pub file: PathBuf,
    /// The compile command argv, including the compiler as the first
    /// element. Not escaped, ready to pass to `execvp()`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<String>,
    /// The compile command as a single shell-escaped string. Either
    /// `arguments` or `command` is required; `arguments` is preferred.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub command: String,
    /// The working directory of the compilation. Relative paths in the
    /// other fields are resolved against this directory.
    pub directory: PathBuf,
    /// The name of the output created by this compilation step. Optional.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
}

impl Entry {
    /// Create an entry from an argument list (the preferred shape).
    pub fn from_arguments(
        file: impl Into<PathBuf>,
        arguments: Vec<String>,
        directory: impl Into<PathBuf>,
        output: Option<impl Into<PathBuf>>,
    ) -> Self {
        Entry {
            file: file.into(),
            arguments,
            command: String::default(),
            directory: directory.into(),
            output: output.map(|o| o.into()),
        }
    }

    /// Semantic validation of the entry.
    pub fn validate(&self) -> Result<(), EntryError> {
        if self.file.to_string_lossy().is_empty() {
            return Err(EntryError::EmptyFileName);
        }
        if self.directory.to_string_lossy().is_empty() {
            return Err(EntryError::EmptyDirectory);
        }
        if self.command.is_empty() && self.arguments.is_empty() {
            return Err(EntryError::CommandOrArgumentsAreMissing);
        }
        if !self.command.is_empty() && !self.arguments.is_empty() {
            return Err(EntryError::CommandOrArgumentsArePresent);
        }
        if !self.command.is_empty() {
            shell_words::split(&self.command)?;
        }
        Ok(())
    }

    /// Convert the entry to the form where only the `command` field is set.
    pub fn to_command(self) -> Result<Self, EntryError> {
        self.validate()?;

        let command = if self.command.is_empty() {
            shell_words::join(&self.arguments)
        } else {
            self.command
        };

        Ok(Entry {
            file: self.file,
            arguments: Vec::default(),
            command,
            directory: self.directory,
            output: self.output,
        })
    }

    /// Convert the entry to the form where only the `arguments` field is set.
    pub fn to_arguments(self) -> Result<Self, EntryError> {
        self.validate()?;

        let arguments = if self.arguments.is_empty() {
            shell_words::split(&self.command)?
        } else {
            self.arguments
        };

        Ok(Entry {
            file: self.file,
            arguments,
            command: String::default(),
            directory: self.directory,
            output: self.output,
        })
    }

    /// Constructor method for testing purposes.
    #[cfg(test)]
    pub fn from_arguments_str(
        file: &str,
        arguments: Vec<&str>,
        directory: &str,
        output: Option<&str>,
    ) -> Entry {
        Entry::from_arguments(
            PathBuf::from(file),
            arguments.into_iter().map(String::from).collect(),
            PathBuf::from(directory),
            output.map(PathBuf::from),
        )
    }
}

/// Represents the possible errors that can occur when validating an entry.
#[derive(Debug, Error)]
pub enum EntryError {
    #[error("Entry has an empty file field")]
    EmptyFileName,
    #[error("Entry has an empty directory field")]
    EmptyDirectory,
    #[error("Both command and arguments fields are empty")]
    CommandOrArgumentsAreMissing,
    #[error("Both command and arguments fields are present")]
    CommandOrArgumentsArePresent,
    #[error("Entry has an invalid command field: {0}")]
    InvalidCommand(#[from] shell_words::ParseError),
}

/// Errors of reading or writing the database file.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Generic IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Format syntax error: {0}")]
    Syntax(#[from] serde_json::Error),
    #[error("Format semantic error: {0}")]
    Semantic(#[from] EntryError),
}

/// Reads a compilation database, accepting both entry shapes.
///
/// Every entry is validated and normalised to the `arguments` form, so the
/// rest of the pipeline compares entries in one canonical shape.
pub fn read(path: &Path) -> Result<Vec<Entry>, DatabaseError> {
    let file = fs::File::open(path)?;
    let entries: Vec<Entry> = serde_json::from_reader(io::BufReader::new(file))?;
    entries
        .into_iter()
        .map(|entry| entry.to_arguments().map_err(DatabaseError::Semantic))
        .collect()
}

/// Writes a compilation database as a pretty-printed JSON array.
pub fn write(writer: impl io::Write, entries: &[Entry]) -> Result<(), DatabaseError> {
    for entry in entries {
        entry.validate()?;
    }
    serde_json::to_writer_pretty(writer, entries)?;
    Ok(())
}

/// Writes the compilation database file.
///
/// # Features
/// - Appends to a previously written database when asked to, preserving
///   the insertion order and dropping exact duplicates.
/// - Formats the entries according to the configuration (argument array
///   or shell command, optional output field).
/// - Replaces the target file atomically (temporary sibling + rename).
pub struct DatabaseWriter {
    path: PathBuf,
    append: bool,
    format: config::Format,
}

impl DatabaseWriter {
    pub fn new(path: &Path, append: bool, format: config::Format) -> Self {
        Self {
            path: path.to_path_buf(),
            append,
            format,
        }
    }

    pub fn write(&self, entries: impl IntoIterator<Item = Entry>) -> anyhow::Result<()> {
        let prior = if self.append {
            if self.path.exists() {
                read(&self.path)
                    .with_context(|| format!("Failed to read file: {:?}", self.path))?
            } else {
                log::warn!("The output file does not exist, the append option is ignored.");
                Vec::new()
            }
        } else {
            Vec::new()
        };

        // Duplicates are dropped on the canonical argument form, before
        // any formatting is applied.
        let mut seen = HashSet::new();
        let mut merged = Vec::new();
        for entry in prior.into_iter().chain(entries) {
            let entry = entry.to_arguments()?;
            if seen.insert(entry.clone()) {
                merged.push(entry);
            }
        }

        let formatted = merged
            .into_iter()
            .map(|entry| self.format_entry(entry))
            .collect::<Result<Vec<_>, _>>()?;

        let directory = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut staging = tempfile::NamedTempFile::new_in(directory)
            .with_context(|| format!("Failed to create temporary file in {directory:?}"))?;
        write(&mut staging, &formatted)?;
        staging
            .persist(&self.path)
            .map_err(|error| error.error)
            .with_context(|| format!("Failed to rename file to {:?}", self.path))?;

        Ok(())
    }

    fn format_entry(&self, entry: Entry) -> Result<Entry, EntryError> {
        let mut entry = if self.format.command_as_array {
            entry.to_arguments()?
        } else {
            entry.to_command()?
        };
        if self.format.drop_output_field {
            entry.output = None;
        }
        Ok(entry)
    }
}
