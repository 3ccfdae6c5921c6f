// SPDX-License-Identifier: GPL-3.0-or-later

//! The GCC-family compiler recogniser.
//!
//! The recogniser accepts a command when the program's basename looks like
//! a GCC-family compiler (or is listed in the configuration), parses the
//! command line into typed flags with the declarative tables below, and
//! projects the recognised invocation to one compilation database entry
//! per source file.
//!
//! The flag tables follow the GCC option summary:
//! https://gcc.gnu.org/onlinedocs/gcc/Option-Summary.html

use super::super::{CompilerFlag, FlagKind, RecognitionError, Tool};
use super::flags::{FlagDefinition, FlagTable};
use super::source::looks_like_a_source_file;
use crate::environment::{
    KEY_GCC_C_INCLUDE_1, KEY_GCC_C_INCLUDE_2, KEY_GCC_C_INCLUDE_3, KEY_GCC_OBJC_INCLUDE,
};
use crate::intercept::report;
use crate::output::Entry;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use FlagKind::*;

static KIND_OF_OUTPUT: &[FlagDefinition] = &[
    FlagDefinition::by_name("-x", 1, KindOfOutput),
    FlagDefinition::by_name("-c", 0, KindOfOutputNoLinking),
    FlagDefinition::by_name("-S", 0, KindOfOutputNoLinking),
    FlagDefinition::by_name("-E", 0, KindOfOutputNoLinking),
    FlagDefinition::by_name("-o", 1, KindOfOutputOutput),
    FlagDefinition::by_name("-dumpbase", 1, KindOfOutput),
    FlagDefinition::by_name("-dumpbase-ext", 1, KindOfOutput),
    FlagDefinition::by_name("-dumpdir", 1, KindOfOutput),
    FlagDefinition::by_name("-v", 0, KindOfOutput),
    FlagDefinition::by_name("-###", 0, KindOfOutput),
    FlagDefinition::by_name("--help", 0, KindOfOutputInfo),
    FlagDefinition::by_name("--target-help", 0, KindOfOutputInfo),
    FlagDefinition::by_pattern("--help=(.+)", 0, KindOfOutputInfo),
    FlagDefinition::by_name("--version", 0, KindOfOutputInfo),
    FlagDefinition::by_name("-pass-exit-codes", 0, KindOfOutput),
    FlagDefinition::by_name("-pipe", 0, KindOfOutput),
    FlagDefinition::by_pattern("-specs=(.+)", 0, KindOfOutput),
    FlagDefinition::by_name("-wrapper", 1, KindOfOutput),
    FlagDefinition::by_pattern("-ffile-prefix-map=(.+)", 0, KindOfOutput),
    FlagDefinition::by_name("-fplugin", 1, KindOfOutput),
    FlagDefinition::by_pattern("-fplugin=(.+)", 0, KindOfOutput),
    FlagDefinition::by_pattern("-fplugin-arg-(.+)", 0, KindOfOutput),
    FlagDefinition::by_pattern("-fdump-ada-spec(.*)", 0, KindOfOutput),
    FlagDefinition::by_pattern("-fada-spec-parent=(.+)", 0, KindOfOutput),
    // recheck against upstream GCC before fixing
    FlagDefinition::by_pattern("-fdump-go-sepc=(.+)", 0, KindOfOutput),
    FlagDefinition::by_pattern("@(.+)", 0, KindOfOutput),
];

static PREPROCESSOR: &[FlagDefinition] = &[
    FlagDefinition::by_name("-A", 1, Preprocessor),
    FlagDefinition::by_pattern("-A(.+)", 0, Preprocessor),
    FlagDefinition::by_name("-D", 1, Preprocessor),
    FlagDefinition::by_pattern("-D(.+)", 0, Preprocessor),
    FlagDefinition::by_name("-U", 1, Preprocessor),
    FlagDefinition::by_pattern("-U(.+)", 0, Preprocessor),
    FlagDefinition::by_name("-include", 1, Preprocessor),
    FlagDefinition::by_name("-imacros", 1, Preprocessor),
    FlagDefinition::by_name("-undef", 0, Preprocessor),
    FlagDefinition::by_name("-pthread", 0, Preprocessor),
    FlagDefinition::by_pattern("-M(|M|G|P|D|MD)", 0, PreprocessorMake),
    FlagDefinition::by_pattern("-M(F|T|Q)", 1, PreprocessorMake),
    FlagDefinition::by_pattern(
        "-(C|CC|P|traditional|traditional-cpp|trigraphs|remap|H)",
        0,
        Preprocessor,
    ),
    FlagDefinition::by_pattern("-d[MDNIU]", 0, Preprocessor),
    FlagDefinition::by_name("-Xpreprocessor", 1, Preprocessor),
    FlagDefinition::by_pattern("-Wp,(.+)", 0, Preprocessor),
];

static DIRECTORY_SEARCH: &[FlagDefinition] = &[
    FlagDefinition::by_name("-I", 1, DirectorySearch),
    FlagDefinition::by_pattern("-I(.+)", 0, DirectorySearch),
    FlagDefinition::by_name("-iplugindir", 1, DirectorySearch),
    FlagDefinition::by_pattern("-iplugindir=(.+)", 0, DirectorySearch),
    FlagDefinition::by_pattern("-i(.*)", 1, DirectorySearch),
    FlagDefinition::by_pattern(
        r"-no(stdinc|stdinc\+\+|-canonical-prefixes|-sysroot-suffix)",
        0,
        DirectorySearch,
    ),
    FlagDefinition::by_name("-L", 1, DirectorySearchLinker),
    FlagDefinition::by_pattern("-L(.+)", 0, DirectorySearchLinker),
    FlagDefinition::by_name("-B", 1, DirectorySearch),
    FlagDefinition::by_pattern("-B(.+)", 0, DirectorySearch),
    FlagDefinition::by_name("--sysroot", 1, DirectorySearch),
    FlagDefinition::by_pattern("--sysroot=(.+)", 0, DirectorySearch),
];

static LINKER: &[FlagDefinition] = &[
    FlagDefinition::by_pattern("-flinker-output=(.+)", 0, Linker),
    FlagDefinition::by_pattern("-fuse-ld=(.+)", 0, Linker),
    FlagDefinition::by_name("-l", 1, Linker),
    FlagDefinition::by_pattern("-l(.+)", 0, Linker),
    FlagDefinition::by_pattern("-no(startfiles|defaultlibs|libc|stdlib)", 0, Linker),
    FlagDefinition::by_name("-e", 1, Linker),
    FlagDefinition::by_pattern("-entry=(.+)", 0, Linker),
    FlagDefinition::by_pattern("-(pie|no-pie|static-pie)", 0, Linker),
    FlagDefinition::by_pattern("-(r|rdynamic|s|symbolic)", 0, Linker),
    FlagDefinition::by_pattern("-(static|shared)(|-libgcc)", 0, Linker),
    FlagDefinition::by_pattern(r"-static-lib(asan|tsan|lsan|ubsan|stdc\+\+)", 0, Linker),
    FlagDefinition::by_name("-T", 1, Linker),
    FlagDefinition::by_name("-Xlinker", 1, Linker),
    FlagDefinition::by_pattern("-Wl,(.+)", 0, Linker),
    FlagDefinition::by_name("-u", 1, Linker),
    FlagDefinition::by_name("-z", 1, Linker),
];

static EVERYTHING_ELSE: &[FlagDefinition] = &[
    FlagDefinition::by_name("-Xassembler", 1, Other),
    FlagDefinition::by_pattern("-Wa,(.*)", 0, Other),
    FlagDefinition::by_name("-ansi", 0, Other),
    FlagDefinition::by_name("-aux-info", 1, Other),
    FlagDefinition::by_pattern("-std=(.*)", 0, Other),
    FlagDefinition::by_pattern("-[Og](.*)", 0, Other),
    FlagDefinition::by_pattern("-[fmpW](.+)", 0, Other),
    FlagDefinition::by_pattern("-(no|tno|save|d|Wa,)(.+)", 0, Other),
    FlagDefinition::by_pattern("-[EQXY](.+)", 0, Other),
    FlagDefinition::by_pattern("--(.+)", 0, Other),
    FlagDefinition::by_pattern(".+", 0, LinkerObjectFile),
];

static TABLES: LazyLock<Vec<FlagTable>> = LazyLock::new(|| {
    vec![
        FlagTable::new(KIND_OF_OUTPUT),
        FlagTable::new(PREPROCESSOR),
        FlagTable::new(DIRECTORY_SEARCH),
        FlagTable::new(LINKER),
    ]
});

static EVERYTHING_ELSE_TABLE: LazyLock<FlagTable> =
    LazyLock::new(|| FlagTable::new(EVERYTHING_ELSE));

static PROGRAM_PATTERNS: LazyLock<Regex> = LazyLock::new(|| {
    let patterns = [
        r"^(cc|c\+\+|cxx|CC)$",
        r"^([^-]*-)*[mg]cc(-?\d+(\.\d+){0,2})?$",
        r"^([^-]*-)*[mg]\+\+(-?\d+(\.\d+){0,2})?$",
        r"^([^-]*-)*g?fortran(-?\d+(\.\d+){0,2})?$",
    ];
    Regex::new(&format!("(?:{})", patterns.join("|"))).expect("valid program patterns")
});

/// The GCC-family tool recogniser.
pub struct Gcc {
    /// Compiler executables declared in the configuration, accepted in
    /// addition to the built-in name patterns.
    paths: Vec<PathBuf>,
}

impl Gcc {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }

    fn recognize_program(&self, program: &Path) -> bool {
        if self.paths.iter().any(|path| path == program) {
            return true;
        }
        program
            .file_name()
            .map(|basename| PROGRAM_PATTERNS.is_match(&basename.to_string_lossy()))
            .unwrap_or(false)
    }
}

impl Tool for Gcc {
    fn recognize(&self, command: &report::Command) -> Result<Vec<Entry>, RecognitionError> {
        if !self.recognize_program(&command.program) {
            return Err(RecognitionError::UnknownProgram(
                command.program.to_string_lossy().to_string(),
            ));
        }
        log::debug!("Recognized as a GCC compiler execution.");

        let mut flags = parse_arguments(&command.arguments)?;
        flags.extend(flags_from_environment(&command.environment));

        if !runs_compilation_pass(&flags) {
            log::debug!("Compiler call does not run compilation pass.");
            return Ok(vec![]);
        }
        let sources = source_files(&flags);
        if sources.is_empty() {
            log::debug!("Source files not found for compilation.");
            return Ok(vec![]);
        }
        let output = output_file(&flags);

        let entries = sources
            .into_iter()
            .map(|source| {
                let mut arguments = filter_arguments(&flags, &source);
                arguments.insert(0, command.program.to_string_lossy().to_string());
                let entry = Entry::from_arguments(
                    source,
                    arguments,
                    command.working_dir.clone(),
                    output.clone(),
                );
                make_absolute(entry)
            })
            .collect();
        Ok(entries)
    }
}

/// Parses the command line (without the program) into typed flags.
///
/// At each position the parser groups are consulted in a fixed order; the
/// first definition that matches consumes the flag and its operands. A
/// token no definition matches, or a flag whose required operand is
/// missing, fails the whole parse.
fn parse_arguments(arguments: &[String]) -> Result<Vec<CompilerFlag>, RecognitionError> {
    let mut flags = Vec::new();
    let tail = arguments.get(1..).unwrap_or_default();

    let mut index = 0;
    while index < tail.len() {
        let front = &tail[index];
        match match_front(front) {
            Some((count, kind)) if index + count < tail.len() => {
                let consumed = tail[index..=index + count].to_vec();
                flags.push(CompilerFlag {
                    arguments: consumed,
                    kind,
                });
                index += count + 1;
            }
            _ => {
                let remainder = tail[index..].join(", ");
                return Err(RecognitionError::UnknownArgument(remainder));
            }
        }
    }
    Ok(flags)
}

fn match_front(front: &str) -> Option<(usize, FlagKind)> {
    for table in TABLES.iter() {
        if let Some(matched) = table.matches(front) {
            return Some(matched);
        }
    }
    if looks_like_a_source_file(front) {
        return Some((0, Source));
    }
    EVERYTHING_ELSE_TABLE.matches(front)
}

/// Synthesises directory search flags from the preprocessor environment
/// variables. Entries are split on `:`; empty entries mean the current
/// directory.
///
/// https://gcc.gnu.org/onlinedocs/cpp/Environment-Variables.html
fn flags_from_environment(environment: &HashMap<String, String>) -> Vec<CompilerFlag> {
    let mut flags = Vec::new();
    for key in [KEY_GCC_C_INCLUDE_1, KEY_GCC_C_INCLUDE_2, KEY_GCC_C_INCLUDE_3] {
        if let Some(value) = environment.get(key) {
            for path in value.split(':') {
                let directory = if path.is_empty() { "." } else { path };
                flags.push(CompilerFlag {
                    arguments: vec!["-I".to_string(), directory.to_string()],
                    kind: DirectorySearch,
                });
            }
        }
    }
    if let Some(value) = environment.get(KEY_GCC_OBJC_INCLUDE) {
        for path in value.split(':') {
            let directory = if path.is_empty() { "." } else { path };
            flags.push(CompilerFlag {
                arguments: vec!["-isystem".to_string(), directory.to_string()],
                kind: DirectorySearch,
            });
        }
    }
    flags
}

/// An invocation compiles iff it has flags, is not a help or version
/// query, and is not a plain `-M`/`-MM` dependency generation call.
fn runs_compilation_pass(flags: &[CompilerFlag]) -> bool {
    const NO_COMPILATION_FLAGS: &[&str] = &["-M", "-MM"];

    // no flag is a no compilation
    if flags.is_empty() {
        return false;
    }
    // help or version query is a no compilation
    if flags.iter().any(|flag| flag.kind == KindOfOutputInfo) {
        return false;
    }
    // plain dependency generation also does not count as compilation
    // (it would cause duplicate entries, which are hard to detect)
    if flags.iter().any(|flag| {
        flag.kind == PreprocessorMake
            && flag
                .arguments
                .first()
                .map(|front| NO_COMPILATION_FLAGS.contains(&front.as_str()))
                .unwrap_or(false)
    }) {
        return false;
    }
    true
}

fn source_files(flags: &[CompilerFlag]) -> Vec<PathBuf> {
    flags
        .iter()
        .filter(|flag| flag.kind == Source)
        .filter_map(|flag| flag.arguments.first())
        .map(PathBuf::from)
        .collect()
}

/// The entry output is the last `-o` on the command line.
fn output_file(flags: &[CompilerFlag]) -> Option<PathBuf> {
    flags
        .iter()
        .filter(|flag| flag.kind == KindOfOutputOutput)
        .filter_map(|flag| flag.arguments.last())
        .map(PathBuf::from)
        .last()
}

/// Assembles the per-source argument list.
///
/// Linker flags, make-dependency flags and linker directory searches are
/// dropped; source flags other than the selected one are dropped too. The
/// `-c` flag is prepended unless the invocation already stops before
/// linking.
fn filter_arguments(flags: &[CompilerFlag], source: &Path) -> Vec<String> {
    let no_linking = flags
        .iter()
        .any(|flag| flag.kind == KindOfOutputNoLinking);

    let mut arguments = Vec::new();
    if !no_linking {
        arguments.push("-c".to_string());
    }
    for flag in flags {
        let dropped = matches!(flag.kind, Linker | PreprocessorMake | DirectorySearchLinker);
        let other_source =
            flag.kind == Source && flag.arguments.first().map(Path::new) != Some(source);
        if !dropped && !other_source {
            arguments.extend(flag.arguments.iter().cloned());
        }
    }
    arguments
}

/// Resolves the entry's file and output against its directory.
///
/// The argument list keeps the original relative tokens.
fn make_absolute(mut entry: Entry) -> Entry {
    if entry.file.is_relative() {
        entry.file = entry.directory.join(&entry.file);
    }
    if let Some(output) = entry.output.take() {
        entry.output = Some(if output.is_relative() {
            entry.directory.join(output)
        } else {
            output
        });
    }
    entry
}
