// SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::HashSet;

/// Classifies a command line token as a source file by its extension.
pub(super) fn looks_like_a_source_file(argument: &str) -> bool {
    if let Some((_, extension)) = argument.rsplit_once('.') {
        return SOURCE_EXTENSIONS.contains(extension);
    }
    false
}

#[rustfmt::skip]
static SOURCE_EXTENSIONS: std::sync::LazyLock<HashSet<&'static str>> = std::sync::LazyLock::new(|| {
    HashSet::from([
        // header files
        "h", "hh", "H", "hp", "hxx", "hpp", "HPP", "h++", "tcc",
        // C
        "c", "C",
        // C++
        "cc", "CC", "c++", "C++", "cxx", "cpp", "cp",
        // ObjectiveC
        "m", "mi", "mm", "M", "mii",
        // Preprocessed
        "i", "ii",
        // Assembly
        "s", "S", "sx", "asm",
        // Fortran
        "f", "for", "ftn",
        "F", "FOR", "fpp", "FPP", "FTN",
        "f90", "f95", "f03", "f08",
        "F90", "F95", "F03", "F08",
        // go
        "go",
        // brig
        "brig",
        // D
        "d", "di", "dd",
        // Ada
        "ads", "abd",
    ])
});

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_source_files() {
        assert!(looks_like_a_source_file("source.c"));
        assert!(looks_like_a_source_file("source.cpp"));
        assert!(looks_like_a_source_file("source.cxx"));
        assert!(looks_like_a_source_file("source.cc"));
        assert!(looks_like_a_source_file("source.h"));
        assert!(looks_like_a_source_file("source.hpp"));
        assert!(looks_like_a_source_file("module.f90"));
        assert!(looks_like_a_source_file("main.go"));
        assert!(looks_like_a_source_file("path/to/source.c"));
    }

    #[test]
    fn test_not_source_files() {
        assert!(!looks_like_a_source_file("gcc"));
        assert!(!looks_like_a_source_file("libfoo.so"));
        assert!(!looks_like_a_source_file("foo.o"));
        assert!(!looks_like_a_source_file("foo.a"));
    }
}
