// SPDX-License-Identifier: GPL-3.0-or-later

//! Filters compilation database entries by their source file.

use super::Entry;
use crate::config;
use std::path::PathBuf;

/// Decides which entries make it into the compilation database.
///
/// In the default, permissive mode every entry is accepted. In strict mode
/// an entry is accepted only if the source file exists on disk, some
/// include root is a path prefix of it (when include roots are given), and
/// no exclude root is a path prefix of it (when exclude roots are given).
pub struct ContentFilter {
    strict: bool,
    include: Vec<PathBuf>,
    exclude: Vec<PathBuf>,
}

impl From<&config::SourceFilter> for ContentFilter {
    fn from(config: &config::SourceFilter) -> Self {
        Self {
            strict: config.strict,
            include: config.include.clone(),
            exclude: config.exclude.clone(),
        }
    }
}

impl ContentFilter {
    pub fn accept(&self, entry: &Entry) -> bool {
        if !self.strict {
            return true;
        }
        if !entry.file.exists() {
            return false;
        }
        if !self.include.is_empty()
            && !self.include.iter().any(|root| entry.file.starts_with(root))
        {
            return false;
        }
        if !self.exclude.is_empty()
            && self.exclude.iter().any(|root| entry.file.starts_with(root))
        {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn entry(file: &std::path::Path) -> Entry {
        Entry::from_arguments(
            file,
            vec!["cc".to_string(), "-c".to_string()],
            "/tmp",
            None::<PathBuf>,
        )
    }

    fn filter(strict: bool, include: Vec<PathBuf>, exclude: Vec<PathBuf>) -> ContentFilter {
        ContentFilter {
            strict,
            include,
            exclude,
        }
    }

    #[test]
    fn test_permissive_accepts_everything() {
        let sut = filter(false, vec![], vec![]);

        assert!(sut.accept(&entry(std::path::Path::new("/no/such/file.c"))));
    }

    #[test]
    fn test_strict_rejects_missing_files() {
        let sut = filter(true, vec![], vec![]);

        assert!(!sut.accept(&entry(std::path::Path::new("/no/such/file.c"))));
    }

    #[test]
    fn test_strict_accepts_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("main.c");
        std::fs::write(&file, "int main() {}\n").unwrap();
        let sut = filter(true, vec![], vec![]);

        assert!(sut.accept(&entry(&file)));
    }

    #[test]
    fn test_strict_include_roots() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("main.c");
        std::fs::write(&file, "int main() {}\n").unwrap();

        let accepting = filter(true, vec![dir.path().to_path_buf()], vec![]);
        assert!(accepting.accept(&entry(&file)));

        let rejecting = filter(true, vec![PathBuf::from("/somewhere/else")], vec![]);
        assert!(!rejecting.accept(&entry(&file)));
    }

    #[test]
    fn test_strict_exclude_roots() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("main.c");
        std::fs::write(&file, "int main() {}\n").unwrap();

        let sut = filter(true, vec![], vec![dir.path().to_path_buf()]);
        assert!(!sut.accept(&entry(&file)));
    }

    #[test]
    fn test_exclude_wins_over_include() {
        let dir = tempfile::tempdir().unwrap();
        let tests = dir.path().join("tests");
        std::fs::create_dir(&tests).unwrap();
        let file = tests.join("main.c");
        std::fs::write(&file, "int main() {}\n").unwrap();

        let sut = filter(true, vec![dir.path().to_path_buf()], vec![tests]);
        assert!(!sut.accept(&entry(&file)));
    }
}
