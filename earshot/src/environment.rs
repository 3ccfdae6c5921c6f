// SPDX-License-Identifier: GPL-3.0-or-later

//! Environment variable names and the environment overlay computation.
//!
//! The interception works by injecting a handful of environment variables
//! into every process of the build. The preload library reads these to find
//! the collector and the supervisor executable, and the dynamic linker reads
//! `LD_PRELOAD` to load the library itself.

use crate::intercept::SessionConfig;
use std::collections::HashMap;

/// Path to the preload library, read by the agent at first use.
pub const KEY_LIBRARY: &str = "EARSHOT_LIBRARY";
/// Path to the supervisor executable, substituted for the real program.
pub const KEY_REPORTER: &str = "EARSHOT_REPORTER";
/// Address of the collector service (`ip:port` on the loopback interface).
pub const KEY_DESTINATION: &str = "EARSHOT_DESTINATION";
/// Verbosity flag, forwarded to the supervisor as `--verbose`.
pub const KEY_VERBOSE: &str = "EARSHOT_VERBOSE";

// man page for `ld.so` (Linux dynamic linker/loader)
pub const KEY_OS_PRELOAD: &str = "LD_PRELOAD";
// man page for `exec` (Linux system call)
pub const KEY_OS_PATH: &str = "PATH";

// https://gcc.gnu.org/onlinedocs/cpp/Environment-Variables.html
pub const KEY_GCC_C_INCLUDE_1: &str = "CPATH";
pub const KEY_GCC_C_INCLUDE_2: &str = "C_INCLUDE_PATH";
pub const KEY_GCC_C_INCLUDE_3: &str = "CPLUS_INCLUDE_PATH";
pub const KEY_GCC_OBJC_INCLUDE: &str = "OBJC_INCLUDE_PATH";

/// Computes the environment overlay that continues the interception in
/// child processes.
///
/// The overlay is a pure function of the session configuration and the
/// caller's current environment. It is applied by union-with-override onto
/// the caller's environment. Variables that accumulate colon-separated path
/// lists (currently only `LD_PRELOAD`) are merged instead of overridden.
pub fn update(
    session: &SessionConfig,
    current: &HashMap<String, String>,
) -> HashMap<String, String> {
    let mut overlay = HashMap::new();
    overlay.insert(
        KEY_LIBRARY.to_string(),
        session.library.to_string_lossy().to_string(),
    );
    overlay.insert(
        KEY_REPORTER.to_string(),
        session.reporter.to_string_lossy().to_string(),
    );
    overlay.insert(KEY_DESTINATION.to_string(), session.address.clone());
    if session.verbose {
        overlay.insert(KEY_VERBOSE.to_string(), "1".to_string());
    }

    let preload_current = current.get(KEY_OS_PRELOAD).map(String::as_str).unwrap_or("");
    overlay.insert(
        KEY_OS_PRELOAD.to_string(),
        merge_into_paths(preload_current, &session.library.to_string_lossy()),
    );
    overlay
}

/// Applies an overlay onto an environment by union-with-override.
pub fn apply(
    mut current: HashMap<String, String>,
    overlay: HashMap<String, String>,
) -> HashMap<String, String> {
    current.extend(overlay);
    current
}

/// Merge a value into a colon-separated path list by front-insertion,
/// unless the value is already present. Values set by the user are kept.
pub fn merge_into_paths(current: &str, value: &str) -> String {
    if current.is_empty() {
        return value.to_string();
    }
    if current.split(':').any(|entry| entry == value) {
        return current.to_string();
    }
    format!("{value}:{current}")
}
