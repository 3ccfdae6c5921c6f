// SPDX-License-Identifier: GPL-3.0-or-later

//! The session of the preload library.
//!
//! The collector injects a handful of environment variables into the build
//! processes; the library reads them once, at first use. The values are
//! copied into process-global storage, so a caller clearing its environment
//! later does not destroy the session.

use std::ffi::CString;
use std::sync::OnceLock;

const KEY_LIBRARY: &str = "EARSHOT_LIBRARY";
const KEY_REPORTER: &str = "EARSHOT_REPORTER";
const KEY_DESTINATION: &str = "EARSHOT_DESTINATION";
const KEY_VERBOSE: &str = "EARSHOT_VERBOSE";

/// The captured session values.
///
/// The session is valid iff the library, reporter and destination values
/// are all present and non-empty in the environment.
pub(crate) struct Session {
    /// Path of this library; kept to re-validate the session.
    pub library: String,
    /// Path of the supervisor executable, the image every intercepted
    /// call is rewritten to.
    pub reporter: CString,
    /// Address of the collector service.
    pub destination: CString,
    pub verbose: bool,
}

static SESSION: OnceLock<Option<Session>> = OnceLock::new();

/// The process-global session; `None` when the session is invalid.
pub(crate) fn get() -> Option<&'static Session> {
    SESSION.get_or_init(Session::from_environment).as_ref()
}

impl Session {
    fn from_environment() -> Option<Session> {
        let library = non_empty(KEY_LIBRARY)?;
        let reporter = non_empty(KEY_REPORTER)?;
        let destination = non_empty(KEY_DESTINATION)?;
        let verbose = std::env::var_os(KEY_VERBOSE).is_some();

        Some(Session {
            library,
            reporter: CString::new(reporter).ok()?,
            destination: CString::new(destination).ok()?,
            verbose,
        })
    }
}

fn non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}
