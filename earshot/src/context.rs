// SPDX-License-Identifier: GPL-3.0-or-later

//! Captures the host information that is written into the report context.

use std::collections::BTreeMap;
use std::ffi::CStr;
use std::os::raw::c_int;

/// The session type tag of the preload based interception.
pub const SESSION_TYPE_PRELOAD: &str = "library preload";

/// Collects descriptive facts about the host the build runs on.
///
/// The result is a flat map of descriptor to value: the `uname` fields,
/// plus the `confstr` values that are available on the platform. Failures
/// to query a single descriptor are not fatal, the entry is just absent.
pub fn host_info() -> BTreeMap<String, String> {
    let mut result = BTreeMap::new();

    match nix::sys::utsname::uname() {
        Ok(info) => {
            result.insert("sysname".into(), info.sysname().to_string_lossy().into());
            result.insert("nodename".into(), info.nodename().to_string_lossy().into());
            result.insert("release".into(), info.release().to_string_lossy().into());
            result.insert("version".into(), info.version().to_string_lossy().into());
            result.insert("machine".into(), info.machine().to_string_lossy().into());
        }
        Err(error) => log::info!("Failed to query uname: {error}"),
    }

    if let Some(value) = confstr(libc::_CS_PATH) {
        result.insert("_CS_PATH".into(), value);
    }
    #[cfg(target_os = "linux")]
    {
        if let Some(value) = confstr(libc::_CS_GNU_LIBC_VERSION) {
            result.insert("_CS_GNU_LIBC_VERSION".into(), value);
        }
        if let Some(value) = confstr(libc::_CS_GNU_LIBPTHREAD_VERSION) {
            result.insert("_CS_GNU_LIBPTHREAD_VERSION".into(), value);
        }
    }

    result
}

/// The system default executable search path, from `confstr(_CS_PATH)`.
pub fn default_search_path() -> Option<String> {
    confstr(libc::_CS_PATH)
}

/// Safe wrapper around the two-call `confstr(3)` protocol.
fn confstr(name: c_int) -> Option<String> {
    let length = unsafe { libc::confstr(name, std::ptr::null_mut(), 0) };
    if length == 0 {
        return None;
    }
    let mut buffer = vec![0u8; length];
    let written = unsafe { libc::confstr(name, buffer.as_mut_ptr() as *mut _, buffer.len()) };
    if written == 0 {
        return None;
    }
    CStr::from_bytes_until_nul(&buffer)
        .ok()
        .map(|value| value.to_string_lossy().to_string())
}
