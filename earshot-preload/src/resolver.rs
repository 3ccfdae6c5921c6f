// SPDX-License-Identifier: GPL-3.0-or-later

//! Executable path resolution with the POSIX `execvp` semantics.
//!
//! A file name containing a directory separator is treated as a path.
//! Otherwise a search list is consumed: the `PATH` of the given
//! environment, or the `confstr(_CS_PATH)` value when the environment has
//! none. Entries are separated by `:`, empty entries are skipped. The
//! first candidate passing `access(X_OK)` wins. A match that exists but is
//! not executable turns the final failure into `EACCES`.
//!
//! Errors are plain `errno` codes, the hooks pass them to the caller.

use libc::{EACCES, ENOENT};
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};

const PATH_SEPARATOR: u8 = b':';
const DIR_SEPARATOR: u8 = b'/';

/// Resolves a path candidate: real path plus execute permission.
pub(crate) fn from_current_directory(file: &CStr) -> Result<CString, c_int> {
    let mut resolved = [0 as c_char; libc::PATH_MAX as usize];
    // create absolute path to the given file.
    if unsafe { libc::realpath(file.as_ptr(), resolved.as_mut_ptr()) }.is_null() {
        return Err(ENOENT);
    }
    // check if it's okay to execute.
    if unsafe { libc::access(resolved.as_ptr(), libc::X_OK) } == 0 {
        let path = unsafe { CStr::from_ptr(resolved.as_ptr()) };
        return Ok(path.to_owned());
    }
    // try to set a meaningful error value.
    if unsafe { libc::access(resolved.as_ptr(), libc::F_OK) } == 0 {
        Err(EACCES)
    } else {
        Err(ENOENT)
    }
}

/// Resolves a file with the search list of the given environment.
pub(crate) fn from_path(file: &CStr, envp: *const *const c_char) -> Result<CString, c_int> {
    if contains_dir_separator(file) {
        // the file contains a dir separator, it is treated as path.
        return from_current_directory(file);
    }
    // otherwise use the PATH variable to locate the executable.
    if let Some(paths) = env_value(envp, "PATH") {
        return from_search_path(file, &paths);
    }
    // fall back to `confstr` PATH value if the environment has no value.
    match confstr_path() {
        Some(paths) => from_search_path(file, &paths),
        None => Err(ENOENT),
    }
}

/// Resolves a file with an explicit search list.
pub(crate) fn from_search_path(file: &CStr, search_path: &CStr) -> Result<CString, c_int> {
    if contains_dir_separator(file) {
        // the file contains a dir separator, it is treated as path.
        return from_current_directory(file);
    }

    let mut inaccessible = false;
    for entry in search_path.to_bytes().split(|byte| *byte == PATH_SEPARATOR) {
        // ignore empty entries
        if entry.is_empty() {
            continue;
        }
        // create a path
        let mut candidate = Vec::with_capacity(entry.len() + file.to_bytes().len() + 2);
        candidate.extend_from_slice(entry);
        candidate.push(DIR_SEPARATOR);
        candidate.extend_from_slice(file.to_bytes());
        let Ok(candidate) = CString::new(candidate) else {
            continue;
        };
        // check if it's okay to execute.
        match from_current_directory(&candidate) {
            Ok(found) => return Ok(found),
            Err(EACCES) => inaccessible = true,
            Err(_) => continue,
        }
    }
    // if all attempts were failing, then quit with a failure.
    Err(if inaccessible { EACCES } else { ENOENT })
}

fn contains_dir_separator(file: &CStr) -> bool {
    file.to_bytes().contains(&DIR_SEPARATOR)
}

/// Looks up a variable in a raw environment pointer array.
fn env_value(envp: *const *const c_char, key: &str) -> Option<CString> {
    if envp.is_null() {
        return None;
    }
    let mut it = envp;
    loop {
        let entry = unsafe { *it };
        if entry.is_null() {
            return None;
        }
        let bytes = unsafe { CStr::from_ptr(entry) }.to_bytes();
        if bytes.len() >= key.len() + 1
            && &bytes[..key.len()] == key.as_bytes()
            && bytes[key.len()] == b'='
        {
            return CString::new(&bytes[key.len() + 1..]).ok();
        }
        it = unsafe { it.add(1) };
    }
}

/// The `confstr(_CS_PATH)` value, with the usual two-call protocol.
fn confstr_path() -> Option<CString> {
    let length = unsafe { libc::confstr(libc::_CS_PATH, std::ptr::null_mut(), 0) };
    if length == 0 {
        return None;
    }
    let mut buffer = vec![0u8; length];
    if unsafe { libc::confstr(libc::_CS_PATH, buffer.as_mut_ptr() as *mut _, buffer.len()) } == 0 {
        return None;
    }
    // drop the terminating zero
    buffer.truncate(length - 1);
    CString::new(buffer).ok()
}
