// SPDX-License-Identifier: GPL-3.0-or-later

//! Rewrites the intercepted calls to run the supervisor executable.
//!
//! The new argument vector is
//!
//! ```text
//! [ reporter, "--destination", <dst>, ("--verbose"?),
//!   "--execute", <resolved program>, "--", argv..., NULL ]
//! ```
//!
//! The caller's argument strings are referenced, not copied; only the
//! resolved program path is owned storage. The real `execve` and
//! `posix_spawn` are resolved once with `dlsym(RTLD_NEXT)`, so the call
//! leaves the library and does not recurse into the hooks.

use crate::session::Session;
use std::ffi::CStr;
use std::os::raw::{c_char, c_int};
use std::sync::OnceLock;

const FLAG_DESTINATION: &CStr = c"--destination";
const FLAG_VERBOSE: &CStr = c"--verbose";
const FLAG_EXECUTE: &CStr = c"--execute";
const FLAG_COMMAND: &CStr = c"--";

type ExecveFn = unsafe extern "C" fn(
    *const c_char,
    *const *const c_char,
    *const *const c_char,
) -> c_int;

type PosixSpawnFn = unsafe extern "C" fn(
    *mut libc::pid_t,
    *const c_char,
    *const libc::posix_spawn_file_actions_t,
    *const libc::posix_spawnattr_t,
    *const *const c_char,
    *const *const c_char,
) -> c_int;

static REAL_EXECVE: OnceLock<Option<ExecveFn>> = OnceLock::new();
static REAL_POSIX_SPAWN: OnceLock<Option<PosixSpawnFn>> = OnceLock::new();

fn real_execve() -> Option<ExecveFn> {
    *REAL_EXECVE.get_or_init(|| unsafe {
        let symbol = libc::dlsym(libc::RTLD_NEXT, c"execve".as_ptr());
        if symbol.is_null() {
            None
        } else {
            Some(std::mem::transmute::<*mut libc::c_void, ExecveFn>(symbol))
        }
    })
}

fn real_posix_spawn() -> Option<PosixSpawnFn> {
    *REAL_POSIX_SPAWN.get_or_init(|| unsafe {
        let symbol = libc::dlsym(libc::RTLD_NEXT, c"posix_spawn".as_ptr());
        if symbol.is_null() {
            None
        } else {
            Some(std::mem::transmute::<*mut libc::c_void, PosixSpawnFn>(
                symbol,
            ))
        }
    })
}

/// Assembles the supervisor argument vector.
///
/// # Safety
///
/// `argv` must be a null terminated pointer array, as the exec contract
/// requires.
unsafe fn supervisor_argv(
    session: &Session,
    program: &CStr,
    argv: *const *const c_char,
) -> Vec<*const c_char> {
    let mut vector = Vec::with_capacity(16);
    vector.push(session.reporter.as_ptr());
    vector.push(FLAG_DESTINATION.as_ptr());
    vector.push(session.destination.as_ptr());
    if session.verbose {
        vector.push(FLAG_VERBOSE.as_ptr());
    }
    vector.push(FLAG_EXECUTE.as_ptr());
    vector.push(program.as_ptr());
    vector.push(FLAG_COMMAND.as_ptr());
    if !argv.is_null() {
        let mut it = argv;
        while !(*it).is_null() {
            vector.push(*it);
            it = it.add(1);
        }
    }
    vector.push(std::ptr::null());
    vector
}

/// Runs the supervisor in place of the resolved program.
///
/// # Safety
///
/// `argv` and `envp` must be null terminated pointer arrays.
pub(crate) unsafe fn execve_supervised(
    session: &Session,
    program: &CStr,
    argv: *const *const c_char,
    envp: *const *const c_char,
) -> c_int {
    let Some(real) = real_execve() else {
        return fail(libc::EIO);
    };
    let vector = supervisor_argv(session, program, argv);
    real(session.reporter.as_ptr(), vector.as_ptr(), envp)
}

/// Spawns the supervisor in place of the resolved program.
///
/// Unlike the exec family, `posix_spawn` reports failures with its return
/// value, not through `errno`.
///
/// # Safety
///
/// `argv` and `envp` must be null terminated pointer arrays.
pub(crate) unsafe fn posix_spawn_supervised(
    session: &Session,
    pid: *mut libc::pid_t,
    program: &CStr,
    file_actions: *const libc::posix_spawn_file_actions_t,
    attrp: *const libc::posix_spawnattr_t,
    argv: *const *const c_char,
    envp: *const *const c_char,
) -> c_int {
    let Some(real) = real_posix_spawn() else {
        return libc::EIO;
    };
    let vector = supervisor_argv(session, program, argv);
    real(
        pid,
        session.reporter.as_ptr(),
        file_actions,
        attrp,
        vector.as_ptr(),
        envp,
    )
}

/// Fails an exec style call: sets `errno` and returns -1.
pub(crate) fn fail(code: c_int) -> c_int {
    set_errno(code);
    -1
}

#[cfg(target_os = "linux")]
fn set_errno(code: c_int) {
    unsafe {
        *libc::__errno_location() = code;
    }
}

#[cfg(not(target_os = "linux"))]
fn set_errno(code: c_int) {
    unsafe {
        *libc::__error() = code;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::ffi::CString;

    fn session(verbose: bool) -> Session {
        Session {
            library: "/usr/libexec/earshot/libearshot_preload.so".to_string(),
            reporter: CString::new("/usr/libexec/earshot/earshot-supervisor").unwrap(),
            destination: CString::new("127.0.0.1:4455").unwrap(),
            verbose,
        }
    }

    fn to_strings(vector: Vec<*const c_char>) -> Vec<Option<String>> {
        vector
            .into_iter()
            .map(|ptr| {
                if ptr.is_null() {
                    None
                } else {
                    Some(
                        unsafe { CStr::from_ptr(ptr) }
                            .to_string_lossy()
                            .to_string(),
                    )
                }
            })
            .collect()
    }

    #[test]
    fn test_supervisor_argv() {
        let session = session(false);
        let program = CString::new("/usr/bin/ls").unwrap();
        let arg0 = CString::new("ls").unwrap();
        let arg1 = CString::new("-l").unwrap();
        let argv = [arg0.as_ptr(), arg1.as_ptr(), std::ptr::null()];

        let vector = unsafe { supervisor_argv(&session, &program, argv.as_ptr()) };

        assert_eq!(
            to_strings(vector),
            vec![
                Some("/usr/libexec/earshot/earshot-supervisor".to_string()),
                Some("--destination".to_string()),
                Some("127.0.0.1:4455".to_string()),
                Some("--execute".to_string()),
                Some("/usr/bin/ls".to_string()),
                Some("--".to_string()),
                Some("ls".to_string()),
                Some("-l".to_string()),
                None,
            ]
        );
    }

    #[test]
    fn test_supervisor_argv_verbose() {
        let session = session(true);
        let program = CString::new("/usr/bin/ls").unwrap();
        let arg0 = CString::new("ls").unwrap();
        let argv = [arg0.as_ptr(), std::ptr::null()];

        let vector = unsafe { supervisor_argv(&session, &program, argv.as_ptr()) };
        let strings = to_strings(vector);

        assert_eq!(strings[3], Some("--verbose".to_string()));
        assert_eq!(strings[4], Some("--execute".to_string()));
    }
}
