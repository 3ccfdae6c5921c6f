// SPDX-License-Identifier: GPL-3.0-or-later

//! The exec family entry points the library replaces.
//!
//! Every hook follows the same shape: check the session, resolve the
//! program with the POSIX search semantics of the hooked call, then route
//! the execution through the supervisor. The `execl` family is not hooked,
//! libc implements it on top of the functions below.

use crate::{executor, resolver, session};
use std::ffi::CStr;
use std::os::raw::{c_char, c_int};

extern "C" {
    static environ: *const *const c_char;
}

/// # Safety
///
/// FFI entry point for `LD_PRELOAD` interception, the exec contract applies.
#[no_mangle]
pub unsafe extern "C" fn execve(
    path: *const c_char,
    argv: *const *const c_char,
    envp: *const *const c_char,
) -> c_int {
    let Some(session) = session::get() else {
        return executor::fail(libc::EIO);
    };
    if path.is_null() {
        return executor::fail(libc::EFAULT);
    }
    log::debug!("execve intercepted");
    match resolver::from_current_directory(CStr::from_ptr(path)) {
        Ok(program) => executor::execve_supervised(session, &program, argv, envp),
        Err(code) => executor::fail(code),
    }
}

/// # Safety
///
/// FFI entry point for `LD_PRELOAD` interception, the exec contract applies.
#[no_mangle]
pub unsafe extern "C" fn execv(path: *const c_char, argv: *const *const c_char) -> c_int {
    execve(path, argv, environ)
}

/// # Safety
///
/// FFI entry point for `LD_PRELOAD` interception, the exec contract applies.
#[no_mangle]
pub unsafe extern "C" fn execvpe(
    file: *const c_char,
    argv: *const *const c_char,
    envp: *const *const c_char,
) -> c_int {
    let Some(session) = session::get() else {
        return executor::fail(libc::EIO);
    };
    if file.is_null() {
        return executor::fail(libc::EFAULT);
    }
    log::debug!("execvpe intercepted");
    match resolver::from_path(CStr::from_ptr(file), envp) {
        Ok(program) => executor::execve_supervised(session, &program, argv, envp),
        Err(code) => executor::fail(code),
    }
}

/// # Safety
///
/// FFI entry point for `LD_PRELOAD` interception, the exec contract applies.
#[no_mangle]
pub unsafe extern "C" fn execvp(file: *const c_char, argv: *const *const c_char) -> c_int {
    execvpe(file, argv, environ)
}

/// # Safety
///
/// FFI entry point for `LD_PRELOAD` interception, the exec contract applies.
#[no_mangle]
pub unsafe extern "C" fn execvP(
    file: *const c_char,
    search_path: *const c_char,
    argv: *const *const c_char,
    envp: *const *const c_char,
) -> c_int {
    let Some(session) = session::get() else {
        return executor::fail(libc::EIO);
    };
    if file.is_null() || search_path.is_null() {
        return executor::fail(libc::EFAULT);
    }
    log::debug!("execvP intercepted");
    match resolver::from_search_path(CStr::from_ptr(file), CStr::from_ptr(search_path)) {
        Ok(program) => executor::execve_supervised(session, &program, argv, envp),
        Err(code) => executor::fail(code),
    }
}

/// # Safety
///
/// FFI entry point for `LD_PRELOAD` interception, the spawn contract applies.
#[no_mangle]
pub unsafe extern "C" fn posix_spawn(
    pid: *mut libc::pid_t,
    path: *const c_char,
    file_actions: *const libc::posix_spawn_file_actions_t,
    attrp: *const libc::posix_spawnattr_t,
    argv: *const *const c_char,
    envp: *const *const c_char,
) -> c_int {
    let Some(session) = session::get() else {
        return libc::EIO;
    };
    if path.is_null() {
        return libc::EFAULT;
    }
    log::debug!("posix_spawn intercepted");
    match resolver::from_current_directory(CStr::from_ptr(path)) {
        Ok(program) => executor::posix_spawn_supervised(
            session,
            pid,
            &program,
            file_actions,
            attrp,
            argv,
            envp,
        ),
        Err(code) => code,
    }
}

/// # Safety
///
/// FFI entry point for `LD_PRELOAD` interception, the spawn contract applies.
#[no_mangle]
pub unsafe extern "C" fn posix_spawnp(
    pid: *mut libc::pid_t,
    file: *const c_char,
    file_actions: *const libc::posix_spawn_file_actions_t,
    attrp: *const libc::posix_spawnattr_t,
    argv: *const *const c_char,
    envp: *const *const c_char,
) -> c_int {
    let Some(session) = session::get() else {
        return libc::EIO;
    };
    if file.is_null() {
        return libc::EFAULT;
    }
    log::debug!("posix_spawnp intercepted");
    match resolver::from_path(CStr::from_ptr(file), envp) {
        Ok(program) => executor::posix_spawn_supervised(
            session,
            pid,
            &program,
            file_actions,
            attrp,
            argv,
            envp,
        ),
        Err(code) => code,
    }
}
