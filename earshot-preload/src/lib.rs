// SPDX-License-Identifier: GPL-3.0-or-later

//! The preload library of the interception.
//!
//! Loaded into every dynamically linked process of the build via
//! `LD_PRELOAD`, the library replaces the exec family entry points. Each
//! intercepted call is rewritten to run the supervisor executable, which
//! reports the invocation to the collector and then executes the real
//! program.
//!
//! The library reads its session from the environment at first use (see
//! the `session` module). On an incomplete session every hook fails with
//! `EIO` without calling through, so the caller sees a clean failure
//! instead of a partial interception.

#[cfg(unix)]
mod executor;
#[cfg(unix)]
mod hooks;
#[cfg(unix)]
mod resolver;
#[cfg(unix)]
mod session;

/// Version information for the library.
#[no_mangle]
pub static EARSHOT_PRELOAD_VERSION: &[u8; 6] = b"0.1.0\0";
