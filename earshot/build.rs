// SPDX-License-Identifier: GPL-3.0-or-later

fn main() {
    // Installation defaults for the runtime components. Packagers override
    // these environment variables to match their install layout.
    if std::env::var("SUPERVISOR_EXECUTABLE_PATH").is_err() {
        println!(
            "cargo:rustc-env=SUPERVISOR_EXECUTABLE_PATH=/usr/libexec/earshot/earshot-supervisor"
        );
    }
    if std::env::var("PRELOAD_LIBRARY_PATH").is_err() {
        println!(
            "cargo:rustc-env=PRELOAD_LIBRARY_PATH=/usr/libexec/earshot/libearshot_preload.so"
        );
    }
    println!("cargo:rerun-if-env-changed=SUPERVISOR_EXECUTABLE_PATH");
    println!("cargo:rerun-if-env-changed=PRELOAD_LIBRARY_PATH");
}
