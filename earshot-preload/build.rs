// SPDX-License-Identifier: GPL-3.0-or-later

use std::io::Write;

/// The symbols the shared library exports for interception.
const EXPORTED_SYMBOLS: &[&str] = &[
    "execve",
    "execv",
    "execvp",
    "execvpe",
    "execvP",
    "posix_spawn",
    "posix_spawnp",
    "EARSHOT_PRELOAD_VERSION",
];

fn main() {
    println!("cargo:rerun-if-changed=src/hooks.rs");

    // Control the symbol visibility of the shared library: the hook
    // symbols are global, everything else stays local. Without this the
    // dynamic linker could bind unrelated Rust runtime symbols too.
    if cfg!(target_os = "linux") {
        let out_dir = std::env::var("OUT_DIR").expect("OUT_DIR is set by cargo");
        let exports_path = format!("{out_dir}/exports.map");
        generate_linux_exports(&exports_path);

        println!("cargo:rustc-cdylib-link-arg=-Wl,--version-script={exports_path}");
    }
}

/// Generate the ELF version script for the exported symbols.
fn generate_linux_exports(path: &str) {
    let mut file = std::fs::File::create(path).expect("Failed to create exports.map");

    writeln!(file, "{{").unwrap();
    writeln!(file, "    global:").unwrap();
    for symbol in EXPORTED_SYMBOLS {
        writeln!(file, "        {symbol};").unwrap();
    }
    writeln!(file, "    local:").unwrap();
    writeln!(file, "        *;").unwrap();
    writeln!(file, "}};").unwrap();
}
