//! Build script for capscope-core
//!
//! Checks the toolchain before compilation:
//! - Minimum Rust version (let-else and `Option::is_some_and` need 1.70.0)
//! - Purecap CHERI targets, which only get the simulated capability backend
//!   until a hardware backend exists

use std::env;

fn main()
{
    println!("cargo:rerun-if-changed=build.rs");

    if let Ok(rustc_version) = rustc_version::version() {
        let min_rust_version = rustc_version::Version::new(1, 70, 0);

        if rustc_version < min_rust_version {
            panic!("capscope-core requires Rust {min_rust_version} or newer, found {rustc_version}");
        }
    } else {
        println!("cargo:warning=could not verify Rust version");
    }

    let abi = env::var("CARGO_CFG_TARGET_ABI").unwrap_or_default();
    if abi.contains("purecap") {
        println!("cargo:warning=building for a purecap target: capabilities are only read through the simulated backend");
    }
}
