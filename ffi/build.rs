//! Generate `include/gemini_ffi.h` from the `extern "C"` surface.

use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=src/lib.rs");
    println!("cargo:rerun-if-changed=src/types.rs");

    let crate_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let include_dir = crate_dir.join("include");
    if let Err(e) = std::fs::create_dir_all(&include_dir) {
        println!("cargo:warning=could not create {}: {e}", include_dir.display());
        return;
    }

    match cbindgen::Builder::new()
        .with_crate(&crate_dir)
        .with_language(cbindgen::Language::C)
        .with_include_guard("GEMINI_FFI_H")
        .with_cpp_compat(true)
        .generate()
    {
        Ok(bindings) => {
            bindings.write_to_file(include_dir.join("gemini_ffi.h"));
        }
        Err(e) => println!("cargo:warning=could not generate C header: {e}"),
    }
}
