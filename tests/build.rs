//! Build script for nexa-os-tests
//!
//! Copies a scoped subset of the kernel's `../src` tree into
//! `build/kernel_src` and preprocesses each file so it compiles under `std`
//! against the mock hardware layer in `src/mock`:
//! 1. Comments out `extern crate alloc;` (tests link std's alloc)
//! 2. Comments out bare `#[cfg(test)]` attribute lines, so the kernel's own
//!    inline unit tests run as part of this crate's test suite too
//! 3. Skips `#[global_allocator]`/`#[alloc_error_handler]` items entirely
//! 4. Rewrites `alloc::` references to `std::`
//!
//! Only the modules this crate's mocks can stand in for are copied: the
//! process/scheduler/VFS/net code has no direct x86_64 dependency once `mm`
//! is mocked out, so it compiles and runs unmodified under `std`.

use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

/// Paths relative to `../src`, copied (and, for directories, recursed into)
/// verbatim. `mm`, `arch`, `interrupts`, `syscall` and friends stay out: they
/// are either x86_64-specific or covered by the mocks in `src/mock` instead.
const SCOPED_PATHS: &[&str] = &[
    "config.rs",
    "fs",
    "net",
    "process/types.rs",
    "process/loader.rs",
    "scheduler/ready_queue.rs",
];

fn main() {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    let kernel_src = Path::new(manifest_dir).parent().unwrap().join("src");
    let build_dir = Path::new(manifest_dir).join("build").join("kernel_src");

    let _ = fs::remove_dir_all(&build_dir);
    fs::create_dir_all(&build_dir).expect("failed to create build dir");

    for rel in SCOPED_PATHS {
        let src_path = kernel_src.join(rel);
        let dst_path = build_dir.join(rel);
        if src_path.is_dir() {
            fs::create_dir_all(&dst_path).expect("failed to create scoped dir");
            preprocess_dir(&src_path, &dst_path).expect("failed to preprocess kernel source");
        } else {
            if let Some(parent) = dst_path.parent() {
                fs::create_dir_all(parent).expect("failed to create scoped parent dir");
            }
            preprocess_file(&src_path, &dst_path).expect("failed to preprocess kernel source");
        }
    }

    println!("cargo:rustc-env=KERNEL_SRC={}", build_dir.display());
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=../src");
}

fn preprocess_dir(src: &Path, dst: &Path) -> std::io::Result<()> {
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if src_path.is_dir() {
            fs::create_dir_all(&dst_path)?;
            preprocess_dir(&src_path, &dst_path)?;
        } else if src_path.extension().map_or(false, |e| e == "rs") {
            preprocess_file(&src_path, &dst_path)?;
        } else {
            fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}

fn preprocess_file(src: &Path, dst: &Path) -> std::io::Result<()> {
    let file = fs::File::open(src)?;
    let reader = BufReader::new(file);
    let mut output = fs::File::create(dst)?;

    let mut skip_until_balanced = false;
    let mut brace_depth = 0;

    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();

        if trimmed == "extern crate alloc;" {
            writeln!(output, "// REMOVED FOR TESTING: {}", line)?;
            continue;
        }

        if trimmed == "#[cfg(test)]" {
            writeln!(output, "// REMOVED FOR TESTING (cfg test): {}", line)?;
            continue;
        }

        if trimmed == "#[global_allocator]" || trimmed == "#[alloc_error_handler]" {
            skip_until_balanced = true;
            brace_depth = 0;
            writeln!(output, "// REMOVED FOR TESTING: {}", line)?;
            continue;
        }

        if skip_until_balanced {
            writeln!(output, "// REMOVED FOR TESTING: {}", line)?;
            for ch in trimmed.chars() {
                match ch {
                    '{' => brace_depth += 1,
                    '}' => {
                        if brace_depth > 0 {
                            brace_depth -= 1;
                        }
                    }
                    _ => {}
                }
            }
            if brace_depth == 0 && (trimmed.ends_with(';') || trimmed == "}") {
                skip_until_balanced = false;
            }
            continue;
        }

        let processed_line = line
            .replace("alloc::format!", "std::format!")
            .replace("alloc::vec!", "std::vec!")
            .replace("alloc::vec::", "std::vec::")
            .replace("alloc::string::", "std::string::")
            .replace("alloc::boxed::", "std::boxed::")
            .replace("alloc::collections::", "std::collections::")
            .replace("alloc::sync::", "std::sync::")
            .replace("use alloc::vec", "use std::vec")
            .replace("use alloc::string", "use std::string")
            .replace("use alloc::boxed", "use std::boxed")
            .replace("use alloc::collections", "use std::collections")
            .replace("use alloc::sync", "use std::sync");

        writeln!(output, "{}", processed_line)?;
    }

    Ok(())
}
