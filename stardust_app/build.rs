// build.rs
// Compiles the GLSL sources in shaders/ to the SPIR-V files the demo loads
// at runtime (<name>.<stage>.spv next to each source).

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=../shaders");

    // Allow skipping shader compilation with an env var or arg
    let skip_shaders =
        env::var("SKIP_SHADERS").is_ok() || env::args().any(|arg| arg == "--skip-shaders");
    if skip_shaders {
        eprintln!("info: Skipping shader compilation (SKIP_SHADERS set or --skip-shaders arg)");
        return;
    }

    // Check for Vulkan SDK
    let vulkan_sdk = match env::var("VULKAN_SDK") {
        Ok(sdk) => sdk,
        Err(_) => {
            println!("cargo:rerun-if-env-changed=VULKAN_SDK");
            eprintln!("warning: VULKAN_SDK not set, shader compilation skipped");
            eprintln!("hint: Install Vulkan SDK and set VULKAN_SDK environment variable");
            return;
        }
    };

    let glslc = if cfg!(target_os = "windows") {
        format!("{}\\Bin\\glslc.exe", vulkan_sdk)
    } else {
        format!("{}/bin/glslc", vulkan_sdk)
    };

    // Verify glslc exists
    if !Path::new(&glslc).exists() {
        eprintln!("error: glslc not found at: {}", glslc);
        eprintln!("hint: Ensure Vulkan SDK is properly installed");
        panic!("Shader compiler not found");
    }

    let shader_dir = PathBuf::from("../shaders");
    let shader_files = match std::fs::read_dir(&shader_dir) {
        Ok(files) => files,
        Err(_) => {
            eprintln!("info: No shader directory found at: {:?}", shader_dir);
            return;
        }
    };

    let mut compiled_count = 0;
    for entry in shader_files {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                eprintln!("warning: Error reading shader directory entry: {}", e);
                continue;
            }
        };

        let path = entry.path();
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if !matches!(ext, "vert" | "frag" | "comp") {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let out_file = shader_dir.join(format!("{}.spv", name));

        // Check if recompilation is needed
        let needs_compile = if let (Ok(src_meta), Ok(dst_meta)) =
            (std::fs::metadata(&path), std::fs::metadata(&out_file))
        {
            match (src_meta.modified(), dst_meta.modified()) {
                (Ok(src), Ok(dst)) => src > dst,
                _ => true,
            }
        } else {
            true // Compile if either file doesn't exist or we can't get metadata
        };

        if needs_compile {
            let status = Command::new(&glslc).arg(&path).arg("-o").arg(&out_file).status();

            match status {
                Ok(s) if s.success() => {
                    eprintln!("info: Compiled {} -> {}.spv", name, name);
                    compiled_count += 1;
                }
                Ok(s) => {
                    eprintln!(
                        "error: glslc failed for {:?} with exit code: {}",
                        path,
                        s.code().unwrap_or(-1)
                    );
                    panic!("Shader compilation failed");
                }
                Err(e) => {
                    eprintln!("error: Failed to run glslc for {:?}: {}", path, e);
                    panic!("Failed to execute shader compiler");
                }
            }
        } else {
            eprintln!("info: Shader {} is up to date", name);
        }
    }

    if compiled_count > 0 {
        eprintln!("info: Successfully compiled {} shader(s)", compiled_count);
    } else {
        eprintln!("info: All shaders are up to date");
    }
}
