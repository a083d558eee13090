// build.rs - Build metadata and feature validation for pipeline-scada
//
// Exports the build environment consumed by `build_info` in src/lib.rs and
// rejects feature combinations that cannot work together.

use std::collections::HashSet;
use std::env;
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=Cargo.toml");
    println!("cargo:rerun-if-changed=build.rs");

    set_build_env_vars();

    let enabled_features = collect_enabled_features();

    if let Err(e) = validate_feature_dependencies(&enabled_features) {
        panic!("Feature validation failed: {}", e);
    }
}

/// Set build environment variables that `build_info` expects
fn set_build_env_vars() {
    println!(
        "cargo:rustc-env=SCADA_BUILD_TIMESTAMP={}",
        chrono::Utc::now().to_rfc3339()
    );

    let rustc = env::var("RUSTC").unwrap_or_else(|_| "rustc".to_string());
    let rustc_version = Command::new(rustc)
        .arg("--version")
        .output()
        .ok()
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    println!("cargo:rustc-env=SCADA_RUSTC_VERSION={}", rustc_version);

    let target = env::var("TARGET").unwrap_or_else(|_| "unknown".to_string());
    println!("cargo:rustc-env=SCADA_TARGET={}", target);

    let profile = env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());
    println!("cargo:rustc-env=SCADA_PROFILE={}", profile);

    // Git hash is optional; outside a checkout it is simply left unset
    if let Ok(output) = Command::new("git").args(["rev-parse", "HEAD"]).output() {
        if output.status.success() {
            if let Ok(git_hash) = String::from_utf8(output.stdout) {
                println!("cargo:rustc-env=SCADA_GIT_HASH={}", git_hash.trim());
            }
        }
    }
}

/// Collect all enabled feature flags from environment variables
fn collect_enabled_features() -> HashSet<String> {
    env::vars()
        .filter_map(|(key, _)| {
            key.strip_prefix("CARGO_FEATURE_")
                .map(|name| name.to_lowercase().replace('_', "-"))
        })
        .collect()
}

/// Check feature dependencies
fn validate_feature_dependencies(features: &HashSet<String>) -> Result<(), String> {
    let dependencies = [("metrics", vec!["web"])];

    for (feature, deps) in dependencies {
        if features.contains(feature) {
            for dep in deps {
                if !features.contains(dep) {
                    return Err(format!(
                        "Feature '{}' requires '{}' to be enabled",
                        feature, dep
                    ));
                }
            }
        }
    }

    Ok(())
}
