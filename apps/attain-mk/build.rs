// build.rs — Stamp git and build metadata into the attain-mk binary.
//
// Compile-time env vars:
//   ATTAIN_GIT_HASH   — short commit hash, "-dirty" suffixed, or "unknown"
//   ATTAIN_BUILD_DATE — YYYY-MM-DD

use std::process::Command;

fn stdout_of(exe: &str, args: &[&str]) -> Option<String> {
    let out = Command::new(exe).args(args).output().ok()?;
    if !out.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&out.stdout).trim().to_string())
}

fn main() {
    let mut hash =
        stdout_of("git", &["rev-parse", "--short", "HEAD"]).unwrap_or_else(|| "unknown".into());
    if stdout_of("git", &["status", "--porcelain"]).is_some_and(|s| !s.is_empty()) {
        hash.push_str("-dirty");
    }
    let date = stdout_of("date", &["+%Y-%m-%d"]).unwrap_or_else(|| "unknown".into());

    println!("cargo:rustc-env=ATTAIN_GIT_HASH={hash}");
    println!("cargo:rustc-env=ATTAIN_BUILD_DATE={date}");
    println!("cargo:rerun-if-changed=../../.git/HEAD");
    println!("cargo:rerun-if-changed=../../.git/refs/");
}
