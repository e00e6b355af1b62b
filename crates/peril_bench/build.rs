use std::process::Command;

fn main() {
    // Rerun only when HEAD moves.
    println!("cargo:rerun-if-changed=../../.git/HEAD");
    println!("cargo:rerun-if-changed=../../.git/refs");

    let git = |args: &[&str]| Command::new("git").args(args).output().ok();

    let sha = git(&["rev-parse", "--short=12", "HEAD"])
        .filter(|o| o.status.success())
        .map_or_else(
            || "unknown".to_string(),
            |o| String::from_utf8_lossy(&o.stdout).trim().to_string(),
        );

    // Unknown (no git, not a checkout) counts as dirty.
    let dirty = git(&["status", "--porcelain"])
        .filter(|o| o.status.success())
        .map_or(true, |o| !o.stdout.is_empty());

    println!("cargo:rustc-env=PERIL_GIT_SHA={sha}");
    println!("cargo:rustc-env=PERIL_GIT_DIRTY={dirty}");
}
