use std::process::Command;

/// Exposes `BUILD_TIMESTAMP` and `BUILD_GIT_SHA` to `logging::about`.
fn main() {
    let timestamp = command_output("date", &["-u", "+%Y-%m-%dT%H:%M:%SZ"]).or_else(|| {
        command_output(
            "powershell",
            &[
                "-Command",
                "(Get-Date).ToUniversalTime().ToString('yyyy-MM-ddTHH:mm:ssZ')",
            ],
        )
    });
    let git_sha = command_output("git", &["rev-parse", "--short", "HEAD"]);

    println!(
        "cargo:rustc-env=BUILD_TIMESTAMP={}",
        timestamp.as_deref().unwrap_or("unknown")
    );
    println!(
        "cargo:rustc-env=BUILD_GIT_SHA={}",
        git_sha.as_deref().unwrap_or("unknown")
    );
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=build.rs");
}

/// Trimmed stdout of a successful command.
fn command_output(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8(output.stdout).ok()?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}
