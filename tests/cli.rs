use std::process::{Command, Stdio};

use tempfile::tempdir;

#[test]
fn missing_profiles_file_exits_with_error() {
    let dir = tempdir().unwrap();
    let bin = env!("CARGO_BIN_EXE_brewdata-setup");

    let output = Command::new(bin)
        .current_dir(dir.path())
        .env_remove("DBT_PROFILES_DIR")
        .env_remove("RUST_LOG")
        .arg("--profiles_dir")
        .arg(dir.path())
        .stdin(Stdio::null())
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    let first = stderr.lines().next().unwrap_or_default();
    assert!(
        first.starts_with("Error: dbt profiles file not found at "),
        "unexpected stderr:\n{stderr}"
    );
    assert!(first.ends_with("profiles.yml"), "unexpected stderr:\n{stderr}");
}

#[test]
fn help_lists_the_setup_flags() {
    let output = Command::new(env!("CARGO_BIN_EXE_brewdata-setup"))
        .arg("--help")
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for flag in ["--url", "--download_path", "--stage_name", "--keep_zip", "--profiles_dir"] {
        assert!(stdout.contains(flag), "{flag} missing from help:\n{stdout}");
    }
}
