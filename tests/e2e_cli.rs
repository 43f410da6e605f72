//! CLI end-to-end tests
//!
//! Tests for the tagforged command-line interface. Conversions run against
//! a small shell script standing in for ffmpeg, so they need a unix shell
//! but not a real ffmpeg install.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::tempdir;

/// Get a command for the tagforged binary
#[allow(deprecated)]
fn tagforged_cmd() -> Command {
    Command::cargo_bin("tagforged").unwrap()
}

/// Write a config file pointing `tools.ffmpeg_path` at `ffmpeg`.
fn write_config(dir: &Path, ffmpeg: &Path) -> PathBuf {
    let config_file = dir.join("config.toml");
    fs::write(
        &config_file,
        format!(
            r#"
[tools]
ffmpeg_path = "{}"

[queue]
poll_interval_ms = 10
"#,
            ffmpeg.display()
        ),
    )
    .unwrap();
    config_file
}

/// Install a fake ffmpeg that answers `-version` and otherwise runs `body`
/// with `$last` set to the output path.
#[cfg(unix)]
fn fake_ffmpeg(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("ffmpeg");
    fs::write(
        &path,
        format!(
            "#!/bin/sh\n\
             if [ \"$1\" = \"-version\" ]; then echo \"ffmpeg version 6.1-fake\"; exit 0; fi\n\
             for last; do :; done\n\
             {body}\n"
        ),
    )
    .unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[test]
fn test_cli_no_args_shows_help() {
    let mut cmd = tagforged_cmd();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_help_flag() {
    let mut cmd = tagforged_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("tagforged"))
        .stdout(predicate::str::contains("convert"));
}

#[test]
fn test_cli_version_flag() {
    let mut cmd = tagforged_cmd();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("tagforged"));
}

#[test]
fn test_cli_convert_help() {
    let mut cmd = tagforged_cmd();
    cmd.args(["convert", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--format"))
        .stdout(predicate::str::contains("--delete-source"));
}

#[test]
fn test_cli_convert_requires_format() {
    let mut cmd = tagforged_cmd();
    cmd.args(["convert", "a.wav", "--output-dir", "/tmp"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--format"));
}

#[test]
fn test_cli_formats_lists_codec_settings() {
    let mut cmd = tagforged_cmd();
    cmd.arg("formats")
        .assert()
        .success()
        .stdout(predicate::str::contains("mp3 (lossy)"))
        .stdout(predicate::str::contains("flac (lossless)"))
        .stdout(predicate::str::contains("libmp3lame -b:a 192k"));
}

#[test]
fn test_cli_check_tools_command() {
    let mut cmd = tagforged_cmd();
    cmd.arg("check-tools")
        .assert()
        .success()
        .stdout(predicate::str::contains("ffmpeg"));
}

#[test]
fn test_cli_validate_without_config_uses_defaults() {
    let temp = tempdir().unwrap();
    let mut cmd = tagforged_cmd();
    cmd.current_dir(temp.path())
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("using defaults"))
        .stdout(predicate::str::contains("Poll interval: 250 ms"));
}

#[test]
fn test_cli_validate_good_config() {
    let temp = tempdir().unwrap();
    let config_file = temp.path().join("config.toml");
    fs::write(
        &config_file,
        r#"
[queue]
poll_interval_ms = 100
job_timeout_secs = 600
history_limit = 50
"#,
    )
    .unwrap();

    let mut cmd = tagforged_cmd();
    cmd.arg("validate")
        .arg(&config_file)
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"))
        .stdout(predicate::str::contains("Job timeout: 600 s"))
        .stdout(predicate::str::contains("History limit: 50"));
}

#[test]
fn test_cli_validate_rejects_bad_config() {
    let temp = tempdir().unwrap();
    let config_file = temp.path().join("config.toml");
    fs::write(
        &config_file,
        r#"
[queue]
progress_ceiling = 150.0
"#,
    )
    .unwrap();

    let mut cmd = tagforged_cmd();
    cmd.arg("validate")
        .arg(&config_file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("progress_ceiling"));
}

#[test]
fn test_cli_convert_nonexistent_file() {
    let temp = tempdir().unwrap();
    let mut cmd = tagforged_cmd();
    cmd.current_dir(temp.path())
        .args(["convert", "/nonexistent/path/track.wav", "--format", "mp3"])
        .arg("--output-dir")
        .arg(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn test_cli_convert_unsupported_format() {
    let temp = tempdir().unwrap();
    let source = temp.path().join("track.wav");
    fs::write(&source, b"RIFF").unwrap();

    let mut cmd = tagforged_cmd();
    cmd.current_dir(temp.path())
        .arg("convert")
        .arg(&source)
        .args(["--format", "aiff", "--output-dir"])
        .arg(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unsupported format"));
}

#[cfg(unix)]
#[test]
fn test_cli_check_tools_reports_configured_version() {
    let temp = tempdir().unwrap();
    let ffmpeg = fake_ffmpeg(temp.path(), "exit 0");
    let config_file = write_config(temp.path(), &ffmpeg);

    let mut cmd = tagforged_cmd();
    cmd.arg("--config")
        .arg(&config_file)
        .arg("check-tools")
        .assert()
        .success()
        .stdout(predicate::str::contains("ffmpeg version 6.1-fake"))
        .stdout(predicate::str::contains("All required tools are available"));
}

#[cfg(unix)]
#[test]
fn test_cli_convert_with_fake_ffmpeg() {
    let temp = tempdir().unwrap();
    let ffmpeg = fake_ffmpeg(temp.path(), "printf converted > \"$last\"; exit 0");
    let config_file = write_config(temp.path(), &ffmpeg);

    let input = temp.path().join("in");
    fs::create_dir_all(&input).unwrap();
    let first = input.join("one.wav");
    let second = input.join("two.flac");
    fs::write(&first, b"RIFF").unwrap();
    fs::write(&second, b"fLaC").unwrap();
    let output = temp.path().join("out");

    let mut cmd = tagforged_cmd();
    cmd.arg("--config")
        .arg(&config_file)
        .arg("convert")
        .arg(&first)
        .arg(&second)
        .args(["--format", "mp3", "--quality", "high", "--delete-source"])
        .arg("--output-dir")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("2 of 2 conversions completed"));

    assert_eq!(fs::read_to_string(output.join("one.mp3")).unwrap(), "converted");
    assert!(output.join("two.mp3").exists());
    assert!(!first.exists());
    assert!(!second.exists());
}

#[cfg(unix)]
#[test]
fn test_cli_convert_reports_tool_failure() {
    let temp = tempdir().unwrap();
    let ffmpeg = fake_ffmpeg(
        temp.path(),
        "printf partial > \"$last\"; echo 'Invalid data found when processing input' >&2; exit 1",
    );
    let config_file = write_config(temp.path(), &ffmpeg);

    let source = temp.path().join("broken.wav");
    fs::write(&source, b"not audio").unwrap();
    let output = temp.path().join("out");

    let mut cmd = tagforged_cmd();
    cmd.arg("--config")
        .arg(&config_file)
        .arg("convert")
        .arg(&source)
        .args(["--format", "ogg", "--delete-source"])
        .arg("--output-dir")
        .arg(&output)
        .assert()
        .failure()
        .stdout(predicate::str::contains("Invalid data found"))
        .stderr(predicate::str::contains("1 conversion(s) failed"));

    assert!(!output.join("broken.ogg").exists());
    assert!(source.exists());
}
