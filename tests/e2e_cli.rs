//! CLI end-to-end tests
//!
//! Tests for the trackmix command-line interface. Commands that need
//! mkvmerge run against a stand-in shell script.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::tempdir;

/// Get a command for the trackmix binary
#[allow(deprecated)]
fn trackmix_cmd(cwd: &Path) -> Command {
    let mut cmd = Command::cargo_bin("trackmix").unwrap();
    cmd.current_dir(cwd).env_remove("RUST_LOG");
    cmd
}

fn write_config(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join("config.toml");
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_cli_no_args_shows_help() {
    let temp = tempdir().unwrap();
    trackmix_cmd(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_help_flag() {
    let temp = tempdir().unwrap();
    trackmix_cmd(temp.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("trackmix"))
        .stdout(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_version_flag() {
    let temp = tempdir().unwrap();
    trackmix_cmd(temp.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("trackmix"));
}

#[test]
fn test_cli_version_command() {
    let temp = tempdir().unwrap();
    trackmix_cmd(temp.path())
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(format!(
            "trackmix {}",
            env!("CARGO_PKG_VERSION")
        )));
}

#[test]
fn test_cli_check_tools_command() {
    let temp = tempdir().unwrap();
    trackmix_cmd(temp.path())
        .arg("check-tools")
        .assert()
        .success()
        .stdout(predicate::str::contains("ffprobe"))
        .stdout(predicate::str::contains("mkvmerge"));
}

#[test]
fn test_cli_mix_help_describes_track_specs() {
    let temp = tempdir().unwrap();
    trackmix_cmd(temp.path())
        .args(["mix", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("PATH:ID"));
}

#[test]
fn test_cli_probe_nonexistent_file() {
    let temp = tempdir().unwrap();
    trackmix_cmd(temp.path())
        .args(["probe", "/nonexistent/path/movie.mkv"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("file not found"));
}

#[test]
fn test_cli_mix_rejects_malformed_spec() {
    let temp = tempdir().unwrap();
    trackmix_cmd(temp.path())
        .args(["mix", "-o", "out.mkv", "--video", "movie.mkv"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected PATH:ID"));
}

#[test]
fn test_cli_mix_missing_source() {
    let temp = tempdir().unwrap();
    trackmix_cmd(temp.path())
        .args(["mix", "-o", "out.mkv", "--audio", "/nonexistent/a.mka:0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("file not found"));
}

#[test]
fn test_cli_validate_config() {
    let temp = tempdir().unwrap();
    let config = write_config(
        temp.path(),
        r#"
[queue]
max_concurrent_mix_jobs = 3
job_timeout_secs = 0

[mix.default_languages]
audio = "jpn"
"#,
    );

    trackmix_cmd(temp.path())
        .arg("validate")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"))
        .stdout(predicate::str::contains("Mix workers: 3"))
        .stdout(predicate::str::contains("Job timeout: none"))
        .stdout(predicate::str::contains("Default audio language: jpn"));
}

#[test]
fn test_cli_validate_rejects_zero_workers() {
    let temp = tempdir().unwrap();
    let config = write_config(temp.path(), "[queue]\nmax_concurrent_mix_jobs = 0\n");

    trackmix_cmd(temp.path())
        .arg("validate")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_concurrent_mix_jobs"));
}

#[test]
fn test_cli_jobs_without_history() {
    let temp = tempdir().unwrap();
    trackmix_cmd(temp.path())
        .arg("jobs")
        .assert()
        .success()
        .stdout(predicate::str::contains("No job history configured"));
}

#[test]
fn test_cli_jobs_lists_persisted_history() {
    use std::sync::Arc;
    use tm_core::events::EventBus;
    use trackmix::{JobStore, MixInput};

    let temp = tempdir().unwrap();
    let state = temp.path().join("jobs.json");
    {
        let store = JobStore::open(&state, 100, Arc::new(EventBus::default())).unwrap();
        let input = MixInput::new("/m/a.mkv", tm_core::TrackKind::Audio).with_track("1");
        let id = store.create(PathBuf::from("/out/a.mkv"), vec![input]).id();
        store.mark_running(id).unwrap();
        store.mark_failed(id, "mux failed: boom").unwrap();
    }
    let config = write_config(
        temp.path(),
        &format!("[queue]\nstate_path = \"{}\"\n", state.display()),
    );

    trackmix_cmd(temp.path())
        .arg("--config")
        .arg(&config)
        .arg("jobs")
        .assert()
        .success()
        .stdout(predicate::str::contains("#1"))
        .stdout(predicate::str::contains("failed"))
        .stdout(predicate::str::contains("mux failed: boom"))
        .stdout(predicate::str::contains("1 jobs: 0 queued, 0 running, 0 success, 1 failed, 0 cancelled"));

    let output = trackmix_cmd(temp.path())
        .arg("--config")
        .arg(&config)
        .args(["jobs", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let records: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(records[0]["status"], "failed");
    assert_eq!(records[0]["job"]["outputPath"], "/out/a.mkv");
}

#[test]
fn test_cli_jobs_leaves_owned_history_alone() {
    use std::sync::Arc;
    use tm_core::events::EventBus;
    use trackmix::{JobStore, MixInput};

    let temp = tempdir().unwrap();
    let state = temp.path().join("jobs.json");
    let owner = JobStore::open(&state, 100, Arc::new(EventBus::default())).unwrap();
    let input = MixInput::new("/m/a.mkv", tm_core::TrackKind::Audio).with_track("1");
    let id = owner.create(PathBuf::from("/out/a.mkv"), vec![input]).id();
    owner.mark_running(id).unwrap();
    let before = fs::read_to_string(&state).unwrap();

    let config = write_config(
        temp.path(),
        &format!("[queue]\nstate_path = \"{}\"\n", state.display()),
    );
    trackmix_cmd(temp.path())
        .arg("--config")
        .arg(&config)
        .arg("jobs")
        .assert()
        .success()
        .stdout(predicate::str::contains("running"))
        .stdout(predicate::str::contains("interrupted").not());

    assert_eq!(fs::read_to_string(&state).unwrap(), before);
    assert_eq!(owner.get(id).unwrap().status, trackmix::state::JobStatus::Running);
}

#[cfg(unix)]
mod with_fake_mkvmerge {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    /// Answers `-J` with a canned identify report; otherwise writes the `-o`
    /// file like a real mux.
    const FAKE_MKVMERGE: &str = r#"#!/bin/sh
if [ "$1" = "-J" ]; then
cat <<'JSON'
{
  "container": { "recognized": true, "supported": true, "type": "Matroska" },
  "tracks": [
    { "id": 0, "type": "video", "codec": "HEVC/H.265/MPEG-H",
      "properties": { "pixel_dimensions": "1920x1080" } },
    { "id": 1, "type": "audio", "codec": "AAC",
      "properties": { "language": "eng", "audio_channels": 2 } },
    { "id": 2, "type": "subtitles", "codec": "SubRip/SRT",
      "properties": { "language": "jpn" } }
  ]
}
JSON
exit 0
fi
out=""
while [ $# -gt 0 ]; do
  if [ "$1" = "-o" ]; then out="$2"; shift; fi
  shift
done
printf 'muxed' > "$out"
exit 0
"#;

    struct Fixture {
        dir: tempfile::TempDir,
        config: PathBuf,
        source: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let mkvmerge = dir.path().join("mkvmerge");
        fs::write(&mkvmerge, FAKE_MKVMERGE).unwrap();
        fs::set_permissions(&mkvmerge, fs::Permissions::from_mode(0o755)).unwrap();

        let source = dir.path().join("ep01.mkv");
        fs::write(&source, b"not really media").unwrap();

        let config = write_config(
            dir.path(),
            &format!(
                "[tools]\nmkvmerge_path = \"{}\"\n\n[queue]\nstate_path = \"{}\"\n",
                mkvmerge.display(),
                dir.path().join("jobs.json").display()
            ),
        );
        Fixture {
            dir,
            config,
            source,
        }
    }

    #[test]
    fn test_cli_probe_lists_tracks() {
        let fx = fixture();
        trackmix_cmd(fx.dir.path())
            .arg("--config")
            .arg(&fx.config)
            .arg("probe")
            .arg(&fx.source)
            .assert()
            .success()
            .stdout(predicate::str::contains("Container: Matroska"))
            .stdout(predicate::str::contains("audio tracks: 1"))
            .stdout(predicate::str::contains("[1] AAC"))
            .stdout(predicate::str::contains("[2] SubRip/SRT"));
    }

    #[test]
    fn test_cli_probe_json_filtered_by_kind() {
        let fx = fixture();
        let output = trackmix_cmd(fx.dir.path())
            .arg("--config")
            .arg(&fx.config)
            .arg("probe")
            .arg(&fx.source)
            .args(["--kind", "subtitle", "--json"])
            .output()
            .unwrap();
        assert!(output.status.success());

        let probed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        let tracks = probed["tracks"].as_array().unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0]["trackId"], "2");
    }

    #[test]
    fn test_cli_mix_writes_output_and_history() {
        let fx = fixture();
        let output = fx.dir.path().join("out");

        trackmix_cmd(fx.dir.path())
            .arg("--config")
            .arg(&fx.config)
            .arg("mix")
            .arg("-o")
            .arg(&output)
            .arg("--video")
            .arg(format!("{}:0", fx.source.display()))
            .arg("--audio")
            .arg(format!("{}:1@ja", fx.source.display()))
            .assert()
            .success()
            .stdout(predicate::str::contains("Queued job #1"))
            .stdout(predicate::str::contains("wrote 2 tracks to"));

        let written = fx.dir.path().join("out.mkv");
        assert_eq!(fs::read(&written).unwrap(), b"muxed");

        trackmix_cmd(fx.dir.path())
            .arg("--config")
            .arg(&fx.config)
            .arg("jobs")
            .assert()
            .success()
            .stdout(predicate::str::contains("success"))
            .stdout(predicate::str::contains("out.mkv"));
    }

    #[test]
    fn test_cli_mix_rejects_track_under_wrong_kind() {
        let fx = fixture();
        trackmix_cmd(fx.dir.path())
            .arg("--config")
            .arg(&fx.config)
            .args(["mix", "-o", "out.mkv", "--video"])
            .arg(format!("{}:1", fx.source.display()))
            .assert()
            .failure()
            .stderr(predicate::str::contains("is audio, not video"));
    }

    #[test]
    fn test_cli_mix_rejects_unknown_track() {
        let fx = fixture();
        trackmix_cmd(fx.dir.path())
            .arg("--config")
            .arg(&fx.config)
            .args(["mix", "-o", "out.mkv", "--audio"])
            .arg(format!("{}:9", fx.source.display()))
            .assert()
            .failure()
            .stderr(predicate::str::contains("No track 9"));
    }
}
