use assert_cmd::Command;
use std::path::Path;
use tempfile::tempdir;

const CALLER: &str = "a00000006203010c01";
const KEY: &str = "00112233445566778899aabbccddeeff";
const WRONG_KEY: &str = "ffeeddccbbaa99887766554433221100";
const VALUE: &str = "0f0e0d0c0b0a09080706050403020100";

fn weaverd(state: &Path) -> Command {
    let mut cmd = Command::cargo_bin("weaverd").expect("weaverd binary");
    cmd.env_remove("WEAVER_CONFIG")
        .arg("--state")
        .arg(state)
        .arg("--authorized-caller")
        .arg(CALLER)
        .arg("--caller")
        .arg(CALLER);
    cmd
}

fn json_output(cmd: &mut Command) -> serde_json::Value {
    let output = cmd.output().expect("run weaverd");
    assert!(
        output.status.success(),
        "weaverd failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("json report")
}

#[test]
fn info_reports_geometry() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let report = json_output(weaverd(&temp.path().join("slots.img")).arg("info"));
    assert_eq!(report["slot_count"], 64);
    assert_eq!(report["key_bytes"], 16);
    assert_eq!(report["value_bytes"], 16);
    Ok(())
}

#[test]
fn write_then_read_round_trips_value() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let state = temp.path().join("slots.img");

    json_output(weaverd(&state).args(["write", "--slot", "3", "--key", KEY, "--value", VALUE]));
    let report = json_output(weaverd(&state).args(["read", "--slot", "3", "--key", KEY]));
    assert_eq!(report["status"], "success");
    assert_eq!(report["code"], 0);
    assert_eq!(report["payload"], VALUE);
    Ok(())
}

#[test]
fn lockout_persists_between_invocations() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let state = temp.path().join("slots.img");
    json_output(weaverd(&state).args(["write", "--slot", "0", "--key", KEY, "--value", VALUE]));

    for _ in 0..4 {
        let report = json_output(weaverd(&state).args(["read", "--slot", "0", "--key", WRONG_KEY]));
        assert_eq!(report["status"], "wrong_key");
    }
    let fifth = json_output(weaverd(&state).args(["read", "--slot", "0", "--key", WRONG_KEY]));
    assert_eq!(fifth["status"], "backed_off");
    assert_eq!(fifth["remaining_secs"], 30);

    let correct = json_output(weaverd(&state).args(["read", "--slot", "0", "--key", KEY]));
    assert_eq!(correct["status"], "backed_off");
    assert_ne!(correct["payload"], VALUE);
    assert_eq!(correct["payload"].as_str().map(str::len), Some(32));

    let status = json_output(weaverd(&state).args(["status", "--slot", "0"]));
    assert_eq!(status["failure_count"], 5);

    json_output(weaverd(&state).arg("erase-all"));
    let status = json_output(weaverd(&state).args(["status", "--slot", "0"]));
    assert_eq!(status["failure_count"], 0);
    assert_eq!(status["remaining_backoff"], 0);
    Ok(())
}

#[test]
fn unauthorized_caller_is_refused() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    Command::cargo_bin("weaverd")?
        .env_remove("WEAVER_CONFIG")
        .arg("--state")
        .arg(temp.path().join("slots.img"))
        .arg("--authorized-caller")
        .arg(CALLER)
        .arg("--caller")
        .arg("a000000062")
        .arg("info")
        .assert()
        .failure()
        .stderr(predicates::str::contains("not authorized"));
    Ok(())
}

#[test]
fn invalid_slot_id_fails() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    weaverd(&temp.path().join("slots.img"))
        .args(["read", "--slot", "64", "--key", KEY])
        .assert()
        .failure()
        .stderr(predicates::str::contains("invalid slot id 64"));
    Ok(())
}

#[test]
fn config_file_supplies_settings() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let config_path = temp.path().join("weaver.json");
    let config = serde_json::json!({
        "state_path": temp.path().join("from-config.img"),
        "authorized_caller": CALLER,
    });
    std::fs::write(&config_path, serde_json::to_vec(&config)?)?;

    let mut cmd = Command::cargo_bin("weaverd")?;
    cmd.arg("--config")
        .arg(&config_path)
        .arg("--caller")
        .arg(CALLER)
        .args(["write", "--slot", "1", "--key", KEY, "--value", VALUE]);
    json_output(&mut cmd);
    assert!(temp.path().join("from-config.img").exists());
    Ok(())
}
