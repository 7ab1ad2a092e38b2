use std::path::Path;
use std::process::{Command, Output};
use tempfile::tempdir;

fn thermo_ctl(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_thermo-ctl"))
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("Failed to run thermo-ctl")
}

fn write_settings(path: &Path, body: &str) {
    std::fs::write(path, body).expect("Failed to write settings");
}

fn audit_events(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .expect("audit log missing")
        .lines()
        .map(|line| {
            let entry: serde_json::Value = serde_json::from_str(line).expect("invalid audit line");
            entry["event_type"]
                .as_str()
                .expect("event_type missing")
                .to_string()
        })
        .collect()
}

#[test]
fn test_simulated_run_stops_cleanly() {
    let dir = tempdir().unwrap();
    let settings = dir.path().join("settings.json");
    let audit = dir.path().join("audit.jsonl");
    write_settings(
        &settings,
        r#"{
            "controllers": [
                {
                    "name": "fermenter",
                    "heat_output": {"identifier": "GPIO17", "friendly_name": "Heat belt"},
                    "cool_output": {"identifier": "GPIO27", "friendly_name": "Fridge"},
                    "cycle_time": 2,
                    "manual_duty_cycle": 50
                },
                {
                    "name": "kettle",
                    "heat_output": {"identifier": "GPIO5"},
                    "manual_duty_cycle": 100
                }
            ]
        }"#,
    );

    let output = thermo_ctl(&[
        "--config",
        settings.to_str().unwrap(),
        "--run-seconds",
        "1",
        "--audit-log",
        audit.to_str().unwrap(),
    ]);
    assert!(
        output.status.success(),
        "thermo-ctl failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let events = audit_events(&audit);
    assert_eq!(
        events.iter().filter(|e| *e == "controller_configured").count(),
        2
    );
    assert_eq!(
        events.iter().filter(|e| *e == "controller_stopped").count(),
        2
    );
    assert!(events.contains(&"system_start".to_string()));
    assert_eq!(events.last().map(String::as_str), Some("system_shutdown"));
    assert!(!events.contains(&"controller_fault".to_string()));
}

#[test]
fn test_rejected_manual_duty_is_audited() {
    let dir = tempdir().unwrap();
    let settings = dir.path().join("settings.json");
    let audit = dir.path().join("audit.jsonl");
    write_settings(
        &settings,
        r#"{"controllers":[{"name":"keg","cool_output":{"identifier":"GPIO6"},"manual_duty_cycle":-250}]}"#,
    );

    let output = thermo_ctl(&[
        "--config",
        settings.to_str().unwrap(),
        "--run-seconds",
        "0",
        "--audit-log",
        audit.to_str().unwrap(),
    ]);
    assert!(output.status.success());
    assert!(audit_events(&audit).contains(&"demand_rejected".to_string()));
}

#[test]
fn test_shared_output_is_refused() {
    let dir = tempdir().unwrap();
    let settings = dir.path().join("settings.json");
    write_settings(
        &settings,
        r#"{"controllers":[
            {"name":"a","heat_output":{"identifier":"GPIO17"}},
            {"name":"b","cool_output":{"identifier":"GPIO17"}}
        ]}"#,
    );

    let output = thermo_ctl(&["--config", settings.to_str().unwrap(), "--run-seconds", "1"]);
    assert!(!output.status.success());
}

#[test]
fn test_init_config_writes_example() {
    let dir = tempdir().unwrap();
    let settings = dir.path().join("etc/settings.json");

    let output = thermo_ctl(&["--config", settings.to_str().unwrap(), "--init-config"]);
    assert!(output.status.success());

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&settings).unwrap()).unwrap();
    let controllers = written["controllers"].as_array().unwrap();
    assert_eq!(controllers.len(), 1);
    assert_eq!(controllers[0]["heat_output"]["identifier"], "GPIO17");
}

#[test]
fn test_missing_config_fails() {
    let output = thermo_ctl(&["--run-seconds", "1"]);
    assert!(!output.status.success());
}

#[test]
fn test_help_exits_successfully() {
    let output = thermo_ctl(&["--help"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("--config"));
}
