#![cfg(feature = "cli")]

use std::process::Command;

/// Long frame with PM2.5 12, PM10 15, HCHO 30, TVOC 150, CO2 420.
const EXAMPLE_FRAME: &str =
    "aa000c000f001e009601a400dc025800040010000000000000000000000000000000000003680d0a";

fn am7link() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_am7link"));
    cmd.arg("--log-level").arg("error");
    cmd
}

#[test]
fn decode_example_frame_as_json() {
    let output = am7link()
        .arg("--format")
        .arg("json")
        .arg("decode")
        .arg(format!("0102{EXAMPLE_FRAME}"))
        .output()
        .expect("decode should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"co2\":420"));
    assert!(stdout.contains("\"pm25\":12"));
    assert!(stdout.contains("\"noise_bytes\":2"));
    assert!(stdout.contains("\"battery_level\":4"));
}

#[test]
fn decode_checksum_mismatch_exits_60() {
    let corrupted = EXAMPLE_FRAME.replacen("aa000c", "aa000d", 1);
    let output = am7link()
        .arg("--format")
        .arg("json")
        .arg("decode")
        .arg(corrupted)
        .output()
        .expect("decode should run");

    assert_eq!(output.status.code(), Some(60));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"checksum_mismatches\":1"));
}

#[test]
fn decode_invalid_hex_exits_60() {
    let output = am7link()
        .arg("decode")
        .arg("zz")
        .output()
        .expect("decode should run");

    assert_eq!(output.status.code(), Some(60));
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid hex"));
}

#[test]
fn request_prints_command() {
    let output = am7link()
        .arg("--format")
        .arg("pretty")
        .arg("request")
        .output()
        .expect("request should run");

    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        "55 CD 47 00 00 00 00 00 00 01 69 0D 0A"
    );
}

#[test]
fn version_prints_package_version() {
    let output = am7link()
        .arg("version")
        .output()
        .expect("version should run");

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn simulate_reports_connected_link() {
    let output = am7link()
        .arg("--format")
        .arg("json")
        .arg("simulate")
        .arg("--tick")
        .arg("20ms")
        .arg("--report-every")
        .arg("150ms")
        .arg("--count")
        .arg("4")
        .output()
        .expect("simulate should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.lines().count(), 4);
    assert!(stdout.contains("\"connected\":true"));
    assert!(stdout.contains("\"state\":\"polling\""));
}

#[test]
fn simulate_telemetry_announces_discovery() {
    let output = am7link()
        .arg("simulate")
        .arg("--telemetry")
        .arg("--device-id")
        .arg("lab")
        .arg("--tick")
        .arg("20ms")
        .arg("--report-every")
        .arg("200ms")
        .arg("--count")
        .arg("3")
        .output()
        .expect("simulate should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("homeassistant/sensor/lab_co2/config (retained)"));
    assert!(stdout.contains("\"model\":\"AM7 Gateway\""));
    assert!(stdout.contains("am7/lab/state {"));
}

#[cfg(not(feature = "serial"))]
#[test]
fn run_without_serial_backend_is_usage_error() {
    let output = am7link().arg("run").output().expect("run should start");
    assert_eq!(output.status.code(), Some(64));
}
