use super::AppConfig;
use clap::Parser;

fn base_config() -> AppConfig {
    AppConfig::parse_from(["test-app"])
}

#[test]
fn defaults_are_valid() {
    let mut cfg = base_config();
    assert!(cfg.validate().is_ok());
}

#[test]
fn rejects_block_seconds_out_of_bounds() {
    let mut cfg = AppConfig::parse_from(["test-app", "--block-seconds", "1"]);
    assert!(cfg.validate().is_err());

    let mut cfg = AppConfig::parse_from(["test-app", "--block-seconds", "11"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn accepts_block_seconds_bounds() {
    let mut cfg = AppConfig::parse_from(["test-app", "--block-seconds", "2"]);
    assert!(cfg.validate().is_ok());

    let mut cfg = AppConfig::parse_from(["test-app", "--block-seconds", "10"]);
    assert!(cfg.validate().is_ok());
}

#[test]
fn rejects_negative_gain() {
    let mut cfg = AppConfig::parse_from(["test-app", "--gain=-0.5"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_gain_above_ceiling() {
    let mut cfg = AppConfig::parse_from(["test-app", "--gain", "9.0"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_speed_out_of_bounds() {
    let mut cfg = AppConfig::parse_from(["test-app", "--speed", "0.0"]);
    assert!(cfg.validate().is_err());

    let mut cfg = AppConfig::parse_from(["test-app", "--speed", "5.0"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_sample_rate_out_of_bounds() {
    let mut cfg = AppConfig::parse_from(["test-app", "--sample-rate", "4000"]);
    assert!(cfg.validate().is_err());

    let mut cfg = AppConfig::parse_from(["test-app", "--sample-rate", "200000"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_channel_capacity_out_of_bounds() {
    let mut cfg = AppConfig::parse_from(["test-app", "--channel-capacity", "4"]);
    assert!(cfg.validate().is_err());

    let mut cfg = AppConfig::parse_from(["test-app", "--channel-capacity", "2048"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_zero_run_seconds() {
    let mut cfg = AppConfig::parse_from(["test-app", "--run-seconds", "0"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_device_name_with_control_chars() {
    let mut cfg = base_config();
    cfg.input_device = Some("usb\nmic".to_string());
    assert!(cfg.validate().is_err());

    let mut cfg = base_config();
    cfg.output_device = Some("  ".to_string());
    assert!(cfg.validate().is_err());
}

#[test]
fn run_params_snapshot_matches_flags() {
    let cfg = AppConfig::parse_from([
        "test-app",
        "--gain",
        "1.5",
        "--speed",
        "0.8",
        "--block-seconds",
        "7",
    ]);
    let params = cfg.run_params();
    assert_eq!(params.gain, 1.5);
    assert_eq!(params.speed, 0.8);
    assert_eq!(params.block_seconds, 7);
}
