//! Integration tests for configuration system

use std::time::Duration;

use vmdisplay_core::capture::StrategyKind;
use vmdisplay_core::config::{CaptureConfig, ConfigFile, IoMode, sample_config};
use vmdisplay_core::error::VmDisplayError;
use vmdisplay_core::formats::VideoFormat;
use tempfile::TempDir;

#[test]
fn test_config_file_defaults_convert() {
    let file = ConfigFile::default();
    let config = file.capture_config().unwrap();

    assert_eq!(config, CaptureConfig::default());
    assert_eq!(config.strategy, StrategyKind::Dumb);
    assert_eq!(config.io_mode, IoMode::Export);

    let info = file.video_info().unwrap();
    assert_eq!(info.format, VideoFormat::Bgrx);
    assert_eq!((info.width, info.height), (1920, 1080));
    assert_eq!((info.fps_n, info.fps_d), (60, 1));
}

#[test]
fn test_config_file_save_and_load() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("config.toml");

    let mut file = ConfigFile::default();
    file.display.dom = 2;
    file.display.pipe = 1;
    file.capture.strategy = "scanout".to_string();
    file.capture.poll_timeout_ms = 250;
    file.format.format = "RGBx".to_string();
    file.save_to(path.clone()).unwrap();

    let loaded = ConfigFile::load_from(path).unwrap();
    let config = loaded.capture_config().unwrap();
    assert_eq!(config.domain, 2);
    assert_eq!(config.pipe, 1);
    assert_eq!(config.strategy, StrategyKind::Scanout);
    assert_eq!(config.poll_policy().timeout, Some(Duration::from_millis(250)));
    assert_eq!(loaded.video_info().unwrap().format, VideoFormat::Rgbx);
}

#[test]
fn test_missing_file_gives_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let loaded = ConfigFile::load_from(temp_dir.path().join("absent.toml")).unwrap();
    assert_eq!(loaded.device.path, "/dev/dri/card0");
}

#[test]
fn test_partial_file_fills_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(&path, "[display]\npipe = 3\n").unwrap();

    let loaded = ConfigFile::load_from(path).unwrap();
    assert_eq!(loaded.display.pipe, 3);
    assert_eq!(loaded.display.dom, 0);
    assert_eq!(loaded.capture.poll_interval_ms, 5);
}

#[test]
fn test_malformed_file_is_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(&path, "[display\npipe = ").unwrap();

    let err = ConfigFile::load_from(path).unwrap_err();
    assert!(matches!(err, VmDisplayError::Config(_)));
}

#[test]
fn test_out_of_range_display_rejected() {
    let mut file = ConfigFile::default();
    file.display.dom = 5;
    assert!(file.capture_config().is_err());

    let mut file = ConfigFile::default();
    file.display.pipe = 9;
    assert!(file.capture_config().is_err());
}

#[test]
fn test_unknown_values_rejected() {
    let mut file = ConfigFile::default();
    file.capture.strategy = "mirror".to_string();
    assert!(file.capture_config().is_err());

    let mut file = ConfigFile::default();
    file.capture.io_mode = "shm".to_string();
    assert!(file.capture_config().is_err());

    let mut file = ConfigFile::default();
    file.format.framerate = "60/0".to_string();
    assert!(file.video_info().is_err());
}

#[test]
fn test_unsupported_format_accepted_in_file() {
    // Rejected when a frame is requested, not at load time
    let mut file = ConfigFile::default();
    file.format.format = "NV12".to_string();
    assert_eq!(file.video_info().unwrap().format, VideoFormat::Nv12);
}

#[test]
fn test_import_mode_warns() {
    let config = CaptureConfig::default().with_io_mode(IoMode::Import);
    let warnings = config.validate();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("import"));
    assert!(config.validate_strict().is_ok());
}

#[test]
fn test_busy_poll_warns() {
    let config = CaptureConfig::guest(0, 1)
        .with_strategy(StrategyKind::Scanout)
        .with_poll_interval(Duration::ZERO);
    assert!(config.validate().iter().any(|w| w.contains("0 ms")));
}

#[test]
fn test_boundary_dom_and_pipe_accepted() {
    assert!(CaptureConfig::guest(4, 4).validate_strict().is_ok());
    assert!(CaptureConfig::guest(0, 0).validate_strict().is_ok());
}

#[test]
fn test_sample_config_round_trips_to_defaults() {
    let file: ConfigFile = toml::from_str(&sample_config()).unwrap();
    assert_eq!(file.capture_config().unwrap(), CaptureConfig::default());
}
