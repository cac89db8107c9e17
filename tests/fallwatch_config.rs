use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use fall_watch::config::FallWatchConfig;
use fall_watch::SourceSpec;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "FALLWATCH_CONFIG",
        "FALLWATCH_MODEL_PATH",
        "FALLWATCH_MIN_CONFIDENCE",
        "FALLWATCH_SITTING_SECS",
        "FALLWATCH_FALLING_SECS",
        "FALLWATCH_NOTIFY_ENDPOINT",
        "FALLWATCH_SNAPSHOT_DIR",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");
    file
}

#[test]
fn defaults_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = FallWatchConfig::load().expect("load config");

    assert_eq!(cfg.model_path, PathBuf::from("model/best_model.onnx"));
    assert_eq!(cfg.min_confidence, 0.5);
    assert_eq!(cfg.sitting_threshold, Duration::from_secs(300));
    assert_eq!(cfg.falling_threshold, Duration::from_secs(60));
    assert_eq!(cfg.notify.endpoint, "https://notify-api.line.me/api/notify");
    assert_eq!(cfg.notify.timeout, Duration::from_secs(10));
    assert_eq!(cfg.snapshot_dir, PathBuf::from("images"));
    assert_eq!(cfg.capture.target_fps, 10);
    assert_eq!(
        cfg.camera(1).unwrap(),
        &SourceSpec::Device("/dev/video0".to_string())
    );
    assert_eq!(
        cfg.camera(2).unwrap(),
        &SourceSpec::File("test/Human Fall Detection Sample.mp4".to_string())
    );
    assert!(cfg.camera(0).is_err());
    assert!(cfg.camera(3).is_err());
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r#"{
            "model_path": "models/posture.onnx",
            "min_confidence": 0.6,
            "thresholds": {
                "sitting_secs": 600,
                "falling_secs": 30
            },
            "notify": {
                "endpoint": "http://127.0.0.1:9000/notify",
                "timeout_ms": 2500
            },
            "snapshots": {
                "dir": "/var/lib/fallwatch/images"
            },
            "capture": {
                "target_fps": 5,
                "width": 1280,
                "height": 720
            },
            "cameras": ["device:/dev/video2", "clips/hallway.mp4"]
        }"#,
    );

    std::env::set_var("FALLWATCH_CONFIG", file.path());
    std::env::set_var("FALLWATCH_FALLING_SECS", "45");
    std::env::set_var("FALLWATCH_SNAPSHOT_DIR", "/tmp/falls");

    let cfg = FallWatchConfig::load().expect("load config");

    assert_eq!(cfg.model_path, PathBuf::from("models/posture.onnx"));
    assert_eq!(cfg.min_confidence, 0.6);
    assert_eq!(cfg.sitting_threshold, Duration::from_secs(600));
    assert_eq!(cfg.falling_threshold, Duration::from_secs(45));
    assert_eq!(cfg.notify.endpoint, "http://127.0.0.1:9000/notify");
    assert_eq!(cfg.notify.timeout, Duration::from_millis(2500));
    assert_eq!(cfg.snapshot_dir, PathBuf::from("/tmp/falls"));
    assert_eq!(cfg.capture.target_fps, 5);
    assert_eq!(cfg.capture.width, 1280);
    assert_eq!(cfg.capture.height, 720);
    assert_eq!(cfg.cameras.len(), 2);
    assert_eq!(
        cfg.camera(2).unwrap(),
        &SourceSpec::File("clips/hallway.mp4".to_string())
    );

    let debounce = cfg.debounce_settings();
    assert_eq!(debounce.falling_threshold, Duration::from_secs(45));
    assert_eq!(debounce.min_confidence, 0.6);

    clear_env();
}

#[test]
fn rejects_invalid_settings() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("FALLWATCH_MIN_CONFIDENCE", "1.5");
    assert!(FallWatchConfig::load().is_err());
    clear_env();

    std::env::set_var("FALLWATCH_SITTING_SECS", "0");
    assert!(FallWatchConfig::load().is_err());
    clear_env();

    std::env::set_var("FALLWATCH_FALLING_SECS", "soon");
    assert!(FallWatchConfig::load().is_err());
    clear_env();

    std::env::set_var("FALLWATCH_NOTIFY_ENDPOINT", "ftp://example.com/notify");
    assert!(FallWatchConfig::load().is_err());
    clear_env();

    let empty_cameras = write_config(r#"{ "cameras": [] }"#);
    std::env::set_var("FALLWATCH_CONFIG", empty_cameras.path());
    assert!(FallWatchConfig::load().is_err());
    clear_env();

    let malformed = write_config("{ not json");
    std::env::set_var("FALLWATCH_CONFIG", malformed.path());
    assert!(FallWatchConfig::load().is_err());
    clear_env();
}
