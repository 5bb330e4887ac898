use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use camfilter::config::CamfilterConfig;
use camfilter::{EdgeThresholds, FilterMode};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "CAMFILTER_CONFIG",
        "CAMFILTER_DEVICE",
        "CAMFILTER_MODE",
        "CAMFILTER_THRESHOLD1",
        "CAMFILTER_THRESHOLD2",
        "CAMFILTER_CASCADE",
        "CAMFILTER_OUTPUT",
        "CAMFILTER_SNAPSHOT",
        "CAMFILTER_FRAME_DELAY_MS",
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
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r#"{
            "capture": {
                "device": "/dev/video2",
                "width": 800,
                "height": 600,
                "target_fps": 15,
                "frame_delay_ms": 50
            },
            "filter": {
                "mode": "edge-detect",
                "threshold1": 30,
                "threshold2": 90
            },
            "detector": {
                "cascade_path": "models/face.json",
                "scale_factor": 1.25,
                "min_neighbors": 3,
                "min_size": 40
            },
            "output": {
                "frame_path": "out/live.jpg",
                "snapshot_path": "out/snap.png"
            }
        }"#,
    );

    std::env::set_var("CAMFILTER_CONFIG", file.path());
    std::env::set_var("CAMFILTER_MODE", "gray");
    std::env::set_var("CAMFILTER_THRESHOLD2", "120");
    std::env::set_var("CAMFILTER_FRAME_DELAY_MS", "10");

    let cfg = CamfilterConfig::load().expect("load config");

    assert_eq!(cfg.capture.device, "/dev/video2");
    assert_eq!((cfg.capture.width, cfg.capture.height), (800, 600));
    assert_eq!(cfg.capture.target_fps, 15);
    assert_eq!(cfg.capture.frame_delay, Duration::from_millis(10));
    assert_eq!(cfg.filter.mode, FilterMode::Grayscale);
    assert_eq!(cfg.filter.thresholds, EdgeThresholds::new(30, 120));
    assert_eq!(
        cfg.detector.cascade_path,
        Some(PathBuf::from("models/face.json"))
    );
    assert_eq!(cfg.detect_params().scale_factor, 1.25);
    assert_eq!(cfg.detect_params().min_neighbors, 3);
    assert_eq!(cfg.detect_params().min_size, Some(40));
    assert_eq!(cfg.output.frame_path, PathBuf::from("out/live.jpg"));
    assert_eq!(cfg.output.snapshot_path, PathBuf::from("out/snap.png"));

    let source = cfg.source_config();
    assert_eq!(source.uri, "/dev/video2");
    assert_eq!(source.target_fps, 15);

    clear_env();
}

#[test]
fn explicit_path_wins_over_env_path() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let from_env = write_config(r#"{ "capture": { "device": "stub://env" } }"#);
    let explicit = write_config(r#"{ "capture": { "device": "stub://flag" } }"#);
    std::env::set_var("CAMFILTER_CONFIG", from_env.path());

    let cfg = CamfilterConfig::load_from(Some(explicit.path())).expect("load config");
    assert_eq!(cfg.capture.device, "stub://flag");

    clear_env();
}

#[test]
fn defaults_apply_without_a_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = CamfilterConfig::load().expect("load defaults");
    assert_eq!(cfg.capture.device, "/dev/video0");
    assert_eq!(cfg.filter.mode, FilterMode::None);
    assert_eq!(cfg.filter.thresholds, EdgeThresholds::new(100, 200));
    assert_eq!(cfg.detector.cascade_path, None);
    assert_eq!(cfg.detect_params().scale_factor, 1.1);
    assert_eq!(cfg.detect_params().min_neighbors, 5);
    assert_eq!(cfg.loop_settings(None).frame_delay, Duration::from_millis(30));

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("CAMFILTER_THRESHOLD1", "300");
    assert!(CamfilterConfig::load().is_err());
    clear_env();

    std::env::set_var("CAMFILTER_MODE", "sepia");
    assert!(CamfilterConfig::load().is_err());
    clear_env();

    // Face highlighting without a cascade model.
    std::env::set_var("CAMFILTER_MODE", "face");
    assert!(CamfilterConfig::load().is_err());
    std::env::set_var("CAMFILTER_CASCADE", "face.json");
    assert!(CamfilterConfig::load().is_ok());
    clear_env();

    let out_of_range = write_config(r#"{ "filter": { "threshold1": 256 } }"#);
    assert!(CamfilterConfig::load_from(Some(out_of_range.path())).is_err());

    let unknown_section = write_config(r#"{ "rtsp": { "url": "rtsp://camera" } }"#);
    assert!(CamfilterConfig::load_from(Some(unknown_section.path())).is_err());

    assert!(CamfilterConfig::load_from(Some(std::path::Path::new(
        "/nonexistent/camfilter.json"
    )))
    .is_err());

    clear_env();
}
