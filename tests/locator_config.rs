use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use grid_locator::config::LocatorConfig;
use grid_locator::CropRegion;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "GRIDLOC_CONFIG",
        "GRIDLOC_MQTT_BROKER_ADDR",
        "GRIDLOC_FEED_TOPIC",
        "GRIDLOC_DETECT_ENDPOINT",
        "GRIDLOC_DETECT_PROMPT",
        "GRIDLOC_DETECT_TIMEOUT_SECS",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_json_config_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "feed": {
            "broker_addr": "mqtt.lab:1883",
            "topic": "lab/overhead/compressed",
            "client_id": "gridloc-lab"
        },
        "detector": {
            "endpoint": "http://detector.lab:8081/predict",
            "timeout_secs": 20,
            "jpeg_quality": 75
        },
        "grid": {
            "rows": 3,
            "cols": 3,
            "cell_width": 100.0,
            "cell_height": 100.0,
            "image_width": 300,
            "image_height": 300
        },
        "crop": { "left": 10, "top": 20, "right": 310, "bottom": 320 }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("GRIDLOC_CONFIG", file.path());
    std::env::set_var("GRIDLOC_DETECT_PROMPT", "red cube");
    std::env::set_var("GRIDLOC_FEED_TOPIC", "lab/overhead/raw");

    let cfg = LocatorConfig::load().expect("load config");
    assert_eq!(cfg.feed.broker_addr, "mqtt.lab:1883");
    assert_eq!(cfg.feed.topic, "lab/overhead/raw");
    assert_eq!(cfg.feed.client_id, "gridloc-lab");
    assert_eq!(cfg.detector.endpoint, "http://detector.lab:8081/predict");
    assert_eq!(cfg.detector.prompt, "red cube");
    assert_eq!(cfg.detector.timeout, Some(Duration::from_secs(20)));
    assert_eq!(cfg.detector.jpeg_quality, 75);
    assert_eq!((cfg.grid.rows, cfg.grid.cols), (3, 3));
    assert_eq!(cfg.grid.image_width, 300);
    assert_eq!(
        cfg.crop,
        CropRegion {
            left: 10,
            top: 20,
            right: 310,
            bottom: 320
        }
    );

    clear_env();
}

#[test]
fn loads_toml_config() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    let toml = r#"
[feed]
broker_addr = "mqtts://broker.lab:8883"
use_tls = true

[detector]
prompt = "Turtlebot3 burger"

[grid]
cols = 6
"#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");
    std::env::set_var("GRIDLOC_CONFIG", file.path());

    let cfg = LocatorConfig::load().expect("load config");
    assert_eq!(cfg.feed.broker_addr, "mqtts://broker.lab:8883");
    assert!(cfg.feed.use_tls);
    assert_eq!(cfg.detector.prompt, "Turtlebot3 burger");
    assert_eq!(cfg.detector.timeout, None);
    assert_eq!(cfg.grid.cols, 6);
    assert_eq!(cfg.grid.rows, 4);

    clear_env();
}

#[test]
fn defaults_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = LocatorConfig::load().expect("load defaults");
    assert_eq!(cfg.detector.endpoint, "http://localhost:8081/predict");
    assert_eq!(cfg.detector.prompt, "Turtlebot3");
    assert_eq!(cfg.feed.topic, "camera/image_projected/compressed");
    assert_eq!((cfg.crop.width(), cfg.crop.height()), (610, 590));
}

#[test]
fn rejects_bad_timeout_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("GRIDLOC_DETECT_TIMEOUT_SECS", "soon");
    let err = LocatorConfig::load().unwrap_err();
    assert!(err.to_string().contains("GRIDLOC_DETECT_TIMEOUT_SECS"));

    std::env::set_var("GRIDLOC_DETECT_TIMEOUT_SECS", "0");
    let err = LocatorConfig::load().unwrap_err();
    assert!(err.to_string().contains("timeout"));

    clear_env();
}

#[test]
fn rejects_unknown_sections_and_bad_endpoints() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, br#"{"metrics": {}}"#).expect("write config");
    std::env::set_var("GRIDLOC_CONFIG", file.path());
    assert!(LocatorConfig::load().is_err());

    std::env::remove_var("GRIDLOC_CONFIG");
    std::env::set_var("GRIDLOC_DETECT_ENDPOINT", "not a url");
    assert!(LocatorConfig::load().is_err());

    clear_env();
}
