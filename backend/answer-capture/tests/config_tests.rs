use serial_test::serial;
use std::env;
use trainingground_capture::{config::CaptureConfig, services::ConnectivitySignal, SessionDeps};

const VARS: [&str; 5] = [
    "CAPTURE__AUTOSAVE__DEBOUNCE_MS",
    "CAPTURE__RETRY__MAX_ATTEMPTS",
    "CAPTURE__SUBMISSION__URL",
    "CAPTURE__STORAGE__KEY_PREFIX",
    "CAPTURE__CONNECTIVITY__HEALTH_URL",
];

fn clear_vars() {
    for var in VARS {
        env::remove_var(var);
    }
}

#[test]
#[serial]
fn environment_overrides_defaults() {
    clear_vars();
    env::set_var("CAPTURE__AUTOSAVE__DEBOUNCE_MS", "250");
    env::set_var("CAPTURE__RETRY__MAX_ATTEMPTS", "5");
    env::set_var("CAPTURE__SUBMISSION__URL", "https://quiz.example.com/api/submissions");

    let config = CaptureConfig::load().unwrap();
    clear_vars();

    assert_eq!(config.autosave.debounce_ms, 250);
    assert_eq!(config.autosave.interval_ms, 30_000);
    assert_eq!(config.retry.max_attempts, 5);
    assert_eq!(
        config.submission.endpoint_url().unwrap().as_str(),
        "https://quiz.example.com/api/submissions"
    );
}

#[test]
#[serial]
fn invalid_values_are_rejected_on_load() {
    clear_vars();
    env::set_var("CAPTURE__RETRY__MAX_ATTEMPTS", "0");

    let result = CaptureConfig::load();
    clear_vars();

    assert!(result.is_err());
}

#[test]
#[serial]
fn bad_health_url_is_rejected() {
    clear_vars();
    env::set_var("CAPTURE__CONNECTIVITY__HEALTH_URL", "not a url");

    let result = CaptureConfig::load();
    clear_vars();

    assert!(result.is_err());
}

#[tokio::test]
#[serial]
async fn deps_require_a_submission_url() {
    clear_vars();
    let config = CaptureConfig::load().unwrap();
    assert!(SessionDeps::from_config(&config).is_err());

    let mut config = config;
    config.submission.url = Some("http://127.0.0.1:9/submit".to_string());
    let deps = SessionDeps::from_config(&config).unwrap();
    assert!(deps.connectivity.is_online());
}
