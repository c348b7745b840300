// Integration tests for layered configuration loading

use anyhow::Result;
use std::fs;
use tempfile::TempDir;
use voip_session::config::VoipConfig;
use voip_session::segmentation::Policy;

#[test]
fn test_load_toml_with_env_override() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("voip.toml");
    fs::write(
        &path,
        r#"
[worker]
url = "wss://worker.example.com/"
api_key = "k-123"

[stt]
confidence_threshold = 0.7
body = '{"azure":{"credentials":{"subscriptionKey":"az-key"}}}'

[stt.message_handling]
policy = "SPLIT"
punctuation = ".!?;"

[ice]
stun_servers = "stun:a.example.com, stun:b.example.com"

[tts]
url = "https://tts.example.com/api/tts"

[tts.cache]
enable = true
max_entries = 20

[silence]
start_enable = true
"#,
    )?;

    std::env::set_var("VOIP_SILENCE__START_MS", "1800");
    let cfg = VoipConfig::load(path.to_str().unwrap())?;
    std::env::remove_var("VOIP_SILENCE__START_MS");

    assert_eq!(cfg.worker_endpoint()?.base_url, "wss://worker.example.com");
    assert_eq!(cfg.stt.confidence_threshold, 0.7);
    assert_eq!(cfg.stt.message_handling.policy, Policy::Split);
    assert_eq!(cfg.stt.message_handling.punctuation, ".!?;");
    assert_eq!(cfg.stt.message_handling.delimiter, ". ");
    assert_eq!(
        cfg.stt.body.as_ref().and_then(|b| b.pointer("/azure/credentials/subscriptionKey")),
        Some(&serde_json::json!("az-key"))
    );
    assert_eq!(cfg.ice.stun_servers.len(), 2);
    assert!(cfg.tts.cache.enable);
    assert_eq!(cfg.tts.cache.max_entries, 20);
    assert!(!cfg.tts.cache.prefetch);
    assert!(cfg.silence.start_enable);
    assert_eq!(cfg.silence.start_ms, 1800);
    assert_eq!(cfg.session.stop_timeout_ms, 100_000);

    cfg.validate()?;
    Ok(())
}

#[test]
fn test_load_missing_file_fails() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("does-not-exist.toml");
    assert!(VoipConfig::load(path.to_str().unwrap()).is_err());
}

#[test]
fn test_validate_rejects_zero_cache_size() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("voip.json");
    fs::write(
        &path,
        r#"{ "worker": { "url": "ws://localhost:5000" }, "tts": { "cache": { "enable": true, "max_entries": 0 } } }"#,
    )?;

    let cfg = VoipConfig::load(path.to_str().unwrap())?;
    assert!(cfg.validate().is_err());
    Ok(())
}
