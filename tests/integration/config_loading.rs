//! Layered configuration against a temporary workspace.

use super::test_utils::ENV_MUTEX;
use std::path::PathBuf;
use tempfile::TempDir;
use trellis::config::{ConfigLoader, TrellisConfig};

fn write_workspace_config(dir: &TempDir, name: &str, content: &str) {
    let config_dir = dir.path().join("config");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(config_dir.join(name), content).unwrap();
}

#[test]
fn test_env_file_overrides_base_file() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let dir = TempDir::new().unwrap();
    write_workspace_config(&dir, "config.toml", "[storage]\nroot = \"base\"\n");
    write_workspace_config(&dir, "staging.toml", "[storage]\nroot = \"staged\"\n");

    std::env::set_var("TRELLIS_ENV", "staging");
    let config = ConfigLoader::load(dir.path());
    std::env::remove_var("TRELLIS_ENV");

    assert_eq!(config.unwrap().storage.root, PathBuf::from("staged"));
}

#[test]
fn test_environment_variables_override_files() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let dir = TempDir::new().unwrap();
    write_workspace_config(&dir, "config.toml", "[node_types.user]\ntitle = \"People\"\n");

    std::env::set_var("TRELLIS__NODE_TYPES__USER__TITLE", "Crew");
    let config = ConfigLoader::load(dir.path());
    std::env::remove_var("TRELLIS__NODE_TYPES__USER__TITLE");

    assert_eq!(config.unwrap().node_types.user.title, "Crew");
}

#[test]
fn test_invalid_workspace_config_is_rejected() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let dir = TempDir::new().unwrap();
    write_workspace_config(&dir, "config.toml", "[logging]\noutput = \"printer\"\n");

    let err = TrellisConfig::load_validated(dir.path(), None).unwrap_err();
    assert!(err.to_string().contains("Invalid log output"));
}
