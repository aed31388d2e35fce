//! Configuration stack: precedence, env mapping, override reporting,
//! and `BEADS_DIR` worktree isolation.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use beads::config::{self, Config, Metadata, Source};
use tempfile::TempDir;

// Environment mutation must not interleave across test threads.
static ENV_LOCK: Mutex<()> = Mutex::new(());

fn env_guard() -> MutexGuard<'static, ()> {
    ENV_LOCK
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn workspace(config_yaml: &str) -> (TempDir, PathBuf) {
    let temp = TempDir::new().expect("tempdir");
    let dir = temp.path().join(".beads");
    fs::create_dir_all(&dir).expect("create .beads");
    fs::write(dir.join("config.yaml"), config_yaml).expect("write config");
    (temp, dir)
}

#[test]
fn full_precedence_chain() {
    let _guard = env_guard();
    env::remove_var("BD_SYNC_MODE");
    env::remove_var("BEADS_SYNC_MODE");

    let (_temp, dir) = workspace("sync:\n  mode: realtime\n");
    let mut config = Config::load(Some(&dir)).expect("load");

    // default < file
    assert_eq!(config.get_string("sync.mode").unwrap(), "realtime");
    assert_eq!(config.source_of("sync.mode"), Source::Config);
    assert_eq!(config.source_of("conflict.strategy"), Source::Default);

    // file < env
    env::set_var("BD_SYNC_MODE", "dolt-native");
    assert_eq!(config.get_string("sync.mode").unwrap(), "dolt-native");
    assert_eq!(config.source_of("sync.mode"), Source::Env);

    // env < flag
    config.set_flag("sync.mode", "git-portable");
    assert_eq!(config.get_string("sync.mode").unwrap(), "git-portable");
    assert_eq!(config.source_of("sync.mode"), Source::Flag);

    env::remove_var("BD_SYNC_MODE");
}

#[test]
fn local_yaml_overrides_team_yaml() {
    let _guard = env_guard();
    let (_temp, dir) = workspace("sync:\n  mode: realtime\nactor: team\n");
    fs::write(dir.join("config.local.yaml"), "actor: me\n").expect("write local");

    let config = Config::load(Some(&dir)).expect("load");
    assert_eq!(config.get_string("actor").unwrap(), "me");
    // Keys absent from the local file still come from the team file.
    assert_eq!(config.get_string("sync.mode").unwrap(), "realtime");
}

#[test]
fn legacy_env_prefix_is_honored() {
    let _guard = env_guard();
    let (_temp, dir) = workspace("");
    let config = Config::load(Some(&dir)).expect("load");

    env::set_var("BEADS_HIERARCHY_MAX_DEPTH", "5");
    assert_eq!(config.get_int("hierarchy.max-depth"), Some(5));
    assert_eq!(config.max_hierarchy_depth(), 5);
    env::remove_var("BEADS_HIERARCHY_MAX_DEPTH");

    // Primary prefix wins over legacy.
    env::set_var("BEADS_SYNC_MODE", "realtime");
    env::set_var("BD_SYNC_MODE", "git-portable");
    assert_eq!(config.get_string("sync.mode").unwrap(), "git-portable");
    env::remove_var("BEADS_SYNC_MODE");
    env::remove_var("BD_SYNC_MODE");
}

#[test]
fn overrides_report_names_every_shadowed_key() {
    let _guard = env_guard();
    let (_temp, dir) = workspace("sync:\n  mode: realtime\nactor: alice\n");
    let mut config = Config::load(Some(&dir)).expect("load");

    env::set_var("BD_ACTOR", "bob");
    config.set_flag("sync.mode", "git-portable");

    let overrides = config.overrides();
    assert_eq!(overrides.len(), 2);

    let actor = overrides.iter().find(|item| item.key == "actor").unwrap();
    assert_eq!(actor.overridden_by, Source::Env);
    assert_eq!(actor.effective_value, "bob");
    assert_eq!(actor.original_value.as_deref(), Some("alice"));

    let mode = overrides.iter().find(|item| item.key == "sync.mode").unwrap();
    assert_eq!(mode.overridden_by, Source::Flag);
    assert_eq!(mode.original_source, Source::Config);

    env::remove_var("BD_ACTOR");
}

#[test]
fn safe_writer_never_dumps_merged_view() {
    let (_temp, dir) = workspace(
        "# team defaults\nfuture_key: untouched\nsync:\n  mode: realtime\n",
    );
    let mut config = Config::load(Some(&dir)).expect("load");
    config
        .save_value("conflict.strategy", "ours")
        .expect("save");

    let written = fs::read_to_string(dir.join("config.yaml")).expect("read");
    assert!(written.contains("future_key: untouched"));
    assert!(written.contains("ours"));
    // Built-in defaults must not leak into the file.
    assert!(!written.contains("git-portable"));
    assert!(!written.contains("hierarchy"));
}

/// Invariant: with `BEADS_DIR` set, every config write lands under that
/// directory - a worktree-local test can never rewrite an ancestor's
/// production config.
#[test]
fn beads_dir_isolates_all_writes() {
    let _guard = env_guard();

    // "Production" repo with committed config.
    let production = TempDir::new().expect("tempdir");
    let production_beads = production.path().join(".beads");
    fs::create_dir_all(&production_beads).expect("create");
    fs::write(production_beads.join("config.yaml"), "actor: production\n").expect("write");
    Metadata::default().save(&production_beads).expect("save");
    let production_config = fs::read_to_string(production_beads.join("config.yaml")).unwrap();
    let production_metadata = fs::read_to_string(production_beads.join("metadata.json")).unwrap();

    // Isolated worktree.
    let isolated = TempDir::new().expect("tempdir");
    let isolated_beads = isolated.path().join(".beads");
    fs::create_dir_all(&isolated_beads).expect("create");

    env::set_var("BEADS_DIR", &isolated_beads);
    // Discovery from inside the production tree must still resolve to
    // the isolated directory.
    let discovered =
        config::discover_beads_dir(Some(&production_beads.join("nested"))).expect("discover");
    assert_eq!(discovered, isolated_beads);

    // bd dolt set host/port/database equivalent:
    let mut metadata = Metadata::load(&discovered).expect("load");
    metadata.server_host = "192.168.99.99".to_string();
    metadata.server_port = 9999;
    metadata.database = "testdb".to_string();
    metadata.save(&discovered).expect("save");
    config::append_config_audit(&discovered, "host", "192.168.99.99");

    let mut cfg = Config::load(Some(&discovered)).expect("load config");
    cfg.save_value("sync.mode", "realtime").expect("save value");

    env::remove_var("BEADS_DIR");

    // Everything landed in the isolated directory...
    let isolated_metadata = Metadata::load(&isolated_beads).expect("reload");
    assert_eq!(isolated_metadata.server_host, "192.168.99.99");
    assert_eq!(isolated_metadata.server_port, 9999);
    assert_eq!(isolated_metadata.database, "testdb");
    assert!(isolated_beads.join("config.yaml").exists());
    assert!(isolated_beads.join("dolt-config.log").exists());

    // ...and the production repo is byte-identical.
    assert_eq!(
        fs::read_to_string(production_beads.join("config.yaml")).unwrap(),
        production_config
    );
    assert_eq!(
        fs::read_to_string(production_beads.join("metadata.json")).unwrap(),
        production_metadata
    );
    assert!(!production_beads.join("dolt-config.log").exists());
}

#[test]
fn metadata_env_overrides_apply() {
    let _guard = env_guard();
    let temp = TempDir::new().expect("tempdir");
    let dir = temp.path().join(".beads");
    fs::create_dir_all(&dir).expect("create");
    Metadata::default().save(&dir).expect("save");

    env::set_var("BD_SERVER_HOST", "10.9.9.9");
    env::set_var("BD_SERVER_PORT", "4407");
    env::set_var("BD_SERVER_USER", "ops");
    env::set_var("BD_SERVER_DATABASE", "teamdb");

    let metadata = Metadata::load_with_env(&dir).expect("load");
    assert_eq!(metadata.server_host, "10.9.9.9");
    assert_eq!(metadata.server_port, 4407);
    assert_eq!(metadata.server_user, "ops");
    assert_eq!(metadata.database, "teamdb");

    env::remove_var("BD_SERVER_HOST");
    env::remove_var("BD_SERVER_PORT");
    env::remove_var("BD_SERVER_USER");
    env::remove_var("BD_SERVER_DATABASE");

    // Without the env, the file values return.
    let metadata = Metadata::load_with_env(&dir).expect("load");
    assert_eq!(metadata.server_host, "127.0.0.1");
    assert_eq!(metadata.server_port, 3307);
}

#[test]
fn audit_log_survives_missing_directory() {
    // Appending to a nonexistent directory must stay silent.
    config::append_config_audit(Path::new("/nonexistent/beads"), "key", "value");
}
