//! Layered configuration for `beads`.
//!
//! Sources and precedence (highest wins):
//! 1. CLI flags
//! 2. Environment variables (`BD_*`, legacy `BEADS_*`)
//! 3. Repo-local overrides (.beads/config.local.yaml, not committed)
//! 4. Team config (.beads/config.yaml, committed)
//! 5. User config (~/.config/bd/config.yaml, legacy ~/.beads/config.yaml)
//! 6. Built-in defaults
//!
//! A separate `metadata.json` holds machine-local backend parameters and
//! is never committed. `BEADS_DIR` short-circuits the upward `.beads/`
//! walk, which is what keeps worktree-local tests from rewriting the
//! containing repo's production config.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::env;
use std::fmt;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use crate::error::{BeadsError, Result};

/// Primary environment prefix, auto-bound from every key.
pub const ENV_PREFIX: &str = "BD_";
/// Legacy prefix, honored for backward compatibility.
pub const LEGACY_ENV_PREFIX: &str = "BEADS_";

const CONFIG_FILE: &str = "config.yaml";
const LOCAL_CONFIG_FILE: &str = "config.local.yaml";
const METADATA_FILE: &str = "metadata.json";
const AUDIT_LOG_FILE: &str = "dolt-config.log";

/// Where a configuration value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Default,
    Config,
    Env,
    Flag,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Default => "default",
            Self::Config => "config file",
            Self::Env => "environment variable",
            Self::Flag => "command-line flag",
        };
        write!(f, "{label}")
    }
}

/// One detected override: a key whose effective value comes from a
/// higher layer than the config file.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigOverride {
    pub key: String,
    pub effective_value: String,
    pub overridden_by: Source,
    pub original_source: Source,
    pub original_value: Option<String>,
}

/// Sync mode controlling export/import triggers and remote policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    #[default]
    GitPortable,
    Realtime,
    DoltNative,
    BeltAndSuspenders,
}

impl SyncMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GitPortable => "git-portable",
            Self::Realtime => "realtime",
            Self::DoltNative => "dolt-native",
            Self::BeltAndSuspenders => "belt-and-suspenders",
        }
    }

    /// Whether this mode maintains the JSONL snapshot at all.
    #[must_use]
    pub const fn uses_jsonl(self) -> bool {
        !matches!(self, Self::DoltNative)
    }

    /// Whether this mode requires a Dolt remote.
    #[must_use]
    pub const fn needs_remote(self) -> bool {
        matches!(self, Self::DoltNative | Self::BeltAndSuspenders)
    }
}

impl FromStr for SyncMode {
    type Err = BeadsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "git-portable" => Ok(Self::GitPortable),
            "realtime" => Ok(Self::Realtime),
            "dolt-native" => Ok(Self::DoltNative),
            "belt-and-suspenders" => Ok(Self::BeltAndSuspenders),
            other => Err(BeadsError::Config(format!(
                "invalid sync.mode '{other}' (valid: git-portable, realtime, dolt-native, belt-and-suspenders)"
            ))),
        }
    }
}

/// Backend selection persisted in `metadata.json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Sqlite,
    Dolt,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite => write!(f, "sqlite"),
            Self::Dolt => write!(f, "dolt"),
        }
    }
}

/// Dolt execution mode: in-process snapshot vs network client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DoltMode {
    #[default]
    Embedded,
    Server,
}

fn default_database() -> String {
    "beads".to_string()
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_server_port() -> u16 {
    3307
}

fn default_server_user() -> String {
    "root".to_string()
}

/// Machine-local backend parameters (`.beads/metadata.json`).
///
/// Never committed; the committed team defaults live in `config.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Metadata {
    #[serde(default)]
    pub backend: Backend,
    /// Database name; the embedded backend stores `<database>.db`.
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default)]
    pub mode: DoltMode,
    #[serde(default = "default_server_host")]
    pub server_host: String,
    #[serde(default = "default_server_port")]
    pub server_port: u16,
    #[serde(default = "default_server_user")]
    pub server_user: String,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            database: default_database(),
            mode: DoltMode::default(),
            server_host: default_server_host(),
            server_port: default_server_port(),
            server_user: default_server_user(),
        }
    }
}

impl Metadata {
    /// Load `metadata.json`, falling back to defaults when absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(beads_dir: &Path) -> Result<Self> {
        let path = beads_dir.join(METADATA_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(&path)?;
        let mut metadata: Self = serde_json::from_str(&contents)?;
        if metadata.database.trim().is_empty() {
            metadata.database = default_database();
        }
        Ok(metadata)
    }

    /// Load with server-parameter environment overrides applied
    /// (`BD_SERVER_HOST`, `BD_SERVER_PORT`, `BD_SERVER_USER`,
    /// `BD_SERVER_DATABASE`, legacy `BEADS_*` equivalents).
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_with_env(beads_dir: &Path) -> Result<Self> {
        let mut metadata = Self::load(beads_dir)?;
        if let Some(host) = env_value("server-host") {
            metadata.server_host = host;
        }
        if let Some(port) = env_value("server-port").and_then(|p| p.parse().ok()) {
            metadata.server_port = port;
        }
        if let Some(user) = env_value("server-user") {
            metadata.server_user = user;
        }
        if let Some(database) = env_value("server-database") {
            metadata.database = database;
        }
        Ok(metadata)
    }

    /// Persist to `metadata.json`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory is missing or the write fails.
    pub fn save(&self, beads_dir: &Path) -> Result<()> {
        let path = beads_dir.join(METADATA_FILE);
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents + "\n")?;
        Ok(())
    }

    /// Filename of the embedded database (`<database>.db`).
    #[must_use]
    pub fn db_filename(&self) -> String {
        if self.database.ends_with(".db") {
            self.database.clone()
        } else {
            format!("{}.db", self.database)
        }
    }

    /// Absolute path of the embedded database file.
    #[must_use]
    pub fn db_path(&self, beads_dir: &Path) -> PathBuf {
        let candidate = PathBuf::from(self.db_filename());
        if candidate.is_absolute() {
            candidate
        } else {
            beads_dir.join(candidate)
        }
    }

    /// Server-side database name (without the `.db` suffix).
    #[must_use]
    pub fn server_database(&self) -> &str {
        self.database.trim_end_matches(".db")
    }

    #[must_use]
    pub fn is_server_mode(&self) -> bool {
        self.backend == Backend::Dolt && self.mode == DoltMode::Server
    }
}

/// Discover the active `.beads` directory.
///
/// `BEADS_DIR` (when set to an existing directory) short-circuits the
/// walk; otherwise walk up from `start` (or the CWD).
///
/// # Errors
///
/// Returns `NotInitialized` when no `.beads/` ancestor exists.
pub fn discover_beads_dir(start: Option<&Path>) -> Result<PathBuf> {
    if let Ok(value) = env::var("BEADS_DIR") {
        if !value.trim().is_empty() {
            let path = PathBuf::from(value);
            if path.is_dir() {
                return Ok(path);
            }
        }
    }

    let mut current = match start {
        Some(path) => path.to_path_buf(),
        None => env::current_dir()?,
    };

    loop {
        let candidate = current.join(".beads");
        if candidate.is_dir() {
            return Ok(candidate);
        }
        if !current.pop() {
            break;
        }
    }

    Err(BeadsError::NotInitialized)
}

/// Environment variable name for a config key under the primary prefix.
#[must_use]
pub fn env_key(key: &str) -> String {
    format!(
        "{ENV_PREFIX}{}",
        key.to_uppercase().replace(['.', '-'], "_")
    )
}

/// Legacy environment variable name for a config key.
#[must_use]
pub fn legacy_env_key(key: &str) -> String {
    format!(
        "{LEGACY_ENV_PREFIX}{}",
        key.to_uppercase().replace(['.', '-'], "_")
    )
}

fn env_value(key: &str) -> Option<String> {
    env::var(env_key(key))
        .or_else(|_| env::var(legacy_env_key(key)))
        .ok()
        .filter(|value| !value.is_empty())
}

fn builtin_defaults() -> HashMap<String, String> {
    let mut defaults = HashMap::new();
    let entries = [
        ("issue-prefix", "bd"),
        ("sync.mode", "git-portable"),
        ("sync.export_on", "push"),
        ("sync.import_on", "pull"),
        ("conflict.strategy", "newest"),
        ("dolt.auto-commit", "on"),
        ("validation.on-create", "none"),
        ("validation.on-sync", "none"),
        ("hierarchy.max-depth", "3"),
        ("flush-debounce", "30s"),
        ("remote-sync-interval", "30s"),
        ("doctor.suggest_pruning_issue_count", "5000"),
        ("json", "false"),
        ("no-db", "false"),
    ];
    for (key, value) in entries {
        defaults.insert(key.to_string(), value.to_string());
    }
    defaults
}

/// The resolved configuration stack.
///
/// File layers are flattened to dotted keys at load time; environment
/// variables are consulted live on each lookup so tests can toggle them.
#[derive(Debug, Clone, Default)]
pub struct Config {
    defaults: HashMap<String, String>,
    file: HashMap<String, String>,
    flags: HashMap<String, String>,
    config_path: Option<PathBuf>,
    beads_dir: Option<PathBuf>,
}

impl Config {
    /// Load the full stack for a workspace. `beads_dir` may be absent
    /// (no repository context): only user config, env, and defaults
    /// apply then.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed.
    pub fn load(beads_dir: Option<&Path>) -> Result<Self> {
        let mut file = HashMap::new();
        let mut config_path = None;

        // Lowest file layer first; later inserts win.
        for user_path in [legacy_user_config_path(), user_config_path()]
            .into_iter()
            .flatten()
        {
            if user_path.exists() {
                merge_yaml_file(&user_path, &mut file)?;
                config_path.get_or_insert(user_path);
            }
        }

        if let Some(dir) = beads_dir {
            let project = dir.join(CONFIG_FILE);
            if project.exists() {
                merge_yaml_file(&project, &mut file)?;
            }
            // Writes always target the repo file, even before it exists;
            // a user-level config must never absorb repo-local edits.
            config_path = Some(project);
            let local = dir.join(LOCAL_CONFIG_FILE);
            if local.exists() {
                merge_yaml_file(&local, &mut file)?;
                tracing::debug!(path = %local.display(), "merged local config overrides");
            }
        }

        Ok(Self {
            defaults: builtin_defaults(),
            file,
            flags: HashMap::new(),
            config_path,
            beads_dir: beads_dir.map(Path::to_path_buf),
        })
    }

    /// An empty stack with only built-in defaults (for tests and
    /// no-repository contexts).
    #[must_use]
    pub fn defaults_only() -> Self {
        Self {
            defaults: builtin_defaults(),
            ..Self::default()
        }
    }

    /// Record an explicitly-set CLI flag (highest precedence).
    pub fn set_flag(&mut self, key: &str, value: impl Into<String>) {
        self.flags.insert(key.to_string(), value.into());
    }

    /// The config file that would receive writes.
    #[must_use]
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Effective string value for a key, walking the precedence chain.
    #[must_use]
    pub fn get_string(&self, key: &str) -> Option<String> {
        if let Some(value) = self.flags.get(key) {
            return Some(value.clone());
        }
        if let Some(value) = env_value(key) {
            return Some(value);
        }
        if let Some(value) = self.file.get(key) {
            return Some(value.clone());
        }
        self.defaults.get(key).cloned()
    }

    #[must_use]
    pub fn get_bool(&self, key: &str) -> bool {
        self.get_string(key)
            .as_deref()
            .and_then(parse_bool)
            .unwrap_or(false)
    }

    #[must_use]
    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get_string(key)
            .and_then(|value| value.trim().parse().ok())
    }

    /// Parse a duration value such as `30s`, `5m`, `2h`, or `1500ms`.
    #[must_use]
    pub fn get_duration(&self, key: &str) -> Option<Duration> {
        self.get_string(key).as_deref().and_then(parse_duration)
    }

    /// Comma-separated list value.
    #[must_use]
    pub fn get_list(&self, key: &str) -> Vec<String> {
        self.get_string(key)
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|part| !part.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All sub-keys under `prefix.` as a map (e.g. `external_projects`,
    /// `directory.labels`, `conflict.fields`).
    #[must_use]
    pub fn get_map(&self, prefix: &str) -> BTreeMap<String, String> {
        let needle = format!("{prefix}.");
        let mut map = BTreeMap::new();
        for source in [&self.defaults, &self.file] {
            for (key, value) in source {
                if let Some(sub) = key.strip_prefix(&needle) {
                    map.insert(sub.to_string(), value.clone());
                }
            }
        }
        // Flags and env can override individual entries.
        for (key, value) in &self.flags {
            if let Some(sub) = key.strip_prefix(&needle) {
                map.insert(sub.to_string(), value.clone());
            }
        }
        let keys: Vec<String> = map.keys().cloned().collect();
        for sub in keys {
            if let Some(value) = env_value(&format!("{prefix}.{sub}")) {
                map.insert(sub, value);
            }
        }
        map
    }

    /// Which layer supplies the effective value for `key`.
    #[must_use]
    pub fn source_of(&self, key: &str) -> Source {
        if self.flags.contains_key(key) {
            return Source::Flag;
        }
        if env_value(key).is_some() {
            return Source::Env;
        }
        if self.file.contains_key(key) {
            return Source::Config;
        }
        Source::Default
    }

    /// Every key whose effective value comes from a higher layer than
    /// the config file. Emitted under verbose mode so users learn why
    /// their YAML edit "isn't taking".
    #[must_use]
    pub fn overrides(&self) -> Vec<ConfigOverride> {
        let mut overrides = Vec::new();

        for (key, file_value) in &self.file {
            if self.flags.contains_key(key) {
                continue; // reported below against the flag layer
            }
            if let Some(env_val) = env_value(key) {
                overrides.push(ConfigOverride {
                    key: key.clone(),
                    effective_value: env_val,
                    overridden_by: Source::Env,
                    original_source: Source::Config,
                    original_value: Some(file_value.clone()),
                });
            }
        }

        for (key, flag_value) in &self.flags {
            let (original_source, original_value) = if let Some(env_val) = env_value(key) {
                (Source::Env, Some(env_val))
            } else if let Some(file_val) = self.file.get(key) {
                (Source::Config, Some(file_val.clone()))
            } else {
                continue; // flag over a default is not worth reporting
            };
            overrides.push(ConfigOverride {
                key: key.clone(),
                effective_value: flag_value.clone(),
                overridden_by: Source::Flag,
                original_source,
                original_value,
            });
        }

        overrides.sort_by(|a, b| a.key.cmp(&b.key));
        overrides
    }

    /// Write one key into the config file, preserving every other key.
    ///
    /// The merged runtime view is never dumped back to disk: the file is
    /// re-read, the single nested key is set, and the result written.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no target file location or the write
    /// fails.
    pub fn save_value(&mut self, key: &str, value: &str) -> Result<()> {
        let path = match (&self.config_path, &self.beads_dir) {
            (Some(path), _) => path.clone(),
            (None, Some(dir)) => dir.join(CONFIG_FILE),
            (None, None) => {
                return Err(BeadsError::Config(
                    "no config file location available".to_string(),
                ));
            }
        };

        let mut root: serde_yaml::Value = if path.exists() {
            serde_yaml::from_str(&fs::read_to_string(&path)?)?
        } else {
            serde_yaml::Value::Mapping(serde_yaml::Mapping::new())
        };
        if !root.is_mapping() {
            root = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());
        }

        set_nested_key(&mut root, key, value);
        fs::write(&path, serde_yaml::to_string(&root)?)?;

        self.file.insert(key.to_string(), value.to_string());
        self.config_path = Some(path);
        Ok(())
    }

    /// Resolve the acting user: flag/env `actor`, then `$USER`, then
    /// "unknown".
    #[must_use]
    pub fn resolve_actor(&self) -> String {
        self.get_string("actor")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .or_else(|| env::var("USER").ok().filter(|value| !value.is_empty()))
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// Configured issue prefix.
    #[must_use]
    pub fn issue_prefix(&self) -> String {
        self.get_string("issue-prefix")
            .unwrap_or_else(|| "bd".to_string())
    }

    /// Maximum dotted-ID nesting depth.
    #[must_use]
    pub fn max_hierarchy_depth(&self) -> usize {
        self.get_int("hierarchy.max-depth")
            .and_then(|value| usize::try_from(value).ok())
            .unwrap_or(crate::util::id::DEFAULT_MAX_DEPTH)
    }

    /// The configured sync mode, defaulting on parse failure.
    #[must_use]
    pub fn sync_mode(&self) -> SyncMode {
        self.get_string("sync.mode")
            .as_deref()
            .map(SyncMode::from_str)
            .and_then(std::result::Result::ok)
            .unwrap_or_default()
    }
}

/// Append an audit entry to `.beads/dolt-config.log`.
///
/// Best effort: failures are silent by design so an unwritable log never
/// blocks a config change.
pub fn append_config_audit(beads_dir: &Path, key: &str, value: &str) {
    let actor = env::var("BD_ACTOR").unwrap_or_else(|_| "unknown".to_string());
    let entry = format!(
        "{} actor={actor} key={key} value={value} beads_dir={}\n",
        chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        beads_dir.display()
    );
    let Ok(mut file) = fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(beads_dir.join(AUDIT_LOG_FILE))
    else {
        return;
    };
    let _ = file.write_all(entry.as_bytes());
}

fn user_config_path() -> Option<PathBuf> {
    let home = env::var("HOME").ok()?;
    Some(
        Path::new(&home)
            .join(".config")
            .join("bd")
            .join(CONFIG_FILE),
    )
}

fn legacy_user_config_path() -> Option<PathBuf> {
    let home = env::var("HOME").ok()?;
    Some(Path::new(&home).join(".beads").join(CONFIG_FILE))
}

fn merge_yaml_file(path: &Path, out: &mut HashMap<String, String>) -> Result<()> {
    let contents = fs::read_to_string(path)?;
    let value: serde_yaml::Value = serde_yaml::from_str(&contents)?;
    flatten_yaml(&value, "", out);
    Ok(())
}

fn flatten_yaml(value: &serde_yaml::Value, prefix: &str, out: &mut HashMap<String, String>) {
    match value {
        serde_yaml::Value::Mapping(map) => {
            for (key, value) in map {
                let Some(key_str) = key.as_str() else {
                    continue;
                };
                let next = if prefix.is_empty() {
                    key_str.to_string()
                } else {
                    format!("{prefix}.{key_str}")
                };
                flatten_yaml(value, &next, out);
            }
        }
        serde_yaml::Value::Sequence(values) => {
            let joined = values
                .iter()
                .filter_map(yaml_scalar)
                .collect::<Vec<_>>()
                .join(",");
            out.insert(prefix.to_string(), joined);
        }
        _ => {
            if let Some(scalar) = yaml_scalar(value) {
                out.insert(prefix.to_string(), scalar);
            }
        }
    }
}

fn yaml_scalar(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::Bool(v) => Some(v.to_string()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Tagged(tagged) => yaml_scalar(&tagged.value),
        serde_yaml::Value::Null | serde_yaml::Value::Sequence(_) | serde_yaml::Value::Mapping(_) => {
            None
        }
    }
}

fn set_nested_key(root: &mut serde_yaml::Value, key: &str, value: &str) {
    let parsed: serde_yaml::Value = serde_yaml::from_str(value)
        .unwrap_or_else(|_| serde_yaml::Value::String(value.to_string()));

    let mut current = root;
    let mut parts = key.split('.').peekable();
    while let Some(part) = parts.next() {
        let mapping = match current {
            serde_yaml::Value::Mapping(map) => map,
            _ => {
                *current = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());
                current.as_mapping_mut().expect("just set mapping")
            }
        };
        let part_key = serde_yaml::Value::String(part.to_string());
        if parts.peek().is_none() {
            mapping.insert(part_key, parsed);
            return;
        }
        if !mapping
            .get(&part_key)
            .is_some_and(serde_yaml::Value::is_mapping)
        {
            mapping.insert(
                part_key.clone(),
                serde_yaml::Value::Mapping(serde_yaml::Mapping::new()),
            );
        }
        current = mapping.get_mut(&part_key).expect("inserted above");
    }
}

#[must_use]
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let split = value.find(|c: char| !c.is_ascii_digit())?;
    let (digits, unit) = value.split_at(split);
    let amount: u64 = digits.parse().ok()?;
    match unit {
        "ms" => Some(Duration::from_millis(amount)),
        "s" => Some(Duration::from_secs(amount)),
        "m" => Some(Duration::from_secs(amount * 60)),
        "h" => Some(Duration::from_secs(amount * 3600)),
        _ => None,
    }
}

// Process-wide config instance. Initialized once at startup; the reset
// hook exists only for tests and is NOT thread-safe - callers must
// serialize access themselves.
static GLOBAL: OnceLock<Mutex<Option<Config>>> = OnceLock::new();

fn global_slot() -> &'static Mutex<Option<Config>> {
    GLOBAL.get_or_init(|| Mutex::new(None))
}

fn global_guard() -> std::sync::MutexGuard<'static, Option<Config>> {
    global_slot()
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Install the process-wide config. Later calls replace the instance.
pub fn init_global(config: Config) {
    *global_guard() = Some(config);
}

/// A clone of the process-wide config, or defaults when uninitialized.
#[must_use]
pub fn global() -> Config {
    global_guard().clone().unwrap_or_else(Config::defaults_only)
}

/// Clear the process-wide config. Test-only; not thread-safe.
pub fn reset_for_testing() {
    *global_guard() = None;
}
