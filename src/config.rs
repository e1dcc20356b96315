//! Daemon configuration
//!
//! Values are layered, later layers overriding earlier ones:
//! defaults, the user config file in the app data directory, the project's
//! `.trigrep.toml`, a file given with `--config`, environment variables, and
//! finally command line flags. Every config file field is optional.
//!
//! Config files live at:
//! - `~/Library/Application Support/trigrep/config.toml` (macOS)
//! - `%LOCALAPPDATA%/trigrep/config.toml` (Windows)
//! - `~/.local/share/trigrep/config.toml` (Linux)

use crate::index::IndexConfig;
use crate::query::executor::{
    SearchOptions, DEFAULT_CACHE_SIZE, DEFAULT_CONTEXT_BYTES, DEFAULT_MATCH_CAP,
};
use crate::server::watcher::WatcherConfig;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const APP_NAME: &str = "trigrep";
const USER_CONFIG_FILE: &str = "config.toml";

/// Per-project config file name, looked up in the project root
pub const PROJECT_CONFIG_FILE: &str = ".trigrep.toml";

pub const ENV_DEBOUNCE_MS: &str = "TRIGREP_DEBOUNCE_MS";
pub const ENV_NO_WATCH: &str = "TRIGREP_NO_WATCH";
pub const ENV_MAX_FILE_SIZE: &str = "TRIGREP_MAX_FILE_SIZE";
pub const ENV_MATCH_CAP: &str = "TRIGREP_MATCH_CAP";

/// Used when a search request omits `max_results`
pub const DEFAULT_MAX_RESULTS: usize = 100;

/// Search settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchConfig {
    pub match_cap: usize,
    pub context_bytes: usize,
    pub cache_size: usize,
    pub default_max_results: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            match_cap: DEFAULT_MATCH_CAP,
            context_bytes: DEFAULT_CONTEXT_BYTES,
            cache_size: DEFAULT_CACHE_SIZE,
            default_max_results: DEFAULT_MAX_RESULTS,
        }
    }
}

impl SearchConfig {
    pub fn options(&self) -> SearchOptions {
        SearchOptions {
            match_cap: self.match_cap,
            context_bytes: self.context_bytes,
            cache_size: self.cache_size,
        }
    }
}

/// Fully resolved daemon configuration
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub watcher: WatcherConfig,
    pub index: IndexConfig,
    pub search: SearchConfig,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            watcher: WatcherConfig::default(),
            index: IndexConfig::default(),
            search: SearchConfig::default(),
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

/// Values taken from the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub debounce_ms: Option<u64>,
    pub no_watch: bool,
    pub log_level: Option<String>,
    pub log_file: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

/// On-disk config file layout
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub watcher: WatcherSection,
    #[serde(default)]
    pub index: IndexSection,
    #[serde(default)]
    pub search: SearchSection,
    pub log_level: Option<String>,
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WatcherSection {
    pub enabled: Option<bool>,
    /// Debounce window in milliseconds
    pub debounce_ms: Option<u64>,
    pub channel_capacity: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IndexSection {
    /// Files larger than this many bytes are skipped
    pub max_file_size: Option<u64>,
    /// Extra globs to exclude, added to the built-in list
    pub exclude: Option<Vec<String>>,
    pub follow_gitignore: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchSection {
    pub match_cap: Option<usize>,
    pub context_bytes: Option<usize>,
    pub cache_size: Option<usize>,
    pub default_max_results: Option<usize>,
}

/// Per-user config directory, if the platform has one
pub fn app_data_dir() -> Option<PathBuf> {
    let base = if cfg!(target_os = "macos") {
        dirs::home_dir().map(|h| h.join("Library").join("Application Support"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
    } else {
        // Linux/Unix: use XDG_DATA_HOME or ~/.local/share
        dirs::data_dir()
    };
    base.map(|b| b.join(APP_NAME))
}

impl DaemonConfig {
    /// Resolve the configuration for `root` from every layer.
    ///
    /// Problems with config files or environment values never fail startup;
    /// they are returned as warnings to be logged once logging is up.
    pub fn load(root: &Path, cli: &CliOverrides) -> (Self, Vec<String>) {
        let user_file = app_data_dir().map(|dir| dir.join(USER_CONFIG_FILE));
        Self::load_with(root, cli, user_file.as_deref(), |key| std::env::var(key).ok())
    }

    /// [`DaemonConfig::load`] with the user file and environment supplied
    pub fn load_with<E>(
        root: &Path,
        cli: &CliOverrides,
        user_file: Option<&Path>,
        env: E,
    ) -> (Self, Vec<String>)
    where
        E: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let mut warnings = Vec::new();

        let mut files: Vec<PathBuf> = user_file.map(Path::to_path_buf).into_iter().collect();
        files.push(root.join(PROJECT_CONFIG_FILE));
        for path in &files {
            if path.is_file() {
                config.apply_file_at(path, &mut warnings);
            }
        }
        if let Some(explicit) = &cli.config {
            if explicit.is_file() {
                config.apply_file_at(explicit, &mut warnings);
            } else {
                warnings.push(format!("Config file {} not found", explicit.display()));
            }
        }

        config.apply_env(&env, &mut warnings);
        config.apply_cli(cli);

        (config, warnings)
    }

    fn apply_file_at(&mut self, path: &Path, warnings: &mut Vec<String>) {
        let parsed = fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|content| toml::from_str::<ConfigFile>(&content).map_err(|e| e.to_string()));
        match parsed {
            Ok(file) => self.apply_file(file),
            Err(err) => warnings.push(format!("Ignoring config file {}: {err}", path.display())),
        }
    }

    /// Overlay values present in a config file
    pub fn apply_file(&mut self, file: ConfigFile) {
        if let Some(v) = file.watcher.enabled {
            self.watcher.enabled = v;
        }
        if let Some(v) = file.watcher.debounce_ms {
            self.watcher.debounce_ms = v;
        }
        if let Some(v) = file.watcher.channel_capacity {
            self.watcher.channel_capacity = v.max(1);
        }

        if let Some(v) = file.index.max_file_size {
            self.index.max_file_size = v;
        }
        if let Some(globs) = file.index.exclude {
            self.index.ignored_globs.extend(globs);
        }
        if let Some(v) = file.index.follow_gitignore {
            self.index.follow_gitignore = v;
        }

        if let Some(v) = file.search.match_cap {
            self.search.match_cap = v.max(1);
        }
        if let Some(v) = file.search.context_bytes {
            self.search.context_bytes = v;
        }
        if let Some(v) = file.search.cache_size {
            self.search.cache_size = v;
        }
        if let Some(v) = file.search.default_max_results {
            self.search.default_max_results = v.max(1);
        }

        if let Some(v) = file.log_level {
            self.log_level = v;
        }
        if let Some(v) = file.log_file {
            self.log_file = Some(v);
        }
    }

    fn apply_env<E>(&mut self, env: &E, warnings: &mut Vec<String>)
    where
        E: Fn(&str) -> Option<String>,
    {
        if let Some(ms) = parse_env(env, ENV_DEBOUNCE_MS, warnings) {
            self.watcher.debounce_ms = ms;
        }
        if let Some(size) = parse_env(env, ENV_MAX_FILE_SIZE, warnings) {
            self.index.max_file_size = size;
        }
        if let Some(cap) = parse_env::<usize, E>(env, ENV_MATCH_CAP, warnings) {
            self.search.match_cap = cap.max(1);
        }
        if let Some(val) = env(ENV_NO_WATCH) {
            let val = val.trim().to_ascii_lowercase();
            if !val.is_empty() && val != "0" && val != "false" {
                self.watcher.enabled = false;
            }
        }
    }

    fn apply_cli(&mut self, cli: &CliOverrides) {
        if let Some(ms) = cli.debounce_ms {
            self.watcher.debounce_ms = ms;
        }
        if cli.no_watch {
            self.watcher.enabled = false;
        }
        if let Some(level) = &cli.log_level {
            self.log_level = level.clone();
        }
        if let Some(file) = &cli.log_file {
            self.log_file = Some(file.clone());
        }
    }
}

fn parse_env<T, E>(env: &E, key: &str, warnings: &mut Vec<String>) -> Option<T>
where
    T: std::str::FromStr,
    E: Fn(&str) -> Option<String>,
{
    let raw = env(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warnings.push(format!("Ignoring {key}={raw}: not a valid number"));
            None
        }
    }
}
