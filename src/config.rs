/// Application configuration, persisted as TOML in the platform config directory.
///
/// On Windows this is typically:
///   %APPDATA%\tick-switcher\config.toml
///
/// First run: if no config.toml exists, the defaults are written out so the
/// user has a file to edit. The four static mapping tables are looked up in
/// `tables_dir` unless an environment variable points at a specific file
/// (`ANIMATION_PRAYER_MAPPING`, `WEAPON_SPEED_MAPPING`, `COORDS_JSON`,
/// `HOTKEYS_JSON`).
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const APP_DIR_NAME: &str = "tick-switcher";

// ---------------------------------------------------------------------------
// AppConfig
// ---------------------------------------------------------------------------

/// Keys that open each client panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabKeys {
    pub inventory: char,
    pub prayer:    char,
    pub spellbook: char,
    pub attack:    char,
}

impl Default for TabKeys {
    fn default() -> Self {
        Self { inventory: 'a', prayer: 's', spellbook: 'd', attack: 'q' }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Websocket the game-side plugin serves the state feed on.
    #[serde(default = "default_feed_url")]
    pub feed_url: String,

    /// Directory holding the four mapping tables. Empty = the config dir.
    #[serde(default)]
    pub tables_dir: PathBuf,

    /// How often the protection poller asks the engine for a recommendation.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Polling interval of the stuck-button watcher.
    #[serde(default = "default_watcher_interval_ms")]
    pub watcher_interval_ms: u64,

    /// How long a new hotkey waits for the previous one to unwind.
    #[serde(default = "default_preempt_wait_ms")]
    pub preempt_wait_ms: u64,

    #[serde(default = "default_reconnect_backoff_ms")]
    pub reconnect_backoff_ms: u64,

    /// A hotkey action running longer than this is reported as hung.
    #[serde(default = "default_hang_warn_secs")]
    pub hang_warn_secs: u64,

    /// Below this remaining time the precise sleeper spins instead of parking.
    #[serde(default = "default_spin_threshold_us")]
    pub spin_threshold_us: u64,

    #[serde(default)]
    pub tab_keys: TabKeys,

    #[serde(default)]
    pub auto_protect_on_start: bool,
}

fn default_feed_url() -> String { "ws://127.0.0.1:8765".to_owned() }
fn default_poll_interval_ms() -> u64 { 50 }
fn default_watcher_interval_ms() -> u64 { 10 }
fn default_preempt_wait_ms() -> u64 { 1_000 }
fn default_reconnect_backoff_ms() -> u64 { 2_000 }
fn default_hang_warn_secs() -> u64 { 5 }
fn default_spin_threshold_us() -> u64 { 800 }

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            feed_url:              default_feed_url(),
            tables_dir:            PathBuf::new(),
            poll_interval_ms:      default_poll_interval_ms(),
            watcher_interval_ms:   default_watcher_interval_ms(),
            preempt_wait_ms:       default_preempt_wait_ms(),
            reconnect_backoff_ms:  default_reconnect_backoff_ms(),
            hang_warn_secs:        default_hang_warn_secs(),
            spin_threshold_us:     default_spin_threshold_us(),
            tab_keys:              TabKeys::default(),
            auto_protect_on_start: false,
        }
    }
}

impl AppConfig {
    pub fn poll_interval(&self) -> Duration { Duration::from_millis(self.poll_interval_ms) }
    pub fn watcher_interval(&self) -> Duration { Duration::from_millis(self.watcher_interval_ms) }
    pub fn preempt_wait(&self) -> Duration { Duration::from_millis(self.preempt_wait_ms) }
    pub fn reconnect_backoff(&self) -> Duration { Duration::from_millis(self.reconnect_backoff_ms) }
    pub fn hang_warn(&self) -> Duration { Duration::from_secs(self.hang_warn_secs) }
    pub fn spin_threshold(&self) -> Duration { Duration::from_micros(self.spin_threshold_us) }

    /// Resolve table locations: env overrides first, then `tables_dir`
    /// (falling back to `config_dir` when unset).
    pub fn table_paths(&self, config_dir: &Path) -> TablePaths {
        let dir = if self.tables_dir.as_os_str().is_empty() {
            config_dir.to_path_buf()
        } else {
            self.tables_dir.clone()
        };
        TablePaths::in_dir(&dir).with_env_overrides(|key| std::env::var_os(key).map(PathBuf::from))
    }
}

// ---------------------------------------------------------------------------
// Table locations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablePaths {
    pub animation_prayer: PathBuf,
    pub weapon_speed:     PathBuf,
    pub coords:           PathBuf,
    pub hotkeys:          PathBuf,
}

impl TablePaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            animation_prayer: dir.join("animation_prayer_mapping.json"),
            weapon_speed:     dir.join("weapon_speed_mapping.json"),
            coords:           dir.join("manual_coords_mapping.json"),
            hotkeys:          dir.join("switcher_hotkeys.json"),
        }
    }

    fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<PathBuf>) -> Self {
        if let Some(p) = lookup("ANIMATION_PRAYER_MAPPING") { self.animation_prayer = p; }
        if let Some(p) = lookup("WEAPON_SPEED_MAPPING")     { self.weapon_speed = p; }
        if let Some(p) = lookup("COORDS_JSON")              { self.coords = p; }
        if let Some(p) = lookup("HOTKEYS_JSON")             { self.hotkeys = p; }
        self
    }
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

/// `%APPDATA%\tick-switcher` on Windows, `$XDG_CONFIG_HOME` / `~/.config`
/// elsewhere, the temp dir as a last resort.
pub fn default_config_dir() -> PathBuf {
    let base = std::env::var_os("APPDATA")
        .or_else(|| std::env::var_os("XDG_CONFIG_HOME"))
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
        .unwrap_or_else(std::env::temp_dir);
    base.join(APP_DIR_NAME)
}

pub fn load_or_default(config_dir: &Path) -> Result<AppConfig> {
    let path = config_dir.join("config.toml");
    if path.exists() {
        load_file(&path)
    } else {
        Ok(AppConfig::default())
    }
}

pub fn load_file(path: &Path) -> Result<AppConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let cfg: AppConfig = toml::from_str(&raw)
        .map_err(|e| anyhow::anyhow!("Config parse error in {}: {}", path.display(), e))?;
    Ok(cfg)
}

pub fn save(config: &AppConfig, config_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(config_dir)?;
    let raw = toml::to_string_pretty(config)
        .map_err(|e| anyhow::anyhow!("Config serialize error: {}", e))?;
    std::fs::write(config_dir.join("config.toml"), raw)?;
    Ok(())
}
