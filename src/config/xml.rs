//! XML configuration support.
//! - Loads settings from config.xml (quick_xml + serde).
//! - Creates a secure template if missing (unless CLEANSHIFT_CONFIG is set).
//!
//! Unknown elements are rejected so a misspelt key never silently falls back to a default.

use anyhow::{Context, Result, bail};
use quick_xml::de::from_str as from_xml_str;
use serde::{Deserialize, Deserializer};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use super::paths::{
    CONFIG_ENV, default_config_path, default_log_path, default_result_log_path, ensure_parent_dir,
    path_has_symlink_ancestor,
};
use super::types::{Config, LogLevel};
use super::{MIN_SIZE_MB_DEFAULT, MOVE_DIR_NAME_DEFAULT, SPACE_MARGIN_PERCENT_DEFAULT, STALL_TIMEOUT_SECS_DEFAULT};
use crate::platform::write_config_secure_new_0600;

/// Struct mirroring the XML config for deserialization.
#[derive(Debug, Default, Deserialize)]
#[serde(rename = "config", deny_unknown_fields)]
struct XmlConfig {
    log_level: Option<String>,
    log_file: Option<String>,
    result_log: Option<String>,
    #[serde(default, deserialize_with = "de_trimmed_opt")]
    min_size_mb: Option<u64>,
    #[serde(default, deserialize_with = "de_trimmed_opt")]
    space_margin_percent: Option<u32>,
    #[serde(default, deserialize_with = "de_trimmed_opt")]
    stall_timeout_seconds: Option<u64>,
    #[serde(default, deserialize_with = "de_trimmed_opt")]
    scan_threads: Option<usize>,
    move_dir_name: Option<String>,
    #[serde(default, deserialize_with = "de_trimmed_opt")]
    preserve_metadata: Option<bool>,
    #[serde(default)]
    protected_path: Vec<String>,
    #[serde(default)]
    confirm_path: Vec<String>,
}

/// Optional scalar with surrounding whitespace trimmed; empty elements count as unset.
fn de_trimmed_opt<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    match opt.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s.parse::<T>().map(Some).map_err(serde::de::Error::custom),
    }
}

fn non_empty_path(s: Option<&str>) -> Option<PathBuf> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(PathBuf::from)
}

fn xml_to_config(parsed: XmlConfig) -> Result<Config> {
    let mut cfg = Config::default();
    if let Some(s) = parsed.log_level.as_deref() {
        cfg.log_level = s.parse::<LogLevel>().map_err(anyhow::Error::msg)?;
    }
    if let Some(p) = non_empty_path(parsed.log_file.as_deref()) {
        cfg.log_file = Some(p);
    }
    if let Some(p) = non_empty_path(parsed.result_log.as_deref()) {
        cfg.result_log = Some(p);
    }
    if let Some(v) = parsed.min_size_mb {
        cfg.min_size_mb = v;
    }
    if let Some(v) = parsed.space_margin_percent {
        cfg.space_margin_percent = v;
    }
    if let Some(v) = parsed.stall_timeout_seconds {
        cfg.stall_timeout = Duration::from_secs(v);
    }
    if let Some(v) = parsed.scan_threads {
        cfg.scan_threads = v;
    }
    if let Some(name) = parsed.move_dir_name.as_deref().map(str::trim) {
        cfg.move_dir_name = name.to_string();
    }
    if let Some(v) = parsed.preserve_metadata {
        cfg.preserve_metadata = v;
    }
    cfg.protected_paths = parsed
        .protected_path
        .iter()
        .filter_map(|s| non_empty_path(Some(s)))
        .collect();
    cfg.confirm_paths = parsed
        .confirm_path
        .iter()
        .filter_map(|s| non_empty_path(Some(s)))
        .collect();
    Ok(cfg)
}

/// Load a Config from a specific XML file path.
pub fn load_config_from_xml_path(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("read config xml '{}'", path.display()))?;
    let parsed: XmlConfig = from_xml_str(&contents)
        .with_context(|| format!("parse config xml '{}'", path.display()))?;
    let cfg = xml_to_config(parsed).with_context(|| format!("config '{}'", path.display()))?;
    debug!(path = %path.display(), "loaded config");
    Ok(cfg)
}

/// What `load_or_init` found.
#[derive(Debug)]
pub enum LoadResult {
    /// Config read from the given file.
    Loaded(Config, PathBuf),
    /// No file was written yet; a template now exists at the path and defaults apply.
    CreatedTemplate(PathBuf),
    /// No usable location (or the explicit file is missing); defaults apply.
    Defaults,
}

impl LoadResult {
    pub fn into_config(self) -> Config {
        match self {
            LoadResult::Loaded(cfg, _) => cfg,
            LoadResult::CreatedTemplate(_) | LoadResult::Defaults => Config::default(),
        }
    }
}

/// Load the config file, writing a template on first run at the default location.
pub fn load_or_init() -> Result<LoadResult> {
    let explicit = env::var_os(CONFIG_ENV).is_some_and(|v| !v.is_empty());
    let Some(path) = default_config_path() else {
        return Ok(LoadResult::Defaults);
    };
    if path.exists() {
        let cfg = load_config_from_xml_path(&path)?;
        return Ok(LoadResult::Loaded(cfg, path));
    }
    if explicit {
        debug!(path = %path.display(), "{CONFIG_ENV} names a missing file; using defaults");
        return Ok(LoadResult::Defaults);
    }
    create_template_config(&path)?;
    Ok(LoadResult::CreatedTemplate(path))
}

/// Write the commented template config. Refuses symlinked ancestors and existing files.
pub fn create_template_config(path: &Path) -> Result<()> {
    if path_has_symlink_ancestor(path)? {
        bail!(
            "Refusing to create config: ancestor of {} is a symlink",
            path.display()
        );
    }
    if fs::symlink_metadata(path).is_ok() {
        bail!("Refusing to overwrite existing config {}", path.display());
    }
    ensure_parent_dir(path)?;

    let suggested_log = default_log_path()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    let suggested_results = default_result_log_path()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    let content = format!(
        "<!--\n  cleanshift configuration (XML)\n\n    log_level              -> quiet | normal | info | debug\n    log_file               -> log file path (empty = console only)\n    result_log             -> JSON-lines record of finished moves\n    min_size_mb            -> smallest folder offered as a candidate\n    space_margin_percent   -> free-space headroom required on the target volume\n    stall_timeout_seconds  -> abandon a move after this long without copy progress\n    scan_threads           -> scanner worker threads (0 = one per CPU)\n    move_dir_name          -> folder created on the target volume\n    preserve_metadata      -> copy timestamps and permissions (true/false)\n    protected_path         -> repeatable; never relocated (added to the built-in list)\n    confirm_path           -> repeatable; relocated only after confirmation\n\n  CLI flags override these values.\n-->\n<config>\n  <log_level>normal</log_level>\n  <log_file>{suggested_log}</log_file>\n  <result_log>{suggested_results}</result_log>\n  <min_size_mb>{MIN_SIZE_MB_DEFAULT}</min_size_mb>\n  <space_margin_percent>{SPACE_MARGIN_PERCENT_DEFAULT}</space_margin_percent>\n  <stall_timeout_seconds>{STALL_TIMEOUT_SECS_DEFAULT}</stall_timeout_seconds>\n  <scan_threads>0</scan_threads>\n  <move_dir_name>{MOVE_DIR_NAME_DEFAULT}</move_dir_name>\n  <preserve_metadata>true</preserve_metadata>\n</config>\n"
    );

    write_config_secure_new_0600(path, content.as_bytes())?;
    info!("Created template config at {}", path.display());
    Ok(())
}
