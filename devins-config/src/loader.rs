//! Configuration loader for the per-user DevIns directory.

use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use devins_mcp::McpConfig;
use tracing::{debug, info};

use crate::schema::CompilerSettings;

/// Environment variable overriding the configuration directory.
pub const CONFIG_DIR_ENV: &str = "DEVINS_CONFIG_DIR";
/// Directory under `$HOME` used when no override is set.
pub const DEFAULT_DIR_NAME: &str = ".autodev";
/// MCP server configuration file name.
pub const MCP_FILE: &str = "mcp.json";
/// Compiler settings file name.
pub const SETTINGS_FILE: &str = "devins.json";

/// Everything read from the configuration directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DevinsConfig {
    mcp: McpConfig,
    settings: CompilerSettings,
}

impl DevinsConfig {
    /// Bundles already loaded parts.
    #[must_use]
    pub fn new(mcp: McpConfig, settings: CompilerSettings) -> Self {
        Self { mcp, settings }
    }

    /// Returns the MCP server configuration.
    #[must_use]
    pub fn mcp(&self) -> &McpConfig {
        &self.mcp
    }

    /// Returns the compiler settings.
    #[must_use]
    pub fn settings(&self) -> &CompilerSettings {
        &self.settings
    }

    /// Splits into parts.
    #[must_use]
    pub fn into_parts(self) -> (McpConfig, CompilerSettings) {
        (self.mcp, self.settings)
    }
}

/// Reads configuration files from one directory. Missing files yield defaults.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a loader reading from `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Creates a loader for `$DEVINS_CONFIG_DIR`, falling back to
    /// `$HOME/.autodev`.
    ///
    /// # Errors
    ///
    /// Returns an error when neither variable is set.
    pub fn from_env() -> Result<Self> {
        config_dir(std::env::var_os(CONFIG_DIR_ENV), std::env::var_os("HOME"))
            .map(Self::new)
            .ok_or_else(|| anyhow!("set {CONFIG_DIR_ENV} or HOME to locate the configuration"))
    }

    /// Returns the directory being read.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Loads `mcp.json`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_mcp(&self) -> Result<McpConfig> {
        let path = self.dir.join(MCP_FILE);
        match read_optional(&path)? {
            Some(json) => {
                let config = McpConfig::from_json(&json)
                    .with_context(|| format!("invalid MCP configuration in {}", path.display()))?;
                debug!(servers = config.servers().len(), "loaded mcp configuration");
                Ok(config)
            }
            None => Ok(McpConfig::default()),
        }
    }

    /// Loads `devins.json`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_settings(&self) -> Result<CompilerSettings> {
        let path = self.dir.join(SETTINGS_FILE);
        match read_optional(&path)? {
            Some(json) => CompilerSettings::from_json(&json)
                .with_context(|| format!("invalid settings in {}", path.display())),
            None => Ok(CompilerSettings::default()),
        }
    }

    /// Loads both files.
    ///
    /// # Errors
    ///
    /// Propagates the first load failure.
    pub fn load(&self) -> Result<DevinsConfig> {
        let config = DevinsConfig::new(self.load_mcp()?, self.load_settings()?);
        info!(dir = %self.dir.display(), "configuration loaded");
        Ok(config)
    }

    /// Writes `mcp.json`, creating the directory when needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn save_mcp(&self, config: &McpConfig) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        let path = self.dir.join(MCP_FILE);
        let json = serde_json::to_string_pretty(config)?;
        fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))
    }
}

/// Picks the configuration directory from the override and home variables.
#[must_use]
pub fn config_dir(override_dir: Option<OsString>, home: Option<OsString>) -> Option<PathBuf> {
    match override_dir.filter(|dir| !dir.is_empty()) {
        Some(dir) => Some(PathBuf::from(dir)),
        None => home
            .filter(|home| !home.is_empty())
            .map(|home| PathBuf::from(home).join(DEFAULT_DIR_NAME)),
    }
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "config file absent, using defaults");
            Ok(None)
        }
        Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use devins_mcp::McpServerConfig;
    use uuid::Uuid;

    use super::*;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("devins-config-{}", Uuid::new_v4()))
    }

    #[test]
    fn override_wins_over_home() {
        let dir = config_dir(Some("/etc/devins".into()), Some("/home/me".into()));
        assert_eq!(dir, Some(PathBuf::from("/etc/devins")));

        let dir = config_dir(Some(OsString::new()), Some("/home/me".into()));
        assert_eq!(dir, Some(PathBuf::from("/home/me/.autodev")));

        assert_eq!(config_dir(None, None), None);
    }

    #[test]
    fn missing_directory_yields_defaults() {
        let loader = ConfigLoader::new(temp_dir());
        let config = loader.load().unwrap();
        assert!(config.mcp().servers().is_empty());
        assert_eq!(config.settings(), &CompilerSettings::default());
    }

    #[test]
    fn reads_both_files() {
        let dir = temp_dir();
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join(MCP_FILE),
            r#"{"mcpServers": {"docs": {"url": "http://localhost:9000/mcp", "autoApprove": ["search"]}}}"#,
        )
        .unwrap();
        fs::write(dir.join(SETTINGS_FILE), r#"{"processTimeoutSecs": 5}"#).unwrap();

        let (mcp, settings) = ConfigLoader::new(&dir).load().unwrap().into_parts();
        assert_eq!(mcp.server("docs").unwrap().auto_approve(), ["search"]);
        assert_eq!(settings.process_timeout().as_secs(), 5);

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn malformed_file_reports_path() {
        let dir = temp_dir();
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(SETTINGS_FILE), "{not json").unwrap();

        let err = ConfigLoader::new(&dir).load_settings().unwrap_err();
        assert!(err.to_string().contains(SETTINGS_FILE));

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn saved_mcp_config_loads_back() {
        let dir = temp_dir();
        let loader = ConfigLoader::new(&dir);
        let config = McpConfig::new().with_server(
            "fs",
            McpServerConfig::stdio("mcp-fs").with_args(["--root", "."]),
        );
        loader.save_mcp(&config).unwrap();
        assert_eq!(loader.load_mcp().unwrap(), config);

        fs::remove_dir_all(dir).unwrap();
    }
}
