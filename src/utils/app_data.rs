use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

const APP_NAME: &str = "nixnav";
const CONFIG_FILE: &str = "config.json";

/// A named directory root eligible for indexing and search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub name: String,
    pub path: PathBuf,
    /// Whether the root sits on a network filesystem (periodic rescans instead of inotify)
    #[serde(default)]
    pub is_network: bool,
}

impl Bookmark {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            is_network: false,
        }
    }

    /// Case-insensitive name comparison used for scope matching
    pub fn matches_name(&self, name: &str) -> bool {
        self.name.to_lowercase() == name.trim().to_lowercase()
    }
}

/// Application configuration stored in the config directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_bookmarks")]
    pub bookmarks: Vec<Bookmark>,

    /// Glob patterns excluded from fallback scans
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,

    /// Upper bound on the merged fallback result list
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Index of the bookmark selected when the UI last closed
    #[serde(default)]
    pub last_bookmark: usize,

    /// Filesystem search program used by the fallback scanner
    #[serde(default = "default_fd_command")]
    pub fd_command: String,

    /// Text search program used by content search
    #[serde(default = "default_rg_command")]
    pub rg_command: String,

    /// Explicit index service executable, searched for when unset
    #[serde(default)]
    pub daemon_command: Option<PathBuf>,

    /// Wall-clock limit for each spawned search process
    #[serde(default = "default_scan_timeout_secs")]
    pub scan_timeout_secs: u64,

    /// Keys owned by other parts of the application (window geometry, UI mode, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_bookmarks() -> Vec<Bookmark> {
    dirs::home_dir()
        .map(|home| vec![Bookmark::new("home", home)])
        .unwrap_or_default()
}

fn default_exclude_patterns() -> Vec<String> {
    ["*.pyc", "__pycache__", ".git", "node_modules", "*.log", ".Trash*", "Trash"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_max_results() -> usize {
    500
}

fn default_fd_command() -> String {
    "fd".to_string()
}

fn default_rg_command() -> String {
    "rg".to_string()
}

fn default_scan_timeout_secs() -> u64 {
    30
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bookmarks: default_bookmarks(),
            exclude_patterns: default_exclude_patterns(),
            max_results: default_max_results(),
            last_bookmark: 0,
            fd_command: default_fd_command(),
            rg_command: default_rg_command(),
            daemon_command: None,
            scan_timeout_secs: default_scan_timeout_secs(),
            extra: Map::new(),
        }
    }
}

impl AppConfig {
    /// Load config from the config directory, or return default if not found
    pub fn load() -> Result<Self> {
        Self::load_from(&get_config_path()?)
    }

    /// Load config from an explicit file; missing fields fall back to defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: AppConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Save config to the config directory
    pub fn save(&self) -> Result<()> {
        self.save_to(&get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(self)
            .context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        Ok(())
    }

    /// Find a bookmark by name (case-insensitive)
    pub fn find_bookmark(&self, name: &str) -> Option<&Bookmark> {
        self.bookmarks.iter().find(|b| b.matches_name(name))
    }

    /// Add a bookmark for an existing directory. The path is canonicalized.
    pub fn add_bookmark(&mut self, name: &str, path: &Path) -> Result<&Bookmark> {
        let name = name.trim();
        if name.is_empty() || name.contains(':') {
            bail!("Invalid bookmark name {:?}", name);
        }
        if self.find_bookmark(name).is_some() {
            bail!("Bookmark {:?} already exists", name);
        }

        let canonical = path
            .canonicalize()
            .with_context(|| format!("Cannot resolve {}", path.display()))?;
        if !canonical.is_dir() {
            bail!("{} is not a directory", canonical.display());
        }

        let mut bookmark = Bookmark::new(name, canonical);
        bookmark.is_network = crate::utils::is_network_mount(&bookmark.path);
        self.bookmarks.push(bookmark);

        let idx = self.bookmarks.len() - 1;
        Ok(&self.bookmarks[idx])
    }

    pub fn rename_bookmark(&mut self, old: &str, new: &str) -> Result<()> {
        let new = new.trim();
        if new.is_empty() || new.contains(':') {
            bail!("Invalid bookmark name {:?}", new);
        }
        if let Some(existing) = self.find_bookmark(new)
            && !existing.matches_name(old)
        {
            bail!("Bookmark {:?} already exists", new);
        }

        let bookmark = self
            .bookmarks
            .iter_mut()
            .find(|b| b.matches_name(old))
            .with_context(|| format!("No bookmark named {:?}", old))?;
        bookmark.name = new.to_string();
        Ok(())
    }

    pub fn remove_bookmark(&mut self, name: &str) -> Result<Bookmark> {
        let idx = self
            .bookmarks
            .iter()
            .position(|b| b.matches_name(name))
            .with_context(|| format!("No bookmark named {:?}", name))?;
        let removed = self.bookmarks.remove(idx);

        if self.last_bookmark >= self.bookmarks.len() {
            self.last_bookmark = self.bookmarks.len().saturating_sub(1);
        }
        Ok(removed)
    }
}

/// Get the path to the config file
pub fn get_config_path() -> Result<PathBuf> {
    let base = dirs::config_dir().context("Could not determine config directory")?;
    Ok(base.join(APP_NAME).join(CONFIG_FILE))
}

/// Get the application data directory (logs)
pub fn get_app_data_dir() -> Result<PathBuf> {
    let base = if cfg!(target_os = "macos") {
        dirs::home_dir()
            .map(|h| h.join("Library").join("Application Support"))
    } else {
        // Linux/Unix: use XDG_DATA_HOME or ~/.local/share
        dirs::data_dir()
    };

    let base = base.context("Could not determine app data directory")?;
    let app_dir = base.join(APP_NAME);

    fs::create_dir_all(&app_dir)?;
    Ok(app_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();
        assert_eq!(config.max_results, 500);
        assert_eq!(config.fd_command, "fd");
        assert_eq!(config.scan_timeout_secs, 30);
        assert!(config.exclude_patterns.iter().any(|p| p == "node_modules"));
    }

    #[test]
    fn test_app_config_partial_json() {
        // Should use defaults for missing fields
        let json = r#"{"max_results": 42, "bookmarks": [{"name": "src", "path": "/src"}]}"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.max_results, 42);
        assert_eq!(config.bookmarks.len(), 1);
        assert!(!config.bookmarks[0].is_network);
        assert_eq!(config.rg_command, "rg");
        assert!(!config.exclude_patterns.is_empty());
    }

    #[test]
    fn test_unknown_keys_survive_rewrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"last_mode": "edit", "window_geometry": "AAAA", "max_results": 7}"#).unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        config.save_to(&path).unwrap();

        let raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["last_mode"], "edit");
        assert_eq!(raw["window_geometry"], "AAAA");
        assert_eq!(raw["max_results"], 7);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config.max_results, 500);
    }

    #[test]
    fn test_bookmark_crud() {
        let dir = TempDir::new().unwrap();
        let mut config = AppConfig {
            bookmarks: Vec::new(),
            ..Default::default()
        };

        let added = config.add_bookmark("Proj", dir.path()).unwrap().clone();
        assert_eq!(added.path, dir.path().canonicalize().unwrap());
        assert!(config.find_bookmark("proj").is_some());

        assert!(config.add_bookmark("PROJ", dir.path()).is_err());
        assert!(config.add_bookmark("bad:name", dir.path()).is_err());
        assert!(config.add_bookmark("missing", &dir.path().join("nope")).is_err());

        config.rename_bookmark("proj", "work").unwrap();
        assert!(config.find_bookmark("proj").is_none());
        assert_eq!(config.find_bookmark("WORK").unwrap().name, "work");

        config.last_bookmark = 0;
        let removed = config.remove_bookmark("work").unwrap();
        assert_eq!(removed.name, "work");
        assert!(config.bookmarks.is_empty());
        assert_eq!(config.last_bookmark, 0);
        assert!(config.remove_bookmark("work").is_err());
    }

    #[test]
    fn test_rename_to_same_name_different_case() {
        let dir = TempDir::new().unwrap();
        let mut config = AppConfig {
            bookmarks: Vec::new(),
            ..Default::default()
        };
        config.add_bookmark("docs", dir.path()).unwrap();
        config.rename_bookmark("docs", "Docs").unwrap();
        assert_eq!(config.bookmarks[0].name, "Docs");
    }
}
