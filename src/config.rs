use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Cover extraction and caching service for e-book libraries.
#[derive(Parser, Debug, Clone)]
#[command(name = "opds-covers")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file.
    #[arg(short, long, env = "OPDS_COVERS_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the server (default if no command given).
    Serve {
        /// Address to bind the server to.
        #[arg(short, long)]
        bind: Option<SocketAddr>,
    },

    /// Extract a single cover and write it as JPEG.
    Cover {
        /// Book ID.
        id: i64,
        /// Produce the thumbnail variant.
        #[arg(short, long)]
        thumb: bool,
        /// Output file (stdout if omitted).
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Print extraction diagnostics as JSON instead of the image.
        #[arg(long, conflicts_with_all = ["thumb", "output"])]
        info: bool,
    },

    /// Cover cache commands.
    Cache {
        /// Cache subcommand action.
        #[command(subcommand)]
        action: CacheCommand,
    },

    /// Initialize database and create default config.
    Init {
        /// Force overwrite existing config.
        #[arg(short, long)]
        force: bool,
    },
}

/// Cover cache subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum CacheCommand {
    /// Show cache statistics.
    Stats,
    /// Delete every cached cover.
    Clear,
}

/// Main configuration from TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Cover cache configuration.
    #[serde(default)]
    pub cache: CacheConfig,

    /// External archive tools.
    #[serde(default)]
    pub archive: ArchiveConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to.
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::new(
        std::net::IpAddr::V4(std::net::Ipv4Addr::new(0, 0, 0, 0)),
        8080,
    )
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/library.db")
}

/// Cover cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory for cached covers.
    #[serde(default = "default_cache_dir")]
    pub covers_dir: PathBuf,

    /// Thumbnail bounding box width in pixels.
    #[serde(default = "default_thumb_width")]
    pub thumb_width: u32,

    /// Thumbnail bounding box height in pixels.
    #[serde(default = "default_thumb_height")]
    pub thumb_height: u32,

    /// JPEG quality for thumbnails (1-100).
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            covers_dir: default_cache_dir(),
            thumb_width: default_thumb_width(),
            thumb_height: default_thumb_height(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("data/covers")
}

fn default_thumb_width() -> u32 {
    200
}

fn default_thumb_height() -> u32 {
    300
}

fn default_jpeg_quality() -> u8 {
    85
}

/// External archive extractor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// `unrar` executable.
    #[serde(default = "default_unrar")]
    pub unrar: PathBuf,

    /// `7z` executable.
    #[serde(default = "default_seven_zip")]
    pub seven_zip: PathBuf,

    /// Maximum run time of one extractor call in seconds.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            unrar: default_unrar(),
            seven_zip: default_seven_zip(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl ArchiveConfig {
    /// Extractor timeout as a duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

fn default_unrar() -> PathBuf {
    PathBuf::from("unrar")
}

fn default_seven_zip() -> PathBuf {
    PathBuf::from("7z")
}

fn default_timeout_seconds() -> u64 {
    30
}

impl Config {
    /// Load configuration from file.
    pub fn load(path: &PathBuf) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::error::AppError::Config(format!("Failed to read config file: {}", e))
        })?;

        toml::from_str(&content).map_err(|e| {
            crate::error::AppError::Config(format!("Failed to parse config file: {}", e))
        })
    }

    /// Find config file in default locations.
    pub fn find_config_file() -> Option<PathBuf> {
        let candidates = [
            PathBuf::from("config.toml"),
            PathBuf::from("opds-covers.toml"),
            dirs::config_dir()
                .map(|p| p.join("opds-covers").join("config.toml"))
                .unwrap_or_default(),
            PathBuf::from("/etc/opds-covers/config.toml"),
        ];

        candidates
            .into_iter()
            .find(|p| !p.as_os_str().is_empty() && p.exists())
    }

    /// Write the default config file to `path` and return the parsed result.
    ///
    /// Refuses to replace an existing file unless `force` is set.
    pub fn write_default(path: &Path, force: bool) -> crate::error::Result<Self> {
        if path.exists() && !force {
            return Err(crate::error::AppError::Config(format!(
                "Config file already exists: {}. Use --force to overwrite.",
                path.display()
            )));
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, Self::generate_default())?;

        toml::from_str(&Self::generate_default()).map_err(|e| {
            crate::error::AppError::Config(format!("Failed to parse default config: {}", e))
        })
    }

    /// Generate default config file content.
    pub fn generate_default() -> String {
        r#"# opds-covers configuration

[server]
bind = "0.0.0.0:8080"

[database]
# path = "/var/lib/opds-covers/library.db"

[cache]
# covers_dir = "/var/lib/opds-covers/covers"
thumb_width = 200
thumb_height = 300
jpeg_quality = 85

[archive]
# Extractors for books stored inside RAR and 7z archives
unrar = "unrar"
seven_zip = "7z"
# Kill an extractor that runs longer than this
timeout_seconds = 30
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_parses() {
        let config: Config = toml::from_str(&Config::generate_default()).unwrap();
        assert_eq!(config.cache.thumb_width, 200);
        assert_eq!(config.cache.thumb_height, 300);
        assert_eq!(config.cache.jpeg_quality, 85);
        assert_eq!(config.archive.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn partial_config_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
[cache]
covers_dir = "/tmp/covers"
"#,
        )
        .unwrap();
        assert_eq!(config.cache.covers_dir, PathBuf::from("/tmp/covers"));
        assert_eq!(config.cache.thumb_height, 300);
        assert_eq!(config.archive.unrar, PathBuf::from("unrar"));
        assert_eq!(config.database.path, PathBuf::from("data/library.db"));
    }

    #[test]
    fn write_default_respects_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("etc").join("covers.toml");

        let config = Config::write_default(&path, false).unwrap();
        assert_eq!(Config::load(&path.to_path_buf()).unwrap().database.path, config.database.path);

        std::fs::write(&path, "[cache]\nthumb_width = 90\n").unwrap();
        assert!(Config::write_default(&path, false).is_err());
        assert_eq!(Config::load(&path.to_path_buf()).unwrap().cache.thumb_width, 90);

        Config::write_default(&path, true).unwrap();
        assert_eq!(Config::load(&path.to_path_buf()).unwrap().cache.thumb_width, 200);
    }
}
