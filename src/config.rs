use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, warn};

pub const CONFIG_FILE_NAME: &str = ".cqlrun.json";
const DEFAULT_SCRIPTS_DIRECTORY: &str = "./cql-scripts";
const DEFAULT_CREDENTIALS_PATH: &str = "./cqlrun-credentials.json";

static SETTINGS: OnceLock<Settings> = OnceLock::new();

/// Effective paths for a run, absolute after resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub scripts_directory: PathBuf,
    pub credentials_path: PathBuf,
}

/// On-disk shape of `.cqlrun.json`. Missing keys keep the defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    scripts_directory: Option<String>,
    #[serde(alias = "firebaseKeyPath")]
    credentials_path: Option<String>,
}

impl Settings {
    /// Resolve once per process from the working and home directories.
    pub fn load() -> &'static Settings {
        SETTINGS.get_or_init(|| {
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            Self::resolve(&cwd, dirs::home_dir().as_deref())
        })
    }

    pub fn resolve(cwd: &Path, home: Option<&Path>) -> Settings {
        let mut scripts_directory = DEFAULT_SCRIPTS_DIRECTORY.to_string();
        let mut credentials_path = DEFAULT_CREDENTIALS_PATH.to_string();

        for location in config_locations(cwd, home) {
            if !location.exists() {
                continue;
            }
            match read_config_file(&location) {
                Ok(file) => {
                    debug!("Using config file {}", location.display());
                    if let Some(dir) = file.scripts_directory {
                        scripts_directory = dir;
                    }
                    if let Some(path) = file.credentials_path {
                        credentials_path = path;
                    }
                    break;
                }
                Err(e) => {
                    warn!("Could not parse config file {}: {}", location.display(), e);
                }
            }
        }

        Settings {
            scripts_directory: cwd.join(scripts_directory),
            credentials_path: cwd.join(credentials_path),
        }
    }
}

pub fn config_locations(cwd: &Path, home: Option<&Path>) -> Vec<PathBuf> {
    let mut locations = vec![cwd.join(CONFIG_FILE_NAME)];
    if let Some(home) = home {
        locations.push(home.join(CONFIG_FILE_NAME));
        locations.push(home.join(".config").join("cqlrun.json"));
    }
    locations
}

fn read_config_file(path: &Path) -> Result<ConfigFile, String> {
    let content = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    serde_json::from_str(&content).map_err(|e| e.to_string())
}

pub fn sample_config() -> String {
    let sample = serde_json::json!({
        "scriptsDirectory": "./cql-scripts",
        "credentialsPath": "./cqlrun-credentials.json"
    });
    serde_json::to_string_pretty(&sample).unwrap_or_default()
}
