use std::env;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    pub urls: Option<Vec<String>>,
    #[serde(alias = "input_file")]
    pub url_file: Option<String>,
    pub wordlist: Option<String>,
    #[serde(alias = "concurrency")]
    pub threads: Option<usize>,
    pub timeout: Option<u64>,
    #[serde(alias = "workers")]
    pub processes: Option<usize>,
    pub proxy: Option<String>,
    pub verbose: Option<bool>,
    pub output_dir: Option<String>,
    pub no_color: Option<bool>,
}

const HOME_VARS: [&str; 2] = ["HOME", "USERPROFILE"];

fn home_dir() -> Option<PathBuf> {
    HOME_VARS
        .iter()
        .filter_map(|var| env::var_os(var))
        .find(|value| !value.is_empty())
        .map(PathBuf::from)
}

pub fn default_config_path() -> Option<PathBuf> {
    home_dir().map(|home| home.join(".dirprobe").join("config.yml"))
}

/// `~` alone or a leading `~/` resolves against the home directory; anything
/// else, including `~user/...`, is returned unchanged.
pub fn expand_tilde(path: &str) -> PathBuf {
    let rest = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with(['/', '\\']) => rest,
        _ => return PathBuf::from(path),
    };
    match home_dir() {
        Some(home) => home.join(rest.trim_start_matches(['/', '\\'])),
        None => PathBuf::from(path),
    }
}

pub fn expand_tilde_string(path: &str) -> String {
    expand_tilde(path).to_string_lossy().to_string()
}

pub fn parse_config(contents: &str) -> Result<ConfigFile, String> {
    serde_yaml::from_str::<ConfigFile>(contents).map_err(|e| e.to_string())
}

pub fn load_config(path: &PathBuf, allow_missing: bool) -> Result<ConfigFile, String> {
    match std::fs::read_to_string(path) {
        Ok(contents) => parse_config(&contents)
            .map_err(|e| format!("failed to parse config '{}': {e}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && allow_missing => {
            Ok(ConfigFile::default())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(format!("config file not found '{}'", path.display()))
        }
        Err(e) => Err(format!("failed to read config '{}': {e}", path.display())),
    }
}
