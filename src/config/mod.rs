pub mod generate;
pub mod parse;
pub mod types;

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub use parse::{load_config, parse_config, ConfigError};
pub use types::{Config, HarvestConfig, SinkConfig, SourceConfig, StorageConfig, WebConfig};

const APP_DIR: &str = "nsg-harvester";

/// `$env{VAR_NAME}` where the name starts with a letter or underscore.
const ENV_VAR_PATTERN: &str = r"\$env\{([A-Za-z_][A-Za-z0-9_]*)\}";

pub(crate) fn env_var_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(ENV_VAR_PATTERN).unwrap())
}

/// Expands environment variables in a string.
/// Supports $env{VAR_NAME} syntax.
/// If an environment variable is not set, it's left unchanged.
pub fn expand_env_vars(text: &str) -> String {
    env_var_regex()
        .replace_all(text, |caps: &regex::Captures| {
            let whole = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
            caps.get(1)
                .and_then(|name| std::env::var(name.as_str()).ok())
                .unwrap_or_else(|| whole.to_string())
        })
        .to_string()
}

/// Expands a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();

    if let Some(rest) = path_str.strip_prefix("~/") {
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir.join(rest);
        }
    } else if path_str == "~" {
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir;
        }
    }

    path.to_path_buf()
}

/// Default config locations, in search order.
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(home_dir) = dirs::home_dir() {
        paths.push(home_dir.join(".config").join(APP_DIR).join("config.yml"));
    }
    paths.push(PathBuf::from("/etc").join(APP_DIR).join("config.yml"));
    paths
}

/// Resolves the config file path: the explicit path if given, otherwise the
/// first existing default location.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(expand_tilde(path));
    }

    default_config_paths().into_iter().find(|p| p.exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("NSG_CFG_VAR1", "value1");
        std::env::set_var("NSG_CFG_VAR2", "value2");
        let result = expand_env_vars("$env{NSG_CFG_VAR1}/middle/$env{NSG_CFG_VAR2}");
        assert_eq!(result, "value1/middle/value2");
        std::env::remove_var("NSG_CFG_VAR1");
        std::env::remove_var("NSG_CFG_VAR2");
    }

    #[test]
    fn test_expand_env_vars_unset() {
        let result = expand_env_vars("path/$env{NSG_CFG_NONEXISTENT}/file");
        assert_eq!(result, "path/$env{NSG_CFG_NONEXISTENT}/file");
    }

    #[test]
    fn test_expand_env_vars_ignores_shell_syntax() {
        assert_eq!(expand_env_vars("${HOME}/x"), "${HOME}/x");
    }

    #[test]
    fn test_expand_tilde() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde(Path::new("~/state")), home.join("state"));
            assert_eq!(expand_tilde(Path::new("~")), home);
        }
        assert_eq!(expand_tilde(Path::new("/abs/path")), Path::new("/abs/path"));
        assert_eq!(expand_tilde(Path::new("rel/path")), Path::new("rel/path"));
    }

    #[test]
    fn test_explicit_config_path_wins() {
        let resolved = resolve_config_path(Some(Path::new("/tmp/custom.yml")));
        assert_eq!(resolved, Some(PathBuf::from("/tmp/custom.yml")));
    }

    #[test]
    fn test_default_paths_order() {
        let paths = default_config_paths();
        assert_eq!(
            paths.last().unwrap(),
            Path::new("/etc/nsg-harvester/config.yml")
        );
    }
}
