use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const DEFAULT_API_URL: &str = "http://localhost:3000/api";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ConfigFile {
    pub api_url: Option<String>,
    pub token: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub token: Option<String>,
    pub api_key: Option<String>,
}

/// Values given on the command line; each one wins over env and file.
#[derive(Debug, Default)]
pub struct Overrides<'a> {
    pub api_url: Option<&'a str>,
    pub token: Option<&'a str>,
    pub api_key: Option<&'a str>,
}

impl Config {
    /// Load config: file → env vars → CLI flags (later overrides earlier)
    pub fn load(cli: Overrides<'_>) -> Result<Self> {
        let file_config = load_config_file().unwrap_or_default();
        Ok(Self::resolve(cli, |key| std::env::var(key).ok(), file_config))
    }

    fn resolve(
        cli: Overrides<'_>,
        env: impl Fn(&str) -> Option<String>,
        file: ConfigFile,
    ) -> Self {
        let api_url = cli
            .api_url
            .map(String::from)
            .or_else(|| env("HALCYON_API_URL"))
            .or(file.api_url)
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let token = cli
            .token
            .map(String::from)
            .or_else(|| env("HALCYON_TOKEN"))
            .or(file.token);

        let api_key = cli
            .api_key
            .map(String::from)
            .or_else(|| env("HALCYON_API_KEY"))
            .or(file.api_key);

        Config {
            api_url,
            token,
            api_key,
        }
    }
}

fn config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir().context("Could not determine config directory")?;
    Ok(config_dir.join("halcyon").join("config.toml"))
}

fn load_config_file() -> Result<ConfigFile> {
    let path = config_path()?;
    if !path.exists() {
        return Ok(ConfigFile::default());
    }
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: ConfigFile =
        toml::from_str(&contents).with_context(|| "Failed to parse config file")?;
    Ok(config)
}

fn apply(config: &mut ConfigFile, key: &str, value: Option<&str>) -> Result<()> {
    let value = value.map(String::from);
    match key {
        "api_url" => config.api_url = value,
        "token" => config.token = value,
        "api_key" => config.api_key = value,
        _ => anyhow::bail!("Unknown config key: {}", key),
    }
    Ok(())
}

fn store(key: &str, value: Option<&str>) -> Result<PathBuf> {
    let path = config_path()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
    }

    let mut config = load_config_file().unwrap_or_default();
    apply(&mut config, key, value)?;

    let toml_str = toml::to_string_pretty(&config)?;
    std::fs::write(&path, toml_str)
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;
    Ok(path)
}

pub fn set_config_value(key: &str, value: &str) -> Result<()> {
    let path = store(key, Some(value))?;
    println!("Saved {} to {}", key, path.display());
    Ok(())
}

pub fn clear_config_value(key: &str) -> Result<()> {
    let path = store(key, None)?;
    println!("Cleared {} in {}", key, path.display());
    Ok(())
}

/// Prints the effective configuration with secrets masked.
pub fn show(config: &Config) {
    let mask = |v: &Option<String>| match v {
        Some(s) if s.chars().count() > 8 => format!("{}…", s.chars().take(8).collect::<String>()),
        Some(_) => "(set)".to_string(),
        None => "-".to_string(),
    };
    let path = config_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| "-".into());
    println!("Config file: {path}");
    println!("API URL:     {}", config.api_url);
    println!("Token:       {}", mask(&config.token));
    println!("API key:     {}", mask(&config.api_key));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_any_source() {
        let cfg = Config::resolve(Overrides::default(), env_from(&[]), ConfigFile::default());
        assert_eq!(cfg.api_url, DEFAULT_API_URL);
        assert!(cfg.token.is_none());
        assert!(cfg.api_key.is_none());
    }

    #[test]
    fn test_precedence_flag_env_file() {
        let file = ConfigFile {
            api_url: Some("http://file".into()),
            token: Some("file-token".into()),
            api_key: Some("file-key".into()),
        };
        let env = env_from(&[
            ("HALCYON_API_URL", "http://env"),
            ("HALCYON_TOKEN", "env-token"),
        ]);
        let cli = Overrides {
            api_url: Some("http://flag"),
            ..Default::default()
        };

        let cfg = Config::resolve(cli, env, file);
        assert_eq!(cfg.api_url, "http://flag");
        assert_eq!(cfg.token.as_deref(), Some("env-token"));
        assert_eq!(cfg.api_key.as_deref(), Some("file-key"));
    }

    #[test]
    fn test_apply_known_and_unknown_keys() {
        let mut cfg = ConfigFile::default();
        apply(&mut cfg, "token", Some("abc")).unwrap();
        assert_eq!(cfg.token.as_deref(), Some("abc"));
        apply(&mut cfg, "token", None).unwrap();
        assert!(cfg.token.is_none());
        assert!(apply(&mut cfg, "password", Some("x")).is_err());
    }
}
