//! Configuration loading.
//!
//! Settings come from a TOML file and are then overridden by
//! `SPECPUSH_GIT_URL`, `SPECPUSH_GIT_USERNAME` and `SPECPUSH_GIT_PASSWORD`.

mod parser;
mod schema;

use std::path::{Path, PathBuf};

pub use parser::{parse_config, parse_config_str};
pub use schema::{GenerateMode, GitSettings, ProvisionSettings, ProvisionerConfig, ServerSettings};

/// `<config dir>/specpush/config.toml`, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("specpush").join("config.toml"))
}

/// Load configuration from `path`, or from [`default_config_path`] when it
/// exists, then apply environment overrides and validate.
///
/// An explicit path must exist; the default path is optional.
pub fn load(path: Option<&Path>) -> anyhow::Result<ProvisionerConfig> {
    load_with_env(path, default_config_path(), |key| std::env::var(key).ok())
}

fn load_with_env(
    path: Option<&Path>,
    default_path: Option<PathBuf>,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<ProvisionerConfig> {
    let mut config = match path {
        Some(path) => parse_config(path)?,
        None => match default_path.filter(|p| p.exists()) {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading default config");
                parse_config(&path)?
            }
            None => ProvisionerConfig::default(),
        },
    };
    config.apply_env_with(lookup);
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn env_only_configuration_is_enough() {
        let config = load_with_env(
            None,
            None,
            env(&[
                ("SPECPUSH_GIT_URL", "https://git.example.com/org/specs.git"),
                ("SPECPUSH_GIT_USERNAME", "bot"),
                ("SPECPUSH_GIT_PASSWORD", "hunter2"),
            ]),
        )
        .unwrap();

        assert_eq!(
            config.repo_url().unwrap(),
            "https://git.example.com/org/specs.git"
        );
        assert_eq!(config.credentials().unwrap().username(), "bot");
    }

    #[test]
    fn env_overrides_file_values() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(
            &path,
            "[git]\nurl = \"https://file.example.com/r.git\"\nusername = \"file-user\"\npassword = \"file-pass\"\n",
        )
        .unwrap();

        let config = load_with_env(
            Some(&path),
            None,
            env(&[("SPECPUSH_GIT_PASSWORD", "env-pass")]),
        )
        .unwrap();

        assert_eq!(config.git.username.as_deref(), Some("file-user"));
        assert_eq!(
            config.git.password.as_ref().unwrap().expose_secret(),
            "env-pass"
        );
    }

    #[test]
    fn missing_required_key_is_named() {
        let err = load_with_env(
            None,
            None,
            env(&[
                ("SPECPUSH_GIT_URL", "https://git.example.com/org/specs.git"),
                ("SPECPUSH_GIT_USERNAME", "bot"),
            ]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("git.password"), "{err}");
    }

    #[test]
    fn explicit_missing_file_errors() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope.toml");
        assert!(load_with_env(Some(&missing), None, env(&[])).is_err());
    }

    #[test]
    fn absent_default_file_is_skipped() {
        let temp = TempDir::new().unwrap();
        let config = load_with_env(
            None,
            Some(temp.path().join("config.toml")),
            env(&[
                ("SPECPUSH_GIT_URL", "file:///srv/specs.git"),
                ("SPECPUSH_GIT_USERNAME", "bot"),
                ("SPECPUSH_GIT_PASSWORD", "pw"),
            ]),
        )
        .unwrap();
        assert_eq!(config.provision.fixed_branch, "dev");
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(
            &path,
            "[git]\nurl = \"u\"\nusername = \"a\"\npassword = \"b\"\n[provision]\ntimeout_secs = 0\n",
        )
        .unwrap();
        let err = load_with_env(Some(&path), None, env(&[])).unwrap_err();
        assert!(err.to_string().contains("timeout_secs"));
    }
}
