use std::path::PathBuf;

use anyhow::{Context, bail};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub media_dir: PathBuf,
    pub jwt_secret: String,
    /// Seconds between expired-story sweeps.
    pub story_sweep_secs: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let jwt_secret = get("VISTA_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("VISTA_JWT_SECRET is unset or still a placeholder; set it in your .env file");
        }

        let port = get("VISTA_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("VISTA_PORT must be a port number")?;

        Ok(Self {
            host: get("VISTA_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            db_path: get("VISTA_DB_PATH").unwrap_or_else(|| "vista.db".into()).into(),
            media_dir: get("VISTA_MEDIA_DIR").unwrap_or_else(|| "./media".into()).into(),
            jwt_secret,
            story_sweep_secs: get("VISTA_STORY_SWEEP_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(3600),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn placeholder_secret_is_refused() {
        assert!(Config::from_lookup(lookup(&[])).is_err());
        assert!(Config::from_lookup(lookup(&[("VISTA_JWT_SECRET", "dev-secret-change-me")])).is_err());
    }

    #[test]
    fn defaults_fill_the_rest() {
        let config = Config::from_lookup(lookup(&[("VISTA_JWT_SECRET", "s3cret")])).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.db_path, PathBuf::from("vista.db"));
        assert_eq!(config.story_sweep_secs, 3600);

        let bad_port = lookup(&[("VISTA_JWT_SECRET", "s3cret"), ("VISTA_PORT", "web")]);
        assert!(Config::from_lookup(bad_port).is_err());
    }
}
