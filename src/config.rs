use std::{fmt::Display, net::SocketAddr, path::PathBuf, str::FromStr};

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub download_root: PathBuf,
    pub public_dir: PathBuf,
    pub cookies_file: Option<PathBuf>,
    pub ytdlp_bin: PathBuf,
    pub ffmpeg_bin: PathBuf,
    pub audio_format: String,
    pub default_quality: String,
    pub job_log_capacity: usize,
    pub archive_enabled: bool,
    pub archive_include_containers: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key/value source. Missing keys take their
    /// defaults; unparsable values are an error.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            bind_address: parse_or(&get, "BIND_ADDRESS", "0.0.0.0:8000")?,
            download_root: get("DOWNLOAD_ROOT").unwrap_or_else(|| "downloads".into()).into(),
            public_dir: get("PUBLIC_DIR").unwrap_or_else(|| "public".into()).into(),
            cookies_file: Some(get("COOKIES_FILE").unwrap_or_else(|| "cookies.txt".into()).into()),
            ytdlp_bin: get("YTDLP_BIN").unwrap_or_else(|| "yt-dlp".into()).into(),
            ffmpeg_bin: get("FFMPEG_BIN").unwrap_or_else(|| "ffmpeg".into()).into(),
            audio_format: get("AUDIO_FORMAT")
                .unwrap_or_else(|| "mp3".into())
                .to_lowercase(),
            default_quality: get("DEFAULT_QUALITY").unwrap_or_else(|| "192".into()),
            job_log_capacity: parse_or(&get, "JOB_LOG_CAPACITY", "1000")?,
            archive_enabled: parse_bool_or(&get, "ARCHIVE_ENABLED", true)?,
            archive_include_containers: parse_bool_or(&get, "ARCHIVE_INCLUDE_CONTAINERS", false)?,
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
    G: Fn(&str) -> Option<String>,
{
    let raw = get(key).unwrap_or_else(|| default.to_string());

    raw.trim()
        .parse::<T>()
        .map_err(|e| anyhow::anyhow!("{e}"))
        .with_context(|| format!("Invalid value for {key}: {raw:?}"))
}

fn parse_bool_or<G>(get: &G, key: &str, default: bool) -> anyhow::Result<bool>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key).map(|v| v.trim().to_lowercase()).as_deref() {
        None => Ok(default),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => anyhow::bail!("Invalid value for {key}: {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect::<HashMap<_, _>>();

        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = config(&[]).expect("defaults should parse");

        assert_eq!(config.bind_address, "0.0.0.0:8000".parse().expect("addr"));
        assert_eq!(config.download_root, PathBuf::from("downloads"));
        assert_eq!(config.cookies_file, Some(PathBuf::from("cookies.txt")));
        assert_eq!(config.audio_format, "mp3");
        assert_eq!(config.job_log_capacity, 1000);
        assert!(config.archive_enabled);
        assert!(!config.archive_include_containers);
    }

    #[test]
    fn overrides() {
        let config = config(&[
            ("BIND_ADDRESS", "127.0.0.1:9000"),
            ("AUDIO_FORMAT", "OPUS"),
            ("JOB_LOG_CAPACITY", "50"),
            ("ARCHIVE_ENABLED", "off"),
            ("PUBLIC_DIR", "  "),
        ])
        .expect("overrides should parse");

        assert_eq!(config.bind_address.port(), 9000);
        assert_eq!(config.audio_format, "opus");
        assert_eq!(config.job_log_capacity, 50);
        assert!(!config.archive_enabled);
        assert_eq!(config.public_dir, PathBuf::from("public"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(config(&[("JOB_LOG_CAPACITY", "lots")]).is_err());
        assert!(config(&[("ARCHIVE_ENABLED", "maybe")]).is_err());
        assert!(config(&[("BIND_ADDRESS", "nowhere")]).is_err());
    }
}
