use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use confique::{Config as _, serde::{self, Deserialize as _}};

use crate::{
    auth::AuthConfig,
    engine::EngineConfig,
    http::HttpConfig,
    log::LogConfig,
    prelude::*,
};


/// Paths that are tried in order when neither `--config` nor
/// `GANDER_CONFIG_PATH` specify a location.
const DEFAULT_PATHS: &[&str] = &["config.toml", "/etc/gander/config.toml"];

#[derive(Debug, confique::Config)]
pub struct Config {
    #[config(nested)]
    pub auth: AuthConfig,

    #[config(nested)]
    pub engine: EngineConfig,

    #[config(nested)]
    pub http: HttpConfig,

    #[config(nested)]
    pub log: LogConfig,
}

/// Loads the configuration, layering environment variables over the config
/// file over the defaults. A missing file is only an error if its path was
/// given explicitly; every option has a default or is optional, so running
/// without any file works too.
pub fn load(flag: Option<&Path>) -> Result<Config> {
    let explicit = match flag {
        Some(path) => Some(path.to_owned()),
        None => std::env::var_os("GANDER_CONFIG_PATH").map(PathBuf::from),
    };

    // The builder ignores missing files. That is intended for the default
    // locations, but a path named via flag or env has to exist: a typo'd
    // `--config` must not quietly start an open, unconfigured console.
    if let Some(path) = &explicit {
        if !path.exists() {
            bail!("config file '{}' does not exist", path.display());
        }
    }

    let path = explicit
        .or_else(|| DEFAULT_PATHS.iter().map(PathBuf::from).find(|p| p.exists()));

    let mut builder = Config::builder().env();
    if let Some(path) = &path {
        builder = builder.file(path);
    }
    builder.load().context("failed to load configuration")
}

pub fn template() -> String {
    let mut options = confique::toml::FormatOptions::default();
    options.general.nested_field_gap = 2;
    confique::toml::template::<Config>(options)
}

/// Custom format for durations in the config file: an integer directly
/// followed by a unit (`ms`, `s`, `min`, `h` or `d`), e.g. `"30s"`. A bare
/// `"0"` is allowed.
pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where D: serde::Deserializer<'de>,
{
    use serde::de::Error;

    let s = String::deserialize(deserializer)?;
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let unit_start = s.find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| D::Error::custom("duration is missing its unit"))?;
    let (num, unit) = s.split_at(unit_start);
    let num: u32 = num.parse()
        .map_err(|e| D::Error::custom(format!("invalid number in duration: {e}")))?;
    let num: u64 = num.into();

    match unit {
        "ms" => Ok(Duration::from_millis(num)),
        "s" => Ok(Duration::from_secs(num)),
        "min" => Ok(Duration::from_secs(num * 60)),
        "h" => Ok(Duration::from_secs(num * 60 * 60)),
        "d" => Ok(Duration::from_secs(num * 60 * 60 * 24)),
        _ => Err(D::Error::custom(format!("unknown duration unit '{unit}'"))),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde::de::{IntoDeserializer, value::Error as DeError};

    fn parse(s: &str) -> Result<Duration, DeError> {
        deserialize_duration(s.into_deserializer())
    }

    #[test]
    fn durations_with_units() {
        assert_eq!(parse("0").unwrap(), Duration::ZERO);
        assert_eq!(parse("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse("3s").unwrap(), Duration::from_secs(3));
        assert_eq!(parse("10min").unwrap(), Duration::from_secs(600));
        assert_eq!(parse("2h").unwrap(), Duration::from_secs(2 * 3600));
        assert_eq!(parse("1d").unwrap(), Duration::from_secs(24 * 3600));
    }

    #[test]
    fn bad_durations() {
        assert!(parse("").is_err());
        assert!(parse("10").is_err());
        assert!(parse("s").is_err());
        assert!(parse("10 s").is_err());
        assert!(parse("-4s").is_err());
        assert!(parse("3 parsecs").is_err());
    }

    #[test]
    fn missing_explicit_config_file() {
        let err = load(Some(Path::new("/does/not/exist/gander.toml"))).unwrap_err();
        assert!(format!("{err}").contains("does not exist"), "unexpected error: {err:#}");
    }
}
