//! Run configuration: JSON config files plus environment-derived settings.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::types::Slot;
use crate::{Error, Result};

/// Where candidates come from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sources {
    #[serde(default, alias = "feeds")]
    pub rss: Vec<String>,
    #[serde(default)]
    pub list_pages: Vec<String>,
}

/// An entry of the people registry. Registry order is priority order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub name: String,
    #[serde(default, alias = "aliases")]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub image_source: Option<String>,
}

/// Per-slot overrides for the post templates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Templates {
    #[serde(default)]
    pub slot1: Option<String>,
    #[serde(default)]
    pub slot2: Option<String>,
    #[serde(default)]
    pub slot3: Option<String>,
}

impl Templates {
    pub fn for_slot(&self, slot: Slot) -> Option<&str> {
        match slot {
            Slot::First => self.slot1.as_deref(),
            Slot::Second => self.slot2.as_deref(),
            Slot::Third => self.slot3.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rules {
    #[serde(default)]
    pub themes: Vec<String>,
    #[serde(default)]
    pub writer_constraints: Vec<String>,
    #[serde(default)]
    pub templates: Templates,
}

/// The three JSON documents read from the config directory.
#[derive(Debug, Clone, Default)]
pub struct ContentConfig {
    pub sources: Sources,
    pub people: Vec<Person>,
    pub rules: Rules,
}

impl ContentConfig {
    pub fn load_dir(dir: &Path) -> Result<Self> {
        Ok(Self {
            sources: load_json(&dir.join("sources.json"))?,
            people: load_json(&dir.join("people.json"))?,
            rules: load_json(&dir.join("rules.json"))?,
        })
    }
}

fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;
    serde_json::from_str(&raw).map_err(|e| Error::Config(format!("failed to parse {}: {}", path.display(), e)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotAnchor {
    pub hour: u32,
    pub minute: u32,
}

impl SlotAnchor {
    pub const fn new(hour: u32, minute: u32) -> Self {
        Self { hour, minute }
    }

    /// Parses `HH:MM`; anything else falls back to `default`.
    pub fn parse_or(value: &str, default: SlotAnchor) -> SlotAnchor {
        let Some((h, m)) = value.trim().split_once(':') else {
            return default;
        };
        match (h.trim().parse::<u32>(), m.trim().parse::<u32>()) {
            (Ok(hour), Ok(minute)) if hour < 24 && minute < 60 => SlotAnchor { hour, minute },
            _ => default,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotAnchors {
    pub first: SlotAnchor,
    pub second: SlotAnchor,
    pub third: SlotAnchor,
}

impl SlotAnchors {
    pub fn get(&self, slot: Slot) -> SlotAnchor {
        match slot {
            Slot::First => self.first,
            Slot::Second => self.second,
            Slot::Third => self.third,
        }
    }
}

impl Default for SlotAnchors {
    fn default() -> Self {
        Self {
            first: SlotAnchor::new(9, 0),
            second: SlotAnchor::new(13, 0),
            third: SlotAnchor::new(20, 0),
        }
    }
}

/// How the scheduler gate maps the current time onto a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotPolicy {
    /// 09:00-13:00, 13:00-20:00 and 20:00-23:59; nothing before 09:00.
    FixedWindows,
    /// A slot is open for `window_minutes` after its anchor, within the anchor hour.
    Anchored {
        anchors: SlotAnchors,
        enabled: BTreeSet<Slot>,
        window_minutes: u32,
    },
}

impl Default for SlotPolicy {
    fn default() -> Self {
        SlotPolicy::FixedWindows
    }
}

pub const DEFAULT_WINDOW_MINUTES: u32 = 59;

/// OAuth 1.0a user-context credentials for the live X client.
#[derive(Clone, Default, PartialEq)]
pub struct XCredentials {
    pub api_key: String,
    pub api_secret: String,
    pub access_token: String,
    pub access_token_secret: String,
}

impl XCredentials {
    /// Environment keys whose values are still empty.
    pub fn missing(&self) -> Vec<&'static str> {
        [
            ("X_API_KEY", &self.api_key),
            ("X_API_SECRET", &self.api_secret),
            ("X_ACCESS_TOKEN", &self.access_token),
            ("X_ACCESS_TOKEN_SECRET", &self.access_token_secret),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(key, _)| key)
        .collect()
    }
}

impl fmt::Debug for XCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XCredentials")
            .field("missing", &self.missing())
            .finish_non_exhaustive()
    }
}

/// Environment-derived parameters of a pipeline run.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub db_path: PathBuf,
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
    pub cooldown: Duration,
    pub dedupe_days: u32,
    pub allow_image: bool,
    pub dry_run: bool,
    pub forced_slot: Option<Slot>,
    pub log_level: String,
    pub timezone: Tz,
    pub slot_policy: SlotPolicy,
    pub run_timeout: Option<Duration>,
    pub x_credentials: XCredentials,
    /// TrueType/OpenType font for the card text; the bundled font otherwise.
    pub card_font: Option<PathBuf>,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/bot.sqlite3"),
            config_dir: PathBuf::from("config"),
            data_dir: PathBuf::from("data"),
            cooldown: Duration::from_secs(600),
            dedupe_days: 14,
            allow_image: false,
            dry_run: true,
            forced_slot: None,
            log_level: "INFO".to_string(),
            timezone: chrono_tz::Asia::Tokyo,
            slot_policy: SlotPolicy::FixedWindows,
            run_timeout: None,
            x_credentials: XCredentials::default(),
            card_font: None,
        }
    }
}

impl RunSettings {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let cooldown = match get("COOLDOWN_SECONDS") {
            Some(v) => Duration::from_secs(parse_number(&v, "COOLDOWN_SECONDS")?),
            None => defaults.cooldown,
        };
        let dedupe_days = match get("DEDUPE_DAYS") {
            Some(v) => parse_number(&v, "DEDUPE_DAYS")?,
            None => defaults.dedupe_days,
        };
        let forced_slot = get("FORCE_SLOT").map(|v| v.parse::<Slot>()).transpose()?;
        let timezone = match get("PUBLISH_TZ") {
            Some(v) => v
                .parse::<Tz>()
                .map_err(|e| Error::Config(format!("PUBLISH_TZ: {}", e)))?,
            None => defaults.timezone,
        };
        let run_timeout = get("RUN_TIMEOUT_SECONDS")
            .map(|v| parse_number::<u64>(&v, "RUN_TIMEOUT_SECONDS").map(Duration::from_secs))
            .transpose()?;

        Ok(Self {
            db_path: get("DB_PATH").map(PathBuf::from).unwrap_or(defaults.db_path),
            config_dir: get("CONFIG_DIR").map(PathBuf::from).unwrap_or(defaults.config_dir),
            data_dir: get("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            cooldown,
            dedupe_days,
            allow_image: get("ALLOW_IMAGE").map(|v| v.eq_ignore_ascii_case("true")).unwrap_or(false),
            dry_run: get("DRY_RUN").map(|v| !v.eq_ignore_ascii_case("false")).unwrap_or(true),
            forced_slot,
            log_level: get("LOG_LEVEL").unwrap_or(defaults.log_level),
            timezone,
            slot_policy: slot_policy_from(&get)?,
            run_timeout,
            x_credentials: XCredentials {
                api_key: get("X_API_KEY").unwrap_or_default(),
                api_secret: get("X_API_SECRET").or_else(|| get("X_API_KEY_SECRET")).unwrap_or_default(),
                access_token: get("X_ACCESS_TOKEN").unwrap_or_default(),
                access_token_secret: get("X_ACCESS_TOKEN_SECRET").unwrap_or_default(),
            },
            card_font: get("CARD_FONT_PATH").map(PathBuf::from),
        })
    }
}

fn slot_policy_from<G>(get: &G) -> Result<SlotPolicy>
where
    G: Fn(&str) -> Option<String>,
{
    let kind = get("SLOT_POLICY").unwrap_or_else(|| "fixed".to_string());
    match kind.to_ascii_lowercase().as_str() {
        "fixed" => Ok(SlotPolicy::FixedWindows),
        "anchored" => {
            let defaults = SlotAnchors::default();
            let anchor = |key: &str, default: SlotAnchor| {
                get(key).map(|v| SlotAnchor::parse_or(&v, default)).unwrap_or(default)
            };
            let anchors = SlotAnchors {
                first: anchor("SLOT1_TIME", defaults.first),
                second: anchor("SLOT2_TIME", defaults.second),
                third: anchor("SLOT3_TIME", defaults.third),
            };
            let enabled = match get("ENABLED_SLOTS") {
                Some(v) => v
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| s.parse::<Slot>())
                    .collect::<Result<BTreeSet<_>>>()?,
                None => Slot::ALL.into_iter().collect(),
            };
            let window_minutes = match get("SLOT_WINDOW_MINUTES") {
                Some(v) => parse_number(&v, "SLOT_WINDOW_MINUTES")?,
                None => DEFAULT_WINDOW_MINUTES,
            };
            Ok(SlotPolicy::Anchored {
                anchors,
                enabled,
                window_minutes,
            })
        }
        other => Err(Error::Config(format!("SLOT_POLICY must be fixed or anchored, got {:?}", other))),
    }
}

fn parse_number<T: std::str::FromStr>(value: &str, key: &str) -> Result<T> {
    value
        .parse::<T>()
        .map_err(|_| Error::Config(format!("{} must be a non-negative integer, got {:?}", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> Result<RunSettings> {
        let env: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        RunSettings::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let s = settings(&[]).unwrap();
        assert_eq!(s.cooldown, Duration::from_secs(600));
        assert_eq!(s.dedupe_days, 14);
        assert!(!s.allow_image);
        assert!(s.dry_run);
        assert_eq!(s.forced_slot, None);
        assert_eq!(s.slot_policy, SlotPolicy::FixedWindows);
        assert_eq!(s.timezone, chrono_tz::Asia::Tokyo);
        assert_eq!(s.db_path, PathBuf::from("data/bot.sqlite3"));
    }

    #[test]
    fn test_overrides() {
        let s = settings(&[
            ("COOLDOWN_SECONDS", "30"),
            ("DEDUPE_DAYS", "2"),
            ("ALLOW_IMAGE", "TRUE"),
            ("DRY_RUN", "false"),
            ("FORCE_SLOT", "3"),
            ("PUBLISH_TZ", "Europe/Paris"),
        ])
        .unwrap();
        assert_eq!(s.cooldown, Duration::from_secs(30));
        assert_eq!(s.dedupe_days, 2);
        assert!(s.allow_image);
        assert!(!s.dry_run);
        assert_eq!(s.forced_slot, Some(Slot::Third));
        assert_eq!(s.timezone, chrono_tz::Europe::Paris);
    }

    #[test]
    fn test_x_credentials() {
        let s = settings(&[]).unwrap();
        assert_eq!(s.x_credentials.missing().len(), 4);

        let s = settings(&[
            ("X_API_KEY", "key"),
            ("X_API_KEY_SECRET", "legacy-secret"),
            ("X_ACCESS_TOKEN", "token"),
            ("X_ACCESS_TOKEN_SECRET", "token-secret"),
        ])
        .unwrap();
        assert!(s.x_credentials.missing().is_empty());
        assert_eq!(s.x_credentials.api_secret, "legacy-secret");
        assert!(!format!("{:?}", s).contains("token-secret"));

        let s = settings(&[("X_API_SECRET", "secret"), ("X_API_KEY_SECRET", "legacy-secret")]).unwrap();
        assert_eq!(s.x_credentials.api_secret, "secret");
        assert_eq!(s.x_credentials.missing(), vec!["X_API_KEY", "X_ACCESS_TOKEN", "X_ACCESS_TOKEN_SECRET"]);
    }

    #[test]
    fn test_invalid_numbers_are_errors() {
        assert!(settings(&[("COOLDOWN_SECONDS", "ten")]).is_err());
        assert!(settings(&[("FORCE_SLOT", "7")]).is_err());
        assert!(settings(&[("SLOT_POLICY", "random")]).is_err());
    }

    #[test]
    fn test_anchored_policy() {
        let s = settings(&[
            ("SLOT_POLICY", "anchored"),
            ("SLOT1_TIME", "08:30"),
            ("SLOT2_TIME", "garbage"),
            ("ENABLED_SLOTS", "1, 3"),
            ("SLOT_WINDOW_MINUTES", "15"),
        ])
        .unwrap();
        match s.slot_policy {
            SlotPolicy::Anchored {
                anchors,
                enabled,
                window_minutes,
            } => {
                assert_eq!(anchors.first, SlotAnchor::new(8, 30));
                assert_eq!(anchors.second, SlotAnchor::new(13, 0));
                assert_eq!(anchors.third, SlotAnchor::new(20, 0));
                assert_eq!(enabled.into_iter().collect::<Vec<_>>(), vec![Slot::First, Slot::Third]);
                assert_eq!(window_minutes, 15);
            }
            other => panic!("unexpected policy {:?}", other),
        }
    }

    #[test]
    fn test_people_accept_aliases_key() {
        let people: Vec<Person> = serde_json::from_str(
            r#"[{"name": "Ada", "aliases": ["lovelace"], "image_source": "wiki"},
                {"name": "Alan", "keywords": ["turing"]}]"#,
        )
        .unwrap();
        assert_eq!(people[0].keywords, vec!["lovelace"]);
        assert_eq!(people[1].keywords, vec!["turing"]);
        assert_eq!(people[1].image_source, None);
    }

    #[test]
    fn test_load_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("sources.json"), r#"{"rss": ["https://a/feed"], "list_pages": []}"#).unwrap();
        std::fs::write(dir.path().join("people.json"), "[]").unwrap();
        std::fs::write(
            dir.path().join("rules.json"),
            r#"{"themes": ["generative ai"], "templates": {"slot2": "{title}"}}"#,
        )
        .unwrap();

        let config = ContentConfig::load_dir(dir.path()).unwrap();
        assert_eq!(config.sources.rss, vec!["https://a/feed"]);
        assert!(config.people.is_empty());
        assert_eq!(config.rules.themes, vec!["generative ai"]);
        assert_eq!(config.rules.templates.for_slot(Slot::Second), Some("{title}"));
        assert_eq!(config.rules.templates.for_slot(Slot::First), None);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(ContentConfig::load_dir(dir.path()), Err(Error::Config(_))));
    }
}
