use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Parser;
use sp_core::{ContentConfig, Publisher, Result, RetryPolicy, RunLogger, RunSettings, Slot};
use sp_pipeline::{Pipeline, RunOutcome};
use sp_publish::{CardRenderer, XClient};
use sp_scrapers::HttpFetcher;
use tracing::{error, info};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;

const LOG_FILE: &str = "logs/bot.log";

#[derive(Debug, Clone)]
struct HumanDuration(Duration);

impl FromStr for HumanDuration {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut total_seconds = 0u64;
        let mut current_number = String::new();
        let mut has_number = false;

        for c in s.chars() {
            if c.is_ascii_digit() {
                current_number.push(c);
            } else if let Ok(num) = current_number.parse::<u64>() {
                let unit = match c {
                    's' => 1,
                    'm' => 60,
                    'h' => 3600,
                    _ => return Err(format!("Invalid duration unit: {}", c)),
                };
                total_seconds = num
                    .checked_mul(unit)
                    .and_then(|secs| total_seconds.checked_add(secs))
                    .ok_or_else(|| format!("Duration too large: {}", s))?;
                current_number.clear();
                has_number = true;
            } else if !c.is_whitespace() {
                return Err(format!("Invalid character in duration: {}", c));
            }
        }

        // A trailing bare number counts as seconds
        if !current_number.is_empty() {
            let secs = current_number
                .parse::<u64>()
                .map_err(|_| "Invalid number in duration".to_string())?;
            total_seconds = total_seconds
                .checked_add(secs)
                .ok_or_else(|| format!("Duration too large: {}", s))?;
            has_number = true;
        }

        if !has_number {
            return Err("Duration must include a number".to_string());
        }

        Ok(HumanDuration(Duration::from_secs(total_seconds)))
    }
}

/// Picks one collected article and publishes it in the current time slot.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Force a slot (1, 2 or 3) instead of deriving it from the clock
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=3))]
    slot: Option<u8>,
    /// Directory holding sources.json, people.json and rules.json
    #[arg(long)]
    config_dir: Option<PathBuf>,
    /// SQLite database file
    #[arg(long)]
    db_path: Option<PathBuf>,
    /// Abort the run after this long (e.g. 30s, 5m, 1h15m)
    #[arg(long)]
    timeout: Option<HumanDuration>,
    #[arg(long, default_value = "sqlite")]
    storage: String,
}

fn init_logging(level: &str) {
    let level = LevelFilter::from_str(level).unwrap_or(LevelFilter::INFO);

    let file_layer = std::fs::create_dir_all("logs")
        .and_then(|_| OpenOptions::new().create(true).append(true).open(LOG_FILE))
        .map(|file| {
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file))
        })
        .ok();

    tracing_subscriber::registry()
        .with(level)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
}

async fn run(cli: &Cli, settings: RunSettings) -> Result<RunOutcome> {
    let content = ContentConfig::load_dir(&settings.config_dir)?;
    info!(
        "📚 Loaded {} feeds, {} listing pages, {} people",
        content.sources.rss.len(),
        content.sources.list_pages.len(),
        content.people.len()
    );

    let fetcher = Arc::new(HttpFetcher::new(RetryPolicy::default())?);
    let renderer = match &settings.card_font {
        Some(path) => CardRenderer::new(fetcher.clone()).with_font_file(path)?,
        None => CardRenderer::new(fetcher.clone()),
    };
    let renderer = Arc::new(renderer);
    let publisher = Arc::new(XClient::from_settings(&settings)?);
    info!("📣 Publisher {} ready (dry run: {})", publisher.name(), publisher.is_dry_run());

    let slot = cli.slot.map(Slot::try_from).transpose()?;
    let store = sp_storage::create_storage(&cli.storage, &settings.db_path).await?;
    info!("💾 Storage ready ({} at {})", cli.storage, settings.db_path.display());

    let pipeline = Pipeline::new(store.clone(), fetcher, renderer, publisher, content, settings)
        .with_logger(RunLogger::new().with_new_prefixes("[slotpost]"));
    let result = pipeline.run(slot).await;

    store.close().await;
    result
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut settings = match RunSettings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            return ExitCode::from(1);
        }
    };
    if let Some(dir) = &cli.config_dir {
        settings.config_dir = dir.clone();
    }
    if let Some(path) = &cli.db_path {
        settings.db_path = path.clone();
    }
    if let Some(timeout) = &cli.timeout {
        settings.run_timeout = Some(timeout.0);
    }

    init_logging(&settings.log_level);

    match run(&cli, settings).await {
        Ok(outcome) => {
            info!("🏁 Run finished: {:?}", outcome);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("💥 Fatal run error: {}", e);
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_duration() {
        assert_eq!("30s".parse::<HumanDuration>().unwrap().0, Duration::from_secs(30));
        assert_eq!("5m".parse::<HumanDuration>().unwrap().0, Duration::from_secs(300));
        assert_eq!("1h15m".parse::<HumanDuration>().unwrap().0, Duration::from_secs(4500));
        assert_eq!("90".parse::<HumanDuration>().unwrap().0, Duration::from_secs(90));
        assert!("5x".parse::<HumanDuration>().is_err());
        assert!("".parse::<HumanDuration>().is_err());
    }

    #[test]
    fn test_human_duration_overflow_is_error() {
        assert!("18446744073709551615h".parse::<HumanDuration>().is_err());
        assert!("18446744073709551615s1s".parse::<HumanDuration>().is_err());
        assert!("18446744073709551615s1".parse::<HumanDuration>().is_err());
        assert!("99999999999999999999s".parse::<HumanDuration>().is_err());
        assert_eq!(
            "18446744073709551615s".parse::<HumanDuration>().unwrap().0,
            Duration::from_secs(u64::MAX)
        );
    }

    #[test]
    fn test_cli_slot_range() {
        let cli = Cli::try_parse_from(["slotpost", "--slot", "2", "--timeout", "2m"]).unwrap();
        assert_eq!(cli.slot, Some(2));
        assert_eq!(cli.timeout.unwrap().0, Duration::from_secs(120));
        assert_eq!(cli.storage, "sqlite");
        assert!(Cli::try_parse_from(["slotpost", "--slot", "4"]).is_err());
        assert!(Cli::try_parse_from(["slotpost", "--slot", "0"]).is_err());
    }
}
