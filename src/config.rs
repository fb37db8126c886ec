//! Command-line and environment configuration.
//!
//! Every flag can also come from the environment (and therefore from a
//! `.env` file, which `main` loads before parsing).

use std::collections::HashSet;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;

use crate::summarizer::{
    SummaryRequest, DEFAULT_MAX_OUTPUT_TOKENS, DEFAULT_MISTRAL_MODEL, DEFAULT_SYSTEM_PROMPT,
};
use crate::watermark::is_valid_feed_name;

/// Hacker News feeds known by name.
const PRESETS: &[(&str, &str)] = &[
    ("jobs", "https://hnrss.org/jobs"),
    ("frontpage", "https://hnrss.org/frontpage"),
    ("bestcomments", "https://hnrss.org/bestcomments"),
];

/// Feeds relayed when no `--feed` is given.
const DEFAULT_FEEDS: &[&str] = &["jobs", "frontpage"];

/// A feed to relay: `name` keys its watermark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSpec {
    pub name: String,
    pub url: String,
}

impl FromStr for FeedSpec {
    type Err = String;

    /// `name=url`, or a bare preset name (`jobs`, `frontpage`,
    /// `bestcomments`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, url) = match s.split_once('=') {
            Some((name, url)) => (name.trim(), url.trim().to_string()),
            None => {
                let name = s.trim();
                let url = PRESETS
                    .iter()
                    .find(|(preset, _)| *preset == name)
                    .map(|(_, url)| url.to_string())
                    .ok_or_else(|| {
                        format!("unknown feed '{name}'; use NAME=URL or one of jobs, frontpage, bestcomments")
                    })?;
                (name, url)
            }
        };

        if !is_valid_feed_name(name) {
            return Err(format!(
                "invalid feed name '{name}': use ASCII letters, digits, '-' or '_'"
            ));
        }
        if url.is_empty() {
            return Err(format!("feed '{name}' has an empty URL"));
        }

        Ok(Self {
            name: name.to_string(),
            url,
        })
    }
}

#[derive(Debug, Parser)]
#[command(name = "feed-relay", version, about)]
pub struct Cli {
    /// Feed to relay, as NAME=URL or a preset name. Repeatable.
    #[arg(long = "feed", value_name = "NAME[=URL]")]
    pub feeds: Vec<FeedSpec>,

    /// Directory holding the per-feed watermark files.
    #[arg(long, env = "FEED_RELAY_STATE_DIR", default_value = ".")]
    pub state_dir: PathBuf,

    /// Seconds to wait between two messages of the same feed.
    #[arg(long, env = "FEED_RELAY_DELAY_SECS", default_value_t = 1200)]
    pub delay_secs: u64,

    /// Seconds between polling rounds.
    #[arg(long, env = "FEED_RELAY_INTERVAL_SECS", default_value_t = 3600)]
    pub interval_secs: u64,

    /// Run a single round and exit.
    #[arg(long)]
    pub once: bool,

    /// Print messages instead of sending them, and keep watermarks in memory.
    #[arg(long)]
    pub dry_run: bool,

    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    pub telegram_bot_token: Option<String>,

    #[arg(long, env = "TELEGRAM_CHANNEL_ID")]
    pub telegram_channel_id: Option<String>,

    #[arg(long, env = "MISTRAL_API_KEY", hide_env_values = true)]
    pub mistral_api_key: String,

    #[arg(long, env = "MISTRAL_MODEL", default_value = DEFAULT_MISTRAL_MODEL)]
    pub mistral_model: String,

    /// Upper bound on summary length, in model tokens.
    #[arg(long, default_value_t = DEFAULT_MAX_OUTPUT_TOKENS)]
    pub max_summary_tokens: u32,

    /// System prompt for the summarizer.
    #[arg(long, env = "FEED_RELAY_SYSTEM_PROMPT")]
    pub system_prompt: Option<String>,
}

/// Where messages go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Telegram { bot_token: String, channel_id: String },
    Stdout,
}

/// When rounds run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    Once,
    Every(Duration),
}

/// Validated settings the binary wires the pipeline from.
#[derive(Debug, Clone)]
pub struct Settings {
    pub feeds: Vec<FeedSpec>,
    pub state_dir: PathBuf,
    pub delay: Duration,
    pub schedule: Schedule,
    pub delivery: Delivery,
    pub dry_run: bool,
    pub mistral_api_key: String,
    pub mistral_model: String,
    pub summary: SummaryRequest,
}

impl Cli {
    pub fn into_settings(self) -> Result<Settings> {
        let feeds = if self.feeds.is_empty() {
            DEFAULT_FEEDS
                .iter()
                .map(|name| name.parse::<FeedSpec>().map_err(anyhow::Error::msg))
                .collect::<Result<Vec<_>>>()?
        } else {
            self.feeds
        };

        let mut seen = HashSet::new();
        for feed in &feeds {
            if !seen.insert(feed.name.as_str()) {
                bail!("feed '{}' is configured more than once", feed.name);
            }
        }

        let delivery = if self.dry_run {
            Delivery::Stdout
        } else {
            match (self.telegram_bot_token, self.telegram_channel_id) {
                (Some(bot_token), Some(channel_id)) => Delivery::Telegram {
                    bot_token,
                    channel_id,
                },
                _ => bail!(
                    "TELEGRAM_BOT_TOKEN and TELEGRAM_CHANNEL_ID must be set (or pass --dry-run)"
                ),
            }
        };

        if self.interval_secs == 0 && !self.once {
            bail!("--interval-secs must be positive");
        }
        let schedule = if self.once {
            Schedule::Once
        } else {
            Schedule::Every(Duration::from_secs(self.interval_secs))
        };

        Ok(Settings {
            feeds,
            state_dir: self.state_dir,
            delay: Duration::from_secs(self.delay_secs),
            schedule,
            delivery,
            dry_run: self.dry_run,
            mistral_api_key: self.mistral_api_key,
            mistral_model: self.mistral_model,
            summary: SummaryRequest {
                system_prompt: self
                    .system_prompt
                    .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
                max_output_tokens: self.max_summary_tokens,
            },
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use clap::{CommandFactory, FromArgMatches};

    /// Parse `args` with every env fallback switched off, so variables in the
    /// test process (or a loaded `.env`) cannot change the outcome.
    fn parse(args: &[&str]) -> Result<Settings> {
        let mut argv = vec!["feed-relay", "--mistral-api-key", "k"];
        argv.extend_from_slice(args);
        let matches = Cli::command()
            .mut_args(|arg| arg.env(None::<&'static str>))
            .try_get_matches_from(argv)?;
        Cli::from_arg_matches(&matches)?.into_settings()
    }

    #[test]
    fn feed_spec_from_pair_and_preset() {
        let custom: FeedSpec = "lobsters=https://lobste.rs/rss".parse().unwrap();
        assert_eq!(custom.name, "lobsters");
        assert_eq!(custom.url, "https://lobste.rs/rss");

        let preset: FeedSpec = "bestcomments".parse().unwrap();
        assert_eq!(preset.url, "https://hnrss.org/bestcomments");
    }

    #[test]
    fn feed_spec_rejects_bad_input() {
        assert!("nope".parse::<FeedSpec>().is_err());
        assert!("../x=https://a.test".parse::<FeedSpec>().is_err());
        assert!("x=".parse::<FeedSpec>().is_err());
    }

    #[test]
    fn defaults_to_jobs_and_frontpage() {
        let s = parse(&["--dry-run"]).unwrap();
        let names: Vec<_> = s.feeds.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["jobs", "frontpage"]);
        assert_eq!(s.delay, Duration::from_secs(1200));
        assert_eq!(s.summary, SummaryRequest::default());
        assert_eq!(s.delivery, Delivery::Stdout);
    }

    #[test]
    fn once_and_interval() {
        assert_eq!(parse(&["--dry-run", "--once"]).unwrap().schedule, Schedule::Once);
        assert_eq!(
            parse(&["--dry-run", "--interval-secs", "60"]).unwrap().schedule,
            Schedule::Every(Duration::from_secs(60))
        );
        assert!(parse(&["--dry-run", "--interval-secs", "0"]).is_err());
    }

    #[test]
    fn duplicate_feed_names_are_rejected() {
        let err = parse(&["--dry-run", "--feed", "jobs", "--feed", "jobs=https://x.test"])
            .unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn telegram_credentials_required_unless_dry_run() {
        let s = parse(&[
            "--telegram-bot-token",
            "123:abc",
            "--telegram-channel-id",
            "@chan",
        ])
        .unwrap();
        assert_eq!(
            s.delivery,
            Delivery::Telegram {
                bot_token: "123:abc".into(),
                channel_id: "@chan".into()
            }
        );

        let err = parse(&["--telegram-channel-id", "@chan"]).unwrap_err();
        assert!(err.to_string().contains("TELEGRAM_BOT_TOKEN"));
        assert!(parse(&[]).is_err());
    }

    #[test]
    fn env_fallbacks_are_off_in_these_tests() {
        let cmd = Cli::command().mut_args(|arg| arg.env(None::<&'static str>));
        assert!(cmd.get_arguments().all(|arg| arg.get_env().is_none()));
    }

    #[test]
    fn summary_overrides() {
        let s = parse(&[
            "--dry-run",
            "--system-prompt",
            "one line",
            "--max-summary-tokens",
            "128",
        ])
        .unwrap();
        assert_eq!(s.summary.system_prompt, "one line");
        assert_eq!(s.summary.max_output_tokens, 128);
    }
}
