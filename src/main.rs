use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use podbridge::{Config, PublishOutcome};

#[derive(Parser, Debug)]
#[command(
    name = "podbridge",
    about = "Convert a hosted podcast RSS feed into a Spotify-ready feed"
)]
struct Args {
    /// TOML configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Source feed URL (overrides source_feed_url)
    #[arg(long, value_name = "URL")]
    source_url: Option<String>,

    /// Contact email for spotify:email (overrides owner_email)
    #[arg(long, value_name = "EMAIL")]
    owner_email: Option<String>,

    /// Maximum number of episodes to publish (overrides episode_limit)
    #[arg(long, value_name = "N", allow_negative_numbers = true)]
    limit: Option<i64>,

    /// Output file (overrides output_path)
    #[arg(long, short, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Write a commit message describing new and updated episodes
    #[arg(long, value_name = "FILE")]
    commit_message: Option<PathBuf>,

    /// Print the converted feed instead of writing it
    #[arg(long)]
    stdout: bool,
}

impl Args {
    fn into_config(self) -> Result<(Config, Option<PathBuf>, bool)> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)
                .with_context(|| format!("Failed to load config '{}'", path.display()))?,
            None => Config::default(),
        };
        if let Some(url) = self.source_url {
            config.source_feed_url = url;
        }
        if let Some(email) = self.owner_email {
            config.owner_email = Some(email);
        }
        if let Some(limit) = self.limit {
            config.episode_limit = limit;
        }
        if let Some(path) = self.output {
            config.output_path = path;
        }
        Ok((config, self.commit_message, self.stdout))
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let (config, commit_message_path, to_stdout) = Args::parse().into_config()?;

    let converted = podbridge::run(&config)
        .await
        .context("Conversion failed; the published feed was left untouched")?;

    if to_stdout {
        use std::io::Write;
        std::io::stdout()
            .write_all(&converted)
            .context("Failed to write feed to stdout")?;
        return Ok(());
    }

    let path = &config.output_path;
    let publication =
        podbridge::publish_with_report(path, &converted, commit_message_path.as_deref())
            .with_context(|| format!("Failed to publish '{}'", path.display()))?;

    match publication.outcome {
        PublishOutcome::Unchanged => println!("Feed unchanged: {}", path.display()),
        PublishOutcome::Written if publication.changes.is_empty() => {
            println!("Feed updated: {}", path.display());
            tracing::info!("No new or updated episodes");
        }
        PublishOutcome::Written => {
            println!("Feed updated: {}", path.display());
            println!("{}", publication.changes.commit_title());
            println!("{}", publication.changes.commit_body());
        }
    }

    Ok(())
}
