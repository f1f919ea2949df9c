//! git-bits — git extension for large binary files
//!
//! Stdout carries flow data (manifests and reassembled bytes); logs go to
//! stderr. Exits 0 on success and 1 on any error propagated from the core.

mod git;
mod install;

use anyhow::Context;
use bits_core::{MissingChunk, Repository, S3Remote};
use clap::{Parser, Subcommand};
use git::GitHost;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "git-bits")]
#[command(about = "Git extension for large binary files")]
#[command(version)]
struct Cli {
    /// Working directory of the host repository
    #[arg(long, global = true)]
    workdir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true, env = "GIT_BITS_DEBUG")]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Queries the git database for all chunk keys in blobs
    Scan,
    /// Splits a file into chunks and stores them locally
    Split,
    /// Combines chunks back into the original file
    Combine,
    /// Fetches chunks from the remote store and saves each locally
    Fetch,
    /// Fetches chunks for split files in the working tree and combines them
    Pull {
        /// Revision whose tree is walked for manifests
        #[arg(default_value = "HEAD")]
        reference: String,
    },
    /// Pushes locally stored chunks to the remote store
    Push,
    /// Configures filters, creates the pre-push hook and stores credentials
    Install {
        /// Name of the S3 bucket used as chunk remote
        #[arg(short, long)]
        bucket: Option<String>,
        /// Git remote that will be configured for chunk storage
        #[arg(short, long, default_value = "origin")]
        remote: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("bits_core={level},bits_cli={level}").into()),
        )
        .with_writer(std::io::stderr)
        .init();

    run(cli).await
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let workdir = match cli.workdir {
        Some(dir) => dir,
        None => std::env::current_dir().context("failed to get working directory")?,
    };
    let host = GitHost::new(&workdir);

    let command = match cli.command {
        Command::Install { bucket, remote } => {
            return install::run(&host, bucket, remote).await;
        }
        command => command,
    };

    let conf = host.load_conf().await?;
    let repo = Repository::with_conf(&workdir, conf).context("failed to open repository")?;
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    match command {
        Command::Scan => repo.scan(stdin, stdout, &host).await?,
        Command::Split => repo.split(stdin, stdout).await?,
        Command::Combine => {
            // the remote is only consulted for chunks missing locally
            if repo.conf().bucket.is_empty() {
                repo.combine(stdin, stdout, None).await?;
            } else {
                let remote = connect(&repo, &host).await?;
                repo.combine(stdin, stdout, Some(&remote)).await?;
            }
        }
        Command::Fetch => {
            let remote = connect(&repo, &host).await?;
            repo.fetch(stdin, stdout, &remote, MissingChunk::Fail)
                .await?;
        }
        Command::Pull { reference } => {
            let remote = connect(&repo, &host).await?;
            repo.pull(&reference, stdout, &remote, &host).await?;
        }
        Command::Push => {
            let remote = connect(&repo, &host).await?;
            let store = repo.local_store()?;
            let result = repo.push(&store, stdin, &remote).await;
            store.close();
            result?;
        }
        Command::Install { .. } => unreachable!("handled above"),
    }
    Ok(())
}

async fn connect(repo: &Repository, host: &GitHost) -> anyhow::Result<S3Remote> {
    let remote_name = host.remote_name().await?;
    tracing::debug!(
        remote = %remote_name,
        bucket = %repo.conf().bucket,
        "connecting to chunk remote"
    );
    Ok(S3Remote::connect(repo.conf(), remote_name).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn all_subcommands_parse() {
        for name in ["scan", "split", "combine", "fetch", "pull", "push"] {
            let cli = Cli::try_parse_from(["git-bits", name]).unwrap();
            assert!(!format!("{:?}", cli.command).is_empty());
        }
    }

    #[test]
    fn pull_defaults_to_head() {
        let cli = Cli::try_parse_from(["git-bits", "pull"]).unwrap();
        match cli.command {
            Command::Pull { reference } => assert_eq!(reference, "HEAD"),
            other => panic!("expected pull, got {other:?}"),
        }
    }

    #[test]
    fn install_flags_have_defaults() {
        let cli = Cli::try_parse_from(["git-bits", "install", "-b", "chunks"]).unwrap();
        match cli.command {
            Command::Install { bucket, remote } => {
                assert_eq!(bucket.as_deref(), Some("chunks"));
                assert_eq!(remote, "origin");
            }
            other => panic!("expected install, got {other:?}"),
        }
    }

    #[test]
    fn subcommands_have_help_text() {
        for sub in Cli::command().get_subcommands() {
            assert!(sub.get_about().is_some(), "{} has no about", sub.get_name());
        }
    }
}
