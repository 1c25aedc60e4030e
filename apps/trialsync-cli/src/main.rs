//! `trialsync` command-line entry point.
//!
//! One subcommand per entity stream, plus `auth` for session acquisition
//! and `import` for the user-provisioning pipeline.  All vault endpoints
//! are configured through `CTMS_*` / `CDMS_*` environment variables (a
//! `.env` file is honored).

use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use trialsync_client::{RetryPolicy, SessionStore, VaultClient, VaultConfig};
use trialsync_engine::{
    run_import, run_study_create, streams, CsvStore, FailureLog, FileWatermarkStore,
    StreamDefinition, StudyCreateSettings, SyncRun,
};

#[derive(Debug, Parser)]
#[command(name = "trialsync", version, about = "Incremental CTMS/CDMS sync and user provisioning")]
struct Cli {
    /// Retry budget for transient vault failures.
    #[arg(long, global = true, default_value_t = 3)]
    max_retries: u32,

    /// Base backoff delay in seconds.
    #[arg(long, global = true, default_value_t = 1)]
    retry_delay_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum System {
    Ctms,
    Cdms,
}

impl System {
    fn prefix(self) -> &'static str {
        match self {
            System::Ctms => "CTMS",
            System::Cdms => "CDMS",
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Authenticate against a vault and store the session token.
    ///
    /// Credentials come from `<SYSTEM>_USERNAME` / `<SYSTEM>_PASSWORD`
    /// unless overridden by `--username`.
    Auth {
        #[arg(value_enum)]
        system: System,

        #[arg(long)]
        username: Option<String>,
    },

    /// Sync modified CTMS studies into the study store.
    Studies {
        #[arg(long, default_value = "ctms_studies.csv")]
        output: PathBuf,
    },

    /// Sync a vault's modified users into its user store.
    Users {
        #[arg(value_enum)]
        system: System,

        /// Defaults to `<system>_users.csv`.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Sync modified CTMS study-person assignments into the
    /// import-template store.
    StudyPerson {
        #[arg(long, default_value = "study_person.csv")]
        output: PathBuf,
    },

    /// Create the exported CTMS studies in the CDMS and verify each one
    /// registered.
    StudyCreate {
        #[arg(long, default_value = "ctms_studies.csv")]
        export: PathBuf,

        #[arg(long, default_value = "cdms_study_failures.csv")]
        failures: PathBuf,

        /// Organization the studies are created under.
        #[arg(long)]
        organization: String,

        /// Seconds to wait between submission and the existence check.
        #[arg(long, default_value_t = 3)]
        registration_delay_secs: u64,

        /// Seconds to wait between studies.
        #[arg(long, default_value_t = 5)]
        pacing_delay_secs: u64,
    },

    /// Validate the import template against both vaults and submit the
    /// accepted candidates to the CDMS.
    Import {
        #[arg(long, default_value = "study_person.csv")]
        template: PathBuf,

        #[arg(long, default_value = "import_failures.csv")]
        failures: PathBuf,

        /// Append to existing site/country access instead of replacing it.
        #[arg(long)]
        append_site_country_access: bool,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run(Cli::parse()).await {
        error!(error = %e, "run failed");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let retry = RetryPolicy::new(cli.max_retries, cli.retry_delay_secs);

    match cli.command {
        Command::Auth { system, username } => auth(system, username).await,
        Command::Studies { output } => {
            sync_stream(System::Ctms, &streams::CTMS_STUDIES, output, &retry).await
        }
        Command::Users { system, output } => {
            let stream = match system {
                System::Ctms => &streams::CTMS_USERS,
                System::Cdms => &streams::CDMS_USERS,
            };
            let output = output.unwrap_or_else(|| {
                PathBuf::from(format!("{}_users.csv", system.prefix().to_lowercase()))
            });
            sync_stream(system, stream, output, &retry).await
        }
        Command::StudyPerson { output } => {
            sync_stream(System::Ctms, &streams::CTMS_STUDY_PERSON, output, &retry).await
        }
        Command::StudyCreate {
            export,
            failures,
            organization,
            registration_delay_secs,
            pacing_delay_secs,
        } => {
            let mut settings = StudyCreateSettings::new(organization);
            settings.registration_delay = std::time::Duration::from_secs(registration_delay_secs);
            settings.pacing_delay = std::time::Duration::from_secs(pacing_delay_secs);
            let report = run_study_create(
                &client(System::Cdms)?,
                &export,
                &FailureLog::new(failures),
                &settings,
            )
            .await?;
            info!(
                created = report.created,
                failed = report.failed,
                skipped = report.skipped,
                "study creation complete"
            );
            Ok(())
        }
        Command::Import {
            template,
            failures,
            append_site_country_access,
        } => {
            let report = run_import(
                &client(System::Cdms)?,
                &client(System::Ctms)?,
                &template,
                &FailureLog::new(failures),
                append_site_country_access,
            )
            .await?;
            info!(
                submitted = report.submitted,
                rejected = report.rejected,
                "import complete"
            );
            Ok(())
        }
    }
}

async fn auth(system: System, username: Option<String>) -> Result<(), Box<dyn Error>> {
    let prefix = system.prefix();
    let config = VaultConfig::from_env(prefix)?;
    let username = match username {
        Some(name) => name,
        None => std::env::var(format!("{prefix}_USERNAME"))
            .map_err(|_| format!("set {prefix}_USERNAME or pass --username"))?,
    };
    let password = std::env::var(format!("{prefix}_PASSWORD"))
        .map_err(|_| format!("set {prefix}_PASSWORD"))?;

    let session_id = VaultClient::authenticate(&config, &username, &password).await?;
    SessionStore::new(config.session_file.clone()).save(&session_id)?;
    info!(
        system = prefix,
        session_file = %config.session_file.display(),
        "session token stored"
    );
    Ok(())
}

async fn sync_stream(
    system: System,
    stream: &StreamDefinition,
    output: PathBuf,
    retry: &RetryPolicy,
) -> Result<(), Box<dyn Error>> {
    let client = client(system)?;
    let mut watermarks = FileWatermarkStore::new(watermark_file());
    let store = CsvStore::new(output, stream.key_column);

    let summary = SyncRun::new(&client, &mut watermarks, retry)
        .run(stream, &store)
        .await?;
    info!(
        stream = stream.stream_id,
        fetched = summary.fetched,
        exported = summary.exported,
        skipped = summary.skipped,
        watermark = summary.watermark.as_deref().unwrap_or("unchanged"),
        "sync complete"
    );
    Ok(())
}

fn client(system: System) -> Result<VaultClient, Box<dyn Error>> {
    let config = VaultConfig::from_env(system.prefix())?;
    let session_id = SessionStore::new(config.session_file.clone()).load()?;
    Ok(VaultClient::new(&config, session_id)?)
}

fn watermark_file() -> PathBuf {
    std::env::var("TRIALSYNC_WATERMARK_FILE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("watermarks.json"))
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
    fn users_subcommand_parses_system() {
        let cli = Cli::parse_from(["trialsync", "users", "cdms"]);
        assert!(matches!(
            cli.command,
            Command::Users {
                system: System::Cdms,
                output: None
            }
        ));
    }

    #[test]
    fn retry_flags_have_defaults() {
        let cli = Cli::parse_from(["trialsync", "studies"]);
        assert_eq!(cli.max_retries, 3);
        assert_eq!(cli.retry_delay_secs, 1);
    }
}
