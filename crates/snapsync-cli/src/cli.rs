//! Argument parsing, logging setup, and the single top-level error handler.

use std::time::Duration;

use clap::{Parser, ValueEnum};
use snapsync_telemetry::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, init_logging};
use tracing::{debug, error};

use crate::client::ReplicationClient;
use crate::context::{ConnectionContext, DEFAULT_API_PORT, RelationshipId, SyncMode};
use crate::error::{EXIT_FAILURE, SyncResult};
use crate::resync::run_sync;

/// Parses CLI arguments, runs the resync, and logs any failure.
/// Returns the process exit code.
pub async fn run() -> i32 {
    let cli = Cli::parse();

    if let Err(err) = init_logging(&cli.logging_config()) {
        eprintln!("error: {err}");
        return EXIT_FAILURE;
    }

    run_with(&cli).await
}

/// Execute a parsed invocation against the already-installed subscriber.
pub(crate) async fn run_with(cli: &Cli) -> i32 {
    report(execute(cli).await)
}

/// Top-level handler: every failure is logged once and mapped to an exit code.
pub(crate) fn report<T>(result: SyncResult<T>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(err) => {
            error!("{err}");
            error!("Unhandled error occurred, program exited.");
            err.exit_code()
        }
    }
}

async fn execute(cli: &Cli) -> SyncResult<()> {
    let context = cli.connection_context()?;
    let id = RelationshipId::parse(&cli.uuid)?;
    debug!(
        cluster = context.cluster(),
        port = context.port(),
        "connecting to cluster management API"
    );

    let client = ReplicationClient::new(&context)?;
    run_sync(&client, &id, context.mode()).await?;
    Ok(())
}

#[derive(Parser)]
#[command(
    name = "snapsync",
    version,
    about = "Trigger a SnapMirror resync through the cluster REST API"
)]
pub(crate) struct Cli {
    #[arg(short = 'c', long = "cluster", help = "Target cluster hostname")]
    cluster: String,
    #[arg(short = 'u', long = "api_user", help = "API username")]
    api_user: String,
    #[arg(short = 'p', long = "api_password", help = "API password")]
    api_password: String,
    #[arg(
        short = 'o',
        long = "api_port",
        default_value_t = DEFAULT_API_PORT,
        help = "API port"
    )]
    api_port: u16,
    #[arg(short = 'i', long = "uuid", help = "SnapMirror relationship uuid")]
    uuid: String,
    #[arg(short = 'm', long = "mode", value_enum, help = "Target SnapMirror state")]
    mode: SyncMode,
    #[arg(long, help = "Per-request timeout in seconds (unbounded when omitted)")]
    timeout: Option<u64>,
    #[arg(long, default_value = DEFAULT_LOG_LEVEL, help = "Log filter directive")]
    log_level: String,
    #[arg(long, value_enum, default_value_t = LogFormatArg::Text, help = "Log output format")]
    log_format: LogFormatArg,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum LogFormatArg {
    #[default]
    Text,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(value: LogFormatArg) -> Self {
        match value {
            LogFormatArg::Text => Self::Text,
            LogFormatArg::Json => Self::Json,
        }
    }
}

impl Cli {
    fn logging_config(&self) -> LoggingConfig<'_> {
        LoggingConfig {
            level: &self.log_level,
            format: self.log_format.into(),
        }
    }

    fn connection_context(&self) -> SyncResult<ConnectionContext> {
        ConnectionContext::new(
            &self.cluster,
            self.api_port,
            &self.api_user,
            &self.api_password,
            self.mode,
            self.timeout.map(Duration::from_secs),
        )
    }
}
