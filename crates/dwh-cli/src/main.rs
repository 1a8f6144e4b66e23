//! `dwh`: song-play warehouse ETL.
//!
//! Reads `dwh.cfg` (or the path given with `--config`) and runs one stage of
//! the pipeline, the whole pipeline, or the cluster lifecycle around it.
//!
//! # Usage
//!
//! ```
//! dwh up                      # provision role + cluster, print the endpoint
//! dwh etl                     # reset, load, transform, audit
//! dwh audit --json            # audit only, machine-readable
//! dwh run                     # up, etl, down
//! dwh --warehouse sqlite --sqlite-path local.db etl
//! ```

mod settings;

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use dwh_cluster::{AwsCloud, ClusterEndpoint, ClusterLifecycle};
use dwh_core::{
  audit::{AuditPolicy, AuditReport},
  pipeline::{Pipeline, PipelineOptions},
  staging::StagingConfig,
  warehouse::Warehouse,
};
use dwh_store_redshift::{RedshiftConfig, RedshiftWarehouse};
use dwh_store_sqlite::SqliteWarehouse;
use settings::Settings;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::EnvFilter;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "dwh", author, version, about = "Song-play data warehouse ETL")]
struct Cli {
  /// Path to the INI configuration file.
  #[arg(short, long, value_name = "FILE", default_value = "dwh.cfg")]
  config: PathBuf,

  /// Warehouse to run statements against.
  #[arg(long, value_enum, default_value_t = Backend::Redshift)]
  warehouse: Backend,

  /// Database file for the SQLite warehouse.
  #[arg(long, value_name = "FILE", default_value = "dwh.sqlite")]
  sqlite_path: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Backend {
  /// The cluster from `[cluster]`.
  Redshift,
  /// A local SQLite file; `[s3]` paths are read from disk.
  Sqlite,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Provision the IAM role and cluster and wait until it is available.
  Up,
  /// Delete the cluster, then the IAM role.
  Down,
  /// Drop and recreate every table.
  Reset,
  /// Overwrite the staging tables from their sources.
  Load,
  /// Populate the fact and dimension tables from staging.
  Transform {
    /// Insert even if dimensional tables already hold rows.
    #[arg(long)]
    allow_append: bool,
  },
  /// Check the dimensional tables for duplicated keys.
  Audit {
    #[command(flatten)]
    report: ReportArgs,
  },
  /// Reset, load, transform and audit.
  Etl {
    #[command(flatten)]
    report: ReportArgs,
  },
  /// Bring a cluster up, run the ETL on it, and tear it down again.
  Run {
    #[command(flatten)]
    report: ReportArgs,
  },
}

#[derive(clap::Args, Debug, Clone, Copy)]
struct ReportArgs {
  /// Print the audit report as JSON.
  #[arg(long)]
  json: bool,

  /// Exit with an error when duplicated keys are found.
  #[arg(long)]
  fail_on_duplicates: bool,
}

impl ReportArgs {
  fn apply(self, mut options: PipelineOptions) -> PipelineOptions {
    if self.fail_on_duplicates {
      options.audit_policy = AuditPolicy::FailOnViolation;
    }
    options
  }
}

/// One data-path invocation.
#[derive(Debug, Clone, Copy)]
enum Stage {
  Reset,
  Load,
  Transform,
  Audit { json: bool },
  Etl { json: bool },
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Logs go to stderr so reports on stdout stay machine-readable.
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = Settings::load(&cli.config)
    .with_context(|| format!("failed to read configuration from {}", cli.config.display()))?;
  let options = settings.pipeline_options();
  for (key, location) in settings.s3.mirrors() {
    warn!(%key, %location, "mirror destinations are not written; ignoring");
  }

  match cli.command {
    Command::Up => {
      let endpoint = lifecycle(&settings)
        .await?
        .bring_up()
        .await
        .context("failed to bring up the cluster")?;
      print_endpoint(&endpoint, &settings);
      Ok(())
    }
    Command::Down => lifecycle(&settings)
      .await?
      .tear_down()
      .await
      .context("failed to tear down the cluster"),
    Command::Reset => run_stage(&cli, &settings, Stage::Reset, options).await,
    Command::Load => run_stage(&cli, &settings, Stage::Load, options).await,
    Command::Transform { allow_append } => {
      let options = PipelineOptions {
        require_empty_dimensions: options.require_empty_dimensions && !allow_append,
        ..options
      };
      run_stage(&cli, &settings, Stage::Transform, options).await
    }
    Command::Audit { report } => {
      let stage = Stage::Audit { json: report.json };
      run_stage(&cli, &settings, stage, report.apply(options)).await
    }
    Command::Etl { report } => {
      let stage = Stage::Etl { json: report.json };
      run_stage(&cli, &settings, stage, report.apply(options)).await
    }
    Command::Run { report } => {
      if cli.warehouse == Backend::Sqlite {
        anyhow::bail!("`run` provisions a Redshift cluster and cannot use --warehouse sqlite");
      }
      run_provisioned(&settings, report.apply(options), report.json).await
    }
  }
}

// ─── Data path ────────────────────────────────────────────────────────────────

async fn run_stage(
  cli: &Cli,
  settings: &Settings,
  stage: Stage,
  options: PipelineOptions,
) -> anyhow::Result<()> {
  let staging = settings.staging();
  match cli.warehouse {
    Backend::Redshift => {
      let config = settings.redshift()?;
      run_on_redshift(&config, staging, stage, options).await
    }
    Backend::Sqlite => {
      let warehouse = SqliteWarehouse::open(&cli.sqlite_path)
        .await
        .with_context(|| format!("failed to open {}", cli.sqlite_path.display()))?;
      execute(&Pipeline::new(warehouse, staging, options), stage).await
    }
  }
}

async fn run_on_redshift(
  config: &RedshiftConfig,
  staging: StagingConfig,
  stage: Stage,
  options: PipelineOptions,
) -> anyhow::Result<()> {
  info!(host = %config.host, port = config.port, database = %config.database, "connecting");
  let warehouse = RedshiftWarehouse::connect(config)
    .await
    .with_context(|| format!("failed to connect to {}:{}", config.host, config.port))?;
  execute(&Pipeline::new(warehouse, staging, options), stage).await
}

async fn execute<W: Warehouse>(pipeline: &Pipeline<W>, stage: Stage) -> anyhow::Result<()> {
  match stage {
    Stage::Reset => pipeline.reset_schema().await?,
    Stage::Load => pipeline.load_staging().await?,
    Stage::Transform => pipeline.transform().await?,
    Stage::Audit { json } => return print_audit(pipeline.check_duplicates().await, json),
    Stage::Etl { json } => return print_audit(pipeline.run().await, json),
  }
  Ok(())
}

/// Print the report, including the one carried by a policy violation.
fn print_audit(result: dwh_core::Result<AuditReport>, json: bool) -> anyhow::Result<()> {
  let (report, violated) = match result {
    Ok(report) => (report, false),
    Err(dwh_core::Error::DuplicatesFound(report)) => (report, true),
    Err(e) => return Err(e.into()),
  };

  if json {
    println!("{}", serde_json::to_string_pretty(&report).context("failed to encode report")?);
  } else {
    print!("{report}");
  }

  if violated {
    return Err(dwh_core::Error::DuplicatesFound(report).into());
  }
  Ok(())
}

// ─── Cluster ──────────────────────────────────────────────────────────────────

async fn lifecycle(settings: &Settings) -> anyhow::Result<ClusterLifecycle<AwsCloud>> {
  let cloud = AwsCloud::connect(settings.aws()?).await;
  let ingress_cidr = settings
    .dwh
    .as_ref()
    .map(|dwh| dwh.ingress_cidr.clone())
    .unwrap_or_else(|| "0.0.0.0/0".into());
  Ok(
    ClusterLifecycle::new(cloud, settings.cluster_spec()?)
      .with_wait_policy(settings.wait_policy()?)
      .with_ingress_cidr(ingress_cidr),
  )
}

fn print_endpoint(endpoint: &ClusterEndpoint, settings: &Settings) {
  let (db_name, db_user) = settings
    .dwh
    .as_ref()
    .map(|dwh| (dwh.db.as_str(), dwh.db_user.as_str()))
    .unwrap_or_default();
  println!("[cluster]");
  println!("host = {}", endpoint.address);
  println!("db_name = {db_name}");
  println!("db_user = {db_user}");
  println!("db_port = {}", endpoint.port);
  println!();
  println!("[iam_role]");
  println!("arn = {}", endpoint.role_arn);
}

/// Up, ETL against the new endpoint, down. Tear-down runs whatever the ETL
/// outcome; the first error wins.
async fn run_provisioned(
  settings: &Settings,
  options: PipelineOptions,
  json: bool,
) -> anyhow::Result<()> {
  let lifecycle = lifecycle(settings).await?;
  let endpoint = lifecycle
    .bring_up()
    .await
    .context("failed to bring up the cluster")?;

  let staging = settings.staging().with_role_arn(&endpoint.role_arn);
  let etl = match settings.provisioned_redshift(&endpoint.address, endpoint.port) {
    Ok(config) => run_on_redshift(&config, staging, Stage::Etl { json }, options).await,
    Err(e) => Err(e),
  };

  let teardown = lifecycle
    .tear_down()
    .await
    .context("failed to tear down the cluster");

  match (etl, teardown) {
    (Err(e), Err(teardown)) => {
      error!(error = ?teardown, "tear-down also failed");
      Err(e)
    }
    (Err(e), Ok(())) => Err(e),
    (Ok(()), teardown) => teardown,
  }
}
