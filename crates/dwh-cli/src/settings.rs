//! The `dwh.cfg` settings tree.
//!
//! An INI file layered under `DWH_`-prefixed environment variables, where a
//! double underscore separates section from key (`DWH_CLUSTER__HOST`).

use std::{path::Path, time::Duration};

use anyhow::Context as _;
use config::{Config, ConfigError, Environment, File, FileFormat, Map, Source};
use dwh_cluster::{AwsCredentials, ClusterSpec, WaitPolicy};
use dwh_core::{audit::AuditPolicy, pipeline::PipelineOptions, staging::StagingConfig};
use dwh_store_redshift::RedshiftConfig;
use serde::Deserialize;

const DEFAULT_REGION: &str = "us-west-2";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
  pub aws:      Option<AwsCredentials>,
  pub dwh:      Option<DwhSection>,
  pub cluster:  Option<ClusterSection>,
  pub iam_role: Option<IamRoleSection>,
  pub s3:       S3Section,
  #[serde(default)]
  pub etl:      EtlSection,
}

/// Shape of the cluster to provision, and the database created on it.
#[derive(Debug, Clone, Deserialize)]
pub struct DwhSection {
  pub cluster_type:       String,
  pub num_nodes:          u32,
  pub node_type:          String,
  pub cluster_identifier: String,
  pub db:                 String,
  pub db_user:            String,
  pub db_password:        String,
  pub port:               u16,
  pub iam_role_name:      String,
  #[serde(default = "default_poll_interval_secs")]
  pub poll_interval_secs: u64,
  #[serde(default = "default_max_poll_attempts")]
  pub max_poll_attempts:  u32,
  #[serde(default = "default_ingress_cidr")]
  pub ingress_cidr:       String,
}

/// An already running cluster.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterSection {
  pub host:        String,
  pub db_name:     String,
  pub db_user:     String,
  pub db_password: String,
  pub db_port:     u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IamRoleSection {
  pub arn: String,
}

/// Source locations. The `*_dest` keys name mirrored copies; they are
/// accepted for compatibility with existing configs and never written to.
#[derive(Debug, Clone, Deserialize)]
pub struct S3Section {
  pub log_data:          String,
  pub log_jsonpath:      String,
  pub song_data:         String,
  #[serde(default)]
  pub log_data_dest:     Option<String>,
  #[serde(default)]
  pub log_jsonpath_dest: Option<String>,
  #[serde(default)]
  pub song_data_dest:    Option<String>,
}

impl S3Section {
  /// Configured mirror destinations as `(key, location)`.
  pub fn mirrors(&self) -> Vec<(&'static str, &str)> {
    [
      ("log_data_dest", &self.log_data_dest),
      ("log_jsonpath_dest", &self.log_jsonpath_dest),
      ("song_data_dest", &self.song_data_dest),
    ]
    .into_iter()
    .filter_map(|(key, dest)| dest.as_deref().filter(|d| !d.is_empty()).map(|d| (key, d)))
    .collect()
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EtlSection {
  #[serde(default)]
  pub audit_policy:             AuditPolicy,
  #[serde(default = "default_true")]
  pub require_empty_dimensions: bool,
}

impl Default for EtlSection {
  fn default() -> Self {
    let options = PipelineOptions::default();
    Self {
      audit_policy:             options.audit_policy,
      require_empty_dimensions: options.require_empty_dimensions,
    }
  }
}

fn default_poll_interval_secs() -> u64 { 15 }
fn default_max_poll_attempts() -> u32 { 80 }
fn default_ingress_cidr() -> String { "0.0.0.0/0".into() }
fn default_true() -> bool { true }

impl Settings {
  /// Read `path` (if it exists) and the process environment.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    Self::build(File::from(path).format(FileFormat::Ini).required(false), None)
  }

  fn build<S>(file: S, env: Option<Map<String, String>>) -> Result<Self, ConfigError>
  where
    S: Source + Send + Sync + 'static,
  {
    Config::builder()
      .add_source(file)
      .add_source(
        Environment::with_prefix("DWH")
          .prefix_separator("_")
          .separator("__")
          .source(env),
      )
      .build()?
      .try_deserialize()
  }

  pub fn pipeline_options(&self) -> PipelineOptions {
    PipelineOptions {
      audit_policy:             self.etl.audit_policy,
      require_empty_dimensions: self.etl.require_empty_dimensions,
    }
  }

  pub fn region(&self) -> &str {
    self
      .aws
      .as_ref()
      .map(|aws| aws.region.as_str())
      .filter(|region| !region.is_empty())
      .unwrap_or(DEFAULT_REGION)
  }

  /// Staging sources, read with the `[iam_role]` ARN when one is set.
  pub fn staging(&self) -> StagingConfig {
    StagingConfig {
      log_data:     self.s3.log_data.clone(),
      log_jsonpath: self.s3.log_jsonpath.clone(),
      song_data:    self.s3.song_data.clone(),
      role_arn:     self.iam_role.as_ref().map(|r| r.arn.clone()).unwrap_or_default(),
      region:       self.region().to_owned(),
    }
  }

  /// Connection details for the cluster named in `[cluster]`.
  pub fn redshift(&self) -> anyhow::Result<RedshiftConfig> {
    let cluster = self
      .cluster
      .as_ref()
      .context("configuration has no [cluster] section")?;
    Ok(RedshiftConfig {
      host:     cluster.host.clone(),
      port:     cluster.db_port,
      database: cluster.db_name.clone(),
      user:     cluster.db_user.clone(),
      password: cluster.db_password.clone(),
    })
  }

  /// Connection details for a cluster provisioned from `[dwh]`.
  pub fn provisioned_redshift(&self, host: &str, port: u16) -> anyhow::Result<RedshiftConfig> {
    let dwh = self.dwh()?;
    Ok(RedshiftConfig {
      host: host.to_owned(),
      port,
      database: dwh.db.clone(),
      user: dwh.db_user.clone(),
      password: dwh.db_password.clone(),
    })
  }

  pub fn aws(&self) -> anyhow::Result<&AwsCredentials> {
    self.aws.as_ref().context("configuration has no [aws] section")
  }

  pub fn cluster_spec(&self) -> anyhow::Result<ClusterSpec> {
    let dwh = self.dwh()?;
    Ok(ClusterSpec {
      identifier:      dwh.cluster_identifier.clone(),
      cluster_type:    dwh.cluster_type.clone(),
      node_type:       dwh.node_type.clone(),
      num_nodes:       dwh.num_nodes,
      db_name:         dwh.db.clone(),
      master_user:     dwh.db_user.clone(),
      master_password: dwh.db_password.clone(),
      port:            dwh.port,
      iam_role_name:   dwh.iam_role_name.clone(),
    })
  }

  pub fn wait_policy(&self) -> anyhow::Result<WaitPolicy> {
    let dwh = self.dwh()?;
    Ok(WaitPolicy {
      interval:     Duration::from_secs(dwh.poll_interval_secs),
      max_attempts: dwh.max_poll_attempts,
    })
  }

  fn dwh(&self) -> anyhow::Result<&DwhSection> {
    self.dwh.as_ref().context("configuration has no [dwh] section")
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const FULL: &str = "
[aws]
key = AKIAEXAMPLE
secret = s3cr3t
region = us-west-2

[dwh]
cluster_type = multi-node
num_nodes = 4
node_type = dc2.large
cluster_identifier = dwhCluster
db = dwh
db_user = dwhuser
db_password = Passw0rd
port = 5439
iam_role_name = dwhRole

[cluster]
host = dwhcluster.abc123.us-west-2.redshift.amazonaws.com
db_name = dwh
db_user = dwhuser
db_password = Passw0rd
db_port = 5439

[iam_role]
arn = arn:aws:iam::123456789012:role/dwhRole

[s3]
log_data = s3://udacity-dend/log_data
log_jsonpath = s3://udacity-dend/log_json_path.json
song_data = s3://udacity-dend/song_data
";

  const LOCAL: &str = "
[s3]
log_data = data/log_data
log_jsonpath = data/log_json_path.json
song_data = data/song_data
";

  fn parse(text: &str, env: &[(&str, &str)]) -> Settings {
    let env = env
      .iter()
      .map(|(k, v)| (k.to_string(), v.to_string()))
      .collect::<Map<_, _>>();
    Settings::build(File::from_str(text, FileFormat::Ini), Some(env)).unwrap()
  }

  #[test]
  fn full_file() {
    let settings = parse(FULL, &[]);

    let staging = settings.staging();
    assert_eq!(staging.log_jsonpath, "s3://udacity-dend/log_json_path.json");
    assert_eq!(staging.role_arn, "arn:aws:iam::123456789012:role/dwhRole");
    assert_eq!(staging.region, "us-west-2");

    let redshift = settings.redshift().unwrap();
    assert_eq!(redshift.port, 5439);
    assert_eq!(redshift.database, "dwh");

    let spec = settings.cluster_spec().unwrap();
    assert_eq!(spec.num_nodes, 4);
    assert_eq!(spec.identifier, "dwhCluster");
    assert_eq!(spec.iam_role_name, "dwhRole");
  }

  #[test]
  fn optional_keys_default() {
    let settings = parse(FULL, &[]);
    assert_eq!(settings.wait_policy().unwrap(), WaitPolicy {
      interval:     Duration::from_secs(15),
      max_attempts: 80,
    });
    assert_eq!(settings.dwh.as_ref().unwrap().ingress_cidr, "0.0.0.0/0");
    assert_eq!(settings.pipeline_options(), PipelineOptions::default());
  }

  #[test]
  fn etl_policy_from_file() {
    let text = format!("{LOCAL}\n[etl]\naudit_policy = fail_on_violation\nrequire_empty_dimensions = false\n");
    let options = parse(&text, &[]).pipeline_options();
    assert_eq!(options.audit_policy, AuditPolicy::FailOnViolation);
    assert!(!options.require_empty_dimensions);
  }

  #[test]
  fn environment_overrides_file() {
    let settings = parse(FULL, &[
      ("DWH_CLUSTER__HOST", "localhost"),
      ("DWH_CLUSTER__DB_PORT", "15439"),
    ]);
    let redshift = settings.redshift().unwrap();
    assert_eq!(redshift.host, "localhost");
    assert_eq!(redshift.port, 15439);
  }

  #[test]
  fn local_runs_need_only_sources() {
    let settings = parse(LOCAL, &[]);
    assert_eq!(settings.region(), DEFAULT_REGION);
    assert_eq!(settings.staging().role_arn, "");
    assert!(settings.redshift().is_err());
    assert!(settings.cluster_spec().is_err());
  }

  #[test]
  fn mirror_destinations_are_optional() {
    assert!(parse(LOCAL, &[]).s3.mirrors().is_empty());

    let text = format!("{LOCAL}log_data_dest = s3://mirror/log_data\nsong_data_dest =\n");
    let settings = parse(&text, &[("DWH_S3__LOG_JSONPATH_DEST", "s3://mirror/log_json_path.json")]);
    assert_eq!(settings.s3.mirrors(), [
      ("log_data_dest", "s3://mirror/log_data"),
      ("log_jsonpath_dest", "s3://mirror/log_json_path.json"),
    ]);
    assert_eq!(settings.staging().log_data, "data/log_data");
  }

  #[test]
  fn provisioned_endpoint_uses_dwh_credentials() {
    let settings = parse(FULL, &[]);
    let redshift = settings.provisioned_redshift("new-host", 5440).unwrap();
    assert_eq!(redshift.host, "new-host");
    assert_eq!(redshift.port, 5440);
    assert_eq!(redshift.user, "dwhuser");
  }
}
