//! Error types for `dwh-cluster`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("{op} failed: {source}")]
  Cloud {
    op:     String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },

  #[error("cluster {cluster} still {status} after {attempts} status checks")]
  Timeout {
    cluster:  String,
    status:   String,
    attempts: u32,
  },

  #[error("cluster {0} disappeared while waiting for it")]
  ClusterVanished(String),

  #[error("cluster {0} reports no VPC")]
  MissingVpc(String),

  #[error("VPC {0} has no default security group")]
  NoSecurityGroup(String),
}

impl Error {
  pub(crate) fn cloud<E>(op: impl Into<String>) -> impl FnOnce(E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    let op = op.into();
    move |e| Self::Cloud { op, source: Box::new(e) }
  }
}

/// A failed AWS SDK call, rendered with its full error chain.
#[derive(Debug, Error)]
#[error("{op}: {message}")]
pub struct AwsError {
  pub op:      &'static str,
  pub message: String,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
