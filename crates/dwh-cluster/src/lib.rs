//! Warehouse cluster provisioning.
//!
//! [`ClusterLifecycle`] brings a cluster and its S3-reading IAM role up and
//! tears them down again through any [`CloudApi`]. Every step looks at the
//! current state first and only acts when something is missing, so both
//! operations can be rerun safely.

mod api;
mod aws;
mod lifecycle;

pub mod error;

pub use api::{
  ClusterInfo, ClusterSpec, CloudApi, Endpoint, IngressRule, S3_READ_ONLY_POLICY, SecurityGroup,
};
pub use aws::{AwsCloud, AwsCredentials};
pub use error::{AwsError, Error, Result};
pub use lifecycle::{ClusterEndpoint, ClusterLifecycle, WaitPolicy};
