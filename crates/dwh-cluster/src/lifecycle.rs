//! Bringing the cluster up and tearing it down.

use std::time::Duration;

use tracing::{debug, info};

use crate::{
  Error, Result,
  api::{CloudApi, ClusterInfo, ClusterSpec, IngressRule, S3_READ_ONLY_POLICY},
};

const ROLE_DESCRIPTION: &str = "Allows Redshift clusters to call AWS services on your behalf.";

/// How long to keep polling for a cluster status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
  pub interval:     Duration,
  pub max_attempts: u32,
}

impl Default for WaitPolicy {
  fn default() -> Self {
    Self { interval: Duration::from_secs(15), max_attempts: 80 }
  }
}

/// Connection details for a cluster that is up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterEndpoint {
  pub address:  String,
  pub port:     u16,
  pub role_arn: String,
}

pub struct ClusterLifecycle<C> {
  cloud:        C,
  spec:         ClusterSpec,
  wait:         WaitPolicy,
  ingress_cidr: String,
}

impl<C: CloudApi> ClusterLifecycle<C> {
  pub fn new(cloud: C, spec: ClusterSpec) -> Self {
    Self {
      cloud,
      spec,
      wait: WaitPolicy::default(),
      ingress_cidr: "0.0.0.0/0".into(),
    }
  }

  pub fn with_wait_policy(mut self, wait: WaitPolicy) -> Self {
    self.wait = wait;
    self
  }

  pub fn with_ingress_cidr(mut self, cidr: impl Into<String>) -> Self {
    self.ingress_cidr = cidr.into();
    self
  }

  pub fn cloud(&self) -> &C { &self.cloud }

  pub fn spec(&self) -> &ClusterSpec { &self.spec }

  // ─── Bring-up ──────────────────────────────────────────────────────────────

  /// Ensure the role, the cluster and its ingress rule all exist, waiting
  /// until the cluster is available.
  pub async fn bring_up(&self) -> Result<ClusterEndpoint> {
    let role_arn = self.ensure_role().await?;
    self.ensure_cluster(&role_arn).await?;
    let cluster = self.wait_until_available().await?;
    self.ensure_ingress(&cluster).await?;

    let Some(endpoint) = cluster.endpoint else {
      return Err(Error::ClusterVanished(self.spec.identifier.clone()));
    };
    info!(address = %endpoint.address, port = endpoint.port, "cluster ready");
    Ok(ClusterEndpoint { address: endpoint.address, port: endpoint.port, role_arn })
  }

  async fn ensure_role(&self) -> Result<String> {
    let role = self.spec.iam_role_name.as_str();

    let role_arn = match self
      .cloud
      .role_arn(role)
      .await
      .map_err(Error::cloud("look up role"))?
    {
      Some(arn) => {
        debug!(%role, "role already exists");
        arn
      }
      None => {
        info!(%role, "creating role");
        let trust_policy = trust_policy().to_string();
        self
          .cloud
          .create_role(role, ROLE_DESCRIPTION, &trust_policy)
          .await
          .map_err(Error::cloud("create role"))?
      }
    };

    let attached = self
      .cloud
      .attached_policies(role)
      .await
      .map_err(Error::cloud("list role policies"))?;
    if attached.iter().any(|p| p == S3_READ_ONLY_POLICY) {
      debug!(%role, "read-only S3 policy already attached");
    } else {
      info!(%role, "attaching read-only S3 policy");
      self
        .cloud
        .attach_policy(role, S3_READ_ONLY_POLICY)
        .await
        .map_err(Error::cloud("attach role policy"))?;
    }

    Ok(role_arn)
  }

  async fn ensure_cluster(&self, role_arn: &str) -> Result<()> {
    let identifier = self.spec.identifier.as_str();
    match self.describe().await? {
      Some(existing) => {
        debug!(%identifier, status = %existing.status, "cluster already exists");
      }
      None => {
        info!(
          %identifier,
          cluster_type = %self.spec.cluster_type,
          node_type = %self.spec.node_type,
          nodes = self.spec.num_nodes,
          "creating cluster"
        );
        self
          .cloud
          .create_cluster(&self.spec, role_arn)
          .await
          .map_err(Error::cloud("create cluster"))?;
      }
    }
    Ok(())
  }

  async fn wait_until_available(&self) -> Result<ClusterInfo> {
    let identifier = &self.spec.identifier;
    let mut status = String::from("unknown");
    for attempt in 1..=self.wait.max_attempts {
      let Some(cluster) = self.describe().await? else {
        return Err(Error::ClusterVanished(identifier.clone()));
      };
      if cluster.is_available() {
        return Ok(cluster);
      }
      debug!(%identifier, status = %cluster.status, attempt, "waiting for cluster");
      status = cluster.status;
      if attempt < self.wait.max_attempts {
        tokio::time::sleep(self.wait.interval).await;
      }
    }
    Err(Error::Timeout {
      cluster: identifier.clone(),
      status,
      attempts: self.wait.max_attempts,
    })
  }

  async fn ensure_ingress(&self, cluster: &ClusterInfo) -> Result<()> {
    let identifier = &self.spec.identifier;
    let vpc_id = cluster
      .vpc_id
      .as_deref()
      .ok_or_else(|| Error::MissingVpc(identifier.clone()))?;
    let group = self
      .cloud
      .default_security_group(vpc_id)
      .await
      .map_err(Error::cloud("describe security groups"))?
      .ok_or_else(|| Error::NoSecurityGroup(vpc_id.to_owned()))?;

    let rule = IngressRule::tcp(self.spec.port, self.ingress_cidr.as_str());
    if group.ingress.iter().any(|existing| existing.covers(&rule)) {
      debug!(group = %group.group_id, port = self.spec.port, "ingress already open");
      return Ok(());
    }

    info!(group = %group.group_id, port = self.spec.port, cidr = %rule.cidr, "opening ingress");
    self
      .cloud
      .authorize_ingress(&group.group_id, &rule)
      .await
      .map_err(Error::cloud("authorize ingress"))
  }

  // ─── Tear-down ─────────────────────────────────────────────────────────────

  /// Delete the cluster (without a final snapshot), wait for it to go, then
  /// detach the policy and delete the role. Missing resources are skipped.
  pub async fn tear_down(&self) -> Result<()> {
    self.remove_cluster().await?;
    self.remove_role().await
  }

  async fn remove_cluster(&self) -> Result<()> {
    let identifier = self.spec.identifier.as_str();
    match self.describe().await? {
      None => {
        debug!(%identifier, "no cluster to delete");
        return Ok(());
      }
      Some(cluster) if cluster.status.eq_ignore_ascii_case("deleting") => {
        debug!(%identifier, "cluster already deleting");
      }
      Some(_) => {
        info!(%identifier, "deleting cluster");
        self
          .cloud
          .delete_cluster(identifier)
          .await
          .map_err(Error::cloud("delete cluster"))?;
      }
    }
    self.wait_until_gone().await
  }

  async fn wait_until_gone(&self) -> Result<()> {
    let identifier = &self.spec.identifier;
    let mut status = String::from("deleting");
    for attempt in 1..=self.wait.max_attempts {
      let Some(cluster) = self.describe().await? else {
        info!(%identifier, "cluster deleted");
        return Ok(());
      };
      debug!(%identifier, status = %cluster.status, attempt, "waiting for deletion");
      status = cluster.status;
      if attempt < self.wait.max_attempts {
        tokio::time::sleep(self.wait.interval).await;
      }
    }
    Err(Error::Timeout {
      cluster: identifier.clone(),
      status,
      attempts: self.wait.max_attempts,
    })
  }

  async fn remove_role(&self) -> Result<()> {
    let role = self.spec.iam_role_name.as_str();
    let exists = self
      .cloud
      .role_arn(role)
      .await
      .map_err(Error::cloud("look up role"))?
      .is_some();
    if !exists {
      debug!(%role, "no role to delete");
      return Ok(());
    }

    let attached = self
      .cloud
      .attached_policies(role)
      .await
      .map_err(Error::cloud("list role policies"))?;
    if attached.iter().any(|p| p == S3_READ_ONLY_POLICY) {
      info!(%role, "detaching read-only S3 policy");
      self
        .cloud
        .detach_policy(role, S3_READ_ONLY_POLICY)
        .await
        .map_err(Error::cloud("detach role policy"))?;
    }

    info!(%role, "deleting role");
    self
      .cloud
      .delete_role(role)
      .await
      .map_err(Error::cloud("delete role"))
  }

  async fn describe(&self) -> Result<Option<ClusterInfo>> {
    self
      .cloud
      .describe_cluster(&self.spec.identifier)
      .await
      .map_err(Error::cloud("describe cluster"))
  }
}

/// Lets the Redshift service assume the role.
fn trust_policy() -> serde_json::Value {
  serde_json::json!({
    "Version": "2012-10-17",
    "Statement": [{
      "Effect": "Allow",
      "Principal": { "Service": "redshift.amazonaws.com" },
      "Action": "sts:AssumeRole",
    }],
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn trust_policy_names_redshift() {
    let policy = trust_policy();
    assert_eq!(policy["Statement"][0]["Principal"]["Service"], "redshift.amazonaws.com");
    assert_eq!(policy["Statement"][0]["Action"], "sts:AssumeRole");
  }

  #[test]
  fn default_wait_is_bounded() {
    let wait = WaitPolicy::default();
    assert_eq!(wait.max_attempts, 80);
    assert_eq!(wait.interval, Duration::from_secs(15));
  }
}
