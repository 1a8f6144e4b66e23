//! The `CloudApi` trait and the cloud-side records it exchanges.

use std::future::Future;

use serde::Deserialize;

/// Managed policy granting the cluster read access to S3.
pub const S3_READ_ONLY_POLICY: &str = "arn:aws:iam::aws:policy/AmazonS3ReadOnlyAccess";

/// Desired shape of the cluster.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterSpec {
  pub identifier:      String,
  pub cluster_type:    String,
  pub node_type:       String,
  pub num_nodes:       u32,
  pub db_name:         String,
  pub master_user:     String,
  pub master_password: String,
  pub port:            u16,
  pub iam_role_name:   String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
  pub address: String,
  pub port:    u16,
}

/// What `describe` reports about an existing cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterInfo {
  pub status:   String,
  pub endpoint: Option<Endpoint>,
  pub vpc_id:   Option<String>,
}

impl ClusterInfo {
  pub fn is_available(&self) -> bool {
    self.status.eq_ignore_ascii_case("available") && self.endpoint.is_some()
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngressRule {
  /// `tcp`, `udp`, ... or `-1` for every protocol.
  pub protocol:  String,
  pub from_port: i32,
  pub to_port:   i32,
  pub cidr:      String,
}

impl IngressRule {
  pub fn tcp(port: u16, cidr: impl Into<String>) -> Self {
    Self {
      protocol:  "tcp".into(),
      from_port: i32::from(port),
      to_port:   i32::from(port),
      cidr:      cidr.into(),
    }
  }

  /// Whether traffic allowed by `other` is already allowed by this rule.
  pub fn covers(&self, other: &IngressRule) -> bool {
    let protocol = self.protocol == "-1" || self.protocol.eq_ignore_ascii_case(&other.protocol);
    protocol
      && self.cidr == other.cidr
      && (self.protocol == "-1"
        || (self.from_port <= other.from_port && other.to_port <= self.to_port))
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityGroup {
  pub group_id: String,
  pub ingress:  Vec<IngressRule>,
}

/// The provisioning calls the lifecycle needs. Lookups return `None` when
/// the resource does not exist rather than failing.
pub trait CloudApi: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── IAM ───────────────────────────────────────────────────────────────

  fn role_arn<'a>(
    &'a self,
    role: &'a str,
  ) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send + 'a;

  /// Create a role and return its ARN.
  fn create_role<'a>(
    &'a self,
    role: &'a str,
    description: &'a str,
    trust_policy: &'a str,
  ) -> impl Future<Output = Result<String, Self::Error>> + Send + 'a;

  fn attached_policies<'a>(
    &'a self,
    role: &'a str,
  ) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send + 'a;

  fn attach_policy<'a>(
    &'a self,
    role: &'a str,
    policy_arn: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  fn detach_policy<'a>(
    &'a self,
    role: &'a str,
    policy_arn: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  fn delete_role<'a>(
    &'a self,
    role: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Cluster ───────────────────────────────────────────────────────────

  fn describe_cluster<'a>(
    &'a self,
    identifier: &'a str,
  ) -> impl Future<Output = Result<Option<ClusterInfo>, Self::Error>> + Send + 'a;

  fn create_cluster<'a>(
    &'a self,
    spec: &'a ClusterSpec,
    role_arn: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Delete without a final snapshot.
  fn delete_cluster<'a>(
    &'a self,
    identifier: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Network ───────────────────────────────────────────────────────────

  fn default_security_group<'a>(
    &'a self,
    vpc_id: &'a str,
  ) -> impl Future<Output = Result<Option<SecurityGroup>, Self::Error>> + Send + 'a;

  fn authorize_ingress<'a>(
    &'a self,
    group_id: &'a str,
    rule: &'a IngressRule,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn wider_rule_covers_single_port() {
    let wide = IngressRule { protocol: "TCP".into(), from_port: 5000, to_port: 6000, cidr: "0.0.0.0/0".into() };
    assert!(wide.covers(&IngressRule::tcp(5439, "0.0.0.0/0")));
    assert!(!wide.covers(&IngressRule::tcp(5439, "10.0.0.0/8")));
    assert!(!wide.covers(&IngressRule::tcp(22, "0.0.0.0/0")));
  }

  #[test]
  fn all_traffic_rule_covers_everything() {
    let all = IngressRule { protocol: "-1".into(), from_port: -1, to_port: -1, cidr: "0.0.0.0/0".into() };
    assert!(all.covers(&IngressRule::tcp(5439, "0.0.0.0/0")));
  }

  #[test]
  fn available_needs_an_endpoint() {
    let mut info = ClusterInfo { status: "available".into(), endpoint: None, vpc_id: None };
    assert!(!info.is_available());
    info.endpoint = Some(Endpoint { address: "host".into(), port: 5439 });
    assert!(info.is_available());
  }
}
