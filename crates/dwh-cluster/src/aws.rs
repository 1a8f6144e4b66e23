//! [`AwsCloud`]: the AWS SDK implementation of [`CloudApi`].

use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_iam::{config::Credentials, error::DisplayErrorContext};
use serde::Deserialize;

use crate::{
  AwsError,
  api::{CloudApi, ClusterInfo, ClusterSpec, Endpoint, IngressRule, SecurityGroup},
};

/// The `[aws]` credentials block. Blank key and secret fall back to the
/// default provider chain.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AwsCredentials {
  #[serde(default)]
  pub key:    String,
  #[serde(default)]
  pub secret: String,
  pub region: String,
}

/// IAM, Redshift and EC2 clients sharing one SDK configuration.
#[derive(Clone)]
pub struct AwsCloud {
  iam:      aws_sdk_iam::Client,
  redshift: aws_sdk_redshift::Client,
  ec2:      aws_sdk_ec2::Client,
}

impl AwsCloud {
  pub async fn connect(credentials: &AwsCredentials) -> Self {
    let mut loader = aws_config::defaults(BehaviorVersion::latest())
      .region(Region::new(credentials.region.clone()));
    if !credentials.key.is_empty() && !credentials.secret.is_empty() {
      loader = loader.credentials_provider(Credentials::new(
        credentials.key.clone(),
        credentials.secret.clone(),
        None,
        None,
        "dwh-config",
      ));
    }
    Self::from_sdk_config(&loader.load().await)
  }

  pub fn from_sdk_config(config: &SdkConfig) -> Self {
    Self {
      iam:      aws_sdk_iam::Client::new(config),
      redshift: aws_sdk_redshift::Client::new(config),
      ec2:      aws_sdk_ec2::Client::new(config),
    }
  }
}

fn sdk_error<E>(op: &'static str) -> impl FnOnce(E) -> AwsError
where
  E: std::error::Error,
{
  move |e| AwsError { op, message: DisplayErrorContext(&e).to_string() }
}

fn cluster_info(cluster: &aws_sdk_redshift::types::Cluster) -> ClusterInfo {
  let endpoint = cluster.endpoint().and_then(|e| {
    Some(Endpoint {
      address: e.address()?.to_owned(),
      port:    u16::try_from(e.port()?).ok()?,
    })
  });
  ClusterInfo {
    status: cluster.cluster_status().unwrap_or("unknown").to_owned(),
    endpoint,
    vpc_id: cluster.vpc_id().map(str::to_owned),
  }
}

fn ingress_rules(permission: &aws_sdk_ec2::types::IpPermission) -> Vec<IngressRule> {
  let protocol = permission.ip_protocol().unwrap_or("-1");
  permission
    .ip_ranges()
    .iter()
    .filter_map(|range| range.cidr_ip())
    .map(|cidr| IngressRule {
      protocol:  protocol.to_owned(),
      from_port: permission.from_port().unwrap_or(-1),
      to_port:   permission.to_port().unwrap_or(-1),
      cidr:      cidr.to_owned(),
    })
    .collect()
}

impl CloudApi for AwsCloud {
  type Error = AwsError;

  async fn role_arn<'a>(&'a self, role: &'a str) -> Result<Option<String>, AwsError> {
    match self.iam.get_role().role_name(role).send().await {
      Ok(out) => Ok(out.role().map(|r| r.arn().to_owned())),
      Err(e)
        if e
          .as_service_error()
          .is_some_and(|e| e.is_no_such_entity_exception()) =>
      {
        Ok(None)
      }
      Err(e) => Err(sdk_error("get role")(e)),
    }
  }

  async fn create_role<'a>(
    &'a self,
    role: &'a str,
    description: &'a str,
    trust_policy: &'a str,
  ) -> Result<String, AwsError> {
    let out = self
      .iam
      .create_role()
      .path("/")
      .role_name(role)
      .description(description)
      .assume_role_policy_document(trust_policy)
      .send()
      .await
      .map_err(sdk_error("create role"))?;
    out.role().map(|r| r.arn().to_owned()).ok_or_else(|| AwsError {
      op:      "create role",
      message: "response carried no role".into(),
    })
  }

  async fn attached_policies<'a>(&'a self, role: &'a str) -> Result<Vec<String>, AwsError> {
    let out = self
      .iam
      .list_attached_role_policies()
      .role_name(role)
      .send()
      .await
      .map_err(sdk_error("list attached role policies"))?;
    Ok(
      out
        .attached_policies()
        .iter()
        .filter_map(|p| p.policy_arn().map(str::to_owned))
        .collect(),
    )
  }

  async fn attach_policy<'a>(&'a self, role: &'a str, policy_arn: &'a str) -> Result<(), AwsError> {
    self
      .iam
      .attach_role_policy()
      .role_name(role)
      .policy_arn(policy_arn)
      .send()
      .await
      .map_err(sdk_error("attach role policy"))?;
    Ok(())
  }

  async fn detach_policy<'a>(&'a self, role: &'a str, policy_arn: &'a str) -> Result<(), AwsError> {
    self
      .iam
      .detach_role_policy()
      .role_name(role)
      .policy_arn(policy_arn)
      .send()
      .await
      .map_err(sdk_error("detach role policy"))?;
    Ok(())
  }

  async fn delete_role<'a>(&'a self, role: &'a str) -> Result<(), AwsError> {
    self
      .iam
      .delete_role()
      .role_name(role)
      .send()
      .await
      .map_err(sdk_error("delete role"))?;
    Ok(())
  }

  async fn describe_cluster<'a>(&'a self, identifier: &'a str) -> Result<Option<ClusterInfo>, AwsError> {
    match self
      .redshift
      .describe_clusters()
      .cluster_identifier(identifier)
      .send()
      .await
    {
      Ok(out) => Ok(out.clusters().first().map(cluster_info)),
      Err(e)
        if e
          .as_service_error()
          .is_some_and(|e| e.is_cluster_not_found_fault()) =>
      {
        Ok(None)
      }
      Err(e) => Err(sdk_error("describe clusters")(e)),
    }
  }

  async fn create_cluster<'a>(&'a self, spec: &'a ClusterSpec, role_arn: &'a str) -> Result<(), AwsError> {
    let mut request = self
      .redshift
      .create_cluster()
      .cluster_identifier(&spec.identifier)
      .cluster_type(&spec.cluster_type)
      .node_type(&spec.node_type)
      .db_name(&spec.db_name)
      .master_username(&spec.master_user)
      .master_user_password(&spec.master_password)
      .port(i32::from(spec.port))
      .iam_roles(role_arn);
    // The node count is rejected for single-node clusters.
    if spec.cluster_type != "single-node" {
      let nodes = i32::try_from(spec.num_nodes).map_err(|_| AwsError {
        op:      "create cluster",
        message: format!("node count {} out of range", spec.num_nodes),
      })?;
      request = request.number_of_nodes(nodes);
    }
    request.send().await.map_err(sdk_error("create cluster"))?;
    Ok(())
  }

  async fn delete_cluster<'a>(&'a self, identifier: &'a str) -> Result<(), AwsError> {
    self
      .redshift
      .delete_cluster()
      .cluster_identifier(identifier)
      .skip_final_cluster_snapshot(true)
      .send()
      .await
      .map_err(sdk_error("delete cluster"))?;
    Ok(())
  }

  async fn default_security_group<'a>(&'a self, vpc_id: &'a str) -> Result<Option<SecurityGroup>, AwsError> {
    use aws_sdk_ec2::types::Filter;

    let out = self
      .ec2
      .describe_security_groups()
      .filters(Filter::builder().name("vpc-id").values(vpc_id).build())
      .filters(Filter::builder().name("group-name").values("default").build())
      .send()
      .await
      .map_err(sdk_error("describe security groups"))?;

    Ok(out.security_groups().first().and_then(|group| {
      Some(SecurityGroup {
        group_id: group.group_id()?.to_owned(),
        ingress:  group.ip_permissions().iter().flat_map(ingress_rules).collect(),
      })
    }))
  }

  async fn authorize_ingress<'a>(&'a self, group_id: &'a str, rule: &'a IngressRule) -> Result<(), AwsError> {
    self
      .ec2
      .authorize_security_group_ingress()
      .group_id(group_id)
      .ip_protocol(&rule.protocol)
      .from_port(rule.from_port)
      .to_port(rule.to_port)
      .cidr_ip(&rule.cidr)
      .send()
      .await
      .map_err(sdk_error("authorize security group ingress"))?;
    Ok(())
  }
}
