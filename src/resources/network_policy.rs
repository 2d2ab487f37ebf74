//! Security group to network policy compilation
//!
//! Translates user-entered security group rules into Calico egress rules:
//! - ports: `"80"`, `"80,443"` or `"8000-9000"`
//! - destinations: a single IPv4 address, a CIDR block of either family, or
//!   an IPv4 address range which is decomposed into the minimal list of
//!   covering CIDR blocks
//!
//! Any malformed rule fails the whole translation, so a policy is never
//! written with a subset of its rules.

use std::net::Ipv4Addr;

use ipnetwork::IpNetwork;
use kube::ResourceExt;
use kube::core::ObjectMeta;

use crate::controller::{Error, Result};
use crate::crd::{
    CFSecurityGroup, EgressRule, EntityRule, GlobalNetworkPolicy, GlobalNetworkPolicySpec,
    NetworkPolicy, NetworkPolicySpec, PortRange, Protocol, RuleAction, SecurityGroupRule,
    SecurityGroupWorkloads,
};
use crate::resources::common::{
    APP_WORKLOAD_TYPE, BUILD_WORKLOAD_TYPE, SPACE_GUID_LABEL, WORKLOAD_TYPE_LABEL,
    security_group_labels,
};

/// Policy type list shared by every generated policy
pub const EGRESS_POLICY_TYPE: &str = "Egress";

/// Name of every policy generated for a security group
pub fn policy_name(security_group: &str) -> String {
    format!("default.{}", security_group)
}

/// UDP when the rule says so (any case), TCP otherwise
pub fn rule_protocol(protocol: &str) -> Protocol {
    if protocol.eq_ignore_ascii_case("udp") {
        Protocol::Udp
    } else {
        Protocol::Tcp
    }
}

fn parse_port(port: &str, spec: &str) -> Result<u16> {
    let port = port.trim();
    port.parse::<u16>()
        .map_err(|_| Error::ValidationError(format!("invalid port {:?} in {:?}", port, spec)))
}

/// Parse a ports field into port ranges
pub fn parse_ports(ports: &str) -> Result<Vec<PortRange>> {
    if ports.trim().is_empty() {
        return Err(Error::ValidationError("ports must not be empty".to_string()));
    }

    if ports.contains('-') {
        let parts: Vec<&str> = ports.split('-').collect();
        let [min, max] = parts.as_slice() else {
            return Err(Error::ValidationError(format!(
                "invalid port range {:?}: expected min-max",
                ports
            )));
        };
        let min_port = parse_port(min, ports)?;
        let max_port = parse_port(max, ports)?;
        if min_port > max_port {
            return Err(Error::ValidationError(format!(
                "invalid port range {:?}: start is greater than end",
                ports
            )));
        }
        return Ok(vec![PortRange { min_port, max_port }]);
    }

    ports
        .split(',')
        .map(|port| parse_port(port, ports).map(PortRange::single))
        .collect()
}

fn parse_address(address: &str, spec: &str) -> Result<Ipv4Addr> {
    let address = address.trim();
    address.parse::<Ipv4Addr>().map_err(|_| {
        Error::ValidationError(format!("invalid IPv4 address {:?} in {:?}", address, spec))
    })
}

/// Parse a destination into CIDR blocks
pub fn parse_destination(destination: &str) -> Result<Vec<String>> {
    let destination = destination.trim();

    if destination.contains('-') {
        let Some((start, end)) = destination.split_once('-') else {
            return Err(Error::ValidationError(format!(
                "invalid destination range {:?}",
                destination
            )));
        };
        let start = parse_address(start, destination)?;
        let end = parse_address(end, destination)?;
        if start > end {
            return Err(Error::ValidationError(format!(
                "invalid destination range {:?}: start is greater than end",
                destination
            )));
        }
        return Ok(ip_range_to_cidrs(start, end));
    }

    if destination.contains('/') {
        return destination
            .parse::<IpNetwork>()
            .map(|_| vec![destination.to_string()])
            .map_err(|e| {
                Error::ValidationError(format!("invalid CIDR {:?}: {}", destination, e))
            });
    }

    let address = parse_address(destination, destination)?;
    Ok(vec![format!("{}/32", address)])
}

/// Decompose an inclusive address range into the minimal covering CIDR blocks
///
/// Greedy: at each step emit the largest block that starts at `start`, is
/// aligned to its own size and does not extend past `end`.
pub fn ip_range_to_cidrs(start: Ipv4Addr, end: Ipv4Addr) -> Vec<String> {
    // Widened so `end + 1` and `1 << 32` cannot overflow
    let mut start = u64::from(u32::from(start));
    let end = u64::from(u32::from(end));
    let mut blocks = Vec::new();

    while start <= end {
        let mut prefix: u32 = 32;
        while prefix > 0 {
            let size = 1u64 << (33 - prefix);
            if start % size != 0 || start + size - 1 > end {
                break;
            }
            prefix -= 1;
        }

        let address = Ipv4Addr::from(u32::try_from(start).unwrap_or(u32::MAX));
        blocks.push(format!("{}/{}", address, prefix));
        start += 1u64 << (32 - prefix);
    }

    blocks
}

/// Compile security group rules into egress rules
pub fn build_egress_rules(rules: &[SecurityGroupRule]) -> Result<Vec<EgressRule>> {
    rules
        .iter()
        .map(|rule| {
            Ok(EgressRule {
                action: RuleAction::Allow,
                protocol: rule_protocol(&rule.protocol),
                destination: EntityRule {
                    nets: parse_destination(&rule.destination)?,
                    ports: parse_ports(&rule.ports)?,
                },
            })
        })
        .collect()
}

/// Selector expression matching the bound workload types
///
/// `{running}` gives `<label> in { 'app' }`; both flags give
/// `<label> in { 'app', 'build' }`.
pub fn workload_selector(workloads: SecurityGroupWorkloads) -> String {
    let mut types = Vec::with_capacity(2);
    if workloads.running {
        types.push(format!("'{}'", APP_WORKLOAD_TYPE));
    }
    if workloads.staging {
        types.push(format!("'{}'", BUILD_WORKLOAD_TYPE));
    }
    format!("{} in {{ {} }}", WORKLOAD_TYPE_LABEL, types.join(", "))
}

/// Selector restricting a global policy to namespaces backing spaces
pub fn space_namespace_selector() -> String {
    format!("has({})", SPACE_GUID_LABEL)
}

/// Generate the namespace-scoped policy for one space
pub fn generate_network_policy(
    security_group: &CFSecurityGroup,
    namespace: &str,
    workloads: SecurityGroupWorkloads,
    egress: Vec<EgressRule>,
) -> NetworkPolicy {
    let sg_name = security_group.name_any();
    NetworkPolicy {
        metadata: ObjectMeta {
            name: Some(policy_name(&sg_name)),
            namespace: Some(namespace.to_string()),
            labels: Some(security_group_labels(&sg_name)),
            ..Default::default()
        },
        spec: NetworkPolicySpec {
            selector: workload_selector(workloads),
            types: vec![EGRESS_POLICY_TYPE.to_string()],
            egress,
        },
    }
}

/// Generate the cluster-scoped policy for globally enabled workloads
pub fn generate_global_network_policy(
    security_group: &CFSecurityGroup,
    egress: Vec<EgressRule>,
) -> GlobalNetworkPolicy {
    let sg_name = security_group.name_any();
    GlobalNetworkPolicy {
        metadata: ObjectMeta {
            name: Some(policy_name(&sg_name)),
            labels: Some(security_group_labels(&sg_name)),
            ..Default::default()
        },
        spec: GlobalNetworkPolicySpec {
            selector: workload_selector(security_group.spec.globally_enabled),
            namespace_selector: space_namespace_selector(),
            types: vec![EGRESS_POLICY_TYPE.to_string()],
            egress,
        },
    }
}
