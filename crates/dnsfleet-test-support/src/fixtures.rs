//! Builders for nodes and entities.

use chrono::Utc;
use dnsfleet_core::{
    AddressMapping, DnsServer, DomainRule, DomainSet, Entity, NameserverRule, NewNode, Node,
    NodeCredentials, NodeId, NodeSelector, NodeStatus, RuleTarget,
};

/// Default configuration path used by fixtures.
pub const CONFIG_PATH: &str = "/etc/smartdns/smartdns.conf";

/// Domain set directory used by fixtures.
pub const DOMAIN_SET_DIR: &str = "/etc/smartdns";

/// Node with agent credentials and the default config path.
#[must_use]
pub fn node(id: NodeId) -> Node {
    Node {
        id,
        name: format!("node-{id}"),
        host: format!("10.0.0.{id}"),
        port: 22,
        username: "root".into(),
        credentials: NodeCredentials::Agent,
        jump_host: None,
        config_path: None,
        status: NodeStatus::Unknown,
        updated_at: Utc::now(),
    }
}

/// Registration payload for `name`.
#[must_use]
pub fn new_node(name: &str) -> NewNode {
    NewNode {
        name: name.into(),
        host: format!("{name}.lan"),
        port: 22,
        username: "root".into(),
        credentials: NodeCredentials::Agent,
        jump_host: None,
        config_path: None,
    }
}

/// `address /<domain>/<ip>` on every node.
#[must_use]
pub fn address(domain: &str, ip: &str) -> Entity {
    Entity::Address(AddressMapping::ip(domain, ip))
}

/// Address mapping restricted to `nodes`.
#[must_use]
pub fn address_on(domain: &str, ip: &str, nodes: &[NodeId]) -> Entity {
    let mut mapping = AddressMapping::ip(domain, ip);
    mapping.nodes = NodeSelector::nodes(nodes.iter().copied());
    Entity::Address(mapping)
}

/// Upstream server on every node.
#[must_use]
pub fn server(address: &str) -> Entity {
    Entity::Server(DnsServer::new(address))
}

/// Domain set on every node.
#[must_use]
pub fn domain_set(name: &str, domains: &[&str]) -> Entity {
    Entity::DomainSet(DomainSet::new(name, domains.iter().copied()))
}

/// Domain rule sending `target` to nameserver group `group`.
#[must_use]
pub fn domain_rule(target: &str, group: &str, priority: i32) -> Entity {
    let mut rule = DomainRule::new(RuleTarget::parse(target));
    rule.nameserver = Some(group.into());
    rule.priority = priority;
    Entity::DomainRule(rule)
}

/// Nameserver rule on every node.
#[must_use]
pub fn nameserver(target: &str, group: &str) -> Entity {
    Entity::Nameserver(NameserverRule::new(RuleTarget::parse(target), group))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_produce_valid_entities() {
        for entity in [
            address("a.com", "1.1.1.1"),
            address_on("b.com", "2.2.2.2", &[3, 1]),
            server("8.8.8.8"),
            domain_set("gfwlist", &["x.com"]),
            domain_rule("domain-set:gfwlist", "oversea", 5),
            nameserver("corp.lan", "office"),
        ] {
            assert!(entity.validate().is_ok(), "{}", entity.describe());
        }
    }

    #[test]
    fn address_on_renders_sorted_selector() {
        let entity = address_on("b.com", "2.2.2.2", &[3, 1, 3]);
        assert_eq!(entity.selector().as_str(), "[1,3]");
    }
}
