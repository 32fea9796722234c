use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::EntityError;
use crate::model::sync_log::SyncLogType;
use crate::selector::NodeSelector;

/// Identifier of a stored entity (unique per kind).
pub type EntityId = i64;

/// Prefix marking a rule target that refers to a domain set.
pub const DOMAIN_SET_PREFIX: &str = "domain-set:";

/// Managed entity families.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Upstream DNS server.
    Server,
    /// Domain to IP or CNAME mapping.
    Address,
    /// Named list of domains stored in its own file.
    DomainSet,
    /// Per-domain classification rule.
    DomainRule,
    /// Domain to nameserver group rule.
    Nameserver,
}

impl EntityKind {
    /// Every kind, in full-merge order.
    pub const ALL: [Self; 5] = [
        Self::Server,
        Self::Address,
        Self::DomainSet,
        Self::DomainRule,
        Self::Nameserver,
    ];

    /// Stable lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Server => "server",
            Self::Address => "address",
            Self::DomainSet => "domain_set",
            Self::DomainRule => "domain_rule",
            Self::Nameserver => "nameserver",
        }
    }

    /// Parse a stored label.
    #[must_use]
    pub fn from_label(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }

    /// Audit log type recorded for changes of this kind.
    #[must_use]
    pub const fn log_type(self) -> SyncLogType {
        match self {
            Self::Server => SyncLogType::Server,
            Self::Address => SyncLogType::Address,
            Self::DomainSet => SyncLogType::DomainSet,
            Self::DomainRule => SyncLogType::DomainRule,
            Self::Nameserver => SyncLogType::Nameserver,
        }
    }
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalised form of a domain used for natural-key comparisons.
#[must_use]
pub fn domain_key(domain: &str) -> String {
    domain.trim().to_ascii_lowercase()
}

/// Upstream transport of a DNS server.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ServerType {
    /// Plain DNS over UDP.
    Udp,
    /// Plain DNS over TCP.
    Tcp,
    /// DNS over TLS.
    Tls,
    /// DNS over HTTPS.
    Https,
}

impl ServerType {
    /// Stable lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Udp => "udp",
            Self::Tcp => "tcp",
            Self::Tls => "tls",
            Self::Https => "https",
        }
    }

    /// Parse a stored label.
    #[must_use]
    pub fn from_label(value: &str) -> Option<Self> {
        match value {
            "udp" => Some(Self::Udp),
            "tcp" => Some(Self::Tcp),
            "tls" => Some(Self::Tls),
            "https" => Some(Self::Https),
            _ => None,
        }
    }

    /// Transport spelled out by an address scheme such as `tls://`.
    #[must_use]
    pub fn from_scheme(address: &str) -> Option<Self> {
        let lower = address.trim().to_ascii_lowercase();
        let (scheme, _) = lower.split_once("://")?;
        Self::from_label(scheme)
    }

    /// Infer the transport from an address scheme; bare addresses are UDP.
    #[must_use]
    pub fn infer(address: &str) -> Self {
        Self::from_scheme(address).unwrap_or(Self::Udp)
    }
}

/// Resolution target of an address mapping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AddressTarget {
    /// Answer with a fixed address.
    Address {
        /// Address literal (or a daemon keyword such as `#`).
        ip: String,
    },
    /// Answer with an alias.
    Cname {
        /// Alias target.
        cname: String,
    },
}

/// Domain to IP or CNAME mapping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AddressMapping {
    /// Store identifier.
    #[serde(default)]
    pub id: Option<EntityId>,
    /// Domain being answered.
    pub domain: String,
    /// Answer for the domain.
    #[serde(flatten)]
    pub target: AddressTarget,
    /// Inline comment written after the directive.
    #[serde(default)]
    pub comment: Option<String>,
    /// Disabled mappings are absent from every node.
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// Nodes the mapping applies to.
    #[serde(default)]
    pub nodes: NodeSelector,
}

impl AddressMapping {
    /// Mapping answering with an address.
    #[must_use]
    pub fn ip(domain: impl Into<String>, ip: impl Into<String>) -> Self {
        Self {
            id: None,
            domain: domain.into(),
            target: AddressTarget::Address { ip: ip.into() },
            comment: None,
            enabled: true,
            nodes: NodeSelector::all(),
        }
    }

    /// Mapping answering with an alias.
    #[must_use]
    pub fn cname(domain: impl Into<String>, cname: impl Into<String>) -> Self {
        Self {
            target: AddressTarget::Cname {
                cname: cname.into(),
            },
            ..Self::ip(domain, String::new())
        }
    }

    /// Answer with `ip`, clearing any alias.
    pub fn set_ip(&mut self, ip: impl Into<String>) {
        self.target = AddressTarget::Address { ip: ip.into() };
    }

    /// Answer with `cname`, clearing any address.
    pub fn set_cname(&mut self, cname: impl Into<String>) {
        self.target = AddressTarget::Cname {
            cname: cname.into(),
        };
    }

    /// Address answer, if any.
    #[must_use]
    pub fn ip_value(&self) -> Option<&str> {
        match &self.target {
            AddressTarget::Address { ip } => Some(ip),
            AddressTarget::Cname { .. } => None,
        }
    }

    /// Alias answer, if any.
    #[must_use]
    pub fn cname_value(&self) -> Option<&str> {
        match &self.target {
            AddressTarget::Cname { cname } => Some(cname),
            AddressTarget::Address { .. } => None,
        }
    }
}

/// Upstream DNS server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DnsServer {
    /// Store identifier.
    #[serde(default)]
    pub id: Option<EntityId>,
    /// Server address, optionally with a scheme and port.
    pub address: String,
    /// Explicit transport; inferred from the address when unset.
    #[serde(default, rename = "type")]
    pub server_type: Option<ServerType>,
    /// Server groups the upstream belongs to.
    #[serde(default)]
    pub groups: Vec<String>,
    /// Keep the upstream out of the default group.
    #[serde(default)]
    pub exclude_default: bool,
    /// Disabled servers are absent from every node.
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// Nodes the server applies to.
    #[serde(default)]
    pub nodes: NodeSelector,
}

impl DnsServer {
    /// Server with no groups targeting every node.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            id: None,
            address: address.into(),
            server_type: None,
            groups: Vec::new(),
            exclude_default: false,
            enabled: true,
            nodes: NodeSelector::all(),
        }
    }

    /// Explicit transport or the one implied by the address.
    #[must_use]
    pub fn effective_type(&self) -> ServerType {
        self.server_type
            .unwrap_or_else(|| ServerType::infer(&self.address))
    }

    /// Directive options derived from groups and the default-group flag.
    #[must_use]
    pub fn options(&self) -> String {
        let mut parts: Vec<String> = self
            .groups
            .iter()
            .map(|group| format!("-group {group}"))
            .collect();
        if self.exclude_default {
            parts.push("-exclude-default-group".to_string());
        }
        parts.join(" ")
    }
}

/// Target of a domain or nameserver rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RuleTarget {
    /// A single domain.
    Domain(String),
    /// Every domain of a named domain set.
    DomainSet(String),
}

impl RuleTarget {
    /// Parse the directive form (`example.com` or `domain-set:name`).
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.strip_prefix(DOMAIN_SET_PREFIX) {
            Some(name) => Self::DomainSet(name.to_string()),
            None => Self::Domain(trimmed.to_string()),
        }
    }

    /// Whether the rule refers to a domain set.
    #[must_use]
    pub const fn is_domain_set(&self) -> bool {
        matches!(self, Self::DomainSet(_))
    }

    /// Domain or set name without the prefix.
    #[must_use]
    pub fn value(&self) -> &str {
        match self {
            Self::Domain(value) | Self::DomainSet(value) => value,
        }
    }

    /// Natural key used for matching.
    #[must_use]
    pub fn key(&self) -> String {
        match self {
            Self::Domain(domain) => domain_key(domain),
            Self::DomainSet(name) => format!("{DOMAIN_SET_PREFIX}{name}"),
        }
    }
}

impl Display for RuleTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Domain(domain) => f.write_str(domain),
            Self::DomainSet(name) => write!(f, "{DOMAIN_SET_PREFIX}{name}"),
        }
    }
}

impl From<String> for RuleTarget {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<RuleTarget> for String {
    fn from(value: RuleTarget) -> Self {
        value.to_string()
    }
}

/// Per-domain classification rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DomainRule {
    /// Store identifier.
    #[serde(default)]
    pub id: Option<EntityId>,
    /// Domain or domain set the rule applies to.
    pub target: RuleTarget,
    /// `-address` option.
    #[serde(default)]
    pub address: Option<String>,
    /// `-nameserver` option.
    #[serde(default)]
    pub nameserver: Option<String>,
    /// `-speed-check-mode` option.
    #[serde(default)]
    pub speed_check_mode: Option<String>,
    /// Remaining options, kept verbatim.
    #[serde(default)]
    pub other_options: String,
    /// Lower values are written first during a full merge.
    #[serde(default)]
    pub priority: i32,
    /// Disabled rules are absent from every node.
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// Nodes the rule applies to.
    #[serde(default)]
    pub nodes: NodeSelector,
}

impl DomainRule {
    /// Rule with no options targeting every node.
    #[must_use]
    pub fn new(target: RuleTarget) -> Self {
        Self {
            id: None,
            target,
            address: None,
            nameserver: None,
            speed_check_mode: None,
            other_options: String::new(),
            priority: 0,
            enabled: true,
            nodes: NodeSelector::all(),
        }
    }
}

/// Domain to nameserver group rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NameserverRule {
    /// Store identifier.
    #[serde(default)]
    pub id: Option<EntityId>,
    /// Domain or domain set the rule applies to.
    pub target: RuleTarget,
    /// Server group resolving the target.
    pub group: String,
    /// Disabled rules are absent from every node.
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// Nodes the rule applies to.
    #[serde(default)]
    pub nodes: NodeSelector,
}

impl NameserverRule {
    /// Rule targeting every node.
    #[must_use]
    pub fn new(target: RuleTarget, group: impl Into<String>) -> Self {
        Self {
            id: None,
            target,
            group: group.into(),
            enabled: true,
            nodes: NodeSelector::all(),
        }
    }
}

/// One domain of a domain set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DomainSetItem {
    /// Domain listed in the set file.
    pub domain: String,
    /// Optional trailing comment.
    #[serde(default)]
    pub comment: Option<String>,
}

impl DomainSetItem {
    /// Item without a comment.
    #[must_use]
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            comment: None,
        }
    }
}

/// Named list of domains stored in its own file on each node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DomainSet {
    /// Store identifier.
    #[serde(default)]
    pub id: Option<EntityId>,
    /// Globally unique, immutable name.
    pub name: String,
    /// Domains in the set.
    #[serde(default)]
    pub items: Vec<DomainSetItem>,
    /// Disabled sets are absent from every node.
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// Nodes the set applies to.
    #[serde(default)]
    pub nodes: NodeSelector,
}

impl DomainSet {
    /// Set with the given domains targeting every node.
    #[must_use]
    pub fn new<I, S>(name: impl Into<String>, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: None,
            name: name.into(),
            items: domains.into_iter().map(DomainSetItem::new).collect(),
            enabled: true,
            nodes: NodeSelector::all(),
        }
    }

    /// Remote path of the set file inside `dir`.
    #[must_use]
    pub fn file_path(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}.conf", self.name))
    }

    /// Number of domains in the set.
    #[must_use]
    pub fn domain_count(&self) -> usize {
        self.items.len()
    }
}

const fn enabled_by_default() -> bool {
    true
}

/// Any managed entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entity {
    /// Upstream DNS server.
    Server(DnsServer),
    /// Address or CNAME mapping.
    Address(AddressMapping),
    /// Domain set.
    DomainSet(DomainSet),
    /// Domain rule.
    DomainRule(DomainRule),
    /// Nameserver rule.
    Nameserver(NameserverRule),
}

impl Entity {
    /// Entity family.
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        match self {
            Self::Server(_) => EntityKind::Server,
            Self::Address(_) => EntityKind::Address,
            Self::DomainSet(_) => EntityKind::DomainSet,
            Self::DomainRule(_) => EntityKind::DomainRule,
            Self::Nameserver(_) => EntityKind::Nameserver,
        }
    }

    /// Store identifier, if persisted.
    #[must_use]
    pub const fn id(&self) -> Option<EntityId> {
        match self {
            Self::Server(e) => e.id,
            Self::Address(e) => e.id,
            Self::DomainSet(e) => e.id,
            Self::DomainRule(e) => e.id,
            Self::Nameserver(e) => e.id,
        }
    }

    /// Assign the store identifier.
    pub fn set_id(&mut self, id: EntityId) {
        match self {
            Self::Server(e) => e.id = Some(id),
            Self::Address(e) => e.id = Some(id),
            Self::DomainSet(e) => e.id = Some(id),
            Self::DomainRule(e) => e.id = Some(id),
            Self::Nameserver(e) => e.id = Some(id),
        }
    }

    /// Natural key identifying the entity inside a configuration document.
    #[must_use]
    pub fn natural_key(&self) -> String {
        match self {
            Self::Server(e) => e.address.trim().to_ascii_lowercase(),
            Self::Address(e) => domain_key(&e.domain),
            Self::DomainSet(e) => e.name.trim().to_string(),
            Self::DomainRule(e) => e.target.key(),
            Self::Nameserver(e) => e.target.key(),
        }
    }

    /// Whether the entity should be present on its target nodes.
    #[must_use]
    pub const fn enabled(&self) -> bool {
        match self {
            Self::Server(e) => e.enabled,
            Self::Address(e) => e.enabled,
            Self::DomainSet(e) => e.enabled,
            Self::DomainRule(e) => e.enabled,
            Self::Nameserver(e) => e.enabled,
        }
    }

    /// Stored node selector.
    #[must_use]
    pub const fn selector(&self) -> &NodeSelector {
        match self {
            Self::Server(e) => &e.nodes,
            Self::Address(e) => &e.nodes,
            Self::DomainSet(e) => &e.nodes,
            Self::DomainRule(e) => &e.nodes,
            Self::Nameserver(e) => &e.nodes,
        }
    }

    /// Rule priority; non-rules sort as zero.
    #[must_use]
    pub const fn priority(&self) -> i32 {
        match self {
            Self::DomainRule(e) => e.priority,
            _ => 0,
        }
    }

    /// Short label such as `address example.com`.
    #[must_use]
    pub fn describe(&self) -> String {
        format!("{} {}", self.kind(), self.natural_key())
    }

    /// Check the invariants every stored entity must hold.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), EntityError> {
        let kind = self.kind();
        match self {
            Self::Server(server) => {
                token(kind, "address", &server.address)?;
                let scheme = ServerType::from_scheme(&server.address);
                if server
                    .server_type
                    .zip(scheme)
                    .is_some_and(|(declared, scheme)| declared != scheme)
                {
                    return Err(EntityError::Invalid {
                        kind,
                        field: "type",
                        reason: "conflicts with the address scheme",
                    });
                }
                for group in &server.groups {
                    token(kind, "groups", group)?;
                }
            }
            Self::Address(mapping) => {
                token(kind, "domain", &mapping.domain)?;
                match &mapping.target {
                    AddressTarget::Address { ip } => token(kind, "ip", ip)?,
                    AddressTarget::Cname { cname } => token(kind, "cname", cname)?,
                }
                single_line(kind, "comment", mapping.comment.as_deref())?;
            }
            Self::DomainSet(set) => {
                set_name(kind, &set.name)?;
                for item in &set.items {
                    token(kind, "items", &item.domain)?;
                    single_line(kind, "items", item.comment.as_deref())?;
                }
            }
            Self::DomainRule(rule) => {
                rule_target(kind, &rule.target)?;
                for (field, value) in [
                    ("address", &rule.address),
                    ("nameserver", &rule.nameserver),
                    ("speed_check_mode", &rule.speed_check_mode),
                ] {
                    if let Some(value) = value {
                        token(kind, field, value)?;
                    }
                }
                single_line(kind, "other_options", Some(&rule.other_options))?;
            }
            Self::Nameserver(rule) => {
                rule_target(kind, &rule.target)?;
                token(kind, "group", &rule.group)?;
            }
        }
        self.selector()
            .parse()
            .map(|_| ())
            .map_err(|source| EntityError::Selector { source })
    }
}

fn token(kind: EntityKind, field: &'static str, value: &str) -> Result<(), EntityError> {
    let reason = if value.trim().is_empty() {
        Some("must not be empty")
    } else if value.chars().any(char::is_whitespace) {
        Some("must not contain whitespace")
    } else if value.contains('/') && field != "address" {
        Some("must not contain '/'")
    } else {
        None
    };
    reason.map_or(Ok(()), |reason| Err(EntityError::Invalid { kind, field, reason }))
}

fn single_line(
    kind: EntityKind,
    field: &'static str,
    value: Option<&str>,
) -> Result<(), EntityError> {
    if value.is_some_and(|text| text.contains(['\n', '\r'])) {
        return Err(EntityError::Invalid {
            kind,
            field,
            reason: "must be a single line",
        });
    }
    Ok(())
}

fn rule_target(kind: EntityKind, target: &RuleTarget) -> Result<(), EntityError> {
    match target {
        RuleTarget::Domain(domain) => token(kind, "target", domain),
        RuleTarget::DomainSet(name) => set_name(kind, name),
    }
}

fn set_name(kind: EntityKind, name: &str) -> Result<(), EntityError> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(EntityError::Invalid {
            kind,
            field: "name",
            reason: "must be a plain file name",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setting_ip_clears_cname() {
        let mut mapping = AddressMapping::cname("a.com", "b.com");
        assert_eq!(mapping.cname_value(), Some("b.com"));
        mapping.set_ip("1.1.1.1");
        assert_eq!(mapping.ip_value(), Some("1.1.1.1"));
        assert_eq!(mapping.cname_value(), None);
        mapping.set_cname("c.com");
        assert_eq!(mapping.ip_value(), None);
    }

    #[test]
    fn server_type_is_inferred_from_scheme() {
        assert_eq!(
            DnsServer::new("https://dns.google/dns-query").effective_type(),
            ServerType::Https
        );
        assert_eq!(DnsServer::new("tls://1.1.1.1").effective_type(), ServerType::Tls);
        assert_eq!(DnsServer::new("tcp://8.8.8.8").effective_type(), ServerType::Tcp);
        assert_eq!(DnsServer::new("udp://8.8.8.8").effective_type(), ServerType::Udp);
        assert_eq!(DnsServer::new("8.8.8.8:53").effective_type(), ServerType::Udp);

        let mut forced = DnsServer::new("8.8.8.8");
        forced.server_type = Some(ServerType::Tcp);
        assert_eq!(forced.effective_type(), ServerType::Tcp);
        assert_eq!(ServerType::from_scheme("8.8.8.8"), None);
        assert_eq!(ServerType::from_scheme("TLS://1.1.1.1"), Some(ServerType::Tls));
    }

    #[test]
    fn declared_type_must_agree_with_address_scheme() {
        let mut server = DnsServer::new("tcp://1.1.1.1");
        server.server_type = Some(ServerType::Udp);
        assert!(matches!(
            Entity::Server(server.clone()).validate(),
            Err(EntityError::Invalid {
                field: "type",
                reason: "conflicts with the address scheme",
                ..
            })
        ));

        server.server_type = Some(ServerType::Tcp);
        assert!(Entity::Server(server).validate().is_ok());

        let mut bare = DnsServer::new("1.1.1.1");
        bare.server_type = Some(ServerType::Tls);
        assert!(Entity::Server(bare).validate().is_ok());
    }

    #[test]
    fn server_options_follow_groups() {
        let mut server = DnsServer::new("1.1.1.1");
        assert_eq!(server.options(), "");
        server.groups = vec!["cn".into(), "office".into()];
        server.exclude_default = true;
        assert_eq!(
            server.options(),
            "-group cn -group office -exclude-default-group"
        );
    }

    #[test]
    fn rule_target_keys_distinguish_sets() {
        let set = RuleTarget::parse("domain-set:gfwlist");
        assert!(set.is_domain_set());
        assert_eq!(set.value(), "gfwlist");
        assert_eq!(set.key(), "domain-set:gfwlist");

        let domain = RuleTarget::parse(" Example.COM ");
        assert!(!domain.is_domain_set());
        assert_eq!(domain.key(), "example.com");
        assert_eq!(domain.to_string(), "Example.COM");
    }

    #[test]
    fn domain_set_path_is_derived_from_name() {
        let set = DomainSet::new("gfwlist", ["a.com", "b.com"]);
        assert_eq!(
            set.file_path(Path::new("/etc/smartdns")),
            PathBuf::from("/etc/smartdns/gfwlist.conf")
        );
        assert_eq!(set.domain_count(), 2);
    }

    #[test]
    fn entity_json_uses_kind_tag() -> Result<(), serde_json::Error> {
        let entity: Entity = serde_json::from_str(
            r#"{"kind":"address","domain":"a.com","type":"cname","cname":"b.com","nodes":"[1,2]"}"#,
        )?;
        let Entity::Address(mapping) = &entity else {
            panic!("expected address");
        };
        assert_eq!(mapping.cname_value(), Some("b.com"));
        assert!(mapping.enabled);
        assert_eq!(entity.natural_key(), "a.com");

        let rule: Entity =
            serde_json::from_str(r#"{"kind":"nameserver","target":"domain-set:ads","group":"cn"}"#)?;
        assert_eq!(rule.natural_key(), "domain-set:ads");
        Ok(())
    }

    #[test]
    fn validation_rejects_unsafe_values() {
        let bad_set = Entity::DomainSet(DomainSet::new("../etc/passwd", ["a.com"]));
        assert!(matches!(
            bad_set.validate(),
            Err(EntityError::Invalid { field: "name", .. })
        ));

        let spaced = Entity::Address(AddressMapping::ip("a .com", "1.1.1.1"));
        assert!(spaced.validate().is_err());

        let mut bad_selector = AddressMapping::ip("a.com", "1.1.1.1");
        bad_selector.nodes = NodeSelector::from("[1,");
        assert!(matches!(
            Entity::Address(bad_selector).validate(),
            Err(EntityError::Selector { .. })
        ));

        let doh = Entity::Server(DnsServer::new("https://dns.google/dns-query"));
        assert!(doh.validate().is_ok());
    }

    #[test]
    fn kind_labels_round_trip() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::from_label(kind.as_str()), Some(kind));
        }
        assert_eq!(EntityKind::DomainRule.log_type(), SyncLogType::DomainRule);
    }
}
