//! Structured view of a configuration file.
//!
//! Entries are projections of the managed entities: they hold exactly what
//! the directive text encodes, so parsing generated text reproduces the
//! entries that were rendered.

use std::path::Path;

use dnsfleet_core::{
    AddressMapping, AddressTarget, DnsServer, DomainRule, DomainSet, Entity, EntityKind,
    NameserverRule, RuleTarget, ServerType, domain_key,
};
use serde::Serialize;

use crate::options::{RuleOption, split_rule_options};

/// Basic setting keys recognised by the parser, in generation order.
///
/// Repeatable directives (`bind`, `conf-file`, ...) are deliberately absent
/// and travel as unmanaged lines.
pub const BASIC_KEYS: &[&str] = &[
    "server-name",
    "resolv-file",
    "cache-size",
    "cache-persist",
    "cache-file",
    "prefetch-domain",
    "serve-expired",
    "serve-expired-ttl",
    "serve-expired-reply-ttl",
    "speed-check-mode",
    "response-mode",
    "dualstack-ip-selection",
    "dualstack-ip-selection-threshold",
    "edns-client-subnet",
    "rr-ttl",
    "rr-ttl-min",
    "rr-ttl-max",
    "rr-ttl-reply-max",
    "local-ttl",
    "max-reply-ip-num",
    "tcp-idle-time",
    "force-AAAA-SOA",
    "log-level",
    "log-file",
    "log-size",
    "log-num",
    "audit-enable",
    "audit-file",
    "audit-size",
    "audit-num",
];

/// Key/value daemon settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BasicSettings {
    entries: Vec<(String, String)>,
}

impl BasicSettings {
    /// Value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value.as_str())
    }

    /// Set `key`, replacing an existing value in place.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Remove `key`, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self.entries.iter().position(|(existing, _)| existing == key)?;
        Some(self.entries.remove(index).1)
    }

    /// Number of settings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no settings are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Settings in generation order: recognised keys in [`BASIC_KEYS`] order,
    /// then any other keys in insertion order.
    #[must_use]
    pub fn ordered(&self) -> Vec<(&str, &str)> {
        let known = BASIC_KEYS
            .iter()
            .filter_map(|key| self.get(key).map(|value| (*key, value)));
        let extra = self
            .entries
            .iter()
            .filter(|(key, _)| !BASIC_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.as_str(), value.as_str()));
        known.chain(extra).collect()
    }
}

/// `server` directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerEntry {
    /// Upstream address.
    pub address: String,
    /// Resolved transport.
    pub server_type: ServerType,
    /// `-group` values.
    pub groups: Vec<String>,
    /// `-exclude-default-group` present.
    pub exclude_default: bool,
    /// Unrecognised options kept verbatim.
    pub extra_options: Vec<RuleOption>,
}

/// `address` or `cname` directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressEntry {
    /// Domain being answered.
    pub domain: String,
    /// Address or alias answer.
    pub target: AddressTarget,
    /// Trailing comment.
    pub comment: Option<String>,
}

/// `domain-set` declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainSetEntry {
    /// Set name.
    pub name: String,
    /// Remote path of the set file.
    pub file: String,
    /// Unrecognised options kept verbatim.
    pub extra_options: Vec<RuleOption>,
}

/// `domain-rules` directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainRuleEntry {
    /// Domain or set target.
    pub target: RuleTarget,
    /// `-address` value.
    pub address: Option<String>,
    /// `-nameserver` value.
    pub nameserver: Option<String>,
    /// `-speed-check-mode` value.
    pub speed_check_mode: Option<String>,
    /// Remaining options, unique by flag.
    pub other_options: Vec<RuleOption>,
}

/// `nameserver` directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NameserverEntry {
    /// Domain or set target.
    pub target: RuleTarget,
    /// Server group.
    pub group: String,
}

impl ServerEntry {
    /// Natural key.
    #[must_use]
    pub fn key(&self) -> String {
        self.address.trim().to_ascii_lowercase()
    }
}

impl AddressEntry {
    /// Natural key.
    #[must_use]
    pub fn key(&self) -> String {
        domain_key(&self.domain)
    }
}

impl DomainSetEntry {
    /// Natural key.
    #[must_use]
    pub fn key(&self) -> String {
        self.name.trim().to_string()
    }
}

impl DomainRuleEntry {
    /// Natural key.
    #[must_use]
    pub fn key(&self) -> String {
        self.target.key()
    }
}

impl NameserverEntry {
    /// Natural key.
    #[must_use]
    pub fn key(&self) -> String {
        self.target.key()
    }
}

impl From<&DnsServer> for ServerEntry {
    fn from(server: &DnsServer) -> Self {
        Self {
            address: server.address.trim().to_string(),
            server_type: server.effective_type(),
            groups: server.groups.clone(),
            exclude_default: server.exclude_default,
            extra_options: Vec::new(),
        }
    }
}

impl From<&AddressMapping> for AddressEntry {
    fn from(mapping: &AddressMapping) -> Self {
        Self {
            domain: mapping.domain.trim().to_string(),
            target: mapping.target.clone(),
            comment: mapping
                .comment
                .as_deref()
                .map(str::trim)
                .filter(|comment| !comment.is_empty())
                .map(str::to_string),
        }
    }
}

impl From<&DomainRule> for DomainRuleEntry {
    fn from(rule: &DomainRule) -> Self {
        let explicit = [
            ("-address", &rule.address),
            ("-nameserver", &rule.nameserver),
            ("-speed-check-mode", &rule.speed_check_mode),
        ]
        .into_iter()
        .filter_map(|(flag, value)| {
            value
                .as_deref()
                .map(|value| RuleOption::with_value(flag, value.trim()))
        });
        let options = explicit
            .chain(RuleOption::tokenize(&rule.other_options))
            .collect();
        let split = split_rule_options(options);
        Self {
            target: rule.target.clone(),
            address: split.address,
            nameserver: split.nameserver,
            speed_check_mode: split.speed_check_mode,
            other_options: split.others,
        }
    }
}

impl From<&NameserverRule> for NameserverEntry {
    fn from(rule: &NameserverRule) -> Self {
        Self {
            target: rule.target.clone(),
            group: rule.group.clone(),
        }
    }
}

impl DomainSetEntry {
    /// Declaration for `set` whose file lives in `dir`.
    #[must_use]
    pub fn for_set(set: &DomainSet, dir: &Path) -> Self {
        Self {
            name: set.name.clone(),
            file: set.file_path(dir).display().to_string(),
            extra_options: Vec::new(),
        }
    }
}

/// A single managed directive of any kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ManagedEntry {
    /// `server*` line.
    Server(ServerEntry),
    /// `address`/`cname` line.
    Address(AddressEntry),
    /// `domain-set` line.
    DomainSet(DomainSetEntry),
    /// `domain-rules` line.
    DomainRule(DomainRuleEntry),
    /// `nameserver` line.
    Nameserver(NameserverEntry),
}

impl ManagedEntry {
    /// Project an entity into its directive; domain set files live in
    /// `domain_set_dir`.
    #[must_use]
    pub fn from_entity(entity: &Entity, domain_set_dir: &Path) -> Self {
        match entity {
            Entity::Server(server) => Self::Server(server.into()),
            Entity::Address(mapping) => Self::Address(mapping.into()),
            Entity::DomainSet(set) => Self::DomainSet(DomainSetEntry::for_set(set, domain_set_dir)),
            Entity::DomainRule(rule) => Self::DomainRule(rule.into()),
            Entity::Nameserver(rule) => Self::Nameserver(rule.into()),
        }
    }

    /// Entity family of the directive.
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

    /// Natural key.
    #[must_use]
    pub fn key(&self) -> String {
        match self {
            Self::Server(entry) => entry.key(),
            Self::Address(entry) => entry.key(),
            Self::DomainSet(entry) => entry.key(),
            Self::DomainRule(entry) => entry.key(),
            Self::Nameserver(entry) => entry.key(),
        }
    }
}

/// Parsed configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConfigDocument {
    /// Daemon settings.
    pub basic: BasicSettings,
    /// Upstream servers.
    pub servers: Vec<ServerEntry>,
    /// Address and alias mappings.
    pub addresses: Vec<AddressEntry>,
    /// Domain set declarations.
    pub domain_sets: Vec<DomainSetEntry>,
    /// Domain rules.
    pub domain_rules: Vec<DomainRuleEntry>,
    /// Nameserver rules.
    pub nameservers: Vec<NameserverEntry>,
    /// Lines the parser does not manage, in original order.
    pub unmanaged: Vec<String>,
}

impl ConfigDocument {
    /// Number of managed directives.
    #[must_use]
    pub fn managed_len(&self) -> usize {
        self.servers.len()
            + self.addresses.len()
            + self.domain_sets.len()
            + self.domain_rules.len()
            + self.nameservers.len()
    }

    /// Whether a directive of `kind` with `key` is present.
    #[must_use]
    pub fn contains(&self, kind: EntityKind, key: &str) -> bool {
        match kind {
            EntityKind::Server => self.servers.iter().any(|e| e.key() == key),
            EntityKind::Address => self.addresses.iter().any(|e| e.key() == key),
            EntityKind::DomainSet => self.domain_sets.iter().any(|e| e.key() == key),
            EntityKind::DomainRule => self.domain_rules.iter().any(|e| e.key() == key),
            EntityKind::Nameserver => self.nameservers.iter().any(|e| e.key() == key),
        }
    }
}
