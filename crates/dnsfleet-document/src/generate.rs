//! Deterministic configuration rendering.

use std::fmt::Write as _;

use dnsfleet_core::{AddressTarget, ServerType};

use crate::model::{
    AddressEntry, ConfigDocument, DomainRuleEntry, DomainSetEntry, ManagedEntry, NameserverEntry,
    ServerEntry,
};
use crate::options::RuleOption;

/// Prefix of the section headers written by [`generate`]; the parser skips
/// these lines.
pub const SECTION_MARKER: &str = "# [dnsfleet]";

/// Render a document.
///
/// Sections are written in a fixed order (basic settings, servers,
/// addresses, domain sets, domain rules, nameservers, unmanaged lines), each
/// preceded by a header when non-empty.
#[must_use]
pub fn generate(doc: &ConfigDocument) -> String {
    let mut out = String::new();

    let basic: Vec<String> = doc
        .basic
        .ordered()
        .into_iter()
        .map(|(key, value)| format!("{key} {value}"))
        .collect();
    section(&mut out, "basic", basic);
    section(&mut out, "servers", doc.servers.iter().map(server_line));
    section(&mut out, "addresses", doc.addresses.iter().map(address_line));
    section(
        &mut out,
        "domain-sets",
        doc.domain_sets.iter().map(domain_set_line),
    );
    section(
        &mut out,
        "domain-rules",
        doc.domain_rules.iter().map(domain_rule_line),
    );
    section(
        &mut out,
        "nameservers",
        doc.nameservers.iter().map(nameserver_line),
    );
    section(&mut out, "unmanaged", doc.unmanaged.iter().cloned());
    out
}

/// Render the directive for a single entry.
#[must_use]
pub fn render_entry(entry: &ManagedEntry) -> String {
    match entry {
        ManagedEntry::Server(server) => server_line(server),
        ManagedEntry::Address(address) => address_line(address),
        ManagedEntry::DomainSet(set) => domain_set_line(set),
        ManagedEntry::DomainRule(rule) => domain_rule_line(rule),
        ManagedEntry::Nameserver(rule) => nameserver_line(rule),
    }
}

fn section<I>(out: &mut String, name: &str, lines: I)
where
    I: IntoIterator<Item = String>,
{
    let mut lines = lines.into_iter().peekable();
    if lines.peek().is_none() {
        return;
    }
    if !out.is_empty() {
        out.push('\n');
    }
    let _ = writeln!(out, "{SECTION_MARKER} {name}");
    for line in lines {
        out.push_str(&line);
        out.push('\n');
    }
}

fn server_directive(entry: &ServerEntry) -> &'static str {
    if ServerType::infer(&entry.address) == entry.server_type {
        return "server";
    }
    match entry.server_type {
        ServerType::Udp => "server",
        ServerType::Tcp => "server-tcp",
        ServerType::Tls => "server-tls",
        ServerType::Https => "server-https",
    }
}

fn server_line(entry: &ServerEntry) -> String {
    let mut line = format!("{} {}", server_directive(entry), entry.address);
    for group in &entry.groups {
        let _ = write!(line, " -group {group}");
    }
    if entry.exclude_default {
        line.push_str(" -exclude-default-group");
    }
    push_options(&mut line, &entry.extra_options);
    line
}

fn address_line(entry: &AddressEntry) -> String {
    let mut line = match &entry.target {
        AddressTarget::Address { ip } => format!("address /{}/{ip}", entry.domain),
        AddressTarget::Cname { cname } => format!("cname /{}/{cname}", entry.domain),
    };
    if let Some(comment) = &entry.comment {
        let _ = write!(line, " # {comment}");
    }
    line
}

fn domain_set_line(entry: &DomainSetEntry) -> String {
    let mut line = format!("domain-set -name {} -file {}", entry.name, entry.file);
    push_options(&mut line, &entry.extra_options);
    line
}

fn domain_rule_line(entry: &DomainRuleEntry) -> String {
    let mut line = format!("domain-rules /{}/", entry.target);
    if let Some(address) = &entry.address {
        let _ = write!(line, " -address {address}");
    }
    if let Some(nameserver) = &entry.nameserver {
        let _ = write!(line, " -nameserver {nameserver}");
    }
    if let Some(mode) = &entry.speed_check_mode {
        let _ = write!(line, " -speed-check-mode {mode}");
    }
    push_options(&mut line, &RuleOption::dedup_by_flag(entry.other_options.clone()));
    line
}

fn nameserver_line(entry: &NameserverEntry) -> String {
    format!("nameserver /{}/{}", entry.target, entry.group)
}

fn push_options(line: &mut String, options: &[RuleOption]) {
    if !options.is_empty() {
        line.push(' ');
        line.push_str(&RuleOption::render_list(options));
    }
}
