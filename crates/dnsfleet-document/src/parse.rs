//! Best-effort configuration parser.

use dnsfleet_core::{AddressTarget, RuleTarget, ServerType};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::generate::SECTION_MARKER;
use crate::model::{
    AddressEntry, BASIC_KEYS, ConfigDocument, DomainRuleEntry, DomainSetEntry, NameserverEntry,
    ServerEntry,
};
use crate::options::{RuleOption, split_rule_options};

const INLINE_COMMENT: &str = r"^(?P<body>.*?)\s+#\s*(?P<comment>.*)$";
const DOMAIN_VALUE: &str = r"^/(?P<domain>[^/\s]+)/(?P<value>\S+)$";
const RULE_TARGET: &str = r"^/(?P<target>[^/\s]+)/(?:\s+(?P<options>.*))?$";

static PATTERNS: Lazy<Result<Patterns, PatternError>> = Lazy::new(Patterns::compile);

/// A built-in directive pattern failed to compile.
#[derive(Debug, Clone, Error)]
#[error("directive pattern failed to compile")]
pub struct PatternError {
    /// Pattern source text.
    pub pattern: &'static str,
    /// Compiler diagnostic.
    #[source]
    pub source: regex::Error,
}

struct Patterns {
    inline_comment: Regex,
    domain_value: Regex,
    rule_target: Regex,
}

impl Patterns {
    fn compile() -> Result<Self, PatternError> {
        Ok(Self {
            inline_comment: compile(INLINE_COMMENT)?,
            domain_value: compile(DOMAIN_VALUE)?,
            rule_target: compile(RULE_TARGET)?,
        })
    }
}

fn compile(pattern: &'static str) -> Result<Regex, PatternError> {
    Regex::new(pattern).map_err(|source| PatternError { pattern, source })
}

/// Parse configuration text, failing only when the directive patterns are
/// unusable. Callers that write the document back use this form so a broken
/// pattern can never demote managed lines to unmanaged ones.
///
/// # Errors
///
/// Returns the first pattern that failed to compile.
pub fn try_parse(text: &str) -> Result<ConfigDocument, PatternError> {
    let patterns = PATTERNS.as_ref().map_err(Clone::clone)?;
    Ok(parse_with(patterns, text))
}

/// Parse configuration text. Never fails: lines that are not recognised as
/// managed directives are kept verbatim in [`ConfigDocument::unmanaged`];
/// blank lines and generated section headers are dropped.
///
/// Should the directive patterns be unusable, every line is kept verbatim.
#[must_use]
pub fn parse(text: &str) -> ConfigDocument {
    match PATTERNS.as_ref() {
        Ok(patterns) => parse_with(patterns, text),
        Err(_) => ConfigDocument {
            unmanaged: text
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(|line| line.trim_end().to_string())
                .collect(),
            ..ConfigDocument::default()
        },
    }
}

fn parse_with(patterns: &Patterns, text: &str) -> ConfigDocument {
    let mut doc = ConfigDocument::default();
    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with(SECTION_MARKER) {
            continue;
        }
        if !parse_managed(patterns, &mut doc, line) {
            doc.unmanaged.push(raw.trim_end().to_string());
        }
    }
    doc
}

fn parse_managed(patterns: &Patterns, doc: &mut ConfigDocument, line: &str) -> bool {
    let (directive, rest) = match line.split_once(char::is_whitespace) {
        Some((directive, rest)) => (directive, rest.trim()),
        None => (line, ""),
    };
    if rest.is_empty() {
        return false;
    }
    match directive {
        "server" => push(&mut doc.servers, parse_server(rest, None)),
        "server-tcp" => push(&mut doc.servers, parse_server(rest, Some(ServerType::Tcp))),
        "server-tls" => push(&mut doc.servers, parse_server(rest, Some(ServerType::Tls))),
        "server-https" => push(&mut doc.servers, parse_server(rest, Some(ServerType::Https))),
        "address" => push(&mut doc.addresses, parse_address(patterns, rest, false)),
        "cname" => push(&mut doc.addresses, parse_address(patterns, rest, true)),
        "domain-set" => push(&mut doc.domain_sets, parse_domain_set(rest)),
        "domain-rules" => push(&mut doc.domain_rules, parse_domain_rule(patterns, rest)),
        "nameserver" => push(&mut doc.nameservers, parse_nameserver(patterns, rest)),
        key if BASIC_KEYS.contains(&key) => {
            doc.basic.set(key, rest);
            true
        }
        _ => false,
    }
}

fn push<T>(items: &mut Vec<T>, entry: Option<T>) -> bool {
    entry.map(|entry| items.push(entry)).is_some()
}

fn parse_server(rest: &str, forced: Option<ServerType>) -> Option<ServerEntry> {
    let (address, options) = match rest.split_once(char::is_whitespace) {
        Some((address, options)) => (address, options),
        None => (rest, ""),
    };
    if address.starts_with('-') {
        return None;
    }
    let mut entry = ServerEntry {
        address: address.to_string(),
        server_type: forced.unwrap_or_else(|| ServerType::infer(address)),
        groups: Vec::new(),
        exclude_default: false,
        extra_options: Vec::new(),
    };
    for option in RuleOption::tokenize(options) {
        match (option.flag.as_str(), option.value) {
            ("-group" | "-g", Some(group)) => entry.groups.push(group),
            ("-exclude-default-group" | "-e", None) => entry.exclude_default = true,
            (_, value) => entry.extra_options.push(RuleOption {
                flag: option.flag,
                value,
            }),
        }
    }
    Some(entry)
}

fn parse_address(patterns: &Patterns, rest: &str, cname: bool) -> Option<AddressEntry> {
    let (body, comment) = match patterns.inline_comment.captures(rest) {
        Some(caps) => (
            caps.name("body").map_or("", |m| m.as_str()),
            caps.name("comment")
                .map(|m| m.as_str().trim())
                .filter(|comment| !comment.is_empty())
                .map(str::to_string),
        ),
        None => (rest, None),
    };
    let caps = patterns.domain_value.captures(body.trim())?;
    let domain = caps.name("domain")?.as_str().to_string();
    let value = caps.name("value")?.as_str().to_string();
    let target = if cname {
        AddressTarget::Cname { cname: value }
    } else {
        AddressTarget::Address { ip: value }
    };
    Some(AddressEntry {
        domain,
        target,
        comment,
    })
}

fn parse_domain_set(rest: &str) -> Option<DomainSetEntry> {
    let mut name = None;
    let mut file = None;
    let mut extra_options = Vec::new();
    for option in RuleOption::tokenize(rest) {
        match (option.flag.as_str(), option.value) {
            ("-name", Some(value)) if name.is_none() => name = Some(value),
            ("-file", Some(value)) if file.is_none() => file = Some(value),
            (_, value) => extra_options.push(RuleOption {
                flag: option.flag,
                value,
            }),
        }
    }
    Some(DomainSetEntry {
        name: name?,
        file: file?,
        extra_options,
    })
}

fn parse_domain_rule(patterns: &Patterns, rest: &str) -> Option<DomainRuleEntry> {
    let caps = patterns.rule_target.captures(rest)?;
    let target = RuleTarget::parse(caps.name("target")?.as_str());
    let options = caps.name("options").map_or("", |m| m.as_str());
    let split = split_rule_options(RuleOption::tokenize(options));
    Some(DomainRuleEntry {
        target,
        address: split.address,
        nameserver: split.nameserver,
        speed_check_mode: split.speed_check_mode,
        other_options: split.others,
    })
}

fn parse_nameserver(patterns: &Patterns, rest: &str) -> Option<NameserverEntry> {
    let caps = patterns.domain_value.captures(rest)?;
    Some(NameserverEntry {
        target: RuleTarget::parse(caps.name("domain")?.as_str()),
        group: caps.name("value")?.as_str().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directive_patterns_compile() -> anyhow::Result<()> {
        for pattern in [INLINE_COMMENT, DOMAIN_VALUE, RULE_TARGET] {
            compile(pattern)?;
        }
        let doc = try_parse("address /a.com/1.1.1.1 # lab\nnameserver /b.com/cn\n")?;
        assert_eq!(doc.addresses.len(), 1);
        assert_eq!(doc.nameservers.len(), 1);
        assert!(doc.unmanaged.is_empty());
        Ok(())
    }

    #[test]
    fn invalid_pattern_reports_its_source() {
        let err = compile(r"^/(?P<domain>[^/").expect_err("unbalanced class");
        assert_eq!(err.pattern, r"^/(?P<domain>[^/");
        assert_eq!(err.to_string(), "directive pattern failed to compile");
    }

    #[test]
    fn servers_parse_groups_aliases_and_types() {
        let doc = parse(
            "server 8.8.8.8 -group cn -g office -e\n\
             server-tls 1.1.1.1:853 -exclude-default-group -tls-host-verify cloudflare-dns.com\n\
             server https://dns.google/dns-query\n\
             server tcp://9.9.9.9\n",
        );
        assert_eq!(doc.servers.len(), 4);
        let first = &doc.servers[0];
        assert_eq!(first.server_type, ServerType::Udp);
        assert_eq!(first.groups, vec!["cn", "office"]);
        assert!(first.exclude_default);

        let tls = &doc.servers[1];
        assert_eq!(tls.server_type, ServerType::Tls);
        assert!(tls.exclude_default);
        assert_eq!(
            tls.extra_options,
            vec![RuleOption::with_value(
                "-tls-host-verify",
                "cloudflare-dns.com"
            )]
        );
        assert_eq!(doc.servers[2].server_type, ServerType::Https);
        assert_eq!(doc.servers[3].server_type, ServerType::Tcp);
    }

    #[test]
    fn addresses_and_cnames_keep_comments() {
        let doc = parse(
            "address /a.com/1.1.1.1 # office printer\n\
             address /ads.example/#\n\
             cname /b.com/c.com\n",
        );
        assert_eq!(doc.addresses.len(), 3);
        assert_eq!(doc.addresses[0].comment.as_deref(), Some("office printer"));
        assert_eq!(
            doc.addresses[1].target,
            AddressTarget::Address { ip: "#".into() }
        );
        assert_eq!(doc.addresses[1].comment, None);
        assert_eq!(
            doc.addresses[2].target,
            AddressTarget::Cname {
                cname: "c.com".into()
            }
        );
    }

    #[test]
    fn rules_and_sets_parse_targets() {
        let doc = parse(
            "domain-set -name gfwlist -file /etc/smartdns/gfwlist.conf\n\
             domain-rules /domain-set:gfwlist/ -nameserver oversea -c ping -no-cache\n\
             domain-rules /plain.com/\n\
             nameserver /domain-set:gfwlist/oversea\n\
             nameserver /corp.lan/office\n",
        );
        assert_eq!(doc.domain_sets[0].name, "gfwlist");
        assert_eq!(doc.domain_sets[0].file, "/etc/smartdns/gfwlist.conf");

        let rule = &doc.domain_rules[0];
        assert!(rule.target.is_domain_set());
        assert_eq!(rule.nameserver.as_deref(), Some("oversea"));
        assert_eq!(rule.speed_check_mode.as_deref(), Some("ping"));
        assert_eq!(rule.other_options, vec![RuleOption::flag("-no-cache")]);
        assert!(doc.domain_rules[1].other_options.is_empty());

        assert!(doc.nameservers[0].target.is_domain_set());
        assert_eq!(doc.nameservers[1].group, "office");
    }

    #[test]
    fn unknown_and_malformed_lines_are_unmanaged() {
        let text = "bind :53\n\
                    # operator note\n\
                    \n\
                    address bogus\n\
                    server\n\
                    log-level info\n\
                    conf-file /etc/smartdns/extra.conf\n";
        let doc = parse(text);
        assert_eq!(doc.basic.get("log-level"), Some("info"));
        assert_eq!(
            doc.unmanaged,
            vec![
                "bind :53",
                "# operator note",
                "address bogus",
                "server",
                "conf-file /etc/smartdns/extra.conf"
            ]
        );
        assert_eq!(doc.managed_len(), 0);
    }

    #[test]
    fn section_headers_are_skipped() {
        let doc = parse("# [dnsfleet] servers\nserver 1.1.1.1\n");
        assert!(doc.unmanaged.is_empty());
        assert_eq!(doc.servers.len(), 1);
    }

    #[test]
    fn empty_input_is_empty_document() {
        assert_eq!(parse(""), ConfigDocument::default());
    }
}
