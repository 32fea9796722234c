//! Natural-key merge of entity changes into a document.

use std::path::Path;

use dnsfleet_core::{Entity, EntityKind};

use crate::model::{ConfigDocument, ManagedEntry};

/// Direction of a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOp {
    /// Insert or replace the entity's directive.
    Upsert,
    /// Remove every directive with the entity's key.
    Remove,
}

/// Apply one entity change to `doc`.
///
/// Upsert replaces the first directive with the same natural key in place,
/// drops later duplicates of that key, or appends when absent. Remove drops
/// every directive with the key. Both are idempotent and leave unmanaged
/// lines and basic settings untouched.
pub fn merge(doc: &mut ConfigDocument, entity: &Entity, op: MergeOp, domain_set_dir: &Path) {
    match op {
        MergeOp::Upsert => upsert(doc, ManagedEntry::from_entity(entity, domain_set_dir)),
        MergeOp::Remove => {
            let _ = remove_key(doc, entity.kind(), &entity.natural_key());
        }
    }
}

/// Upsert every entity in full-merge order (servers, addresses, domain sets,
/// domain rules, nameservers), preserving the relative order of each kind
/// as supplied.
pub fn merge_full(doc: &mut ConfigDocument, entities: &[Entity], domain_set_dir: &Path) {
    for kind in EntityKind::ALL {
        for entity in entities.iter().filter(|entity| entity.kind() == kind) {
            merge(doc, entity, MergeOp::Upsert, domain_set_dir);
        }
    }
}

/// Insert or replace a directive by natural key.
pub fn upsert(doc: &mut ConfigDocument, entry: ManagedEntry) {
    match entry {
        ManagedEntry::Server(e) => upsert_keyed(&mut doc.servers, e, |x| x.key()),
        ManagedEntry::Address(e) => upsert_keyed(&mut doc.addresses, e, |x| x.key()),
        ManagedEntry::DomainSet(e) => upsert_keyed(&mut doc.domain_sets, e, |x| x.key()),
        ManagedEntry::DomainRule(e) => upsert_keyed(&mut doc.domain_rules, e, |x| x.key()),
        ManagedEntry::Nameserver(e) => upsert_keyed(&mut doc.nameservers, e, |x| x.key()),
    }
}

/// Remove every directive of `kind` with `key`; returns how many were removed.
pub fn remove_key(doc: &mut ConfigDocument, kind: EntityKind, key: &str) -> usize {
    match kind {
        EntityKind::Server => remove_keyed(&mut doc.servers, key, |x| x.key()),
        EntityKind::Address => remove_keyed(&mut doc.addresses, key, |x| x.key()),
        EntityKind::DomainSet => remove_keyed(&mut doc.domain_sets, key, |x| x.key()),
        EntityKind::DomainRule => remove_keyed(&mut doc.domain_rules, key, |x| x.key()),
        EntityKind::Nameserver => remove_keyed(&mut doc.nameservers, key, |x| x.key()),
    }
}

fn upsert_keyed<T, F>(items: &mut Vec<T>, entry: T, key_of: F)
where
    F: Fn(&T) -> String,
{
    let key = key_of(&entry);
    let Some(first) = items.iter().position(|item| key_of(item) == key) else {
        items.push(entry);
        return;
    };
    items[first] = entry;
    let mut index = 0;
    items.retain(|item| {
        let keep = index <= first || key_of(item) != key;
        index += 1;
        keep
    });
}

fn remove_keyed<T, F>(items: &mut Vec<T>, key: &str, key_of: F) -> usize
where
    F: Fn(&T) -> String,
{
    let before = items.len();
    items.retain(|item| key_of(item) != key);
    before - items.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::generate;
    use crate::parse::parse;
    use dnsfleet_core::{
        AddressMapping, DnsServer, DomainRule, DomainSet, NameserverRule, RuleTarget,
    };

    const DIR: &str = "/etc/smartdns";

    fn address(domain: &str, ip: &str) -> Entity {
        Entity::Address(AddressMapping::ip(domain, ip))
    }

    #[test]
    fn upsert_replaces_existing_line_in_place() {
        let mut doc =
            parse("address /z.com/9.9.9.9\naddress /a.com/2.2.2.2\naddress /b.com/3.3.3.3\n");
        merge(&mut doc, &address("a.com", "1.1.1.1"), MergeOp::Upsert, Path::new(DIR));

        let text = generate(&doc);
        assert_eq!(text.matches("/a.com/").count(), 1);
        assert!(text.contains("address /a.com/1.1.1.1"));
        assert!(!text.contains("2.2.2.2"));
        let domains: Vec<_> = doc.addresses.iter().map(|a| a.domain.as_str()).collect();
        assert_eq!(domains, vec!["z.com", "a.com", "b.com"]);
    }

    #[test]
    fn upsert_collapses_duplicate_keys() {
        let mut doc =
            parse("address /A.com/2.2.2.2\naddress /b.com/3.3.3.3\ncname /a.com/x.com\n");
        merge(&mut doc, &address("a.com", "1.1.1.1"), MergeOp::Upsert, Path::new(DIR));
        assert_eq!(doc.addresses.len(), 2);
        assert_eq!(doc.addresses[0].domain, "a.com");
        assert_eq!(doc.addresses[1].domain, "b.com");
    }

    #[test]
    fn upsert_and_remove_are_idempotent() {
        let base = parse("bind :53\nserver 8.8.8.8\n");
        let server = Entity::Server(DnsServer::new("1.1.1.1"));

        let mut once = base.clone();
        merge(&mut once, &server, MergeOp::Upsert, Path::new(DIR));
        let mut twice = once.clone();
        merge(&mut twice, &server, MergeOp::Upsert, Path::new(DIR));
        assert_eq!(once, twice);

        merge(&mut twice, &server, MergeOp::Remove, Path::new(DIR));
        let mut thrice = twice.clone();
        merge(&mut thrice, &server, MergeOp::Remove, Path::new(DIR));
        assert_eq!(twice, thrice);
        assert_eq!(thrice, base);
    }

    #[test]
    fn remove_of_unrelated_entity_keeps_unmanaged_content() {
        let mut doc = parse("bind :53\n# hand edited\naddress /a.com/1.1.1.1\n");
        merge(&mut doc, &address("other.com", "1.1.1.1"), MergeOp::Remove, Path::new(DIR));
        assert_eq!(doc.unmanaged, vec!["bind :53", "# hand edited"]);
        assert_eq!(doc.addresses.len(), 1);
    }

    #[test]
    fn domain_set_and_domain_rule_keys_do_not_collide() {
        let mut doc = ConfigDocument::default();
        let set_rule = Entity::Nameserver(NameserverRule::new(
            RuleTarget::DomainSet("corp".into()),
            "office",
        ));
        let domain_rule = Entity::Nameserver(NameserverRule::new(
            RuleTarget::Domain("corp".into()),
            "cn",
        ));
        merge(&mut doc, &set_rule, MergeOp::Upsert, Path::new(DIR));
        merge(&mut doc, &domain_rule, MergeOp::Upsert, Path::new(DIR));
        assert_eq!(doc.nameservers.len(), 2);
        assert_eq!(remove_key(&mut doc, EntityKind::Nameserver, "domain-set:corp"), 1);
        assert_eq!(doc.nameservers[0].group, "cn");
    }

    #[test]
    fn full_merge_follows_kind_order() {
        let mut rule = DomainRule::new(RuleTarget::DomainSet("gfwlist".into()));
        rule.nameserver = Some("oversea".into());
        let entities = vec![
            Entity::DomainRule(rule),
            Entity::Nameserver(NameserverRule::new(RuleTarget::parse("corp.lan"), "office")),
            address("a.com", "1.1.1.1"),
            Entity::DomainSet(DomainSet::new("gfwlist", ["x.com"])),
            Entity::Server(DnsServer::new("8.8.8.8")),
        ];
        let mut doc = parse("bind :53\n");
        merge_full(&mut doc, &entities, Path::new(DIR));
        assert_eq!(
            generate(&doc),
            "\
# [dnsfleet] servers
server 8.8.8.8

# [dnsfleet] addresses
address /a.com/1.1.1.1

# [dnsfleet] domain-sets
domain-set -name gfwlist -file /etc/smartdns/gfwlist.conf

# [dnsfleet] domain-rules
domain-rules /domain-set:gfwlist/ -nameserver oversea

# [dnsfleet] nameservers
nameserver /corp.lan/office

# [dnsfleet] unmanaged
bind :53
"
        );
    }
}
