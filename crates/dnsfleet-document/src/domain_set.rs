//! Domain set list files (`<dir>/<name>.conf`), one domain per line.

use dnsfleet_core::{DomainSet, DomainSetItem};

/// Render the list file for `set`.
#[must_use]
pub fn render_domain_set_file(set: &DomainSet) -> String {
    let mut out = String::new();
    for item in &set.items {
        out.push_str(item.domain.trim());
        if let Some(comment) = item.comment.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            out.push_str(" # ");
            out.push_str(comment);
        }
        out.push('\n');
    }
    out
}

/// Parse a list file. Blank lines and whole-line comments are skipped; a
/// trailing ` # text` becomes the item comment.
#[must_use]
pub fn parse_domain_set_file(text: &str) -> Vec<DomainSetItem> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let (domain, comment) = match line.split_once('#') {
                Some((domain, comment)) => (domain.trim(), Some(comment.trim())),
                None => (line, None),
            };
            let domain = domain.split_whitespace().next()?;
            Some(DomainSetItem {
                domain: domain.to_string(),
                comment: comment.filter(|c| !c.is_empty()).map(str::to_string),
            })
        })
        .collect()
}
