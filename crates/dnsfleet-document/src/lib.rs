//! Configuration document handling for the resolver daemon.
//!
//! [`parse`] turns configuration text into a [`ConfigDocument`] without ever
//! failing: directives it does not manage are carried as opaque lines.
//! [`try_parse`] is the form used before writing a document back.
//! [`generate`] renders a document deterministically, and [`merge`] applies
//! one entity change (or a full entity set) by natural key.
#![forbid(unsafe_code)]
#![warn(
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

pub mod domain_set;
pub mod generate;
pub mod merge;
pub mod model;
pub mod options;
pub mod parse;

pub use domain_set::{parse_domain_set_file, render_domain_set_file};
pub use generate::{SECTION_MARKER, generate, render_entry};
pub use merge::{MergeOp, merge, merge_full, remove_key, upsert};
pub use model::{
    AddressEntry, BASIC_KEYS, BasicSettings, ConfigDocument, DomainRuleEntry, DomainSetEntry,
    ManagedEntry, NameserverEntry, ServerEntry,
};
pub use options::RuleOption;
pub use parse::{PatternError, parse, try_parse};
