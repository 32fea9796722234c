//! Directive option tokens (`-flag [value]`).

use std::collections::HashSet;
use std::fmt::{self, Display, Formatter};

use serde::Serialize;

/// One option of a directive, e.g. `-speed-check-mode ping`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleOption {
    /// Flag including the leading dash, or a stray token.
    pub flag: String,
    /// Value following the flag.
    pub value: Option<String>,
}

impl RuleOption {
    /// Option with a value.
    #[must_use]
    pub fn with_value(flag: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            flag: flag.into(),
            value: Some(value.into()),
        }
    }

    /// Option without a value.
    #[must_use]
    pub fn flag(flag: impl Into<String>) -> Self {
        Self {
            flag: flag.into(),
            value: None,
        }
    }

    /// Split option text into options. A token is a flag when it starts with
    /// `-` followed by a letter; a following non-flag token is its value.
    #[must_use]
    pub fn tokenize(text: &str) -> Vec<Self> {
        let mut options: Vec<Self> = Vec::new();
        for token in text.split_whitespace() {
            if is_flag(token) {
                options.push(Self::flag(token));
                continue;
            }
            match options.last_mut() {
                Some(last) if is_flag(&last.flag) && last.value.is_none() => {
                    last.value = Some(token.to_string());
                }
                _ => options.push(Self::flag(token)),
            }
        }
        options
    }

    /// Keep the first occurrence of every flag.
    #[must_use]
    pub fn dedup_by_flag(options: Vec<Self>) -> Vec<Self> {
        let mut seen = HashSet::new();
        options
            .into_iter()
            .filter(|option| seen.insert(option.flag.clone()))
            .collect()
    }

    /// Render a list as space separated text.
    #[must_use]
    pub fn render_list(options: &[Self]) -> String {
        options
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Display for RuleOption {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{} {value}", self.flag),
            None => f.write_str(&self.flag),
        }
    }
}

/// `domain-rules` options split into the extracted fields and the rest.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct RuleOptionSplit {
    pub(crate) address: Option<String>,
    pub(crate) nameserver: Option<String>,
    pub(crate) speed_check_mode: Option<String>,
    pub(crate) others: Vec<RuleOption>,
}

/// Extract `-address`/`-a`, `-nameserver`/`-n` and `-speed-check-mode`/`-c`
/// (first valued occurrence wins) and de-duplicate everything else by flag.
pub(crate) fn split_rule_options(options: Vec<RuleOption>) -> RuleOptionSplit {
    let mut split = RuleOptionSplit::default();
    let mut others = Vec::new();
    for option in options {
        let slot = match option.flag.as_str() {
            "-address" | "-a" => Some(&mut split.address),
            "-nameserver" | "-n" => Some(&mut split.nameserver),
            "-speed-check-mode" | "-c" => Some(&mut split.speed_check_mode),
            _ => None,
        };
        match (slot, option.value) {
            (Some(slot), Some(value)) => {
                if slot.is_none() {
                    *slot = Some(value);
                }
            }
            (_, value) => others.push(RuleOption {
                flag: option.flag,
                value,
            }),
        }
    }
    split.others = RuleOption::dedup_by_flag(others);
    split
}

fn is_flag(token: &str) -> bool {
    let mut chars = token.chars();
    chars.next() == Some('-') && chars.next().is_some_and(|c| c.is_ascii_alphabetic())
}
