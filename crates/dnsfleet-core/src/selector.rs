//! Stored "apply to these nodes" references.
//!
//! A selector is persisted as text: an empty string or `[]` means every node
//! that exists when the selector is resolved, otherwise a JSON array of node
//! ids. Resolution against the node inventory happens at call time, so
//! nodes added later are picked up by "all" selectors.

use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::error::SelectorError;
use crate::model::NodeId;

/// Raw selector text as stored alongside an entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeSelector(String);

/// Interpreted selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorTarget {
    /// Every node present at resolution time.
    All,
    /// Explicit node ids, deduplicated and sorted.
    Nodes(Vec<NodeId>),
}

impl SelectorTarget {
    /// Whether `node_id` is selected.
    #[must_use]
    pub fn contains(&self, node_id: NodeId) -> bool {
        match self {
            Self::All => true,
            Self::Nodes(ids) => ids.binary_search(&node_id).is_ok(),
        }
    }
}

impl NodeSelector {
    /// Selector matching every node.
    #[must_use]
    pub const fn all() -> Self {
        Self(String::new())
    }

    /// Selector for an explicit set of nodes.
    #[must_use]
    pub fn nodes<I>(ids: I) -> Self
    where
        I: IntoIterator<Item = NodeId>,
    {
        let unique: BTreeSet<NodeId> = ids.into_iter().collect();
        let rendered = unique
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        Self(format!("[{rendered}]"))
    }

    /// Raw stored text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Interpret the stored text.
    ///
    /// # Errors
    ///
    /// Returns [`SelectorError::Malformed`] when the text is neither empty nor
    /// a JSON array of integer node ids.
    pub fn parse(&self) -> Result<SelectorTarget, SelectorError> {
        let trimmed = self.0.trim();
        if trimmed.is_empty() {
            return Ok(SelectorTarget::All);
        }
        let ids: Vec<NodeId> =
            serde_json::from_str(trimmed).map_err(|source| SelectorError::Malformed {
                value: self.0.clone(),
                source,
            })?;
        if ids.is_empty() {
            return Ok(SelectorTarget::All);
        }
        let unique: BTreeSet<NodeId> = ids.into_iter().collect();
        Ok(SelectorTarget::Nodes(unique.into_iter().collect()))
    }
}

impl From<&str> for NodeSelector {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for NodeSelector {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Display for NodeSelector {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.0.trim().is_empty() {
            f.write_str("all")
        } else {
            f.write_str(&self.0)
        }
    }
}
