//! Logical UI targets and the predicates that select them.
//!
//! A [`UiTarget`] may carry several predicates for the same control (for
//! example both its accessibility description and its visible text). The
//! locator groups them by [`Strategy`] and tries the groups in priority order.

use crate::result::ProbeResult;
use crate::tree::{Element, UiTree};
use crate::xpath::PathExpr;
use serde::{Deserialize, Serialize};

/// Resolution strategy, in priority order (lowest first)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Accessibility description (`content-desc`)
    Description,
    /// Visible text
    Text,
    /// Resource identifier
    ResourceId,
    /// Class names, compound predicates and structural paths
    Structural,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Description => write!(f, "description"),
            Self::Text => write!(f, "text"),
            Self::ResourceId => write!(f, "resource-id"),
            Self::Structural => write!(f, "structural"),
        }
    }
}

/// A rule matching accessibility-tree nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    /// Exact visible text
    Text(String),
    /// Visible text containing a substring
    TextContains(String),
    /// Exact accessibility description
    Description(String),
    /// Accessibility description containing a substring
    DescriptionContains(String),
    /// Resource id; a bare name also matches `<package>:id/<name>`
    ResourceId(String),
    /// Class name, fully qualified or short (`Button`)
    ClassName(String),
    /// Structural path (XPath subset)
    #[serde(rename = "xpath")]
    XPath(String),
    /// Every inner predicate must match the same node
    All(Vec<Predicate>),
}

impl Predicate {
    /// Strategy this predicate belongs to
    #[must_use]
    pub const fn strategy(&self) -> Strategy {
        match self {
            Self::Description(_) | Self::DescriptionContains(_) => Strategy::Description,
            Self::Text(_) | Self::TextContains(_) => Strategy::Text,
            Self::ResourceId(_) => Strategy::ResourceId,
            Self::ClassName(_) | Self::XPath(_) | Self::All(_) => Strategy::Structural,
        }
    }

    /// Check a single element against an attribute predicate.
    ///
    /// Structural paths need the whole tree and never match here; use
    /// [`Predicate::select`] for those.
    #[must_use]
    pub fn matches(&self, element: &Element) -> bool {
        match self {
            Self::Text(t) => element.text == *t,
            Self::TextContains(t) => element.text.contains(t.as_str()),
            Self::Description(d) => element.content_desc == *d,
            Self::DescriptionContains(d) => element.content_desc.contains(d.as_str()),
            Self::ResourceId(id) => resource_id_matches(&element.resource_id, id),
            Self::ClassName(c) => element.class_name == *c || element.short_class() == c,
            Self::XPath(_) => false,
            Self::All(parts) => parts.iter().all(|p| p.matches(element)),
        }
    }

    fn needs_tree(&self) -> bool {
        match self {
            Self::XPath(_) => true,
            Self::All(parts) => parts.iter().any(Self::needs_tree),
            _ => false,
        }
    }

    fn matching_indices(&self, tree: &UiTree) -> ProbeResult<Vec<usize>> {
        match self {
            Self::XPath(path) => Ok(PathExpr::parse(path)?.evaluate(tree)),
            Self::All(parts) if self.needs_tree() => {
                let mut acc: Option<Vec<usize>> = None;
                for part in parts {
                    let hits = part.matching_indices(tree)?;
                    acc = Some(match acc {
                        None => hits,
                        Some(prev) => prev.into_iter().filter(|i| hits.contains(i)).collect(),
                    });
                }
                Ok(acc.unwrap_or_default())
            }
            _ => Ok(tree
                .elements()
                .filter(|e| self.matches(e))
                .map(|e| e.index)
                .collect()),
        }
    }

    /// All elements of `tree` matching this predicate, in document order
    ///
    /// # Errors
    ///
    /// Returns a parse error for malformed structural paths
    pub fn select(&self, tree: &UiTree) -> ProbeResult<Vec<Element>> {
        Ok(self
            .matching_indices(tree)?
            .into_iter()
            .filter_map(|i| tree.get(i).cloned())
            .collect())
    }
}

impl std::fmt::Display for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(t) => write!(f, "text={t:?}"),
            Self::TextContains(t) => write!(f, "text~={t:?}"),
            Self::Description(d) => write!(f, "desc={d:?}"),
            Self::DescriptionContains(d) => write!(f, "desc~={d:?}"),
            Self::ResourceId(id) => write!(f, "id={id:?}"),
            Self::ClassName(c) => write!(f, "class={c:?}"),
            Self::XPath(p) => write!(f, "xpath={p:?}"),
            Self::All(parts) => {
                let inner: Vec<String> = parts.iter().map(ToString::to_string).collect();
                write!(f, "({})", inner.join(" & "))
            }
        }
    }
}

fn resource_id_matches(actual: &str, wanted: &str) -> bool {
    if actual == wanted {
        return true;
    }
    !wanted.contains(':')
        && actual
            .split_once(":id/")
            .is_some_and(|(_, name)| name == wanted)
}

/// A logical element to find.
///
/// Constructed per lookup; cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiTarget {
    /// Human-readable name used in logs and errors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Alternative predicates for the same control
    pub predicates: Vec<Predicate>,
    /// Which match to take when several match (0-based)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
}

impl UiTarget {
    /// Target with a single predicate
    #[must_use]
    pub fn new(predicate: Predicate) -> Self {
        Self {
            name: None,
            predicates: vec![predicate],
            index: None,
        }
    }

    /// Exact visible text
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(Predicate::Text(text.into()))
    }

    /// Visible text containing a substring
    #[must_use]
    pub fn text_contains(text: impl Into<String>) -> Self {
        Self::new(Predicate::TextContains(text.into()))
    }

    /// Exact accessibility description
    #[must_use]
    pub fn desc(desc: impl Into<String>) -> Self {
        Self::new(Predicate::Description(desc.into()))
    }

    /// Accessibility description containing a substring
    #[must_use]
    pub fn desc_contains(desc: impl Into<String>) -> Self {
        Self::new(Predicate::DescriptionContains(desc.into()))
    }

    /// Resource id
    #[must_use]
    pub fn id(id: impl Into<String>) -> Self {
        Self::new(Predicate::ResourceId(id.into()))
    }

    /// Class name
    #[must_use]
    pub fn class(class: impl Into<String>) -> Self {
        Self::new(Predicate::ClassName(class.into()))
    }

    /// Structural path
    #[must_use]
    pub fn xpath(path: impl Into<String>) -> Self {
        Self::new(Predicate::XPath(path.into()))
    }

    /// A control known only by its label: matches the description first,
    /// then the visible text.
    #[must_use]
    pub fn label(label: impl Into<String>) -> Self {
        let label = label.into();
        Self {
            name: Some(label.clone()),
            predicates: vec![
                Predicate::Description(label.clone()),
                Predicate::Text(label),
            ],
            index: None,
        }
    }

    /// Add an alternative predicate
    #[must_use]
    pub fn or(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Select the `index`-th match (0-based)
    #[must_use]
    pub const fn nth(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    /// Set the display name
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Predicates grouped by strategy, in priority order.
    ///
    /// Declaration order is kept inside a group.
    #[must_use]
    pub fn strategy_groups(&self) -> Vec<(Strategy, Vec<&Predicate>)> {
        let mut groups: Vec<(Strategy, Vec<&Predicate>)> = Vec::new();
        for predicate in &self.predicates {
            let strategy = predicate.strategy();
            match groups.iter_mut().find(|(s, _)| *s == strategy) {
                Some((_, members)) => members.push(predicate),
                None => groups.push((strategy, vec![predicate])),
            }
        }
        groups.sort_by_key(|(s, _)| *s);
        groups
    }

    /// Description for logs and error messages
    #[must_use]
    pub fn describe(&self) -> String {
        let base = match &self.name {
            Some(name) => name.clone(),
            None => self
                .predicates
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" | "),
        };
        match self.index {
            Some(i) => format!("{base} #{i}"),
            None => base,
        }
    }
}

impl std::fmt::Display for UiTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.describe())
    }
}
