//! Workload label sets and label selectors

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single label set (ordered for stable output)
pub type Labels = BTreeMap<String, String>;

/// Returns true if every label in `selector` is present with the same value in `labels`
#[must_use]
pub fn is_subset_of(selector: &Labels, labels: &Labels) -> bool {
    selector
        .iter()
        .all(|(k, v)| labels.get(k).is_some_and(|have| have == v))
}

/// A collection of label sets
///
/// Used both as a selector ("match any of these sets") and as the result of
/// workload label lookups.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelsCollection(pub Vec<Labels>);

impl LabelsCollection {
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn push(&mut self, labels: Labels) {
        self.0.push(labels);
    }

    pub fn extend(&mut self, other: Self) {
        self.0.extend(other.0);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Labels> {
        self.0.iter()
    }

    /// True if any set in the collection is a subset of `labels`.
    /// An empty collection matches everything.
    #[must_use]
    pub fn has_subset_of(&self, labels: &Labels) -> bool {
        self.0.is_empty() || self.0.iter().any(|sel| is_subset_of(sel, labels))
    }
}

impl From<Labels> for LabelsCollection {
    fn from(labels: Labels) -> Self {
        Self(vec![labels])
    }
}

impl FromIterator<Labels> for LabelsCollection {
    fn from_iter<T: IntoIterator<Item = Labels>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
