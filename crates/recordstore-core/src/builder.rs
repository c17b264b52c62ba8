//! Generic, schema-agnostic intermediate tree.
//!
//! Every typed container is converted to a [`GroupBuilder`] subtree before it
//! reaches the backend, and every read starts from one. Builders are built
//! fresh per write and discarded after a read is mapped, so they carry no
//! back-pointers: a group owns its child groups, datasets, attributes and
//! soft links by name.
//!
//! ```text
//! root                      (attributes: type = "RecordFile")
//! ├── acquisition/          group
//! │   └── raw/              group (type = "TimeSeries")
//! │       ├── data          dataset (attributes: unit, conversion, resolution)
//! │       └── timestamps    dataset
//! ├── identifier            dataset (scalar text)
//! └── specifications/       reserved schema cache
//! ```
pub mod values;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::storage::layout::TYPE_ATTR;
pub use values::{BufferView, DType, DataBuffer, NdArray, Value, ValueError};

/// A named n-dimensional dataset plus its attributes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatasetBuilder {
    name: String,
    array: NdArray,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    attributes: BTreeMap<String, Value>,
}

impl DatasetBuilder {
    /// Create a dataset node.
    pub fn new(name: impl Into<String>, array: NdArray) -> Self {
        Self {
            name: name.into(),
            array,
            attributes: BTreeMap::new(),
        }
    }

    /// Builder-style attribute setter.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_attribute(name, value);
        self
    }

    /// Node name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Payload.
    pub fn array(&self) -> &NdArray {
        &self.array
    }

    /// Consume the node and return its payload.
    pub fn into_array(self) -> NdArray {
        self.array
    }

    /// Attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// All attributes.
    pub fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }

    /// Set (or replace) an attribute.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(name.into(), value.into());
    }
}

/// A named group: child groups, datasets, soft links and attributes.
///
/// Child names are unique across groups, datasets and links within one
/// parent; inserting a node of any kind evicts a same-named node of the other
/// kinds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(try_from = "RawGroupBuilder")]
pub struct GroupBuilder {
    name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    attributes: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    groups: BTreeMap<String, GroupBuilder>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    datasets: BTreeMap<String, DatasetBuilder>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    links: BTreeMap<String, String>,
}

/// A loaded tree that breaks the naming rules of [`GroupBuilder`].
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TreeError {
    /// A child is filed under a key other than its own name.
    #[snafu(display("group {group:?}: child filed as {key:?} is named {name:?}"))]
    KeyMismatch {
        /// Parent group name.
        group: String,
        /// Key the child is stored under.
        key: String,
        /// Name recorded in the child.
        name: String,
    },

    /// Two children of different kinds share a name.
    #[snafu(display("group {group:?}: {name:?} is used by more than one child"))]
    SharedName {
        /// Parent group name.
        group: String,
        /// The shared name.
        name: String,
    },
}

#[derive(Deserialize)]
struct RawGroupBuilder {
    name: String,
    #[serde(default)]
    attributes: BTreeMap<String, Value>,
    #[serde(default)]
    groups: BTreeMap<String, GroupBuilder>,
    #[serde(default)]
    datasets: BTreeMap<String, DatasetBuilder>,
    #[serde(default)]
    links: BTreeMap<String, String>,
}

impl TryFrom<RawGroupBuilder> for GroupBuilder {
    type Error = TreeError;

    fn try_from(raw: RawGroupBuilder) -> Result<Self, Self::Error> {
        let keyed = raw
            .groups
            .iter()
            .map(|(k, g)| (k, g.name()))
            .chain(raw.datasets.iter().map(|(k, d)| (k, d.name())));
        for (key, name) in keyed {
            ensure!(
                key == name,
                KeyMismatchSnafu {
                    group: raw.name.clone(),
                    key: key.clone(),
                    name,
                }
            );
        }
        let shared = raw
            .datasets
            .keys()
            .chain(raw.links.keys())
            .find(|k| raw.groups.contains_key(*k))
            .or_else(|| raw.links.keys().find(|k| raw.datasets.contains_key(*k)));
        if let Some(name) = shared {
            return SharedNameSnafu {
                group: raw.name.clone(),
                name: name.clone(),
            }
            .fail();
        }
        Ok(Self {
            name: raw.name,
            attributes: raw.attributes,
            groups: raw.groups,
            datasets: raw.datasets,
            links: raw.links,
        })
    }
}

impl GroupBuilder {
    /// Create an empty group.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Node name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename this node (the parent key is updated by the insert call).
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// The recorded schema type, if this group represents a typed container.
    pub fn type_name(&self) -> Option<&str> {
        self.attribute(TYPE_ATTR).and_then(Value::as_text)
    }

    /// Attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// All attributes.
    pub fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }

    /// Set (or replace) an attribute.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(name.into(), value.into());
    }

    /// Child group by name.
    pub fn group(&self, name: &str) -> Option<&GroupBuilder> {
        self.groups.get(name)
    }

    /// Mutable child group by name.
    pub fn group_mut(&mut self, name: &str) -> Option<&mut GroupBuilder> {
        self.groups.get_mut(name)
    }

    /// Iterate child groups in name order.
    pub fn groups(&self) -> impl Iterator<Item = &GroupBuilder> {
        self.groups.values()
    }

    /// Child dataset by name.
    pub fn dataset(&self, name: &str) -> Option<&DatasetBuilder> {
        self.datasets.get(name)
    }

    /// Iterate datasets in name order.
    pub fn datasets(&self) -> impl Iterator<Item = &DatasetBuilder> {
        self.datasets.values()
    }

    /// Soft link target by name.
    pub fn link(&self, name: &str) -> Option<&str> {
        self.links.get(name).map(String::as_str)
    }

    /// Iterate soft links as `(name, target)` pairs.
    pub fn links(&self) -> impl Iterator<Item = (&str, &str)> {
        self.links.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Whether a child node of any kind carries `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.groups.contains_key(name)
            || self.datasets.contains_key(name)
            || self.links.contains_key(name)
    }

    /// Whether the group has no children and no attributes.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
            && self.datasets.is_empty()
            && self.links.is_empty()
            && self.attributes.is_empty()
    }

    /// Remove a child node of any kind; returns whether something was removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let g = self.groups.remove(name).is_some();
        let d = self.datasets.remove(name).is_some();
        let l = self.links.remove(name).is_some();
        g || d || l
    }

    /// Insert a child group, replacing any node of the same name.
    pub fn set_group(&mut self, group: GroupBuilder) {
        self.remove(&group.name);
        self.groups.insert(group.name.clone(), group);
    }

    /// Insert a dataset, replacing any node of the same name.
    pub fn set_dataset(&mut self, dataset: DatasetBuilder) {
        self.remove(&dataset.name);
        self.datasets.insert(dataset.name.clone(), dataset);
    }

    /// Insert a soft link to an absolute path, replacing any node of the same name.
    pub fn set_link(&mut self, name: impl Into<String>, target: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.links.insert(name, target.into());
    }

    /// Child group, created empty if missing (a same-named dataset or link is evicted).
    pub fn group_or_create(&mut self, name: &str) -> &mut GroupBuilder {
        if !self.groups.contains_key(name) {
            self.set_group(GroupBuilder::new(name));
        }
        self.groups
            .entry(name.to_string())
            .or_insert_with(|| GroupBuilder::new(name))
    }

    /// Group at a `/`-separated path relative to this group.
    ///
    /// A leading `/` is ignored, so absolute store paths resolve from the root.
    pub fn group_at(&self, path: &str) -> Option<&GroupBuilder> {
        split_path(path).try_fold(self, |g, seg| g.group(seg))
    }

    /// Group at a relative path, creating missing intermediate groups.
    pub fn group_at_or_create(&mut self, path: &str) -> &mut GroupBuilder {
        split_path(path).fold(self, |g, seg| g.group_or_create(seg))
    }

    /// Dataset at a `/`-separated path relative to this group.
    pub fn dataset_at(&self, path: &str) -> Option<&DatasetBuilder> {
        let (parent, leaf) = split_parent(path);
        self.group_at(parent)?.dataset(leaf)
    }

    /// Merge `other` into this group with append semantics.
    ///
    /// - Attributes, datasets and links from `other` replace same-named ones.
    /// - Child groups that carry a type attribute are objects and replace the
    ///   existing node wholesale.
    /// - Untyped (structural) child groups are merged recursively, so
    ///   unrelated siblings already present are left untouched.
    pub fn merge_from(&mut self, other: GroupBuilder) {
        let GroupBuilder {
            attributes,
            groups,
            datasets,
            links,
            ..
        } = other;

        self.attributes.extend(attributes);
        for (_, dataset) in datasets {
            self.set_dataset(dataset);
        }
        for (name, target) in links {
            self.set_link(name, target);
        }
        for (name, group) in groups {
            let structural = group.type_name().is_none();
            match self.groups.get_mut(&name) {
                Some(existing) if structural && existing.type_name().is_none() => {
                    existing.merge_from(group);
                }
                _ => self.set_group(group),
            }
        }
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Split `a/b/c` into (`a/b`, `c`).
pub(crate) fn split_parent(path: &str) -> (&str, &str) {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rsplit_once('/') {
        Some((parent, leaf)) => (parent, leaf),
        None => ("", trimmed),
    }
}

/// Join a parent path and a child name into an absolute path.
pub(crate) fn join_path(parent: &str, child: &str) -> String {
    let parent = parent.trim_end_matches('/');
    let child = child.trim_start_matches('/');
    if parent.is_empty() {
        format!("/{child}")
    } else {
        format!("{parent}/{child}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typed(name: &str, ty: &str) -> GroupBuilder {
        let mut g = GroupBuilder::new(name);
        g.set_attribute(TYPE_ATTR, ty);
        g
    }

    #[test]
    fn names_are_unique_across_node_kinds() {
        let mut g = GroupBuilder::new("root");
        g.set_dataset(DatasetBuilder::new("x", NdArray::from_ints(vec![1])));
        g.set_group(GroupBuilder::new("x"));
        assert!(g.dataset("x").is_none());
        assert!(g.group("x").is_some());

        g.set_link("x", "/elsewhere");
        assert!(g.group("x").is_none());
        assert_eq!(g.link("x"), Some("/elsewhere"));
    }

    #[test]
    fn paths_create_and_resolve() {
        let mut root = GroupBuilder::new("root");
        root.group_at_or_create("stimulus/presentation")
            .set_dataset(DatasetBuilder::new("d", NdArray::scalar_float(1.0)));

        assert!(root.group_at("/stimulus/presentation").is_some());
        assert!(root.dataset_at("stimulus/presentation/d").is_some());
        assert!(root.group_at("stimulus/templates").is_none());
        assert_eq!(split_parent("a/b/c"), ("a/b", "c"));
        assert_eq!(split_parent("c"), ("", "c"));
        assert_eq!(join_path("", "general"), "/general");
        assert_eq!(join_path("/general", "electrodes"), "/general/electrodes");
    }

    #[test]
    fn merge_keeps_siblings_and_replaces_objects() {
        let mut existing = GroupBuilder::new("root");
        let acq = existing.group_at_or_create("acquisition");
        let mut a = typed("a", "TimeSeries");
        a.set_dataset(DatasetBuilder::new("data", NdArray::from_ints(vec![1, 2])));
        acq.set_group(a);

        let mut incoming = GroupBuilder::new("root");
        let acq = incoming.group_at_or_create("acquisition");
        acq.set_group(typed("b", "TimeSeries"));
        existing.merge_from(incoming);

        let acq = existing.group("acquisition").unwrap();
        assert!(acq.group("a").unwrap().dataset("data").is_some());
        assert!(acq.group("b").is_some());

        let mut replace = GroupBuilder::new("root");
        replace
            .group_at_or_create("acquisition")
            .set_group(typed("a", "TimeSeries"));
        existing.merge_from(replace);
        let a = existing.group_at("acquisition/a").unwrap();
        assert!(a.dataset("data").is_none());
        assert!(existing.group_at("acquisition/b").is_some());
    }

    #[test]
    fn json_roundtrip_preserves_tree() {
        let mut root = typed("root", "RecordFile");
        root.set_dataset(
            DatasetBuilder::new("identifier", NdArray::scalar_text("TEST123"))
                .with_attribute("doc", "id"),
        );
        root.group_at_or_create("general");
        let json = serde_json::to_string(&root).unwrap();
        let back: GroupBuilder = serde_json::from_str(&json).unwrap();
        assert_eq!(root, back);
    }

    #[test]
    fn loading_rejects_misfiled_and_shared_names() {
        let misfiled = serde_json::json!({
            "name": "root",
            "groups": { "acquisition": { "name": "analysis" } },
        });
        let err = serde_json::from_value::<GroupBuilder>(misfiled).unwrap_err();
        assert!(err.to_string().contains("\"analysis\""), "{err}");

        let shared = serde_json::json!({
            "name": "root",
            "groups": { "x": { "name": "x" } },
            "links": { "x": "/general" },
        });
        let err = serde_json::from_value::<GroupBuilder>(shared).unwrap_err();
        assert!(err.to_string().contains("more than one child"), "{err}");
    }
}
