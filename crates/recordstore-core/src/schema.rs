//! Versioned schema definitions.
//!
//! A [`Namespace`] groups [`TypeSpec`]s; each type declares the nodes its
//! containers map to (attributes, datasets, child groups, collections of
//! child groups and soft links) and optionally extends one parent type. The
//! [`NamespaceCatalog`] resolves inheritance chains and compares catalogs,
//! and the [`TypeMap`] pairs a catalog with container constructors.
//!
//! Schema definitions serialize to JSON; that form is what the store's
//! schema cache holds.
pub mod catalog;
mod core_namespace;
pub mod type_map;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::builder::{DType, Value};

pub use catalog::NamespaceCatalog;
pub use core_namespace::{CORE_NAMESPACE, CORE_VERSION, core_namespace};
pub use type_map::TypeMap;

/// Errors raised while building or querying a schema catalog.
#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SchemaError {
    /// No namespace in the catalog declares this type.
    #[snafu(display("unknown type {type_name:?}"))]
    UnknownType {
        /// Requested type name.
        type_name: String,
    },

    /// The catalog has no namespace with this name.
    #[snafu(display("unknown namespace {name:?}"))]
    UnknownNamespace {
        /// Requested namespace.
        name: String,
    },

    /// Following `extends` from this type loops back onto itself.
    #[snafu(display("inheritance cycle through type {type_name:?}"))]
    InheritanceCycle {
        /// A type on the cycle.
        type_name: String,
    },

    /// Two namespaces declare the same type name.
    #[snafu(display("type {type_name:?} is declared by both {first:?} and {second:?}"))]
    DuplicateType {
        /// Conflicting type.
        type_name: String,
        /// Namespace already declaring it.
        first: String,
        /// Namespace being added.
        second: String,
    },

    /// Neither the type nor any ancestor has a registered constructor.
    #[snafu(display("no constructor registered for type {type_name:?} or its ancestors"))]
    NoConstructor {
        /// Requested type.
        type_name: String,
    },

    /// Two catalogs disagree on a namespace.
    #[snafu(display("schema mismatch in namespace {namespace:?}: {detail}"))]
    SchemaMismatch {
        /// Namespace that differs.
        namespace: String,
        /// First difference found.
        detail: String,
    },
}

/// Result alias for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// A named, versioned collection of type specifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Namespace {
    /// Short name, unique within a catalog.
    pub name: String,
    /// Human-readable name.
    #[serde(default)]
    pub full_name: String,
    /// Schema version.
    pub version: String,
    /// Description.
    #[serde(default)]
    pub doc: String,
    /// Authors.
    #[serde(default)]
    pub author: Vec<String>,
    /// Contact addresses, parallel to `author`.
    #[serde(default)]
    pub contact: Vec<String>,
    /// Types declared by this namespace, keyed by type name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub types: BTreeMap<String, TypeSpec>,
}

impl Namespace {
    /// Empty namespace.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            full_name: String::new(),
            version: version.into(),
            doc: String::new(),
            author: Vec::new(),
            contact: Vec::new(),
            types: BTreeMap::new(),
        }
    }

    /// Add (or replace) a type.
    pub fn with_type(mut self, spec: TypeSpec) -> Self {
        self.types.insert(spec.type_name.clone(), spec);
        self
    }

    /// Type declared in this namespace.
    pub fn type_spec(&self, type_name: &str) -> Option<&TypeSpec> {
        self.types.get(type_name)
    }

    /// Copy of the namespace metadata without its types.
    pub fn header(&self) -> Namespace {
        Namespace {
            types: BTreeMap::new(),
            ..self.clone()
        }
    }
}

/// How a type's group is laid out beyond its declared fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeLayout {
    /// Only the declared fields.
    Group,
    /// Declared fields plus the columns of a dynamic table.
    Table,
}

/// Field layout and parent type of one schema type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeSpec {
    /// Type name.
    pub type_name: String,
    /// Parent type, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,
    /// Description.
    #[serde(default)]
    pub doc: String,
    /// Layout; inherited from the parent when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<TypeLayout>,
    /// Fields declared (or overridden) by this type.
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

impl TypeSpec {
    /// Type with no fields and no parent.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            extends: None,
            doc: String::new(),
            layout: None,
            fields: Vec::new(),
        }
    }

    /// Set the parent type.
    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.extends = Some(parent.into());
        self
    }

    /// Set the description.
    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = doc.into();
        self
    }

    /// Set the layout.
    pub fn layout(mut self, layout: TypeLayout) -> Self {
        self.layout = Some(layout);
        self
    }

    /// Append a field.
    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }
}

/// Node kind a field maps to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    /// An attribute on the container's group.
    Attribute {
        /// Declared element type.
        dtype: DType,
        /// Fixed value written regardless of the container.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Value>,
    },
    /// A dataset, with its own attributes.
    Dataset {
        /// Declared element type.
        dtype: DType,
        /// Declared dimensions; `None` entries are unconstrained, an empty
        /// list means scalar, an absent shape means any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        shape: Option<Vec<Option<usize>>>,
        /// Attributes of the dataset.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        attributes: Vec<FieldSpec>,
    },
    /// One owned child container.
    Group {
        /// Required type (or an ancestor of it), if constrained.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        type_name: Option<String>,
    },
    /// A group holding any number of owned child containers by name.
    Groups {
        /// Required type of every child, if constrained.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        type_name: Option<String>,
    },
    /// A soft link to a container stored elsewhere.
    Link {
        /// Required type of the target.
        target_type: String,
    },
}

/// One schema field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Node name, possibly a relative path such as `general/electrodes`.
    pub name: String,
    /// Description.
    #[serde(default)]
    pub doc: String,
    /// Whether a value must be present after defaults are applied.
    #[serde(default)]
    pub required: bool,
    /// Value used when the container does not provide one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Container field name when it differs from the node's leaf name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Node kind.
    #[serde(flatten)]
    pub kind: FieldKind,
}

impl FieldSpec {
    fn with_kind(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            doc: String::new(),
            required: false,
            default: None,
            field: None,
            kind,
        }
    }

    /// Attribute field.
    pub fn attribute(name: impl Into<String>, dtype: DType) -> Self {
        Self::with_kind(name, FieldKind::Attribute { dtype, value: None })
    }

    /// Dataset field with no shape constraint.
    pub fn dataset(name: impl Into<String>, dtype: DType) -> Self {
        Self::with_kind(
            name,
            FieldKind::Dataset {
                dtype,
                shape: None,
                attributes: Vec::new(),
            },
        )
    }

    /// Single child group field.
    pub fn group(name: impl Into<String>, type_name: Option<&str>) -> Self {
        Self::with_kind(
            name,
            FieldKind::Group {
                type_name: type_name.map(str::to_string),
            },
        )
    }

    /// Collection group field.
    pub fn groups(name: impl Into<String>, type_name: Option<&str>) -> Self {
        Self::with_kind(
            name,
            FieldKind::Groups {
                type_name: type_name.map(str::to_string),
            },
        )
    }

    /// Soft link field.
    pub fn link(name: impl Into<String>, target_type: impl Into<String>) -> Self {
        Self::with_kind(
            name,
            FieldKind::Link {
                target_type: target_type.into(),
            },
        )
    }

    /// Set the description.
    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = doc.into();
        self
    }

    /// Mark the field required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Set the default value.
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Map to a differently named container field.
    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Fix the value of an attribute field.
    pub fn fixed(mut self, value: impl Into<Value>) -> Self {
        if let FieldKind::Attribute { value: v, .. } = &mut self.kind {
            *v = Some(value.into());
        }
        self
    }

    /// Constrain the shape of a dataset field.
    pub fn shape(mut self, dims: Vec<Option<usize>>) -> Self {
        if let FieldKind::Dataset { shape, .. } = &mut self.kind {
            *shape = Some(dims);
        }
        self
    }

    /// Add an attribute to a dataset field.
    pub fn with_attribute(mut self, attr: FieldSpec) -> Self {
        if let FieldKind::Dataset { attributes, .. } = &mut self.kind {
            attributes.push(attr);
        }
        self
    }

    /// Name of the container field this node maps to.
    pub fn container_field(&self) -> &str {
        match &self.field {
            Some(f) => f,
            None => self.name.rsplit('/').next().unwrap_or(&self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_spec_json_roundtrip() {
        let spec = FieldSpec::dataset("data", DType::Float)
            .shape(vec![None, Some(2)])
            .required()
            .with_attribute(FieldSpec::attribute("conversion", DType::Float).default_value(1.0))
            .with_attribute(FieldSpec::attribute("unit", DType::Text).fixed("seconds"));
        let json = serde_json::to_string(&spec).unwrap();
        let back: FieldSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(spec, back);
    }

    #[test]
    fn container_field_defaults_to_leaf_name() {
        let f = FieldSpec::group("general/electrodes", Some("DynamicTable"));
        assert_eq!(f.container_field(), "electrodes");
        assert_eq!(f.clone().field("sites").container_field(), "sites");
    }
}
