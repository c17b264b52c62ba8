//! Namespace catalog: type lookup, inheritance resolution and comparison.

use std::collections::{BTreeMap, HashSet};

use snafu::prelude::*;

use super::{
    DuplicateTypeSnafu, FieldSpec, InheritanceCycleSnafu, Namespace, SchemaMismatchSnafu,
    SchemaResult, TypeLayout, TypeSpec, UnknownNamespaceSnafu, UnknownTypeSnafu,
};

/// The versioned collection of namespaces active for a store.
///
/// Built once when a store is opened and read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NamespaceCatalog {
    namespaces: BTreeMap<String, Namespace>,
}

impl NamespaceCatalog {
    /// Empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a namespace, replacing one with the same name.
    ///
    /// # Errors
    ///
    /// [`super::SchemaError::DuplicateType`] if another namespace already
    /// declares one of its types.
    pub fn add_namespace(&mut self, namespace: Namespace) -> SchemaResult<()> {
        for type_name in namespace.types.keys() {
            match self.namespace_of(type_name) {
                Some(owner) if owner != namespace.name => {
                    return DuplicateTypeSnafu {
                        type_name,
                        first: owner,
                        second: &namespace.name,
                    }
                    .fail();
                }
                _ => {}
            }
        }
        self.namespaces.insert(namespace.name.clone(), namespace);
        Ok(())
    }

    /// Namespace by name.
    pub fn namespace(&self, name: &str) -> SchemaResult<&Namespace> {
        self.namespaces
            .get(name)
            .context(UnknownNamespaceSnafu { name })
    }

    /// All namespaces in name order.
    pub fn namespaces(&self) -> impl Iterator<Item = &Namespace> {
        self.namespaces.values()
    }

    /// Name of the namespace declaring `type_name`.
    pub fn namespace_of(&self, type_name: &str) -> Option<&str> {
        self.namespaces
            .values()
            .find(|ns| ns.types.contains_key(type_name))
            .map(|ns| ns.name.as_str())
    }

    /// Specification of `type_name`.
    pub fn type_spec(&self, type_name: &str) -> SchemaResult<&TypeSpec> {
        self.namespaces
            .values()
            .find_map(|ns| ns.types.get(type_name))
            .context(UnknownTypeSnafu { type_name })
    }

    /// The inheritance chain of `type_name`, most derived first.
    pub fn ancestry(&self, type_name: &str) -> SchemaResult<Vec<&TypeSpec>> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut current = Some(type_name);
        while let Some(name) = current {
            ensure!(
                seen.insert(name),
                InheritanceCycleSnafu { type_name: name }
            );
            let spec = self.type_spec(name)?;
            chain.push(spec);
            current = spec.extends.as_deref();
        }
        Ok(chain)
    }

    /// All fields of `type_name`, base type first.
    ///
    /// A field redeclared by a subtype replaces the inherited one in place,
    /// so field order stays stable along the chain.
    pub fn resolve_fields(&self, type_name: &str) -> SchemaResult<Vec<FieldSpec>> {
        let mut fields: Vec<FieldSpec> = Vec::new();
        for spec in self.ancestry(type_name)?.into_iter().rev() {
            for field in &spec.fields {
                match fields.iter_mut().find(|f| f.name == field.name) {
                    Some(existing) => *existing = field.clone(),
                    None => fields.push(field.clone()),
                }
            }
        }
        Ok(fields)
    }

    /// Effective layout of `type_name` (the nearest declared one).
    pub fn layout(&self, type_name: &str) -> SchemaResult<TypeLayout> {
        Ok(self
            .ancestry(type_name)?
            .into_iter()
            .find_map(|spec| spec.layout)
            .unwrap_or(TypeLayout::Group))
    }

    /// Whether `type_name` is `ancestor` or derives from it.
    pub fn is_a(&self, type_name: &str, ancestor: &str) -> bool {
        self.ancestry(type_name)
            .map(|chain| chain.iter().any(|spec| spec.type_name == ancestor))
            .unwrap_or(false)
    }

    /// Check that `other` reproduces every namespace of this catalog.
    ///
    /// # Errors
    ///
    /// [`super::SchemaError::SchemaMismatch`] naming the first difference.
    pub fn ensure_matches(&self, other: &NamespaceCatalog) -> SchemaResult<()> {
        for ns in self.namespaces() {
            let mismatch = |detail: String| {
                SchemaMismatchSnafu {
                    namespace: &ns.name,
                    detail,
                }
                .fail()
            };
            let Some(theirs) = other.namespaces.get(&ns.name) else {
                return mismatch("namespace is missing".to_string());
            };
            if ns.header() != theirs.header() {
                return mismatch(format!(
                    "metadata differs (version {:?} vs {:?})",
                    ns.version, theirs.version
                ));
            }
            for (name, spec) in &ns.types {
                match theirs.types.get(name) {
                    None => return mismatch(format!("type {name:?} is missing")),
                    Some(t) if t != spec => {
                        return mismatch(format!("type {name:?} differs"));
                    }
                    Some(_) => {}
                }
            }
            if let Some(extra) = theirs.types.keys().find(|k| !ns.types.contains_key(*k)) {
                return mismatch(format!("unexpected type {extra:?}"));
            }
        }
        Ok(())
    }

    /// Catalog restricted to the named namespaces.
    pub fn subset<S: AsRef<str>>(&self, names: &[S]) -> SchemaResult<NamespaceCatalog> {
        let mut out = NamespaceCatalog::new();
        for name in names {
            out.add_namespace(self.namespace(name.as_ref())?.clone())?;
        }
        Ok(out)
    }
}

impl From<Namespace> for NamespaceCatalog {
    fn from(namespace: Namespace) -> Self {
        let mut namespaces = BTreeMap::new();
        namespaces.insert(namespace.name.clone(), namespace);
        Self { namespaces }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::DType;
    use crate::schema::SchemaError;

    fn catalog() -> NamespaceCatalog {
        let ns = Namespace::new("test", "0.1.0")
            .with_type(
                TypeSpec::new("Base")
                    .field(FieldSpec::attribute("description", DType::Text).default_value("none"))
                    .field(FieldSpec::dataset("data", DType::Any).required()),
            )
            .with_type(
                TypeSpec::new("Derived")
                    .extends("Base")
                    .layout(TypeLayout::Table)
                    .field(FieldSpec::dataset("data", DType::Text).required())
                    .field(FieldSpec::dataset("extra", DType::Int)),
            )
            .with_type(TypeSpec::new("Leaf").extends("Derived"));
        let mut c = NamespaceCatalog::new();
        c.add_namespace(ns).unwrap();
        c
    }

    #[test]
    fn resolve_fields_walks_base_first_with_overrides() {
        let c = catalog();
        let fields = c.resolve_fields("Leaf").unwrap();
        let names: Vec<_> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["description", "data", "extra"]);
        assert!(matches!(
            fields[1].kind,
            crate::schema::FieldKind::Dataset { dtype: DType::Text, .. }
        ));
        assert_eq!(c.layout("Leaf").unwrap(), TypeLayout::Table);
        assert_eq!(c.layout("Base").unwrap(), TypeLayout::Group);
        assert!(c.is_a("Leaf", "Base"));
        assert!(!c.is_a("Base", "Leaf"));
    }

    #[test]
    fn cycles_and_unknown_types_are_reported() {
        let mut c = NamespaceCatalog::new();
        c.add_namespace(
            Namespace::new("loop", "1")
                .with_type(TypeSpec::new("A").extends("B"))
                .with_type(TypeSpec::new("B").extends("A")),
        )
        .unwrap();
        assert!(matches!(
            c.resolve_fields("A"),
            Err(SchemaError::InheritanceCycle { .. })
        ));
        assert!(matches!(
            c.type_spec("Nope"),
            Err(SchemaError::UnknownType { .. })
        ));
    }

    #[test]
    fn duplicate_types_across_namespaces_are_rejected() {
        let mut c = catalog();
        let err = c
            .add_namespace(Namespace::new("other", "1").with_type(TypeSpec::new("Base")))
            .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateType { .. }));
    }

    #[test]
    fn ensure_matches_reports_differences() {
        let c = catalog();
        c.ensure_matches(&c.clone()).unwrap();

        let mut changed = NamespaceCatalog::new();
        let mut ns = c.namespace("test").unwrap().clone();
        ns.types.remove("Leaf");
        changed.add_namespace(ns).unwrap();
        assert!(matches!(
            c.ensure_matches(&changed),
            Err(SchemaError::SchemaMismatch { .. })
        ));
    }
}
