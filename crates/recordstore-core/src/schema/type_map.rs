//! Pairs a namespace catalog with container constructors.

use std::collections::HashMap;

use snafu::prelude::*;

use crate::{
    container::Constructor,
    containers::core_constructors,
};

use super::{
    Namespace, NamespaceCatalog, NoConstructorSnafu, SchemaResult, core_namespace,
};

/// Type name to field layout (through the catalog) and to constructor.
///
/// Built once per open store and read-only while mapping.
#[derive(Debug, Clone)]
pub struct TypeMap {
    catalog: NamespaceCatalog,
    constructors: HashMap<String, Constructor>,
}

impl TypeMap {
    /// Map over `catalog` with no constructors registered.
    pub fn new(catalog: NamespaceCatalog) -> Self {
        Self {
            catalog,
            constructors: HashMap::new(),
        }
    }

    /// The built-in `core` namespace with every built-in constructor.
    pub fn core() -> Self {
        let mut map = Self::new(NamespaceCatalog::from(core_namespace()));
        for (type_name, ctor) in core_constructors() {
            map.constructors.insert(type_name.to_string(), ctor);
        }
        map
    }

    /// The active catalog.
    pub fn catalog(&self) -> &NamespaceCatalog {
        &self.catalog
    }

    /// Add an extension namespace.
    pub fn add_namespace(&mut self, namespace: Namespace) -> SchemaResult<()> {
        self.catalog.add_namespace(namespace)
    }

    /// Register the constructor of a declared type.
    ///
    /// # Errors
    ///
    /// [`super::SchemaError::UnknownType`] if no namespace declares `type_name`.
    pub fn register(&mut self, type_name: &str, ctor: Constructor) -> SchemaResult<()> {
        self.catalog.type_spec(type_name)?;
        self.constructors.insert(type_name.to_string(), ctor);
        Ok(())
    }

    /// Constructor for `type_name`, falling back to its nearest ancestor with one.
    pub fn constructor(&self, type_name: &str) -> SchemaResult<Constructor> {
        for spec in self.catalog.ancestry(type_name)? {
            if let Some(ctor) = self.constructors.get(&spec.type_name) {
                if spec.type_name != type_name {
                    log::warn!(
                        "no constructor for {type_name}; reading it as {}",
                        spec.type_name
                    );
                }
                return Ok(*ctor);
            }
        }
        NoConstructorSnafu { type_name }.fail()
    }
}

impl Default for TypeMap {
    fn default() -> Self {
        Self::core()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{SchemaError, TypeSpec};

    #[test]
    fn subtypes_without_constructor_fall_back_to_ancestor() {
        let mut map = TypeMap::core();
        map.add_namespace(
            Namespace::new("lab", "0.1.0")
                .with_type(TypeSpec::new("LickSeries").extends("TimeSeries"))
                .with_type(TypeSpec::new("Orphan")),
        )
        .unwrap();

        assert!(map.constructor("LickSeries").is_ok());
        assert!(matches!(
            map.constructor("Orphan"),
            Err(SchemaError::NoConstructor { .. })
        ));
        assert!(matches!(
            map.register("Missing", crate::containers::TimeSeries::read),
            Err(SchemaError::UnknownType { .. })
        ));
    }
}
