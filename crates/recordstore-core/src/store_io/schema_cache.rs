//! The `specifications` subtree: one JSON text blob per namespace header and
//! per type, under `specifications/<namespace>/<version>/`.

use std::cmp::Ordering;

use snafu::prelude::*;

use crate::{
    builder::{DatasetBuilder, GroupBuilder, NdArray},
    schema::{Namespace, NamespaceCatalog, TypeSpec, UnknownNamespaceSnafu},
    storage::layout::{NAMESPACE_BLOB, SPECIFICATIONS, cache_path},
};

use super::{DecodeSnafu, EncodeSnafu, SchemaSnafu, StoreResult};

/// Write every namespace of `catalog` under `root`, replacing any cached
/// copy of the same namespace version.
pub(super) fn write(root: &mut GroupBuilder, catalog: &NamespaceCatalog) -> StoreResult<usize> {
    let mut blobs = 0;
    for ns in catalog.namespaces() {
        let mut version = GroupBuilder::new(ns.version.as_str());
        let header = serde_json::to_string(&ns.header()).context(EncodeSnafu)?;
        version.set_dataset(DatasetBuilder::new(
            NAMESPACE_BLOB,
            NdArray::scalar_text(header),
        ));
        for (name, spec) in &ns.types {
            let json = serde_json::to_string(spec).context(EncodeSnafu)?;
            version.set_dataset(DatasetBuilder::new(name.as_str(), NdArray::scalar_text(json)));
        }
        blobs += ns.types.len() + 1;
        *root.group_at_or_create(&cache_path(&ns.name, &ns.version)) = version;
    }
    Ok(blobs)
}

/// Rebuild the named namespaces from the cache, taking the highest cached
/// version of each.
pub(super) fn read<S: AsRef<str>>(
    root: &GroupBuilder,
    names: &[S],
    location: &str,
) -> StoreResult<NamespaceCatalog> {
    let mut catalog = NamespaceCatalog::new();
    for name in names {
        let name = name.as_ref();
        let version = root
            .group_at(&format!("{SPECIFICATIONS}/{name}"))
            .and_then(|ns| ns.groups().max_by(|a, b| compare_versions(a.name(), b.name())))
            .context(UnknownNamespaceSnafu { name })
            .context(SchemaSnafu)?;

        let mut namespace: Namespace = parse(version, NAMESPACE_BLOB, location)?;
        for dataset in version.datasets().filter(|d| d.name() != NAMESPACE_BLOB) {
            let spec: TypeSpec = parse(version, dataset.name(), location)?;
            namespace = namespace.with_type(spec);
        }
        log::debug!(
            "loaded cached namespace {name} {} ({} types)",
            namespace.version,
            namespace.types.len()
        );
        catalog.add_namespace(namespace).context(SchemaSnafu)?;
    }
    Ok(catalog)
}

fn parse<T: serde::de::DeserializeOwned>(
    group: &GroupBuilder,
    dataset: &str,
    location: &str,
) -> StoreResult<T> {
    let text = group
        .dataset(dataset)
        .and_then(|d| d.array().scalar_value())
        .and_then(|v| v.as_text().map(str::to_string))
        .unwrap_or_default();
    serde_json::from_str(&text).context(DecodeSnafu { location })
}

/// Dotted numeric comparison, falling back to text order for other parts.
fn compare_versions(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let order = match (x.parse::<u64>(), y.parse::<u64>()) {
                    (Ok(x), Ok(y)) => x.cmp(&y),
                    _ => x.cmp(y),
                };
                if order != Ordering::Equal {
                    return order;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{TypeMap, core_namespace};

    #[test]
    fn versions_compare_numerically() {
        assert_eq!(compare_versions("2.10.0", "2.9.1"), Ordering::Greater);
        assert_eq!(compare_versions("1.0", "1.0.0"), Ordering::Less);
        assert_eq!(compare_versions("1.0.0", "1.0.0"), Ordering::Equal);
    }

    #[test]
    fn highest_cached_version_wins() {
        let mut root = GroupBuilder::new("root");
        let mut old = core_namespace();
        old.version = "1.0.0".to_string();
        write(&mut root, &NamespaceCatalog::from(old)).unwrap();
        let blobs = write(&mut root, TypeMap::core().catalog()).unwrap();
        assert_eq!(blobs, core_namespace().types.len() + 1);

        let loaded = read(&root, &["core"], "memory").unwrap();
        assert_eq!(loaded.namespace("core").unwrap().version, "2.0.0");
        loaded.ensure_matches(TypeMap::core().catalog()).unwrap();

        assert!(read(&root, &["lab"], "memory").is_err());
    }
}
