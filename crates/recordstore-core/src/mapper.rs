//! Schema-driven translation between typed containers and builder trees.
//!
//! The mapper never looks at concrete container types. Writing walks the
//! resolved fields of the container's type and asks the container for each
//! one by name; reading walks the same fields over a [`GroupBuilder`] and
//! hands the decoded values to the constructor registered for the type.
//!
//! Writes fail on the first problem. Reads keep going past broken fields so
//! that one call reports every problem in the tree as
//! [`MapError::Aggregate`].
mod table_codec;

use snafu::prelude::*;

use crate::{
    builder::{
        DType, DatasetBuilder, GroupBuilder, NdArray, Value, ValueError, join_path, split_parent,
    },
    container::{Container, Field, FieldReader, FieldRef, ValidationError},
    schema::{FieldKind, FieldSpec, NamespaceCatalog, SchemaError, TypeLayout, TypeMap},
    storage::layout::{ID_DATASET, NAMESPACE_ATTR, TYPE_ATTR},
    table::{CorruptIndexSnafu, DynamicTable, TableError, UnresolvedTableSnafu},
};

/// Errors raised while mapping containers to builder trees and back.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum MapError {
    /// The schema catalog could not resolve a type.
    #[snafu(display("schema error: {source}"))]
    Schema {
        /// Underlying catalog error.
        source: SchemaError,
    },

    /// A group has no type attribute and no type was expected.
    #[snafu(display("group {path} has no type attribute"))]
    MissingType {
        /// Path of the group.
        path: String,
    },

    /// A required field has no value and no default.
    #[snafu(display("{path}: required field {field:?} is missing"))]
    MissingField {
        /// Path of the owning group.
        path: String,
        /// Field name.
        field: String,
    },

    /// A container returned the wrong kind of value for a field.
    #[snafu(display("{path}: field {field:?} must be {expected}"))]
    FieldKind {
        /// Path of the owning group.
        path: String,
        /// Field name.
        field: String,
        /// Expected kind.
        expected: &'static str,
    },

    /// A value could not be converted to a dataset.
    #[snafu(display("{path}: field {field:?}: {source}"))]
    Value {
        /// Path of the owning group.
        path: String,
        /// Field name.
        field: String,
        /// Underlying conversion error.
        source: ValueError,
    },

    /// A value's element type does not satisfy the declared one.
    #[snafu(display("{path}: field {field:?} must hold {expected}, found {found}"))]
    Dtype {
        /// Path of the owning group.
        path: String,
        /// Field name.
        field: String,
        /// Declared element type.
        expected: DType,
        /// Element type found.
        found: DType,
    },

    /// A dataset's shape does not satisfy the declared one.
    #[snafu(display("{path}: field {field:?} must have shape {expected:?}, found {found:?}"))]
    Shape {
        /// Path of the owning group.
        path: String,
        /// Field name.
        field: String,
        /// Declared dimensions (`None` is unconstrained).
        expected: Vec<Option<usize>>,
        /// Actual shape.
        found: Vec<usize>,
    },

    /// A child or link target has a type outside the declared one.
    #[snafu(display("{path}: field {field:?} expects type {expected}, found {found}"))]
    TypeMismatch {
        /// Path of the owning group.
        path: String,
        /// Field name.
        field: String,
        /// Declared type.
        expected: String,
        /// Type found.
        found: String,
    },

    /// Table columns could not be encoded or decoded.
    #[snafu(display("table at {path}: {source}"))]
    Table {
        /// Path of the table group.
        path: String,
        /// Underlying table error.
        source: TableError,
    },

    /// The registered constructor rejected the decoded fields.
    #[snafu(display("{path}: {source}"))]
    Validation {
        /// Path of the group.
        path: String,
        /// Constructor failure.
        source: ValidationError,
    },

    /// A soft link points at a path that does not exist.
    #[snafu(display("{path}: link target {target} does not exist"))]
    DanglingLink {
        /// Path of the link.
        path: String,
        /// Target path.
        target: String,
    },

    /// Every problem found while reading a tree.
    #[snafu(display("{} problem(s) reading {path}: {}", problems.len(), join(problems)))]
    Aggregate {
        /// Path the read started from.
        path: String,
        /// Problems in tree order.
        problems: Vec<MapError>,
    },
}

fn join(problems: &[MapError]) -> String {
    problems
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl MapError {
    /// Non-aggregate errors, flattened in order.
    pub fn leaves(&self) -> Vec<&MapError> {
        match self {
            MapError::Aggregate { problems, .. } => {
                problems.iter().flat_map(MapError::leaves).collect()
            }
            other => vec![other],
        }
    }

    /// The first table error among the leaves.
    pub fn table_error(&self) -> Option<&TableError> {
        self.leaves().into_iter().find_map(|e| match e {
            MapError::Table { source, .. } => Some(source),
            _ => None,
        })
    }
}

/// Result alias for mapping operations.
pub type MapResult<T> = Result<T, MapError>;

/// Translates containers to and from builder trees using a [`TypeMap`].
#[derive(Debug, Clone, Copy)]
pub struct ObjectMapper<'a> {
    type_map: &'a TypeMap,
}

impl<'a> ObjectMapper<'a> {
    /// Mapper over `type_map`.
    pub fn new(type_map: &'a TypeMap) -> Self {
        Self { type_map }
    }

    fn catalog(&self) -> &'a NamespaceCatalog {
        self.type_map.catalog()
    }

    /// Encode `container` (and everything it owns) as a group.
    ///
    /// # Errors
    ///
    /// The first field that is missing, of the wrong kind, or violates its
    /// declared type or shape.
    pub fn to_builder(&self, container: &dyn Container) -> MapResult<GroupBuilder> {
        self.encode(container, "/")
    }

    fn encode(&self, c: &dyn Container, path: &str) -> MapResult<GroupBuilder> {
        let catalog = self.catalog();
        let type_name = c.type_name();
        let fields = catalog.resolve_fields(type_name).context(SchemaSnafu)?;

        let mut group = GroupBuilder::new(c.name());
        group.set_attribute(TYPE_ATTR, type_name);
        if let Some(ns) = catalog.namespace_of(type_name) {
            group.set_attribute(NAMESPACE_ATTR, ns);
        }
        if catalog.layout(type_name).context(SchemaSnafu)? == TypeLayout::Table {
            let table = c.as_table().context(FieldKindSnafu {
                path,
                field: ID_DATASET,
                expected: "a table",
            })?;
            table_codec::encode(table, &mut group);
        }
        for spec in &fields {
            self.encode_field(c, spec, &mut group, path)?;
        }
        Ok(group)
    }

    fn encode_field(
        &self,
        c: &dyn Container,
        spec: &FieldSpec,
        group: &mut GroupBuilder,
        path: &str,
    ) -> MapResult<()> {
        let (parent, leaf) = split_parent(&spec.name);
        let node_path = join_path(path, &spec.name);
        let value = c.field(spec.container_field());
        let missing = || -> MapResult<()> {
            MissingFieldSnafu {
                path,
                field: &spec.name,
            }
            .fail()
        };
        let wrong_kind = |expected: &'static str| -> MapResult<()> {
            FieldKindSnafu {
                path,
                field: &spec.name,
                expected,
            }
            .fail()
        };

        match &spec.kind {
            FieldKind::Attribute { .. } => {
                if let Some(v) = encode_attribute(c, spec, path)? {
                    group.group_at_or_create(parent).set_attribute(leaf, v);
                }
            }
            FieldKind::Dataset {
                dtype,
                shape,
                attributes,
            } => {
                let array = match (value, &spec.default) {
                    (Some(FieldRef::Dataset(a)), _) => a.into_owned(),
                    (Some(FieldRef::Attribute(v)), _) => {
                        NdArray::from_value(&v).context(ValueSnafu {
                            path,
                            field: &spec.name,
                        })?
                    }
                    (None, Some(v)) => NdArray::from_value(v).context(ValueSnafu {
                        path,
                        field: &spec.name,
                    })?,
                    (Some(_), _) => return wrong_kind("a dataset"),
                    (None, None) if spec.required => return missing(),
                    (None, None) => return Ok(()),
                };
                let array = check_array(*dtype, shape.as_deref(), array, path, &spec.name)?;
                let mut dataset = DatasetBuilder::new(leaf, array);
                for attr in attributes {
                    if let Some(v) = encode_attribute(c, attr, &node_path)? {
                        dataset.set_attribute(attr.name.as_str(), v);
                    }
                }
                group.group_at_or_create(parent).set_dataset(dataset);
            }
            FieldKind::Group { type_name } => match value {
                Some(FieldRef::Group(child)) => {
                    self.check_type(child.type_name(), type_name.as_deref(), path, &spec.name)?;
                    let mut encoded = self.encode(child, &node_path)?;
                    encoded.set_name(leaf);
                    group.group_at_or_create(parent).set_group(encoded);
                }
                None if spec.required => return missing(),
                None => {}
                Some(_) => return wrong_kind("a group"),
            },
            FieldKind::Groups { type_name } => {
                let children = match value {
                    Some(FieldRef::Groups(children)) => children,
                    Some(FieldRef::Group(child)) => vec![child],
                    None if spec.required => return missing(),
                    None => Vec::new(),
                    Some(_) => return wrong_kind("a collection of groups"),
                };
                let holder = group.group_at_or_create(&spec.name);
                for child in children {
                    self.check_type(child.type_name(), type_name.as_deref(), path, &spec.name)?;
                    let encoded = self.encode(child, &join_path(&node_path, child.name()))?;
                    holder.set_group(encoded);
                }
            }
            FieldKind::Link { .. } => match value {
                Some(FieldRef::Link(target)) => {
                    group.group_at_or_create(parent).set_link(leaf, target);
                }
                None if spec.required => return missing(),
                None => {}
                Some(_) => return wrong_kind("a link"),
            },
        }
        Ok(())
    }

    fn check_type(
        &self,
        found: &str,
        expected: Option<&str>,
        path: &str,
        field: &str,
    ) -> MapResult<()> {
        match expected {
            Some(expected) if !self.catalog().is_a(found, expected) => TypeMismatchSnafu {
                path,
                field,
                expected,
                found,
            }
            .fail(),
            _ => Ok(()),
        }
    }

    /// Decode `root` into a container.
    ///
    /// The recorded type attribute decides the concrete type; `type_hint` is
    /// used when the attribute is absent and otherwise must be an ancestor of
    /// the recorded type.
    ///
    /// # Errors
    ///
    /// [`MapError::Aggregate`] holding every problem found in the tree.
    pub fn from_builder(
        &self,
        root: &GroupBuilder,
        type_hint: Option<&str>,
    ) -> MapResult<Box<dyn Container>> {
        let mut problems = Vec::new();
        let decoded = self.decode(root, root, "/", type_hint, &mut problems);
        match decoded {
            Some(container) if problems.is_empty() => Ok(container),
            _ => AggregateSnafu {
                path: "/",
                problems,
            }
            .fail(),
        }
    }

    fn decode(
        &self,
        root: &GroupBuilder,
        group: &GroupBuilder,
        path: &str,
        type_hint: Option<&str>,
        problems: &mut Vec<MapError>,
    ) -> Option<Box<dyn Container>> {
        let catalog = self.catalog();
        let type_name = match (group.type_name(), type_hint) {
            (Some(found), Some(expected)) if !catalog.is_a(found, expected) => {
                problems.push(
                    TypeMismatchSnafu {
                        path,
                        field: TYPE_ATTR,
                        expected,
                        found,
                    }
                    .build(),
                );
                return None;
            }
            (Some(t), _) | (None, Some(t)) => t,
            (None, None) => {
                problems.push(MissingTypeSnafu { path }.build());
                return None;
            }
        };
        let resolved = catalog
            .resolve_fields(type_name)
            .and_then(|fields| Ok((fields, catalog.layout(type_name)?)))
            .and_then(|(fields, layout)| Ok((fields, layout, self.type_map.constructor(type_name)?)));
        let (fields, layout, ctor) = match resolved {
            Ok(r) => r,
            Err(source) => {
                problems.push(MapError::Schema { source });
                return None;
            }
        };

        let mut reader = FieldReader::new(type_name, group.name());
        if layout == TypeLayout::Table {
            match table_codec::decode(group, path) {
                Ok(table) => {
                    check_regions(root, &table, path, problems);
                    reader.set_table(table);
                }
                Err(e) => problems.push(e),
            }
        }
        for spec in &fields {
            self.decode_field(root, group, path, spec, &mut reader, problems);
        }
        match ctor(reader) {
            Ok(container) => Some(container),
            Err(source) => {
                problems.push(MapError::Validation {
                    path: path.to_string(),
                    source,
                });
                None
            }
        }
    }

    fn decode_field(
        &self,
        root: &GroupBuilder,
        group: &GroupBuilder,
        path: &str,
        spec: &FieldSpec,
        reader: &mut FieldReader,
        problems: &mut Vec<MapError>,
    ) {
        let key = spec.container_field();
        let (parent, leaf) = split_parent(&spec.name);
        let node_path = join_path(path, &spec.name);
        let holder = group.group_at(parent);
        let missing = |problems: &mut Vec<MapError>| {
            if spec.required {
                problems.push(
                    MissingFieldSnafu {
                        path,
                        field: &spec.name,
                    }
                    .build(),
                );
            }
        };

        match &spec.kind {
            FieldKind::Attribute { value: Some(_), .. } => {}
            FieldKind::Attribute { value: None, .. } => {
                match (holder.and_then(|g| g.attribute(leaf)), &spec.default) {
                    (Some(v), _) | (None, Some(v)) => {
                        reader.insert(key, Field::Attribute(v.clone()));
                    }
                    (None, None) => missing(problems),
                }
            }
            FieldKind::Dataset { attributes, .. } => {
                match holder.and_then(|g| g.dataset(leaf)) {
                    Some(dataset) => {
                        reader.insert(key, Field::Dataset(dataset.array().clone()));
                        for attr in attributes {
                            decode_dataset_attribute(dataset, attr, &node_path, reader, problems);
                        }
                    }
                    None => match &spec.default {
                        Some(v) => reader.insert(key, Field::Attribute(v.clone())),
                        None => missing(problems),
                    },
                }
            }
            FieldKind::Group { type_name } => match holder.and_then(|g| g.group(leaf)) {
                Some(child) => {
                    if let Some(c) =
                        self.decode(root, child, &node_path, type_name.as_deref(), problems)
                    {
                        reader.insert(key, Field::Group(c));
                    }
                }
                None => missing(problems),
            },
            FieldKind::Groups { type_name } => {
                let Some(children) = group.group_at(&spec.name) else {
                    missing(problems);
                    return;
                };
                let mut decoded = Vec::new();
                for child in children.groups() {
                    let child_path = join_path(&node_path, child.name());
                    if let Some(c) =
                        self.decode(root, child, &child_path, type_name.as_deref(), problems)
                    {
                        decoded.push(c);
                    }
                }
                reader.insert(key, Field::Groups(decoded));
            }
            FieldKind::Link { target_type } => match holder.and_then(|g| g.link(leaf)) {
                Some(target) => match root.group_at(target) {
                    Some(t) => match t.type_name() {
                        Some(found) if self.catalog().is_a(found, target_type) => {
                            reader.insert(key, Field::Link(target.to_string()));
                        }
                        found => problems.push(
                            TypeMismatchSnafu {
                                path,
                                field: &spec.name,
                                expected: target_type,
                                found: found.unwrap_or("untyped group"),
                            }
                            .build(),
                        ),
                    },
                    None => problems.push(
                        DanglingLinkSnafu {
                            path: node_path,
                            target,
                        }
                        .build(),
                    ),
                },
                None => missing(problems),
            },
        }
    }
}

/// Value of an attribute field on write: fixed value, container value, or
/// default, checked against the declared type.
fn encode_attribute(c: &dyn Container, spec: &FieldSpec, path: &str) -> MapResult<Option<Value>> {
    let FieldKind::Attribute { dtype, value } = &spec.kind else {
        return FieldKindSnafu {
            path,
            field: &spec.name,
            expected: "an attribute",
        }
        .fail();
    };
    let v = match (value, c.field(spec.container_field())) {
        (Some(fixed), _) => fixed.clone(),
        (None, Some(FieldRef::Attribute(v))) => v,
        (None, Some(FieldRef::Dataset(a))) if a.is_scalar() => {
            a.scalar_value().context(FieldKindSnafu {
                path,
                field: &spec.name,
                expected: "a scalar",
            })?
        }
        (None, Some(_)) => {
            return FieldKindSnafu {
                path,
                field: &spec.name,
                expected: "an attribute",
            }
            .fail();
        }
        (None, None) => match &spec.default {
            Some(d) => d.clone(),
            None if spec.required => {
                return MissingFieldSnafu {
                    path,
                    field: &spec.name,
                }
                .fail();
            }
            None => return Ok(None),
        },
    };
    coerce_value(*dtype, v).map(Some).map_err(|found| {
        DtypeSnafu {
            path,
            field: &spec.name,
            expected: *dtype,
            found,
        }
        .build()
    })
}

fn decode_dataset_attribute(
    dataset: &DatasetBuilder,
    attr: &FieldSpec,
    path: &str,
    reader: &mut FieldReader,
    problems: &mut Vec<MapError>,
) {
    if matches!(attr.kind, FieldKind::Attribute { value: Some(_), .. }) {
        return;
    }
    match (dataset.attribute(&attr.name), &attr.default) {
        (Some(v), _) | (None, Some(v)) => {
            reader.insert(attr.container_field(), Field::Attribute(v.clone()));
        }
        (None, None) if attr.required => problems.push(
            MissingFieldSnafu {
                path,
                field: &attr.name,
            }
            .build(),
        ),
        (None, None) => {}
    }
}

/// Promote integers where floats are declared; report the offending type otherwise.
fn coerce_value(dtype: DType, value: Value) -> Result<Value, DType> {
    match value {
        Value::List(items) => items
            .into_iter()
            .map(|v| coerce_value(dtype, v))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        Value::Int(i) if dtype == DType::Float => Ok(Value::Float(i as f64)),
        v => match v.dtype() {
            Some(found) if !dtype.accepts(found) => Err(found),
            _ => Ok(v),
        },
    }
}

fn check_array(
    dtype: DType,
    shape: Option<&[Option<usize>]>,
    array: NdArray,
    path: &str,
    field: &str,
) -> MapResult<NdArray> {
    let found = array.dtype();
    let array = if array.data().is_empty() {
        array
    } else if dtype == DType::Float && found == DType::Int {
        array.promoted_to_float().unwrap_or(array)
    } else {
        ensure!(
            dtype.accepts(found),
            DtypeSnafu {
                path,
                field,
                expected: dtype,
                found,
            }
        );
        array
    };
    if let Some(dims) = shape {
        let fits = dims.len() == array.shape().len()
            && dims
                .iter()
                .zip(array.shape())
                .all(|(d, n)| d.is_none_or(|d| d == *n));
        ensure!(
            fits,
            ShapeSnafu {
                path,
                field,
                expected: dims.to_vec(),
                found: array.shape().to_vec(),
            }
        );
    }
    Ok(array)
}

/// Check every region index of `table` against the row count of its target
/// group in `root`.
fn check_regions(
    root: &GroupBuilder,
    table: &DynamicTable,
    path: &str,
    problems: &mut Vec<MapError>,
) {
    for column in table.columns() {
        let Some(target) = column.target() else {
            continue;
        };
        let rows = root
            .group_at(target.path())
            .and_then(|g| g.dataset(ID_DATASET))
            .map(|ids| ids.array().rows());
        let Some(rows) = rows else {
            problems.push(MapError::Table {
                path: path.to_string(),
                source: UnresolvedTableSnafu {
                    column: column.name(),
                    target: target.path(),
                }
                .build(),
            });
            continue;
        };
        let dangling = (0..table.len()).find_map(|row| {
            column
                .region_indices(row)
                .unwrap_or_default()
                .into_iter()
                .find(|&i| usize::try_from(i).map_or(true, |i| i >= rows))
                .map(|i| (row, i))
        });
        if let Some((row, index)) = dangling {
            problems.push(MapError::Table {
                path: path.to_string(),
                source: CorruptIndexSnafu {
                    column: column.name(),
                    reason: format!(
                        "row {row} references index {index} of {}, which has {rows} rows",
                        target.path()
                    ),
                }
                .build(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{borrow::Cow, collections::BTreeMap};

    use chrono::DateTime;

    use super::*;
    use crate::{
        containers::{
            DecompositionSeries, ELECTRODES_PATH, RecordFile, RecordFileParams, Series,
            TimeSeries, TimeSeriesParams, Timing, UnitParams,
        },
        storage::layout::TABLE_ATTR,
    };

    /// Container exposing raw arrays under any type name.
    #[derive(Debug)]
    struct Stub {
        type_name: &'static str,
        fields: BTreeMap<&'static str, NdArray>,
    }

    impl Stub {
        fn new(type_name: &'static str) -> Self {
            Self {
                type_name,
                fields: BTreeMap::new(),
            }
        }

        fn with(mut self, name: &'static str, array: NdArray) -> Self {
            self.fields.insert(name, array);
            self
        }
    }

    impl Container for Stub {
        fn type_name(&self) -> &str {
            self.type_name
        }

        fn name(&self) -> &str {
            "stub"
        }

        fn field(&self, name: &str) -> Option<FieldRef<'_>> {
            self.fields.get(name).map(|a| FieldRef::Dataset(Cow::Borrowed(a)))
        }
    }

    fn speed() -> TimeSeries {
        TimeSeries::new(TimeSeriesParams::new(
            "speed",
            NdArray::from_floats(vec![1.0, 2.0, 3.0]),
            "m/s",
            Timing::Timestamps(vec![0.0, 0.5, 1.0]),
        ))
        .unwrap()
    }

    fn file() -> RecordFile {
        let start = DateTime::parse_from_rfc3339("2024-03-01T09:30:00+01:00").unwrap();
        RecordFile::new(RecordFileParams::new("session-1", "mapper test", start)).unwrap()
    }

    #[test]
    fn series_round_trip_writes_fixed_attributes() {
        let map = TypeMap::core();
        let mapper = ObjectMapper::new(&map);
        let group = mapper.to_builder(&speed()).unwrap();

        assert_eq!(group.type_name(), Some(TimeSeries::TYPE));
        assert_eq!(group.attribute(NAMESPACE_ATTR), Some(&Value::from("core")));
        let timestamps = group.dataset("timestamps").unwrap();
        assert_eq!(timestamps.attribute("unit"), Some(&Value::from("seconds")));
        let data = group.dataset("data").unwrap();
        assert_eq!(data.attribute("unit"), Some(&Value::from("m/s")));
        assert!(group.dataset("starting_time").is_none());

        let back = mapper.from_builder(&group, None).unwrap();
        let back = back.downcast_ref::<TimeSeries>().unwrap();
        assert_eq!(back.unit(), "m/s");
        assert_eq!(
            back.timing().into_owned(),
            Timing::Timestamps(vec![0.0, 0.5, 1.0])
        );
    }

    #[test]
    fn writes_fail_on_first_violation() {
        let map = TypeMap::core();
        let mapper = ObjectMapper::new(&map);

        let err = mapper.to_builder(&Stub::new(TimeSeries::TYPE)).unwrap_err();
        assert!(matches!(err, MapError::MissingField { ref field, .. } if field == "data"));

        let texts = Stub::new("IntervalSeries")
            .with("data", NdArray::from_texts(vec!["a".to_string()]));
        let err = mapper.to_builder(&texts).unwrap_err();
        assert!(matches!(
            err,
            MapError::Dtype {
                expected: DType::Int,
                found: DType::Text,
                ..
            }
        ));

        let matrix = Stub::new("IntervalSeries").with(
            "data",
            NdArray::new(vec![1, 2], crate::builder::DataBuffer::Int(vec![1, -1])).unwrap(),
        );
        assert!(matches!(
            mapper.to_builder(&matrix),
            Err(MapError::Shape { .. })
        ));
    }

    #[test]
    fn integer_timestamps_are_promoted() {
        let map = TypeMap::core();
        let mapper = ObjectMapper::new(&map);
        let stub = Stub::new(TimeSeries::TYPE)
            .with("data", NdArray::from_ints(vec![4, 5]))
            .with("timestamps", NdArray::from_ints(vec![0, 1]));
        let group = mapper.to_builder(&stub).unwrap();
        let timestamps = group.dataset("timestamps").unwrap().array();
        assert_eq!(timestamps.as_floats(), Some(&[0.0, 1.0][..]));
    }

    #[test]
    fn reads_report_every_problem() {
        let map = TypeMap::core();
        let mapper = ObjectMapper::new(&map);
        let mut f = file();
        f.add_acquisition(speed()).unwrap();
        let mut root = mapper.to_builder(&f).unwrap();
        assert!(root.remove("identifier"));
        root.group_at_or_create("acquisition")
            .set_group(GroupBuilder::new("untyped"));

        let err = mapper.from_builder(&root, None).unwrap_err();
        assert!(matches!(err, MapError::Aggregate { .. }));
        let leaves = err.leaves();
        assert!(leaves.iter().any(
            |e| matches!(e, MapError::MissingField { field, .. } if field == "identifier")
        ));
        assert!(leaves.iter().any(
            |e| matches!(e, MapError::MissingType { path } if path == "/acquisition/untyped")
        ));
    }

    #[test]
    fn dangling_region_index_fails_read() {
        let map = TypeMap::core();
        let mapper = ObjectMapper::new(&map);
        let mut f = file();
        f.add_electrode([("location", Value::from("CA1"))]).unwrap();
        f.add_unit(UnitParams::new(vec![0.1, 0.2]).electrodes(vec![0]))
            .unwrap();
        let mut root = mapper.to_builder(&f).unwrap();
        assert!(mapper.from_builder(&root, None).is_ok());

        root.group_at_or_create("units").set_dataset(
            DatasetBuilder::new("electrodes", NdArray::from_ints(vec![5]))
                .with_attribute(TABLE_ATTR, ELECTRODES_PATH),
        );
        let err = mapper.from_builder(&root, None).unwrap_err();
        assert!(matches!(
            err.table_error(),
            Some(TableError::CorruptIndex { column, .. }) if column == "electrodes"
        ));
    }

    #[test]
    fn links_must_resolve() {
        let map = TypeMap::core();
        let mapper = ObjectMapper::new(&map);
        let params = TimeSeriesParams::new(
            "power",
            NdArray::empty_rows(DType::Float, &[2, 1]),
            DecompositionSeries::DEFAULT_UNIT,
            Timing::Rate {
                starting_time: 0.0,
                rate: 10.0,
            },
        );
        let series = DecompositionSeries::new(params, "power")
            .unwrap()
            .with_source("/acquisition/lfp");
        let group = mapper.to_builder(&series).unwrap();
        assert_eq!(group.link("source_timeseries"), Some("/acquisition/lfp"));

        let err = mapper.from_builder(&group, None).unwrap_err();
        assert!(err
            .leaves()
            .iter()
            .any(|e| matches!(e, MapError::DanglingLink { target, .. } if target == "/acquisition/lfp")));
    }
}
