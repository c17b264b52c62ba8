//! The contract between typed containers and the object mapper.
//!
//! Writing asks a container for each schema field by name through
//! [`Container::field`]. Reading hands a constructor a [`FieldReader`]
//! filled with the decoded fields; the constructor pulls what it needs and
//! reports every problem at once through [`ValidationError`].

use std::{
    any::Any,
    borrow::Cow,
    collections::BTreeMap,
    fmt,
};

use snafu::prelude::*;

use crate::{
    builder::{NdArray, Value},
    containers::Series,
    table::DynamicTable,
};

/// Upcast helper so trait objects can be downcast to their concrete type.
pub trait AsAny: Any {
    /// Borrow as [`Any`].
    fn as_any(&self) -> &dyn Any;
    /// Convert a boxed value into a boxed [`Any`].
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// A typed object that maps to one group of the store tree.
pub trait Container: AsAny + fmt::Debug + Send + Sync {
    /// Schema type name.
    fn type_name(&self) -> &str;

    /// Name of the group this container is stored under.
    fn name(&self) -> &str;

    /// Value of the container field `name`, or `None` when unset.
    fn field(&self, name: &str) -> Option<FieldRef<'_>>;

    /// The table backing a table-layout container.
    fn as_table(&self) -> Option<&DynamicTable> {
        None
    }

    /// The series accessors of a series container.
    fn as_series(&self) -> Option<&dyn Series> {
        None
    }
}

impl dyn Container {
    /// Whether the concrete type is `T`.
    pub fn is<T: Container>(&self) -> bool {
        self.as_any().is::<T>()
    }

    /// Borrow as the concrete type `T`.
    pub fn downcast_ref<T: Container>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Convert into the concrete type `T`.
    pub fn downcast<T: Container>(self: Box<Self>) -> Option<Box<T>> {
        AsAny::into_any(self).downcast::<T>().ok()
    }
}

/// A borrowed field value handed to the mapper on write.
#[derive(Debug)]
pub enum FieldRef<'a> {
    /// Attribute value.
    Attribute(Value),
    /// Dataset payload.
    Dataset(Cow<'a, NdArray>),
    /// One owned child container.
    Group(&'a dyn Container),
    /// Owned child containers of a collection group.
    Groups(Vec<&'a dyn Container>),
    /// Absolute path of a linked container.
    Link(String),
}

impl FieldRef<'_> {
    /// Scalar text attribute.
    pub fn text(v: impl Into<String>) -> Self {
        FieldRef::Attribute(Value::Text(v.into()))
    }

    /// Scalar float attribute.
    pub fn float(v: f64) -> Self {
        FieldRef::Attribute(Value::Float(v))
    }

    /// Owned dataset payload.
    pub fn array(a: NdArray) -> Self {
        FieldRef::Dataset(Cow::Owned(a))
    }
}

/// An owned, decoded field value handed to a constructor on read.
#[derive(Debug)]
pub enum Field {
    /// Attribute value.
    Attribute(Value),
    /// Dataset payload.
    Dataset(NdArray),
    /// One child container.
    Group(Box<dyn Container>),
    /// Children of a collection group, in name order.
    Groups(Vec<Box<dyn Container>>),
    /// Absolute path of a linked container.
    Link(String),
}

/// Aggregated failure of a validated constructor.
#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(display("invalid {type_name} {container:?}: {}", problems.join("; ")))]
pub struct ValidationError {
    type_name: String,
    container: String,
    problems: Vec<String>,
}

impl ValidationError {
    /// Fail with `problems` unless it is empty.
    pub fn check(
        type_name: impl Into<String>,
        container: impl Into<String>,
        problems: Vec<String>,
    ) -> Result<(), ValidationError> {
        if problems.is_empty() {
            return Ok(());
        }
        Err(ValidationError {
            type_name: type_name.into(),
            container: container.into(),
            problems,
        })
    }

    /// Type being constructed.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Name of the container being constructed.
    pub fn container(&self) -> &str {
        &self.container
    }

    /// Every problem found.
    pub fn problems(&self) -> &[String] {
        &self.problems
    }
}

/// Builds a container from decoded fields.
pub type Constructor = fn(FieldReader) -> Result<Box<dyn Container>, ValidationError>;

/// Decoded fields of one group plus the problems found while reading them.
#[derive(Debug)]
pub struct FieldReader {
    type_name: String,
    name: String,
    fields: BTreeMap<String, Field>,
    table: Option<DynamicTable>,
    problems: Vec<String>,
}

impl FieldReader {
    /// Reader for a group named `name` of type `type_name`.
    pub fn new(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            name: name.into(),
            fields: BTreeMap::new(),
            table: None,
            problems: Vec::new(),
        }
    }

    /// Add a field.
    pub fn insert(&mut self, key: impl Into<String>, field: Field) {
        self.fields.insert(key.into(), field);
    }

    /// Builder-style [`Self::insert`].
    pub fn with(mut self, key: impl Into<String>, field: Field) -> Self {
        self.insert(key, field);
        self
    }

    /// Attach the decoded table of a table-layout group.
    pub fn set_table(&mut self, table: DynamicTable) {
        self.table = Some(table);
    }

    /// Group name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type being read.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Record a problem.
    pub fn problem(&mut self, problem: impl Into<String>) {
        self.problems.push(problem.into());
    }

    fn wrong_kind(&mut self, key: &str, expected: &str) {
        self.problem(format!("field {key:?} is not {expected}"));
    }

    /// Record a problem if `value` is `None`.
    pub fn require<T>(&mut self, key: &str, value: Option<T>) -> Option<T> {
        if value.is_none() {
            self.problem(format!("missing required field {key:?}"));
        }
        value
    }

    /// Whether a field is present.
    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Text attribute or scalar text dataset.
    pub fn text(&mut self, key: &str) -> Option<String> {
        let value = match self.fields.remove(key)? {
            Field::Attribute(v) => Some(v),
            Field::Dataset(a) => a.scalar_value(),
            _ => None,
        };
        match value {
            Some(Value::Text(s)) => Some(s),
            _ => {
                self.wrong_kind(key, "text");
                None
            }
        }
    }

    /// Numeric attribute or scalar numeric dataset.
    pub fn float(&mut self, key: &str) -> Option<f64> {
        let value = match self.fields.remove(key)? {
            Field::Attribute(v) => Some(v),
            Field::Dataset(a) => a.scalar_value(),
            _ => None,
        };
        match value.as_ref().and_then(Value::as_float) {
            Some(f) => Some(f),
            None => {
                self.wrong_kind(key, "a number");
                None
            }
        }
    }

    /// One-dimensional text dataset or list attribute.
    pub fn texts(&mut self, key: &str) -> Option<Vec<String>> {
        let out = match self.fields.remove(key)? {
            Field::Dataset(a) if a.shape().len() == 1 => a.as_texts().map(<[String]>::to_vec),
            Field::Attribute(Value::List(items)) => items
                .iter()
                .map(|v| v.as_text().map(str::to_string))
                .collect(),
            _ => None,
        };
        if out.is_none() {
            self.wrong_kind(key, "a list of text");
        }
        out
    }

    /// Dataset payload (attributes are converted).
    pub fn array(&mut self, key: &str) -> Option<NdArray> {
        match self.fields.remove(key)? {
            Field::Dataset(a) => Some(a),
            Field::Attribute(v) => match NdArray::from_value(&v) {
                Ok(a) => Some(a),
                Err(e) => {
                    self.problem(format!("field {key:?}: {e}"));
                    None
                }
            },
            _ => {
                self.wrong_kind(key, "a dataset");
                None
            }
        }
    }

    /// Single child container of concrete type `T`.
    pub fn child<T: Container>(&mut self, key: &str) -> Option<T> {
        match self.fields.remove(key)? {
            Field::Group(c) => {
                let found = c.type_name().to_string();
                let child = c.downcast::<T>().map(|c| *c);
                if child.is_none() {
                    self.problem(format!("field {key:?} holds unexpected type {found}"));
                }
                child
            }
            _ => {
                self.wrong_kind(key, "a group");
                None
            }
        }
    }

    /// Children of a collection group (empty when absent).
    pub fn children(&mut self, key: &str) -> Vec<Box<dyn Container>> {
        match self.fields.remove(key) {
            None => Vec::new(),
            Some(Field::Groups(children)) => children,
            Some(Field::Group(child)) => vec![child],
            Some(_) => {
                self.wrong_kind(key, "a collection group");
                Vec::new()
            }
        }
    }

    /// Target path of a soft link.
    pub fn link(&mut self, key: &str) -> Option<String> {
        match self.fields.remove(key)? {
            Field::Link(target) => Some(target),
            _ => {
                self.wrong_kind(key, "a link");
                None
            }
        }
    }

    /// The decoded table of a table-layout group.
    pub fn table(&mut self) -> Option<DynamicTable> {
        let table = self.table.take();
        if table.is_none() {
            self.problem("group has no table columns");
        }
        table
    }

    /// Fail with every recorded problem, if any.
    pub fn finish(self) -> Result<(), ValidationError> {
        ValidationError::check(self.type_name, self.name, self.problems)
    }

    /// Return `value` if it is present and no problem was recorded.
    pub fn complete<T>(mut self, value: Option<T>) -> Result<T, ValidationError> {
        match value {
            Some(v) if self.problems.is_empty() => Ok(v),
            None if self.problems.is_empty() => {
                self.problem("incomplete fields");
                Err(self.into_error())
            }
            _ => Err(self.into_error()),
        }
    }

    fn into_error(self) -> ValidationError {
        ValidationError {
            type_name: self.type_name,
            container: self.name,
            problems: self.problems,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downcast_recovers_concrete_type() {
        let boxed: Box<dyn Container> = Box::new(DynamicTable::new("electrodes", ""));
        assert!(boxed.is::<DynamicTable>());
        assert_eq!(
            boxed.downcast_ref::<DynamicTable>().map(DynamicTable::name),
            Some("electrodes")
        );
        let table = boxed.downcast::<DynamicTable>().unwrap();
        assert_eq!(table.name(), "electrodes");
    }

    #[test]
    fn reader_collects_every_problem() {
        let mut reader = FieldReader::new("TimeSeries", "raw")
            .with("description", Field::Attribute(Value::Int(3)))
            .with("data", Field::Link("/elsewhere".into()));
        assert_eq!(reader.text("description"), None);
        assert!(reader.array("data").is_none());
        let missing = reader.float("rate");
        reader.require("rate", missing);

        let err = reader.finish().unwrap_err();
        assert_eq!(err.problems().len(), 3);
        assert_eq!(err.type_name(), "TimeSeries");
    }
}
