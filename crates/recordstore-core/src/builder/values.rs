//! Typed payloads carried by builder nodes, container fields and table rows.
//!
//! - [`Value`] is the loosely-typed currency used for attributes and for the
//!   per-row values handed to [`crate::table::DynamicTable::add_row`].
//! - [`DataBuffer`] is a homogeneous, flat, typed buffer.
//! - [`NdArray`] pairs a buffer with a shape and is the payload of every
//!   dataset node.
use std::{fmt, ops::Range};

use serde::{Deserialize, Serialize};
use snafu::prelude::*;

/// Element type of a buffer or of a declared schema field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    /// Boolean values.
    Bool,
    /// 64-bit signed integers.
    Int,
    /// 64-bit floating point values.
    Float,
    /// UTF-8 strings.
    Text,
    /// Any of the above (only valid in schema declarations).
    Any,
}

impl DType {
    /// Whether a buffer of type `found` satisfies a declaration of `self`.
    ///
    /// Integers are accepted where floats are declared; they are promoted when
    /// written.
    pub fn accepts(self, found: DType) -> bool {
        match (self, found) {
            (DType::Any, _) => true,
            (DType::Float, DType::Int) => true,
            (a, b) => a == b,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::Bool => write!(f, "bool"),
            DType::Int => write!(f, "int"),
            DType::Float => write!(f, "float"),
            DType::Text => write!(f, "text"),
            DType::Any => write!(f, "any"),
        }
    }
}

/// Errors raised when a value does not fit a buffer or a shape.
#[derive(Debug, Clone, Snafu, PartialEq, Eq)]
#[snafu(visibility(pub(crate)))]
pub enum ValueError {
    /// The value's element type cannot be stored in the target buffer.
    #[snafu(display("type mismatch: expected {expected}, found {found}"))]
    TypeMismatch {
        /// Element type of the target.
        expected: DType,
        /// Description of the offending value.
        found: String,
    },

    /// The value's shape differs from the element shape of the target.
    #[snafu(display("shape mismatch: expected element shape {expected:?}, found {found:?}"))]
    ShapeMismatch {
        /// Element shape of the target.
        expected: Vec<usize>,
        /// Shape of the offending value.
        found: Vec<usize>,
    },

    /// Nested lists have unequal lengths.
    #[snafu(display("ragged nested list cannot be stored as a dense element"))]
    NotRectangular,

    /// The declared shape does not describe the number of values supplied.
    #[snafu(display("shape {shape:?} describes {expected} values, but the buffer holds {found}"))]
    BufferLength {
        /// Declared shape.
        shape: Vec<usize>,
        /// Number of values implied by the shape.
        expected: usize,
        /// Number of values actually present.
        found: usize,
    },
}

/// A single attribute value, table cell, or element of a row sequence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Value {
    /// Boolean scalar.
    Bool(bool),
    /// Integer scalar.
    Int(i64),
    /// Floating point scalar.
    Float(f64),
    /// Text scalar.
    Text(String),
    /// Ordered sequence of values.
    List(Vec<Value>),
}

impl Value {
    /// Element type of a scalar, or `None` for lists.
    pub fn dtype(&self) -> Option<DType> {
        match self {
            Value::Bool(_) => Some(DType::Bool),
            Value::Int(_) => Some(DType::Int),
            Value::Float(_) => Some(DType::Float),
            Value::Text(_) => Some(DType::Text),
            Value::List(_) => None,
        }
    }

    /// Borrow the text of a `Text` value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric value as `f64` (integers are widened).
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Integer value of an `Int`.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Borrow the items of a `List`.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Shape of this value when viewed as a dense n-dimensional element.
    ///
    /// Scalars have shape `[]`; a list of `n` scalars has shape `[n]`; nested
    /// lists must be rectangular.
    pub fn shape(&self) -> Result<Vec<usize>, ValueError> {
        match self {
            Value::List(items) => {
                let mut inner: Option<Vec<usize>> = None;
                for item in items {
                    let s = item.shape()?;
                    match &inner {
                        None => inner = Some(s),
                        Some(prev) if *prev == s => {}
                        Some(_) => return NotRectangularSnafu.fail(),
                    }
                }
                let mut shape = vec![items.len()];
                shape.extend(inner.unwrap_or_default());
                Ok(shape)
            }
            _ => Ok(Vec::new()),
        }
    }

    /// First scalar in depth-first order, used to pick a buffer type.
    fn first_scalar(&self) -> Option<&Value> {
        match self {
            Value::List(items) => items.iter().find_map(Value::first_scalar),
            scalar => Some(scalar),
        }
    }

    fn for_each_scalar<'a>(&'a self, f: &mut impl FnMut(&'a Value)) {
        match self {
            Value::List(items) => {
                for item in items {
                    item.for_each_scalar(f);
                }
            }
            scalar => f(scalar),
        }
    }

    pub(crate) fn describe(&self) -> String {
        match self {
            Value::List(items) => format!("list[{}]", items.len()),
            scalar => scalar
                .dtype()
                .map(|d| d.to_string())
                .unwrap_or_else(|| "list".to_string()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(v: [T; N]) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

/// JSON cannot represent non-finite floats, so they travel as strings.
mod float_repr {
    use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error};

    #[derive(Serialize, Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Num(f64),
        Special(String),
    }

    fn encode(v: f64) -> Repr {
        if v.is_nan() {
            Repr::Special("NaN".to_string())
        } else if v.is_infinite() && v > 0.0 {
            Repr::Special("inf".to_string())
        } else if v.is_infinite() {
            Repr::Special("-inf".to_string())
        } else {
            Repr::Num(v)
        }
    }

    pub(super) fn serialize<S: Serializer>(values: &[f64], s: S) -> Result<S::Ok, S::Error> {
        s.collect_seq(values.iter().map(|v| encode(*v)))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<f64>, D::Error> {
        let raw: Vec<Repr> = Vec::deserialize(d)?;
        raw.into_iter()
            .map(|r| match r {
                Repr::Num(v) => Ok(v),
                Repr::Special(s) => match s.as_str() {
                    "NaN" => Ok(f64::NAN),
                    "inf" => Ok(f64::INFINITY),
                    "-inf" => Ok(f64::NEG_INFINITY),
                    other => Err(D::Error::custom(format!("invalid float {other:?}"))),
                },
            })
            .collect()
    }
}

/// Homogeneous flat buffer of typed values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "dtype", content = "values", rename_all = "lowercase")]
pub enum DataBuffer {
    /// Boolean values.
    Bool(Vec<bool>),
    /// Integer values.
    Int(Vec<i64>),
    /// Float values.
    Float(#[serde(with = "float_repr")] Vec<f64>),
    /// Text values.
    Text(Vec<String>),
}

impl DataBuffer {
    /// Empty buffer for a declared element type (`Any` defaults to float).
    pub fn empty(dtype: DType) -> Self {
        match dtype {
            DType::Bool => DataBuffer::Bool(Vec::new()),
            DType::Int => DataBuffer::Int(Vec::new()),
            DType::Float | DType::Any => DataBuffer::Float(Vec::new()),
            DType::Text => DataBuffer::Text(Vec::new()),
        }
    }

    /// Element type of the buffer.
    pub fn dtype(&self) -> DType {
        match self {
            DataBuffer::Bool(_) => DType::Bool,
            DataBuffer::Int(_) => DType::Int,
            DataBuffer::Float(_) => DType::Float,
            DataBuffer::Text(_) => DType::Text,
        }
    }

    /// Number of scalar values.
    pub fn len(&self) -> usize {
        match self {
            DataBuffer::Bool(v) => v.len(),
            DataBuffer::Int(v) => v.len(),
            DataBuffer::Float(v) => v.len(),
            DataBuffer::Text(v) => v.len(),
        }
    }

    /// Whether the buffer holds no values.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Scalar at position `i`.
    pub fn get(&self, i: usize) -> Option<Value> {
        match self {
            DataBuffer::Bool(v) => v.get(i).copied().map(Value::Bool),
            DataBuffer::Int(v) => v.get(i).copied().map(Value::Int),
            DataBuffer::Float(v) => v.get(i).copied().map(Value::Float),
            DataBuffer::Text(v) => v.get(i).cloned().map(Value::Text),
        }
    }

    /// Borrow a sub-range of the buffer.
    pub fn view(&self, range: Range<usize>) -> Option<BufferView<'_>> {
        Some(match self {
            DataBuffer::Bool(v) => BufferView::Bool(v.get(range)?),
            DataBuffer::Int(v) => BufferView::Int(v.get(range)?),
            DataBuffer::Float(v) => BufferView::Float(v.get(range)?),
            DataBuffer::Text(v) => BufferView::Text(v.get(range)?),
        })
    }

    /// Whether `scalar` can be appended (possibly after promoting ints to floats).
    fn accepts(&self, scalar: &Value) -> bool {
        matches!(
            (self, scalar),
            (DataBuffer::Bool(_), Value::Bool(_))
                | (DataBuffer::Int(_), Value::Int(_) | Value::Float(_))
                | (DataBuffer::Float(_), Value::Float(_) | Value::Int(_))
                | (DataBuffer::Text(_), Value::Text(_))
        )
    }

    fn promote_to_float(&mut self) {
        if let DataBuffer::Int(v) = self {
            *self = DataBuffer::Float(v.iter().map(|x| *x as f64).collect());
        }
    }

    /// Append a scalar that has already been checked with [`Self::accepts`].
    fn push_scalar(&mut self, scalar: &Value) {
        if matches!((&*self, scalar), (DataBuffer::Int(_), Value::Float(_))) {
            self.promote_to_float();
        }
        match (self, scalar) {
            (DataBuffer::Bool(b), Value::Bool(x)) => b.push(*x),
            (DataBuffer::Int(b), Value::Int(x)) => b.push(*x),
            (DataBuffer::Float(b), Value::Float(x)) => b.push(*x),
            (DataBuffer::Float(b), Value::Int(x)) => b.push(*x as f64),
            (DataBuffer::Text(b), Value::Text(x)) => b.push(x.clone()),
            _ => {}
        }
    }

    /// Borrow the buffer as integers.
    pub fn as_ints(&self) -> Option<&[i64]> {
        match self {
            DataBuffer::Int(v) => Some(v),
            _ => None,
        }
    }

    /// Borrow the buffer as floats.
    pub fn as_floats(&self) -> Option<&[f64]> {
        match self {
            DataBuffer::Float(v) => Some(v),
            _ => None,
        }
    }

    /// Borrow the buffer as text.
    pub fn as_texts(&self) -> Option<&[String]> {
        match self {
            DataBuffer::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Copy of the buffer with integers widened to floats.
    pub fn to_float_buffer(&self) -> Option<DataBuffer> {
        match self {
            DataBuffer::Int(v) => Some(DataBuffer::Float(v.iter().map(|x| *x as f64).collect())),
            DataBuffer::Float(v) => Some(DataBuffer::Float(v.clone())),
            _ => None,
        }
    }
}

/// Borrowed slice of a [`DataBuffer`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BufferView<'a> {
    /// Boolean slice.
    Bool(&'a [bool]),
    /// Integer slice.
    Int(&'a [i64]),
    /// Float slice.
    Float(&'a [f64]),
    /// Text slice.
    Text(&'a [String]),
}

impl<'a> BufferView<'a> {
    /// Number of scalars in the view.
    pub fn len(&self) -> usize {
        match self {
            BufferView::Bool(v) => v.len(),
            BufferView::Int(v) => v.len(),
            BufferView::Float(v) => v.len(),
            BufferView::Text(v) => v.len(),
        }
    }

    /// Whether the view is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The view as a float slice.
    pub fn as_floats(&self) -> Option<&'a [f64]> {
        match self {
            BufferView::Float(v) => Some(v),
            _ => None,
        }
    }

    /// The view as an integer slice.
    pub fn as_ints(&self) -> Option<&'a [i64]> {
        match self {
            BufferView::Int(v) => Some(v),
            _ => None,
        }
    }

    fn scalar(&self, i: usize) -> Option<Value> {
        match self {
            BufferView::Bool(v) => v.get(i).copied().map(Value::Bool),
            BufferView::Int(v) => v.get(i).copied().map(Value::Int),
            BufferView::Float(v) => v.get(i).copied().map(Value::Float),
            BufferView::Text(v) => v.get(i).cloned().map(Value::Text),
        }
    }

    /// Rebuild a (possibly nested) [`Value`] from this view and a shape.
    pub fn to_value(&self, shape: &[usize]) -> Value {
        self.build(0, shape)
    }

    fn build(&self, offset: usize, shape: &[usize]) -> Value {
        match shape.split_first() {
            None => self.scalar(offset).unwrap_or(Value::List(Vec::new())),
            Some((n, rest)) => {
                let stride: usize = rest.iter().product();
                Value::List(
                    (0..*n)
                        .map(|i| self.build(offset + i * stride, rest))
                        .collect(),
                )
            }
        }
    }
}

/// An n-dimensional typed array: a flat buffer plus a shape.
///
/// Invariant: the product of `shape` equals the buffer length. A scalar has
/// shape `[]` and exactly one value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "RawNdArray")]
pub struct NdArray {
    shape: Vec<usize>,
    data: DataBuffer,
}

/// Wire form of [`NdArray`], checked through [`NdArray::new`] on load.
#[derive(Deserialize)]
struct RawNdArray {
    shape: Vec<usize>,
    data: DataBuffer,
}

impl TryFrom<RawNdArray> for NdArray {
    type Error = ValueError;

    fn try_from(raw: RawNdArray) -> Result<Self, Self::Error> {
        NdArray::new(raw.shape, raw.data)
    }
}

impl NdArray {
    /// Build an array, checking the shape against the buffer length.
    pub fn new(shape: Vec<usize>, data: DataBuffer) -> Result<Self, ValueError> {
        let expected: usize = shape.iter().product();
        ensure!(
            expected == data.len(),
            BufferLengthSnafu {
                shape: shape.clone(),
                expected,
                found: data.len(),
            }
        );
        Ok(Self { shape, data })
    }

    /// One-dimensional array over the whole buffer.
    pub fn vector(data: DataBuffer) -> Self {
        Self {
            shape: vec![data.len()],
            data,
        }
    }

    /// Empty one-dimensional array.
    pub fn empty(dtype: DType) -> Self {
        Self::vector(DataBuffer::empty(dtype))
    }

    /// Array with no rows whose elements have `element_shape`.
    pub fn empty_rows(dtype: DType, element_shape: &[usize]) -> Self {
        let mut shape = vec![0];
        shape.extend_from_slice(element_shape);
        Self {
            shape,
            data: DataBuffer::empty(dtype),
        }
    }

    /// Zero-dimensional text array.
    pub fn scalar_text(v: impl Into<String>) -> Self {
        Self {
            shape: Vec::new(),
            data: DataBuffer::Text(vec![v.into()]),
        }
    }

    /// Zero-dimensional float array.
    pub fn scalar_float(v: f64) -> Self {
        Self {
            shape: Vec::new(),
            data: DataBuffer::Float(vec![v]),
        }
    }

    /// One-dimensional float array.
    pub fn from_floats(v: Vec<f64>) -> Self {
        Self::vector(DataBuffer::Float(v))
    }

    /// One-dimensional integer array.
    pub fn from_ints(v: Vec<i64>) -> Self {
        Self::vector(DataBuffer::Int(v))
    }

    /// One-dimensional text array.
    pub fn from_texts(v: Vec<String>) -> Self {
        Self::vector(DataBuffer::Text(v))
    }

    /// Build an array from a nested [`Value`] (scalars give zero-dimensional arrays).
    pub fn from_value(value: &Value) -> Result<Self, ValueError> {
        let shape = value.shape()?;
        let first = value.first_scalar();
        let mut data = DataBuffer::empty(first.and_then(Value::dtype).unwrap_or(DType::Float));
        let mut mismatch = None;
        value.for_each_scalar(&mut |s| {
            if mismatch.is_none() && !data.accepts(s) {
                mismatch = Some(s.describe());
            }
        });
        if let Some(found) = mismatch {
            return TypeMismatchSnafu {
                expected: data.dtype(),
                found,
            }
            .fail();
        }
        value.for_each_scalar(&mut |s| data.push_scalar(s));
        Self::new(shape, data)
    }

    /// Shape of the array.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Underlying flat buffer.
    pub fn data(&self) -> &DataBuffer {
        &self.data
    }

    /// Consume the array and return its buffer.
    pub fn into_data(self) -> DataBuffer {
        self.data
    }

    /// Element type.
    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    /// Whether this array is zero-dimensional.
    pub fn is_scalar(&self) -> bool {
        self.shape.is_empty()
    }

    /// Number of elements along the first axis (1 for scalars).
    pub fn rows(&self) -> usize {
        self.shape.first().copied().unwrap_or(1)
    }

    /// Shape of one element along the first axis.
    pub fn element_shape(&self) -> &[usize] {
        self.shape.get(1..).unwrap_or(&[])
    }

    fn element_size(&self) -> usize {
        self.element_shape().iter().product()
    }

    /// The single value of a zero-dimensional array.
    pub fn scalar_value(&self) -> Option<Value> {
        if self.is_scalar() {
            self.data.get(0)
        } else {
            None
        }
    }

    /// The whole array as a nested [`Value`].
    pub fn to_value(&self) -> Value {
        match self.data.view(0..self.data.len()) {
            Some(view) => view.to_value(&self.shape),
            None => Value::List(Vec::new()),
        }
    }

    /// Borrow elements `range` along the first axis.
    pub fn view_rows(&self, range: Range<usize>) -> Option<BufferView<'_>> {
        let size = self.element_size();
        self.data.view(range.start * size..range.end * size)
    }

    /// Element `i` along the first axis as a [`Value`].
    pub fn row_value(&self, i: usize) -> Option<Value> {
        if i >= self.rows() || self.is_scalar() {
            return None;
        }
        let view = self.view_rows(i..i + 1)?;
        Some(view.to_value(self.element_shape()))
    }

    /// Check that `element` can be appended along the first axis.
    ///
    /// An empty array adopts the type and shape of its first element.
    pub fn check_element(&self, element: &Value) -> Result<(), ValueError> {
        let shape = element.shape()?;
        ensure!(
            !self.is_scalar(),
            ShapeMismatchSnafu {
                expected: Vec::<usize>::new(),
                found: shape,
            }
        );
        if self.data.is_empty() && self.rows() == 0 {
            return Self::from_value(element).map(|_| ());
        }
        ensure!(
            shape.as_slice() == self.element_shape(),
            ShapeMismatchSnafu {
                expected: self.element_shape().to_vec(),
                found: shape,
            }
        );
        let mut mismatch = None;
        element.for_each_scalar(&mut |s| {
            if mismatch.is_none() && !self.data.accepts(s) {
                mismatch = Some(s.describe());
            }
        });
        match mismatch {
            Some(found) => TypeMismatchSnafu {
                expected: self.dtype(),
                found,
            }
            .fail(),
            None => Ok(()),
        }
    }

    /// Append `element` along the first axis after [`Self::check_element`].
    pub fn push_element(&mut self, element: &Value) -> Result<(), ValueError> {
        self.check_element(element)?;
        if self.data.is_empty() && self.rows() == 0 {
            let adopted = Self::from_value(element)?;
            let mut shape = vec![1];
            shape.extend_from_slice(adopted.shape());
            self.shape = shape;
            self.data = adopted.data;
            return Ok(());
        }
        let data = &mut self.data;
        element.for_each_scalar(&mut |s| data.push_scalar(s));
        if let Some(first) = self.shape.first_mut() {
            *first += 1;
        }
        Ok(())
    }

    /// Float contents (integers widened), if numeric.
    pub fn to_floats(&self) -> Option<Vec<f64>> {
        match self.data.to_float_buffer()? {
            DataBuffer::Float(v) => Some(v),
            _ => None,
        }
    }

    /// Borrow float contents.
    pub fn as_floats(&self) -> Option<&[f64]> {
        self.data.as_floats()
    }

    /// Borrow integer contents.
    pub fn as_ints(&self) -> Option<&[i64]> {
        self.data.as_ints()
    }

    /// Borrow text contents.
    pub fn as_texts(&self) -> Option<&[String]> {
        self.data.as_texts()
    }

    /// Copy of this array with integers widened to floats.
    pub fn promoted_to_float(&self) -> Option<NdArray> {
        Some(NdArray {
            shape: self.shape.clone(),
            data: self.data.to_float_buffer()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_value_shape_is_rectangular() {
        let v = Value::from(vec![[0.0, 10.0], [5.0, 6.0]]);
        assert_eq!(v.shape().unwrap(), vec![2, 2]);

        let ragged = Value::List(vec![Value::from(vec![1.0]), Value::from(vec![1.0, 2.0])]);
        assert_eq!(ragged.shape(), Err(ValueError::NotRectangular));
    }

    #[test]
    fn push_element_adopts_first_shape() {
        let mut arr = NdArray::empty(DType::Float);
        arr.push_element(&Value::from([0.0, 10.0])).unwrap();
        arr.push_element(&Value::from([5.0, 6.0])).unwrap();
        assert_eq!(arr.shape(), &[2, 2]);
        assert_eq!(arr.row_value(1), Some(Value::from(vec![5.0, 6.0])));

        let err = arr.push_element(&Value::from(1.0)).unwrap_err();
        assert!(matches!(err, ValueError::ShapeMismatch { .. }));
        assert_eq!(arr.shape(), &[2, 2]);
    }

    #[test]
    fn int_buffer_promotes_on_float() {
        let mut arr = NdArray::from_ints(vec![1, 2]);
        arr.push_element(&Value::Float(2.5)).unwrap();
        assert_eq!(arr.as_floats(), Some(&[1.0, 2.0, 2.5][..]));
    }

    #[test]
    fn text_rejects_numbers() {
        let arr = NdArray::from_texts(vec!["a".to_string()]);
        let err = arr.check_element(&Value::Int(3)).unwrap_err();
        assert!(matches!(err, ValueError::TypeMismatch { .. }));
    }

    #[test]
    fn new_checks_buffer_length() {
        let err = NdArray::new(vec![2, 2], DataBuffer::Int(vec![1, 2, 3])).unwrap_err();
        assert!(matches!(err, ValueError::BufferLength { expected: 4, found: 3, .. }));
        assert!(NdArray::new(vec![], DataBuffer::Int(vec![7])).is_ok());
    }

    #[test]
    fn loading_checks_buffer_length() {
        let short = serde_json::json!({
            "shape": [3],
            "data": { "dtype": "int", "values": [1, 2] },
        });
        let err = serde_json::from_value::<NdArray>(short).unwrap_err();
        assert!(err.to_string().contains("the buffer holds 2"), "{err}");

        let arr = NdArray::new(vec![2, 1], DataBuffer::Int(vec![4, 5])).unwrap();
        let back: NdArray = serde_json::from_value(serde_json::to_value(&arr).unwrap()).unwrap();
        assert_eq!(back, arr);
    }

    #[test]
    fn non_finite_floats_survive_json() {
        let buf = DataBuffer::Float(vec![1.0, f64::NAN, f64::INFINITY]);
        let json = serde_json::to_string(&buf).unwrap();
        let back: DataBuffer = serde_json::from_str(&json).unwrap();
        let floats = back.as_floats().unwrap();
        assert_eq!(floats[0], 1.0);
        assert!(floats[1].is_nan());
        assert_eq!(floats[2], f64::INFINITY);
    }
}
