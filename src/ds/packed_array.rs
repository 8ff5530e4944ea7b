//! Column-typed, resizable record table stored in a single byte buffer.
//!
//! Every record has the same fixed width (the layout stride) and every column
//! lives at a fixed byte offset inside the record, so the whole table can be
//! persisted and reloaded as one little-endian byte slice.
//!
//! # Example
//!
//! ```ignore
//! use knit_sampler::ds::{FieldType, PackedArray, PackedLayout};
//!
//! let layout = PackedLayout::new(&[("x", FieldType::F32), ("id", FieldType::U32)]);
//! let x = layout.field("x").unwrap();
//! let mut table = PackedArray::new(layout);
//! let row = table.push_default();
//! table.set(row as isize, x, 1.5f32);
//! assert_eq!(table.get::<f32>(-1, x), 1.5);
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    U8,
    U16,
    U32,
    I8,
    I16,
    I32,
    F32,
    U64,
    I64,
    F64,
}

impl FieldType {
    /// Width of one value in bytes.
    #[must_use]
    pub const fn width(self) -> usize {
        match self {
            Self::U8 | Self::I8 => 1,
            Self::U16 | Self::I16 => 2,
            Self::U32 | Self::I32 | Self::F32 => 4,
            Self::U64 | Self::I64 | Self::F64 => 8,
        }
    }

    #[must_use]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }
}

/// Handle to a column of a [`PackedLayout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldId(pub usize);

#[derive(Debug, Clone, PartialEq, Eq)]
struct FieldSpec {
    name: String,
    ty: FieldType,
    offset: usize,
}

/// Ordered set of named columns with their byte offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedLayout {
    fields: Vec<FieldSpec>,
    stride: usize,
}

impl PackedLayout {
    /// Builds a layout; columns are packed in declaration order without padding.
    ///
    /// # Panics
    /// Panics on duplicate column names.
    #[must_use]
    pub fn new(fields: &[(&str, FieldType)]) -> Self {
        let mut specs: Vec<FieldSpec> = Vec::with_capacity(fields.len());
        let mut offset = 0;
        for (name, ty) in fields {
            assert!(
                specs.iter().all(|spec| spec.name != *name),
                "duplicate packed column `{name}`"
            );
            specs.push(FieldSpec {
                name: (*name).to_owned(),
                ty: *ty,
                offset,
            });
            offset += ty.width();
        }
        Self {
            fields: specs,
            stride: offset,
        }
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<FieldId> {
        self.fields
            .iter()
            .position(|spec| spec.name == name)
            .map(FieldId)
    }

    #[must_use]
    pub fn field_type(&self, field: FieldId) -> FieldType {
        self.fields[field.0].ty
    }

    #[must_use]
    pub fn field_name(&self, field: FieldId) -> &str {
        &self.fields[field.0].name
    }

    #[must_use]
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Bytes per record.
    #[must_use]
    pub const fn stride(&self) -> usize {
        self.stride
    }

    fn offset(&self, field: FieldId) -> usize {
        self.fields[field.0].offset
    }
}

/// A single dynamically typed column value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    U8(u8),
    U16(u16),
    U32(u32),
    I8(i8),
    I16(i16),
    I32(i32),
    F32(f32),
    U64(u64),
    I64(i64),
    F64(f64),
}

impl FieldValue {
    #[must_use]
    pub const fn field_type(self) -> FieldType {
        match self {
            Self::U8(_) => FieldType::U8,
            Self::U16(_) => FieldType::U16,
            Self::U32(_) => FieldType::U32,
            Self::I8(_) => FieldType::I8,
            Self::I16(_) => FieldType::I16,
            Self::I32(_) => FieldType::I32,
            Self::F32(_) => FieldType::F32,
            Self::U64(_) => FieldType::U64,
            Self::I64(_) => FieldType::I64,
            Self::F64(_) => FieldType::F64,
        }
    }

    #[must_use]
    pub fn as_f64(self) -> f64 {
        match self {
            Self::U8(v) => f64::from(v),
            Self::U16(v) => f64::from(v),
            Self::U32(v) => f64::from(v),
            Self::I8(v) => f64::from(v),
            Self::I16(v) => f64::from(v),
            Self::I32(v) => f64::from(v),
            Self::F32(v) => f64::from(v),
            Self::U64(v) => v as f64,
            Self::I64(v) => v as f64,
            Self::F64(v) => v,
        }
    }

    #[must_use]
    pub fn as_i128(self) -> i128 {
        match self {
            Self::U8(v) => i128::from(v),
            Self::U16(v) => i128::from(v),
            Self::U32(v) => i128::from(v),
            Self::I8(v) => i128::from(v),
            Self::I16(v) => i128::from(v),
            Self::I32(v) => i128::from(v),
            Self::F32(v) => v as i128,
            Self::U64(v) => i128::from(v),
            Self::I64(v) => i128::from(v),
            Self::F64(v) => v as i128,
        }
    }

    /// Converts the value to the given column type with `as`-cast semantics.
    #[must_use]
    pub fn cast(self, ty: FieldType) -> Self {
        if self.field_type() == ty {
            return self;
        }
        let int = self.as_i128();
        match ty {
            FieldType::U8 => Self::U8(int as u8),
            FieldType::U16 => Self::U16(int as u16),
            FieldType::U32 => Self::U32(int as u32),
            FieldType::I8 => Self::I8(int as i8),
            FieldType::I16 => Self::I16(int as i16),
            FieldType::I32 => Self::I32(int as i32),
            FieldType::U64 => Self::U64(int as u64),
            FieldType::I64 => Self::I64(int as i64),
            FieldType::F32 => Self::F32(self.as_f64() as f32),
            FieldType::F64 => Self::F64(self.as_f64()),
        }
    }

    fn write_le(self, out: &mut [u8]) {
        match self {
            Self::U8(v) => out.copy_from_slice(&v.to_le_bytes()),
            Self::U16(v) => out.copy_from_slice(&v.to_le_bytes()),
            Self::U32(v) => out.copy_from_slice(&v.to_le_bytes()),
            Self::I8(v) => out.copy_from_slice(&v.to_le_bytes()),
            Self::I16(v) => out.copy_from_slice(&v.to_le_bytes()),
            Self::I32(v) => out.copy_from_slice(&v.to_le_bytes()),
            Self::F32(v) => out.copy_from_slice(&v.to_le_bytes()),
            Self::U64(v) => out.copy_from_slice(&v.to_le_bytes()),
            Self::I64(v) => out.copy_from_slice(&v.to_le_bytes()),
            Self::F64(v) => out.copy_from_slice(&v.to_le_bytes()),
        }
    }

    fn read_le(ty: FieldType, bytes: &[u8]) -> Self {
        macro_rules! read {
            ($variant:ident, $t:ty, $n:expr) => {{
                let mut buf = [0u8; $n];
                buf.copy_from_slice(bytes);
                Self::$variant(<$t>::from_le_bytes(buf))
            }};
        }
        match ty {
            FieldType::U8 => read!(U8, u8, 1),
            FieldType::U16 => read!(U16, u16, 2),
            FieldType::U32 => read!(U32, u32, 4),
            FieldType::I8 => read!(I8, i8, 1),
            FieldType::I16 => read!(I16, i16, 2),
            FieldType::I32 => read!(I32, i32, 4),
            FieldType::F32 => read!(F32, f32, 4),
            FieldType::U64 => read!(U64, u64, 8),
            FieldType::I64 => read!(I64, i64, 8),
            FieldType::F64 => read!(F64, f64, 8),
        }
    }
}

/// Rust scalar types that map one-to-one onto a [`FieldType`].
pub trait PackedScalar: Copy {
    const TYPE: FieldType;
    fn into_value(self) -> FieldValue;
    fn from_value(value: FieldValue) -> Option<Self>;
}

macro_rules! packed_scalar {
    ($t:ty, $variant:ident) => {
        impl PackedScalar for $t {
            const TYPE: FieldType = FieldType::$variant;

            fn into_value(self) -> FieldValue {
                FieldValue::$variant(self)
            }

            fn from_value(value: FieldValue) -> Option<Self> {
                match value {
                    FieldValue::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }

        impl From<$t> for FieldValue {
            fn from(value: $t) -> Self {
                FieldValue::$variant(value)
            }
        }
    };
}

packed_scalar!(u8, U8);
packed_scalar!(u16, U16);
packed_scalar!(u32, U32);
packed_scalar!(i8, I8);
packed_scalar!(i16, I16);
packed_scalar!(i32, I32);
packed_scalar!(f32, F32);
packed_scalar!(u64, U64);
packed_scalar!(i64, I64);
packed_scalar!(f64, F64);

/// Errors raised when reloading a persisted buffer.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PackedArrayError {
    #[error("buffer of {len} bytes is not a multiple of the record stride {stride}")]
    MisalignedBuffer { len: usize, stride: usize },
    #[error("layout has zero stride")]
    EmptyLayout,
}

/// Growable record table over one byte buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct PackedArray {
    layout: Arc<PackedLayout>,
    data: Vec<u8>,
    len: usize,
    growth: f64,
}

impl PackedArray {
    /// Default capacity growth factor used by [`allocate`](Self::allocate).
    pub const DEFAULT_GROWTH: f64 = 1.5;

    #[must_use]
    pub fn new(layout: PackedLayout) -> Self {
        Self::with_growth(layout, Self::DEFAULT_GROWTH)
    }

    /// Creates an empty table whose capacity grows by `growth` (clamped to ≥ 1).
    #[must_use]
    pub fn with_growth(layout: PackedLayout, growth: f64) -> Self {
        Self {
            layout: Arc::new(layout),
            data: Vec::new(),
            len: 0,
            growth: if growth.is_finite() { growth.max(1.0) } else { 1.0 },
        }
    }

    /// Reloads a table from bytes produced by [`as_bytes`](Self::as_bytes).
    pub fn from_bytes(layout: PackedLayout, bytes: &[u8]) -> Result<Self, PackedArrayError> {
        let stride = layout.stride();
        if stride == 0 {
            return Err(PackedArrayError::EmptyLayout);
        }
        if bytes.len() % stride != 0 {
            return Err(PackedArrayError::MisalignedBuffer {
                len: bytes.len(),
                stride,
            });
        }
        let mut array = Self::new(layout);
        array.data = bytes.to_vec();
        array.len = bytes.len() / stride;
        Ok(array)
    }

    #[must_use]
    pub fn layout(&self) -> &PackedLayout {
        &self.layout
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of records that fit without reallocating.
    #[must_use]
    pub fn capacity(&self) -> usize {
        match self.layout.stride() {
            0 => 0,
            stride => self.data.len() / stride,
        }
    }

    /// Ensures room for `n` records, growing the capacity by at least the
    /// growth factor. Existing bytes are preserved; the length is unchanged.
    pub fn allocate(&mut self, n: usize) {
        let capacity = self.capacity();
        if n <= capacity {
            return;
        }
        let grown = (capacity as f64 * self.growth).ceil() as usize;
        let target = n.max(grown);
        self.data.resize(target * self.layout.stride(), 0);
    }

    /// Sets the number of records; new records are zero-filled.
    pub fn resize(&mut self, len: usize) {
        self.allocate(len);
        if len > self.len {
            let stride = self.layout.stride();
            self.data[self.len * stride..len * stride].fill(0);
        }
        self.len = len;
    }

    /// Drops every record from `len` on.
    pub fn truncate(&mut self, len: usize) {
        if len < self.len {
            self.len = len;
        }
    }

    /// Appends a zeroed record and returns its index.
    pub fn push_default(&mut self) -> usize {
        let index = self.len;
        self.resize(index + 1);
        index
    }

    /// Appends a record given one value per column (cast to the column types).
    ///
    /// # Panics
    /// Panics if the number of values does not match the number of columns.
    pub fn push(&mut self, record: &[FieldValue]) -> usize {
        let index = self.push_default();
        self.write_record(index, record);
        index
    }

    /// Resolves a possibly negative index (counted from the end).
    ///
    /// # Panics
    /// Panics when the index is out of bounds.
    #[must_use]
    pub fn resolve(&self, index: isize) -> usize {
        let resolved = if index < 0 {
            self.len as isize + index
        } else {
            index
        };
        assert!(
            resolved >= 0 && (resolved as usize) < self.len,
            "packed index {index} out of bounds (len {})",
            self.len
        );
        resolved as usize
    }

    fn slot(&self, index: usize, field: FieldId) -> std::ops::Range<usize> {
        let start = index * self.layout.stride() + self.layout.offset(field);
        start..start + self.layout.field_type(field).width()
    }

    /// Writes `value`, cast to the column type.
    pub fn set(&mut self, index: isize, field: FieldId, value: impl Into<FieldValue>) {
        let index = self.resolve(index);
        let value = value.into().cast(self.layout.field_type(field));
        let range = self.slot(index, field);
        value.write_le(&mut self.data[range]);
    }

    /// Reads a column value with its stored type.
    #[must_use]
    pub fn get_value(&self, index: isize, field: FieldId) -> FieldValue {
        let index = self.resolve(index);
        let range = self.slot(index, field);
        FieldValue::read_le(self.layout.field_type(field), &self.data[range])
    }

    /// Reads a column value as `T`.
    ///
    /// # Panics
    /// Panics if `T` does not match the column type.
    #[must_use]
    pub fn get<T: PackedScalar>(&self, index: isize, field: FieldId) -> T {
        let value = self.get_value(index, field);
        match T::from_value(value) {
            Some(v) => v,
            None => panic!(
                "column `{}` holds {:?}, not {:?}",
                self.layout.field_name(field),
                value.field_type(),
                T::TYPE
            ),
        }
    }

    /// All column values of one record.
    #[must_use]
    pub fn record(&self, index: isize) -> Vec<FieldValue> {
        (0..self.layout.field_count())
            .map(|f| self.get_value(index, FieldId(f)))
            .collect()
    }

    fn write_record(&mut self, index: usize, record: &[FieldValue]) {
        assert_eq!(
            record.len(),
            self.layout.field_count(),
            "record has {} values for {} columns",
            record.len(),
            self.layout.field_count()
        );
        for (f, value) in record.iter().enumerate() {
            self.set(index as isize, FieldId(f), *value);
        }
    }

    /// Removes `delete` records at `index` and inserts `insert` in their place,
    /// moving the tail as one byte block.
    pub fn splice(&mut self, index: isize, delete: usize, insert: &[Vec<FieldValue>]) {
        let start = if index == self.len as isize {
            self.len
        } else {
            self.resolve(index)
        };
        assert!(
            start + delete <= self.len,
            "splice of {delete} records at {start} exceeds len {}",
            self.len
        );
        let stride = self.layout.stride();
        let old_len = self.len;
        let new_len = old_len - delete + insert.len();
        let tail_src = (start + delete) * stride..old_len * stride;
        let tail_dst = (start + insert.len()) * stride;
        if new_len > old_len {
            self.allocate(new_len);
        }
        self.data.copy_within(tail_src, tail_dst);
        self.len = new_len;
        for (k, record) in insert.iter().enumerate() {
            let row = start + k;
            self.data[row * stride..(row + 1) * stride].fill(0);
            self.write_record(row, record);
        }
    }

    /// Sets one column of every record to `value`.
    pub fn fill(&mut self, field: FieldId, value: impl Into<FieldValue>) {
        let value = value.into();
        self.fill_with(field, |_| value);
    }

    /// Sets one column of every record from a function of the record index.
    pub fn fill_with(&mut self, field: FieldId, mut f: impl FnMut(usize) -> FieldValue) {
        for i in 0..self.len {
            let value = f(i);
            self.set(i as isize, field, value);
        }
    }

    /// Overwrites every record with the same tuple of values.
    pub fn fill_records(&mut self, record: &[FieldValue]) {
        for i in 0..self.len {
            self.write_record(i, record);
        }
    }

    /// Bytes of the live records (`len * stride`).
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len * self.layout.stride()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> PackedLayout {
        PackedLayout::new(&[
            ("a", FieldType::U8),
            ("b", FieldType::I16),
            ("c", FieldType::F32),
            ("d", FieldType::F64),
        ])
    }

    #[test]
    fn stride_packs_without_padding() {
        assert_eq!(layout().stride(), 1 + 2 + 4 + 8);
    }

    #[test]
    fn negative_indices_count_from_end() {
        let layout = layout();
        let b = layout.field("b").unwrap();
        let mut array = PackedArray::new(layout);
        for i in 0..4i16 {
            let row = array.push_default();
            array.set(row as isize, b, i * 10);
        }
        assert_eq!(array.get::<i16>(-1, b), 30);
        assert_eq!(array.get::<i16>(-4, b), 0);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn out_of_bounds_is_fatal() {
        let layout = layout();
        let a = layout.field("a").unwrap();
        let array = PackedArray::new(layout);
        let _ = array.get_value(0, a);
    }

    #[test]
    fn allocate_preserves_bytes_and_grows_by_factor() {
        let layout = layout();
        let d = layout.field("d").unwrap();
        let mut array = PackedArray::with_growth(layout, 2.0);
        array.resize(3);
        array.set(2, d, 7.25f64);
        array.allocate(4);
        assert!(array.capacity() >= 6);
        assert_eq!(array.len(), 3);
        assert_eq!(array.get::<f64>(2, d), 7.25);
    }

    #[test]
    fn splice_moves_tail_block() {
        let layout = layout();
        let b = layout.field("b").unwrap();
        let mut array = PackedArray::new(layout);
        for i in 0..5i16 {
            let row = array.push_default();
            array.set(row as isize, b, i);
        }
        let inserted = vec![
            FieldValue::U8(0),
            FieldValue::I16(100),
            FieldValue::F32(0.0),
            FieldValue::F64(0.0),
        ];
        array.splice(1, 2, &[inserted.clone(), inserted]);
        let values: Vec<i16> = (0..array.len() as isize).map(|i| array.get(i, b)).collect();
        assert_eq!(values, vec![0, 100, 100, 3, 4]);

        array.splice(-1, 1, &[]);
        assert_eq!(array.len(), 4);
    }

    #[test]
    fn fill_variants() {
        let layout = layout();
        let a = layout.field("a").unwrap();
        let c = layout.field("c").unwrap();
        let mut array = PackedArray::new(layout);
        array.resize(3);
        array.fill(a, 9u8);
        array.fill_with(c, |i| FieldValue::F32(i as f32 * 0.5));
        assert_eq!(array.get::<u8>(1, a), 9);
        assert_eq!(array.get::<f32>(2, c), 1.0);

        array.fill_records(&[
            FieldValue::U8(1),
            FieldValue::I16(-2),
            FieldValue::F32(3.0),
            FieldValue::F64(4.0),
        ]);
        assert_eq!(array.record(0), array.record(2));
    }

    #[test]
    fn set_casts_to_column_type() {
        let layout = layout();
        let a = layout.field("a").unwrap();
        let mut array = PackedArray::new(layout);
        array.push_default();
        array.set(0, a, 200u32);
        assert_eq!(array.get::<u8>(0, a), 200);
    }

    #[test]
    fn from_bytes_rejects_misaligned_buffers() {
        let err = PackedArray::from_bytes(layout(), &[0u8; 16]).unwrap_err();
        assert_eq!(err, PackedArrayError::MisalignedBuffer { len: 16, stride: 15 });
    }

    proptest::proptest! {
        #[test]
        fn persisted_records_reload_byte_exactly(
            rows in proptest::collection::vec((0u8..=255, -500i16..500, -1e3f32..1e3, -1e6f64..1e6), 0..40),
        ) {
            let layout = layout();
            let mut array = PackedArray::new(layout.clone());
            for &(a, b, c, d) in &rows {
                array.push(&[FieldValue::U8(a), FieldValue::I16(b), FieldValue::F32(c), FieldValue::F64(d)]);
            }
            let reloaded = PackedArray::from_bytes(layout, array.as_bytes()).unwrap();
            proptest::prop_assert_eq!(reloaded.len(), rows.len());
            proptest::prop_assert_eq!(reloaded.as_bytes(), array.as_bytes());
        }
    }
}
