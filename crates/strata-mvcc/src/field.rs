//! Typed column accessors.
//!
//! A [`Field`] reads, writes and compares one column of a fixed-shape
//! record. Tables register their fields once before the schema is frozen;
//! indexes and foreign keys are declared against fields.

use std::cmp::Ordering;
use std::fmt::{self, Debug};
use std::hash::Hash;

/// Bound for records stored in a row store.
pub trait Record: Clone + Default + PartialEq + Send + Sync + 'static {}

impl<T> Record for T where T: Clone + Default + PartialEq + Send + Sync + 'static {}

/// Bound for values held by one column.
pub trait FieldValue: Clone + Eq + Ord + Hash + Debug + Default + Send + Sync + 'static {}

impl<T> FieldValue for T where T: Clone + Eq + Ord + Hash + Debug + Default + Send + Sync + 'static {}

/// Accessor for one column of record type `R`.
pub trait Field<R>: Send + Sync + 'static {
    /// The column's value type.
    type Value: FieldValue;

    /// Column name, unique within its table.
    fn name(&self) -> &str;

    /// Column position, unique within its table.
    fn ordinal(&self) -> usize;

    /// Reads the column.
    fn get(&self, record: &R) -> Self::Value;

    /// Writes the column.
    fn set(&self, record: &mut R, value: Self::Value);

    /// Compares two records by this column.
    fn compare(&self, a: &R, b: &R) -> Ordering {
        self.get(a).cmp(&self.get(b))
    }

    /// Value a `SetDefault` foreign key writes, and the value a foreign key
    /// with `allow_default` accepts without a parent.
    fn default_value(&self) -> Self::Value {
        Self::Value::default()
    }

    /// Ordinals of the columns this field reads.
    ///
    /// A plain column reads only itself. A derived field (for example a
    /// composite key) lists every column it depends on, so updates to any of
    /// them maintain indexes built over it.
    fn columns(&self) -> Vec<usize> {
        vec![self.ordinal()]
    }
}

/// A [`Field`] built from plain accessor functions.
///
/// # Example
///
/// ```rust
/// use strata_mvcc::{Column, Field};
///
/// #[derive(Clone, Default, PartialEq)]
/// struct Person {
///     id: i64,
///     name: String,
/// }
///
/// let name = Column::new("Name", 1, |p: &Person| p.name.clone(), |p, v| p.name = v);
/// let mut ann = Person { id: 1, name: "Ann".into() };
/// assert_eq!(name.get(&ann), "Ann");
/// name.set(&mut ann, "Anna".into());
/// assert_eq!(ann.name, "Anna");
/// ```
pub struct Column<R, V> {
    name: &'static str,
    ordinal: usize,
    getter: fn(&R) -> V,
    setter: fn(&mut R, V),
    default: V,
}

impl<R, V: FieldValue> Column<R, V> {
    /// Creates a column whose default is `V::default()`.
    pub fn new(name: &'static str, ordinal: usize, getter: fn(&R) -> V, setter: fn(&mut R, V)) -> Self {
        Self {
            name,
            ordinal,
            getter,
            setter,
            default: V::default(),
        }
    }

    /// Replaces the column's default value.
    #[must_use]
    pub fn with_default(mut self, default: V) -> Self {
        self.default = default;
        self
    }
}

impl<R, V: Clone> Clone for Column<R, V> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            ordinal: self.ordinal,
            getter: self.getter,
            setter: self.setter,
            default: self.default.clone(),
        }
    }
}

impl<R, V: Debug> Debug for Column<R, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Column")
            .field("name", &self.name)
            .field("ordinal", &self.ordinal)
            .field("default", &self.default)
            .finish()
    }
}

impl<R, V> Field<R> for Column<R, V>
where
    R: 'static,
    V: FieldValue,
{
    type Value = V;

    fn name(&self) -> &str {
        self.name
    }

    fn ordinal(&self) -> usize {
        self.ordinal
    }

    fn get(&self, record: &R) -> V {
        (self.getter)(record)
    }

    fn set(&self, record: &mut R, value: V) {
        (self.setter)(record, value);
    }

    fn default_value(&self) -> V {
        self.default.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default, PartialEq, Debug)]
    struct Pin {
        x: i32,
        y: i32,
        label: String,
    }

    /// Composite (x, y) key derived from two columns.
    struct Position;

    impl Field<Pin> for Position {
        type Value = (i32, i32);

        fn name(&self) -> &str {
            "Position"
        }

        fn ordinal(&self) -> usize {
            0
        }

        fn get(&self, record: &Pin) -> (i32, i32) {
            (record.x, record.y)
        }

        fn set(&self, record: &mut Pin, value: (i32, i32)) {
            record.x = value.0;
            record.y = value.1;
        }

        fn columns(&self) -> Vec<usize> {
            vec![0, 1]
        }
    }

    #[test]
    fn test_column_accessors() {
        let label = Column::new("Label", 2, |p: &Pin| p.label.clone(), |p, v| p.label = v);
        let mut pin = Pin::default();
        label.set(&mut pin, "in".into());
        assert_eq!(label.get(&pin), "in");
        assert_eq!(label.name(), "Label");
        assert_eq!(label.columns(), vec![2]);
    }

    #[test]
    fn test_compare_and_default() {
        let x = Column::new("X", 0, |p: &Pin| p.x, |p, v| p.x = v).with_default(-1);
        let a = Pin { x: 1, ..Pin::default() };
        let b = Pin { x: 5, ..Pin::default() };
        assert_eq!(x.compare(&a, &b), Ordering::Less);
        assert_eq!(x.default_value(), -1);
    }

    #[test]
    fn test_composite_field() {
        let mut pin = Pin::default();
        Position.set(&mut pin, (3, 4));
        assert_eq!(Position.get(&pin), (3, 4));
        assert_eq!(Position.columns(), vec![0, 1]);
        assert_eq!(Position.default_value(), (0, 0));
    }
}
