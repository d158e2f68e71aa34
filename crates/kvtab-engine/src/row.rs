//! Row buffers.

use bytes::Bytes;

/// One row as a vector of slots aligned with the table schema. `None` is
/// SQL NULL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    slots: Vec<Option<Bytes>>,
}

impl Row {
    /// Creates a row of `width` NULL slots.
    pub fn new(width: usize) -> Self {
        Self {
            slots: vec![None; width],
        }
    }

    /// Creates a two-slot row holding a key and a value.
    pub fn key_value(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            slots: vec![Some(key.into()), Some(value.into())],
        }
    }

    /// Returns the value in a slot, or `None` if it is NULL or out of range.
    pub fn get(&self, index: usize) -> Option<&Bytes> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// Sets a slot, growing the row if needed.
    pub fn set(&mut self, index: usize, value: Option<Bytes>) {
        if index >= self.slots.len() {
            self.slots.resize(index + 1, None);
        }
        self.slots[index] = value;
    }

    /// Returns true if a slot is NULL.
    pub fn is_null(&self, index: usize) -> bool {
        self.get(index).is_none()
    }

    /// Returns the number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if the row has no slots.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Returns the slots.
    pub fn slots(&self) -> &[Option<Bytes>] {
        &self.slots
    }

    /// Grows the row to at least `width` slots.
    pub(crate) fn ensure_width(&mut self, width: usize) {
        if self.slots.len() < width {
            self.slots.resize(width, None);
        }
    }
}

impl From<Vec<Option<Bytes>>> for Row {
    fn from(slots: Vec<Option<Bytes>>) -> Self {
        Self { slots }
    }
}
