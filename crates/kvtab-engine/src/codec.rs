//! Row codec.
//!
//! Converts between a row and the two byte strings the store protocol
//! carries, using slot positions resolved at open time. Slots other than the
//! key and value are ignored on encode and left untouched on decode.

use bytes::Bytes;

use crate::error::{HandlerError, HandlerResult};
use crate::row::Row;
use crate::schema::SchemaDescriptor;

/// Encodes and decodes rows for one bound table.
#[derive(Debug, Clone)]
pub struct RowCodec {
    descriptor: SchemaDescriptor,
}

impl RowCodec {
    /// Creates a codec for a bound schema.
    pub fn new(descriptor: SchemaDescriptor) -> Self {
        Self { descriptor }
    }

    /// Returns the bound schema.
    pub fn descriptor(&self) -> &SchemaDescriptor {
        &self.descriptor
    }

    /// Extracts the store key and value from a row.
    pub fn encode(&self, row: &Row) -> HandlerResult<(Bytes, Bytes)> {
        let key = self.slot(row, self.descriptor.key_index, &self.descriptor.key_column)?;
        let value = self.slot(row, self.descriptor.value_index, &self.descriptor.value_column)?;
        Ok((key, value))
    }

    fn slot(&self, row: &Row, index: usize, column: &str) -> HandlerResult<Bytes> {
        row.get(index).cloned().ok_or_else(|| HandlerError::NullColumn {
            column: column.to_string(),
        })
    }

    /// Writes a store key and value into a row, both non-NULL.
    pub fn decode(&self, key: Bytes, value: Bytes, row: &mut Row) {
        row.ensure_width(self.descriptor.width);
        row.set(self.descriptor.key_index, Some(key));
        row.set(self.descriptor.value_index, Some(value));
    }
}
