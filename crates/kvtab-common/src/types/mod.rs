//! Core identity types.

mod ids;
mod table;

pub use ids::HandlerId;
pub use table::{ParseTableNameError, TableName};
