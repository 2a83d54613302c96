#![cfg_attr(not(test), no_std)]

mod attr;
mod ids;
mod state;

pub use attr::ColumnFlags;
pub use ids::{ColId, IndexId, TableId};
pub use state::SchemaState;

/// The column id reserved for the row lock / row marker entry of a record.
pub const ROW_LOCK_COL_ID: ColId = ColId(0);
