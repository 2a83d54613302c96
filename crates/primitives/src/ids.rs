//! Provides identifiers such as `TableId`.
use core::fmt;

/// Identifies a table. Also the leading component of every record and index key.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
#[repr(transparent)]
pub struct TableId(pub i64);

/// Identifies a column within a table.
///
/// Column ids are stable across schema versions and are part of the record key,
/// unlike the column offset which only indexes into row-shaped arrays.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
#[repr(transparent)]
pub struct ColId(pub i64);

#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
#[repr(transparent)]
pub struct IndexId(pub i64);

macro_rules! system_id {
    ($name:ident) => {
        impl $name {
            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }
        impl From<i32> for $name {
            fn from(value: i32) -> Self {
                Self(value as i64)
            }
        }
        impl From<u32> for $name {
            fn from(value: u32) -> Self {
                Self(value as i64)
            }
        }
        impl From<$name> for i64 {
            fn from(value: $name) -> Self {
                value.0
            }
        }
        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}
system_id!(TableId);
system_id!(ColId);
system_id!(IndexId);
