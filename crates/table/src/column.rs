use crate::datum::Datum;
use std::fmt;
use tabula_primitives::{ColId, ColumnFlags, SchemaState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Int,
    Float,
    Varchar,
    Blob,
    Timestamp,
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TypeKind::Int => "int",
            TypeKind::Float => "float",
            TypeKind::Varchar => "varchar",
            TypeKind::Blob => "blob",
            TypeKind::Timestamp => "timestamp",
        })
    }
}

/// The storage type of a column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldType {
    pub tp: TypeKind,
    pub flags: ColumnFlags,
    /// Maximum length of string and blob values. Zero means unbounded.
    pub flen: usize,
}

impl FieldType {
    pub fn new(tp: TypeKind) -> Self {
        Self {
            tp,
            flags: ColumnFlags::empty(),
            flen: 0,
        }
    }

    pub fn with_flags(mut self, flags: ColumnFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn with_flen(mut self, flen: usize) -> Self {
        self.flen = flen;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    Literal(Datum),
    /// Evaluated to the current time when used.
    CurrentTimestamp,
}

/// The schema of one column, as of one schema version.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    /// Stable identifier, part of the record key. Never 0, which is the row lock.
    pub id: ColId,
    pub name: Box<str>,
    /// Position of the column's value in row-shaped slices.
    pub offset: usize,
    pub field_type: FieldType,
    pub state: SchemaState,
    pub default_value: Option<DefaultValue>,
}

impl ColumnInfo {
    /// A public column without default.
    pub fn new(id: impl Into<ColId>, name: &str, offset: usize, field_type: FieldType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            offset,
            field_type,
            state: SchemaState::Public,
            default_value: None,
        }
    }

    pub fn with_state(mut self, state: SchemaState) -> Self {
        self.state = state;
        self
    }

    pub fn with_default(mut self, default_value: DefaultValue) -> Self {
        self.default_value = Some(default_value);
        self
    }

    pub fn flags(&self) -> ColumnFlags {
        self.field_type.flags
    }

    pub fn is_not_null(&self) -> bool {
        self.flags().has_not_null()
    }

    /// The value of this column in a row that has no stored key for it.
    ///
    /// A literal default wins, so that rows written before the column was added read back its default.
    /// Otherwise a not-null column reads as its type's zero value and a nullable one as `NULL`.
    pub fn missing_value(&self) -> crate::Result<Datum> {
        match &self.default_value {
            Some(DefaultValue::Literal(d)) => d.convert_to(&self.field_type),
            _ if self.is_not_null() => Ok(Datum::zero(&self.field_type)),
            _ => Ok(Datum::Null),
        }
    }
}

/// Returns the columns of `cols` that are set to the current time on update.
pub fn find_on_update_cols(cols: &[ColumnInfo]) -> impl Iterator<Item = &ColumnInfo> {
    cols.iter().filter(|c| c.flags().has_on_update_now())
}

/// Finds a column by name, ignoring ASCII case.
pub fn find_col<'a>(cols: &'a [ColumnInfo], name: &str) -> Option<&'a ColumnInfo> {
    cols.iter().find(|c| c.name.eq_ignore_ascii_case(name))
}
