use core::fmt;

/// The online schema-change phase of a table, column or index.
///
/// A new element walks `None -> DeleteOnly -> WriteOnly -> WriteReorganization -> Public`
/// and a dropped one walks back `Public -> WriteOnly -> DeleteOnly -> DeleteReorganization -> None`.
/// Neighbouring schema versions may be live at the same time,
/// so every state must stay correct against readers and writers in the adjacent states.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, Default)]
pub enum SchemaState {
    /// Not part of the schema. Never loaded into a table.
    #[default]
    None,
    /// Deleted from storage, but not written nor read.
    DeleteOnly,
    /// Written (with its default) and deleted, but not read.
    WriteOnly,
    /// As `WriteOnly`, while existing data is being backfilled.
    WriteReorganization,
    /// As `DeleteOnly`, while existing data is being removed.
    DeleteReorganization,
    /// Fully visible.
    Public,
}

impl SchemaState {
    pub const fn is_public(self) -> bool {
        matches!(self, SchemaState::Public)
    }

    /// Whether writers must maintain the element.
    pub const fn is_writable(self) -> bool {
        !matches!(
            self,
            SchemaState::None | SchemaState::DeleteOnly | SchemaState::DeleteReorganization
        )
    }

    /// `WriteOnly` and `WriteReorganization`: written, but invisible to readers.
    pub const fn is_write_only(self) -> bool {
        matches!(self, SchemaState::WriteOnly | SchemaState::WriteReorganization)
    }
}

impl fmt::Display for SchemaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SchemaState::None => "none",
            SchemaState::DeleteOnly => "delete only",
            SchemaState::WriteOnly => "write only",
            SchemaState::WriteReorganization => "write reorganization",
            SchemaState::DeleteReorganization => "delete reorganization",
            SchemaState::Public => "public",
        })
    }
}
