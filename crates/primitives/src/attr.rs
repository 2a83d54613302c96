use bitflags::bitflags;

// Column-level flags of a field type. Index membership is described by the
// index definitions themselves; `PRI_KEY` only matters for the
// primary-key-is-handle check.
bitflags! {
    #[derive(Debug, Clone, Copy, Eq, PartialEq, PartialOrd, Ord, Hash, Default)]
    pub struct ColumnFlags: u16 {
        const UNSET = Self::empty().bits();
        /// The column may not hold `NULL`.
        const NOT_NULL = 0b0000_0001;
        /// Part of the primary key.
        const PRI_KEY = 0b0000_0010;
        /// Integer column interpreted as unsigned.
        const UNSIGNED = 0b0000_1000;
        /// Set to the current timestamp on every update that does not touch it.
        const ON_UPDATE_NOW = 0b0010_0000;
    }
}

impl TryFrom<u16> for ColumnFlags {
    type Error = ();

    fn try_from(v: u16) -> Result<Self, Self::Error> {
        Self::from_bits(v).ok_or(())
    }
}

impl ColumnFlags {
    pub const fn has_not_null(&self) -> bool {
        self.contains(ColumnFlags::NOT_NULL)
    }

    pub const fn has_pri_key(&self) -> bool {
        self.contains(ColumnFlags::PRI_KEY)
    }

    pub const fn has_unsigned(&self) -> bool {
        self.contains(ColumnFlags::UNSIGNED)
    }

    pub const fn has_on_update_now(&self) -> bool {
        self.contains(ColumnFlags::ON_UPDATE_NOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_from_bits() {
        let flags = ColumnFlags::try_from(0b0000_1001u16).unwrap();
        assert!(flags.has_not_null());
        assert!(flags.has_unsigned());
        assert!(!flags.has_pri_key());
        assert!(ColumnFlags::try_from(0b1000_0000_0000_0000u16).is_err());
    }
}
