use serde::{Deserialize, Serialize};

/// Configuration of the table storage layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StorageOptions {
    /// Number of handles a [`MemAllocator`](crate::MemAllocator) reserves per refill.
    ///
    /// Value must be greater than zero.
    ///
    /// Default: 1000
    #[serde(default = "StorageOptions::default_alloc_step")]
    pub alloc_step: u64,
    /// Whether a `NULL` value of a column without default is left out of storage on insert.
    /// A missing key reads back as `NULL`.
    ///
    /// Default: true
    #[serde(default = "StorageOptions::default_skip_null_columns")]
    pub skip_null_columns: bool,
    /// Whether a missing key of a column or index that is not public
    /// is ignored when deleting it.
    ///
    /// Such keys are expected to be missing while a schema change is in flight.
    /// Disable to surface them as errors.
    ///
    /// Default: true
    #[serde(default = "StorageOptions::default_tolerate_missing_non_public")]
    pub tolerate_missing_non_public: bool,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl StorageOptions {
    const DEFAULT_ALLOC_STEP: u64 = 1000;

    pub const DEFAULT: Self = Self {
        alloc_step: Self::DEFAULT_ALLOC_STEP,
        skip_null_columns: true,
        tolerate_missing_non_public: true,
    };

    const fn default_alloc_step() -> u64 {
        Self::DEFAULT_ALLOC_STEP
    }

    const fn default_skip_null_columns() -> bool {
        Self::DEFAULT.skip_null_columns
    }

    const fn default_tolerate_missing_non_public() -> bool {
        Self::DEFAULT.tolerate_missing_non_public
    }
}
