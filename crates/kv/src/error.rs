use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KvError {
    #[error("Key `{}` does not exist", hex::encode(key))]
    NotExist { key: Vec<u8> },
    /// A key expected to be absent exists.
    ///
    /// The message is chosen by whoever detected or presumed the conflict,
    /// see [`TxnOption::PresumeKeyNotExists`](crate::TxnOption::PresumeKeyNotExists).
    #[error("{0}")]
    KeyExists(Box<str>),
    #[error("Cannot set an empty value for key `{}`", hex::encode(key))]
    EmptyValue { key: Vec<u8> },
    #[error("Write conflict on key `{}`", hex::encode(key))]
    WriteConflict { key: Vec<u8> },
}

impl KvError {
    pub fn not_exist(key: &[u8]) -> Self {
        Self::NotExist { key: key.to_vec() }
    }

    pub fn is_not_exist(&self) -> bool {
        matches!(self, Self::NotExist { .. })
    }

    pub fn is_key_exists(&self) -> bool {
        matches!(self, Self::KeyExists(_))
    }
}
