use crate::column::{FieldType, TypeKind};
use crate::error::TableError;
use crate::Result;
use chrono::{DateTime, NaiveDateTime};
use derive_more::From;
use std::fmt;

/// A point in time, as microseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, From)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub const UNIX_EPOCH: Self = Self(0);

    const FORMAT: &'static str = "%Y-%m-%d %H:%M:%S%.6f";

    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp_micros())
    }

    /// Parses `YYYY-MM-DD HH:MM:SS[.ffffff]`, interpreted as UTC.
    pub fn parse(s: &str) -> Option<Self> {
        NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%d %H:%M:%S%.f")
            .ok()
            .map(|t| Self(t.and_utc().timestamp_micros()))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match DateTime::from_timestamp_micros(self.0) {
            Some(t) => write!(f, "{}", t.format(Self::FORMAT)),
            None => write!(f, "{}", self.0),
        }
    }
}

/// A single column value.
///
/// Values are kept in the representation of their column type:
/// unsigned integer columns hold `Uint`, string columns hold `String`, and so on.
/// See [`Datum::convert_to`] for coercion into a column type.
#[derive(Debug, Clone, PartialEq, From)]
pub enum Datum {
    #[from(ignore)]
    Null,
    Int(i64),
    Uint(u64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    Time(Timestamp),
}

impl From<i32> for Datum {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<&str> for Datum {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl<T: Into<Datum>> From<Option<T>> for Datum {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl Datum {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The name of the variant, for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Int(_) => "int",
            Self::Uint(_) => "unsigned int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::Time(_) => "timestamp",
        }
    }

    /// The value a not-null column takes when nothing better is known.
    pub fn zero(ft: &FieldType) -> Self {
        match ft.tp {
            TypeKind::Int if ft.flags.has_unsigned() => Self::Uint(0),
            TypeKind::Int => Self::Int(0),
            TypeKind::Float => Self::Float(0.0),
            TypeKind::Varchar => Self::String(String::new()),
            TypeKind::Blob => Self::Bytes(Vec::new()),
            TypeKind::Timestamp => Self::Time(Timestamp::UNIX_EPOCH),
        }
    }

    /// Coerces `self` into the representation of a column of type `ft`.
    ///
    /// `NULL` converts to `NULL` for every type; nullability is checked by the caller.
    pub fn convert_to(&self, ft: &FieldType) -> Result<Datum> {
        let cast_err = || TableError::Cast {
            value: self.to_string(),
            to: ft.tp,
        };
        let converted = match (ft.tp, self) {
            (_, Self::Null) => Self::Null,

            (TypeKind::Int, _) => {
                let wide: i128 = match self {
                    Self::Int(i) => (*i).into(),
                    Self::Uint(u) => (*u).into(),
                    Self::Float(f) if f.is_finite() => f.round() as i128,
                    Self::String(s) => s.trim().parse().map_err(|_| cast_err())?,
                    Self::Time(t) => t.0.into(),
                    _ => return Err(cast_err()),
                };
                if ft.flags.has_unsigned() {
                    Self::Uint(u64::try_from(wide).map_err(|_| cast_err())?)
                } else {
                    Self::Int(i64::try_from(wide).map_err(|_| cast_err())?)
                }
            }

            (TypeKind::Float, Self::Int(i)) => Self::Float(*i as f64),
            (TypeKind::Float, Self::Uint(u)) => Self::Float(*u as f64),
            (TypeKind::Float, Self::Float(f)) => Self::Float(*f),
            (TypeKind::Float, Self::String(s)) => Self::Float(s.trim().parse().map_err(|_| cast_err())?),
            (TypeKind::Float, _) => return Err(cast_err()),

            (TypeKind::Varchar, Self::Bytes(b)) => {
                Self::String(String::from_utf8(b.clone()).map_err(|_| cast_err())?)
            }
            (TypeKind::Varchar, v) => Self::String(v.to_string()),

            (TypeKind::Blob, Self::Bytes(b)) => Self::Bytes(b.clone()),
            (TypeKind::Blob, Self::String(s)) => Self::Bytes(s.clone().into_bytes()),
            (TypeKind::Blob, v) => Self::Bytes(v.to_string().into_bytes()),

            (TypeKind::Timestamp, Self::Time(t)) => Self::Time(*t),
            (TypeKind::Timestamp, Self::Int(i)) => Self::Time(Timestamp(*i)),
            (TypeKind::Timestamp, Self::String(s)) => Self::Time(Timestamp::parse(s).ok_or_else(cast_err)?),
            (TypeKind::Timestamp, _) => return Err(cast_err()),
        };

        if ft.flen > 0 {
            let len = match &converted {
                Self::String(s) => s.chars().count(),
                Self::Bytes(b) => b.len(),
                _ => 0,
            };
            if len > ft.flen {
                return Err(cast_err());
            }
        }
        Ok(converted)
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Uint(u) => write!(f, "{u}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => f.write_str(s),
            Self::Bytes(b) => f.write_str(&String::from_utf8_lossy(b)),
            Self::Time(t) => write!(f, "{t}"),
        }
    }
}
