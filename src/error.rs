use std::error::Error;
use std::fmt;
use std::path::PathBuf;

/// Crate error type for SpatiaLite provider operations.
#[derive(Debug)]
pub enum SpatialiteError {
    /// Wraps errors returned by `rusqlite`.
    Sql(rusqlite::Error),
    /// Wraps errors returned by the `wkb` crate.
    Wkb(wkb::error::WkbError),
    /// A required field is missing from the data source URI.
    InvalidUri(String),
    /// The file could not be opened as a SpatiaLite database.
    DbOpenFailed {
        path: PathBuf,
        reason: String,
    },
    /// Layer classification is ambiguous, or the spatial catalogs reject the layer.
    LayerInvalid(String),
    /// A WKB blob is shorter than the 5-byte endian-and-tag header.
    WkbTooShort {
        len: usize,
    },
    /// The WKB geometry tag belongs to neither dialect.
    UnknownWkbTag(u32),
    /// A WKB count field implies more payload than the blob carries.
    TruncatedWkb {
        offset: usize,
        needed: usize,
        len: usize,
    },
    /// Attribute values did not match the layer's field schema.
    AttributeCountMismatch {
        expected: usize,
        got: usize,
    },
    /// A field index is outside the layer's field schema.
    NoSuchField(usize),
    /// A mutation was attempted on a read-only layer.
    ReadOnly,
}

impl SpatialiteError {
    /// True for the malformed-WKB family, which a feature cursor converts
    /// into a null geometry instead of terminating iteration.
    pub fn is_malformed_wkb(&self) -> bool {
        matches!(
            self,
            Self::WkbTooShort { .. } | Self::UnknownWkbTag(_) | Self::TruncatedWkb { .. }
        )
    }
}

impl fmt::Display for SpatialiteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sql(err) => write!(f, "{err}"),
            Self::Wkb(err) => write!(f, "{err}"),
            Self::InvalidUri(reason) => write!(f, "invalid data source uri: {reason}"),
            Self::DbOpenFailed { path, reason } => {
                write!(f, "failed to open {}: {reason}", path.display())
            }
            Self::LayerInvalid(reason) => write!(f, "invalid layer: {reason}"),
            Self::WkbTooShort { len } => {
                write!(f, "wkb blob of {len} bytes is shorter than its header")
            }
            Self::UnknownWkbTag(tag) => write!(f, "unknown wkb geometry tag: {tag}"),
            Self::TruncatedWkb {
                offset,
                needed,
                len,
            } => write!(
                f,
                "truncated wkb: need {needed} bytes at offset {offset}, blob is {len} bytes"
            ),
            Self::AttributeCountMismatch { expected, got } => {
                write!(f, "invalid attribute count: expected {expected}, got {got}")
            }
            Self::NoSuchField(idx) => write!(f, "no field with index {idx}"),
            Self::ReadOnly => write!(f, "operation not allowed on a read-only layer"),
        }
    }
}

impl Error for SpatialiteError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sql(err) => Some(err),
            Self::Wkb(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for SpatialiteError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Sql(err)
    }
}

impl From<wkb::error::WkbError> for SpatialiteError {
    fn from(err: wkb::error::WkbError) -> Self {
        Self::Wkb(err)
    }
}

pub type Result<T> = std::result::Result<T, SpatialiteError>;

#[cfg(test)]
mod tests {
    use super::SpatialiteError;

    #[test]
    fn malformed_wkb_family_is_recognized() {
        assert!(SpatialiteError::WkbTooShort { len: 2 }.is_malformed_wkb());
        assert!(SpatialiteError::UnknownWkbTag(42).is_malformed_wkb());
        assert!(
            SpatialiteError::TruncatedWkb {
                offset: 9,
                needed: 8,
                len: 12,
            }
            .is_malformed_wkb()
        );
        assert!(!SpatialiteError::ReadOnly.is_malformed_wkb());
    }

    #[test]
    fn display_carries_context() {
        let err = SpatialiteError::TruncatedWkb {
            offset: 9,
            needed: 8,
            len: 12,
        };
        assert_eq!(
            err.to_string(),
            "truncated wkb: need 8 bytes at offset 9, blob is 12 bytes"
        );

        let err = SpatialiteError::InvalidUri("missing table".to_string());
        assert_eq!(err.to_string(), "invalid data source uri: missing table");
    }
}
