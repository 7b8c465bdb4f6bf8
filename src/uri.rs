use crate::error::{Result, SpatialiteError};
use std::path::PathBuf;
use std::str::FromStr;

/// Parsed form of a SpatiaLite data source URI.
///
/// The textual form is
/// `<dbfile>|table=<t>|geometrycolumn=<g>|key=<k>|sql=<subset>`, with `key`
/// and `sql` optional. The `sql` entry, when present, must come last: it is
/// taken verbatim up to the end of the string so the subset may itself
/// contain `|`.
#[derive(Clone, Debug, PartialEq)]
pub struct SpatialiteUri {
    pub database: PathBuf,
    pub table: String,
    pub geometry_column: String,
    pub key: Option<String>,
    pub sql: Option<String>,
}

impl SpatialiteUri {
    pub fn parse(uri: &str) -> Result<Self> {
        let mut segments = uri.split('|');

        let database = segments
            .next()
            .filter(|db| !db.is_empty())
            .ok_or_else(|| SpatialiteError::InvalidUri("missing database path".to_string()))?;

        let mut table = None;
        let mut geometry_column = None;
        let mut key = None;
        let mut sql = None;

        while let Some(segment) = segments.next() {
            if let Some(value) = segment.strip_prefix("table=") {
                table = Some(value.to_string());
            } else if let Some(value) = segment.strip_prefix("geometrycolumn=") {
                geometry_column = Some(value.to_string());
            } else if let Some(value) = segment.strip_prefix("key=") {
                key = Some(value.to_string());
            } else if let Some(value) = segment.strip_prefix("sql=") {
                // The subset clause runs to the end of the URI.
                let mut subset = value.to_string();
                for rest in segments.by_ref() {
                    subset.push('|');
                    subset.push_str(rest);
                }
                sql = Some(subset);
            } else {
                return Err(SpatialiteError::InvalidUri(format!(
                    "unrecognized uri segment: {segment}"
                )));
            }
        }

        let table = table
            .filter(|t| !t.is_empty())
            .ok_or_else(|| SpatialiteError::InvalidUri("missing table".to_string()))?;
        let geometry_column = geometry_column
            .filter(|g| !g.is_empty())
            .ok_or_else(|| SpatialiteError::InvalidUri("missing geometrycolumn".to_string()))?;

        Ok(Self {
            database: PathBuf::from(database),
            table,
            geometry_column,
            key,
            sql: sql.filter(|s| !s.is_empty()),
        })
    }

    pub fn to_uri_string(&self) -> String {
        let mut uri = format!(
            "{}|table={}|geometrycolumn={}",
            self.database.display(),
            self.table,
            self.geometry_column
        );
        if let Some(key) = &self.key {
            uri.push_str("|key=");
            uri.push_str(key);
        }
        if let Some(sql) = &self.sql {
            uri.push_str("|sql=");
            uri.push_str(sql);
        }
        uri
    }
}

impl FromStr for SpatialiteUri {
    type Err = SpatialiteError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
