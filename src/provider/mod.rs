//! The vector data provider surface: layer lifecycle, metadata, feature
//! cursors and the mutation engine.

mod cursor;
mod mutation;

pub use cursor::{Feature, FeatureCursor, FeatureRequest};
pub use mutation::{AttributeChange, NewColumn, NewFeature};

use crate::catalog::{self, LayerKind, SpatialIndexKind};
use crate::conversions::field_type_from_declared;
use crate::error::{Result, SpatialiteError};
use crate::pool::{self, SqliteHandle};
use crate::sql::{
    aggregate_value_sql, distinct_values_sql, quoted_identifier, summary_sql, table_columns_sql,
};
use crate::types::{Field, Rect, capabilities};
use crate::uri::SpatialiteUri;
use rusqlite::types::Value;
use std::rc::Rc;
use wkb::reader::{Dimension, GeometryType};

/// One SpatiaLite layer, opened from a data source URI.
///
/// Example:
/// ```no_run
/// use rusqlite_spatialite::SpatialiteProvider;
///
/// let layer = SpatialiteProvider::open("data/cities.sqlite|table=cities|geometrycolumn=geom")?;
/// for feature in layer.select(&Default::default())? {
///     let feature = feature?;
///     let _id = feature.id();
/// }
/// # Ok::<(), rusqlite_spatialite::SpatialiteError>(())
/// ```
pub struct SpatialiteProvider {
    handle: Option<Rc<SqliteHandle>>,
    table_name: String,
    geometry_column: String,
    primary_key: Option<String>,
    subset: Option<String>,
    kind: LayerKind,
    read_only: bool,
    query_expr: String,
    geometry_type: GeometryType,
    coord_dimension: Dimension,
    srid: i32,
    spatial_index: SpatialIndexKind,
    index_table: String,
    index_geometry: String,
    proj4text: String,
    extent: Option<Rect>,
    feature_count: i64,
    fields: Vec<Field>,
    capabilities: u32,
}

impl SpatialiteProvider {
    /// Open a layer. Classification, geometry metadata, the extent/count
    /// summary and the field schema are all resolved here; a failure at any
    /// stage releases the pooled connection and aborts the open.
    pub fn open(uri: &str) -> Result<Self> {
        let uri = SpatialiteUri::parse(uri)?;
        let handle = pool::open(&uri.database)?;
        Self::build(uri, handle)
    }

    fn build(uri: SpatialiteUri, handle: Rc<SqliteHandle>) -> Result<Self> {
        let source = match catalog::classify(
            handle.conn(),
            &uri.table,
            &uri.geometry_column,
            uri.sql.as_deref(),
        ) {
            Ok(source) => source,
            Err(err) => {
                pool::release(handle);
                return Err(err);
            }
        };

        if source.kind == LayerKind::Query && uri.key.is_none() {
            pool::release(handle);
            return Err(SpatialiteError::InvalidUri(
                "subquery layers require a key= column".to_string(),
            ));
        }

        let mut caps = capabilities::SELECT_AT_ID | capabilities::SELECT_GEOMETRY_AT_ID;
        if source.kind == LayerKind::Table && !source.read_only {
            caps |= capabilities::DELETE_FEATURES
                | capabilities::CHANGE_GEOMETRIES
                | capabilities::CHANGE_ATTRIBUTE_VALUES
                | capabilities::ADD_FEATURES
                | capabilities::ADD_ATTRIBUTES;
        }

        let mut provider = Self {
            handle: Some(handle),
            table_name: uri.table,
            geometry_column: uri.geometry_column,
            primary_key: uri.key,
            subset: uri.sql,
            kind: source.kind,
            read_only: source.read_only,
            query_expr: source.query_expr,
            geometry_type: source.geometry_type,
            coord_dimension: source.coord_dimension,
            srid: source.srid,
            spatial_index: source.spatial_index,
            index_table: source.index_table,
            index_geometry: source.index_geometry,
            proj4text: source.proj4text,
            extent: None,
            feature_count: 0,
            fields: Vec::new(),
            capabilities: caps,
        };
        provider.load_fields()?;
        provider.load_summary()?;
        Ok(provider)
    }

    pub(crate) fn conn(&self) -> &rusqlite::Connection {
        // The handle is vacated only inside Drop.
        self.handle.as_ref().expect("open provider handle").conn()
    }

    pub fn storage_type(&self) -> &'static str {
        "SQLite database with SpatiaLite extension"
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn geometry_column(&self) -> &str {
        &self.geometry_column
    }

    /// The column the layer is keyed by, when one is known. Base tables
    /// without a single-column primary key fall back to ROWID.
    pub fn primary_key(&self) -> Option<&str> {
        self.primary_key.as_deref()
    }

    pub fn layer_kind(&self) -> LayerKind {
        self.kind
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only || self.kind != LayerKind::Table
    }

    pub fn geometry_type(&self) -> GeometryType {
        self.geometry_type
    }

    pub fn coord_dimension(&self) -> Dimension {
        self.coord_dimension
    }

    pub fn srid(&self) -> i32 {
        self.srid
    }

    pub fn proj4text(&self) -> &str {
        &self.proj4text
    }

    pub fn spatial_index_kind(&self) -> SpatialIndexKind {
        self.spatial_index
    }

    pub fn extent(&self) -> Option<Rect> {
        self.extent
    }

    pub fn feature_count(&self) -> i64 {
        self.feature_count
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, idx: usize) -> Result<&Field> {
        self.fields.get(idx).ok_or(SpatialiteError::NoSuchField(idx))
    }

    pub fn capabilities(&self) -> u32 {
        self.capabilities
    }

    pub fn subset_string(&self) -> Option<&str> {
        self.subset.as_deref()
    }

    /// Replace the subset clause and re-read the extent and feature count.
    ///
    /// When the new subset fails the summary query, the previous subset is
    /// restored (and its summary re-read) before the error is surfaced.
    pub fn set_subset_string(&mut self, subset: Option<&str>) -> Result<()> {
        let previous = self.subset.take();
        self.subset = subset.map(str::to_string).filter(|s| !s.is_empty());

        if let Err(err) = self.load_summary() {
            self.subset = previous;
            if let Err(revert_err) = self.load_summary() {
                log::debug!("summary re-read after subset revert failed: {revert_err}");
            }
            return Err(err);
        }
        Ok(())
    }

    /// `SELECT Min("col") ...` honoring the subset.
    pub fn minimum_value(&self, field_idx: usize) -> Result<Value> {
        self.aggregate_value("Min", field_idx)
    }

    /// `SELECT Max("col") ...` honoring the subset.
    pub fn maximum_value(&self, field_idx: usize) -> Result<Value> {
        self.aggregate_value("Max", field_idx)
    }

    fn aggregate_value(&self, function: &str, field_idx: usize) -> Result<Value> {
        let field = self.field(field_idx)?;
        let sql = aggregate_value_sql(
            function,
            &field.name,
            &self.query_expr,
            self.subset.as_deref(),
        );
        Ok(self.conn().query_row(&sql, [], |row| row.get(0))?)
    }

    /// Distinct values of a field in ascending order, honoring the subset.
    pub fn unique_values(&self, field_idx: usize, limit: Option<usize>) -> Result<Vec<Value>> {
        let field = self.field(field_idx)?;
        let sql = distinct_values_sql(&field.name, &self.query_expr, self.subset.as_deref(), limit);
        let mut stmt = self.conn().prepare(&sql)?;
        let values = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<Value>>>()?;
        Ok(values)
    }

    pub(crate) fn query_expr(&self) -> &str {
        &self.query_expr
    }

    pub(crate) fn index_table(&self) -> &str {
        &self.index_table
    }

    pub(crate) fn index_geometry(&self) -> &str {
        &self.index_geometry
    }

    /// The first projected column of every feature query.
    pub(crate) fn primary_key_expr(&self) -> String {
        match self.kind {
            LayerKind::Query => {
                // open() guarantees a key column for subquery layers.
                quoted_identifier(self.primary_key.as_deref().unwrap_or("ROWID"))
            }
            _ => "ROWID".to_string(),
        }
    }

    pub(crate) fn ensure_writable(&self) -> Result<()> {
        if self.is_read_only() {
            return Err(SpatialiteError::ReadOnly);
        }
        Ok(())
    }

    pub(crate) fn adjust_feature_count(&mut self, delta: i64) {
        self.feature_count += delta;
    }

    pub(crate) fn load_summary(&mut self) -> Result<()> {
        let sql = summary_sql(&self.geometry_column, &self.query_expr, self.subset.as_deref());
        let (min_x, min_y, max_x, max_y, count) = self.conn().query_row(&sql, [], |row| {
            Ok((
                row.get::<_, Option<f64>>(0)?,
                row.get::<_, Option<f64>>(1)?,
                row.get::<_, Option<f64>>(2)?,
                row.get::<_, Option<f64>>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?;

        self.extent = match (min_x, min_y, max_x, max_y) {
            (Some(min_x), Some(min_y), Some(max_x), Some(max_y)) => {
                Some(Rect::new(min_x, min_y, max_x, max_y))
            }
            _ => None,
        };
        self.feature_count = count;
        Ok(())
    }

    /// Enumerate attribute columns and detect the primary key. Subquery
    /// layers take column names and declared types from a probing prepare
    /// instead of `pragma_table_info`.
    pub(crate) fn load_fields(&mut self) -> Result<()> {
        let mut fields = Vec::new();
        let mut pk_name = None;
        let mut pk_count = 0;

        if self.kind != LayerKind::Query {
            let sql = table_columns_sql(&self.table_name);
            let mut stmt = self.conn().prepare(&sql)?;
            let columns = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            for (name, declared, pk) in columns {
                if pk != 0 {
                    pk_count += 1;
                    pk_name = Some(name.clone());
                }
                if name != self.geometry_column {
                    fields.push(Field {
                        field_type: field_type_from_declared(&declared),
                        declared_type: declared,
                        name,
                    });
                }
            }
        } else {
            let sql = format!("SELECT * FROM {} LIMIT 1", self.query_expr);
            let stmt = self.conn().prepare(&sql)?;
            for column in stmt.columns() {
                let name = column.name().to_string();
                let declared = column.decl_type().unwrap_or("TEXT").to_string();
                if Some(name.as_str()) == self.primary_key.as_deref() {
                    pk_count += 1;
                    pk_name = Some(name.clone());
                }
                if name != self.geometry_column {
                    fields.push(Field {
                        field_type: field_type_from_declared(&declared),
                        declared_type: declared,
                        name,
                    });
                }
            }
        }

        if pk_count == 1 {
            self.primary_key = pk_name;
        }
        self.fields = fields;
        Ok(())
    }
}

impl Drop for SpatialiteProvider {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            pool::release(handle);
        }
    }
}
