use crate::error::{Result, SpatialiteError};
use crate::gaia::codec::to_native_wkb;
use crate::provider::SpatialiteProvider;
use crate::sql::{BboxIndex, bbox_filter, compose_select, select_columns};
use crate::types::Rect;
use rusqlite::types::{Value, ValueRef};
use std::collections::VecDeque;
use wkb::reader::{Dimension, Wkb};

/// Rows fetched per statement re-arm while a cursor drains a layer.
const FEATURE_BATCH_SIZE: u32 = 256;

/// What a feature query should fetch.
#[derive(Clone, Debug)]
pub struct FeatureRequest {
    /// Field indices to project, in order.
    pub attributes: Vec<usize>,
    /// Bounding-box prefilter routed through the layer's spatial index.
    pub rect: Option<Rect>,
    pub fetch_geometry: bool,
    /// Additionally demand an exact `Intersects` test on top of the index
    /// prefilter.
    pub use_intersect: bool,
}

impl Default for FeatureRequest {
    fn default() -> Self {
        Self {
            attributes: Vec::new(),
            rect: None,
            fetch_geometry: true,
            use_intersect: false,
        }
    }
}

/// A single fetched feature: id, requested attributes in request order, and
/// the geometry translated to the native WKB dialect.
pub struct Feature {
    id: i64,
    geometry: Option<Vec<u8>>,
    attributes: Vec<Value>,
}

impl Feature {
    pub fn id(&self) -> i64 {
        self.id
    }

    /// The native-dialect WKB bytes, when the row carries a usable geometry.
    pub fn geometry_wkb(&self) -> Option<&[u8]> {
        self.geometry.as_deref()
    }

    /// Decode the geometry into a parsed WKB view.
    pub fn geometry(&self) -> Result<Option<Wkb<'_>>> {
        match &self.geometry {
            Some(bytes) => Ok(Some(Wkb::try_new(bytes)?)),
            None => Ok(None),
        }
    }

    /// Attribute by position among the requested attributes.
    pub fn attribute(&self, idx: usize) -> Option<&Value> {
        self.attributes.get(idx)
    }

    pub fn attributes(&self) -> &[Value] {
        &self.attributes
    }
}

/// Streaming cursor over a feature query.
///
/// The prepared statement is re-armed once per batch with a moving offset,
/// so a layer is drained without ever materializing it wholly. Any step
/// error puts the cursor into its terminal state; `rewind` starts the scan
/// over.
pub struct FeatureCursor<'conn> {
    stmt: rusqlite::Statement<'conn>,
    attr_count: usize,
    fetch_geometry: bool,
    coord_dimension: Dimension,
    batch_size: u32,
    offset: u32,
    buffer: VecDeque<Feature>,
    end_or_invalid_state: bool,
}

impl FeatureCursor<'_> {
    /// Reset the cursor to the start of the result set.
    pub fn rewind(&mut self) {
        self.offset = 0;
        self.buffer.clear();
        self.end_or_invalid_state = false;
    }

    fn fetch_batch(&mut self) -> Result<()> {
        let rows = self
            .stmt
            .query_map([self.offset], |row| {
                row_to_feature(row, self.attr_count, self.fetch_geometry, self.coord_dimension)
            })?
            .collect::<rusqlite::Result<Vec<Feature>>>()?;

        if (rows.len() as u32) < self.batch_size {
            self.end_or_invalid_state = true;
        }
        self.offset += rows.len() as u32;
        self.buffer.extend(rows);
        Ok(())
    }
}

impl Iterator for FeatureCursor<'_> {
    type Item = Result<Feature>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(feature) = self.buffer.pop_front() {
            return Some(Ok(feature));
        }
        if self.end_or_invalid_state {
            return None;
        }
        if let Err(err) = self.fetch_batch() {
            self.end_or_invalid_state = true;
            return Some(Err(err));
        }
        self.buffer.pop_front().map(Ok)
    }
}

/// Decode one statement row into a feature. A malformed geometry blob is
/// logged and yields a feature with no geometry; iteration continues.
fn row_to_feature(
    row: &rusqlite::Row<'_>,
    attr_count: usize,
    fetch_geometry: bool,
    coord_dimension: Dimension,
) -> rusqlite::Result<Feature> {
    let id: i64 = row.get(0)?;

    let mut attributes = Vec::with_capacity(attr_count);
    for idx in 1..=attr_count {
        attributes.push(Value::try_from(row.get_ref(idx)?)?);
    }

    let geometry = if fetch_geometry {
        match row.get_ref(attr_count + 1)? {
            ValueRef::Blob(bytes) => match to_native_wkb(bytes, coord_dimension) {
                Ok(native) => Some(native),
                Err(err) => {
                    log::warn!("feature {id}: malformed geometry wkb: {err}");
                    None
                }
            },
            _ => None,
        }
    } else {
        None
    };

    Ok(Feature {
        id,
        geometry,
        attributes,
    })
}

impl SpatialiteProvider {
    /// Prepare a feature cursor with the default batch size.
    pub fn select(&self, request: &FeatureRequest) -> Result<FeatureCursor<'_>> {
        self.select_batch(request, FEATURE_BATCH_SIZE)
    }

    /// Prepare a feature cursor that re-arms its statement every
    /// `batch_size` rows.
    pub fn select_batch(
        &self,
        request: &FeatureRequest,
        batch_size: u32,
    ) -> Result<FeatureCursor<'_>> {
        let batch_size = batch_size.max(1);
        let sql = self.select_sql(request, Some(batch_size))?;
        let stmt = self.conn().prepare(&sql).map_err(|err| {
            log::debug!("prepare failed for {sql}: {err}");
            SpatialiteError::Sql(err)
        })?;

        Ok(FeatureCursor {
            stmt,
            attr_count: request.attributes.len(),
            fetch_geometry: request.fetch_geometry,
            coord_dimension: self.coord_dimension(),
            batch_size,
            offset: 0,
            buffer: VecDeque::new(),
            end_or_invalid_state: false,
        })
    }

    /// Fetch a single feature by its id.
    pub fn feature_at_id(
        &self,
        feature_id: i64,
        attributes: &[usize],
        fetch_geometry: bool,
    ) -> Result<Option<Feature>> {
        let attr_names = self.attr_names(attributes)?;
        let columns = select_columns(
            &self.primary_key_expr(),
            &attr_names,
            fetch_geometry.then(|| self.geometry_column()),
        );
        let filter = format!("{} = ?1", self.primary_key_expr());
        let sql = compose_select(
            &columns,
            self.query_expr(),
            Some(&filter),
            self.subset_string(),
            None,
        );

        let coord_dimension = self.coord_dimension();
        let result = self.conn().query_row(&sql, [feature_id], |row| {
            row_to_feature(row, attributes.len(), fetch_geometry, coord_dimension)
        });
        match result {
            Ok(feature) => Ok(Some(feature)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Compose the SELECT for a request; exposed to the cursor and to tests
    /// through `select`/`select_batch`.
    fn select_sql(&self, request: &FeatureRequest, batch_size: Option<u32>) -> Result<String> {
        let attr_names = self.attr_names(&request.attributes)?;
        let primary_key = self.primary_key_expr();
        let columns = select_columns(
            &primary_key,
            &attr_names,
            request.fetch_geometry.then(|| self.geometry_column()),
        );

        let where_clause = request.rect.as_ref().map(|rect| {
            bbox_filter(
                rect,
                self.geometry_column(),
                &primary_key,
                &self.bbox_index(),
                request.use_intersect,
            )
        });

        // Pagination re-arms the statement, so the scan order must be
        // stable across re-arms.
        let tail = batch_size.map(|n| format!("ORDER BY {primary_key} LIMIT {n} OFFSET ?1"));
        Ok(compose_select(
            &columns,
            self.query_expr(),
            where_clause.as_deref(),
            self.subset_string(),
            tail.as_deref(),
        ))
    }

    fn attr_names(&self, attributes: &[usize]) -> Result<Vec<&str>> {
        attributes
            .iter()
            .map(|&idx| self.field(idx).map(|field| field.name.as_str()))
            .collect()
    }

    fn bbox_index(&self) -> BboxIndex<'_> {
        use crate::catalog::{LayerKind, SpatialIndexKind};

        if self.layer_kind() == LayerKind::VirtualShape {
            return BboxIndex::VirtualShape;
        }
        match self.spatial_index_kind() {
            SpatialIndexKind::RTree => BboxIndex::RTree {
                index_table: self.index_table(),
                index_geometry: self.index_geometry(),
            },
            SpatialIndexKind::MbrCache => BboxIndex::MbrCache {
                index_table: self.index_table(),
                index_geometry: self.index_geometry(),
            },
            SpatialIndexKind::None => BboxIndex::PlainScan,
        }
    }
}
