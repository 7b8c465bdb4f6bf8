//! Layer classification against the SpatiaLite catalogs.
//!
//! A layer is admitted only when exactly one of the four classifications
//! holds: a registered base table, a registered view, a registered virtual
//! foreign table, or a validated ad-hoc subquery. The matching catalog row
//! then supplies the declared geometry type, SRID, coordinate
//! dimensionality and spatial-index kind.

use crate::conversions::{dimension_from_str, geometry_type_from_str};
use crate::error::{Result, SpatialiteError};
use crate::sql::{
    SQL_SRID_DETAILS, SQL_TABLE_GEOMETRY_DETAILS, SQL_TABLE_LAYER_PROBE,
    SQL_TABLE_LAYER_PROBE_NO_AUTH, SQL_VIEW_GEOMETRY_DETAILS, SQL_VIEW_LAYER_PROBE,
    SQL_VSHAPE_GEOMETRY_DETAILS, SQL_VSHAPE_LAYER_PROBE, query_geometry_collapse_sql,
    query_geometry_sql, quoted_identifier, subquery_probe_sql,
};
use rusqlite::Connection;
use wkb::reader::{Dimension, GeometryType};

/// Which catalog (or none at all) a layer resolves through.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayerKind {
    Table,
    View,
    VirtualShape,
    Query,
}

/// Spatial index advertised by the catalog for a layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpatialIndexKind {
    None,
    RTree,
    MbrCache,
}

/// Everything classification learns about a layer.
#[derive(Debug)]
pub(crate) struct LayerSource {
    pub kind: LayerKind,
    pub read_only: bool,
    /// The FROM expression of every query against the layer: the quoted
    /// table name, or the aliased subquery.
    pub query_expr: String,
    pub geometry_type: GeometryType,
    pub coord_dimension: Dimension,
    pub srid: i32,
    pub spatial_index: SpatialIndexKind,
    /// Table and geometry names the index tables are derived from; for a
    /// view these point at the underlying base table.
    pub index_table: String,
    pub index_geometry: String,
    pub proj4text: String,
}

/// Run the catalog probes and build the layer source description.
pub(crate) fn classify(
    conn: &Connection,
    table: &str,
    geometry_column: &str,
    subset: Option<&str>,
) -> Result<LayerSource> {
    let mut matches = 0;
    let mut kind = None;
    let mut table_read_only = false;
    let mut query_expr = quoted_identifier(table);

    if let Some(read_only) = table_probe(conn, table, geometry_column) {
        kind = Some(LayerKind::Table);
        table_read_only = read_only;
        matches += 1;
    }

    if probe_single_row(conn, SQL_VIEW_LAYER_PROBE, table, geometry_column) {
        kind = Some(LayerKind::View);
        matches += 1;
    }

    if probe_single_row(conn, SQL_VSHAPE_LAYER_PROBE, table, geometry_column) {
        kind = Some(LayerKind::VirtualShape);
        matches += 1;
    }

    if is_subquery(table) {
        let aliased = format!(
            "{} AS {}",
            table,
            quoted_identifier(&subquery_alias(table))
        );
        let valid = conn
            .query_row(&subquery_probe_sql(&aliased), [], |_| Ok(()))
            .is_ok();
        if valid {
            kind = Some(LayerKind::Query);
            query_expr = aliased;
            matches += 1;
        }
    }

    if matches != 1 {
        return Err(SpatialiteError::LayerInvalid(format!(
            "{matches} classifications match table {table:?} geometry {geometry_column:?}"
        )));
    }
    let kind = kind.expect("exactly one classification");

    let mut source = match kind {
        LayerKind::Table => {
            let (type_str, srid, spatial_index, dims_str) = conn
                .query_row(
                    SQL_TABLE_GEOMETRY_DETAILS,
                    [table, geometry_column],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, i32>(1)?,
                            row.get::<_, i64>(2)?,
                            row.get::<_, String>(3)?,
                        ))
                    },
                )
                .map_err(no_rows_as_invalid)?;
            LayerSource {
                kind,
                read_only: table_read_only,
                query_expr,
                geometry_type: geometry_type_from_str(&type_str)?,
                coord_dimension: dimension_from_str(&dims_str)?,
                srid,
                spatial_index: spatial_index_from_flag(spatial_index),
                index_table: table.to_string(),
                index_geometry: geometry_column.to_string(),
                proj4text: String::new(),
            }
        }
        LayerKind::View => {
            let (type_str, srid, spatial_index, index_table, index_geometry) = conn
                .query_row(SQL_VIEW_GEOMETRY_DETAILS, [table, geometry_column], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i32>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                })
                .map_err(no_rows_as_invalid)?;
            LayerSource {
                kind,
                read_only: true,
                query_expr,
                geometry_type: geometry_type_from_str(&type_str)?,
                coord_dimension: Dimension::Xy,
                srid,
                spatial_index: spatial_index_from_flag(spatial_index),
                index_table,
                index_geometry,
                proj4text: String::new(),
            }
        }
        LayerKind::VirtualShape => {
            let (type_str, srid) = conn
                .query_row(
                    SQL_VSHAPE_GEOMETRY_DETAILS,
                    [table, geometry_column],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, i32>(1)?)),
                )
                .map_err(no_rows_as_invalid)?;
            LayerSource {
                kind,
                read_only: true,
                query_expr,
                geometry_type: geometry_type_from_str(&type_str)?,
                coord_dimension: Dimension::Xy,
                srid,
                spatial_index: SpatialIndexKind::None,
                index_table: table.to_string(),
                index_geometry: geometry_column.to_string(),
                proj4text: String::new(),
            }
        }
        LayerKind::Query => {
            let (geometry_type, srid) =
                query_geometry_details(conn, geometry_column, &query_expr, subset)?;
            LayerSource {
                kind,
                read_only: true,
                query_expr,
                geometry_type,
                coord_dimension: Dimension::Xy,
                srid,
                spatial_index: SpatialIndexKind::None,
                index_table: table.to_string(),
                index_geometry: geometry_column.to_string(),
                proj4text: String::new(),
            }
        }
    };

    if source.srid < 0 {
        return Err(SpatialiteError::LayerInvalid(format!(
            "negative srid {} for table {table:?}",
            source.srid
        )));
    }

    source.proj4text = conn
        .query_row(SQL_SRID_DETAILS, [source.srid], |row| {
            row.get::<_, String>(0)
        })
        .map_err(|err| match err {
            rusqlite::Error::QueryReturnedNoRows => SpatialiteError::LayerInvalid(format!(
                "srid {} not found in spatial_ref_sys",
                source.srid
            )),
            err => SpatialiteError::Sql(err),
        })?;

    Ok(source)
}

/// The table probe also reads the authorization flag; a database without
/// geometry_columns_auth downgrades to the plain probe.
fn table_probe(conn: &Connection, table: &str, geometry_column: &str) -> Option<bool> {
    let rows = match collect_probe(conn, SQL_TABLE_LAYER_PROBE, table, geometry_column) {
        Ok(rows) => rows,
        Err(err) => {
            if err.to_string().contains("no such table: geometry_columns_auth") {
                collect_probe(conn, SQL_TABLE_LAYER_PROBE_NO_AUTH, table, geometry_column)
                    .unwrap_or_else(|err| {
                        log::debug!("table probe failed: {err}");
                        Vec::new()
                    })
            } else {
                log::debug!("table probe failed: {err}");
                Vec::new()
            }
        }
    };

    if rows.len() == 1 {
        Some(rows[0].is_some_and(|flag| flag != 0))
    } else {
        None
    }
}

fn collect_probe(
    conn: &Connection,
    sql: &str,
    table: &str,
    geometry_column: &str,
) -> rusqlite::Result<Vec<Option<i64>>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([table, geometry_column], |row| row.get::<_, Option<i64>>(0))?;
    rows.collect()
}

/// True when the probe matches exactly one catalog row. Probe failures
/// (typically a missing catalog table) count as no match.
fn probe_single_row(conn: &Connection, sql: &str, table: &str, geometry_column: &str) -> bool {
    match collect_probe(conn, sql, table, geometry_column) {
        Ok(rows) => rows.len() == 1,
        Err(err) => {
            log::debug!("layer probe failed: {err}");
            false
        }
    }
}

fn is_subquery(table: &str) -> bool {
    let trimmed = table.trim();
    trimmed.to_ascii_lowercase().starts_with("(select") && trimmed.ends_with(')')
}

/// Pick a subquery alias that does not already occur in the expression.
fn subquery_alias(query: &str) -> String {
    let lowered = query.to_ascii_lowercase();
    let mut index = 0;
    loop {
        let alias = format!("subQuery_{index}");
        if !lowered.contains(&alias.to_ascii_lowercase()) {
            return alias;
        }
        index += 1;
    }
}

fn spatial_index_from_flag(flag: i64) -> SpatialIndexKind {
    match flag {
        1 => SpatialIndexKind::RTree,
        2 => SpatialIndexKind::MbrCache,
        _ => SpatialIndexKind::None,
    }
}

fn no_rows_as_invalid(err: rusqlite::Error) -> SpatialiteError {
    match err {
        rusqlite::Error::QueryReturnedNoRows => {
            SpatialiteError::LayerInvalid("catalog row disappeared during classification".into())
        }
        err => SpatialiteError::Sql(err),
    }
}

/// For subquery layers the geometry kind and SRID come from the data: the
/// first row answers directly, and a generic GEOMETRY column is collapsed to
/// its least upper bound, which must be unique.
fn query_geometry_details(
    conn: &Connection,
    geometry_column: &str,
    query_expr: &str,
    subset: Option<&str>,
) -> Result<(GeometryType, i32)> {
    let sql = query_geometry_sql(geometry_column, query_expr, subset);
    let (srid, type_str) = conn
        .query_row(&sql, [], |row| {
            Ok((
                row.get::<_, Option<i32>>(0)?,
                row.get::<_, Option<String>>(1)?,
            ))
        })
        .map_err(|err| match err {
            rusqlite::Error::QueryReturnedNoRows => SpatialiteError::LayerInvalid(
                "subquery produced no row to derive the geometry type from".into(),
            ),
            err => SpatialiteError::Sql(err),
        })?;

    let (srid, mut type_str) = match (srid, type_str) {
        (Some(srid), Some(type_str)) => (srid, type_str),
        _ => {
            return Err(SpatialiteError::LayerInvalid(
                "subquery row carries no geometry".into(),
            ));
        }
    };

    if type_str.eq_ignore_ascii_case("GEOMETRY") {
        let sql = query_geometry_collapse_sql(geometry_column, query_expr, subset);
        let mut stmt = conn.prepare(&sql)?;
        let kinds = stmt
            .query_map([], |row| row.get::<_, Option<String>>(0))?
            .collect::<rusqlite::Result<Vec<Option<String>>>>()?;
        match kinds.as_slice() {
            [Some(kind)] => type_str = kind.clone(),
            _ => {
                return Err(SpatialiteError::LayerInvalid(
                    "subquery mixes geometry kinds".into(),
                ));
            }
        }
    }

    Ok((geometry_type_from_str(&type_str)?, srid))
}
