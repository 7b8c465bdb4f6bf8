//! SQL text consumed and produced by the provider: the SpatiaLite catalog
//! DDL, the classification probes, and the statement builders for feature
//! selection and mutation.

use crate::types::Rect;

// geometry_columns: registers every geometry-bearing base table together
// with its declared type, dimensionality, SRID and spatial-index kind.
pub(crate) const SQL_GEOMETRY_COLUMNS: &str = "
CREATE TABLE geometry_columns (
  f_table_name TEXT NOT NULL,
  f_geometry_column TEXT NOT NULL,
  type TEXT NOT NULL,
  coord_dimension TEXT NOT NULL,
  srid INTEGER NOT NULL,
  spatial_index_enabled INTEGER NOT NULL DEFAULT 0,
  CONSTRAINT pk_geom_cols PRIMARY KEY (f_table_name, f_geometry_column),
  CONSTRAINT fk_gc_srs FOREIGN KEY (srid) REFERENCES spatial_ref_sys (srid)
);
";

// geometry_columns_auth: optional authorization flags per geometry column.
// Absent in many databases; every consumer must tolerate that.
pub(crate) const SQL_GEOMETRY_COLUMNS_AUTH: &str = "
CREATE TABLE geometry_columns_auth (
  f_table_name TEXT NOT NULL,
  f_geometry_column TEXT NOT NULL,
  read_only INTEGER NOT NULL,
  hidden INTEGER NOT NULL,
  CONSTRAINT pk_gc_auth PRIMARY KEY (f_table_name, f_geometry_column)
);
";

// views_geometry_columns: registers views exposing a geometry column of an
// underlying base table.
pub(crate) const SQL_VIEWS_GEOMETRY_COLUMNS: &str = "
CREATE TABLE views_geometry_columns (
  view_name TEXT NOT NULL,
  view_geometry TEXT NOT NULL,
  view_rowid TEXT NOT NULL,
  f_table_name TEXT NOT NULL,
  f_geometry_column TEXT NOT NULL,
  CONSTRAINT pk_views_geom_cols PRIMARY KEY (view_name, view_geometry)
);
";

// virts_geometry_columns: registers virtual (foreign-table) layers such as
// VirtualShape.
pub(crate) const SQL_VIRTS_GEOMETRY_COLUMNS: &str = "
CREATE TABLE virts_geometry_columns (
  virt_name TEXT NOT NULL,
  virt_geometry TEXT NOT NULL,
  type TEXT NOT NULL,
  srid INTEGER NOT NULL,
  CONSTRAINT pk_virts_geom_cols PRIMARY KEY (virt_name, virt_geometry)
);
";

// spatial_ref_sys: the SRS catalog every layer's SRID resolves against.
pub(crate) const SQL_SPATIAL_REF_SYS: &str = "
CREATE TABLE spatial_ref_sys (
  srid INTEGER NOT NULL PRIMARY KEY,
  auth_name TEXT NOT NULL,
  auth_srid INTEGER NOT NULL,
  ref_sys_name TEXT,
  proj4text TEXT NOT NULL
);
";

/// Create the SpatiaLite metadata tables in a fresh database and seed the
/// default spatial reference systems.
pub fn init_spatial_metadata(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SQL_SPATIAL_REF_SYS)?;
    register_default_srs(conn)?;
    conn.execute_batch(SQL_GEOMETRY_COLUMNS)?;
    conn.execute_batch(SQL_GEOMETRY_COLUMNS_AUTH)?;
    conn.execute_batch(SQL_VIEWS_GEOMETRY_COLUMNS)?;
    conn.execute_batch(SQL_VIRTS_GEOMETRY_COLUMNS)?;
    Ok(())
}

fn register_default_srs(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    let sql = "INSERT INTO spatial_ref_sys \
            (srid, auth_name, auth_srid, ref_sys_name, proj4text) \
            VALUES (?1, ?2, ?3, ?4, ?5)";
    conn.execute(
        sql,
        rusqlite::params![
            4326,
            "epsg",
            4326,
            "WGS 84",
            "+proj=longlat +ellps=WGS84 +datum=WGS84 +no_defs"
        ],
    )?;
    conn.execute(
        sql,
        rusqlite::params![-1, "NONE", -1, "Undefined - Cartesian", ""],
    )?;
    conn.execute(
        sql,
        rusqlite::params![0, "NONE", 0, "Undefined - Geographic Long/Lat", ""],
    )?;
    Ok(())
}

// Classification probes. The auth join is attempted first; the fallback is
// used when geometry_columns_auth does not exist in the database.
pub(crate) const SQL_TABLE_LAYER_PROBE: &str = "
SELECT read_only FROM geometry_columns
LEFT JOIN geometry_columns_auth USING (f_table_name, f_geometry_column)
WHERE f_table_name = ?1 AND f_geometry_column = ?2
";

pub(crate) const SQL_TABLE_LAYER_PROBE_NO_AUTH: &str = "
SELECT 0 FROM geometry_columns
WHERE f_table_name = ?1 AND f_geometry_column = ?2
";

pub(crate) const SQL_VIEW_LAYER_PROBE: &str = "
SELECT view_name, view_geometry FROM views_geometry_columns
WHERE view_name = ?1 AND view_geometry = ?2
";

pub(crate) const SQL_VSHAPE_LAYER_PROBE: &str = "
SELECT virt_name, virt_geometry FROM virts_geometry_columns
WHERE virt_name = ?1 AND virt_geometry = ?2
";

pub(crate) const SQL_TABLE_GEOMETRY_DETAILS: &str = "
SELECT type, srid, spatial_index_enabled, coord_dimension FROM geometry_columns
WHERE f_table_name = ?1 AND f_geometry_column = ?2
";

pub(crate) const SQL_VIEW_GEOMETRY_DETAILS: &str = "
SELECT type, srid, spatial_index_enabled, f_table_name, f_geometry_column
FROM views_geometry_columns
JOIN geometry_columns USING (f_table_name, f_geometry_column)
WHERE view_name = ?1 AND view_geometry = ?2
";

pub(crate) const SQL_VSHAPE_GEOMETRY_DETAILS: &str = "
SELECT type, srid FROM virts_geometry_columns
WHERE virt_name = ?1 AND virt_geometry = ?2
";

pub(crate) const SQL_SRID_DETAILS: &str = "SELECT proj4text FROM spatial_ref_sys WHERE srid = ?1";

pub(crate) fn quoted_identifier(id: &str) -> String {
    format!(r#""{}""#, id.replace('"', "\"\""))
}

pub(crate) fn table_columns_sql(table: &str) -> String {
    format!(
        "SELECT name, type, pk FROM pragma_table_info('{}')",
        table.replace('\'', "''")
    )
}

pub(crate) fn subquery_probe_sql(query_expr: &str) -> String {
    format!("SELECT 0 FROM {query_expr} LIMIT 1")
}

pub(crate) fn query_geometry_sql(
    geometry_column: &str,
    query_expr: &str,
    subset: Option<&str>,
) -> String {
    let g = quoted_identifier(geometry_column);
    let mut sql = format!("SELECT Srid({g}), GeometryType({g}) FROM {query_expr}");
    if let Some(subset) = subset {
        sql.push_str(&format!(" WHERE {subset}"));
    }
    sql.push_str(" LIMIT 1");
    sql
}

/// Collapse the sub-kinds of a generic GEOMETRY column to their least upper
/// bound; the layer is valid only if this yields exactly one distinct value.
pub(crate) fn query_geometry_collapse_sql(
    geometry_column: &str,
    query_expr: &str,
    subset: Option<&str>,
) -> String {
    let g = quoted_identifier(geometry_column);
    let mut sql = format!(
        "SELECT DISTINCT CASE\
         \n WHEN GeometryType({g}) IN ('POINT', 'MULTIPOINT') THEN 'POINT'\
         \n WHEN GeometryType({g}) IN ('LINESTRING', 'MULTILINESTRING') THEN 'LINESTRING'\
         \n WHEN GeometryType({g}) IN ('POLYGON', 'MULTIPOLYGON') THEN 'POLYGON'\
         \n END FROM {query_expr}"
    );
    if let Some(subset) = subset {
        sql.push_str(&format!(" WHERE {subset}"));
    }
    sql
}

/// How a bounding-box predicate reaches the data, decided by the layer's
/// classification and advertised spatial index.
pub(crate) enum BboxIndex<'a> {
    /// Virtual-shape layers answer `MbrIntersects` natively.
    VirtualShape,
    RTree {
        index_table: &'a str,
        index_geometry: &'a str,
    },
    MbrCache {
        index_table: &'a str,
        index_geometry: &'a str,
    },
    PlainScan,
}

/// MBR bounds are always serialized with six fractional digits.
pub(crate) fn mbr_literal(rect: &Rect) -> String {
    format!(
        "{:.6}, {:.6}, {:.6}, {:.6}",
        rect.min_x, rect.min_y, rect.max_x, rect.max_y
    )
}

pub(crate) fn bbox_filter(
    rect: &Rect,
    geometry_column: &str,
    primary_key: &str,
    index: &BboxIndex<'_>,
    use_intersect: bool,
) -> String {
    let mut filter = String::new();
    if use_intersect {
        filter.push_str(&format!(
            "Intersects({}, BuildMbr({})) AND ",
            quoted_identifier(geometry_column),
            mbr_literal(rect)
        ));
    }
    match index {
        BboxIndex::VirtualShape | BboxIndex::PlainScan => {
            filter.push_str(&format!(
                "MbrIntersects({}, BuildMbr({}))",
                quoted_identifier(geometry_column),
                mbr_literal(rect)
            ));
        }
        BboxIndex::RTree {
            index_table,
            index_geometry,
        } => {
            let idx_name = format!("idx_{index_table}_{index_geometry}");
            filter.push_str(&format!(
                "{} IN (SELECT pkid FROM {} WHERE \
                 xmin <= {:.6} AND xmax >= {:.6} AND ymin <= {:.6} AND ymax >= {:.6})",
                primary_key,
                quoted_identifier(&idx_name),
                rect.max_x,
                rect.min_x,
                rect.max_y,
                rect.min_y
            ));
        }
        BboxIndex::MbrCache {
            index_table,
            index_geometry,
        } => {
            let idx_name = format!("cache_{index_table}_{index_geometry}");
            filter.push_str(&format!(
                "{} IN (SELECT rowid FROM {} WHERE mbr = FilterMbrIntersects({}))",
                primary_key,
                quoted_identifier(&idx_name),
                mbr_literal(rect)
            ));
        }
    }
    filter
}

/// The projected column list: primary key first, then the requested
/// attributes, then the geometry decoded to WKB.
pub(crate) fn select_columns(
    primary_key: &str,
    attr_columns: &[&str],
    geometry_column: Option<&str>,
) -> String {
    let mut columns = primary_key.to_string();
    for name in attr_columns {
        columns.push_str(", ");
        columns.push_str(&quoted_identifier(name));
    }
    if let Some(geom) = geometry_column {
        columns.push_str(&format!(", AsBinary({})", quoted_identifier(geom)));
    }
    columns
}

pub(crate) fn compose_select(
    columns: &str,
    query_expr: &str,
    where_clause: Option<&str>,
    subset: Option<&str>,
    tail: Option<&str>,
) -> String {
    let mut sql = format!("SELECT {columns} FROM {query_expr}");
    match (where_clause, subset) {
        (Some(filter), Some(subset)) => {
            sql.push_str(&format!(" WHERE {filter} AND ({subset})"));
        }
        (Some(filter), None) => sql.push_str(&format!(" WHERE {filter}")),
        (None, Some(subset)) => sql.push_str(&format!(" WHERE ({subset})")),
        (None, None) => {}
    }
    if let Some(tail) = tail {
        sql.push(' ');
        sql.push_str(tail);
    }
    sql
}

pub(crate) fn insert_feature_sql(
    table: &str,
    primary_key: Option<&str>,
    geometry_column: &str,
    srid: i32,
    attr_columns: &[&str],
) -> String {
    let mut columns = Vec::with_capacity(attr_columns.len() + 2);
    let mut values = Vec::with_capacity(attr_columns.len() + 2);
    if let Some(pk) = primary_key {
        columns.push(quoted_identifier(pk));
        values.push("NULL".to_string());
    }
    columns.push(quoted_identifier(geometry_column));
    values.push(format!("GeomFromWKB(?1, {srid})"));
    for (idx, name) in attr_columns.iter().enumerate() {
        columns.push(quoted_identifier(name));
        values.push(format!("?{}", idx + 2));
    }
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quoted_identifier(table),
        columns.join(", "),
        values.join(", ")
    )
}

pub(crate) fn delete_feature_sql(table: &str) -> String {
    format!("DELETE FROM {} WHERE ROWID = ?1", quoted_identifier(table))
}

pub(crate) fn update_geometry_sql(table: &str, geometry_column: &str, srid: i32) -> String {
    format!(
        "UPDATE {} SET {} = GeomFromWKB(?1, {srid}) WHERE ROWID = ?2",
        quoted_identifier(table),
        quoted_identifier(geometry_column)
    )
}

pub(crate) fn update_attributes_sql(table: &str, columns: &[&str]) -> String {
    let assignments = columns
        .iter()
        .enumerate()
        .map(|(idx, name)| format!("{} = ?{}", quoted_identifier(name), idx + 1))
        .collect::<Vec<String>>()
        .join(", ");
    format!(
        "UPDATE {} SET {} WHERE ROWID = ?{}",
        quoted_identifier(table),
        assignments,
        columns.len() + 1
    )
}

pub(crate) fn add_column_sql(table: &str, name: &str, declared_type: &str) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN {} {}",
        quoted_identifier(table),
        quoted_identifier(name),
        declared_type
    )
}

pub(crate) fn summary_sql(geometry_column: &str, query_expr: &str, subset: Option<&str>) -> String {
    let g = quoted_identifier(geometry_column);
    let mut sql = format!(
        "SELECT Min(MbrMinX({g})), Min(MbrMinY({g})), \
         Max(MbrMaxX({g})), Max(MbrMaxY({g})), Count(*) FROM {query_expr}"
    );
    if let Some(subset) = subset {
        sql.push_str(&format!(" WHERE ({subset})"));
    }
    sql
}

pub(crate) fn aggregate_value_sql(
    function: &str,
    column: &str,
    query_expr: &str,
    subset: Option<&str>,
) -> String {
    let mut sql = format!(
        "SELECT {function}({}) FROM {query_expr}",
        quoted_identifier(column)
    );
    if let Some(subset) = subset {
        sql.push_str(&format!(" WHERE ({subset})"));
    }
    sql
}

pub(crate) fn distinct_values_sql(
    column: &str,
    query_expr: &str,
    subset: Option<&str>,
    limit: Option<usize>,
) -> String {
    let col = quoted_identifier(column);
    let mut sql = format!("SELECT DISTINCT {col} FROM {query_expr}");
    if let Some(subset) = subset {
        sql.push_str(&format!(" WHERE ({subset})"));
    }
    sql.push_str(&format!(" ORDER BY {col}"));
    if let Some(limit) = limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }
    sql
}
