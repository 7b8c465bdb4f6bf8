//! Shared fixtures for provider-level tests: an on-disk SpatiaLite database
//! seeded with a small point layer.

use crate::Result;
use crate::spatial_functions::register_spatial_functions;
use crate::sql::init_spatial_metadata;
use rusqlite::{Connection, params};
use std::path::PathBuf;

pub(crate) struct TestDb {
    _dir: tempfile::TempDir,
    pub path: PathBuf,
}

impl TestDb {
    /// A fresh database file with the spatial catalogs initialized.
    pub fn create() -> Result<TestDb> {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("layers.sqlite");
        let conn = Connection::open(&path)?;
        init_spatial_metadata(&conn)?;
        Ok(TestDb { _dir: dir, path })
    }

    /// A raw connection for seeding and assertions, with the spatial SQL
    /// functions registered.
    pub fn conn(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        register_spatial_functions(&conn)?;
        Ok(conn)
    }

    pub fn uri(&self, table: &str, geometry_column: &str) -> String {
        format!(
            "{}|table={table}|geometrycolumn={geometry_column}",
            self.path.display()
        )
    }
}

/// Extended/native 2D WKB for a point; the two dialects coincide here.
pub(crate) fn wkb_point_xy(x: f64, y: f64) -> Vec<u8> {
    let mut wkb = Vec::new();
    wkb::writer::write_geometry(&mut wkb, &geo_types::Point::new(x, y), &Default::default())
        .expect("write point");
    wkb
}

/// Seed the `cities` point layer: three rows, an XY POINT geometry column
/// registered at SRID 4326, and optionally an R-tree index table
/// (`spatial_index` = 1) kept in sync with the rows.
pub(crate) fn seed_cities_layer(db: &TestDb, spatial_index: i64) -> Result<()> {
    let conn = db.conn()?;
    conn.execute_batch(
        "CREATE TABLE cities (
           fid INTEGER PRIMARY KEY,
           name TEXT UNIQUE,
           pop INTEGER,
           height DOUBLE,
           geom BLOB
         )",
    )?;
    conn.execute(
        "INSERT INTO geometry_columns \
         (f_table_name, f_geometry_column, type, coord_dimension, srid, spatial_index_enabled) \
         VALUES ('cities', 'geom', 'POINT', 'XY', 4326, ?1)",
        [spatial_index],
    )?;

    let rows = [
        ("alpha", 10i64, 1.5f64, 1.0f64, 1.0f64),
        ("beta", 20, 2.5, 5.0, 5.0),
        ("gamma", 30, 3.5, 20.0, 20.0),
    ];
    for (name, pop, height, x, y) in rows {
        conn.execute(
            "INSERT INTO cities (name, pop, height, geom) \
             VALUES (?1, ?2, ?3, GeomFromWKB(?4, 4326))",
            params![name, pop, height, wkb_point_xy(x, y)],
        )?;
    }

    if spatial_index == 1 {
        conn.execute_batch(
            "CREATE TABLE idx_cities_geom (pkid INTEGER PRIMARY KEY, \
             xmin DOUBLE, xmax DOUBLE, ymin DOUBLE, ymax DOUBLE)",
        )?;
        conn.execute_batch(
            "INSERT INTO idx_cities_geom (pkid, xmin, xmax, ymin, ymax) \
             SELECT fid, MbrMinX(geom), MbrMaxX(geom), MbrMinY(geom), MbrMaxY(geom) FROM cities",
        )?;
    }
    Ok(())
}
