//! Shared connection handles, one per database file per thread.
//!
//! Every provider opened against the same canonical path on a thread shares
//! one `rusqlite::Connection`; the reference count is the `Rc` count and the
//! cache entry is evicted when the last provider releases its handle.
//! Connections never migrate across threads, so the cache is thread-local
//! state rather than a process-wide map behind a lock.

use crate::error::{Result, SpatialiteError};
use crate::spatial_functions::register_spatial_functions;
use rusqlite::OpenFlags;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

thread_local! {
    static HANDLES: RefCell<HashMap<PathBuf, Rc<SqliteHandle>>> = RefCell::new(HashMap::new());
}

/// An open SpatiaLite database shared by every provider on this thread that
/// points at the same file.
pub(crate) struct SqliteHandle {
    conn: rusqlite::Connection,
    path: PathBuf,
}

impl SqliteHandle {
    pub(crate) fn conn(&self) -> &rusqlite::Connection {
        &self.conn
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

/// Return a shared handle for the database, opening it on first use.
///
/// A fresh connection must pass the spatial-metadata sanity probe before it
/// is admitted to the cache; foreign-key enforcement is switched on and the
/// spatial SQL functions are registered at the same time.
pub(crate) fn open(path: &Path) -> Result<Rc<SqliteHandle>> {
    let canonical = std::fs::canonicalize(path).map_err(|err| SpatialiteError::DbOpenFailed {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;

    let cached = HANDLES.with(|handles| handles.borrow().get(&canonical).cloned());
    if let Some(handle) = cached {
        log::debug!("using cached connection for {}", canonical.display());
        return Ok(handle);
    }

    log::debug!("new sqlite connection for {}", canonical.display());
    let conn = rusqlite::Connection::open_with_flags(
        &canonical,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|err| SpatialiteError::DbOpenFailed {
        path: canonical.clone(),
        reason: err.to_string(),
    })?;

    if !check_metadata(&conn) {
        return Err(SpatialiteError::DbOpenFailed {
            path: canonical,
            reason: "invalid spatial metadata tables".to_string(),
        });
    }

    conn.execute_batch("PRAGMA foreign_keys = ON")?;
    register_spatial_functions(&conn)?;

    let handle = Rc::new(SqliteHandle {
        conn,
        path: canonical.clone(),
    });
    HANDLES.with(|handles| {
        handles.borrow_mut().insert(canonical, Rc::clone(&handle));
    });
    Ok(handle)
}

/// Drop a handle reference, closing the connection when the last provider
/// lets go.
pub(crate) fn release(handle: Rc<SqliteHandle>) {
    let path = handle.path.clone();
    drop(handle);
    HANDLES.with(|handles| {
        let mut handles = handles.borrow_mut();
        let last = handles
            .get(&path)
            .is_some_and(|cached| Rc::strong_count(cached) == 1);
        if last {
            handles.remove(&path);
        }
    });
}

/// Sanity probe: the database qualifies only if its spatial catalogs are
/// present with the expected shape.
fn check_metadata(conn: &rusqlite::Connection) -> bool {
    let geometry_columns = conn
        .prepare("SELECT f_table_name, f_geometry_column, type, srid FROM geometry_columns LIMIT 1")
        .is_ok();
    let spatial_ref_sys = conn
        .prepare("SELECT srid, proj4text FROM spatial_ref_sys LIMIT 1")
        .is_ok();
    geometry_columns && spatial_ref_sys
}

#[cfg(test)]
mod tests {
    use super::{HANDLES, open, release};
    use crate::Result;
    use crate::error::SpatialiteError;
    use crate::sql::init_spatial_metadata;
    use std::path::{Path, PathBuf};
    use std::rc::Rc;

    fn cached_count() -> usize {
        HANDLES.with(|handles| handles.borrow().len())
    }

    fn create_spatial_db(dir: &Path, name: &str) -> Result<PathBuf> {
        let path = dir.join(name);
        let conn = rusqlite::Connection::open(&path)?;
        init_spatial_metadata(&conn)?;
        Ok(path)
    }

    #[test]
    fn same_path_shares_one_handle() -> Result<()> {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = create_spatial_db(dir.path(), "shared.sqlite")?;

        let a = open(&path)?;
        let b = open(&path)?;
        assert!(Rc::ptr_eq(&a, &b));

        release(a);
        assert_eq!(cached_count(), 1);
        release(b);
        assert_eq!(cached_count(), 0);
        Ok(())
    }

    #[test]
    fn non_spatial_database_is_rejected() -> Result<()> {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("plain.sqlite");
        let conn = rusqlite::Connection::open(&path)?;
        conn.execute_batch("CREATE TABLE t (id INTEGER)")?;
        drop(conn);

        assert!(matches!(
            open(&path),
            Err(SpatialiteError::DbOpenFailed { .. })
        ));
        assert_eq!(cached_count(), 0);
        Ok(())
    }

    #[test]
    fn missing_file_is_rejected() {
        assert!(matches!(
            open(Path::new("/no/such/dir/missing.sqlite")),
            Err(SpatialiteError::DbOpenFailed { .. })
        ));
    }

    #[test]
    fn foreign_keys_are_enabled() -> Result<()> {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = create_spatial_db(dir.path(), "fk.sqlite")?;

        let handle = open(&path)?;
        let enabled: i64 = handle
            .conn()
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
        assert_eq!(enabled, 1);
        release(handle);
        Ok(())
    }
}
