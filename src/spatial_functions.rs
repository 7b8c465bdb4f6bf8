//! Rust implementations of the spatial SQL functions the provider consumes,
//! registered on every pooled connection through rusqlite's `functions`
//! feature.
//!
//! Stored geometries are wrapped in a compact envelope: a start marker, an
//! endian byte, the little-endian SRID, then the extended-dialect WKB.
//! `GeomFromWKB` applies the wrap, `AsBinary` strips it, and the MBR helpers
//! parse the payload to compute bounds.

use crate::conversions::geometry_type_to_str;
use crate::error::Result;
use crate::gaia::endian::{Endianness, store_f64, store_u32};
use crate::gaia::tags::{TAG_POLYGON, decode_tag};
use geo_traits::{
    CoordTrait, GeometryCollectionTrait, GeometryTrait, LineStringTrait, MultiLineStringTrait,
    MultiPointTrait, MultiPolygonTrait, PointTrait, PolygonTrait,
};
use rusqlite::functions::{Context, FunctionFlags};
use rusqlite::types::{Type, ValueRef};
use rusqlite::{Connection, Error};
use wkb::reader::Wkb;

const STORED_START: u8 = 0x00;
const STORED_HEADER_LEN: usize = 6;

#[derive(Clone, Copy)]
struct Bounds {
    minx: f64,
    maxx: f64,
    miny: f64,
    maxy: f64,
}

impl Bounds {
    fn intersects(&self, other: &Bounds) -> bool {
        self.minx <= other.maxx
            && self.maxx >= other.minx
            && self.miny <= other.maxy
            && self.maxy >= other.miny
    }
}

/// Wrap extended-dialect WKB into the stored-geometry envelope.
pub(crate) fn wkb_to_stored_geometry(wkb: &[u8], srid: i32) -> Vec<u8> {
    let mut blob = Vec::with_capacity(wkb.len() + STORED_HEADER_LEN);
    blob.push(STORED_START);
    blob.push(0x01);
    blob.extend_from_slice(&srid.to_le_bytes());
    blob.extend_from_slice(wkb);
    blob
}

/// Strip the stored-geometry envelope, returning the WKB payload.
pub(crate) fn stored_geometry_wkb(blob: &[u8]) -> Option<&[u8]> {
    if blob.len() <= STORED_HEADER_LEN || blob[0] != STORED_START {
        return None;
    }
    Some(&blob[STORED_HEADER_LEN..])
}

pub(crate) fn stored_geometry_srid(blob: &[u8]) -> Option<i32> {
    if blob.len() < STORED_HEADER_LEN || blob[0] != STORED_START {
        return None;
    }
    Some(i32::from_le_bytes([blob[2], blob[3], blob[4], blob[5]]))
}

/// Register all spatial SQL functions in the provided connection.
///
/// Example:
/// ```no_run
/// use rusqlite::Connection;
/// use rusqlite_spatialite::register_spatial_functions;
///
/// let conn = Connection::open_in_memory()?;
/// register_spatial_functions(&conn)?;
/// # Ok::<(), rusqlite_spatialite::SpatialiteError>(())
/// ```
pub fn register_spatial_functions(conn: &Connection) -> Result<()> {
    register_as_binary(conn)?;
    register_geom_from_wkb(conn)?;
    register_build_mbr(conn)?;
    register_mbr_predicate(conn, "MbrIntersects")?;
    // Exact intersection belongs to the spatial backend; this registration
    // answers with the MBR approximation.
    register_mbr_predicate(conn, "Intersects")?;
    register_filter_mbr_intersects(conn)?;
    register_bounds_component(conn, "MbrMinX", |b| b.minx)?;
    register_bounds_component(conn, "MbrMinY", |b| b.miny)?;
    register_bounds_component(conn, "MbrMaxX", |b| b.maxx)?;
    register_bounds_component(conn, "MbrMaxY", |b| b.maxy)?;
    register_geometry_type(conn)?;
    register_srid(conn)?;
    Ok(())
}

fn register_as_binary(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        "AsBinary",
        1,
        FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let blob = match blob_from_ctx(ctx, 0)? {
                Some(blob) => blob,
                None => return Ok(None),
            };
            Ok(stored_geometry_wkb(blob).map(|wkb| wkb.to_vec()))
        },
    )?;
    Ok(())
}

fn register_geom_from_wkb(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        "GeomFromWKB",
        2,
        FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let wkb = match blob_from_ctx(ctx, 0)? {
                Some(wkb) => wkb,
                None => return Ok(None),
            };
            let srid = ctx.get::<i32>(1)?;
            if wkb.len() < 5 {
                return Ok(None);
            }
            let endian = Endianness::from_marker(wkb[0]);
            let tag = crate::gaia::endian::load_u32([wkb[1], wkb[2], wkb[3], wkb[4]], endian);
            if decode_tag(tag).is_none() {
                return Ok(None);
            }
            Ok(Some(wkb_to_stored_geometry(wkb, srid)))
        },
    )?;
    Ok(())
}

fn register_build_mbr(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        "BuildMbr",
        4,
        FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let x1 = ctx.get::<f64>(0)?;
            let y1 = ctx.get::<f64>(1)?;
            let x2 = ctx.get::<f64>(2)?;
            let y2 = ctx.get::<f64>(3)?;

            let (minx, maxx) = (x1.min(x2), x1.max(x2));
            let (miny, maxy) = (y1.min(y2), y1.max(y2));

            let mut wkb = vec![0x01];
            store_u32(&mut wkb, TAG_POLYGON, Endianness::Little);
            store_u32(&mut wkb, 1, Endianness::Little);
            store_u32(&mut wkb, 5, Endianness::Little);
            for (x, y) in [
                (minx, miny),
                (maxx, miny),
                (maxx, maxy),
                (minx, maxy),
                (minx, miny),
            ] {
                store_f64(&mut wkb, x, Endianness::Little);
                store_f64(&mut wkb, y, Endianness::Little);
            }
            Ok(Some(wkb_to_stored_geometry(&wkb, 0)))
        },
    )?;
    Ok(())
}

fn register_mbr_predicate(conn: &Connection, name: &str) -> Result<()> {
    conn.create_scalar_function(name, 2, FunctionFlags::SQLITE_DETERMINISTIC, |ctx| {
        let a = match bounds_from_ctx(ctx, 0)? {
            Some(bounds) => bounds,
            None => return Ok(None),
        };
        let b = match bounds_from_ctx(ctx, 1)? {
            Some(bounds) => bounds,
            None => return Ok(None),
        };
        Ok(Some(i64::from(a.intersects(&b))))
    })?;
    Ok(())
}

fn register_filter_mbr_intersects(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        "FilterMbrIntersects",
        4,
        FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let x1 = ctx.get::<f64>(0)?;
            let y1 = ctx.get::<f64>(1)?;
            let x2 = ctx.get::<f64>(2)?;
            let y2 = ctx.get::<f64>(3)?;
            Ok(Some(format!(
                "FilterMbrIntersects({x1:.6}, {y1:.6}, {x2:.6}, {y2:.6})"
            )))
        },
    )?;
    Ok(())
}

fn register_bounds_component<F>(conn: &Connection, name: &str, f: F) -> Result<()>
where
    F: Fn(Bounds) -> f64 + Copy + Send + Sync + 'static,
{
    conn.create_scalar_function(name, 1, FunctionFlags::SQLITE_DETERMINISTIC, move |ctx| {
        let bounds = match bounds_from_ctx(ctx, 0)? {
            Some(bounds) => bounds,
            None => return Ok(None),
        };
        Ok(Some(f(bounds)))
    })?;
    Ok(())
}

fn register_geometry_type(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        "GeometryType",
        1,
        FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let blob = match blob_from_ctx(ctx, 0)? {
                Some(blob) => blob,
                None => return Ok(None),
            };
            let wkb = match stored_geometry_wkb(blob) {
                Some(wkb) if wkb.len() >= 5 => wkb,
                _ => return Ok(None),
            };
            let endian = Endianness::from_marker(wkb[0]);
            let tag = crate::gaia::endian::load_u32([wkb[1], wkb[2], wkb[3], wkb[4]], endian);
            Ok(decode_tag(tag).map(|(kind, _)| geometry_type_to_str(kind).to_string()))
        },
    )?;
    Ok(())
}

fn register_srid(conn: &Connection) -> Result<()> {
    conn.create_scalar_function("Srid", 1, FunctionFlags::SQLITE_DETERMINISTIC, |ctx| {
        let blob = match blob_from_ctx(ctx, 0)? {
            Some(blob) => blob,
            None => return Ok(None),
        };
        Ok(stored_geometry_srid(blob).map(i64::from))
    })?;
    Ok(())
}

fn blob_from_ctx<'a>(
    ctx: &'a Context<'a>,
    idx: usize,
) -> std::result::Result<Option<&'a [u8]>, Error> {
    match ctx.get_raw(idx) {
        ValueRef::Null => Ok(None),
        ValueRef::Blob(blob) => Ok(Some(blob)),
        _ => Err(Error::InvalidFunctionParameterType(idx, Type::Blob)),
    }
}

fn bounds_from_ctx(ctx: &Context<'_>, idx: usize) -> std::result::Result<Option<Bounds>, Error> {
    let blob = match blob_from_ctx(ctx, idx)? {
        Some(blob) => blob,
        None => return Ok(None),
    };
    let wkb_bytes = match stored_geometry_wkb(blob) {
        Some(bytes) => bytes,
        None => return Ok(None),
    };
    let wkb = match Wkb::try_new(wkb_bytes) {
        Ok(wkb) => wkb,
        Err(_) => return Ok(None),
    };
    Ok(bounds_from_geometry(&wkb))
}

fn bounds_from_geometry<G: GeometryTrait<T = f64>>(geom: &G) -> Option<Bounds> {
    use geo_traits::GeometryType as GeoType;

    let mut bounds: Option<Bounds> = None;
    match geom.as_type() {
        GeoType::Point(point) => {
            if let Some(coord) = point.coord() {
                add_coord(&mut bounds, &coord);
            }
        }
        GeoType::LineString(line) => {
            for coord in line.coords() {
                add_coord(&mut bounds, &coord);
            }
        }
        GeoType::Polygon(poly) => {
            if let Some(ring) = poly.exterior() {
                add_line_string(&mut bounds, &ring);
            }
            for ring in poly.interiors() {
                add_line_string(&mut bounds, &ring);
            }
        }
        GeoType::MultiPoint(multi) => {
            for point in multi.points() {
                if let Some(coord) = point.coord() {
                    add_coord(&mut bounds, &coord);
                }
            }
        }
        GeoType::MultiLineString(multi) => {
            for line in multi.line_strings() {
                add_line_string(&mut bounds, &line);
            }
        }
        GeoType::MultiPolygon(multi) => {
            for poly in multi.polygons() {
                if let Some(ring) = poly.exterior() {
                    add_line_string(&mut bounds, &ring);
                }
                for ring in poly.interiors() {
                    add_line_string(&mut bounds, &ring);
                }
            }
        }
        GeoType::GeometryCollection(collection) => {
            for sub_geom in collection.geometries() {
                if let Some(sub_bounds) = bounds_from_geometry(&sub_geom) {
                    merge_bounds(&mut bounds, sub_bounds);
                }
            }
        }
        GeoType::Rect(_) | GeoType::Triangle(_) | GeoType::Line(_) => {
            // Nothing in either WKB dialect maps to these.
            unreachable!()
        }
    }

    bounds
}

fn add_line_string<L: LineStringTrait<T = f64>>(bounds: &mut Option<Bounds>, line: &L) {
    for coord in line.coords() {
        add_coord(bounds, &coord);
    }
}

fn add_coord<C: CoordTrait<T = f64>>(bounds: &mut Option<Bounds>, coord: &C) {
    let (x, y) = coord.x_y();
    match bounds {
        Some(existing) => {
            existing.minx = existing.minx.min(x);
            existing.maxx = existing.maxx.max(x);
            existing.miny = existing.miny.min(y);
            existing.maxy = existing.maxy.max(y);
        }
        None => {
            *bounds = Some(Bounds {
                minx: x,
                maxx: x,
                miny: y,
                maxy: y,
            });
        }
    }
}

fn merge_bounds(bounds: &mut Option<Bounds>, other: Bounds) {
    match bounds {
        Some(existing) => {
            existing.minx = existing.minx.min(other.minx);
            existing.maxx = existing.maxx.max(other.maxx);
            existing.miny = existing.miny.min(other.miny);
            existing.maxy = existing.maxy.max(other.maxy);
        }
        None => *bounds = Some(other),
    }
}
