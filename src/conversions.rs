use crate::error::SpatialiteError;
use crate::types::FieldType;

#[inline]
pub(crate) fn geometry_type_to_str(geometry_type: wkb::reader::GeometryType) -> &'static str {
    match geometry_type {
        wkb::reader::GeometryType::Point => "POINT",
        wkb::reader::GeometryType::LineString => "LINESTRING",
        wkb::reader::GeometryType::Polygon => "POLYGON",
        wkb::reader::GeometryType::MultiPoint => "MULTIPOINT",
        wkb::reader::GeometryType::MultiLineString => "MULTILINESTRING",
        wkb::reader::GeometryType::MultiPolygon => "MULTIPOLYGON",
        wkb::reader::GeometryType::GeometryCollection => "GEOMETRYCOLLECTION",
        _ => unreachable!(),
    }
}

/// Map a geometry type name found in the spatial catalogs (or returned by
/// `GeometryType()`) to its WKB geometry type.
#[inline]
pub(crate) fn geometry_type_from_str(
    geometry_type_str: &str,
) -> Result<wkb::reader::GeometryType, SpatialiteError> {
    let s = geometry_type_str;
    if s.eq_ignore_ascii_case("POINT") {
        Ok(wkb::reader::GeometryType::Point)
    } else if s.eq_ignore_ascii_case("LINESTRING") {
        Ok(wkb::reader::GeometryType::LineString)
    } else if s.eq_ignore_ascii_case("POLYGON") {
        Ok(wkb::reader::GeometryType::Polygon)
    } else if s.eq_ignore_ascii_case("MULTIPOINT") {
        Ok(wkb::reader::GeometryType::MultiPoint)
    } else if s.eq_ignore_ascii_case("MULTILINESTRING") {
        Ok(wkb::reader::GeometryType::MultiLineString)
    } else if s.eq_ignore_ascii_case("MULTIPOLYGON") {
        Ok(wkb::reader::GeometryType::MultiPolygon)
    } else {
        Err(SpatialiteError::LayerInvalid(format!(
            "unsupported geometry type: {geometry_type_str}"
        )))
    }
}

/// Parse the catalog's `coord_dimension` column. SpatiaLite databases in the
/// wild carry both the symbolic and the numeric spelling.
#[inline]
pub(crate) fn dimension_from_str(dims: &str) -> Result<wkb::reader::Dimension, SpatialiteError> {
    if dims.eq_ignore_ascii_case("XY") || dims == "2" {
        Ok(wkb::reader::Dimension::Xy)
    } else if dims.eq_ignore_ascii_case("XYZ") || dims == "3" {
        Ok(wkb::reader::Dimension::Xyz)
    } else if dims.eq_ignore_ascii_case("XYM") {
        Ok(wkb::reader::Dimension::Xym)
    } else if dims.eq_ignore_ascii_case("XYZM") {
        Ok(wkb::reader::Dimension::Xyzm)
    } else {
        Err(SpatialiteError::LayerInvalid(format!(
            "unsupported coord_dimension: {dims}"
        )))
    }
}

/// Number of doubles per coordinate for a declared dimensionality.
#[inline]
pub(crate) fn coord_count(dims: wkb::reader::Dimension) -> usize {
    match dims {
        wkb::reader::Dimension::Xy => 2,
        wkb::reader::Dimension::Xyz | wkb::reader::Dimension::Xym => 3,
        wkb::reader::Dimension::Xyzm => 4,
    }
}

/// Guess a logical type from the declared SQL type of a column. Any SQLite
/// value can be represented as text, so that is the fallback.
#[inline]
pub(crate) fn field_type_from_declared(declared: &str) -> FieldType {
    let s = declared;
    if s.eq_ignore_ascii_case("int")
        || s.eq_ignore_ascii_case("integer")
        || s.eq_ignore_ascii_case("bigint")
        || s.eq_ignore_ascii_case("smallint")
        || s.eq_ignore_ascii_case("tinyint")
        || s.eq_ignore_ascii_case("boolean")
    {
        FieldType::Integer
    } else if s.eq_ignore_ascii_case("real")
        || s.eq_ignore_ascii_case("double")
        || s.eq_ignore_ascii_case("double precision")
        || s.eq_ignore_ascii_case("float")
    {
        FieldType::Double
    } else {
        FieldType::Text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wkb::reader::{Dimension, GeometryType};

    #[test]
    fn geometry_type_names_roundtrip() {
        for geometry_type in [
            GeometryType::Point,
            GeometryType::LineString,
            GeometryType::Polygon,
            GeometryType::MultiPoint,
            GeometryType::MultiLineString,
            GeometryType::MultiPolygon,
        ] {
            let name = geometry_type_to_str(geometry_type);
            assert_eq!(geometry_type_from_str(name).unwrap(), geometry_type);
        }
    }

    #[test]
    fn geometry_type_is_case_insensitive() {
        assert_eq!(
            geometry_type_from_str("multiPolygon").unwrap(),
            GeometryType::MultiPolygon
        );
        assert!(geometry_type_from_str("CIRCULARSTRING").is_err());
    }

    #[test]
    fn collections_cannot_be_declared_in_catalogs() {
        assert!(geometry_type_from_str("GEOMETRYCOLLECTION").is_err());
    }

    #[test]
    fn dimension_accepts_numeric_spellings() {
        assert_eq!(dimension_from_str("XY").unwrap(), Dimension::Xy);
        assert_eq!(dimension_from_str("2").unwrap(), Dimension::Xy);
        assert_eq!(dimension_from_str("XYZ").unwrap(), Dimension::Xyz);
        assert_eq!(dimension_from_str("3").unwrap(), Dimension::Xyz);
        assert_eq!(dimension_from_str("XYM").unwrap(), Dimension::Xym);
        assert_eq!(dimension_from_str("XYZM").unwrap(), Dimension::Xyzm);
        assert!(dimension_from_str("4").is_err());
    }

    #[test]
    fn field_types_follow_declared_sql_types() {
        assert_eq!(field_type_from_declared("INTEGER"), FieldType::Integer);
        assert_eq!(field_type_from_declared("boolean"), FieldType::Integer);
        assert_eq!(field_type_from_declared("DOUBLE PRECISION"), FieldType::Double);
        assert_eq!(field_type_from_declared("real"), FieldType::Double);
        assert_eq!(field_type_from_declared("VARCHAR(32)"), FieldType::Text);
        assert_eq!(field_type_from_declared("BLOB"), FieldType::Text);
    }
}
