use wkb::reader::{Dimension, GeometryType};

pub const TAG_POINT: u32 = 1;
pub const TAG_LINESTRING: u32 = 2;
pub const TAG_POLYGON: u32 = 3;
pub const TAG_MULTIPOINT: u32 = 4;
pub const TAG_MULTILINESTRING: u32 = 5;
pub const TAG_MULTIPOLYGON: u32 = 6;
pub const TAG_GEOMETRYCOLLECTION: u32 = 7;

/// Family offsets of the extended dialect. The native dialect only uses the
/// base and Z families.
pub const Z_OFFSET: u32 = 1000;
pub const M_OFFSET: u32 = 2000;
pub const ZM_OFFSET: u32 = 3000;

fn base_tag(kind: GeometryType) -> u32 {
    match kind {
        GeometryType::Point => TAG_POINT,
        GeometryType::LineString => TAG_LINESTRING,
        GeometryType::Polygon => TAG_POLYGON,
        GeometryType::MultiPoint => TAG_MULTIPOINT,
        GeometryType::MultiLineString => TAG_MULTILINESTRING,
        GeometryType::MultiPolygon => TAG_MULTIPOLYGON,
        GeometryType::GeometryCollection => TAG_GEOMETRYCOLLECTION,
        _ => unreachable!(),
    }
}

fn kind_from_base(base: u32) -> Option<GeometryType> {
    match base {
        TAG_POINT => Some(GeometryType::Point),
        TAG_LINESTRING => Some(GeometryType::LineString),
        TAG_POLYGON => Some(GeometryType::Polygon),
        TAG_MULTIPOINT => Some(GeometryType::MultiPoint),
        TAG_MULTILINESTRING => Some(GeometryType::MultiLineString),
        TAG_MULTIPOLYGON => Some(GeometryType::MultiPolygon),
        TAG_GEOMETRYCOLLECTION => Some(GeometryType::GeometryCollection),
        _ => None,
    }
}

/// Extended-dialect tag for a shape and declared dimensionality.
pub fn extended_tag(kind: GeometryType, dims: Dimension) -> u32 {
    let offset = match dims {
        Dimension::Xy => 0,
        Dimension::Xyz => Z_OFFSET,
        Dimension::Xym => M_OFFSET,
        Dimension::Xyzm => ZM_OFFSET,
    };
    base_tag(kind) + offset
}

/// Native-dialect tag for a shape; 3D presence is encoded by the Z offset.
pub fn native_tag(kind: GeometryType, three_d: bool) -> u32 {
    if three_d {
        base_tag(kind) + Z_OFFSET
    } else {
        base_tag(kind)
    }
}

/// Decode a tag of either dialect into its shape and dimensionality family.
/// Native blobs only ever decode to the `Xy` and `Xyz` families.
pub fn decode_tag(tag: u32) -> Option<(GeometryType, Dimension)> {
    let (base, dims) = match tag {
        1..=7 => (tag, Dimension::Xy),
        1001..=1007 => (tag - Z_OFFSET, Dimension::Xyz),
        2001..=2007 => (tag - M_OFFSET, Dimension::Xym),
        3001..=3007 => (tag - ZM_OFFSET, Dimension::Xyzm),
        _ => return None,
    };
    kind_from_base(base).map(|kind| (kind, dims))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_KINDS: [GeometryType; 7] = [
        GeometryType::Point,
        GeometryType::LineString,
        GeometryType::Polygon,
        GeometryType::MultiPoint,
        GeometryType::MultiLineString,
        GeometryType::MultiPolygon,
        GeometryType::GeometryCollection,
    ];

    const ALL_DIMS: [Dimension; 4] = [
        Dimension::Xy,
        Dimension::Xyz,
        Dimension::Xym,
        Dimension::Xyzm,
    ];

    #[test]
    fn all_28_extended_tags_roundtrip() {
        for kind in ALL_KINDS {
            for dims in ALL_DIMS {
                let tag = extended_tag(kind, dims);
                assert!((1..=3007).contains(&tag));
                assert_eq!(decode_tag(tag), Some((kind, dims)));
            }
        }
    }

    #[test]
    fn native_tags_are_base_or_z_family() {
        for kind in ALL_KINDS {
            assert_eq!(native_tag(kind, false), extended_tag(kind, Dimension::Xy));
            assert_eq!(native_tag(kind, true), extended_tag(kind, Dimension::Xyz));
        }
        assert_eq!(native_tag(GeometryType::Point, true), 1001);
        assert_eq!(native_tag(GeometryType::GeometryCollection, true), 1007);
    }

    #[test]
    fn tags_outside_families_are_unknown() {
        for tag in [0, 8, 999, 1000, 1008, 2000, 2008, 3000, 3008, 4001] {
            assert_eq!(decode_tag(tag), None);
        }
    }
}
