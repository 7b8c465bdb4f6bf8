use crate::conversions::coord_count;
use crate::error::{Result, SpatialiteError};
use crate::gaia::endian::{Endianness, WkbReader, load_u32};
use crate::gaia::tags::decode_tag;
use wkb::reader::{Dimension, GeometryType};

/// Walk a WKB blob of either dialect without writing anything and return the
/// byte size its conversion will occupy when every coordinate is emitted
/// with the target dimensionality's component count.
///
/// The walk is fully bounds-checked: a count field that implies more payload
/// than the blob carries surfaces as `TruncatedWkb` instead of a bogus size.
pub fn converted_size(blob: &[u8], target: Dimension) -> Result<usize> {
    if blob.len() < 5 {
        return Err(SpatialiteError::WkbTooShort { len: blob.len() });
    }
    let endian = Endianness::from_marker(blob[0]);
    let tag = load_u32([blob[1], blob[2], blob[3], blob[4]], endian);
    let (kind, src_dims) = decode_tag(tag).ok_or(SpatialiteError::UnknownWkbTag(tag))?;

    let mut reader = WkbReader::new(blob, 5, endian);
    let body = body_size(
        &mut reader,
        kind,
        coord_count(src_dims),
        coord_count(target),
        true,
    )?;
    Ok(5 + body)
}

fn body_size(
    reader: &mut WkbReader<'_>,
    kind: GeometryType,
    src: usize,
    tgt: usize,
    top_level: bool,
) -> Result<usize> {
    match kind {
        GeometryType::Point => {
            reader.skip_f64s(src)?;
            Ok(tgt * 8)
        }
        GeometryType::LineString => {
            let points = reader.read_u32()? as usize;
            reader.skip_f64s(points * src)?;
            Ok(4 + points * tgt * 8)
        }
        GeometryType::Polygon => {
            let rings = reader.read_u32()?;
            let mut size = 4;
            for _ in 0..rings {
                let points = reader.read_u32()? as usize;
                reader.skip_f64s(points * src)?;
                size += 4 + points * tgt * 8;
            }
            Ok(size)
        }
        GeometryType::MultiPoint
        | GeometryType::MultiLineString
        | GeometryType::MultiPolygon
        | GeometryType::GeometryCollection
            if top_level =>
        {
            let entities = reader.read_u32()?;
            let mut size = 4;
            for _ in 0..entities {
                // Each sub-geometry repeats the endian-and-tag prefix; the
                // top-level byte order governs the whole blob.
                reader.read_u8()?;
                let sub_tag = reader.read_u32()?;
                let (sub_kind, sub_dims) =
                    decode_tag(sub_tag).ok_or(SpatialiteError::UnknownWkbTag(sub_tag))?;
                if !matches!(
                    sub_kind,
                    GeometryType::Point | GeometryType::LineString | GeometryType::Polygon
                ) {
                    // Containers never nest inside another container.
                    return Err(SpatialiteError::UnknownWkbTag(sub_tag));
                }
                size += 5 + body_size(reader, sub_kind, coord_count(sub_dims), tgt, false)?;
            }
            Ok(size)
        }
        _ => unreachable!(),
    }
}

#[cfg(test)]
mod tests {
    use super::converted_size;
    use crate::error::SpatialiteError;
    use crate::gaia::endian::{Endianness, store_f64, store_u32};
    use wkb::reader::Dimension;

    fn extended_point(tag: u32, coords: &[f64]) -> Vec<u8> {
        let mut blob = vec![0x01];
        store_u32(&mut blob, tag, Endianness::Little);
        for c in coords {
            store_f64(&mut blob, *c, Endianness::Little);
        }
        blob
    }

    #[test]
    fn point_sizes_follow_target_dimensionality() {
        let blob = extended_point(1, &[1.0, 2.0]);
        assert_eq!(converted_size(&blob, Dimension::Xy).unwrap(), 21);
        assert_eq!(converted_size(&blob, Dimension::Xyz).unwrap(), 29);
        assert_eq!(converted_size(&blob, Dimension::Xyzm).unwrap(), 37);
    }

    #[test]
    fn linestring_size_counts_points() {
        // XYZM linestring with two coordinates.
        let mut blob = vec![0x01];
        store_u32(&mut blob, 3002, Endianness::Little);
        store_u32(&mut blob, 2, Endianness::Little);
        for c in [0.0, 0.0, 5.0, 9.0, 1.0, 1.0, 6.0, 9.0] {
            store_f64(&mut blob, c, Endianness::Little);
        }
        // 5-byte header + 4-byte count + 2 * 3 doubles.
        assert_eq!(converted_size(&blob, Dimension::Xyz).unwrap(), 57);
    }

    #[test]
    fn multipoint_counts_nested_headers() {
        let mut blob = vec![0x01];
        store_u32(&mut blob, 1004, Endianness::Little);
        store_u32(&mut blob, 2, Endianness::Little);
        for (x, y, z) in [(0.0, 0.0, 1.0), (2.0, 2.0, 3.0)] {
            blob.push(0x01);
            store_u32(&mut blob, 1001, Endianness::Little);
            store_f64(&mut blob, x, Endianness::Little);
            store_f64(&mut blob, y, Endianness::Little);
            store_f64(&mut blob, z, Endianness::Little);
        }
        // 5 + 4 + 2 * (5 + 2 * 8) per XY target.
        assert_eq!(converted_size(&blob, Dimension::Xy).unwrap(), 51);
        assert_eq!(converted_size(&blob, Dimension::Xyz).unwrap(), 67);
    }

    #[test]
    fn truncated_counts_are_errors() {
        // Declares ten points but carries one.
        let mut blob = vec![0x01];
        store_u32(&mut blob, 2, Endianness::Little);
        store_u32(&mut blob, 10, Endianness::Little);
        store_f64(&mut blob, 0.0, Endianness::Little);
        store_f64(&mut blob, 0.0, Endianness::Little);
        assert!(matches!(
            converted_size(&blob, Dimension::Xy),
            Err(SpatialiteError::TruncatedWkb { .. })
        ));
    }

    #[test]
    fn short_and_unknown_blobs_are_errors() {
        assert!(matches!(
            converted_size(&[0x01, 0x01, 0x00], Dimension::Xy),
            Err(SpatialiteError::WkbTooShort { len: 3 })
        ));
        let blob = extended_point(999, &[1.0, 2.0]);
        assert!(matches!(
            converted_size(&blob, Dimension::Xy),
            Err(SpatialiteError::UnknownWkbTag(999))
        ));
    }

    #[test]
    fn big_endian_counts_are_honoured() {
        let mut blob = vec![0x00];
        store_u32(&mut blob, 2, Endianness::Big);
        store_u32(&mut blob, 3, Endianness::Big);
        for c in [0.0, 0.0, 1.0, 1.0, 2.0, 2.0] {
            store_f64(&mut blob, c, Endianness::Big);
        }
        assert_eq!(converted_size(&blob, Dimension::Xyz).unwrap(), 5 + 4 + 3 * 24);
    }
}
