use crate::error::{Result, SpatialiteError};
use crate::gaia::endian::{Endianness, WkbReader, load_u32, store_f64, store_u32};
use crate::gaia::size::converted_size;
use crate::gaia::tags::{decode_tag, extended_tag, native_tag};
use wkb::reader::{Dimension, GeometryType};

/// Which way a blob is being translated.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Direction {
    ToNative,
    FromNative,
}

/// Translate an extended-dialect blob into the native dialect the geometry
/// runtime consumes.
///
/// A 2D blob destined for a 2D layer is copied through verbatim; every other
/// combination is streamed into the 3D native form: Z is carried over when
/// the source has it and zero-filled otherwise, and M is always dropped.
/// When `dims` declares Z or M for the layer, a plain 2D source is promoted
/// to the 3D form as well.
pub fn to_native_wkb(blob: &[u8], dims: Dimension) -> Result<Vec<u8>> {
    let (endian, kind, src_dims) = read_header(blob)?;

    if src_dims == Dimension::Xy && dims == Dimension::Xy {
        // The 2D form of both dialects coincides bit for bit.
        return Ok(blob.to_vec());
    }

    let mut out = Vec::with_capacity(converted_size(blob, Dimension::Xyz)?);
    out.push(Endianness::Little.marker());
    store_u32(&mut out, native_tag(kind, true), Endianness::Little);

    let mut reader = WkbReader::new(blob, 5, endian);
    convert_body(
        &mut reader,
        &mut out,
        kind,
        src_dims,
        dims,
        Direction::ToNative,
        true,
    )?;
    Ok(out)
}

/// Translate a native-dialect blob into the extended dialect with the
/// layer's declared dimensionality.
///
/// Z positions are filled from the source when it is 3D and zero-filled when
/// it is 2D; M positions are zero-filled unconditionally. A 2D source bound
/// for a 2D layer is the verbatim-copy case.
pub fn from_native_wkb(blob: &[u8], dims: Dimension) -> Result<Vec<u8>> {
    let (endian, kind, src_dims) = read_header(blob)?;
    if matches!(src_dims, Dimension::Xym | Dimension::Xyzm) {
        // The native dialect has no M-carrying tags.
        return Err(SpatialiteError::UnknownWkbTag(extended_tag(kind, src_dims)));
    }

    if src_dims == Dimension::Xy && dims == Dimension::Xy {
        return Ok(blob.to_vec());
    }

    let mut out = Vec::with_capacity(converted_size(blob, dims)?);
    out.push(Endianness::Little.marker());
    store_u32(&mut out, extended_tag(kind, dims), Endianness::Little);

    let mut reader = WkbReader::new(blob, 5, endian);
    convert_body(
        &mut reader,
        &mut out,
        kind,
        src_dims,
        dims,
        Direction::FromNative,
        true,
    )?;
    Ok(out)
}

fn read_header(blob: &[u8]) -> Result<(Endianness, GeometryType, Dimension)> {
    if blob.len() < 5 {
        return Err(SpatialiteError::WkbTooShort { len: blob.len() });
    }
    let endian = Endianness::from_marker(blob[0]);
    let tag = load_u32([blob[1], blob[2], blob[3], blob[4]], endian);
    let (kind, src_dims) = decode_tag(tag).ok_or(SpatialiteError::UnknownWkbTag(tag))?;
    Ok((endian, kind, src_dims))
}

fn convert_body(
    reader: &mut WkbReader<'_>,
    out: &mut Vec<u8>,
    kind: GeometryType,
    src_dims: Dimension,
    dims: Dimension,
    direction: Direction,
    top_level: bool,
) -> Result<()> {
    match kind {
        GeometryType::Point => convert_point(reader, out, src_dims, dims, direction),
        GeometryType::LineString => {
            let points = reader.read_u32()?;
            store_u32(out, points, Endianness::Little);
            for _ in 0..points {
                convert_point(reader, out, src_dims, dims, direction)?;
            }
            Ok(())
        }
        GeometryType::Polygon => {
            let rings = reader.read_u32()?;
            store_u32(out, rings, Endianness::Little);
            for _ in 0..rings {
                let points = reader.read_u32()?;
                store_u32(out, points, Endianness::Little);
                for _ in 0..points {
                    convert_point(reader, out, src_dims, dims, direction)?;
                }
            }
            Ok(())
        }
        GeometryType::MultiPoint
        | GeometryType::MultiLineString
        | GeometryType::MultiPolygon
        | GeometryType::GeometryCollection
            if top_level =>
        {
            let entities = reader.read_u32()?;
            store_u32(out, entities, Endianness::Little);
            for _ in 0..entities {
                // The nested endian marker is skipped; the top-level byte
                // order governs the whole blob.
                reader.read_u8()?;
                let sub_tag = reader.read_u32()?;
                let (sub_kind, sub_dims) =
                    decode_tag(sub_tag).ok_or(SpatialiteError::UnknownWkbTag(sub_tag))?;
                if !matches!(
                    sub_kind,
                    GeometryType::Point | GeometryType::LineString | GeometryType::Polygon
                ) {
                    return Err(SpatialiteError::UnknownWkbTag(sub_tag));
                }
                if direction == Direction::FromNative
                    && matches!(sub_dims, Dimension::Xym | Dimension::Xyzm)
                {
                    return Err(SpatialiteError::UnknownWkbTag(sub_tag));
                }

                out.push(Endianness::Little.marker());
                let out_tag = match direction {
                    Direction::ToNative => native_tag(sub_kind, true),
                    Direction::FromNative => extended_tag(sub_kind, dims),
                };
                store_u32(out, out_tag, Endianness::Little);
                convert_body(reader, out, sub_kind, sub_dims, dims, direction, false)?;
            }
            Ok(())
        }
        _ => unreachable!(),
    }
}

fn convert_point(
    reader: &mut WkbReader<'_>,
    out: &mut Vec<u8>,
    src_dims: Dimension,
    dims: Dimension,
    direction: Direction,
) -> Result<()> {
    let x = reader.read_f64()?;
    let y = reader.read_f64()?;
    store_f64(out, x, Endianness::Little);
    store_f64(out, y, Endianness::Little);

    match direction {
        Direction::ToNative => match src_dims {
            Dimension::Xy => store_f64(out, 0.0, Endianness::Little),
            Dimension::Xyz => {
                let z = reader.read_f64()?;
                store_f64(out, z, Endianness::Little);
            }
            Dimension::Xym => {
                store_f64(out, 0.0, Endianness::Little);
                reader.skip_f64s(1)?;
            }
            Dimension::Xyzm => {
                let z = reader.read_f64()?;
                store_f64(out, z, Endianness::Little);
                reader.skip_f64s(1)?;
            }
        },
        Direction::FromNative => {
            let z = if src_dims == Dimension::Xyz {
                Some(reader.read_f64()?)
            } else {
                None
            };
            if matches!(dims, Dimension::Xyz | Dimension::Xyzm) {
                store_f64(out, z.unwrap_or(0.0), Endianness::Little);
            }
            if matches!(dims, Dimension::Xym | Dimension::Xyzm) {
                store_f64(out, 0.0, Endianness::Little);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{from_native_wkb, to_native_wkb};
    use crate::Result;
    use crate::error::SpatialiteError;
    use crate::gaia::endian::{Endianness, load_f64, load_u32, store_f64, store_u32};
    use crate::gaia::size::converted_size;
    use wkb::reader::Dimension;

    fn blob(endian: Endianness, tag: u32, counts_and_coords: &[Piece]) -> Vec<u8> {
        let mut out = vec![endian.marker()];
        store_u32(&mut out, tag, endian);
        for piece in counts_and_coords {
            match piece {
                Piece::Count(n) => store_u32(&mut out, *n, endian),
                Piece::Coord(c) => store_f64(&mut out, *c, endian),
                Piece::SubHeader(tag) => {
                    out.push(endian.marker());
                    store_u32(&mut out, *tag, endian);
                }
            }
        }
        out
    }

    enum Piece {
        Count(u32),
        Coord(f64),
        SubHeader(u32),
    }
    use Piece::{Coord, Count, SubHeader};

    fn tag_of(blob: &[u8]) -> u32 {
        load_u32([blob[1], blob[2], blob[3], blob[4]], Endianness::from_marker(blob[0]))
    }

    fn coords_of(blob: &[u8], offset: usize, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| {
                let at = offset + i * 8;
                let bytes: [u8; 8] = blob[at..at + 8].try_into().unwrap();
                load_f64(bytes, Endianness::from_marker(blob[0]))
            })
            .collect()
    }

    #[test]
    fn promotes_2d_point_to_native_3d() -> Result<()> {
        // 01 01000000 | x = 1.0 | y = 2.0
        let point = blob(Endianness::Little, 1, &[Coord(1.0), Coord(2.0)]);
        let native = to_native_wkb(&point, Dimension::Xyz)?;

        assert_eq!(native.len(), 29);
        assert_eq!(native[0], 0x01);
        assert_eq!(tag_of(&native), 1001);
        assert_eq!(coords_of(&native, 5, 3), vec![1.0, 2.0, 0.0]);
        assert_eq!(native.len(), converted_size(&point, Dimension::Xyz)?);
        Ok(())
    }

    #[test]
    fn copies_2d_blob_verbatim_for_2d_layer() -> Result<()> {
        let point = blob(Endianness::Little, 1, &[Coord(1.0), Coord(2.0)]);
        assert_eq!(to_native_wkb(&point, Dimension::Xy)?, point);
        assert_eq!(from_native_wkb(&point, Dimension::Xy)?, point);
        Ok(())
    }

    #[test]
    fn native_3d_linestring_to_extended_xyz() -> Result<()> {
        let line = blob(
            Endianness::Little,
            1002,
            &[
                Count(2),
                Coord(0.0),
                Coord(0.0),
                Coord(5.0),
                Coord(1.0),
                Coord(1.0),
                Coord(6.0),
            ],
        );
        let extended = from_native_wkb(&line, Dimension::Xyz)?;

        assert_eq!(extended.len(), 57);
        assert_eq!(tag_of(&extended), 1002);
        assert_eq!(
            coords_of(&extended, 9, 6),
            vec![0.0, 0.0, 5.0, 1.0, 1.0, 6.0]
        );
        assert_eq!(extended.len(), converted_size(&line, Dimension::Xyz)?);
        Ok(())
    }

    #[test]
    fn xym_source_zero_fills_z_and_drops_m() -> Result<()> {
        let line = blob(
            Endianness::Little,
            2002,
            &[
                Count(2),
                Coord(0.0),
                Coord(0.0),
                Coord(5.0),
                Coord(1.0),
                Coord(1.0),
                Coord(6.0),
            ],
        );
        let native = to_native_wkb(&line, Dimension::Xym)?;

        assert_eq!(tag_of(&native), 1002);
        assert_eq!(
            coords_of(&native, 9, 6),
            vec![0.0, 0.0, 0.0, 1.0, 1.0, 0.0]
        );
        assert_eq!(native.len(), converted_size(&line, Dimension::Xyz)?);
        Ok(())
    }

    #[test]
    fn xyzm_roundtrip_zeroes_every_m_slot() -> Result<()> {
        let point = blob(
            Endianness::Little,
            3001,
            &[Coord(7.0), Coord(8.0), Coord(9.0), Coord(42.0)],
        );
        let native = to_native_wkb(&point, Dimension::Xyzm)?;
        assert_eq!(tag_of(&native), 1001);
        assert_eq!(coords_of(&native, 5, 3), vec![7.0, 8.0, 9.0]);

        let extended = from_native_wkb(&native, Dimension::Xyzm)?;
        assert_eq!(tag_of(&extended), 3001);
        assert_eq!(coords_of(&extended, 5, 4), vec![7.0, 8.0, 9.0, 0.0]);
        assert_eq!(extended.len(), converted_size(&native, Dimension::Xyzm)?);
        Ok(())
    }

    #[test]
    fn extended_xyz_roundtrips_through_native() -> Result<()> {
        // to_native(from_native(B)) must preserve tag and coordinates.
        let polygon = blob(
            Endianness::Little,
            1003,
            &[
                Count(1),
                Count(4),
                Coord(0.0),
                Coord(0.0),
                Coord(1.0),
                Coord(2.0),
                Coord(0.0),
                Coord(2.0),
                Coord(2.0),
                Coord(2.0),
                Coord(3.0),
                Coord(0.0),
                Coord(0.0),
                Coord(1.0),
            ],
        );
        let extended = from_native_wkb(&polygon, Dimension::Xyz)?;
        assert_eq!(extended, polygon);
        let native = to_native_wkb(&extended, Dimension::Xyz)?;
        assert_eq!(native, polygon);
        Ok(())
    }

    #[test]
    fn roundtrips_2d_collection_verbatim() -> Result<()> {
        let collection = blob(
            Endianness::Little,
            7,
            &[
                Count(2),
                SubHeader(1),
                Coord(-1.0),
                Coord(-2.0),
                SubHeader(2),
                Count(2),
                Coord(0.0),
                Coord(0.0),
                Coord(1.0),
                Coord(1.0),
            ],
        );
        let native = to_native_wkb(&from_native_wkb(&collection, Dimension::Xy)?, Dimension::Xy)?;
        assert_eq!(native, collection);
        Ok(())
    }

    #[test]
    fn collection_subgeometries_repeat_the_prefix() -> Result<()> {
        let collection = blob(
            Endianness::Little,
            1007,
            &[
                Count(2),
                SubHeader(1001),
                Coord(-1.0),
                Coord(-2.0),
                Coord(-3.0),
                SubHeader(1002),
                Count(2),
                Coord(0.0),
                Coord(0.0),
                Coord(4.0),
                Coord(1.0),
                Coord(1.0),
                Coord(5.0),
            ],
        );
        let native = to_native_wkb(&collection, Dimension::Xyz)?;

        assert_eq!(tag_of(&native), 1007);
        // First sub-geometry at offset 9, second after the 3-double point.
        assert_eq!(native[9], 0x01);
        assert_eq!(
            load_u32([native[10], native[11], native[12], native[13]], Endianness::Little),
            1001
        );
        let second = 9 + 5 + 24;
        assert_eq!(native[second], 0x01);
        assert_eq!(
            load_u32(
                [
                    native[second + 1],
                    native[second + 2],
                    native[second + 3],
                    native[second + 4]
                ],
                Endianness::Little
            ),
            1002
        );
        assert_eq!(native.len(), converted_size(&collection, Dimension::Xyz)?);
        Ok(())
    }

    #[test]
    fn multipolygon_zm_to_native_drops_m_everywhere() -> Result<()> {
        let multi = blob(
            Endianness::Little,
            3006,
            &[
                Count(1),
                SubHeader(3003),
                Count(1),
                Count(4),
                Coord(0.0),
                Coord(0.0),
                Coord(1.0),
                Coord(10.0),
                Coord(2.0),
                Coord(0.0),
                Coord(2.0),
                Coord(11.0),
                Coord(2.0),
                Coord(2.0),
                Coord(3.0),
                Coord(12.0),
                Coord(0.0),
                Coord(0.0),
                Coord(1.0),
                Coord(10.0),
            ],
        );
        let native = to_native_wkb(&multi, Dimension::Xyzm)?;

        assert_eq!(tag_of(&native), 1006);
        // 5 (header) + 4 (count) + 5 (sub header) + 4 + 4 + 4 * 24.
        assert_eq!(native.len(), 118);
        assert_eq!(coords_of(&native, 22, 3), vec![0.0, 0.0, 1.0]);
        assert_eq!(coords_of(&native, 46, 3), vec![2.0, 0.0, 2.0]);
        Ok(())
    }

    #[test]
    fn big_endian_source_is_normalized_to_little() -> Result<()> {
        let point = blob(
            Endianness::Big,
            1001,
            &[Coord(1.5), Coord(-2.5), Coord(3.5)],
        );
        let native = to_native_wkb(&point, Dimension::Xyz)?;
        assert_eq!(native[0], 0x01);
        assert_eq!(tag_of(&native), 1001);
        assert_eq!(coords_of(&native, 5, 3), vec![1.5, -2.5, 3.5]);
        Ok(())
    }

    #[test]
    fn short_blob_is_rejected() {
        assert!(matches!(
            to_native_wkb(&[0x01, 0x01, 0x00, 0x00], Dimension::Xy),
            Err(SpatialiteError::WkbTooShort { len: 4 })
        ));
        assert!(matches!(
            from_native_wkb(&[], Dimension::Xy),
            Err(SpatialiteError::WkbTooShort { len: 0 })
        ));
    }

    #[test]
    fn unknown_tags_are_rejected() {
        let bad = blob(Endianness::Little, 4242, &[Coord(0.0), Coord(0.0)]);
        assert!(matches!(
            to_native_wkb(&bad, Dimension::Xy),
            Err(SpatialiteError::UnknownWkbTag(4242))
        ));

        // The native dialect never carries M.
        let m_point = blob(
            Endianness::Little,
            2001,
            &[Coord(0.0), Coord(0.0), Coord(1.0)],
        );
        assert!(matches!(
            from_native_wkb(&m_point, Dimension::Xym),
            Err(SpatialiteError::UnknownWkbTag(2001))
        ));
    }

    #[test]
    fn overrunning_count_is_rejected() {
        let line = blob(
            Endianness::Little,
            1002,
            &[Count(3), Coord(0.0), Coord(0.0), Coord(0.0)],
        );
        assert!(matches!(
            to_native_wkb(&line, Dimension::Xyz),
            Err(SpatialiteError::TruncatedWkb { .. })
        ));
        assert!(matches!(
            from_native_wkb(&line, Dimension::Xyz),
            Err(SpatialiteError::TruncatedWkb { .. })
        ));
    }

    #[test]
    fn nested_container_tags_are_rejected() {
        let collection = blob(
            Endianness::Little,
            1007,
            &[Count(1), SubHeader(1004), Count(0)],
        );
        assert!(matches!(
            to_native_wkb(&collection, Dimension::Xyz),
            Err(SpatialiteError::UnknownWkbTag(1004))
        ));
    }

    #[test]
    fn written_sizes_match_the_size_calculator() -> Result<()> {
        let cases: Vec<(Vec<u8>, Dimension)> = vec![
            (
                blob(Endianness::Little, 1, &[Coord(1.0), Coord(2.0)]),
                Dimension::Xyz,
            ),
            (
                blob(
                    Endianness::Little,
                    2001,
                    &[Coord(1.0), Coord(2.0), Coord(3.0)],
                ),
                Dimension::Xym,
            ),
            (
                blob(
                    Endianness::Little,
                    1005,
                    &[
                        Count(1),
                        SubHeader(1002),
                        Count(2),
                        Coord(0.0),
                        Coord(0.0),
                        Coord(1.0),
                        Coord(2.0),
                        Coord(2.0),
                        Coord(2.0),
                    ],
                ),
                Dimension::Xyz,
            ),
        ];

        for (input, dims) in cases {
            let native = to_native_wkb(&input, dims)?;
            assert_eq!(native.len(), converted_size(&input, Dimension::Xyz)?);

            let extended = from_native_wkb(&native, dims)?;
            assert_eq!(extended.len(), converted_size(&native, dims)?);
        }
        Ok(())
    }
}
