//! Translation between the two WKB dialects the provider speaks.
//!
//! The storage engine keeps geometries in the *extended* dialect, whose tag
//! encodes the coordinate dimensionality (XY, XY Z, XY M, XY Z M) as a
//! +1000/+2000/+3000 family offset. The geometry runtime on the consumer
//! side speaks the *native* dialect: plain 2D tags, or Z-only tags in the
//! 1001..1007 range with three doubles per coordinate and no M anywhere.
//!
//! `codec` holds the two conversion entry points, `size` the dry-run size
//! calculator backing their allocations, `tags` the tag table shared by
//! both, and `endian` the byte-order primitives.

pub mod codec;
pub mod endian;
pub mod size;
pub mod tags;
