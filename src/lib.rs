//! SpatiaLite vector data provider built on top of rusqlite.
//!
//! ## Overview
//!
//! - `SpatialiteProvider` represents one layer of a SpatiaLite database.
//! - `FeatureCursor` streams features out of a layer.
//! - `Feature` represents a single row: id, attributes, geometry.
//! - The `gaia` module translates between the storage engine's extended WKB
//!   dialect and the 3D dialect the geometry runtime consumes.
//!
//! A layer is addressed by a data source URI:
//! `<dbfile>|table=<t>|geometrycolumn=<g>|key=<k>|sql=<subset>`.
//!
//! ```no_run
//! use rusqlite_spatialite::SpatialiteProvider;
//!
//! let layer = SpatialiteProvider::open("data/cities.sqlite|table=cities|geometrycolumn=geom")?;
//! assert_eq!(layer.srid(), 4326);
//! # Ok::<(), rusqlite_spatialite::SpatialiteError>(())
//! ```
//!
//! ## Selecting features
//!
//! `select` takes a `FeatureRequest`: the attribute indices to project, an
//! optional bounding box (routed through whichever spatial index the catalog
//! advertises), and whether to fetch geometry. Geometries come back in the
//! native WKB dialect and parse with the `wkb` crate.
//!
//! ```no_run
//! use rusqlite_spatialite::{FeatureRequest, Rect, SpatialiteProvider};
//!
//! let layer = SpatialiteProvider::open("data/cities.sqlite|table=cities|geometrycolumn=geom")?;
//! let request = FeatureRequest {
//!     attributes: vec![0, 1],
//!     rect: Some(Rect::new(0.0, 0.0, 10.0, 10.0)),
//!     ..Default::default()
//! };
//! for feature in layer.select(&request)? {
//!     let feature = feature?;
//!     if let Some(geom) = feature.geometry()? {
//!         let _kind = geom.geometry_type();
//!     }
//! }
//! # Ok::<(), rusqlite_spatialite::SpatialiteError>(())
//! ```
//!
//! ## Writing
//!
//! Mutations are batched and transactional: a failed row rolls back the
//! whole batch. They are refused on layers that classify as views, virtual
//! shapes or subqueries, or that the catalog marks read-only.
//!
//! ```no_run
//! use rusqlite_spatialite::{NewFeature, SpatialiteProvider, Value};
//!
//! let mut layer =
//!     SpatialiteProvider::open("data/cities.sqlite|table=cities|geometrycolumn=geom")?;
//! let feature = NewFeature::from_geometry(
//!     &geo_types::Point::new(1.0, 2.0),
//!     vec![Value::Null, Value::Text("alpha".to_string())],
//! )?;
//! layer.add_features(&[feature])?;
//! # Ok::<(), rusqlite_spatialite::SpatialiteError>(())
//! ```

mod catalog;
mod conversions;
mod error;
pub mod gaia;
mod pool;
mod provider;
mod spatial_functions;
mod sql;
mod types;
mod uri;

#[cfg(test)]
mod test_support;

pub use catalog::{LayerKind, SpatialIndexKind};
pub use error::{Result, SpatialiteError};
pub use gaia::codec::{from_native_wkb, to_native_wkb};
pub use provider::{
    AttributeChange, Feature, FeatureCursor, FeatureRequest, NewColumn, NewFeature,
    SpatialiteProvider,
};
pub use spatial_functions::register_spatial_functions;
pub use sql::init_spatial_metadata;
pub use types::{Field, FieldType, Rect, capabilities};
pub use uri::SpatialiteUri;

// Re-export types used in public fields to keep the public API stable.
pub use rusqlite::types::Value;
pub use wkb::reader::{Dimension, GeometryType, Wkb};

pub const SPATIALITE_KEY: &str = "spatialite";
pub const SPATIALITE_DESCRIPTION: &str = "SpatiaLite data provider";

/// Plugin entry point: open a layer handle from its data source URI.
pub fn class_factory(uri: &str) -> Result<SpatialiteProvider> {
    SpatialiteProvider::open(uri)
}

/// The key this provider registers under.
pub fn provider_key() -> &'static str {
    SPATIALITE_KEY
}

/// Human-readable provider description.
pub fn description() -> &'static str {
    SPATIALITE_DESCRIPTION
}

/// Marks this library as a data provider plugin.
pub fn is_provider() -> bool {
    true
}

#[cfg(test)]
mod tests {
    #[test]
    fn plugin_surface_is_stable() {
        assert_eq!(super::provider_key(), "spatialite");
        assert_eq!(super::description(), "SpatiaLite data provider");
        assert!(super::is_provider());
    }
}
