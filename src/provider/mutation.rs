use crate::error::{Result, SpatialiteError};
use crate::gaia::codec::from_native_wkb;
use crate::provider::SpatialiteProvider;
use crate::sql::{
    add_column_sql, delete_feature_sql, insert_feature_sql, update_attributes_sql,
    update_geometry_sql,
};
use geo_traits::GeometryTrait;
use rusqlite::params_from_iter;
use rusqlite::types::Value;

/// A feature to insert: native-dialect WKB (or no geometry) plus one
/// attribute value per layer field, in field order. The value at the
/// primary-key position is ignored; the key is assigned by the database.
pub struct NewFeature {
    pub geometry: Option<Vec<u8>>,
    pub attributes: Vec<Value>,
}

impl NewFeature {
    pub fn new(geometry: Option<Vec<u8>>, attributes: Vec<Value>) -> Self {
        Self {
            geometry,
            attributes,
        }
    }

    /// Build a feature from any geometry, serialized to native WKB.
    pub fn from_geometry<G>(geometry: &G, attributes: Vec<Value>) -> Result<Self>
    where
        G: GeometryTrait<T = f64>,
    {
        let mut wkb = Vec::new();
        wkb::writer::write_geometry(&mut wkb, geometry, &Default::default())?;
        Ok(Self {
            geometry: Some(wkb),
            attributes,
        })
    }
}

/// Attribute changes for one feature: (field index, new value) pairs.
pub struct AttributeChange {
    pub feature_id: i64,
    pub values: Vec<(usize, Value)>,
}

/// A column to add to the layer's table.
pub struct NewColumn {
    pub name: String,
    pub declared_type: String,
}

impl SpatialiteProvider {
    /// Insert a batch of features as one transaction. Any failed row rolls
    /// the whole batch back; the feature count moves only on commit.
    pub fn add_features(&mut self, features: &[NewFeature]) -> Result<()> {
        self.ensure_writable()?;
        if features.is_empty() {
            return Ok(());
        }

        for feature in features {
            if feature.attributes.len() != self.fields().len() {
                return Err(SpatialiteError::AttributeCountMismatch {
                    expected: self.fields().len(),
                    got: feature.attributes.len(),
                });
            }
        }

        // Attribute columns skip the primary key; the geometry always binds
        // first through GeomFromWKB.
        let attr_fields = self.attribute_field_positions();
        let attr_names: Vec<&str> = attr_fields
            .iter()
            .map(|&idx| self.fields()[idx].name.as_str())
            .collect();
        let sql = insert_feature_sql(
            self.table_name(),
            self.primary_key(),
            self.geometry_column(),
            self.srid(),
            &attr_names,
        );
        let dims = self.coord_dimension();
        let srid_note = self.srid();

        let inserted;
        {
            let tx = self.conn().unchecked_transaction()?;
            {
                let mut stmt = tx.prepare(&sql)?;
                for feature in features {
                    let geometry = match &feature.geometry {
                        Some(native) => match from_native_wkb(native, dims) {
                            Ok(extended) => Value::Blob(extended),
                            Err(err) => {
                                log::warn!(
                                    "geometry for insert into srid {srid_note} not convertible: {err}"
                                );
                                Value::Null
                            }
                        },
                        None => Value::Null,
                    };
                    let params = std::iter::once(geometry).chain(
                        attr_fields
                            .iter()
                            .map(|&idx| feature.attributes[idx].clone()),
                    );
                    stmt.execute(params_from_iter(params))?;
                }
            }
            tx.commit()?;
            inserted = features.len() as i64;
        }
        self.adjust_feature_count(inserted);
        Ok(())
    }

    /// Delete a set of features by id, atomically.
    pub fn delete_features(&mut self, feature_ids: &[i64]) -> Result<()> {
        self.ensure_writable()?;
        if feature_ids.is_empty() {
            return Ok(());
        }

        let sql = delete_feature_sql(self.table_name());
        let deleted;
        {
            let tx = self.conn().unchecked_transaction()?;
            let mut count = 0usize;
            {
                let mut stmt = tx.prepare(&sql)?;
                for id in feature_ids {
                    count += stmt.execute([id])?;
                }
            }
            tx.commit()?;
            deleted = count as i64;
        }
        self.adjust_feature_count(-deleted);
        Ok(())
    }

    /// Replace geometries by feature id, atomically. A feature paired with
    /// no geometry gets SQL NULL.
    pub fn change_geometry_values(&mut self, changes: &[(i64, Option<Vec<u8>>)]) -> Result<()> {
        self.ensure_writable()?;
        if changes.is_empty() {
            return Ok(());
        }

        let sql = update_geometry_sql(self.table_name(), self.geometry_column(), self.srid());
        let dims = self.coord_dimension();

        let tx = self.conn().unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(&sql)?;
            for (feature_id, native) in changes {
                let geometry = match native {
                    Some(native) => match from_native_wkb(native, dims) {
                        Ok(extended) => Value::Blob(extended),
                        Err(err) => {
                            log::warn!("feature {feature_id}: geometry not convertible: {err}");
                            Value::Null
                        }
                    },
                    None => Value::Null,
                };
                stmt.execute(rusqlite::params![geometry, feature_id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Apply attribute updates feature by feature, atomically. Values bind
    /// as parameters; features with negative ids are skipped.
    pub fn change_attribute_values(&mut self, changes: &[AttributeChange]) -> Result<()> {
        self.ensure_writable()?;
        if changes.is_empty() {
            return Ok(());
        }

        let tx = self.conn().unchecked_transaction()?;
        for change in changes {
            if change.feature_id < 0 {
                continue;
            }
            if change.values.is_empty() {
                continue;
            }

            let columns = change
                .values
                .iter()
                .map(|(idx, _)| self.field(*idx).map(|field| field.name.as_str()))
                .collect::<Result<Vec<&str>>>()?;
            let sql = update_attributes_sql(self.table_name(), &columns);

            let params = change
                .values
                .iter()
                .map(|(_, value)| value.clone())
                .chain(std::iter::once(Value::Integer(change.feature_id)));
            tx.execute(&sql, params_from_iter(params))?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Add columns to the layer's table, atomically, then reload the field
    /// schema.
    pub fn add_attributes(&mut self, columns: &[NewColumn]) -> Result<()> {
        self.ensure_writable()?;
        if columns.is_empty() {
            return Ok(());
        }

        {
            let tx = self.conn().unchecked_transaction()?;
            for column in columns {
                let sql = add_column_sql(self.table_name(), &column.name, &column.declared_type);
                tx.execute(&sql, [])?;
            }
            tx.commit()?;
        }
        self.load_fields()
    }

    fn attribute_field_positions(&self) -> Vec<usize> {
        self.fields()
            .iter()
            .enumerate()
            .filter(|(_, field)| Some(field.name.as_str()) != self.primary_key())
            .map(|(idx, _)| idx)
            .collect()
    }
}
