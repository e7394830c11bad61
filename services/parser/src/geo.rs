//! Boundary index over a GeoJSON-like feature collection.
//!
//! Geometry is never interpreted here; only the `properties` of each feature
//! are read to derive a boundary id and a normalized name for the join.

use crate::names::normalize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use thiserror::Error;

/// Property lookup order for the feature id.
const ID_PROPERTIES: &[&str] = &["id", "ID", "fid", "FID", "nombre"];
/// Property lookup order for the feature name.
const NAME_PROPERTIES: &[&str] = &["nombre", "name", "NAME_1"];
const UNKNOWN_NAME: &str = "?";

#[derive(Debug, Error)]
pub enum GeoError {
    #[error("invalid boundary JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("boundary dataset has no 'features' array")]
    MissingFeatures,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryFeature {
    pub id: String,
    pub name: String,
    pub name_key: String,
}

#[derive(Debug, Clone)]
pub struct BoundarySet {
    raw: Value,
    features: Vec<BoundaryFeature>,
    by_name: HashMap<String, usize>,
    id_key: String,
}

fn property_text(props: &Map<String, Value>, key: &str) -> Option<String> {
    match props.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn first_property(props: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| property_text(props, k))
}

impl BoundarySet {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, GeoError> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::from_value(value)
    }

    pub fn from_value(raw: Value) -> Result<Self, GeoError> {
        let empty = Map::new();
        let items = raw
            .get("features")
            .and_then(Value::as_array)
            .ok_or(GeoError::MissingFeatures)?;

        let props_of = |feature: &Value| -> Map<String, Value> {
            feature
                .get("properties")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default()
        };

        let id_key = match items.first().map(props_of) {
            Some(sample) if sample.contains_key("id") => "properties.id",
            Some(sample) if sample.contains_key("nombre") => "properties.nombre",
            _ => "properties.name",
        }
        .to_string();

        let mut features = Vec::with_capacity(items.len());
        let mut by_name = HashMap::new();

        for (idx, item) in items.iter().enumerate() {
            let props = item
                .get("properties")
                .and_then(Value::as_object)
                .unwrap_or(&empty);
            let id = first_property(props, ID_PROPERTIES).unwrap_or_else(|| idx.to_string());
            let name =
                first_property(props, NAME_PROPERTIES).unwrap_or_else(|| UNKNOWN_NAME.to_string());
            let name_key = normalize(&name);

            // first feature wins on duplicate names
            by_name.entry(name_key.clone()).or_insert(idx);
            features.push(BoundaryFeature { id, name, name_key });
        }

        tracing::debug!(features = features.len(), id_key = %id_key, "indexed boundary features");

        Ok(Self {
            raw,
            features,
            by_name,
            id_key,
        })
    }

    /// Boundary id for a join key (see [`crate::names::join_key`]).
    pub fn lookup(&self, join_key: &str) -> Option<&str> {
        self.by_name
            .get(join_key)
            .map(|&idx| self.features[idx].id.as_str())
    }

    /// Property path a choropleth renderer should match `boundary_id` against.
    pub fn feature_id_key(&self) -> &str {
        &self.id_key
    }

    pub fn features(&self) -> &[BoundaryFeature] {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// The untouched dataset, geometry included.
    pub fn raw(&self) -> &Value {
        &self.raw
    }
}
