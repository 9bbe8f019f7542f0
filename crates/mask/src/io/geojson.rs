use geo::{AffineOps, AffineTransform, Area, Orient, Polygon, orient::Direction};
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, JsonValue, Value, feature::Id};
use serde::Serialize;
use tracing::warn;

use crate::{
    config::Georeference,
    error::{MaskError, Result},
};

/// Wraps polygons and a caller-supplied property bag into a FeatureCollection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorSerializer {
    georeference: Option<Georeference>,
}

impl VectorSerializer {
    pub fn new(georeference: Option<Georeference>) -> Self {
        Self { georeference }
    }

    pub fn georeference(&self) -> Option<&Georeference> {
        self.georeference.as_ref()
    }

    /// One Polygon feature per input polygon, in order, each carrying a copy of `properties`.
    ///
    /// Exterior rings are wound counter-clockwise and holes clockwise. With a
    /// georeference the coordinates are mapped to world space and a named
    /// `crs` member is attached when the CRS is known.
    pub fn to_feature_collection(
        &self,
        polygons: &[Polygon<f64>],
        properties: &JsonObject,
        image_width: u32,
        image_height: u32,
    ) -> FeatureCollection {
        let transform = self.georeference.as_ref().map(|g| {
            let [x0, a, b, y0, d, e] = g.transform;
            AffineTransform::new(a, b, x0, d, e, y0)
        });

        let features: Vec<Feature> = polygons
            .iter()
            .enumerate()
            .map(|(index, polygon)| {
                let polygon = match &transform {
                    Some(transform) => polygon.affine_transform(transform),
                    None => polygon.clone(),
                };
                let polygon = polygon.orient(Direction::Default);
                Feature {
                    bbox: None,
                    geometry: Some(Geometry::new(Value::from(&polygon))),
                    id: Some(Id::Number(serde_json::Number::from(index))),
                    properties: Some(properties.clone()),
                    foreign_members: None,
                }
            })
            .collect();

        let mut foreign_members = JsonObject::new();
        foreign_members.insert("image_width".to_string(), JsonValue::from(image_width));
        foreign_members.insert("image_height".to_string(), JsonValue::from(image_height));
        foreign_members.insert("feature_count".to_string(), JsonValue::from(features.len()));
        if let Some(crs) = self.georeference.as_ref().and_then(|g| g.crs.as_deref()) {
            foreign_members.insert("crs".to_string(), crs_member(crs));
        }

        FeatureCollection {
            bbox: None,
            features,
            foreign_members: Some(foreign_members),
        }
    }
}

/// Legacy named-CRS object: `{"type": "name", "properties": {"name": ...}}`.
pub fn crs_member(name: &str) -> JsonValue {
    serde_json::json!({
        "type": "name",
        "properties": { "name": name },
    })
}

/// Convert any serializable struct or map into a property bag.
pub fn property_bag<P: Serialize>(properties: &P) -> Result<JsonObject> {
    match serde_json::to_value(properties)? {
        JsonValue::Object(map) => Ok(map),
        JsonValue::Null => Ok(JsonObject::new()),
        other => Err(MaskError::InvalidConfig(format!(
            "properties must serialize to a JSON object, got {other}"
        ))),
    }
}

pub fn to_geojson_string(collection: &FeatureCollection) -> Result<String> {
    Ok(serde_json::to_string_pretty(collection)?)
}

pub fn save_geojson(collection: &FeatureCollection, path: impl AsRef<std::path::Path>) -> Result<()> {
    std::fs::write(path, to_geojson_string(collection)?)?;
    Ok(())
}

/// Read the polygons back out of a FeatureCollection; MultiPolygons are flattened.
pub fn read_polygons(collection: &FeatureCollection) -> Result<Vec<Polygon<f64>>> {
    let mut polygons = Vec::new();
    for feature in &collection.features {
        let Some(geometry) = &feature.geometry else {
            continue;
        };
        match geo_types::Geometry::<f64>::try_from(geometry.value.clone())? {
            geo_types::Geometry::Polygon(polygon) => polygons.push(polygon),
            geo_types::Geometry::MultiPolygon(multi) => polygons.extend(multi.0),
            other => warn!(?other, "Ignoring non-polygonal feature"),
        }
    }
    Ok(polygons)
}

/// Total area of every polygon in the collection, in coordinate units.
pub fn total_area(collection: &FeatureCollection) -> Result<f64> {
    Ok(read_polygons(collection)?.iter().map(|p| p.unsigned_area()).sum())
}
