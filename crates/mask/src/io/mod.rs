pub mod geojson;
pub mod persist;

pub use self::geojson::{
    VectorSerializer, crs_member, property_bag, read_polygons, save_geojson, to_geojson_string, total_area,
};
pub use persist::{DirectorySink, FeatureCollectionSink, InlineSink, PersistedLocation};
