//! Memory-bounded streaming build.
//!
//! Runs the same subdivision state machine as [`TileIndex`](crate::TileIndex)
//! but as a pull-based producer: each `next()` pops one work-list entry,
//! builds and emits that tile, and queues up to four children. Nothing is
//! produced until the consumer asks, so at most one tile is in flight and
//! dropping the iterator cancels the build.
//!
//! The cache only exists to let children reuse the machinery; it is kept
//! small by eviction. `last_z` tracks the lowest zoom level assumed fully
//! emitted: when the first tile two levels deeper appears, everything cached
//! at `last_z` is evicted and `last_z` advances. Depth-first traversal can
//! starve that rule (deep branches push `last_z` far ahead before shallow
//! siblings arrive), so a counter of tiles emitted since the last eviction
//! force-clears the whole cache past a configured threshold.
//!
//! A stream is lazy, finite, and not restartable. It is not a queryable
//! index; use [`TileIndex`](crate::TileIndex) for reads.

use std::collections::HashMap;

use geojson::GeoJson;

use crate::convert::convert;
use crate::index::{subdivide, StackEntry};
use crate::tile::{create_tile, tile_id, Tile, TileCoord, TileState};
use crate::transform::{transform_tile, TransformedTile};
use crate::wrap::wrap;
use crate::{Options, Result};

/// One streamed tile: the transformed tile itself in object mode, or its
/// JSON serialization in text mode.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamedTile {
    Tile(TransformedTile),
    Text(String),
}

/// A pull-based tile producer over a preprocessed feature set.
pub struct TileStream {
    options: Options,
    tiles: HashMap<u64, Tile>,
    tile_coords: Vec<TileCoord>,
    stack: Vec<StackEntry>,
    last_z: Option<u8>,
    tiles_since_last_clear: usize,
    emitted: usize,
}

impl TileStream {
    /// Preprocess `data` and set up the producer. No tiles are built until
    /// the stream is pulled.
    pub fn new(data: &GeoJson, options: Options) -> Result<Self> {
        options.validate()?;

        let features = convert(data, &options);
        let features = wrap(features, &options);

        let stack = if features.is_empty() {
            Vec::new()
        } else {
            vec![StackEntry { features, z: 0, x: 0, y: 0 }]
        };

        Ok(Self {
            options,
            tiles: HashMap::new(),
            tile_coords: Vec::new(),
            stack,
            last_z: None,
            tiles_since_last_clear: 0,
            emitted: 0,
        })
    }

    /// Tiles emitted so far.
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Tiles currently resident in the cache.
    pub fn cached_tiles(&self) -> usize {
        self.tiles.len()
    }

    /// Drop every cached tile and coordinate-log entry at zoom `z`.
    fn evict_zoom(&mut self, z: u8) {
        for coord in self.tile_coords.iter().filter(|c| c.z == z) {
            self.tiles.remove(&coord.id());
        }
        self.tile_coords.retain(|c| c.z != z);
    }

    /// Process one work-list entry; returns the emission if the entry
    /// produced a new tile.
    fn advance(&mut self, entry: StackEntry) -> Option<StreamedTile> {
        let StackEntry { features, z, x, y } = entry;
        let id = tile_id(z, x, y);
        let mut emission = None;

        if !self.tiles.contains_key(&id) {
            let tile = create_tile(&features, z, x, y, &self.options);
            if self.options.debug > 1 {
                log::debug!(
                    "tile z{z}-{x}-{y} (features: {}, points: {}, simplified: {})",
                    tile.num_features,
                    tile.num_points,
                    tile.num_simplified
                );
            }

            emission = self.emit(&tile);
            self.tiles.insert(id, tile);
            self.tile_coords.push(TileCoord::new(z, x, y));
            self.emitted += 1;

            let last_z = *self.last_z.get_or_insert(z);
            if z == last_z + 2 {
                // everything at last_z has been passed; let it go
                self.evict_zoom(last_z);
                self.last_z = Some(last_z + 1);
                self.tiles_since_last_clear = 0;
                if self.options.debug > 1 {
                    log::debug!(
                        "evicted zoom {last_z}, {} tiles still cached",
                        self.tiles.len()
                    );
                }
            }
            self.tiles_since_last_clear += 1;
        }

        let tile = self.tiles.get_mut(&id)?;

        if z == self.options.index_max_zoom || tile.num_points <= self.options.index_max_points {
            tile.state = TileState::Leaf { source: features };
            return emission;
        }

        tile.state = TileState::Subdivided;

        if features.is_empty() {
            return emission;
        }

        let bounds = (tile.min_x, tile.min_y, tile.max_x, tile.max_y);
        subdivide(features, z, x, y, bounds, &self.options, &mut self.stack);

        emission
    }

    fn emit(&self, tile: &Tile) -> Option<StreamedTile> {
        let transformed = transform_tile(tile, self.options.extent);
        if self.options.stream_object {
            Some(StreamedTile::Tile(transformed))
        } else {
            match serde_json::to_string(&transformed) {
                Ok(text) => Some(StreamedTile::Text(text)),
                Err(err) => {
                    log::error!("failed to serialize tile z{}-{}-{}: {err}", tile.z, tile.x, tile.y);
                    None
                }
            }
        }
    }
}

impl Iterator for TileStream {
    type Item = StreamedTile;

    fn next(&mut self) -> Option<StreamedTile> {
        loop {
            let entry = self.stack.pop()?;

            if self.tiles_since_last_clear >= self.options.stream_cache_limit {
                log::debug!(
                    "cache has not cycled for {} tiles, forcing clear",
                    self.tiles_since_last_clear
                );
                self.tiles.clear();
                self.tile_coords.clear();
                self.tiles_since_last_clear = 0;
            }

            if let Some(emission) = self.advance(entry) {
                return Some(emission);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn world_polygon() -> GeoJson {
        GeoJson::from_json_value(json!({
            "type": "Feature",
            "geometry": {
                "type": "Polygon",
                "coordinates": [[
                    [-170.0, 75.0],
                    [170.0, 75.0],
                    [170.0, -75.0],
                    [-170.0, -75.0],
                    [-170.0, 75.0]
                ]]
            },
            "properties": null
        }))
        .expect("valid geojson")
    }

    #[test]
    fn test_stream_emits_whole_pyramid() {
        let options = Options {
            max_zoom: 4,
            index_max_zoom: 2,
            index_max_points: 0,
            ..Options::default()
        };
        let stream = TileStream::new(&world_polygon(), options).expect("valid config");
        let tiles: Vec<StreamedTile> = stream.collect();
        // full quadtree to depth 2: 1 + 4 + 16
        assert_eq!(tiles.len(), 21);
    }

    #[test]
    fn test_stream_matches_eager_build() {
        let options = Options {
            max_zoom: 3,
            index_max_zoom: 3,
            index_max_points: 0,
            ..Options::default()
        };
        let index =
            crate::TileIndex::new(&world_polygon(), options.clone()).expect("valid config");
        let streamed: Vec<TileCoord> = TileStream::new(&world_polygon(), options)
            .expect("valid config")
            .filter_map(|t| match t {
                StreamedTile::Tile(tile) => Some(TileCoord::new(tile.z, tile.x, tile.y)),
                StreamedTile::Text(_) => None,
            })
            .collect();
        assert_eq!(streamed, index.tile_coords());
    }

    #[test]
    fn test_natural_eviction_bounds_cache() {
        let options = Options {
            max_zoom: 6,
            index_max_zoom: 6,
            index_max_points: 0,
            ..Options::default()
        };
        let mut stream = TileStream::new(&world_polygon(), options).expect("valid config");

        let mut max_resident = 0;
        while stream.next().is_some() {
            max_resident = max_resident.max(stream.cached_tiles());
        }
        let total = stream.emitted();
        assert!(total > 1000, "deep pyramid should emit thousands of tiles, got {total}");
        assert!(
            max_resident < total / 2,
            "eviction should keep residency well under the {total} emitted tiles, saw {max_resident}"
        );
        assert!(
            max_resident <= Options::default().stream_cache_limit + 4096,
            "residency {max_resident} exceeded the clear threshold plus one zoom level"
        );
    }

    #[test]
    fn test_force_clear_respects_configured_limit() {
        let options = Options {
            max_zoom: 5,
            index_max_zoom: 5,
            index_max_points: 0,
            stream_cache_limit: 64,
            ..Options::default()
        };
        let mut stream = TileStream::new(&world_polygon(), options).expect("valid config");

        let mut max_resident = 0;
        while stream.next().is_some() {
            max_resident = max_resident.max(stream.cached_tiles());
        }
        // one force-clear window plus the level that triggers natural eviction
        assert!(
            max_resident <= 64 + 4usize.pow(5),
            "residency {max_resident} exceeded the configured bound"
        );
    }

    #[test]
    fn test_text_mode_yields_json() {
        let options = Options {
            max_zoom: 1,
            index_max_zoom: 1,
            index_max_points: 0,
            stream_object: false,
            ..Options::default()
        };
        let mut stream = TileStream::new(&world_polygon(), options).expect("valid config");
        match stream.next() {
            Some(StreamedTile::Text(text)) => {
                let value: serde_json::Value = serde_json::from_str(&text).expect("valid json");
                assert_eq!(value["z"], json!(0));
            }
            other => panic!("expected text emission, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_input_ends_immediately() {
        let data = GeoJson::from_json_value(json!({
            "type": "FeatureCollection",
            "features": []
        }))
        .expect("valid geojson");
        let mut stream = TileStream::new(&data, Options::default()).expect("valid config");
        assert!(stream.next().is_none());
        assert_eq!(stream.emitted(), 0);
    }

    #[test]
    fn test_dropping_stream_cancels_cleanly() {
        let options = Options {
            max_zoom: 8,
            index_max_zoom: 8,
            index_max_points: 0,
            ..Options::default()
        };
        let mut stream = TileStream::new(&world_polygon(), options).expect("valid config");
        for _ in 0..10 {
            let _ = stream.next();
        }
        assert_eq!(stream.emitted(), 10);
        drop(stream);
    }
}
