//! Core library for slicing GeoJSON into a quadtree tile pyramid.
//!
//! This library builds a multi-resolution tile index over a GeoJSON feature
//! set and serves tiles at arbitrary z/x/y on demand. Tiles below the eagerly
//! indexed depth are computed lazily by drilling down from the nearest cached
//! ancestor's retained source geometry, and a memory-bounded streaming mode
//! emits the whole pyramid without holding it resident.
//!
//! # Examples
//!
//! ```
//! use vt_slicer_core::{Options, TileIndex};
//!
//! let data = r#"{"type": "Feature", "properties": null,
//!                "geometry": {"type": "Point", "coordinates": [8.55, 47.36]}}"#
//!     .parse()
//!     .unwrap();
//!
//! let options = Options { index_max_zoom: 3, ..Options::default() };
//! let mut index = TileIndex::new(&data, options).unwrap();
//!
//! let tile = index.get_tile(6, 33, 22).unwrap();
//! assert_eq!(tile.num_features, 1);
//! ```

use thiserror::Error;

pub mod clip;
pub mod convert;
pub mod feature;
mod index;
pub mod simplify;
mod stream;
pub mod tile;
pub mod transform;
pub mod wrap;

pub use feature::{Feature, FeatureId, FeatureKind, Tags, VtGeometry, VtLine, VtPoint};
pub use index::TileIndex;
pub use stream::{StreamedTile, TileStream};
pub use tile::{tile_id, Tile, TileCoord, TileState};
pub use transform::{transform_tile, TransformedFeature, TransformedGeometry, TransformedTile};

/// Hard ceiling on zoom levels; the packed tile id stays injective up to
/// here.
pub const MAX_ZOOM_LIMIT: u8 = 24;

/// Errors raised during index construction.
///
/// All of them are configuration errors: geometry processing itself never
/// fails, and lookup misses are expressed as `None`, not as errors.
#[derive(Error, Debug)]
pub enum Error {
    #[error("max_zoom should be in the 0-{MAX_ZOOM_LIMIT} range, got {0}")]
    MaxZoomOutOfRange(u8),

    #[error("promote_id and generate_id cannot be used together")]
    ConflictingIdOptions,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Tiling configuration.
#[derive(Debug, Clone)]
pub struct Options {
    /// Max zoom to preserve detail on.
    pub max_zoom: u8,
    /// Max zoom in the eagerly built tile index.
    pub index_max_zoom: u8,
    /// Max number of points per tile in the index; simpler tiles stop
    /// subdividing early.
    pub index_max_points: usize,
    /// Simplification tolerance (higher means simpler).
    pub tolerance: f64,
    /// Tile extent in output coordinate units.
    pub extent: u32,
    /// Tile buffer on each side, in extent units.
    pub buffer: u32,
    /// Whether to track how much of the original line each clipped slice
    /// covers, exposed as `mapbox_clip_start`/`mapbox_clip_end` tags.
    pub line_metrics: bool,
    /// Property to promote to feature id. Mutually exclusive with
    /// `generate_id`.
    pub promote_id: Option<String>,
    /// Whether to generate feature ids from collection indices.
    pub generate_id: bool,
    /// Debug verbosity (0, 1 or 2); levels above 0 collect per-zoom stats
    /// and emit progressively chattier logs.
    pub debug: u8,
    /// Whether a caller intends to consume tiles as a stream; streams are
    /// self-cleaning and not usable as a queryable index.
    pub use_stream: bool,
    /// Streamed tiles are emitted as values (true) or serialized JSON text
    /// (false).
    pub stream_object: bool,
    /// Force-clear the stream cache after this many tiles without a natural
    /// eviction.
    pub stream_cache_limit: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_zoom: 14,
            index_max_zoom: 5,
            index_max_points: 100_000,
            tolerance: 3.0,
            extent: 4096,
            buffer: 64,
            line_metrics: false,
            promote_id: None,
            generate_id: false,
            debug: 0,
            use_stream: false,
            stream_object: true,
            stream_cache_limit: 1000,
        }
    }
}

impl Options {
    /// Create options with a custom zoom range.
    pub fn new(index_max_zoom: u8, max_zoom: u8) -> Self {
        Self {
            index_max_zoom,
            max_zoom,
            ..Default::default()
        }
    }

    /// Set the simplification tolerance.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set the tile extent.
    pub fn with_extent(mut self, extent: u32) -> Self {
        self.extent = extent;
        self
    }

    /// Set the tile buffer.
    pub fn with_buffer(mut self, buffer: u32) -> Self {
        self.buffer = buffer;
        self
    }

    /// Check invariants that must hold before any tiling begins.
    pub fn validate(&self) -> Result<()> {
        if self.max_zoom > MAX_ZOOM_LIMIT {
            return Err(Error::MaxZoomOutOfRange(self.max_zoom));
        }
        if self.promote_id.is_some() && self.generate_id {
            return Err(Error::ConflictingIdOptions);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_defaults() {
        let options = Options::default();
        assert_eq!(options.max_zoom, 14);
        assert_eq!(options.index_max_zoom, 5);
        assert_eq!(options.index_max_points, 100_000);
        assert_eq!(options.extent, 4096);
        assert_eq!(options.buffer, 64);
        assert!(options.stream_object);
    }

    #[test]
    fn test_options_builder() {
        let options = Options::new(4, 12).with_tolerance(1.5).with_extent(512).with_buffer(16);
        assert_eq!(options.index_max_zoom, 4);
        assert_eq!(options.max_zoom, 12);
        assert_eq!(options.tolerance, 1.5);
        assert_eq!(options.extent, 512);
        assert_eq!(options.buffer, 16);
    }

    #[test]
    fn test_validate_rejects_zoom_out_of_range() {
        let options = Options { max_zoom: 25, ..Options::default() };
        assert!(matches!(options.validate(), Err(Error::MaxZoomOutOfRange(25))));
    }

    #[test]
    fn test_validate_rejects_conflicting_id_options() {
        let options = Options {
            promote_id: Some("code".to_string()),
            generate_id: true,
            ..Options::default()
        };
        assert!(matches!(options.validate(), Err(Error::ConflictingIdOptions)));
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(Options::default().validate().is_ok());
    }
}
