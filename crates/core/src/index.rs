//! The tile index: eager pyramid building and on-demand drill-down.
//!
//! An index owns a tile cache keyed by packed id and an insertion-ordered
//! coordinate log. Construction runs the eager pass: a LIFO work list of
//! `(features, z, x, y)` entries subdivides depth-first until the configured
//! index depth or point threshold, caching every visited tile. Leaves retain
//! the pre-clip feature array that produced them so a later read below the
//! indexed depth can resume subdivision from the nearest cached ancestor
//! instead of failing or rebuilding the pyramid.
//!
//! Reads go through the `get_tile` family. A cache hit transforms and
//! returns directly; a miss walks up to an ancestor that still retains
//! source geometry and re-runs subdivision restricted to the path toward the
//! target. The transient variants answer the query and then drop the whole
//! cache, trading recomputation for memory on occasional deep-zoom reads.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use geojson::GeoJson;

use crate::clip::{clip, Axis};
use crate::convert::convert;
use crate::feature::Feature;
use crate::tile::{create_tile, tile_id, Tile, TileCoord, TileState};
use crate::transform::{transform_tile, TransformedTile};
use crate::wrap::wrap;
use crate::{Options, Result, MAX_ZOOM_LIMIT};

/// One pending unit of subdivision work.
#[derive(Debug)]
pub(crate) struct StackEntry {
    pub features: Vec<Arc<Feature>>,
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

/// A quadtree tile index over a preprocessed feature set.
#[derive(Debug, Clone)]
pub struct TileIndex {
    options: Options,
    tiles: HashMap<u64, Tile>,
    tile_coords: Vec<TileCoord>,
    stats: HashMap<String, usize>,
    total: usize,
}

impl TileIndex {
    /// Preprocess `data` and eagerly build the pyramid down to the configured
    /// index depth.
    ///
    /// Fails only on invalid configuration; geometry itself cannot fail.
    pub fn new(data: &GeoJson, options: Options) -> Result<Self> {
        options.validate()?;

        let started = Instant::now();
        let features = convert(data, &options);
        let features = wrap(features, &options);

        if options.debug > 0 {
            log::info!(
                "preprocessed {} features in {:?}; index: max zoom {}, max points {}",
                features.len(),
                started.elapsed(),
                options.index_max_zoom,
                options.index_max_points
            );
        }

        let mut index = Self {
            options,
            tiles: HashMap::new(),
            tile_coords: Vec::new(),
            stats: HashMap::new(),
            total: 0,
        };

        let started = Instant::now();
        if !features.is_empty() {
            index.split_tile(features, 0, 0, 0, None);
        }

        if index.options.debug > 0 {
            log::info!(
                "generated {} tiles in {:?}: {:?}",
                index.total,
                started.elapsed(),
                index.stats
            );
        }

        Ok(index)
    }

    /// The options the index was built with.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Number of tiles currently cached.
    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    /// Coordinates of every cached tile, in first-visit order.
    pub fn tile_coords(&self) -> &[TileCoord] {
        &self.tile_coords
    }

    /// Per-zoom tile creation counts, collected when `debug > 0`.
    pub fn stats(&self) -> &HashMap<String, usize> {
        &self.stats
    }

    /// Fetch the tile at (z, x, y), drilling down from the nearest cached
    /// ancestor when needed. Newly computed tiles stay cached.
    ///
    /// `x` wraps around the antimeridian; out-of-range `z` or `y` is a miss.
    pub fn get_tile(&mut self, z: u8, x: i64, y: i64) -> Option<TransformedTile> {
        let coord = self.locate(z, x, y)?;
        let id = coord.id();

        if !self.tiles.contains_key(&id) {
            self.drill_down(coord)?;
        }

        self.tiles.get(&id).map(|tile| transform_tile(tile, self.options.extent))
    }

    /// Like [`get_tile`](Self::get_tile), but when the tile had to be
    /// computed, the whole cache and coordinate log are dropped after
    /// answering. A direct cache hit returns without dropping anything.
    pub fn get_tile_transient(&mut self, z: u8, x: i64, y: i64) -> Option<TransformedTile> {
        let coord = self.locate(z, x, y)?;
        let id = coord.id();

        if let Some(tile) = self.tiles.get(&id) {
            return Some(transform_tile(tile, self.options.extent));
        }

        self.drill_down(coord)?;
        self.take_branch(coord).into_iter().next()
    }

    /// Like [`get_tile_transient`](Self::get_tile_transient), but returns the
    /// target together with its cached ancestors, deepest first.
    pub fn get_branch_transient(&mut self, z: u8, x: i64, y: i64) -> Vec<TransformedTile> {
        let Some(coord) = self.locate(z, x, y) else {
            return Vec::new();
        };
        let id = coord.id();

        if let Some(tile) = self.tiles.get(&id) {
            return vec![transform_tile(tile, self.options.extent)];
        }

        if self.drill_down(coord).is_none() {
            return Vec::new();
        }
        self.take_branch(coord)
    }

    /// Validate and normalize a requested coordinate.
    fn locate(&self, z: u8, x: i64, y: i64) -> Option<TileCoord> {
        if z > MAX_ZOOM_LIMIT {
            return None;
        }
        let z2 = 1i64 << z;
        let x = x.rem_euclid(z2) as u32; // wrap across the antimeridian
        if !(0..z2).contains(&y) {
            return None;
        }
        Some(TileCoord::new(z, x, y as u32))
    }

    /// Re-run subdivision from the nearest cached ancestor that still
    /// retains source geometry, restricted to the path toward `target`.
    ///
    /// Returns `None` when no such ancestor exists; the target tile may
    /// still be absent afterwards if the geometry never reaches it.
    fn drill_down(&mut self, target: TileCoord) -> Option<()> {
        let mut z0 = target.z;
        let mut x0 = target.x;
        let mut y0 = target.y;
        let mut parent = None;

        while parent.is_none() && z0 > 0 {
            z0 -= 1;
            x0 /= 2;
            y0 /= 2;
            parent = self.tiles.get(&tile_id(z0, x0, y0));
        }

        let source = parent?.state.source()?.to_vec();

        if self.options.debug > 1 {
            log::debug!(
                "drilling down to z{}-{}-{} from parent z{z0}-{x0}-{y0}",
                target.z,
                target.x,
                target.y
            );
        }

        self.split_tile(source, z0, x0, y0, Some(target));
        Some(())
    }

    /// Resolve the target's ancestor chain (deepest first) from the
    /// coordinate log, then wipe the cache and the log.
    fn take_branch(&mut self, target: TileCoord) -> Vec<TransformedTile> {
        let branch = match self.tile_coords.iter().position(|c| *c == target) {
            Some(pos) => {
                let mut chain: Vec<TileCoord> = self.tile_coords[..=pos]
                    .iter()
                    .copied()
                    .filter(|c| c.is_ancestor_of(&target))
                    .collect();
                chain.sort_by_key(|c| c.z);
                chain.reverse();
                chain
                    .iter()
                    .filter_map(|c| self.tiles.get(&c.id()))
                    .map(|tile| transform_tile(tile, self.options.extent))
                    .collect()
            }
            None => Vec::new(),
        };

        self.tiles.clear();
        self.tile_coords.clear();
        branch
    }

    /// The subdivision state machine.
    ///
    /// Without a target this is the first-pass tiling, stopping at the index
    /// depth or point threshold. With a target it stops at `max_zoom` or the
    /// target zoom and prunes branches that are not ancestors of the target.
    pub(crate) fn split_tile(
        &mut self,
        features: Vec<Arc<Feature>>,
        z: u8,
        x: u32,
        y: u32,
        target: Option<TileCoord>,
    ) {
        let mut stack = vec![StackEntry { features, z, x, y }];

        while let Some(StackEntry { features, z, x, y }) = stack.pop() {
            let id = tile_id(z, x, y);
            let debug = self.options.debug;

            let tile = match self.tiles.entry(id) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    let tile = create_tile(&features, z, x, y, &self.options);
                    if debug > 1 {
                        log::debug!(
                            "tile z{z}-{x}-{y} (features: {}, points: {}, simplified: {})",
                            tile.num_features,
                            tile.num_points,
                            tile.num_simplified
                        );
                    }
                    self.tile_coords.push(TileCoord::new(z, x, y));
                    if debug > 0 {
                        *self.stats.entry(format!("z{z}")).or_insert(0) += 1;
                        self.total += 1;
                    }
                    entry.insert(tile)
                }
            };

            let stop = match target {
                // first-pass tiling: stop at the index depth, or when the
                // tile is already simple enough
                None => {
                    z == self.options.index_max_zoom
                        || tile.num_points <= self.options.index_max_points
                }
                // drill-down: stop at base zoom or the target zoom, and
                // prune branches that cannot contain the target
                Some(c) => {
                    z == self.options.max_zoom
                        || z == c.z
                        || !TileCoord::new(z, x, y).is_ancestor_of(&c)
                }
            };

            if stop {
                // keep the pre-clip geometry so drill-down can resume here;
                // revisits refresh it
                tile.state = TileState::Leaf { source: features };
                continue;
            }

            // slicing further down: children make the source redundant
            tile.state = TileState::Subdivided;

            if features.is_empty() {
                continue;
            }

            let bounds = (tile.min_x, tile.min_y, tile.max_x, tile.max_y);
            subdivide(features, z, x, y, bounds, &self.options, &mut stack);
        }
    }
}

/// Clip one tile's features into its four children and queue them.
///
/// The x stripes and y stripes each overlap by the buffer fraction, so
/// boundary geometry intentionally lands in more than one child.
pub(crate) fn subdivide(
    features: Vec<Arc<Feature>>,
    z: u8,
    x: u32,
    y: u32,
    bounds: (f64, f64, f64, f64),
    options: &Options,
    stack: &mut Vec<StackEntry>,
) {
    let (min_x, min_y, max_x, max_y) = bounds;
    let scale = (1u32 << z) as f64;
    let k1 = 0.5 * options.buffer as f64 / options.extent as f64;
    let k2 = 0.5 - k1;
    let k3 = 0.5 + k1;
    let k4 = 1.0 + k1;

    let fx = x as f64;
    let fy = y as f64;

    let mut tl = None;
    let mut bl = None;
    let mut tr = None;
    let mut br = None;

    let left = clip(&features, scale, fx - k1, fx + k3, Axis::X, min_x, max_x, options);
    let right = clip(&features, scale, fx + k2, fx + k4, Axis::X, min_x, max_x, options);
    drop(features);

    if let Some(left) = left {
        tl = clip(&left, scale, fy - k1, fy + k3, Axis::Y, min_y, max_y, options);
        bl = clip(&left, scale, fy + k2, fy + k4, Axis::Y, min_y, max_y, options);
    }

    if let Some(right) = right {
        tr = clip(&right, scale, fy - k1, fy + k3, Axis::Y, min_y, max_y, options);
        br = clip(&right, scale, fy + k2, fy + k4, Axis::Y, min_y, max_y, options);
    }

    stack.push(StackEntry { features: tl.unwrap_or_default(), z: z + 1, x: x * 2, y: y * 2 });
    stack.push(StackEntry { features: bl.unwrap_or_default(), z: z + 1, x: x * 2, y: y * 2 + 1 });
    stack.push(StackEntry { features: tr.unwrap_or_default(), z: z + 1, x: x * 2 + 1, y: y * 2 });
    stack.push(StackEntry {
        features: br.unwrap_or_default(),
        z: z + 1,
        x: x * 2 + 1,
        y: y * 2 + 1,
    });
}
