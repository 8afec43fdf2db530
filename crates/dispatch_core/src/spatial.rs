//! Spatial helpers on the H3 grid: haversine distances, grid disks, grid
//! paths and dropoff centroids.
//!
//! Distances, disks and paths are memoised in process-wide LRU caches. Dispatch
//! passes query the same origin/destination pairs many times per tick, so the
//! caches are sized for a city-scale fleet.

use std::num::NonZeroUsize;
use std::sync::{Mutex, OnceLock};

use h3o::{CellIndex, LatLng, Resolution};
use lru::LruCache;

const EARTH_RADIUS_KM: f64 = 6371.0;

fn lru<K: std::hash::Hash + Eq, V>(capacity: usize) -> Mutex<LruCache<K, V>> {
    Mutex::new(LruCache::new(
        NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
    ))
}

fn distance_km_between_cells_uncached(a: CellIndex, b: CellIndex) -> f64 {
    let a: LatLng = a.into();
    let b: LatLng = b.into();
    let (lat1, lon1) = (a.lat().to_radians(), a.lng().to_radians());
    let (lat2, lon2) = (b.lat().to_radians(), b.lng().to_radians());
    let sin_dlat = ((lat2 - lat1) * 0.5).sin();
    let sin_dlon = ((lon2 - lon1) * 0.5).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

fn distance_cache() -> &'static Mutex<LruCache<(CellIndex, CellIndex), f64>> {
    static CACHE: OnceLock<Mutex<LruCache<(CellIndex, CellIndex), f64>>> = OnceLock::new();
    CACHE.get_or_init(|| lru(50_000))
}

/// Great-circle distance between two cell centres, in kilometres.
///
/// Symmetric; the cache key is normalised so `(a, b)` and `(b, a)` share an entry.
pub fn distance_km_between_cells(a: CellIndex, b: CellIndex) -> f64 {
    if a == b {
        return 0.0;
    }
    let key = if a < b { (a, b) } else { (b, a) };
    match distance_cache().lock() {
        Ok(mut cache) => *cache.get_or_insert(key, || distance_km_between_cells_uncached(a, b)),
        // Poisoned mutex: compute without the cache.
        Err(_) => distance_km_between_cells_uncached(a, b),
    }
}

fn disk_cache() -> &'static Mutex<LruCache<(CellIndex, u32), Vec<CellIndex>>> {
    static CACHE: OnceLock<Mutex<LruCache<(CellIndex, u32), Vec<CellIndex>>>> = OnceLock::new();
    CACHE.get_or_init(|| lru(1_000))
}

/// All cells within `k` grid steps of `origin`, origin included.
pub fn grid_disk_cached(origin: CellIndex, k: u32) -> Vec<CellIndex> {
    match disk_cache().lock() {
        Ok(mut cache) => cache
            .get_or_insert((origin, k), || origin.grid_disk::<Vec<_>>(k))
            .clone(),
        Err(_) => origin.grid_disk::<Vec<_>>(k),
    }
}

fn path_cache() -> &'static Mutex<LruCache<(CellIndex, CellIndex), Vec<CellIndex>>> {
    static CACHE: OnceLock<Mutex<LruCache<(CellIndex, CellIndex), Vec<CellIndex>>>> =
        OnceLock::new();
    CACHE.get_or_init(|| lru(5_000))
}

fn compute_grid_path(from: CellIndex, to: CellIndex) -> Option<Vec<CellIndex>> {
    let cells = from
        .grid_path_cells(to)
        .ok()?
        .collect::<Result<Vec<_>, _>>()
        .ok()?;
    if cells.is_empty() {
        None
    } else {
        Some(cells)
    }
}

/// Grid path from `from` to `to`, both endpoints included.
///
/// Returns `None` when H3 cannot build a local IJ path (pentagon distortion or
/// cells too far apart). Only successful paths are cached.
pub fn grid_path_cells_cached(from: CellIndex, to: CellIndex) -> Option<Vec<CellIndex>> {
    if let Ok(mut cache) = path_cache().lock() {
        if let Some(path) = cache.get(&(from, to)) {
            return Some(path.clone());
        }
    }
    let path = compute_grid_path(from, to)?;
    if let Ok(mut cache) = path_cache().lock() {
        cache.put((from, to), path.clone());
    }
    Some(path)
}

/// Running sum of lat/lng used to maintain the dropoff centroid of a schedule
/// incrementally.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CentroidAccumulator {
    lat_sum: f64,
    lng_sum: f64,
    count: usize,
    resolution: Option<Resolution>,
}

impl CentroidAccumulator {
    pub fn add(&mut self, cell: CellIndex) {
        let ll: LatLng = cell.into();
        self.lat_sum += ll.lat();
        self.lng_sum += ll.lng();
        self.count += 1;
        self.resolution.get_or_insert(cell.resolution());
    }

    pub fn remove(&mut self, cell: CellIndex) {
        if self.count == 0 {
            return;
        }
        let ll: LatLng = cell.into();
        self.lat_sum -= ll.lat();
        self.lng_sum -= ll.lng();
        self.count -= 1;
        if self.count == 0 {
            *self = Self::default();
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Cell containing the mean position, at the resolution of the first cell added.
    pub fn centroid(&self) -> Option<CellIndex> {
        if self.count == 0 {
            return None;
        }
        let n = self.count as f64;
        let ll = LatLng::new(self.lat_sum / n, self.lng_sum / n).ok()?;
        Some(ll.to_cell(self.resolution?))
    }
}

/// Serde adapter storing a [`CellIndex`] as its raw `u64`.
pub mod cell_serde {
    use h3o::CellIndex;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(cell: &CellIndex, ser: S) -> Result<S::Ok, S::Error> {
        u64::from(*cell).serialize(ser)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<CellIndex, D::Error> {
        let raw = u64::deserialize(de)?;
        CellIndex::try_from(raw).map_err(serde::de::Error::custom)
    }
}
