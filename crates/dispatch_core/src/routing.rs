//! Pluggable routing backends behind the [`RouteService`] trait.
//!
//! - **`H3GridRouteService`**: grid paths with travel time derived from the
//!   haversine distance at a fixed average speed.
//! - **`CachedRouteService`**: LRU cache in front of any other service, with
//!   an optional grid fallback when the inner service has no answer.
//!
//! The service is shared by the movement system, the driver agents and every
//! controller's feasibility evaluator, so it lives in an `Arc` inside
//! [`RouteServiceResource`].

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use bevy_ecs::prelude::Resource;
use h3o::CellIndex;
use lru::LruCache;
use serde::{Deserialize, Serialize};

use crate::spatial::{distance_km_between_cells, grid_path_cells_cached};

/// Average city speed used when nothing else is configured.
pub const DEFAULT_SPEED_KMH: f64 = 40.0;
const DEFAULT_ROUTE_CACHE_CAPACITY: usize = 20_000;

/// Shortest-time routing between cells.
///
/// Implementations must be deterministic for a given input: the dispatch layer
/// evaluates the same schedule from several places and relies on getting the
/// same answer.
pub trait RouteService: Send + Sync {
    /// Travel time in seconds from `from` to `to` departing at `depart_ms`.
    /// `None` means the destination is unreachable.
    fn travel_time_secs(&self, from: CellIndex, to: CellIndex, depart_ms: u64) -> Option<f64>;

    /// Cells along the shortest path, endpoints included.
    fn shortest_path(&self, from: CellIndex, to: CellIndex) -> Option<Vec<CellIndex>>;
}

/// Which routing backend to build.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RouteServiceKind {
    H3Grid {
        speed_kmh: f64,
    },
    CachedH3Grid {
        speed_kmh: f64,
        capacity: usize,
    },
}

impl Default for RouteServiceKind {
    fn default() -> Self {
        Self::H3Grid {
            speed_kmh: DEFAULT_SPEED_KMH,
        }
    }
}

/// ECS resource holding the shared route service.
#[derive(Resource, Clone)]
pub struct RouteServiceResource(pub Arc<dyn RouteService>);

impl RouteServiceResource {
    pub fn new(service: impl RouteService + 'static) -> Self {
        Self(Arc::new(service))
    }

    pub fn service(&self) -> &dyn RouteService {
        self.0.as_ref()
    }
}

/// Routes along the hexagonal grid at a constant speed.
#[derive(Debug, Clone, Copy)]
pub struct H3GridRouteService {
    speed_kmh: f64,
}

impl Default for H3GridRouteService {
    fn default() -> Self {
        Self::new(DEFAULT_SPEED_KMH)
    }
}

impl H3GridRouteService {
    pub fn new(speed_kmh: f64) -> Self {
        Self {
            speed_kmh: speed_kmh.max(f64::EPSILON),
        }
    }

    pub fn speed_kmh(&self) -> f64 {
        self.speed_kmh
    }
}

impl RouteService for H3GridRouteService {
    fn travel_time_secs(&self, from: CellIndex, to: CellIndex, _depart_ms: u64) -> Option<f64> {
        if from == to {
            return Some(0.0);
        }
        Some(distance_km_between_cells(from, to) / self.speed_kmh * 3600.0)
    }

    fn shortest_path(&self, from: CellIndex, to: CellIndex) -> Option<Vec<CellIndex>> {
        if from == to {
            return Some(vec![from]);
        }
        grid_path_cells_cached(from, to)
    }
}

/// LRU-cached wrapper around any [`RouteService`].
///
/// Travel times are keyed on `(from, to)` only, so the inner service must not
/// depend on departure time. On an inner miss the grid service is tried when
/// `fallback_to_grid` is set.
pub struct CachedRouteService {
    inner: Box<dyn RouteService>,
    times: Mutex<LruCache<(CellIndex, CellIndex), Option<f64>>>,
    fallback: Option<H3GridRouteService>,
}

impl CachedRouteService {
    pub fn new(inner: Box<dyn RouteService>, capacity: usize, fallback_to_grid: bool) -> Self {
        Self {
            inner,
            times: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
            fallback: fallback_to_grid.then(H3GridRouteService::default),
        }
    }

    fn lookup(&self, from: CellIndex, to: CellIndex, depart_ms: u64) -> Option<f64> {
        self.inner
            .travel_time_secs(from, to, depart_ms)
            .or_else(|| self.fallback?.travel_time_secs(from, to, depart_ms))
    }
}

impl RouteService for CachedRouteService {
    fn travel_time_secs(&self, from: CellIndex, to: CellIndex, depart_ms: u64) -> Option<f64> {
        let key = (from, to);
        if let Ok(mut cache) = self.times.lock() {
            if let Some(hit) = cache.get(&key) {
                return *hit;
            }
        }
        let result = self.lookup(from, to, depart_ms);
        if let Ok(mut cache) = self.times.lock() {
            cache.put(key, result);
        }
        result
    }

    fn shortest_path(&self, from: CellIndex, to: CellIndex) -> Option<Vec<CellIndex>> {
        self.inner
            .shortest_path(from, to)
            .or_else(|| self.fallback?.shortest_path(from, to))
    }
}

/// Build the shared route service described by `kind`.
pub fn build_route_service(kind: &RouteServiceKind) -> Arc<dyn RouteService> {
    match *kind {
        RouteServiceKind::H3Grid { speed_kmh } => Arc::new(H3GridRouteService::new(speed_kmh)),
        RouteServiceKind::CachedH3Grid {
            speed_kmh,
            capacity,
        } => Arc::new(CachedRouteService::new(
            Box::new(H3GridRouteService::new(speed_kmh)),
            if capacity == 0 {
                DEFAULT_ROUTE_CACHE_CAPACITY
            } else {
                capacity
            },
            false,
        )),
    }
}
