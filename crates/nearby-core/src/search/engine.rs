use super::cursor;
use crate::cache::GeoCellCache;
use crate::config::SearchConfig;
use crate::geo::{haversine_meters, neighbors, validate_coordinates};
use crate::index::SpatialIndexStore;
use crate::metrics::ProximityMetrics;
use crate::records::{Record, RecordId, RecordService};
use crate::{Result, ValidationError};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// A radius query.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NearbyQuery {
    pub latitude: f64,
    pub longitude: f64,
    /// Falls back to the configured default radius
    #[serde(default, alias = "radius")]
    pub radius_meters: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub cursor: Option<String>,
}

impl NearbyQuery {
    pub fn new(latitude: f64, longitude: f64, radius_meters: u32) -> Self {
        Self {
            latitude,
            longitude,
            radius_meters: Some(radius_meters),
            limit: None,
            cursor: None,
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_cursor(mut self, cursor: Option<String>) -> Self {
        self.cursor = cursor;
        self
    }
}

/// One page of search results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbySearchResponse {
    /// Matches within the radius, across all pages
    pub total: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
    #[serde(rename = "businesses")]
    pub items: Vec<NearbyItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyItem {
    pub id: RecordId,
    pub name: String,
    pub category: String,
    pub distance_m: u64,
    pub latitude: f64,
    pub longitude: f64,
}

/// Geohash precision whose cells are on the order of the radius, so the
/// 3x3 neighbor window covers the whole circle.
pub fn precision_for_radius(radius_meters: u32) -> usize {
    match radius_meters {
        0..=300 => 7,
        301..=1_000 => 6,
        1_001..=5_000 => 5,
        5_001..=20_000 => 4,
        _ => 3,
    }
}

struct Candidate {
    record: Record,
    distance: f64,
}

/// Serves radius queries from the spatial index and record caches.
pub struct SearchEngine {
    config: SearchConfig,
    index: Arc<SpatialIndexStore>,
    records: Arc<RecordService>,
    geo_cache: Arc<GeoCellCache>,
    metrics: Arc<ProximityMetrics>,
}

impl SearchEngine {
    pub fn new(
        config: SearchConfig,
        index: Arc<SpatialIndexStore>,
        records: Arc<RecordService>,
        geo_cache: Arc<GeoCellCache>,
        metrics: Arc<ProximityMetrics>,
    ) -> Self {
        Self {
            config,
            index,
            records,
            geo_cache,
            metrics,
        }
    }

    /// Records within `radius_meters` of the query point, nearest first.
    ///
    /// Equal distances are ordered by record id so pages are stable across
    /// repeated queries.
    pub async fn search_nearby(&self, query: &NearbyQuery) -> Result<NearbySearchResponse> {
        let start = Instant::now();

        validate_coordinates(query.latitude, query.longitude)?;
        let radius = self.resolve_radius(query.radius_meters)?;
        let limit = self.resolve_limit(query.limit)?;
        let offset = cursor::decode(query.cursor.as_deref())?;

        let precision = precision_for_radius(radius);
        let candidates = self
            .gather_candidates(query.latitude, query.longitude, precision)
            .await?;
        let candidate_ids: Vec<RecordId> = candidates.into_iter().collect();

        let mut matches: Vec<Candidate> = self
            .records
            .find_active_by_ids(&candidate_ids)
            .await?
            .into_iter()
            .filter_map(|record| {
                let distance = haversine_meters(
                    query.latitude,
                    query.longitude,
                    record.latitude,
                    record.longitude,
                );
                (distance <= f64::from(radius)).then_some(Candidate { record, distance })
            })
            .collect();

        matches.sort_by(|a, b| match a.distance.total_cmp(&b.distance) {
            Ordering::Equal => a.record.id.cmp(&b.record.id),
            other => other,
        });

        let total = matches.len();
        let response = if offset >= total {
            NearbySearchResponse {
                total,
                next_cursor: None,
                items: Vec::new(),
            }
        } else {
            let end = offset.saturating_add(limit).min(total);
            let items = matches
                .drain(offset..end)
                .map(|c| NearbyItem {
                    id: c.record.id,
                    name: c.record.name,
                    category: c.record.category,
                    distance_m: c.distance.round() as u64,
                    latitude: c.record.latitude,
                    longitude: c.record.longitude,
                })
                .collect();
            NearbySearchResponse {
                total,
                next_cursor: (end < total).then(|| cursor::encode(end)),
                items,
            }
        };

        self.metrics
            .record_search(start.elapsed(), candidate_ids.len(), total);
        debug!(
            latitude = query.latitude,
            longitude = query.longitude,
            radius,
            precision,
            candidates = candidate_ids.len(),
            total,
            offset,
            returned = response.items.len(),
            "Nearby search served"
        );
        Ok(response)
    }

    /// Candidate ids from the 3x3 window around the query point.
    async fn gather_candidates(
        &self,
        latitude: f64,
        longitude: f64,
        precision: usize,
    ) -> Result<BTreeSet<RecordId>> {
        let tier = precision as u8;
        let mut candidates = BTreeSet::new();

        for cell in neighbors(latitude, longitude, precision) {
            let ids = match self.geo_cache.get(tier, &cell) {
                Some(ids) => {
                    self.metrics.record_geo_cache_hit();
                    ids
                }
                None => {
                    self.metrics.record_geo_cache_miss();
                    let ids = Arc::new(self.index.find_ids_by_prefix(&cell).await?);
                    self.geo_cache.put(tier, &cell, Arc::clone(&ids));
                    ids
                }
            };
            candidates.extend(ids.iter().copied());
        }
        Ok(candidates)
    }

    fn resolve_radius(&self, radius: Option<u32>) -> std::result::Result<u32, ValidationError> {
        let radius = radius.unwrap_or(self.config.default_radius_m);
        if radius < self.config.min_radius_m || radius > self.config.max_radius_m {
            return Err(ValidationError::Radius {
                min: self.config.min_radius_m,
                max: self.config.max_radius_m,
                actual: radius,
            });
        }
        Ok(radius)
    }

    fn resolve_limit(&self, limit: Option<u32>) -> std::result::Result<usize, ValidationError> {
        match limit {
            None => Ok(self.config.default_limit as usize),
            Some(limit) if limit == 0 || limit > self.config.max_limit => {
                Err(ValidationError::Limit {
                    max: self.config.max_limit,
                    actual: limit,
                })
            }
            Some(limit) => Ok(limit as usize),
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }
}
