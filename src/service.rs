//! Feed service: catalog validation, caching, fetching and decoding.
//!
//! Every operation returns a `Result` whose error side is a
//! [`ServiceError`]; nothing here panics or aborts on a bad feed. The cache
//! lock is only taken for the lookup and the final store, never across the
//! upstream request or the decode.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::cache::{CacheStats, TtlCache};
use crate::catalog::{Category, FeedCatalog};
use crate::decoded::DecodedFeed;
use crate::error::ServiceError;
use crate::fetch::{BasicClient, HttpClient, fetch_bytes};
use crate::parser;

/// Accessibility feed holding the equipment inventory.
pub const EQUIPMENT_FEED: &str = "equipment";

#[derive(Clone)]
enum CachedPayload {
    Realtime(Arc<DecodedFeed>),
    Document(Arc<Value>),
}

/// Equipment records belonging to one station.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationAccessibility {
    pub station_id: String,
    pub equipment_count: usize,
    pub equipment: Vec<Value>,
}

/// Cache key for a feed: `"<category>_<feed_id>"`.
pub fn cache_key(category: Category, feed_id: &str) -> String {
    format!("{category}_{feed_id}")
}

pub struct FeedService<C = BasicClient> {
    catalog: FeedCatalog,
    cache: TtlCache<CachedPayload>,
    client: C,
}

impl<C: HttpClient> FeedService<C> {
    pub fn new(catalog: FeedCatalog, client: C) -> Self {
        Self {
            catalog,
            cache: TtlCache::new(),
            client,
        }
    }

    pub fn catalog(&self) -> &FeedCatalog {
        &self.catalog
    }

    /// Feed ids per category.
    pub fn list_feeds(&self) -> BTreeMap<Category, Vec<String>> {
        Category::ALL
            .into_iter()
            .map(|c| (c, self.catalog.feed_ids(c)))
            .collect()
    }

    /// `{feed_id: url}` for the subway feeds.
    pub fn list_subway_feeds(&self) -> BTreeMap<String, String> {
        self.catalog.feeds(Category::Subway)
    }

    pub async fn get_subway_feed(&self, feed_id: &str) -> Result<Arc<DecodedFeed>, ServiceError> {
        self.fetch(Category::Subway, feed_id).await
    }

    pub async fn get_lirr_feed(&self, feed_id: &str) -> Result<Arc<DecodedFeed>, ServiceError> {
        self.fetch(Category::Lirr, feed_id).await
    }

    pub async fn get_mnr_feed(&self, feed_id: &str) -> Result<Arc<DecodedFeed>, ServiceError> {
        self.fetch(Category::Mnr, feed_id).await
    }

    pub async fn get_service_alerts(
        &self,
        alert_type: &str,
    ) -> Result<Arc<DecodedFeed>, ServiceError> {
        self.fetch(Category::Alerts, alert_type).await
    }

    /// Returns the decoded GTFS-realtime feed `feed_id` of `category`,
    /// serving it from the cache while it is fresh.
    ///
    /// Failed fetches and failed decodes are never cached. Accessibility
    /// feeds are JSON documents, not GTFS-realtime, and are rejected here as
    /// invalid; use [`Self::get_accessibility_data`] for them.
    #[tracing::instrument(skip(self, category), fields(category = %category))]
    pub async fn fetch(
        &self,
        category: Category,
        feed_id: &str,
    ) -> Result<Arc<DecodedFeed>, ServiceError> {
        if category == Category::Accessibility {
            warn!(feed_id, "Accessibility feed requested as GTFS-realtime");
            return Err(ServiceError::InvalidFeed {
                category,
                feed_id: feed_id.to_string(),
            });
        }
        let url = self.source_url(category, feed_id)?;
        let key = cache_key(category, feed_id);

        if let Some(feed) = self.cached_realtime(category, feed_id, &key) {
            return Ok(feed);
        }

        let bytes = self.download(url).await?;
        let decoded = match parser::decode(&bytes, feed_id) {
            Ok(decoded) => Arc::new(decoded),
            Err(e) => {
                error!(error = %e, bytes = bytes.len(), "Feed decode failed");
                return Err(e.into());
            }
        };

        info!(
            entities = decoded.entities.len(),
            vehicles = decoded.vehicle_count(),
            "Feed decoded"
        );
        self.cache
            .set(key, CachedPayload::Realtime(Arc::clone(&decoded)));

        Ok(decoded)
    }

    /// Returns an accessibility JSON document (`current`, `upcoming`,
    /// `equipment`) as published upstream.
    #[tracing::instrument(skip(self))]
    pub async fn get_accessibility_data(&self, data_type: &str) -> Result<Arc<Value>, ServiceError> {
        let category = Category::Accessibility;
        let url = self.source_url(category, data_type)?;
        let key = cache_key(category, data_type);

        if let Some(doc) = self.cached_document(category, data_type, &key) {
            return Ok(doc);
        }

        let bytes = self.download(url).await?;
        let doc: Value = match serde_json::from_slice(&bytes) {
            Ok(doc) => doc,
            Err(e) => {
                error!(error = %e, bytes = bytes.len(), "Accessibility document is not valid JSON");
                return Err(ServiceError::Decode {
                    message: format!("Error parsing accessibility data: {e}"),
                });
            }
        };

        let doc = Arc::new(doc);
        self.cache.set(key, CachedPayload::Document(Arc::clone(&doc)));

        Ok(doc)
    }

    /// Filters the equipment inventory down to `station_id`. A station with
    /// no equipment yields a zero-count result, not an error.
    #[tracing::instrument(skip(self))]
    pub async fn get_station_accessibility(
        &self,
        station_id: &str,
    ) -> Result<StationAccessibility, ServiceError> {
        let doc = self.get_accessibility_data(EQUIPMENT_FEED).await?;
        let equipment = equipment_for_station(&doc, station_id);
        debug!(matches = equipment.len(), "Filtered station equipment");

        Ok(StationAccessibility {
            station_id: station_id.to_string(),
            equipment_count: equipment.len(),
            equipment,
        })
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    fn source_url(&self, category: Category, feed_id: &str) -> Result<&str, ServiceError> {
        self.catalog.source_url(category, feed_id).ok_or_else(|| {
            warn!(%category, feed_id, "Unknown feed requested");
            ServiceError::InvalidFeed {
                category,
                feed_id: feed_id.to_string(),
            }
        })
    }

    fn lookup(&self, category: Category, feed_id: &str, key: &str) -> Option<CachedPayload> {
        let timeout = Duration::from_secs(self.catalog.timeout_secs(category, feed_id));
        let hit = self.cache.get(key, timeout);
        debug!(key, timeout_secs = timeout.as_secs(), hit = hit.is_some(), "Cache lookup");
        hit
    }

    fn cached_realtime(
        &self,
        category: Category,
        feed_id: &str,
        key: &str,
    ) -> Option<Arc<DecodedFeed>> {
        match self.lookup(category, feed_id, key)? {
            CachedPayload::Realtime(feed) => Some(feed),
            CachedPayload::Document(_) => {
                self.evict_mismatched(key);
                None
            }
        }
    }

    fn cached_document(&self, category: Category, feed_id: &str, key: &str) -> Option<Arc<Value>> {
        match self.lookup(category, feed_id, key)? {
            CachedPayload::Document(doc) => Some(doc),
            CachedPayload::Realtime(_) => {
                self.evict_mismatched(key);
                None
            }
        }
    }

    fn evict_mismatched(&self, key: &str) {
        warn!(key, "Cached entry has the wrong payload kind, evicting");
        self.cache.remove(key);
    }

    async fn download(&self, url: &str) -> Result<Bytes, ServiceError> {
        let started = std::time::Instant::now();
        match fetch_bytes(&self.client, url).await {
            Ok(bytes) => {
                debug!(
                    bytes = bytes.len(),
                    elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                    "Feed bytes received"
                );
                Ok(bytes)
            }
            Err(e) => {
                warn!(error = %e, url, "Feed HTTP fetch failed");
                Err(e.into())
            }
        }
    }
}

/// Equipment records whose `station_id` equals `station_id`.
///
/// Accepts either `{"equipment": [...]}` or a bare array of records.
fn equipment_for_station(doc: &Value, station_id: &str) -> Vec<Value> {
    let items: &[Value] = match doc {
        Value::Array(items) => items,
        Value::Object(map) => map
            .get("equipment")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default(),
        _ => &[],
    };

    items
        .iter()
        .filter(|item| item.get("station_id").and_then(Value::as_str) == Some(station_id))
        .cloned()
        .collect()
}
