//! Integration tests for nearby-core.
//!
//! End-to-end scenarios through the assembled service: record mutations,
//! change-log driven index sync, and radius search.

use nearby_core::changelog::{ChangeLog, JournalChangeLog};
use nearby_core::config::Config;
use nearby_core::health::{Component, ComponentStatus};
use nearby_core::hotzone::HotZoneConfig;
use nearby_core::index::PartitionKind;
use async_trait::async_trait;
use nearby_core::records::{InMemoryRecordStore, NewRecord, Record, RecordId, RecordStore};
use nearby_core::search::NearbyQuery;
use nearby_core::{Error, ProximityService, ProximityServiceBuilder};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::Notify;

const GANGNAM: (f64, f64) = (37.4991, 127.0313);
const BUSAN: (f64, f64) = (35.1796, 129.0756);

fn create_test_config() -> Config {
    let mut config = Config::default();
    // tests drive sync by hand
    config.index_sync.enabled = false;
    config
}

fn create_test_input(name: &str, (latitude, longitude): (f64, f64)) -> NewRecord {
    NewRecord {
        owner_id: 42,
        name: name.to_string(),
        category: "restaurant".to_string(),
        phone: None,
        address: "Teheran-ro, Seoul".to_string(),
        latitude,
        longitude,
    }
}

async fn search_total(service: &ProximityService, (latitude, longitude): (f64, f64)) -> usize {
    service
        .search_nearby(&NearbyQuery::new(latitude, longitude, 500))
        .await
        .expect("search failed")
        .total
}

mod scenarios {
    use super::*;

    async fn create_indexed(service: &ProximityService) -> Record {
        let record = service
            .records()
            .create(create_test_input("Gangnam Kimbap", GANGNAM))
            .await
            .expect("create failed");
        service.sync_once(500).await.expect("sync failed");
        record
    }

    /// Created records become searchable after a sync.
    #[tokio::test]
    async fn test_create_then_sync() {
        let service = ProximityService::new(create_test_config())
            .await
            .expect("Failed to build service");

        let record = service
            .records()
            .create(create_test_input("Gangnam Kimbap", GANGNAM))
            .await
            .expect("create failed");

        assert_eq!(search_total(&service, GANGNAM).await, 0);

        assert_eq!(service.sync_once(500).await.unwrap(), 1);

        let response = service
            .search_nearby(&NearbyQuery::new(GANGNAM.0, GANGNAM.1, 500))
            .await
            .unwrap();
        assert_eq!(response.total, 1);
        assert_eq!(response.items[0].id, record.id);
        assert_eq!(response.items[0].name, "Gangnam Kimbap");
    }

    /// Moving a record moves its index entry.
    #[tokio::test]
    async fn test_move_then_sync() {
        let service = ProximityService::new(create_test_config()).await.unwrap();
        let record = create_indexed(&service).await;

        service
            .records()
            .update(record.id, create_test_input("Gangnam Kimbap", BUSAN))
            .await
            .expect("update failed");
        assert_eq!(service.sync_once(500).await.unwrap(), 1);

        assert_eq!(search_total(&service, GANGNAM).await, 0);
        assert_eq!(search_total(&service, BUSAN).await, 1);
    }

    /// Record store whose batch lookup can be held open after reading.
    struct GatedStore {
        inner: InMemoryRecordStore,
        gate_enabled: AtomicBool,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl RecordStore for GatedStore {
        async fn find_by_id(&self, id: RecordId) -> nearby_core::Result<Option<Record>> {
            self.inner.find_by_id(id).await
        }

        async fn find_all_by_ids(&self, ids: &[RecordId]) -> nearby_core::Result<Vec<Record>> {
            let snapshot = self.inner.find_all_by_ids(ids).await?;
            if self.gate_enabled.swap(false, Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            Ok(snapshot)
        }

        async fn next_id(&self) -> nearby_core::Result<RecordId> {
            self.inner.next_id().await
        }

        async fn save(&self, record: Record) -> nearby_core::Result<()> {
            self.inner.save(record).await
        }

        async fn count(&self) -> nearby_core::Result<usize> {
            self.inner.count().await
        }
    }

    /// A search in flight while a record moves must not pin the old
    /// coordinates in the record cache.
    #[tokio::test]
    async fn test_move_during_search_is_visible_after_sync() {
        let store = Arc::new(GatedStore {
            inner: InMemoryRecordStore::new(),
            gate_enabled: AtomicBool::new(false),
            entered: Notify::new(),
            release: Notify::new(),
        });
        let service = Arc::new(
            ProximityServiceBuilder::new(create_test_config())
                .with_record_store(store.clone())
                .build()
                .await
                .unwrap(),
        );
        let record = create_indexed(&service).await;

        store.gate_enabled.store(true, Ordering::SeqCst);
        let search = {
            let service = Arc::clone(&service);
            tokio::spawn(async move { search_total(&service, GANGNAM).await })
        };

        store.entered.notified().await;
        service
            .records()
            .update(record.id, create_test_input("Gangnam Kimbap", BUSAN))
            .await
            .expect("update failed");
        store.release.notify_one();
        assert_eq!(search.await.unwrap(), 1);

        assert_eq!(service.sync_once(500).await.unwrap(), 1);

        assert_eq!(search_total(&service, BUSAN).await, 1);
        assert_eq!(search_total(&service, GANGNAM).await, 0);
        assert_eq!(service.records().get(record.id).await.unwrap().latitude, BUSAN.0);
    }

    /// Deleted records disappear from search and lookups.
    #[tokio::test]
    async fn test_delete_then_sync() {
        let service = ProximityService::new(create_test_config()).await.unwrap();
        let record = create_indexed(&service).await;

        service
            .records()
            .delete(record.id)
            .await
            .expect("delete failed");
        assert_eq!(service.sync_once(500).await.unwrap(), 1);

        assert_eq!(search_total(&service, GANGNAM).await, 0);
        assert!(matches!(
            service.records().get(record.id).await,
            Err(Error::NotFound(id)) if id == record.id
        ));
        assert!(service.index().location_of(record.id).await.unwrap().is_none());
    }

    /// Search serves cached cells until a sync clears them.
    #[tokio::test]
    async fn test_sync_invalidates_cached_cells() {
        let service = ProximityService::new(create_test_config()).await.unwrap();
        create_indexed(&service).await;
        assert_eq!(search_total(&service, GANGNAM).await, 1);

        service
            .records()
            .create(create_test_input("Second", GANGNAM))
            .await
            .unwrap();
        service.sync_once(500).await.unwrap();
        assert_eq!(search_total(&service, GANGNAM).await, 2);
    }
}

mod pagination {
    use super::*;

    #[tokio::test]
    async fn test_pages_of_two() {
        let service = ProximityService::new(create_test_config()).await.unwrap();
        for i in 0..5 {
            service
                .records()
                .create(create_test_input(
                    &format!("shop-{}", i),
                    (GANGNAM.0 + i as f64 * 0.0002, GANGNAM.1),
                ))
                .await
                .unwrap();
        }
        service.sync_once(500).await.unwrap();

        let mut cursor = None;
        let mut sizes = Vec::new();
        let mut seen = BTreeSet::new();
        for _ in 0..3 {
            let response = service
                .search_nearby(
                    &NearbyQuery::new(GANGNAM.0, GANGNAM.1, 500)
                        .with_limit(2)
                        .with_cursor(cursor.take()),
                )
                .await
                .unwrap();
            assert_eq!(response.total, 5);
            sizes.push(response.items.len());
            for item in &response.items {
                assert!(seen.insert(item.id), "item {} returned twice", item.id);
            }
            cursor = response.next_cursor;
        }

        assert_eq!(sizes, vec![2, 2, 1]);
        assert!(cursor.is_none());
        assert_eq!(seen.len(), 5);
    }

    #[tokio::test]
    async fn test_repeated_query_is_stable() {
        let service = ProximityService::new(create_test_config()).await.unwrap();
        // identical coordinates tie on distance
        for i in 0..4 {
            service
                .records()
                .create(create_test_input(&format!("twin-{}", i), GANGNAM))
                .await
                .unwrap();
        }
        service.sync_once(500).await.unwrap();

        let query = NearbyQuery::new(GANGNAM.0, GANGNAM.1, 500);
        let first = service.search_nearby(&query).await.unwrap();
        let second = service.search_nearby(&query).await.unwrap();
        assert_eq!(first, second);

        let ids: Vec<_> = first.items.iter().map(|i| i.id).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }
}

mod sync_integration {
    use super::*;

    #[tokio::test]
    async fn test_idempotent_sync() {
        let service = ProximityService::new(create_test_config()).await.unwrap();
        let record = service
            .records()
            .create(create_test_input("Cafe", GANGNAM))
            .await
            .unwrap();

        assert_eq!(service.sync_once(500).await.unwrap(), 1);
        let location = service.index().location_of(record.id).await.unwrap();
        let sizes = service.index().sizes().await.unwrap();

        assert_eq!(service.sync_once(500).await.unwrap(), 0);
        assert_eq!(service.index().location_of(record.id).await.unwrap(), location);
        assert_eq!(service.index().sizes().await.unwrap(), sizes);
    }

    #[tokio::test]
    async fn test_hot_zone_moves_keep_one_location() {
        let mut config = create_test_config();
        config.hot_zones.zones = vec![HotZoneConfig::new("wydm", "Gangnam")];
        let service = ProximityService::new(config).await.unwrap();

        let record = service
            .records()
            .create(create_test_input("Mover", GANGNAM))
            .await
            .unwrap();
        service.sync_once(500).await.unwrap();
        assert_eq!(
            service.index().location_of(record.id).await.unwrap().map(|l| l.0),
            Some(PartitionKind::Hot)
        );

        for (round, point) in [BUSAN, GANGNAM, BUSAN].into_iter().enumerate() {
            service
                .records()
                .update(record.id, create_test_input("Mover", point))
                .await
                .unwrap();
            service.sync_once(500).await.unwrap();

            let sizes = service.index().sizes().await.unwrap();
            assert_eq!(sizes.total(), 1, "round {}", round);
        }
        assert_eq!(
            service.index().location_of(record.id).await.unwrap().map(|l| l.0),
            Some(PartitionKind::Standard)
        );
    }

    #[tokio::test]
    async fn test_backlog_drains_in_batches() {
        let service = ProximityService::new(create_test_config()).await.unwrap();
        for i in 0..7 {
            service
                .records()
                .create(create_test_input(&format!("r{}", i), GANGNAM))
                .await
                .unwrap();
        }

        assert_eq!(service.synchronizer().backlog().await.unwrap().unprocessed, 7);
        assert_eq!(service.sync_once(3).await.unwrap(), 3);
        assert_eq!(service.sync_once(3).await.unwrap(), 3);
        assert_eq!(service.sync_once(3).await.unwrap(), 1);
        assert_eq!(service.sync_once(3).await.unwrap(), 0);

        let backlog = service.synchronizer().backlog().await.unwrap();
        assert_eq!(backlog.unprocessed, 0);
        assert!(backlog.oldest_created_at.is_none());
        assert_eq!(service.metrics().sync_processed_events(), 7);
    }

    #[tokio::test]
    async fn test_concurrent_mutations_and_sync() {
        let service = Arc::new(ProximityService::new(create_test_config()).await.unwrap());

        let mut handles = Vec::new();
        for worker in 0..4 {
            let service = Arc::clone(&service);
            handles.push(tokio::spawn(async move {
                for i in 0..10 {
                    service
                        .records()
                        .create(create_test_input(
                            &format!("w{}-{}", worker, i),
                            (GANGNAM.0 + i as f64 * 0.0001, GANGNAM.1),
                        ))
                        .await
                        .unwrap();
                }
            }));
        }
        let syncer = {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                for _ in 0..5 {
                    service.sync_once(8).await.unwrap();
                    tokio::task::yield_now().await;
                }
            })
        };
        for handle in handles {
            handle.await.unwrap();
        }
        syncer.await.unwrap();

        while service.sync_once(500).await.unwrap() > 0 {}
        assert_eq!(service.index().sizes().await.unwrap().total(), 40);
        assert_eq!(search_total(&service, GANGNAM).await, 40);
    }
}

mod journal_integration {
    use super::*;

    /// Unprocessed events survive a restart and are applied afterwards.
    #[tokio::test]
    async fn test_journal_restart_resumes_backlog() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("changes.journal");

        {
            let log = JournalChangeLog::open(&path).expect("Failed to open journal");
            for id in 1..=5 {
                log.append(id, nearby_core::changelog::ChangeKind::Created)
                    .await
                    .unwrap();
            }
            let first_two: Vec<_> = log
                .poll_unprocessed(2)
                .await
                .unwrap()
                .into_iter()
                .map(|e| e.id)
                .collect();
            log.mark_processed(&first_two).await.unwrap();
            log.sync().unwrap();
        }

        let log = JournalChangeLog::open(&path).expect("Failed to reopen journal");
        assert_eq!(log.len(), 5);
        assert_eq!(log.count_unprocessed().await.unwrap(), 3);
        let pending: Vec<_> = log
            .poll_unprocessed(10)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(pending, vec![3, 4, 5]);

        // a new event continues the sequence
        let next = log
            .append(9, nearby_core::changelog::ChangeKind::Deleted)
            .await
            .unwrap();
        assert_eq!(next.id, 6);
    }

    #[tokio::test]
    async fn test_service_with_journal() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = create_test_config();
        config.change_log.journal_path = Some(temp_dir.path().join("nested/changes.journal"));

        let service = ProximityService::new(config).await.unwrap();
        service
            .records()
            .create(create_test_input("Durable", GANGNAM))
            .await
            .unwrap();
        assert_eq!(service.sync_once(500).await.unwrap(), 1);
        assert_eq!(search_total(&service, GANGNAM).await, 1);
        service.stop().await.unwrap();

        assert!(temp_dir.path().join("nested/changes.journal").exists());
    }
}

mod health_integration {
    use super::*;

    #[tokio::test]
    async fn test_health_lifecycle() {
        let mut config = create_test_config();
        config.index_sync.enabled = true;
        config.index_sync.delay_ms = 10;
        let service = ProximityService::new(config).await.unwrap();

        assert_eq!(
            service.health().get_component_status(Component::IndexSync),
            Some(ComponentStatus::Unknown)
        );

        service.start().await;
        let mut healthy = false;
        for _ in 0..100 {
            if service.health().get_component_status(Component::IndexSync)
                == Some(ComponentStatus::Healthy)
            {
                healthy = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(healthy);
        assert!(service.health().is_sync_loop_running());

        let status = service.status().await.unwrap();
        assert_eq!(status.status, "healthy");
        assert!(status.sync_loop_running);

        service.stop().await.unwrap();
        assert!(!service.health().is_sync_loop_running());
    }

    #[tokio::test]
    async fn test_metrics_exposition() {
        let service = ProximityService::new(create_test_config()).await.unwrap();
        service
            .records()
            .create(create_test_input("Cafe", GANGNAM))
            .await
            .unwrap();
        service.sync_once(500).await.unwrap();
        search_total(&service, GANGNAM).await;

        let text = service.metrics().encode_text().unwrap();
        assert!(text.contains("nearby_search_latency_seconds"));
        assert!(text.contains("nearby_index_sync_processed_events_total 1"));
        assert!(text.contains("nearby_geo_cache_misses_total"));
    }
}
