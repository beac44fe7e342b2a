//! Store-backed implementations of the loop's collaborators.
//!
//! `StoreMetricSource` answers peak-usage queries from samples published
//! into the store, and `StoreLifecycleController` keeps a local ledger of
//! lifecycle pauses. Together they let the daemon run a drain end to end
//! on a single node.

use hookdrain_core::{
    CallFuture, DrainRequest, LifecycleController, MetricQuery, MetricSource, Resolution,
    Statistic, epoch_secs,
};

use crate::store::StateStore;

/// Metric source reading `UsageSample`s from the state store.
#[derive(Clone)]
pub struct StoreMetricSource {
    store: StateStore,
}

impl StoreMetricSource {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }
}

impl MetricSource for StoreMetricSource {
    fn query<'a>(&'a self, query: &'a MetricQuery) -> CallFuture<'a, Option<f64>> {
        Box::pin(async move {
            match query.statistic {
                Statistic::Maximum => self
                    .store
                    .max_sample(
                        &query.namespace,
                        &query.metric_name,
                        &query.dimensions,
                        query.start,
                        query.end,
                    )
                    .map_err(|e| e.to_string()),
            }
        })
    }
}

/// Lifecycle controller recording heartbeats and resolutions in the
/// store's pause ledger.
#[derive(Clone)]
pub struct StoreLifecycleController {
    store: StateStore,
}

impl StoreLifecycleController {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }
}

impl LifecycleController for StoreLifecycleController {
    fn extend_pause<'a>(&'a self, request: &'a DrainRequest) -> CallFuture<'a, ()> {
        Box::pin(async move {
            self.store
                .heartbeat_pause(request, epoch_secs())
                .map(|_| ())
                .map_err(|e| e.to_string())
        })
    }

    fn resolve_pause<'a>(
        &'a self,
        request: &'a DrainRequest,
        resolution: Resolution,
    ) -> CallFuture<'a, ()> {
        Box::pin(async move {
            self.store
                .resolve_pause(request, resolution, epoch_secs())
                .map(|_| ())
                .map_err(|e| e.to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PauseStatus, UsageSample};
    use hookdrain_core::Dimension;

    fn test_request() -> DrainRequest {
        DrainRequest::new("i-1", "workers", "drain-hook").unwrap()
    }

    fn test_query(start: u64, end: u64) -> MetricQuery {
        MetricQuery {
            namespace: "Custom/WindowsMetrics".to_string(),
            metric_name: "ActiveUserSessions".to_string(),
            dimensions: vec![
                Dimension::new("InstanceId", "i-1"),
                Dimension::new("AutoScalingGroupName", "workers"),
            ],
            start,
            end,
            period_secs: 300,
            statistic: Statistic::Maximum,
        }
    }

    #[tokio::test]
    async fn metric_source_reads_peak() {
        let store = StateStore::open_in_memory().unwrap();
        for (timestamp, value) in [(100, 3.0), (200, 7.0)] {
            store
                .put_sample(&UsageSample {
                    namespace: "Custom/WindowsMetrics".to_string(),
                    metric_name: "ActiveUserSessions".to_string(),
                    dimensions: MetricQuery::dimensions_for(&test_request()),
                    timestamp,
                    value,
                })
                .unwrap();
        }

        let source = StoreMetricSource::new(store);
        assert_eq!(source.query(&test_query(0, 300)).await.unwrap(), Some(7.0));
        assert_eq!(source.query(&test_query(400, 700)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn controller_updates_ledger() {
        let store = StateStore::open_in_memory().unwrap();
        let request = test_request();
        store.begin_pause(&request, 1000).unwrap();

        let controller = StoreLifecycleController::new(store.clone());
        controller.extend_pause(&request).await.unwrap();
        controller
            .resolve_pause(&request, Resolution::Abandon)
            .await
            .unwrap();

        let record = store.get_pause(&request.table_key()).unwrap().unwrap();
        assert_eq!(record.heartbeats, 1);
        assert_eq!(record.status, PauseStatus::Abandoned);

        // A second resolve is rejected by the controller.
        assert!(
            controller
                .resolve_pause(&request, Resolution::Proceed)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn controller_without_pause_errors() {
        let store = StateStore::open_in_memory().unwrap();
        let controller = StoreLifecycleController::new(store);
        let err = controller.extend_pause(&test_request()).await.unwrap_err();
        assert!(err.contains("no lifecycle pause"));
    }
}
