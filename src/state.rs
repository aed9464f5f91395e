use std::sync::Arc;

use crate::broadcast::ChannelBroadcaster;
use crate::config::Config;
use crate::engine::accounts::AccountsService;
use crate::engine::assignment::AssignmentCoordinator;
use crate::engine::lifecycle::LifecycleEngine;
use crate::notify::Notifier;
use crate::observability::metrics::Metrics;
use crate::store::Store;

pub struct AppState {
    pub store: Arc<Store>,
    pub broadcaster: Arc<ChannelBroadcaster>,
    pub notifier: Arc<Notifier>,
    pub lifecycle: LifecycleEngine,
    pub assignment: AssignmentCoordinator,
    pub accounts: AccountsService,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        let store = Arc::new(Store::new());
        let broadcaster = Arc::new(ChannelBroadcaster::new(config.event_buffer_size));
        let metrics = Metrics::new();

        let notifier = Arc::new(Notifier::new(
            store.clone(),
            broadcaster.clone(),
            metrics.clone(),
        ));
        let lifecycle = LifecycleEngine::new(
            store.clone(),
            notifier.clone(),
            broadcaster.clone(),
            metrics.clone(),
            config.require_parcel_version,
        );
        let assignment =
            AssignmentCoordinator::new(store.clone(), notifier.clone(), metrics.clone());
        let accounts = AccountsService::new(
            store.clone(),
            notifier.clone(),
            broadcaster.clone(),
            metrics.clone(),
        );

        Self {
            store,
            broadcaster,
            notifier,
            lifecycle,
            assignment,
            accounts,
            metrics,
        }
    }
}
