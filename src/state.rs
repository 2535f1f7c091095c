use std::sync::Arc;

use crate::inspector::ContainerControl;
use crate::metric_registry::MetricRegistry;
use crate::snapshot::SnapshotService;

#[derive(Clone)]
pub struct AppState {
    pub(crate) snapshot: Arc<SnapshotService>,
    pub(crate) control: Arc<dyn ContainerControl>,
    pub(crate) metric_registry: MetricRegistry,
}

impl AppState {
    pub fn new(
        snapshot: Arc<SnapshotService>,
        control: Arc<dyn ContainerControl>,
        metric_registry: MetricRegistry,
    ) -> Self {
        Self {
            snapshot,
            control,
            metric_registry,
        }
    }
}
