//! Shared fixtures for scheduler integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use riakgrid_core::{
    DriverResult, Filters, MasterInfo, OfferId, SchedulerDriver, TaskInfo, TaskStatus,
};
use riakgrid_scheduler::SchedulerConfig;

/// Records every outbound driver call.
#[derive(Default)]
pub struct MockDriver {
    pub launches: Mutex<Vec<(Vec<OfferId>, Vec<TaskInfo>)>>,
    pub reconciles: Mutex<Vec<Vec<TaskStatus>>>,
    pub stopped: Mutex<bool>,
}

#[async_trait]
impl SchedulerDriver for MockDriver {
    async fn launch_tasks(
        &self,
        offer_ids: &[OfferId],
        tasks: Vec<TaskInfo>,
        _filters: Filters,
    ) -> DriverResult<()> {
        self.launches
            .lock()
            .unwrap()
            .push((offer_ids.to_vec(), tasks));
        Ok(())
    }

    async fn reconcile_tasks(&self, statuses: Vec<TaskStatus>) -> DriverResult<()> {
        self.reconciles.lock().unwrap().push(statuses);
        Ok(())
    }

    async fn stop(&self) {
        *self.stopped.lock().unwrap() = true;
    }
}

impl MockDriver {
    pub fn arc() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// All tasks launched so far, across calls.
    pub fn launched_tasks(&self) -> Vec<TaskInfo> {
        self.launches
            .lock()
            .unwrap()
            .iter()
            .flat_map(|(_, tasks)| tasks.clone())
            .collect()
    }
}

pub fn test_config() -> SchedulerConfig {
    SchedulerConfig {
        framework_name: "riakgrid-test".to_string(),
        framework_role: "*".to_string(),
        user: None,
        principal: None,
        coordination_endpoints: vec!["127.0.0.1:2181".to_string()],
        artifact_base_url: "http://127.0.0.1:0".to_string(),
    }
}

pub fn master() -> MasterInfo {
    MasterInfo {
        id: "master-1".to_string(),
        hostname: "master.local".to_string(),
        port: 5050,
    }
}
