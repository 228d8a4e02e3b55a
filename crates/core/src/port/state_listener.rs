// State Listener Port
// Receives every job once the gateway is done with it.

use crate::domain::ObdCommandJob;

pub trait StateListener: Send + Sync {
    fn state_update(&self, job: &ObdCommandJob);
}

pub mod mocks {
    use super::*;
    use crate::domain::JobView;
    use std::sync::Mutex;

    /// Collects job snapshots in delivery order
    #[derive(Default)]
    pub struct CollectingListener {
        updates: Mutex<Vec<JobView>>,
    }

    impl CollectingListener {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn updates(&self) -> Vec<JobView> {
            self.updates.lock().unwrap().clone()
        }
    }

    impl StateListener for CollectingListener {
        fn state_update(&self, job: &ObdCommandJob) {
            self.updates.lock().unwrap().push(job.view());
        }
    }
}
