//! Job Board
//!
//! Latest known state of recent jobs, fed by the gateway as the
//! [`StateListener`] and read by `obd.job.v1`.

use obd_gateway_core::domain::{JobId, JobView, ObdCommandJob};
use obd_gateway_core::port::StateListener;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

pub const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Default)]
struct BoardState {
    jobs: HashMap<JobId, JobView>,
    /// Insertion order, oldest first, for eviction
    order: VecDeque<JobId>,
}

#[derive(Debug)]
pub struct JobBoard {
    state: Mutex<BoardState>,
    capacity: usize,
}

impl Default for JobBoard {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl JobBoard {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(BoardState::default()),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BoardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store the view, replacing any older one for the same job
    pub fn record(&self, view: JobView) {
        let Some(id) = view.job_id else {
            return;
        };
        let mut state = self.lock();
        if state.jobs.insert(id, view).is_none() {
            state.order.push_back(id);
            self.evict(&mut state);
        }
    }

    /// Store the view unless the job is already known.
    /// The worker may report a job before the enqueuer gets to record it.
    pub fn record_if_absent(&self, view: JobView) {
        let Some(id) = view.job_id else {
            return;
        };
        let mut state = self.lock();
        if !state.jobs.contains_key(&id) {
            state.jobs.insert(id, view);
            state.order.push_back(id);
            self.evict(&mut state);
        }
    }

    fn evict(&self, state: &mut BoardState) {
        while state.order.len() > self.capacity {
            if let Some(oldest) = state.order.pop_front() {
                state.jobs.remove(&oldest);
                debug!(job_id = oldest, "Evicted job from board");
            }
        }
    }

    pub fn get(&self, id: JobId) -> Option<JobView> {
        self.lock().jobs.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StateListener for JobBoard {
    fn state_update(&self, job: &ObdCommandJob) {
        self.record(job.view());
    }
}
