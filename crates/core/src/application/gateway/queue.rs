// Job Queue - unbounded FIFO shared by the enqueuer and the worker

use crate::domain::ObdCommandJob;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Returned when a job is pushed after the queue was closed
#[derive(Debug)]
pub struct QueueClosed(pub ObdCommandJob);

#[derive(Debug, Default)]
struct QueueState {
    jobs: VecDeque<ObdCommandJob>,
    closed: bool,
}

/// FIFO of jobs waiting for the worker.
/// Once closed it refuses new jobs but can still be drained.
#[derive(Debug, Default)]
pub struct JobQueue {
    state: Mutex<QueueState>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock leaves the deque intact; keep going
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, job: ObdCommandJob) -> Result<(), QueueClosed> {
        let mut state = self.lock();
        if state.closed {
            return Err(QueueClosed(job));
        }
        state.jobs.push_back(job);
        Ok(())
    }

    pub fn pop(&self) -> Option<ObdCommandJob> {
        self.lock().jobs.pop_front()
    }

    /// Remove every pending job, oldest first
    pub fn drain(&self) -> Vec<ObdCommandJob> {
        self.lock().jobs.drain(..).collect()
    }

    pub fn close(&self) {
        self.lock().closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ObdCommand;

    fn job(n: u64) -> ObdCommandJob {
        let mut job = ObdCommandJob::new(ObdCommand::engine_rpm());
        job.id = Some(n);
        job
    }

    #[test]
    fn test_fifo_order() {
        let queue = JobQueue::new();
        queue.push(job(1)).unwrap();
        queue.push(job(2)).unwrap();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop().unwrap().id, Some(1));
        assert_eq!(queue.pop().unwrap().id, Some(2));
        assert!(queue.pop().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_closed_queue_returns_job() {
        let queue = JobQueue::new();
        queue.push(job(1)).unwrap();
        queue.close();

        let QueueClosed(rejected) = queue.push(job(2)).unwrap_err();
        assert_eq!(rejected.id, Some(2));

        // Already queued jobs can still be drained
        assert_eq!(queue.pop().unwrap().id, Some(1));
        assert!(queue.is_closed());
    }

    #[test]
    fn test_drain_empties_queue() {
        let queue = JobQueue::new();
        for n in 1..=3 {
            queue.push(job(n)).unwrap();
        }
        let drained: Vec<_> = queue.drain().into_iter().filter_map(|j| j.id).collect();
        assert_eq!(drained, vec![1, 2, 3]);
        assert!(queue.is_empty());
    }
}
