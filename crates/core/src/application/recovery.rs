// Crash recovery
//
// A RUNNING job can only reach a terminal state through its own worker. If
// the process died mid-fetch, those jobs would stay RUNNING forever, so on
// startup - before any worker runs - they are put back in the queue. The
// interrupted attempt is refunded: a crashed daemon is an infrastructure
// fault, not the document's.

use std::sync::Arc;

use tracing::info;

use crate::domain::JobState;
use crate::error::Result;
use crate::port::{JobStore, TimeProvider};

pub struct StartupRecovery {
    job_store: Arc<dyn JobStore>,
    clock: Arc<dyn TimeProvider>,
}

impl StartupRecovery {
    pub fn new(job_store: Arc<dyn JobStore>, clock: Arc<dyn TimeProvider>) -> Self {
        Self { job_store, clock }
    }

    /// Requeue every RUNNING job. Returns the number recovered.
    pub async fn recover_orphaned_jobs(&self) -> Result<usize> {
        let orphaned = self.job_store.find_by_state(JobState::Running).await?;
        let now = self.clock.now_millis();

        let mut recovered = 0;
        for mut job in orphaned {
            job.requeue(now, now, None)?;
            job.refund_attempt();
            self.job_store.update(&job).await?;

            info!(
                job_id = %job.id,
                document = %job.document,
                "Orphaned job requeued after restart"
            );
            recovered += 1;
        }

        info!(recovered = recovered, "Orphaned job recovery complete");
        Ok(recovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LookupJob;
    use crate::port::job_store::mocks::InMemoryJobStore;
    use crate::port::time_provider::mocks::MockClock;

    #[tokio::test]
    async fn test_running_jobs_requeued_with_attempt_refund() {
        let store = Arc::new(InMemoryJobStore::new());
        let clock = Arc::new(MockClock::new(10_000));

        let mut orphan = LookupJob::new("j1", "1083432108", 1_000, 0, 3);
        orphan.start(2_000).unwrap();
        store.insert(&orphan).await.unwrap();

        let untouched = LookupJob::new("j2", "1000000002", 1_000, 0, 3);
        store.insert(&untouched).await.unwrap();

        let recovery = StartupRecovery::new(store.clone(), clock);
        assert_eq!(recovery.recover_orphaned_jobs().await.unwrap(), 1);

        let recovered = store.find_by_id(&"j1".to_string()).await.unwrap().unwrap();
        assert_eq!(recovered.state, JobState::Queued);
        assert_eq!(recovered.attempts, 0);
        assert_eq!(recovered.eligible_at, 10_000);

        let second = StartupRecovery::new(store, Arc::new(MockClock::new(20_000)));
        assert_eq!(second.recover_orphaned_jobs().await.unwrap(), 0);
    }
}
