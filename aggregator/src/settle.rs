// Deferred last-fetch stamping. A refresh only becomes "fresh" a short while
// after it was written, so requests that immediately follow a cold lookup still
// see it as unfetched. Jobs are detached from the request that scheduled them.
use crate::counter;
use crate::metrics_defs::SETTLE_FAILURES;
use crate::store::Store;
use chrono::Utc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};

const QUEUE_SIZE: usize = 1024;

#[derive(Debug)]
struct SettleJob {
    puuid: String,
    due: Instant,
}

#[derive(Clone)]
pub struct SettleQueue {
    tx: mpsc::Sender<SettleJob>,
    delay: Duration,
}

impl SettleQueue {
    /// Spawns the worker on the current runtime.
    pub fn spawn(store: Store, delay: Duration) -> Self {
        let (tx, rx) = mpsc::channel::<SettleJob>(QUEUE_SIZE);
        tokio::spawn(run_worker(store, rx));
        SettleQueue { tx, delay }
    }

    /// Never waits; a full queue drops the job and the row stays unstamped.
    pub fn schedule(&self, puuid: &str) {
        let job = SettleJob {
            puuid: puuid.to_string(),
            due: Instant::now() + self.delay,
        };
        if let Err(err) = self.tx.try_send(job) {
            counter!(SETTLE_FAILURES, "reason" => "queue").increment(1);
            tracing::warn!(puuid, error = %err, "Could not schedule last-fetch stamp");
        }
    }
}

async fn run_worker(store: Store, mut rx: mpsc::Receiver<SettleJob>) {
    while let Some(job) = rx.recv().await {
        let store = store.clone();
        tokio::spawn(async move {
            sleep_until(job.due).await;
            stamp(&store, &job.puuid).await;
        });
    }
    tracing::debug!("Settle queue closed");
}

async fn stamp(store: &Store, puuid: &str) {
    match store.set_last_fetch_at(puuid, Utc::now()).await {
        Ok(true) => tracing::debug!(puuid, "Stamped last fetch"),
        Ok(false) => tracing::debug!(puuid, "Player vanished before last fetch stamp"),
        Err(err) => {
            counter!(SETTLE_FAILURES, "reason" => "store").increment(1);
            tracing::warn!(puuid, error = %err, "Failed to stamp last fetch");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persister::Persister;
    use crate::testutils;

    #[tokio::test]
    async fn test_stamp_after_delay() {
        let store = Store::in_memory().await.unwrap();
        Persister::new(store.pool().clone(), 100)
            .upsert_player(&testutils::player_record("p-1", "Ghost", "EUW"))
            .await
            .unwrap();

        let queue = SettleQueue::spawn(store.clone(), Duration::from_millis(200));
        queue.schedule("p-1");
        // Unknown players are ignored
        queue.schedule("p-404");

        tokio::time::sleep(Duration::from_millis(50)).await;
        let player = store.player_by_puuid("p-1").await.unwrap().unwrap();
        assert!(player.last_fetch_at.is_none());

        tokio::time::sleep(Duration::from_millis(400)).await;
        let player = store.player_by_puuid("p-1").await.unwrap().unwrap();
        assert!(player.last_fetch_at.is_some());
    }
}
