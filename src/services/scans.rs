use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

struct ScanSlot {
    cancel: CancellationToken,
    /// Flips to `true` once the scan task has let go of its guard.
    finished: watch::Receiver<bool>,
}

/// At most one running backfill per guild.
#[derive(Clone, Default)]
pub struct ScanRegistry {
    scans: Arc<Mutex<HashMap<u64, ScanSlot>>>,
}

/// Registration of a running scan. Dropping it frees the guild's slot and
/// wakes everyone waiting in [`ScanRegistry::stop_and_wait`].
pub struct ScanGuard {
    registry: ScanRegistry,
    guild_id: u64,
    cancel: CancellationToken,
    finished: watch::Sender<bool>,
}

impl ScanGuard {
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Drop for ScanGuard {
    fn drop(&mut self) {
        self.registry.scans.lock().unwrap().remove(&self.guild_id);
        self.finished.send_replace(true);
    }
}

impl ScanRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the guild's slot, or `None` if a scan is already running.
    pub fn try_register(&self, guild_id: u64) -> Option<ScanGuard> {
        let mut scans = self.scans.lock().unwrap();
        if scans.contains_key(&guild_id) {
            return None;
        }
        let cancel = CancellationToken::new();
        let (finished, finished_rx) = watch::channel(false);
        scans.insert(
            guild_id,
            ScanSlot {
                cancel: cancel.clone(),
                finished: finished_rx,
            },
        );
        Some(ScanGuard {
            registry: self.clone(),
            guild_id,
            cancel,
            finished,
        })
    }

    /// Requests cancellation. Returns `false` if no scan was running.
    pub fn stop(&self, guild_id: u64) -> bool {
        match self.scans.lock().unwrap().get(&guild_id) {
            Some(slot) => {
                slot.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancels the guild's scan and waits until its task has finished, so no
    /// quote or cursor write of it can land afterwards. Returns `false` if no
    /// scan was running.
    pub async fn stop_and_wait(&self, guild_id: u64) -> bool {
        let slot = self
            .scans
            .lock()
            .unwrap()
            .get(&guild_id)
            .map(|slot| (slot.cancel.clone(), slot.finished.clone()));
        let Some((cancel, mut finished)) = slot else {
            return false;
        };
        cancel.cancel();
        // Errors only when the guard is gone, which means finished as well.
        let _ = finished.wait_for(|done| *done).await;
        true
    }

    pub fn is_running(&self, guild_id: u64) -> bool {
        self.scans.lock().unwrap().contains_key(&guild_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_scan_per_guild() {
        let registry = ScanRegistry::new();
        let guard = registry.try_register(1).unwrap();
        assert!(registry.try_register(1).is_none());
        assert!(registry.try_register(2).is_some());
        assert!(registry.is_running(1));

        drop(guard);
        assert!(!registry.is_running(1));
        assert!(registry.try_register(1).is_some());
    }

    #[test]
    fn test_stop_cancels_token() {
        let registry = ScanRegistry::new();
        let guard = registry.try_register(1).unwrap();
        let token = guard.token();

        assert!(!registry.stop(2));
        assert!(registry.stop(1));
        assert!(token.is_cancelled());
        // Stays registered until the scan task lets go.
        assert!(registry.is_running(1));
    }

    #[tokio::test]
    async fn test_stop_and_wait_returns_after_guard_drops() {
        let registry = ScanRegistry::new();
        assert!(!registry.stop_and_wait(1).await);

        let guard = registry.try_register(1).unwrap();
        let token = guard.token();
        let task = tokio::spawn(async move {
            token.cancelled().await;
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            drop(guard);
        });

        assert!(registry.stop_and_wait(1).await);
        assert!(!registry.is_running(1));
        task.await.unwrap();
    }
}
