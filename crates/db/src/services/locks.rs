use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Per-entity async locks keyed by id. Operations on different ids never contend.
#[derive(Clone, Default)]
pub struct EntityLocks {
    inner: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl EntityLocks {
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = match self.inner.lock() {
                Ok(locks) => locks,
                Err(poisoned) => poisoned.into_inner(),
            };
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(key.to_owned()).or_default().clone()
        };
        lock.lock_owned().await
    }

    pub fn held(&self) -> usize {
        match self.inner.lock() {
            Ok(locks) => locks.values().filter(|lock| Arc::strong_count(lock) > 1).count(),
            Err(poisoned) => {
                poisoned.into_inner().values().filter(|lock| Arc::strong_count(lock) > 1).count()
            }
        }
    }
}
