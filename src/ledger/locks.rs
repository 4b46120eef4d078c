use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

const PRUNE_THRESHOLD: usize = 1024;

/// One async mutex per student id. Ledger operations on the same student
/// queue up in arrival order; different students never wait on each other.
#[derive(Default)]
pub struct StudentLocks {
    inner: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl StudentLocks {
    pub async fn lock(&self, student_id: &str) -> OwnedMutexGuard<()> {
        let entry = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            if map.len() >= PRUNE_THRESHOLD {
                map.retain(|_, m| Arc::strong_count(m) > 1);
            }
            map.entry(student_id.to_string()).or_default().clone()
        };
        entry.lock_owned().await
    }

    pub fn tracked(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
