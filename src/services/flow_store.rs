use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as TurnMutex, OwnedMutexGuard};

use crate::models::BookingFlowState;

#[derive(Default)]
pub struct FlowStore {
    flows: Mutex<HashMap<String, BookingFlowState>>,
    turns: Mutex<HashMap<String, Arc<TurnMutex<()>>>>,
}

impl FlowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> BookingFlowState {
        let mut flows = self.flows.lock().unwrap();
        flows.entry(key.to_string()).or_default().clone()
    }

    pub fn peek(&self, key: &str) -> Option<BookingFlowState> {
        let flows = self.flows.lock().unwrap();
        flows.get(key).cloned()
    }

    pub fn update<F>(&self, key: &str, patch: F) -> BookingFlowState
    where
        F: FnOnce(&mut BookingFlowState),
    {
        let mut flows = self.flows.lock().unwrap();
        let flow = flows.entry(key.to_string()).or_default();
        patch(flow);
        flow.clone()
    }

    pub fn save(&self, key: &str, flow: BookingFlowState) {
        let mut flows = self.flows.lock().unwrap();
        flows.insert(key.to_string(), flow);
    }

    // Waits for any in-flight turn on `key` before removing the record.
    pub async fn reset(&self, key: &str) -> bool {
        let _turn = self.lock_turn(key).await;
        self.flows.lock().unwrap().remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.flows.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub async fn lock_turn(&self, key: &str) -> TurnGuard<'_> {
        let lock = {
            let mut turns = self.turns.lock().unwrap();
            Arc::clone(turns.entry(key.to_string()).or_default())
        };
        let guard = Arc::clone(&lock).lock_owned().await;
        TurnGuard {
            store: self,
            key: key.to_string(),
            lock,
            guard: Some(guard),
        }
    }

    pub fn turn_locks(&self) -> usize {
        self.turns.lock().unwrap().len()
    }

    // Called with the turn released. The map lock is held while checking so no
    // new waiter can clone the mutex between the count and the removal.
    fn release_turn(&self, key: &str, lock: &Arc<TurnMutex<()>>) {
        let mut turns = self.turns.lock().unwrap();
        let unused = Arc::strong_count(lock) == 2;
        if unused && !self.flows.lock().unwrap().contains_key(key) {
            turns.remove(key);
        }
    }
}

pub struct TurnGuard<'a> {
    store: &'a FlowStore,
    key: String,
    lock: Arc<TurnMutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.store.release_turn(&self.key, &self.lock);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FlowStage;
    use std::time::Duration;

    #[test]
    fn test_get_creates_idle_record() {
        let store = FlowStore::new();
        assert!(store.peek("c1").is_none());
        let flow = store.get("c1");
        assert_eq!(flow.stage, FlowStage::Idle);
        assert!(!flow.active);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_update_mutates_in_place() {
        let store = FlowStore::new();
        store.update("c1", |f| {
            f.active = true;
            f.stage = FlowStage::AwaitingName;
        });
        let flow = store.get("c1");
        assert!(flow.active);
        assert_eq!(flow.stage, FlowStage::AwaitingName);
    }

    #[test]
    fn test_keys_are_isolated() {
        let store = FlowStore::new();
        store.update("c1", |f| f.offer_shown = true);
        assert!(!store.get("c2").offer_shown);
        assert!(store.get("c1").offer_shown);
    }

    #[tokio::test]
    async fn test_reset_removes_record() {
        let store = FlowStore::new();
        store.update("c1", |f| f.completed = true);
        assert!(store.reset("c1").await);
        assert!(store.peek("c1").is_none());
        assert!(!store.reset("c1").await);
        assert!(!store.get("c1").completed);
        assert_eq!(store.turn_locks(), 0);
    }

    #[tokio::test]
    async fn test_turn_lock_dropped_when_no_record() {
        let store = FlowStore::new();
        {
            let _turn = store.lock_turn("c1").await;
            assert_eq!(store.turn_locks(), 1);
        }
        assert_eq!(store.turn_locks(), 0);

        {
            let _turn = store.lock_turn("c2").await;
            store.save("c2", BookingFlowState::default());
        }
        assert_eq!(store.turn_locks(), 1);
    }

    #[tokio::test]
    async fn test_reset_waits_for_running_turn() {
        let store = Arc::new(FlowStore::new());
        let turn = store.lock_turn("c1").await;

        let other = Arc::clone(&store);
        let reset = tokio::spawn(async move { other.reset("c1").await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!reset.is_finished());

        // the running turn commits before the reset applies
        store.save("c1", BookingFlowState::default());
        drop(turn);

        let removed = tokio::time::timeout(Duration::from_secs(1), reset)
            .await
            .expect("reset proceeds after the turn")
            .unwrap();
        assert!(removed);
        assert!(store.peek("c1").is_none());
    }

    #[tokio::test]
    async fn test_reset_keeps_single_writer() {
        let store = Arc::new(FlowStore::new());
        store.save("c1", BookingFlowState::default());
        let turn = store.lock_turn("c1").await;

        let resetter = Arc::clone(&store);
        let reset = tokio::spawn(async move { resetter.reset("c1").await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let contender = tokio::time::timeout(Duration::from_millis(100), store.lock_turn("c1")).await;
        assert!(contender.is_err(), "second turn must wait for the first");

        drop(turn);
        tokio::time::timeout(Duration::from_secs(1), reset)
            .await
            .expect("reset completes")
            .unwrap();
        let _next = tokio::time::timeout(Duration::from_secs(1), store.lock_turn("c1"))
            .await
            .expect("lock is free again");
    }

    #[tokio::test]
    async fn test_turn_lock_serializes_same_key() {
        let store = Arc::new(FlowStore::new());
        let guard = store.lock_turn("c1").await;

        let other = Arc::clone(&store);
        let waiter = tokio::spawn(async move {
            let _turn = other.lock_turn("c1").await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        // a different key is not blocked
        let _c2 = tokio::time::timeout(Duration::from_millis(100), store.lock_turn("c2"))
            .await
            .expect("other keys proceed");

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter acquires after release")
            .unwrap();
    }
}
