use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

/// Hands out process-wide ids per key, starting at 1.
pub struct IdGenerator {}

static ID_MAP: Lazy<RwLock<HashMap<&'static str, AtomicUsize>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

impl IdGenerator {
    pub fn next_id(key: &'static str) -> usize {
        if let Some(id) = ID_MAP
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
        {
            return id.fetch_add(1, Ordering::Relaxed);
        }
        ID_MAP
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_insert_with(|| AtomicUsize::new(1))
            .fetch_add(1, Ordering::Relaxed)
    }
}
