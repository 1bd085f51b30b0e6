use std::sync::atomic::{AtomicU64, Ordering};

/// Source of correlation ids (submit ids, draft component ids, completion ids).
///
/// Injected rather than global so tests can pin ids down.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// Random v4 UUIDs.
#[derive(Debug, Default)]
pub struct UuidIdGenerator {
    hyphenated: bool,
}

impl UuidIdGenerator {
    pub fn new(hyphenated: bool) -> Self {
        Self { hyphenated }
    }
}

impl IdGenerator for UuidIdGenerator {
    fn next_id(&self) -> String {
        let id = uuid::Uuid::new_v4();
        if self.hyphenated {
            id.hyphenated().to_string()
        } else {
            id.simple().to_string()
        }
    }
}

/// Deterministic `prefix-N` ids from an atomic counter.
#[derive(Debug)]
pub struct SequentialIdGenerator {
    prefix: String,
    counter: AtomicU64,
}

impl SequentialIdGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(0),
        }
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}-{}", self.prefix, n)
    }
}
