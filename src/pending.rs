use chrono::{DateTime, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::debug;
use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, PoisonError},
};

/// Identifies one logical operation so it is applied at most once even when
/// duplicated or retried.
///
/// Two constructions with different semantics, chosen per operation kind:
/// a per-instance key makes every invocation distinct (right for repeatable
/// actions like ad-based top-ups), while a per-resource key collapses all
/// invocations of the same action (right for claim-once flows, where it
/// doubles as double-submit protection).
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Unique per invocation: digest of the action identity plus a random
    /// nonce.
    pub fn per_instance(action: &str) -> Self {
        let mut nonce = [0u8; 16];
        rand::rng().fill_bytes(&mut nonce);
        let mut hasher = Sha256::new();
        hasher.update(action.as_bytes());
        hasher.update(nonce);
        IdempotencyKey(hex::encode(&hasher.finalize()[..16]))
    }

    /// Stable for a given action identity: every invocation collides on
    /// purpose.
    pub fn per_resource(action: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(action.as_bytes());
        IdempotencyKey(hex::encode(&hasher.finalize()[..16]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why `try_begin` refused to register an operation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BeginError {
    /// Another operation holding one of the requested resource keys is
    /// still in flight.
    ResourceBusy { resource_key: String },
    /// An operation with the same idempotency key is already pending.
    DuplicateKey { key: IdempotencyKey },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PendingOutcome {
    Confirmed,
    Failed,
}

#[derive(Clone, Debug)]
pub struct PendingOperation {
    pub key: IdempotencyKey,
    pub resource_keys: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Tracks in-flight optimistic operations. Duplicate keys are suppressed,
/// and an operation holds every resource key it touches for its whole
/// flight; a second caller colliding on any of them is rejected outright,
/// never queued.
#[derive(Clone, Default)]
pub struct PendingOperationLog {
    entries: Arc<Mutex<HashMap<IdempotencyKey, PendingOperation>>>,
}

impl PendingOperationLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<IdempotencyKey, PendingOperation>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Atomically register a new pending operation. The busy check over all
    /// requested resource keys, the duplicate-key check and the insert
    /// happen under one lock, so two racing callers can never both pass the
    /// gate.
    pub fn try_begin(
        &self,
        key: IdempotencyKey,
        resource_keys: &[String],
    ) -> Result<(), BeginError> {
        let mut entries = self.entries();
        for resource_key in resource_keys {
            if entries
                .values()
                .any(|e| e.resource_keys.contains(resource_key))
            {
                return Err(BeginError::ResourceBusy {
                    resource_key: resource_key.clone(),
                });
            }
        }
        if entries.contains_key(&key) {
            return Err(BeginError::DuplicateKey { key });
        }
        entries.insert(
            key.clone(),
            PendingOperation {
                key,
                resource_keys: resource_keys.to_vec(),
                created_at: Utc::now(),
            },
        );
        Ok(())
    }

    /// Settle an operation. The entry is removed and every resource key it
    /// held frees up, whether it confirmed or rolled back.
    pub fn complete(&self, key: &IdempotencyKey, outcome: PendingOutcome) {
        if self.entries().remove(key).is_some() {
            debug!(%key, ?outcome, "pending operation settled");
        }
    }

    pub fn is_resource_busy(&self, resource_key: &str) -> bool {
        self.entries()
            .values()
            .any(|e| e.resource_keys.iter().any(|k| k == resource_key))
    }

    pub fn get(&self, key: &IdempotencyKey) -> Option<PendingOperation> {
        self.entries().get(key).cloned()
    }

    pub fn pending_count(&self) -> usize {
        self.entries().len()
    }
}
