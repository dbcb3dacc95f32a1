//! Anti-replay nonce issuance and redemption.
//!
//! The outstanding-nonce set is the only shared mutable state in the
//! gateway. It is owned exclusively by [`NonceStore`], which exposes only
//! atomic issue/redeem operations; the underlying collection is never
//! handed out.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use rand::rngs::OsRng;

use crate::error::{AcmeError, AcmeResult};

/// Raw entropy per nonce before base64url encoding.
const NONCE_BYTES: usize = 16;

/// Issuances between amortized expiry sweeps.
const SWEEP_EVERY: u64 = 4096;

struct Outstanding {
    issued: HashMap<String, Instant>,
    since_sweep: u64,
}

/// Issues unpredictable single-use nonces and guarantees at-most-once
/// redemption under concurrent access.
///
/// Redemption is a single locked check-and-remove: two simultaneous
/// attempts for the same value yield exactly one success. Expired entries
/// redeem as failures, indistinguishable from unknown values, and are
/// evicted lazily on redemption plus in an amortized sweep during
/// issuance so the set cannot grow without bound.
pub struct NonceStore {
    ttl: Duration,
    inner: Mutex<Outstanding>,
}

impl NonceStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Mutex::new(Outstanding {
                issued: HashMap::new(),
                since_sweep: 0,
            }),
        }
    }

    /// Issue a fresh nonce and record it as outstanding.
    ///
    /// Values are drawn from the OS random source and carry no observable
    /// correlation to previously issued values. Fails only if that source
    /// is unavailable, which is fatal and non-retryable.
    pub fn issue(&self) -> AcmeResult<String> {
        let now = Instant::now();
        let mut guard = self.lock();

        guard.since_sweep += 1;
        if guard.since_sweep >= SWEEP_EVERY {
            guard.since_sweep = 0;
            let ttl = self.ttl;
            guard.issued.retain(|_, issued_at| now.duration_since(*issued_at) <= ttl);
        }

        loop {
            let mut bytes = [0_u8; NONCE_BYTES];
            OsRng.try_fill_bytes(&mut bytes).map_err(|err| {
                AcmeError::ServerInternal(format!("system random source unavailable: {err}"))
            })?;
            let value = URL_SAFE_NO_PAD.encode(bytes);

            // Collision among outstanding values is vanishingly rare;
            // regenerate rather than hand out a duplicate.
            if !guard.issued.contains_key(&value) {
                guard.issued.insert(value.clone(), now);
                return Ok(value);
            }
        }
    }

    /// Atomically redeem a nonce.
    ///
    /// Returns `true` exactly once per outstanding value. Unknown, already
    /// redeemed, and expired values all return `false` with no side
    /// effect beyond dropping an expired entry.
    pub fn redeem(&self, value: &str) -> bool {
        let now = Instant::now();
        let mut guard = self.lock();

        match guard.issued.remove(value) {
            Some(issued_at) => now.duration_since(issued_at) <= self.ttl,
            None => false,
        }
    }

    /// Evict expired entries; returns how many were removed. Suitable for
    /// a periodic background task in addition to the amortized sweep.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let ttl = self.ttl;
        let mut guard = self.lock();

        let before = guard.issued.len();
        guard.issued.retain(|_, issued_at| now.duration_since(*issued_at) <= ttl);
        before - guard.issued.len()
    }

    /// Number of currently outstanding nonces.
    pub fn outstanding(&self) -> usize {
        self.lock().issued.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Outstanding> {
        // None of the operations under the lock can panic, so a poisoned
        // mutex still holds a consistent map.
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
