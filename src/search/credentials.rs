// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Credential pool with rotation and cooldowns
//!
//! Owns the API keys used against the image search provider. Keys are handed
//! out as [`CredentialLease`]s and only ever leave this module in redacted
//! form (first four characters) for logging and status reporting.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Number of secret characters shown in redacted form
const REDACTED_PREFIX_LEN: usize = 4;

/// Availability of a single credential
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialStatus {
    Available,
    /// Failed recently, usable again once the cooldown elapses
    Cooling,
    /// Rejected as invalid by the provider; only `reset_all` revives it
    Exhausted,
}

/// Why a request with a credential failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Quota, rate limit, authorization or unclassifiable failure
    Quota,
    /// Network-level failure; does not change credential status
    Transient,
    /// Provider reported the key itself as invalid
    Revoked,
}

/// Aggregate pool health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolHealth {
    Healthy,
    Warning,
    Critical,
}

/// Health snapshot of the pool, the only view of credentials exposed outside
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStatus {
    pub total_credentials: usize,
    pub available_credentials: usize,
    pub unavailable_credentials: usize,
    pub health: PoolHealth,
    pub total_usage: u64,
    /// Seconds since the most recent failure anywhere in the pool
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure_age_secs: Option<u64>,
    /// Redacted prefix of the credential the next request will use
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_credential_hint: Option<String>,
}

struct SearchCredential {
    id: String,
    secret: String,
    status: CredentialStatus,
    usage_count: u64,
    last_failure_at: Option<DateTime<Utc>>,
    cooldown: Duration,
}

impl SearchCredential {
    fn redacted(&self) -> String {
        redact(&self.secret)
    }
}

/// A credential checked out for one provider call
#[derive(Clone)]
pub struct CredentialLease {
    id: String,
    secret: String,
}

impl CredentialLease {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The raw key, for building the provider request only
    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn redacted(&self) -> String {
        redact(&self.secret)
    }
}

impl fmt::Debug for CredentialLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialLease")
            .field("id", &self.id)
            .field("secret", &self.redacted())
            .finish()
    }
}

fn redact(secret: &str) -> String {
    let prefix: String = secret.chars().take(REDACTED_PREFIX_LEN).collect();
    format!("{prefix}…")
}

struct PoolState {
    credentials: Vec<SearchCredential>,
    cursor: usize,
    last_failure_at: Option<DateTime<Utc>>,
}

impl PoolState {
    fn reconcile(&mut self, now: DateTime<Utc>) -> usize {
        let mut revived = 0;
        for credential in &mut self.credentials {
            if credential.status != CredentialStatus::Cooling {
                continue;
            }
            let cooled = credential
                .last_failure_at
                .map_or(true, |failed_at| now - failed_at >= credential.cooldown);
            if cooled {
                credential.status = CredentialStatus::Available;
                revived += 1;
            }
        }
        revived
    }

    /// Index of the first Available credential at or after the cursor
    fn next_available(&self) -> Option<usize> {
        let len = self.credentials.len();
        (0..len)
            .map(|offset| (self.cursor + offset) % len)
            .find(|&i| self.credentials[i].status == CredentialStatus::Available)
    }

    fn find_mut(&mut self, id: &str) -> Option<&mut SearchCredential> {
        self.credentials.iter_mut().find(|c| c.id == id)
    }
}

/// Pool of interchangeable search credentials shared by all sessions
///
/// Every method takes the internal lock once, so each operation is an atomic
/// read-modify-write on the shared state.
pub struct CredentialPool {
    state: Mutex<PoolState>,
}

impl CredentialPool {
    /// Create a pool from raw keys; blank keys are skipped
    ///
    /// # Arguments
    /// * `secrets` - API keys in rotation order
    /// * `cooldown` - How long a failed key stays out of rotation
    pub fn new<I, S>(secrets: I, cooldown: std::time::Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let cooldown = Duration::from_std(cooldown).unwrap_or_else(|_| Duration::days(365));
        let credentials: Vec<SearchCredential> = secrets
            .into_iter()
            .map(|s| -> String { s.into() })
            .filter(|s| !s.trim().is_empty())
            .enumerate()
            .map(|(i, secret)| SearchCredential {
                id: format!("key-{}", i + 1),
                secret: secret.trim().to_string(),
                status: CredentialStatus::Available,
                usage_count: 0,
                last_failure_at: None,
                cooldown,
            })
            .collect();

        info!("Credential pool created with {} key(s)", credentials.len());

        Self {
            state: Mutex::new(PoolState {
                credentials,
                cursor: 0,
                last_failure_at: None,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check out the next Available credential, or None if the pool is exhausted
    pub fn acquire(&self) -> Option<CredentialLease> {
        self.acquire_at(Utc::now())
    }

    pub fn acquire_at(&self, now: DateTime<Utc>) -> Option<CredentialLease> {
        let mut state = self.lock();
        state.reconcile(now);

        let index = match state.next_available() {
            Some(i) => i,
            None => {
                debug!("No available credential in pool");
                return None;
            }
        };
        state.cursor = index;

        let credential = &state.credentials[index];
        debug!(
            "Acquired credential {} ({})",
            credential.id,
            credential.redacted()
        );
        Some(CredentialLease {
            id: credential.id.clone(),
            secret: credential.secret.clone(),
        })
    }

    /// Record a failed provider call made with `lease`
    pub fn report_failure(&self, lease: &CredentialLease, kind: FailureKind) {
        self.report_failure_at(lease, kind, Utc::now());
    }

    pub fn report_failure_at(&self, lease: &CredentialLease, kind: FailureKind, now: DateTime<Utc>) {
        if kind == FailureKind::Transient {
            debug!("Transient failure on {}, status unchanged", lease.id);
            return;
        }

        let mut state = self.lock();
        let Some(credential) = state.find_mut(&lease.id) else {
            return;
        };
        // Already out of rotation: a second report from a concurrent request is a no-op
        if credential.status != CredentialStatus::Available {
            return;
        }

        credential.status = match kind {
            FailureKind::Revoked => CredentialStatus::Exhausted,
            _ => CredentialStatus::Cooling,
        };
        credential.last_failure_at = Some(now);
        warn!(
            "Credential {} ({}) marked {:?} after {:?} failure",
            credential.id,
            credential.redacted(),
            credential.status,
            kind
        );

        state.last_failure_at = Some(now);
        let len = state.credentials.len();
        if let Some(pos) = state.credentials.iter().position(|c| c.id == lease.id) {
            if state.cursor == pos {
                state.cursor = (pos + 1) % len;
            }
        }
    }

    /// Record a successful provider call made with `lease`
    pub fn report_success(&self, lease: &CredentialLease) {
        let mut state = self.lock();
        if let Some(credential) = state.find_mut(&lease.id) {
            credential.usage_count += 1;
        }
    }

    /// Return cooled-down credentials to rotation; returns how many were revived
    pub fn reconcile(&self, now: DateTime<Utc>) -> usize {
        let revived = self.lock().reconcile(now);
        if revived > 0 {
            info!("{} credential(s) returned from cooldown", revived);
        }
        revived
    }

    /// Force every credential back to Available and clear usage counters
    pub fn reset_all(&self) -> PoolStatus {
        {
            let mut state = self.lock();
            for credential in &mut state.credentials {
                credential.status = CredentialStatus::Available;
                credential.usage_count = 0;
                credential.last_failure_at = None;
            }
            state.cursor = 0;
            state.last_failure_at = None;
        }
        info!("Credential pool reset");
        self.status()
    }

    /// Aggregate health snapshot
    pub fn status(&self) -> PoolStatus {
        self.status_at(Utc::now())
    }

    pub fn status_at(&self, now: DateTime<Utc>) -> PoolStatus {
        let mut state = self.lock();
        state.reconcile(now);

        let total = state.credentials.len();
        let available = state
            .credentials
            .iter()
            .filter(|c| c.status == CredentialStatus::Available)
            .count();
        let total_usage = state.credentials.iter().map(|c| c.usage_count).sum();
        let last_failure_age_secs = state
            .last_failure_at
            .map(|t| (now - t).num_seconds().max(0) as u64);
        let next_credential_hint = state
            .next_available()
            .map(|i| state.credentials[i].redacted());

        PoolStatus {
            total_credentials: total,
            available_credentials: available,
            unavailable_credentials: total - available,
            health: classify_health(available, total),
            total_usage,
            last_failure_age_secs,
            next_credential_hint,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PoolState> {
        // Each update is complete before any call that could panic
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn classify_health(available: usize, total: usize) -> PoolHealth {
    if available == 0 {
        PoolHealth::Critical
    } else if available * 2 > total {
        PoolHealth::Healthy
    } else {
        PoolHealth::Warning
    }
}
