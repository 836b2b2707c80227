//! OpenTimestamps Client
//!
//! Submits nonce-blinded digests to public calendar servers and polls
//! them for Bitcoin attestations. Calendars are contacted in parallel
//! with an all-settled policy: every request runs to completion, one
//! slow or failing calendar never blocks or aborts the others.
//!
//! Receipt lifecycle: a submission with at least one accepting calendar
//! persists an `ots_pending` receipt; an upgrade poll that finds a
//! Bitcoin attestation persists an `ots_confirmed` receipt, which is
//! terminal. A submission no calendar accepted is not persisted and is
//! retried by resubmitting with a fresh nonce.

use std::time::Duration;

use futures::future::join_all;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::{ForgeError, Result};
use crate::hash::is_hex_digest;
use crate::ots::proto::contains_bitcoin_attestation;
use crate::ots::{
    BitcoinAttestation, CalendarSubmission, OtsConfirmedReceipt, OtsPendingReceipt,
    SubmissionStatus,
};
use crate::store::Store;
use crate::witness::WitnessReceipt;

/// Default public calendar pool.
pub const DEFAULT_CALENDARS: [&str; 3] = [
    "http://a.pool.opentimestamps.org",
    "http://b.pool.opentimestamps.org",
    "http://a.pool.eternitywall.com",
];

const CALENDAR_TIMEOUT: Duration = Duration::from_secs(10);
const OTS_ACCEPT: &str = "application/vnd.opentimestamps.v1";
const USER_AGENT: &str = concat!("forge/", env!("CARGO_PKG_VERSION"));

/// Outcome of an upgrade poll.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UpgradeOutcome {
    /// No pending receipt exists for the root.
    NoPending,
    /// Calendars answered but none carried a Bitcoin attestation yet.
    Pending { checked: usize, errors: usize },
    /// At least one calendar returned a Bitcoin attestation.
    Confirmed { new_level: u8, attestations: usize },
}

pub struct OtsClient {
    calendars: Vec<String>,
    http: reqwest::Client,
}

impl OtsClient {
    pub fn new(calendars: Vec<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(CALENDAR_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ForgeError::Calendar(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { calendars, http })
    }

    pub fn with_default_calendars() -> Result<Self> {
        Self::new(DEFAULT_CALENDARS.iter().map(|c| c.to_string()).collect())
    }

    pub fn calendars(&self) -> &[String] {
        &self.calendars
    }

    /// Submit `hash_hex` to every calendar.
    ///
    /// The calendars never see the hash itself, only
    /// `SHA256(nonce || hash_bytes)`; the nonce stays in the receipt.
    /// The receipt is persisted under the hash when at least one
    /// calendar accepted the digest.
    pub async fn submit<S: Store>(&self, store: &mut S, hash_hex: &str) -> Result<OtsPendingReceipt> {
        if !is_hex_digest(hash_hex) {
            return Err(ForgeError::InvalidHash(format!(
                "expected 64 hex characters, got {:?}",
                hash_hex
            )));
        }
        let hash_bytes =
            hex::decode(hash_hex).map_err(|e| ForgeError::InvalidHash(e.to_string()))?;

        let nonce: [u8; 16] = rand::random();
        let mut hasher = Sha256::new();
        hasher.update(nonce);
        hasher.update(&hash_bytes);
        let digest = hasher.finalize().to_vec();

        info!(
            "submitting blinded digest {} to {} calendars",
            hex::encode(&digest),
            self.calendars.len()
        );

        let requests = self
            .calendars
            .iter()
            .map(|calendar| self.submit_digest(calendar, &digest));
        let calendars = join_all(requests).await;

        let successful = calendars
            .iter()
            .filter(|c| c.status == SubmissionStatus::Submitted)
            .count();

        let receipt = OtsPendingReceipt {
            original_hash: hash_hex.to_string(),
            nonce: hex::encode(nonce),
            digest: hex::encode(&digest),
            calendars,
            successful_submissions: successful,
            total_calendars: self.calendars.len(),
            created_at: chrono::Utc::now().timestamp_millis(),
        };

        if successful > 0 {
            store.save_witness(hash_hex, &WitnessReceipt::OtsPending(receipt.clone()))?;
            info!(
                "{}/{} calendars accepted the digest",
                successful, receipt.total_calendars
            );
        } else {
            warn!("no calendar accepted the digest; receipt not persisted");
        }

        Ok(receipt)
    }

    /// POST the raw digest bytes to one calendar. Failures are captured
    /// in the returned record, never propagated.
    async fn submit_digest(&self, calendar: &str, digest: &[u8]) -> CalendarSubmission {
        let url = format!("{}/digest", calendar);
        let submitted_at = chrono::Utc::now().timestamp_millis();

        let error = |message: String| CalendarSubmission {
            calendar: calendar.to_string(),
            status: SubmissionStatus::Error,
            response_hex: None,
            response_length: None,
            error: Some(message),
            submitted_at,
        };

        let response = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(ACCEPT, OTS_ACCEPT)
            .body(digest.to_vec())
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => match resp.bytes().await {
                Ok(body) => {
                    debug!("{} accepted digest ({} byte response)", calendar, body.len());
                    CalendarSubmission {
                        calendar: calendar.to_string(),
                        status: SubmissionStatus::Submitted,
                        response_hex: Some(hex::encode(&body)),
                        response_length: Some(body.len()),
                        error: None,
                        submitted_at,
                    }
                }
                Err(e) => error(format!("failed to read response body: {}", e)),
            },
            Ok(resp) => error(format!("calendar returned {}", resp.status())),
            Err(e) => error(e.to_string()),
        }
    }

    /// Poll the calendars that accepted the most recent pending receipt
    /// for `root`. Any response carrying a Bitcoin attestation upgrades
    /// the root to anchored.
    pub async fn check_upgrade<S: Store>(&self, store: &mut S, root: &str) -> Result<UpgradeOutcome> {
        let receipts = store.load_witnesses(root)?;
        let pending = receipts
            .iter()
            .filter_map(|r| match r {
                WitnessReceipt::OtsPending(p) => Some(p),
                _ => None,
            })
            .max_by_key(|p| p.created_at);

        let pending = match pending {
            Some(p) => p,
            None => {
                debug!("no pending OTS receipt for {}", root);
                return Ok(UpgradeOutcome::NoPending);
            }
        };

        let submitted: Vec<&CalendarSubmission> = pending
            .calendars
            .iter()
            .filter(|c| c.status == SubmissionStatus::Submitted)
            .collect();

        info!(
            "checking {} calendars for an attestation of {}",
            submitted.len(),
            pending.digest
        );

        let requests = submitted
            .iter()
            .map(|c| self.fetch_timestamp(&c.calendar, &pending.digest));
        let outcomes = join_all(requests).await;

        let confirmed_at = chrono::Utc::now().timestamp_millis();
        let mut attestations = Vec::new();
        let mut errors = 0;

        for (submission, outcome) in submitted.iter().zip(outcomes) {
            match outcome {
                Ok(Some(proof_bytes)) => {
                    info!("{} returned a Bitcoin attestation", submission.calendar);
                    attestations.push(BitcoinAttestation {
                        calendar: submission.calendar.clone(),
                        proof_hex: hex::encode(&proof_bytes),
                        confirmed_at,
                    });
                }
                Ok(None) => debug!("{} has no Bitcoin attestation yet", submission.calendar),
                Err(e) => {
                    warn!("{} upgrade check failed: {}", submission.calendar, e);
                    errors += 1;
                }
            }
        }

        if attestations.is_empty() {
            return Ok(UpgradeOutcome::Pending {
                checked: submitted.len(),
                errors,
            });
        }

        let confirmed = OtsConfirmedReceipt {
            original_hash: pending.original_hash.clone(),
            bitcoin_attestations: attestations,
            confirmed_at,
        };
        let count = confirmed.bitcoin_attestations.len();
        store.save_witness(root, &WitnessReceipt::OtsConfirmed(confirmed))?;

        Ok(UpgradeOutcome::Confirmed {
            new_level: 4,
            attestations: count,
        })
    }

    /// GET one calendar's proof for the digest. `Ok(Some(bytes))` when
    /// the proof carries a Bitcoin attestation, `Ok(None)` when still
    /// pending.
    async fn fetch_timestamp(
        &self,
        calendar: &str,
        digest_hex: &str,
    ) -> std::result::Result<Option<Vec<u8>>, String> {
        let url = format!("{}/timestamp/{}", calendar, digest_hex);

        let resp = self
            .http
            .get(&url)
            .header(ACCEPT, OTS_ACCEPT)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !resp.status().is_success() {
            return Err(format!("calendar returned {}", resp.status()));
        }

        let body = resp.bytes().await.map_err(|e| e.to_string())?;
        if contains_bitcoin_attestation(&body) {
            Ok(Some(body.to_vec()))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash;
    use crate::store::MemoryStore;
    use crate::witness::witness_level;

    #[tokio::test]
    async fn test_submit_rejects_malformed_hash() {
        let client = OtsClient::with_default_calendars().unwrap();
        let mut store = MemoryStore::new();

        let err = client.submit(&mut store, "not a hash").await.unwrap_err();
        assert!(matches!(err, ForgeError::InvalidHash(_)));

        let short = &hash("x")[..32];
        let err = client.submit(&mut store, short).await.unwrap_err();
        assert!(matches!(err, ForgeError::InvalidHash(_)));
    }

    #[tokio::test]
    async fn test_failed_submission_not_persisted() {
        // Port 1 on loopback refuses instantly; every calendar errors.
        let client = OtsClient::new(vec!["http://127.0.0.1:1".to_string()]).unwrap();
        let mut store = MemoryStore::new();
        let root = hash("a root");

        let receipt = client.submit(&mut store, &root).await.unwrap();
        assert_eq!(receipt.successful_submissions, 0);
        assert_eq!(receipt.total_calendars, 1);
        assert_eq!(receipt.calendars[0].status, SubmissionStatus::Error);
        assert!(receipt.calendars[0].error.is_some());

        assert!(store.load_witnesses(&root).unwrap().is_empty());
        assert_eq!(witness_level(&store, &root).unwrap().level, 1);
    }

    #[tokio::test]
    async fn test_digest_blinds_original_hash() {
        let client = OtsClient::new(vec!["http://127.0.0.1:1".to_string()]).unwrap();
        let mut store = MemoryStore::new();
        let root = hash("a root");

        let receipt = client.submit(&mut store, &root).await.unwrap();

        // digest == SHA256(nonce || root bytes), and differs from the root.
        let nonce = hex::decode(&receipt.nonce).unwrap();
        assert_eq!(nonce.len(), 16);
        let mut hasher = Sha256::new();
        hasher.update(&nonce);
        hasher.update(hex::decode(&root).unwrap());
        assert_eq!(receipt.digest, hex::encode(hasher.finalize()));
        assert_ne!(receipt.digest, root);
    }

    #[tokio::test]
    async fn test_resubmission_uses_fresh_nonce() {
        let client = OtsClient::new(vec!["http://127.0.0.1:1".to_string()]).unwrap();
        let mut store = MemoryStore::new();
        let root = hash("a root");

        let first = client.submit(&mut store, &root).await.unwrap();
        let second = client.submit(&mut store, &root).await.unwrap();
        assert_ne!(first.nonce, second.nonce);
        assert_ne!(first.digest, second.digest);
    }

    #[tokio::test]
    async fn test_upgrade_without_pending_receipt() {
        let client = OtsClient::with_default_calendars().unwrap();
        let mut store = MemoryStore::new();

        let outcome = client.check_upgrade(&mut store, &hash("a root")).await.unwrap();
        assert!(matches!(outcome, UpgradeOutcome::NoPending));
    }

    #[tokio::test]
    async fn test_upgrade_with_unreachable_calendars_stays_pending() {
        let client = OtsClient::new(vec!["http://127.0.0.1:1".to_string()]).unwrap();
        let mut store = MemoryStore::new();
        let root = hash("a root");

        // Seed a pending receipt whose calendar claims a submission.
        let receipt = OtsPendingReceipt {
            original_hash: root.clone(),
            nonce: hex::encode([7u8; 16]),
            digest: hash("digest"),
            calendars: vec![CalendarSubmission {
                calendar: "http://127.0.0.1:1".to_string(),
                status: SubmissionStatus::Submitted,
                response_hex: None,
                response_length: None,
                error: None,
                submitted_at: 0,
            }],
            successful_submissions: 1,
            total_calendars: 1,
            created_at: 0,
        };
        store
            .save_witness(&root, &WitnessReceipt::OtsPending(receipt))
            .unwrap();

        let outcome = client.check_upgrade(&mut store, &root).await.unwrap();
        match outcome {
            UpgradeOutcome::Pending { checked, errors } => {
                assert_eq!(checked, 1);
                assert_eq!(errors, 1);
            }
            other => panic!("expected pending, got {:?}", other),
        }

        // Still level 3 (public), no confirmed receipt was written.
        assert_eq!(witness_level(&store, &root).unwrap().level, 3);
    }
}
