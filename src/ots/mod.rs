//! OpenTimestamps Integration
//!
//! Escalates a Merkle root from locally-witnessed to publicly-attested
//! to Bitcoin-anchored by submitting a blinded digest to public
//! calendar servers and polling them for a block-header attestation.

pub mod client;
pub mod proto;

pub use client::{OtsClient, UpgradeOutcome, DEFAULT_CALENDARS};

use serde::{Deserialize, Serialize};

/// Outcome of one calendar submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Submitted,
    Error,
}

/// Per-calendar submission record. A failed calendar is captured here
/// and never aborts the fan-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarSubmission {
    pub calendar: String,
    pub status: SubmissionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_hex: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub submitted_at: i64,
}

/// Receipt for a digest submitted to calendars and awaiting a Bitcoin
/// attestation.
///
/// Calendars only ever see `digest = SHA256(nonce || original_hash)`;
/// losing the nonce loses the ability to tie an attestation back to
/// the original hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtsPendingReceipt {
    pub original_hash: String,
    /// 16 random bytes, hex encoded.
    pub nonce: String,
    /// `SHA256(nonce || original_hash_bytes)`, hex encoded.
    pub digest: String,
    pub calendars: Vec<CalendarSubmission>,
    pub successful_submissions: usize,
    pub total_calendars: usize,
    pub created_at: i64,
}

/// One calendar's Bitcoin block-header attestation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BitcoinAttestation {
    pub calendar: String,
    pub proof_hex: String,
    pub confirmed_at: i64,
}

/// Receipt recording that at least one calendar returned a proof
/// carrying a Bitcoin attestation for the digest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtsConfirmedReceipt {
    pub original_hash: String,
    pub bitcoin_attestations: Vec<BitcoinAttestation>,
    pub confirmed_at: i64,
}
