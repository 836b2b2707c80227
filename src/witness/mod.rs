//! Witness Hierarchy
//!
//! Four trust levels for a sealed Merkle root, from "only this chain
//! vouches for it" up to "a Bitcoin attestation binds it". Receipts are
//! persisted per root; the effective level is the maximum across them.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::hash::hash;
use crate::ots::{OtsConfirmedReceipt, OtsPendingReceipt};
use crate::store::Store;

/// Trust level of a Merkle root, ranked `self < bilateral < public < anchored`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WitnessLevel {
    SelfAttested,
    Bilateral,
    Public,
    Anchored,
}

impl WitnessLevel {
    pub fn rank(self) -> u8 {
        match self {
            Self::SelfAttested => 1,
            Self::Bilateral => 2,
            Self::Public => 3,
            Self::Anchored => 4,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::SelfAttested => "self",
            Self::Bilateral => "bilateral",
            Self::Public => "public",
            Self::Anchored => "anchored",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::SelfAttested => "Only this chain vouches for the root",
            Self::Bilateral => "A counterparty holds a matching receipt for the root",
            Self::Public => "The root was submitted to public timestamp calendars",
            Self::Anchored => "A Bitcoin attestation binds the root to the blockchain",
        }
    }
}

/// Receipt exchanged with a named counterparty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BilateralReceipt {
    pub merkle_root: String,
    pub counterparty: String,
    pub created_at: i64,
    pub receipt_hash: String,
}

/// A persisted piece of evidence for one Merkle root.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WitnessReceipt {
    Bilateral(BilateralReceipt),
    OtsPending(OtsPendingReceipt),
    OtsConfirmed(OtsConfirmedReceipt),
}

impl WitnessReceipt {
    pub fn level(&self) -> WitnessLevel {
        match self {
            Self::Bilateral(_) => WitnessLevel::Bilateral,
            Self::OtsPending(_) => WitnessLevel::Public,
            Self::OtsConfirmed(_) => WitnessLevel::Anchored,
        }
    }

    pub fn created_at(&self) -> i64 {
        match self {
            Self::Bilateral(r) => r.created_at,
            Self::OtsPending(r) => r.created_at,
            Self::OtsConfirmed(r) => r.confirmed_at,
        }
    }

    /// One-line view for summaries.
    pub fn compact(&self) -> String {
        match self {
            Self::Bilateral(r) => format!("bilateral with {} at {}", r.counterparty, r.created_at),
            Self::OtsPending(r) => format!(
                "ots pending, {}/{} calendars accepted at {}",
                r.successful_submissions, r.total_calendars, r.created_at
            ),
            Self::OtsConfirmed(r) => format!(
                "ots confirmed by {} calendar(s) at {}",
                r.bitcoin_attestations.len(),
                r.confirmed_at
            ),
        }
    }
}

/// Effective trust level of a root with the receipt that establishes it.
#[derive(Debug, Clone, Serialize)]
pub struct WitnessStatus {
    pub level: u8,
    pub label: &'static str,
    pub description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub witness: Option<WitnessReceipt>,
}

/// Level, receipt views, and the actions that would raise the level.
#[derive(Debug, Clone, Serialize)]
pub struct WitnessSummary {
    pub merkle_root: String,
    pub level: u8,
    pub label: &'static str,
    pub witness_count: usize,
    pub witnesses: Vec<String>,
    pub upgrade_path: Vec<String>,
}

/// Max level across the stored receipts, defaulting to `self`.
///
/// Adding a receipt can only preserve or raise the reported level.
pub fn witness_level<S: Store>(store: &S, root: &str) -> Result<WitnessStatus> {
    let receipts = store.load_witnesses(root)?;

    let best = receipts
        .into_iter()
        .max_by_key(|r| (r.level(), r.created_at()));

    let level = best
        .as_ref()
        .map(|r| r.level())
        .unwrap_or(WitnessLevel::SelfAttested);

    Ok(WitnessStatus {
        level: level.rank(),
        label: level.label(),
        description: level.description(),
        witness: best,
    })
}

/// Summarise a root's receipts and list every action that would reach
/// a strictly higher level.
pub fn witness_summary<S: Store>(store: &S, root: &str) -> Result<WitnessSummary> {
    let receipts = store.load_witnesses(root)?;
    let level = receipts
        .iter()
        .map(|r| r.level())
        .max()
        .unwrap_or(WitnessLevel::SelfAttested);

    let mut upgrade_path = Vec::new();
    if level < WitnessLevel::Bilateral {
        upgrade_path
            .push("bilateral: exchange receipts with a counterparty (witness --bilateral <id>)".to_string());
    }
    if level < WitnessLevel::Public {
        upgrade_path.push("public: submit the root to OpenTimestamps calendars (anchor)".to_string());
    }
    if level < WitnessLevel::Anchored {
        upgrade_path
            .push("anchored: poll calendars for a Bitcoin attestation (anchor --upgrade)".to_string());
    }

    Ok(WitnessSummary {
        merkle_root: root.to_string(),
        level: level.rank(),
        label: level.label(),
        witness_count: receipts.len(),
        witnesses: receipts.iter().map(WitnessReceipt::compact).collect(),
        upgrade_path,
    })
}

/// Create and persist a bilateral receipt for `root`.
pub fn create_bilateral_witness<S: Store>(
    store: &mut S,
    root: &str,
    counterparty: &str,
) -> Result<BilateralReceipt> {
    let created_at = chrono::Utc::now().timestamp_millis();
    let receipt_hash = hash(&format!(
        "bilateral:{}:{}:{}",
        root, counterparty, created_at
    ));

    let receipt = BilateralReceipt {
        merkle_root: root.to_string(),
        counterparty: counterparty.to_string(),
        created_at,
        receipt_hash,
    };

    store.save_witness(root, &WitnessReceipt::Bilateral(receipt.clone()))?;
    info!("bilateral witness for {} recorded with {}", root, counterparty);

    Ok(receipt)
}
