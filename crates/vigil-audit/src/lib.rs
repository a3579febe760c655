// SPDX-License-Identifier: MIT

//! The conservation audit: proves that the value committed across the live,
//! locked and spent partitions of the unspent hash set adds up, without ever
//! stopping the shard that owns those maps.
//!
//! The engine freezes a snapshot of all three maps up front and sums value
//! commitments only from that frozen view, so concurrent UHS mutation can
//! neither tear the read nor double-count an element. Snapshots are plain
//! RAII values and are released on every exit path.

use log::warn;
use vigil_common::encode_hex;
use vigil_common::Hash;
use vigil_common::SnapshotMap;
use vigil_transaction::calculate_uhs_id;
use vigil_transaction::proof::check_range;
use vigil_transaction::proof::sum_commitments;
use vigil_transaction::proof::Commitment;
use vigil_transaction::CompactOutput;

/// One UHS element as the auditor sees it: the compact output plus the epoch
/// bounds of its lifetime.
///
/// When `deletion_epoch` is set it is strictly greater than
/// `creation_epoch`; an element cannot die before it exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UhsElement {
    /// The output this element carries
    pub out: CompactOutput,

    /// The epoch in which the element was created
    pub creation_epoch: u64,

    /// The epoch in which the element was deleted, if it has been
    pub deletion_epoch: Option<u64>,
}

impl UhsElement {
    /// Whether this element exists as of `epoch`
    pub fn is_live(&self, epoch: u64) -> bool {
        self.creation_epoch <= epoch
            && self.deletion_epoch.map_or(true, |deleted| deleted > epoch)
    }
}

/// The three UHS partitions the audit walks
pub type UhsMap = SnapshotMap<Hash, UhsElement>;

/// Sums the value commitments of every element live at `epoch` across the
/// three partitions.
///
/// Returns `None` if any element fails either integrity check: its UHS id
/// must be recomputable from its output, and its range proof must verify.
/// The result is deterministic for a given snapshot content; iteration order
/// is irrelevant because commitment addition is commutative.
pub fn audit(uhs: &UhsMap, locked: &UhsMap, spent: &UhsMap, epoch: u64) -> Option<Commitment> {
    let snapshots = [uhs.snapshot(), locked.snapshot(), spent.snapshot()];

    let mut commitments: Vec<Commitment> = Vec::new();
    for snapshot in &snapshots {
        for (id, element) in snapshot.iter() {
            if !element.is_live(epoch) {
                continue;
            }

            if calculate_uhs_id(&element.out) != *id {
                warn!("audit failed: element {} does not match its uhs id", encode_hex(id));
                return None;
            }
            if check_range(&element.out.value_commitment, &element.out.range).is_err() {
                warn!("audit failed: element {} carries an invalid range proof", encode_hex(id));
                return None;
            }

            commitments.push(element.out.value_commitment);
        }
    }

    sum_commitments(&commitments)
}
