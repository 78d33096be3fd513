// Per-channel peer daemon implementing the BOLT wire protocol state machine
// for a single Lightning Network payment channel.
//
// Written in 2022 by
//     Dr. Maxim Orlovsky <orlovsky@pandoracore.com>
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.
//
// You should have received a copy of the MIT License
// along with this software.
// If not, see <https://opensource.org/licenses/MIT>.

use secp256k1::PublicKey;

/// What to do about our outstanding `revoke_and_ack` on reconnect (§4.4,
/// decision table keyed on the peer's `next_remote_revocation_number`).
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
pub enum RevokeAction {
    /// Peer is one revocation behind; resend `revoke_and_ack`.
    #[display("retransmit-revoke")]
    Retransmit,
    /// Peer has already seen our last revoke_and_ack.
    #[display("no-retransmit")]
    None,
    /// Peer claims to be ahead and proved it with a valid data-loss-protect
    /// secret; we have fallen behind and must not broadcast our commitment.
    #[display("fallen-behind")]
    FallenBehind,
}

/// What to do about our outstanding `commitment_signed` on reconnect (§4.4,
/// decision table keyed on the peer's `next_local_commitment_number`).
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
pub enum CommitAction {
    /// Peer missed our last commitment_signed; resend it (and the updates
    /// that preceded it).
    #[display("retransmit-commit")]
    Retransmit,
    /// Peer has already seen our last commitment_signed.
    #[display("no-retransmit")]
    None,
}

/// A reestablish exchange that cannot be reconciled with our local state;
/// always fatal to the channel (§7, peer protocol violation).
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display, Error)]
pub enum ReestablishError {
    /// peer's next_remote_revocation_number {peer_claim} is inconsistent
    /// with our revocations_received {revocations_received} and
    /// next_index[LOCAL] {next_index_local}
    BadRevocationNumber {
        peer_claim: u64,
        revocations_received: u64,
        next_index_local: u64,
    },

    /// peer's next_local_commitment_number {peer_claim} is inconsistent
    /// with our next_index[REMOTE] {next_index_remote}
    BadCommitmentNumber { peer_claim: u64, next_index_remote: u64 },

    /// peer claims to be ahead of us but the supplied per-commitment secret
    /// does not check out against the signer
    InvalidDataLossProof,

    /// peer's claimed current per-commitment point does not match our
    /// recorded remote per-commitment point
    CurrentPointMismatch,
}

/// Decides what to do with our revoke side given the peer's
/// `next_remote_revocation_number` claim (§4.4 table 1).
///
/// `data_loss_protect_checks_out` must already reflect a signer-verified
/// secret; this function only applies the decision table.
pub fn decide_revoke_action(
    peer_next_remote_revocation_number: u64,
    next_index_local: u64,
    revocations_received: u64,
    data_loss_protect_checks_out: bool,
) -> Result<RevokeAction, ReestablishError> {
    if peer_next_remote_revocation_number == next_index_local.saturating_sub(2)
    {
        Ok(RevokeAction::Retransmit)
    } else if peer_next_remote_revocation_number
        == next_index_local.saturating_sub(1)
    {
        Ok(RevokeAction::None)
    } else if peer_next_remote_revocation_number
        > next_index_local.saturating_sub(1)
        && data_loss_protect_checks_out
    {
        Ok(RevokeAction::FallenBehind)
    } else {
        Err(ReestablishError::BadRevocationNumber {
            peer_claim: peer_next_remote_revocation_number,
            revocations_received,
            next_index_local,
        })
    }
}

/// Decides what to do with our commit side given the peer's
/// `next_local_commitment_number` claim (§4.4 table 2).
pub fn decide_commit_action(
    peer_next_local_commitment_number: u64,
    next_index_remote: u64,
) -> Result<CommitAction, ReestablishError> {
    if peer_next_local_commitment_number > 0
        && peer_next_local_commitment_number
            == next_index_remote.saturating_sub(1)
    {
        Ok(CommitAction::Retransmit)
    } else if peer_next_local_commitment_number == next_index_remote {
        Ok(CommitAction::None)
    } else {
        Err(ReestablishError::BadCommitmentNumber {
            peer_claim: peer_next_local_commitment_number,
            next_index_remote,
        })
    }
}

/// Validates the peer's claimed current per-commitment point against our
/// recorded points (§4.4, "data-loss-protect current-fields check").
pub fn validate_current_point(
    peer_next_local_commitment_number: u64,
    revocations_received: u64,
    peer_claimed_current_point: &PublicKey,
    old_remote_per_commit: Option<&PublicKey>,
    remote_per_commit: &PublicKey,
) -> Result<(), ReestablishError> {
    let expected = if peer_next_local_commitment_number
        == revocations_received + 1
    {
        old_remote_per_commit.unwrap_or(remote_per_commit)
    } else {
        remote_per_commit
    };
    if expected == peer_claimed_current_point {
        Ok(())
    } else {
        Err(ReestablishError::CurrentPointMismatch)
    }
}

/// Whether `funding_locked` should be retransmitted after reestablish: only
/// when neither side has yet exchanged the first post-opening commitment
/// (§4.4).
pub fn should_retransmit_funding_locked(
    next_index_local: u64,
    peer_next_local_commitment_number: u64,
) -> bool {
    next_index_local == 1 && peer_next_local_commitment_number == 1
}

/// Order in which a pending commit and a pending revoke must be replayed
/// after reestablish (§4.4, "ordering of retransmissions matters").
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
pub enum RetransmitOrder {
    #[display("commit-then-revoke")]
    CommitThenRevoke,
    #[display("revoke-then-commit")]
    RevokeThenCommit,
}

/// `last_was_revoke` is persisted via the master (§4.4) and recorded
/// whichever message we sent last, of the commit/revoke pair, before the
/// disconnect.
pub fn retransmit_order(last_was_revoke: bool) -> RetransmitOrder {
    if last_was_revoke {
        RetransmitOrder::CommitThenRevoke
    } else {
        RetransmitOrder::RevokeThenCommit
    }
}

/// Counts "premature" messages received before `channel_reestablish`
/// completes (§4.4); more than 10 is fatal per the Open Question decision
/// recorded in the project's design notes.
pub const MAX_PREMATURE_MESSAGES: u32 = 10;

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use super::*;

    fn pk(hex: &str) -> PublicKey {
        PublicKey::from_str(hex).unwrap()
    }

    #[test]
    fn revoke_retransmit_when_one_behind() {
        // scenario 3: next_index[LOCAL] unrelated here; exercise revoke side
        // separately using its own table.
        let action =
            decide_revoke_action(0, 2, 0, false).unwrap();
        assert_eq!(action, RevokeAction::Retransmit);
    }

    #[test]
    fn revoke_no_retransmit_when_quiescent() {
        let action = decide_revoke_action(1, 2, 1, false).unwrap();
        assert_eq!(action, RevokeAction::None);
    }

    #[test]
    fn revoke_fallen_behind_with_valid_proof() {
        // scenario 4: next_index[LOCAL] = 5, peer claims 6, proof checks out.
        let action = decide_revoke_action(6, 5, 4, true).unwrap();
        assert_eq!(action, RevokeAction::FallenBehind);
    }

    #[test]
    fn revoke_bad_number_without_proof_fails_channel() {
        let err = decide_revoke_action(6, 5, 4, false).unwrap_err();
        assert_eq!(
            err,
            ReestablishError::BadRevocationNumber {
                peer_claim: 6,
                revocations_received: 4,
                next_index_local: 5,
            }
        );
    }

    #[test]
    fn commit_retransmit_when_peer_missed_last_commitment_signed() {
        // scenario 3: next_index[REMOTE] = 2, peer claims 2.
        let action = decide_commit_action(2, 2).unwrap();
        assert_eq!(action, CommitAction::None);
        let action = decide_commit_action(1, 2).unwrap();
        assert_eq!(action, CommitAction::Retransmit);
    }

    #[test]
    fn commit_bad_number_fails_channel() {
        let err = decide_commit_action(7, 2).unwrap_err();
        assert_eq!(
            err,
            ReestablishError::BadCommitmentNumber {
                peer_claim: 7,
                next_index_remote: 2,
            }
        );
    }

    #[test]
    fn current_point_checked_against_old_point_when_one_behind() {
        let old = pk(
            "025f7117a78150fe2ef97db7cfc83bd57b2e2c0d0dd25eaf467a4a1c2a45ce1486",
        );
        let current = pk(
            "0324653eac434488002cc06bbfb7f10fe18991e35f9fe4302dbea6d2353dc0ab1",
        );
        // revocations_received + 1 == peer's claim => compare against old.
        assert!(validate_current_point(5, 4, &old, Some(&old), &current)
            .is_ok());
        assert_eq!(
            validate_current_point(5, 4, &current, Some(&old), &current)
                .unwrap_err(),
            ReestablishError::CurrentPointMismatch
        );
    }

    #[test]
    fn funding_locked_retransmitted_only_at_first_commitment() {
        assert!(should_retransmit_funding_locked(1, 1));
        assert!(!should_retransmit_funding_locked(2, 1));
        assert!(!should_retransmit_funding_locked(1, 2));
    }

    #[test]
    fn retransmit_order_follows_last_action() {
        assert_eq!(
            retransmit_order(true),
            RetransmitOrder::CommitThenRevoke
        );
        assert_eq!(
            retransmit_order(false),
            RetransmitOrder::RevokeThenCommit
        );
    }
}
