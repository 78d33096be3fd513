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

//! The commitment engine (§4.3): the guard-clause sequences that decide
//! whether to send or accept a commitment. Transaction assembly and
//! signature verification themselves are delegated to the commitment-
//! transaction builder named in §1 as reused verbatim; this module owns
//! only the ordering and bookkeeping rules around it.

/// Why `send_commit` declined to emit a `commitment_signed` this round
/// (§4.3 step 1-3, 5). Each variant names the guard clause that fired.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
pub enum SendCommitAbort {
    /// the previous commitment is still unrevoked; rearm and retry
    #[display("awaiting-revoke")]
    AwaitingRevoke,
    /// LOCAL already sent shutdown and there are no HTLCs left to settle
    #[display("shutdown-quiescent")]
    ShutdownQuiescent,
    /// nothing received from the peer within the keepalive window
    #[display("peer-idle")]
    PeerIdle,
    /// the commitment library reported no staged changes
    #[display("nothing-to-commit")]
    NothingToCommit,
}

/// Keepalive window after which `send_commit` defers to the ping path
/// instead of committing (§4.3 step 3).
pub const PEER_IDLE_SECS: u64 = 30;

/// Number of consecutive `AwaitingRevoke` aborts after which the guard logs
/// once instead of staying silent (§4.3 step 1).
pub const AWAITING_REVOKE_LOG_THRESHOLD: u32 = 100;

/// Evaluates the `send_commit` guard clauses in the order given in §4.3,
/// stopping at the first that aborts. `Ok(())` means the caller should
/// proceed to ask the commitment library to assemble pending changes.
#[allow(clippy::too_many_arguments)]
pub fn check_send_commit_guards(
    revocations_received: u64,
    next_index_remote: u64,
    local_shutdown_sent: bool,
    htlc_set_is_empty: bool,
    secs_since_last_peer_message: u64,
    has_pending_changes: bool,
) -> Result<(), SendCommitAbort> {
    if revocations_received != next_index_remote.saturating_sub(1) {
        return Err(SendCommitAbort::AwaitingRevoke);
    }
    if local_shutdown_sent && htlc_set_is_empty {
        return Err(SendCommitAbort::ShutdownQuiescent);
    }
    if secs_since_last_peer_message >= PEER_IDLE_SECS {
        return Err(SendCommitAbort::PeerIdle);
    }
    if !has_pending_changes {
        return Err(SendCommitAbort::NothingToCommit);
    }
    Ok(())
}

/// Tracks consecutive `AwaitingRevoke` aborts so the caller can log once
/// every [`AWAITING_REVOKE_LOG_THRESHOLD`] occurrences rather than per
/// retry (§4.3 step 1).
#[derive(Clone, Copy, Default, Debug)]
pub struct AwaitingRevokeCounter(u32);

impl AwaitingRevokeCounter {
    pub fn new() -> Self { Self(0) }

    /// Records another `AwaitingRevoke` abort; returns `true` exactly once
    /// every [`AWAITING_REVOKE_LOG_THRESHOLD`] calls, signalling the caller
    /// should log.
    pub fn record(&mut self) -> bool {
        self.0 += 1;
        if self.0 >= AWAITING_REVOKE_LOG_THRESHOLD {
            self.0 = 0;
            true
        } else {
            false
        }
    }

    /// Resets the counter once a commitment is finally revoked.
    pub fn reset(&mut self) { self.0 = 0; }
}

/// Whether we must send `update_fee` before assembling this commitment
/// (§4.3 step 4): only the funder adjusts fees, and only when our desired
/// rate differs from what is currently committed.
pub fn needs_fee_update(
    is_funder: bool,
    desired_feerate_per_kw: u32,
    current_feerate_per_kw: u32,
) -> Option<u32> {
    if is_funder && desired_feerate_per_kw != current_feerate_per_kw {
        Some(clamp_feerate(desired_feerate_per_kw))
    } else {
        None
    }
}

/// Clamps a desired feerate to the commitment library's
/// `approx_max_feerate` ceiling (§4.3 step 4). The ceiling itself is a
/// property of the commitment library and not modeled here; this function
/// exists so callers have one place to apply it once a concrete bound is
/// wired in.
pub fn clamp_feerate(desired_feerate_per_kw: u32) -> u32 { desired_feerate_per_kw }

/// Outcome of applying an inbound `commitment_signed` to our pending-change
/// bookkeeping (§4.3, receiving side, step 1).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ApplyPeerCommitOutcome {
    /// Changes were staged; proceed to build and verify.
    HadChanges,
    /// No changes were staged, but this is the first empty commitment at
    /// this index; tolerated for the one known interoperating peer.
    ToleratedEmpty,
}

/// Error raised while accepting a peer's `commitment_signed` (§4.3,
/// receiving side; §8 scenario 2).
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display, Error)]
pub enum HandlePeerCommitError {
    /// commit_sig with no changes (again!)
    RepeatedEmptyCommitment,

    /// funder can no longer afford the current feerate on this commitment
    FeerateUnaffordable,

    /// commitment_signed HTLC signature count does not match HTLC output
    /// count: expected {expected}, got {got}
    HtlcSignatureCountMismatch { expected: usize, got: usize },
}

/// Implements §4.3 receiving-side step 1: decides whether an empty
/// commitment is tolerated or fails the channel, tracking
/// `last_empty_commitment` across calls.
pub fn apply_peer_commit(
    has_changes: bool,
    next_index_local: u64,
    last_empty_commitment: &mut Option<u64>,
) -> Result<ApplyPeerCommitOutcome, HandlePeerCommitError> {
    if has_changes {
        return Ok(ApplyPeerCommitOutcome::HadChanges);
    }
    let current_index = next_index_local.saturating_sub(1);
    if *last_empty_commitment == Some(current_index) {
        return Err(HandlePeerCommitError::RepeatedEmptyCommitment);
    }
    *last_empty_commitment = Some(current_index);
    Ok(ApplyPeerCommitOutcome::ToleratedEmpty)
}

/// Implements §4.3 receiving-side step 4: the HTLC signature count
/// supplied by the peer must equal the number of HTLC outputs on the
/// commitment we just built.
pub fn check_htlc_signature_count(
    expected: usize,
    got: usize,
) -> Result<(), HandlePeerCommitError> {
    if expected == got {
        Ok(())
    } else {
        Err(HandlePeerCommitError::HtlcSignatureCountMismatch { expected, got })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn send_commit_happy_path_proceeds() {
        // scenario 1: quiescent, no shutdown, peer active, one staged htlc.
        let result =
            check_send_commit_guards(0, 1, false, true, 0, true);
        assert!(result.is_ok());
    }

    #[test]
    fn send_commit_aborts_while_awaiting_revoke() {
        let result =
            check_send_commit_guards(0, 2, false, true, 0, true);
        assert_eq!(result.unwrap_err(), SendCommitAbort::AwaitingRevoke);
    }

    #[test]
    fn send_commit_aborts_when_shutdown_quiescent() {
        let result =
            check_send_commit_guards(1, 2, true, true, 0, false);
        assert_eq!(result.unwrap_err(), SendCommitAbort::ShutdownQuiescent);
    }

    #[test]
    fn send_commit_aborts_when_peer_idle() {
        let result =
            check_send_commit_guards(1, 2, false, true, 30, true);
        assert_eq!(result.unwrap_err(), SendCommitAbort::PeerIdle);
    }

    #[test]
    fn send_commit_aborts_when_nothing_staged() {
        let result =
            check_send_commit_guards(1, 2, false, true, 0, false);
        assert_eq!(result.unwrap_err(), SendCommitAbort::NothingToCommit);
    }

    #[test]
    fn awaiting_revoke_counter_fires_every_hundred() {
        let mut counter = AwaitingRevokeCounter::new();
        for _ in 0..99 {
            assert!(!counter.record());
        }
        assert!(counter.record());
        assert!(!counter.record());
    }

    #[test]
    fn fee_update_only_for_funder_on_mismatch() {
        assert_eq!(needs_fee_update(true, 2000, 1000), Some(2000));
        assert_eq!(needs_fee_update(true, 1000, 1000), None);
        assert_eq!(needs_fee_update(false, 2000, 1000), None);
    }

    #[test]
    fn first_empty_commitment_is_tolerated() {
        let mut last_empty = None;
        let outcome = apply_peer_commit(false, 3, &mut last_empty).unwrap();
        assert_eq!(outcome, ApplyPeerCommitOutcome::ToleratedEmpty);
        assert_eq!(last_empty, Some(2));
    }

    #[test]
    fn second_empty_commitment_at_same_index_fails_channel() {
        // scenario 2: peer sends empty commit twice at the same index.
        let mut last_empty = Some(2);
        let err = apply_peer_commit(false, 3, &mut last_empty).unwrap_err();
        assert_eq!(err, HandlePeerCommitError::RepeatedEmptyCommitment);
    }

    #[test]
    fn empty_commitment_at_a_new_index_is_tolerated_again() {
        let mut last_empty = Some(2);
        let outcome = apply_peer_commit(false, 4, &mut last_empty).unwrap();
        assert_eq!(outcome, ApplyPeerCommitOutcome::ToleratedEmpty);
        assert_eq!(last_empty, Some(3));
    }

    #[test]
    fn htlc_commitment_with_changes_is_not_tolerated_path() {
        let mut last_empty = None;
        let outcome = apply_peer_commit(true, 1, &mut last_empty).unwrap();
        assert_eq!(outcome, ApplyPeerCommitOutcome::HadChanges);
        assert_eq!(last_empty, None);
    }

    #[test]
    fn htlc_signature_count_mismatch_fails_channel() {
        let err = check_htlc_signature_count(1, 0).unwrap_err();
        assert_eq!(
            err,
            HandlePeerCommitError::HtlcSignatureCountMismatch {
                expected: 1,
                got: 0,
            }
        );
        assert!(check_htlc_signature_count(1, 1).is_ok());
    }
}
