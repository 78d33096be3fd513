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

//! The protocol state machine (§4.2): dispatches each inbound peer message
//! kind to its handler and enforces the pre-`funding_locked` allowlist.
//! Wire (de)serialization and the master/signer/gossip round-trips live in
//! the daemon layer; this module owns the decisions those round-trips are
//! built around, so they can be exercised without a live transport.

use secp256k1::PublicKey;

use crate::channel::commitment::AwaitingRevokeCounter;
use crate::channel::reestablish::MAX_PREMATURE_MESSAGES;
use crate::channel::state::ChannelState;

/// The inbound peer message kinds the state machine discriminates on
/// (§4.2). Wire decoding produces one of these before any handler runs.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
pub enum PeerMessageKind {
    #[display("funding_locked")]
    FundingLocked,
    #[display("announcement_signatures")]
    AnnouncementSignatures,
    #[display("update_add_htlc")]
    UpdateAddHtlc,
    #[display("update_fee")]
    UpdateFee,
    #[display("commitment_signed")]
    CommitmentSigned,
    #[display("revoke_and_ack")]
    RevokeAndAck,
    #[display("update_fulfill_htlc")]
    UpdateFulfillHtlc,
    #[display("update_fail_htlc")]
    UpdateFailHtlc,
    #[display("update_fail_malformed_htlc")]
    UpdateFailMalformedHtlc,
    #[display("shutdown")]
    Shutdown,
    #[display("pong")]
    Pong,
    #[display("other")]
    Other,
}

/// Message kinds tolerated before REMOTE has sent `funding_locked` (§4.2,
/// "strict allowlist").
const ALLOWED_BEFORE_FUNDING_LOCKED: [PeerMessageKind; 5] = [
    PeerMessageKind::FundingLocked,
    PeerMessageKind::Shutdown,
    PeerMessageKind::UpdateFee,
    PeerMessageKind::AnnouncementSignatures,
    PeerMessageKind::Pong,
];

/// Any reason the channel must be failed outright (§4.2, §7 kind 2).
#[derive(Clone, PartialEq, Eq, Debug, Display, Error)]
pub enum DispatchError {
    /// message kind {0} is not allowed before REMOTE funding_locked
    NotAllowedBeforeFundingLocked(PeerMessageKind),

    /// update_fee received while LOCAL is the channel funder
    UpdateFeeFromNonFunderOnly,

    /// more than {MAX_PREMATURE_MESSAGES} premature messages received before
    /// channel_reestablish completed
    TooManyPrematureMessages,

    /// revoke_and_ack received while revocations_received != next_index[REMOTE] - 2
    UnexpectedRevoke,

    /// revoke_and_ack per-commitment point does not match old_remote_per_commit
    RevokeSecretMismatch,
}

/// Outcome of processing an inbound `funding_locked` (§4.2).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FundingLockedOutcome {
    /// REMOTE was already funding-locked, or LOCAL has sent shutdown;
    /// idempotent no-op.
    Ignored,
    /// The point was installed and REMOTE marked funding-locked.
    Applied,
}

/// Counts premature peer messages received before `channel_reestablish`
/// completes. A thin wrapper so [`ChannelMachine`] can reuse the cap
/// constant from the reestablish decision tables.
#[derive(Clone, Copy, Default, Debug)]
pub struct PrematureMessageCounter(u32);

impl PrematureMessageCounter {
    pub fn record(&mut self) -> Result<(), DispatchError> {
        self.0 += 1;
        if self.0 > MAX_PREMATURE_MESSAGES {
            Err(DispatchError::TooManyPrematureMessages)
        } else {
            Ok(())
        }
    }
}

/// Top-level per-channel state machine: wraps the durable [`ChannelState`]
/// together with the small amount of in-process bookkeeping the protocol
/// state machine and commitment engine need across calls.
pub struct ChannelMachine {
    pub state: ChannelState,
    pub awaiting_revoke: AwaitingRevokeCounter,
    pub premature_messages: PrematureMessageCounter,
    pub last_empty_commitment: Option<u64>,
    pub last_was_revoke: bool,
}

impl ChannelMachine {
    pub fn new(state: ChannelState) -> Self {
        Self {
            state,
            awaiting_revoke: AwaitingRevokeCounter::new(),
            premature_messages: PrematureMessageCounter::default(),
            last_empty_commitment: None,
            last_was_revoke: false,
        }
    }

    /// Enforces the pre-`funding_locked` allowlist (§4.2, last paragraph).
    pub fn check_message_allowed(
        &self,
        kind: PeerMessageKind,
    ) -> Result<(), DispatchError> {
        if self.state.remote.funding_locked {
            return Ok(());
        }
        if ALLOWED_BEFORE_FUNDING_LOCKED.contains(&kind) {
            Ok(())
        } else {
            Err(DispatchError::NotAllowedBeforeFundingLocked(kind))
        }
    }

    /// Applies an inbound `funding_locked` (§4.2).
    pub fn on_funding_locked(
        &mut self,
        new_remote_per_commit: PublicKey,
    ) -> FundingLockedOutcome {
        if self.state.remote.funding_locked || self.state.local.shutdown_sent
        {
            return FundingLockedOutcome::Ignored;
        }
        self.state.per_commit.old_remote_per_commit =
            Some(self.state.per_commit.remote_per_commit);
        self.state.per_commit.remote_per_commit = new_remote_per_commit;
        self.state.remote.funding_locked = true;
        FundingLockedOutcome::Applied
    }

    /// Enforces §4.2's `update_fee` funder restriction: only the non-funder
    /// may send it. Feerate bounds/affordability are the commitment
    /// library's concern and are not re-derived here.
    pub fn check_update_fee_allowed(
        &self,
    ) -> Result<(), DispatchError> {
        if self.state.is_opener {
            Err(DispatchError::UpdateFeeFromNonFunderOnly)
        } else {
            Ok(())
        }
    }

    /// Applies an inbound `revoke_and_ack` (§4.2). `secret_reconstructs_old_point`
    /// must already reflect a signer-verified reconstruction of the
    /// per-commitment point from the supplied secret.
    pub fn on_revoke_and_ack(
        &mut self,
        new_remote_per_commit: PublicKey,
        secret_reconstructs_old_point: bool,
    ) -> Result<(), DispatchError> {
        let next_index_remote = self.state.per_commit.remote_commitment_number + 1;
        if self.state.per_commit.revocations_received
            != next_index_remote.saturating_sub(2)
        {
            return Err(DispatchError::UnexpectedRevoke);
        }
        if !secret_reconstructs_old_point {
            return Err(DispatchError::RevokeSecretMismatch);
        }
        self.state.per_commit.advance_remote(new_remote_per_commit);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use super::*;

    fn pk(hex: &str) -> PublicKey { PublicKey::from_str(hex).unwrap() }

    fn machine_with(is_opener: bool) -> ChannelMachine {
        use amplify::DumbDefault;
        use internet2::addr::NodeId;

        use crate::channel::keyset::{LocalKeyset, RemoteKeyset};
        use crate::channel::lifecycle::Lifecycle;
        use crate::channel::percommit::PerCommitState;
        use crate::channel::policy::Policy;
        use crate::channel::state::SideState;
        use p2p::bolt::ChannelId;

        ChannelMachine::new(ChannelState {
            lifecycle: Lifecycle::Active,
            channel_id: ChannelId::default(),
            node_id: NodeId::from_str(
                "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798",
            )
            .unwrap(),
            is_opener,
            local_amount_msat: 0,
            remote_amount_msat: 0,
            local_keys: LocalKeyset::dumb_default(),
            remote_keys: RemoteKeyset::dumb_default(),
            per_commit: PerCommitState::new(
                pk("025f7117a78150fe2ef97db7cfc83bd57b2e2c0d0dd25eaf467a4a1c2a45ce1486"),
                pk("0324653eac434488002cc06bbfb7f10fe18991e35f9fe4302dbea6d2353dc0ab1"),
            ),
            policy: Policy::default(),
            local: SideState::default(),
            remote: SideState::default(),
            short_channel_id: None,
            next_htlc_id: 0,
            htlcs: Default::default(),
            premature_message_count: 0,
            feerate_per_kw: 253,
            base_fee_msat: 1000,
            proportional_fee_ppm: 0,
        })
    }

    #[test]
    fn only_allowlisted_messages_pass_before_funding_locked() {
        let machine = machine_with(true);
        assert!(machine
            .check_message_allowed(PeerMessageKind::Shutdown)
            .is_ok());
        assert!(machine
            .check_message_allowed(PeerMessageKind::UpdateAddHtlc)
            .is_err());
    }

    #[test]
    fn any_message_passes_once_funding_locked() {
        let mut machine = machine_with(true);
        machine.state.remote.funding_locked = true;
        assert!(machine
            .check_message_allowed(PeerMessageKind::UpdateAddHtlc)
            .is_ok());
    }

    #[test]
    fn funding_locked_is_idempotent_on_reconnect() {
        let mut machine = machine_with(true);
        let p1 = pk("02531fe6068134503d2723133227c867ac8fa6c83c537e9a44c3c5bdbdcb1fe337");
        let outcome = machine.on_funding_locked(p1);
        assert_eq!(outcome, FundingLockedOutcome::Applied);
        assert!(machine.state.remote.funding_locked);

        let p2 = pk("03e775fd51f0dd8d107a1d29b5d6647006da1d2ec6e26a67e9a5f5c7eb2911f32");
        let outcome = machine.on_funding_locked(p2);
        assert_eq!(outcome, FundingLockedOutcome::Ignored);
        // point from the first application is retained, not overwritten
        assert_eq!(machine.state.per_commit.remote_per_commit, p1);
    }

    #[test]
    fn funding_locked_ignored_after_local_shutdown_sent() {
        let mut machine = machine_with(true);
        machine.state.local.shutdown_sent = true;
        let p = pk("02531fe6068134503d2723133227c867ac8fa6c83c537e9a44c3c5bdbdcb1fe337");
        assert_eq!(
            machine.on_funding_locked(p),
            FundingLockedOutcome::Ignored
        );
    }

    #[test]
    fn update_fee_from_funder_fails_the_channel() {
        // scenario 5: core is LOCAL funder, peer sends update_fee.
        let machine = machine_with(true);
        assert_eq!(
            machine.check_update_fee_allowed().unwrap_err(),
            DispatchError::UpdateFeeFromNonFunderOnly
        );
    }

    #[test]
    fn update_fee_from_non_funder_is_allowed() {
        let machine = machine_with(false);
        assert!(machine.check_update_fee_allowed().is_ok());
    }

    #[test]
    fn revoke_and_ack_advances_state_when_expected() {
        let mut machine = machine_with(true);
        // remote_commitment_number starts at 0 => next_index[REMOTE] = 1,
        // revocations_received = 0 = next_index[REMOTE] - 1: quiescent, not
        // awaiting a revoke yet. Bump remote_commitment_number to simulate
        // one outstanding commit.
        machine.state.per_commit.remote_commitment_number = 1;
        let new_point = pk("03e775fd51f0dd8d107a1d29b5d6647006da1d2ec6e26a67e9a5f5c7eb2911f32");
        assert!(machine.on_revoke_and_ack(new_point, true).is_ok());
        assert_eq!(machine.state.per_commit.revocations_received, 1);
        assert_eq!(machine.state.per_commit.remote_per_commit, new_point);
    }

    #[test]
    fn revoke_and_ack_rejected_when_not_expected() {
        let mut machine = machine_with(true);
        let new_point = pk("03e775fd51f0dd8d107a1d29b5d6647006da1d2ec6e26a67e9a5f5c7eb2911f32");
        assert_eq!(
            machine.on_revoke_and_ack(new_point, true).unwrap_err(),
            DispatchError::UnexpectedRevoke
        );
    }

    #[test]
    fn revoke_and_ack_rejected_on_secret_mismatch() {
        let mut machine = machine_with(true);
        machine.state.per_commit.remote_commitment_number = 1;
        let new_point = pk("03e775fd51f0dd8d107a1d29b5d6647006da1d2ec6e26a67e9a5f5c7eb2911f32");
        assert_eq!(
            machine.on_revoke_and_ack(new_point, false).unwrap_err(),
            DispatchError::RevokeSecretMismatch
        );
    }

    #[test]
    fn premature_message_cap_fails_after_threshold() {
        let mut counter = PrematureMessageCounter::default();
        for _ in 0..MAX_PREMATURE_MESSAGES {
            assert!(counter.record().is_ok());
        }
        assert_eq!(
            counter.record().unwrap_err(),
            DispatchError::TooManyPrematureMessages
        );
    }
}
