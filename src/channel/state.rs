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

use std::collections::BTreeMap;

use amplify::DumbDefault;
use internet2::addr::NodeId;
use p2p::bolt::ChannelId;
use secp256k1::ecdsa::Signature;

use crate::channel::htlc::Htlc;
use crate::channel::keyset::{LocalKeyset, RemoteKeyset};
use crate::channel::lifecycle::{Lifecycle, Side};
use crate::channel::percommit::PerCommitState;
use crate::channel::policy::Policy;
use p2p::bolt::ShortChannelId;

/// Everything the core tracks about one side of the `announcement_signatures`
/// cosigning process and about a proposed cooperative close (§3, §4.5, §4.7).
/// Indexed by [`Side`] rather than split into separate `local_*`/`remote_*`
/// fields, matching the convention used for commitment bookkeeping.
#[derive(Clone, Debug, Default)]
#[derive(StrictEncode, StrictDecode)]
pub struct SideState {
    /// `funding_locked` has been sent (for [`Side::Local`]) or received (for
    /// [`Side::Remote`]).
    pub funding_locked: bool,
    /// `shutdown` has been sent/received from this side.
    pub shutdown_sent: bool,
    /// This side's half of `announcement_signatures` has been produced.
    pub have_announcement_sigs: bool,
    pub announcement_node_signature: Option<Signature>,
    pub announcement_bitcoin_signature: Option<Signature>,
}

/// Persistent snapshot of a channel's state, as round-tripped through
/// `channel_init`/`channel_state` with the master (§3, §6). This is the
/// single source of truth the daemon reconstructs itself from on restart.
#[derive(Clone, Debug)]
#[derive(StrictEncode, StrictDecode)]
pub struct ChannelState {
    pub lifecycle: Lifecycle,
    pub channel_id: ChannelId,
    pub node_id: NodeId,
    /// `true` if the local side proposed the channel and therefore owns
    /// `update_fee` and tie-breaking (§4.2, §4.4).
    pub is_opener: bool,

    pub local_amount_msat: u64,
    pub remote_amount_msat: u64,

    pub local_keys: LocalKeyset,
    pub remote_keys: RemoteKeyset,
    pub per_commit: PerCommitState,
    pub policy: Policy,

    pub local: SideState,
    pub remote: SideState,

    /// Assigned once `channel_announcement` has propagated through gossip.
    pub short_channel_id: Option<ShortChannelId>,

    /// Next HTLC id this side will allocate when offering a new HTLC.
    pub next_htlc_id: u64,
    /// All HTLCs not yet irrevocably resolved and removed, keyed by the id
    /// the offering side assigned.
    pub htlcs: BTreeMap<u64, Htlc>,

    /// Count of peer messages tolerated before `funding_locked` has been
    /// exchanged on both sides (§4.4); reset once the channel goes active.
    pub premature_message_count: u32,

    /// Feerate currently in force for new commitments, sat/kw.
    pub feerate_per_kw: u32,

    /// Per-channel routing fees the master set via `specific_feerates`
    /// (§6); reported back on request, not enforced here.
    pub base_fee_msat: u32,
    pub proportional_fee_ppm: u32,
}

impl ChannelState {
    pub fn total_in_flight_msat(&self, side: Side) -> u64 {
        self.htlcs
            .values()
            .filter(|htlc| match side {
                Side::Local => {
                    matches!(
                        htlc.state,
                        crate::channel::htlc::HtlcState::SentAddHtlc
                            | crate::channel::htlc::HtlcState::SentAddCommit
                            | crate::channel::htlc::HtlcState::SentAddAckCommit
                    )
                }
                Side::Remote => {
                    matches!(
                        htlc.state,
                        crate::channel::htlc::HtlcState::RcvdAddHtlc
                            | crate::channel::htlc::HtlcState::RcvdAddCommit
                            | crate::channel::htlc::HtlcState::RcvdAddAckCommit
                    )
                }
            })
            .map(|htlc| htlc.amount_msat)
            .sum()
    }

    pub fn accepted_htlc_count(&self) -> u16 {
        self.htlcs.len() as u16
    }

    /// Allocates the next HTLC id to offer and advances the counter.
    pub fn allocate_htlc_id(&mut self) -> u64 {
        let id = self.next_htlc_id;
        self.next_htlc_id += 1;
        id
    }

    /// `true` once both sides have exchanged `funding_locked` (§4.1, §4.4):
    /// the gate past which ordinary `update_*`/`commitment_signed` traffic
    /// is permitted instead of being deferred or counted against the
    /// premature-message cap.
    pub fn is_funding_locked(&self) -> bool {
        self.local.funding_locked && self.remote.funding_locked
    }

    /// `true` once both sides have sent `shutdown` and no HTLC remains.
    pub fn is_shutdown_agreed(&self) -> bool {
        self.local.shutdown_sent
            && self.remote.shutdown_sent
            && self.htlcs.is_empty()
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use super::*;

    fn state_for_tests() -> ChannelState {
        ChannelState {
            lifecycle: Lifecycle::Active,
            channel_id: ChannelId::default(),
            node_id: NodeId::from_str(
                "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798",
            )
            .unwrap(),
            is_opener: true,
            local_amount_msat: 500_000_000,
            remote_amount_msat: 500_000_000,
            local_keys: DumbDefault::dumb_default(),
            remote_keys: DumbDefault::dumb_default(),
            per_commit: PerCommitState::new(
                secp256k1::PublicKey::from_str(
                    "025f7117a78150fe2ef97db7cfc83bd57b2e2c0d0dd25eaf467a4a1c2a45ce1486",
                )
                .unwrap(),
                secp256k1::PublicKey::from_str(
                    "0324653eac434488002cc06bbfb7f10fe18991e35f9fe4302dbea6d2353dc0ab1",
                )
                .unwrap(),
            ),
            policy: Policy::default(),
            local: SideState::default(),
            remote: SideState::default(),
            short_channel_id: None,
            next_htlc_id: 0,
            htlcs: BTreeMap::new(),
            premature_message_count: 0,
            feerate_per_kw: 253,
            base_fee_msat: 1000,
            proportional_fee_ppm: 0,
        }
    }

    #[test]
    fn funding_locked_requires_both_sides() {
        let mut state = state_for_tests();
        assert!(!state.is_funding_locked());
        state.local.funding_locked = true;
        assert!(!state.is_funding_locked());
        state.remote.funding_locked = true;
        assert!(state.is_funding_locked());
    }

    #[test]
    fn shutdown_agreed_requires_empty_htlc_set() {
        use bitcoin::hashes::Hash;

        let mut state = state_for_tests();
        state.local.shutdown_sent = true;
        state.remote.shutdown_sent = true;
        assert!(state.is_shutdown_agreed());
        state.htlcs.insert(
            0,
            Htlc::offered(
                0,
                1000,
                bitcoin::hashes::sha256::Hash::hash(&[0u8; 32]),
                144,
                vec![0u8; 1366],
            ),
        );
        assert!(!state.is_shutdown_agreed());
    }

    #[test]
    fn htlc_id_allocation_is_monotonic() {
        let mut state = state_for_tests();
        assert_eq!(state.allocate_htlc_id(), 0);
        assert_eq!(state.allocate_htlc_id(), 1);
        assert_eq!(state.next_htlc_id, 2);
    }
}
