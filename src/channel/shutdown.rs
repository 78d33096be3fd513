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

use crate::channel::lifecycle::Side;
use crate::channel::state::ChannelState;

/// What the dispatcher must do in response to a received `shutdown` (§4.7).
/// A first REMOTE `shutdown` always runs the full path; a second one, once
/// REMOTE's flag is already set, is accepted as a no-op retransmit rather
/// than re-running the disabling-update/notify sequence (Open Question (a):
/// the source gates solely on the REMOTE flag, so we make repeats explicitly
/// idempotent instead of leaving the behavior on a later `shutdown`
/// unspecified).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ShutdownEffect {
    /// Send a disabling `channel_update` to gossip.
    pub send_disabling_update: bool,
    /// Notify the master via `got_shutdown`.
    pub notify_master: bool,
    /// Queue our own `shutdown` to go out on the next `send_commit`, if we
    /// had not already sent one.
    pub queue_local_shutdown: bool,
}

const NOOP: ShutdownEffect = ShutdownEffect {
    send_disabling_update: false,
    notify_master: false,
    queue_local_shutdown: false,
};

/// Computes the effect of a `shutdown` received from the peer, given
/// whether REMOTE had already sent shutdown before this message.
pub fn on_remote_shutdown(remote_shutdown_already_sent: bool) -> ShutdownEffect {
    if remote_shutdown_already_sent {
        return NOOP;
    }
    ShutdownEffect {
        send_disabling_update: true,
        notify_master: true,
        queue_local_shutdown: true,
    }
}

/// Marks the given side's `shutdown_sent` flag, applying it through
/// [`ChannelState`] (monotone: never transitions true -> false, §8).
pub fn mark_shutdown_sent(state: &mut ChannelState, side: Side) {
    match side {
        Side::Local => state.local.shutdown_sent = true,
        Side::Remote => state.remote.shutdown_sent = true,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn first_remote_shutdown_runs_full_path() {
        let effect = on_remote_shutdown(false);
        assert!(effect.send_disabling_update);
        assert!(effect.notify_master);
        assert!(effect.queue_local_shutdown);
    }

    #[test]
    fn second_remote_shutdown_is_a_noop() {
        let effect = on_remote_shutdown(true);
        assert_eq!(effect, NOOP);
    }

    #[test]
    fn shutdown_sent_is_monotone_once_marked() {
        use std::str::FromStr;

        use amplify::DumbDefault;
        use internet2::addr::NodeId;

        use crate::channel::keyset::{LocalKeyset, RemoteKeyset};
        use crate::channel::lifecycle::Lifecycle;
        use crate::channel::percommit::PerCommitState;
        use crate::channel::policy::Policy;
        use crate::channel::state::SideState;
        use p2p::bolt::ChannelId;

        let mut state = ChannelState {
            lifecycle: Lifecycle::Shutdown,
            channel_id: ChannelId::default(),
            node_id: NodeId::from_str(
                "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798",
            )
            .unwrap(),
            is_opener: true,
            local_amount_msat: 0,
            remote_amount_msat: 0,
            local_keys: LocalKeyset::dumb_default(),
            remote_keys: RemoteKeyset::dumb_default(),
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
            htlcs: Default::default(),
            premature_message_count: 0,
            feerate_per_kw: 253,
            base_fee_msat: 1000,
            proportional_fee_ppm: 0,
        };
        mark_shutdown_sent(&mut state, Side::Remote);
        assert!(state.remote.shutdown_sent);
        mark_shutdown_sent(&mut state, Side::Remote);
        assert!(state.remote.shutdown_sent);
    }
}
