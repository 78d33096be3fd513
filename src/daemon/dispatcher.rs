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

//! The cooperative event loop (§4.1, §5): which of the four descriptors to
//! service next, and the two nested synchronous request/reply idioms built
//! on top of it. Polling the real descriptors is a platform concern left to
//! `src/bin/channeld.rs`; this module owns the ordering rules themselves so
//! they can be driven by in-memory queues in tests.

use std::collections::VecDeque;

use crate::channel::state::ChannelState;

/// Which readiness source the loop should service on its next iteration
/// (§4.1). Strict priority: deferred master traffic first, then a due
/// timer, then live readiness in `master > peer > gossip-store` order.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
pub enum EventSource {
    #[display("deferred-master")]
    DeferredMaster,
    #[display("timer")]
    Timer,
    #[display("master")]
    Master,
    #[display("peer")]
    Peer,
    #[display("gossip-store")]
    GossipStore,
}

/// Picks the next event source given the current readiness snapshot
/// (§4.1). Only one event is processed per iteration, so the caller is
/// expected to re-evaluate this after handling whatever it returns.
pub fn select_next_source(
    has_deferred_master: bool,
    timer_due: bool,
    master_ready: bool,
    peer_ready: bool,
    gossip_store_due: bool,
) -> Option<EventSource> {
    if has_deferred_master {
        Some(EventSource::DeferredMaster)
    } else if timer_due {
        Some(EventSource::Timer)
    } else if master_ready {
        Some(EventSource::Master)
    } else if peer_ready {
        Some(EventSource::Peer)
    } else if gossip_store_due {
        Some(EventSource::GossipStore)
    } else {
        None
    }
}

/// FIFO of messages set aside while awaiting a specific reply type, drained
/// at the top of the next main-loop iteration (§4.1, §5).
#[derive(Debug)]
pub struct DeferredQueue<T>(VecDeque<T>);

impl<T> Default for DeferredQueue<T> {
    fn default() -> Self { DeferredQueue(VecDeque::new()) }
}

impl<T> DeferredQueue<T> {
    pub fn new() -> Self { Self::default() }

    pub fn push(&mut self, item: T) { self.0.push_back(item); }

    pub fn pop(&mut self) -> Option<T> { self.0.pop_front() }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    pub fn len(&self) -> usize { self.0.len() }
}

/// Blocks reading from `recv` until a message satisfying `is_expected`
/// arrives, deferring everything else onto `deferred` (§5, "master
/// round-trip"). Used for `sending_commitsig`/`got_commitsig`/`got_revoke`
/// acknowledgements; the corresponding request must already have been sent.
pub fn wait_sync_reply<T>(
    mut recv: impl FnMut() -> T,
    deferred: &mut DeferredQueue<T>,
    is_expected: impl Fn(&T) -> bool,
) -> T {
    loop {
        let msg = recv();
        if is_expected(&msg) {
            return msg;
        }
        deferred.push(msg);
    }
}

/// Blocks reading from `recv` until a message satisfying `is_expected`
/// arrives, processing everything else inline via `forward` rather than
/// deferring it (§5, "gossip round-trip": intervening messages are gossip
/// forwards, not master traffic to replay later).
pub fn gossipd_wait_sync_reply<T>(
    mut recv: impl FnMut() -> T,
    mut forward: impl FnMut(T),
    is_expected: impl Fn(&T) -> bool,
) -> T {
    loop {
        let msg = recv();
        if is_expected(&msg) {
            return msg;
        }
        forward(msg);
    }
}

/// Exit condition (§4.1): both sides sent `shutdown`, the HTLC set is
/// empty, and there is no dangling fee-change revocation owed to us.
pub fn is_shutdown_complete(state: &ChannelState) -> bool {
    state.is_shutdown_agreed()
        && state.per_commit.revocations_received
            == state.per_commit.remote_commitment_number
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn deferred_master_outranks_everything() {
        let source = select_next_source(true, true, true, true, true);
        assert_eq!(source, Some(EventSource::DeferredMaster));
    }

    #[test]
    fn timer_outranks_live_readiness() {
        let source = select_next_source(false, true, true, true, true);
        assert_eq!(source, Some(EventSource::Timer));
    }

    #[test]
    fn master_outranks_peer_and_gossip_store() {
        let source = select_next_source(false, false, true, true, true);
        assert_eq!(source, Some(EventSource::Master));
    }

    #[test]
    fn peer_outranks_gossip_store() {
        let source = select_next_source(false, false, false, true, true);
        assert_eq!(source, Some(EventSource::Peer));
    }

    #[test]
    fn gossip_store_is_last_resort() {
        let source = select_next_source(false, false, false, false, true);
        assert_eq!(source, Some(EventSource::GossipStore));
    }

    #[test]
    fn nothing_ready_yields_none() {
        let source = select_next_source(false, false, false, false, false);
        assert_eq!(source, None);
    }

    #[test]
    fn wait_sync_reply_defers_non_matching_messages() {
        let mut incoming = VecDeque::from(vec![1, 2, 3, 99]);
        let mut deferred = DeferredQueue::new();
        let reply = wait_sync_reply(
            || incoming.pop_front().unwrap(),
            &mut deferred,
            |msg| *msg == 99,
        );
        assert_eq!(reply, 99);
        assert_eq!(deferred.len(), 3);
        assert_eq!(deferred.pop(), Some(1));
        assert_eq!(deferred.pop(), Some(2));
        assert_eq!(deferred.pop(), Some(3));
    }

    #[test]
    fn gossipd_wait_sync_reply_forwards_inline_instead_of_deferring() {
        let mut incoming = VecDeque::from(vec!["forward-a", "forward-b", "reply"]);
        let mut forwarded = Vec::new();
        let reply = gossipd_wait_sync_reply(
            || incoming.pop_front().unwrap(),
            |msg| forwarded.push(msg),
            |msg| *msg == "reply",
        );
        assert_eq!(reply, "reply");
        assert_eq!(forwarded, vec!["forward-a", "forward-b"]);
    }
}
