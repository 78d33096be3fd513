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

//! Process-level plumbing (§5, §6, §10.4): the event loop and the three
//! descriptor clients it multiplexes over. The channel state machine
//! itself lives in [`crate::channel`] and knows nothing about descriptors,
//! transports, or scheduling.

pub mod dispatcher;
pub mod gossip;
pub mod master;
pub mod messages;
pub mod peer;
pub mod signer;

pub use dispatcher::{
    gossipd_wait_sync_reply, is_shutdown_complete, select_next_source, wait_sync_reply,
    DeferredQueue, EventSource,
};
pub use gossip::GossipClient;
pub use master::MasterClient;
pub use peer::PeerClient;
pub use signer::SignerClient;
