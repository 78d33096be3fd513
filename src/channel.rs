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

//! The per-channel state machine (§3, §4): data model, protocol state
//! machine, commitment engine, reconnection handling, HTLC forwarding,
//! announcement and shutdown negotiation.

pub mod announcement;
pub mod commitment;
pub mod dispatch;
pub mod forwarding;
pub mod htlc;
pub mod keyset;
pub mod lifecycle;
pub mod machine;
pub mod percommit;
pub mod policy;
pub mod reestablish;
pub mod shutdown;
pub mod state;

pub use dispatch::{
    dispatch_master_message, dispatch_peer_message, handle_channel_reestablish, send_commit,
};
pub use htlc::{Htlc, HtlcState, WhyBad};
pub use keyset::{LocalKeyset, LocalPubkey, RemoteKeyset};
pub use lifecycle::{Lifecycle, Side};
pub use machine::{ChannelMachine, DispatchError, PeerMessageKind};
pub use percommit::PerCommitState;
pub use policy::{Policy, PolicyError};
pub use state::{ChannelState, SideState};
