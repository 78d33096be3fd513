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

/// Side of the channel a given piece of bookkeeping applies to.
///
/// The core never mixes "our view of their commitment" with "their view of
/// ours": every per-side field is indexed by this tag rather than collapsed
/// into a single pair of fields, so that the distinction survives refactors.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display,
)]
#[derive(StrictEncode, StrictDecode)]
#[display(Debug)]
pub enum Side {
    /// Our own view / our own commitment transaction.
    Local,
    /// The counterparty's view / their commitment transaction.
    Remote,
}

impl Side {
    /// The other side.
    #[inline]
    pub fn other(self) -> Side {
        match self {
            Side::Local => Side::Remote,
            Side::Remote => Side::Local,
        }
    }
}

/// Channel lifecycle: states of the top-level daemon state machine, from
/// process start to `shutdown_complete`.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display)]
#[derive(StrictEncode, StrictDecode)]
#[repr(u8)]
pub enum Lifecycle {
    /// Process started; waiting for `channel_init` from the master.
    #[display("INIT")]
    Initial,

    /// Reconnecting: `channel_reestablish` is being exchanged before any
    /// other peer traffic is accepted.
    #[display("REESTABLISHING")]
    Reestablishing,

    /// Channel is active and processing ordinary peer traffic.
    #[display("ACTIVE")]
    Active,

    /// Shutdown proposed (by either side) but not yet agreed by both.
    #[display("SHUTDOWN")]
    Shutdown,

    /// Both sides agreed to shut down; waiting for the HTLC set to drain
    /// and the last revocation to settle before `shutdown_complete`.
    #[display("CLOSING")]
    Closing,

    /// Remote proven to be ahead via data-loss-protect; awaiting the
    /// master's unilateral-close recovery.
    #[display("FALLEN-BEHIND")]
    FallenBehind,

    /// Channel non-operational; the daemon is about to exit.
    #[display("CLOSED")]
    Closed,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Lifecycle::Initial
    }
}
