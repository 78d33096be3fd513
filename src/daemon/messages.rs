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

//! Master, signer, and gossip RPC message types (§6). Plain
//! `strict_encoding`-derived enums, deliberately not the teacher's
//! `esb`/`Api`-derive-macro service-bus framework: the core talks to each
//! collaborator over its own dedicated descriptor, not a shared message bus.

use secp256k1::PublicKey;

use crate::channel::htlc::WhyBad;
use crate::channel::state::ChannelState;

/// Messages the master sends to the core (§6).
#[derive(Clone, Debug, StrictEncode, StrictDecode)]
pub enum MasterToCore {
    /// One-time snapshot sufficient to reconstruct commitment bookkeeping.
    ChannelInit(Box<ChannelState>),
    /// Current confirmation count and, once known, the short_channel_id.
    FundingDepth { confirmations: u32, short_channel_id: Option<p2p::bolt::ShortChannelId> },
    /// Master asks the core to add an outbound HTLC.
    OfferHtlc {
        amount_msat: u64,
        payment_hash: bitcoin::hashes::sha256::Hash,
        cltv_expiry: u32,
        onion_routing_packet: Vec<u8>,
    },
    /// Master supplies the preimage to settle an inbound HTLC.
    FulfillHtlc { htlc_id: u64, preimage: [u8; 32] },
    /// Master supplies the failure payload to settle an inbound HTLC.
    FailHtlc { htlc_id: u64, failure_payload: Vec<u8> },
    /// Allowable feerate band for `update_fee`.
    Feerates { feerate_min_per_kw: u32, feerate_max_per_kw: u32 },
    /// Per-channel routing fees, independent of the feerate band.
    SpecificFeerates { base_fee_msat: u32, proportional_fee_ppm: u32 },
    /// Master requests cooperative close be initiated.
    SendShutdown,
    /// Reply to a `SendingCommitsig`; must arrive before the wire send.
    SendingCommitsigReply,
    /// Reply to a `GotCommitsig`; must arrive before `revoke_and_ack`.
    GotCommitsigReply,
    /// Reply to a `GotRevoke`.
    GotRevokeReply,
}

/// Messages the core sends to the master (§6).
#[derive(Clone, Debug, StrictEncode, StrictDecode)]
pub enum CoreToMaster {
    /// Success or failure reply to `OfferHtlc`.
    OfferHtlcReply(Result<u64, OfferHtlcFailure>),
    /// Sent to master before emitting `commitment_signed` on the wire;
    /// the core blocks for `SendingCommitsigReply` (persist-then-send,
    /// §5).
    SendingCommitsig {
        next_index_remote: u64,
        commitment_signature: Vec<u8>,
        htlc_signatures: Vec<Vec<u8>>,
    },
    /// Sent to master before emitting `revoke_and_ack`; the core blocks
    /// for `GotCommitsigReply`.
    GotCommitsig {
        next_index_local: u64,
        new_htlcs: Vec<NewHtlc>,
        fulfilled: Vec<(u64, [u8; 32])>,
        failed: Vec<(u64, Vec<u8>)>,
    },
    /// Sent to master after applying an inbound `revoke_and_ack`.
    GotRevoke { revocations_received: u64 },
    /// One-way notification that REMOTE sent `funding_locked`.
    GotFundingLocked,
    /// One-way notification that announcement signatures completed.
    GotAnnouncement,
    /// One-way notification that REMOTE sent `shutdown`.
    GotShutdown,
    /// Final message before the core exits cleanly; descriptors are handed
    /// back to the master out of band (§6).
    ShutdownComplete,
    /// Data-loss-protect proved the remote is ahead of us (§7 kind 2).
    FailFallenBehind { remote_current_per_commit: PublicKey },
}

/// A newly added HTLC as reported in `GotCommitsig` (§4.3 step 5).
#[derive(Clone, Debug, StrictEncode, StrictDecode)]
pub struct NewHtlc {
    pub htlc_id: u64,
    pub amount_msat: u64,
    pub payment_hash: bitcoin::hashes::sha256::Hash,
    pub cltv_expiry: u32,
    pub shared_secret: Option<[u8; 32]>,
    pub why_bad: Option<WhyBad>,
}

/// Transient failure reasons for `OfferHtlc` (§7 kind 4): these reply to
/// master with an on-wire failure code, leaving channel state untouched.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display, Error, StrictEncode, StrictDecode)]
#[display(doc_comments)]
pub enum OfferHtlcFailure {
    /// requested cltv_expiry is not a sane block height
    InvalidExpiry,
    /// offering this HTLC would exceed the channel's committed capacity
    CapacityExceeded,
    /// offered amount is below the negotiated minimum
    BelowMinimum,
    /// offering this HTLC would exceed the negotiated accepted-HTLC count
    TooManyHtlcs,
}

/// Requests the core sends to the signing oracle (§6). Strictly
/// synchronous: no interleaving is tolerated on this descriptor (§5).
#[derive(Clone, Debug, StrictEncode, StrictDecode)]
pub enum SignerRequest {
    /// ECDH against the remote's ephemeral onion key.
    Ecdh { remote_ephemeral_pubkey: PublicKey },
    /// Requests per-commitment point N; the signer also returns the
    /// secret for N - 2 when N >= 2 (§4.3, "tie-breaks").
    GetPerCommitmentPoint { index: u64 },
    SignRemoteCommitmentTx { unsigned_tx_bytes: Vec<u8> },
    SignRemoteHtlcTx { unsigned_tx_bytes: Vec<u8>, htlc_index: u32 },
    AnnouncementSigReq { announcement_bytes: Vec<u8> },
    CheckFutureSecret { index: u64, claimed_secret: [u8; 32] },
}

/// Replies from the signing oracle (§6).
#[derive(Clone, Debug, StrictEncode, StrictDecode)]
pub enum SignerReply {
    Ecdh { shared_secret: [u8; 32] },
    PerCommitmentPoint { point: PublicKey, prior_secret: Option<[u8; 32]> },
    Signature { signature: Vec<u8> },
    AnnouncementSigs { node_signature: Vec<u8>, bitcoin_signature: Vec<u8> },
    FutureSecretValid(bool),
}

/// Requests the core sends to the gossip service (§6).
#[derive(Clone, Debug, StrictEncode, StrictDecode)]
pub enum GossipRequest {
    GetUpdate { short_channel_id: p2p::bolt::ShortChannelId },
    LocalAddChannel { short_channel_id: p2p::bolt::ShortChannelId },
    LocalChannelUpdate { short_channel_id: p2p::bolt::ShortChannelId, disabled: bool },
}

/// Replies from the gossip service (§6). Any other inbound gossip traffic
/// received while awaiting one of these is forwarded inline, not queued
/// (§5, "gossip round-trip").
#[derive(Clone, Debug, StrictEncode, StrictDecode)]
pub enum GossipReply {
    ChannelUpdate(Vec<u8>),
    Ack,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn offer_htlc_reply_round_trips_through_result() {
        let ok: Result<u64, OfferHtlcFailure> = Ok(42);
        assert_eq!(ok, Ok(42));
        let err: Result<u64, OfferHtlcFailure> =
            Err(OfferHtlcFailure::BelowMinimum);
        assert_eq!(err, Err(OfferHtlcFailure::BelowMinimum));
    }
}
