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

use bitcoin::hashes::sha256;

/// ECDH shared secret derived with the onion's ephemeral key, used to peel
/// one layer of the Sphinx packet and to obfuscate failure messages on the
/// way back (BOLT-4). Kept as a raw 32-byte secret rather than re-deriving
/// it: the derivation itself is a signer operation (§6).
pub type SharedSecret = [u8; 32];

/// Eleven-state HTLC lifecycle (§3). The cartesian shape is
/// `{SENT,RCVD} x {ADD,REMOVE} x {HTLC,COMMIT,ACK_COMMIT}`; we collapse the
/// two symmetric `*_REMOVE_ACK_COMMIT` states into the shared terminal
/// below, since once a removal has been revoked by both sides there is
/// nothing left to track but deletion -- unlike an addition, which still
/// has to survive to be spent or refunded on-chain.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display)]
#[derive(StrictEncode, StrictDecode)]
pub enum HtlcState {
    /// We added this HTLC locally; not yet included in any commitment.
    #[display("SENT_ADD_HTLC")]
    SentAddHtlc,
    /// Included in our outstanding (unrevoked) commitment to the remote.
    #[display("SENT_ADD_COMMIT")]
    SentAddCommit,
    /// Included in and revoked on both commitments; awaiting resolution.
    #[display("SENT_ADD_ACK_COMMIT")]
    SentAddAckCommit,

    /// Peer added this HTLC; not yet included in any commitment.
    #[display("RCVD_ADD_HTLC")]
    RcvdAddHtlc,
    /// Included in the remote's outstanding commitment to us.
    #[display("RCVD_ADD_COMMIT")]
    RcvdAddCommit,
    /// Included in and revoked on both commitments; awaiting resolution.
    #[display("RCVD_ADD_ACK_COMMIT")]
    RcvdAddAckCommit,

    /// We are removing (fulfilling/failing) an HTLC we had received.
    #[display("SENT_REMOVE_HTLC")]
    SentRemoveHtlc,
    /// The removal is included in our outstanding commitment.
    #[display("SENT_REMOVE_COMMIT")]
    SentRemoveCommit,

    /// The peer is removing an HTLC we had sent.
    #[display("RCVD_REMOVE_HTLC")]
    RcvdRemoveHtlc,
    /// The removal is included in the remote's outstanding commitment.
    #[display("RCVD_REMOVE_COMMIT")]
    RcvdRemoveCommit,

    /// Both commitments have dropped this HTLC and both revocations have
    /// landed; the master has been informed via `got_revoke` and the HTLC
    /// is eligible for deletion.
    #[display("IRREVOCABLY_COMMITTED")]
    IrrevocablyCommitted,
}

impl HtlcState {
    /// True once both sides' commitments and revocations have settled this
    /// HTLC and it is only waiting to be dropped from the map.
    pub fn is_resolved(self) -> bool {
        matches!(self, HtlcState::IrrevocablyCommitted)
    }
}

/// Reason an inbound HTLC could not be forwarded/accepted, computed at
/// `update_add_htlc` time but not reported to the peer until the HTLC is
/// irrevocably committed (§4.2) -- reporting earlier would leak information
/// about in-flight HTLCs to an observer of channel traffic.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Display)]
#[derive(StrictEncode, StrictDecode)]
pub enum WhyBad {
    /// onion HMAC failed to verify
    InvalidOnionHmac,
    /// onion version byte not recognized
    InvalidOnionVersion,
    /// ECDH with the onion ephemeral key failed
    InvalidOnionKey,
    /// amount or expiry in the decoded payload did not match the HTLC
    FinalIncorrectDetails,
}

/// An in-flight HTLC and everything the core tracks about it (§3).
#[derive(Clone, Debug)]
#[derive(StrictEncode, StrictDecode)]
pub struct Htlc {
    /// Peer-chosen on receive, locally allocated monotonically on send.
    pub id: u64,
    pub amount_msat: u64,
    pub payment_hash: sha256::Hash,
    pub cltv_expiry: u32,
    /// 1366-byte onion routing packet, opaque to us until decoded.
    pub onion_routing_packet: Vec<u8>,
    pub state: HtlcState,
    /// Shared secret derived via signer ECDH once the onion is processed;
    /// absent if decoding failed outright (malformed onion, §8 scenario 6).
    pub shared_secret: Option<SharedSecret>,
    /// Set once decoding failed; mutually exclusive with a later fulfilment.
    pub why_bad: Option<WhyBad>,
    /// Set once the master or the peer supplies the preimage.
    pub preimage: Option<[u8; 32]>,
    /// Set once the master or the peer supplies a failure payload.
    pub failure_payload: Option<Vec<u8>>,
}

impl Htlc {
    /// Constructs a freshly-received HTLC, not yet decoded.
    pub fn received(
        id: u64,
        amount_msat: u64,
        payment_hash: sha256::Hash,
        cltv_expiry: u32,
        onion_routing_packet: Vec<u8>,
    ) -> Self {
        Htlc {
            id,
            amount_msat,
            payment_hash,
            cltv_expiry,
            onion_routing_packet,
            state: HtlcState::RcvdAddHtlc,
            shared_secret: None,
            why_bad: None,
            preimage: None,
            failure_payload: None,
        }
    }

    /// Constructs a freshly-offered (outbound) HTLC.
    pub fn offered(
        id: u64,
        amount_msat: u64,
        payment_hash: sha256::Hash,
        cltv_expiry: u32,
        onion_routing_packet: Vec<u8>,
    ) -> Self {
        Htlc {
            id,
            amount_msat,
            payment_hash,
            cltv_expiry,
            onion_routing_packet,
            state: HtlcState::SentAddHtlc,
            shared_secret: None,
            why_bad: None,
            preimage: None,
            failure_payload: None,
        }
    }

    /// Records the result of onion processing (§4.2, `update_add_htlc`).
    pub fn attach_onion_result(
        &mut self,
        shared_secret: SharedSecret,
        why_bad: Option<WhyBad>,
    ) {
        self.shared_secret = Some(shared_secret);
        self.why_bad = why_bad;
    }

    pub fn fulfill(&mut self, preimage: [u8; 32]) {
        self.preimage = Some(preimage);
    }

    pub fn fail(&mut self, payload: Vec<u8>) {
        self.failure_payload = Some(payload);
    }
}

/// Thin wrapper making payment hash verification explicit: `H(preimage) ==
/// payment_hash`.
pub fn preimage_matches(
    preimage: &[u8; 32],
    payment_hash: &sha256::Hash,
) -> bool {
    use bitcoin::hashes::Hash;
    sha256::Hash::hash(preimage).into_inner() == payment_hash.into_inner()
}

#[cfg(test)]
mod test {
    use bitcoin::hashes::Hash;

    use super::*;

    #[test]
    fn irrevocably_committed_is_resolved() {
        assert!(HtlcState::IrrevocablyCommitted.is_resolved());
        assert!(!HtlcState::SentAddCommit.is_resolved());
    }

    #[test]
    fn preimage_must_hash_to_payment_hash() {
        let preimage = [0x01u8; 32];
        let hash = sha256::Hash::hash(&preimage);
        assert!(preimage_matches(&preimage, &hash));
        let wrong = [0x02u8; 32];
        assert!(!preimage_matches(&wrong, &hash));
    }

    #[test]
    fn malformed_onion_leaves_htlc_pending_without_wire_failure() {
        let mut htlc = Htlc::received(
            7,
            1_000_000,
            sha256::Hash::hash(&[0x01u8; 32]),
            144,
            vec![0u8; 1366],
        );
        htlc.attach_onion_result([0u8; 32], Some(WhyBad::InvalidOnionHmac));
        assert_eq!(htlc.why_bad, Some(WhyBad::InvalidOnionHmac));
        assert!(htlc.failure_payload.is_none());
    }
}
