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

use bitcoin::hashes::{sha256, Hash, HashEngine};
use secp256k1::PublicKey;

use crate::channel::lifecycle::Side;

const LOWER_48_BITS: u64 = 0x00_00_FF_FF_FF_FF_FF_FF;

/// Tracks the per-commitment points and revocation accounting for one
/// channel (§3): the point we will use to sign our *next* commitment, the
/// point the remote currently signs against, the previous remote point kept
/// around until its revocation lands, and the running revocation count that
/// the fallen-behind check (§4.4) is built on.
#[derive(Clone, Debug)]
#[derive(StrictEncode, StrictDecode)]
pub struct PerCommitState {
    /// Our own commitment index; bumped every time we produce a new
    /// `commitment_signed`.
    pub local_commitment_number: u64,
    /// The remote's commitment index, as last confirmed by their
    /// `revoke_and_ack`.
    pub remote_commitment_number: u64,
    /// Point we will sign our next commitment with (`next_local_per_commit`
    /// in §3); supplied by the signer.
    pub next_local_per_commit: PublicKey,
    /// Point the remote currently uses to validate our signature over
    /// their commitment (`remote_per_commit` in §3).
    pub remote_per_commit: PublicKey,
    /// The remote's previous per-commitment point, retained until we've
    /// both seen its matching `revoke_and_ack` -- needed to verify a late
    /// `channel_reestablish` claim about our own past state (§4.4).
    pub old_remote_per_commit: Option<PublicKey>,
    /// Count of `revoke_and_ack` messages received from the remote; compared
    /// against their `channel_reestablish.next_revocation_number` claim to
    /// detect a stale local state (§4.4, §8 invariant).
    pub revocations_received: u64,
}

impl PerCommitState {
    pub fn new(
        next_local_per_commit: PublicKey,
        remote_per_commit: PublicKey,
    ) -> Self {
        PerCommitState {
            local_commitment_number: 0,
            remote_commitment_number: 0,
            next_local_per_commit,
            remote_per_commit,
            old_remote_per_commit: None,
            revocations_received: 0,
        }
    }

    /// Records that the remote revoked their previous commitment and handed
    /// us a new point to sign against next.
    pub fn advance_remote(&mut self, new_remote_per_commit: PublicKey) {
        self.old_remote_per_commit = Some(self.remote_per_commit);
        self.remote_per_commit = new_remote_per_commit;
        self.remote_commitment_number += 1;
        self.revocations_received += 1;
    }

    /// Records that we produced and sent a new commitment of our own.
    pub fn advance_local(&mut self, new_next_local_per_commit: PublicKey) {
        self.local_commitment_number += 1;
        self.next_local_per_commit = new_next_local_per_commit;
    }

    /// The 48-bit commitment number obscured per BOLT-3, used as the
    /// `locktime`/`sequence` fields of a commitment transaction. The
    /// transaction itself is built elsewhere (§1); this is the only piece
    /// of that math the core needs, since it must agree with the signer on
    /// which index is being signed.
    pub fn obscured_commitment_number(
        commitment_number: u64,
        opener: Side,
        local_payment_basepoint: &PublicKey,
        remote_payment_basepoint: &PublicKey,
    ) -> u64 {
        let mut engine = sha256::Hash::engine();
        match opener {
            Side::Local => {
                engine.input(&local_payment_basepoint.serialize());
                engine.input(&remote_payment_basepoint.serialize());
            }
            Side::Remote => {
                engine.input(&remote_payment_basepoint.serialize());
                engine.input(&local_payment_basepoint.serialize());
            }
        }
        let obscuring_hash = sha256::Hash::from_engine(engine);

        let mut buf = [0u8; 8];
        buf.copy_from_slice(&obscuring_hash[24..]);
        let obscuring_factor = u64::from_be_bytes(buf) & LOWER_48_BITS;

        (commitment_number & LOWER_48_BITS) ^ obscuring_factor
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use secp256k1::PublicKey;

    use super::*;

    fn pk(hex: &str) -> PublicKey {
        PublicKey::from_str(hex).unwrap()
    }

    #[test]
    fn revocation_count_tracks_received_revoke_and_ack() {
        let p1 = pk(
            "025f7117a78150fe2ef97db7cfc83bd57b2e2c0d0dd25eaf467a4a1c2a45ce1486",
        );
        let p2 = pk(
            "0324653eac434488002cc06bbfb7f10fe18991e35f9fe4302dbea6d2353dc0ab1",
        );
        let mut state = PerCommitState::new(p1, p2);
        assert_eq!(state.revocations_received, 0);
        state.advance_remote(p1);
        assert_eq!(state.revocations_received, 1);
        assert_eq!(state.old_remote_per_commit, Some(p2));
        assert_eq!(state.remote_per_commit, p1);
    }

    #[test]
    fn obscured_commitment_number_matches_known_vector() {
        // BOLT-3 reference test vector.
        let local = pk(
            "034f355bdcb7cc0af728ef3cceb9615d90684bb5b2ca5f859ab0f0b704075871aa",
        );
        let remote = pk(
            "032c0b7cf95324a07d05398b240174dc0c2be444d96b159aa6c7f7b1e668680991",
        );
        let obscured = PerCommitState::obscured_commitment_number(
            42,
            Side::Local,
            &local,
            &remote,
        );
        assert_eq!(obscured, 0x2bb038521914 ^ 42);
    }
}
