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

use crate::channel::htlc::{Htlc, WhyBad};

/// Internal failure codes that require a fresh `channel_update` embedded in
/// the wire payload (§4.6). Codes not listed here carry no channel_update.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
pub enum FailCode {
    #[display("temporary_channel_failure")]
    TemporaryChannelFailure,
    #[display("amount_below_minimum")]
    AmountBelowMinimum,
    #[display("fee_insufficient")]
    FeeInsufficient,
    #[display("incorrect_cltv_expiry")]
    IncorrectCltvExpiry,
    #[display("expiry_too_soon")]
    ExpiryTooSoon,
    #[display("temporary_node_failure")]
    TemporaryNodeFailure,
    #[display("permanent_channel_failure")]
    PermanentChannelFailure,
}

impl FailCode {
    /// Whether this failure's wire payload must embed a `channel_update`.
    pub fn needs_channel_update(self) -> bool {
        matches!(
            self,
            FailCode::TemporaryChannelFailure
                | FailCode::AmountBelowMinimum
                | FailCode::FeeInsufficient
                | FailCode::IncorrectCltvExpiry
                | FailCode::ExpiryTooSoon
        )
    }
}

/// Builds the on-the-wire failure payload for a rejected or failed HTLC
/// (§4.6, "make failmsg"). `channel_update` is whatever gossip returned for
/// this failure's short_channel_id, already stripped of any stray two-byte
/// type-length prefix some peers interoperate badly with.
pub fn make_failmsg(code: FailCode, channel_update: Option<&[u8]>) -> Vec<u8> {
    let mut payload = (code as u16).to_be_bytes().to_vec();
    if code.needs_channel_update() {
        if let Some(update) = channel_update {
            let update = strip_type_prefix(update);
            payload.extend_from_slice(&(update.len() as u16).to_be_bytes());
            payload.extend_from_slice(update);
        }
    }
    payload
}

/// Strips a spurious two-byte type prefix some implementations prepend to
/// the `channel_update` they hand back to us (§4.6, known interop wart).
fn strip_type_prefix(update: &[u8]) -> &[u8] {
    // A real channel_update always starts with a 64-byte signature; no
    // legitimate message is shorter than 2 bytes, so a leading pair that
    // isn't part of the signature can only be the stray prefix.
    if update.len() > 2 && update[0] == 0x01 && update[1] == 0x02 {
        &update[2..]
    } else {
        update
    }
}

/// The three mutually exclusive ways a removed HTLC settles on the wire
/// (§4.6, "send_fail_or_fulfill"): the choice is entirely determined by
/// what is already recorded on the HTLC.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// Onion parsing failed outright; no shared secret was ever derived.
    Malformed { sha256_of_onion: [u8; 32], failure_code: u16 },
    /// A locally- or upstream-produced failure, obfuscated with the HTLC's
    /// shared secret.
    Failed { reason: Vec<u8> },
    /// The preimage satisfying the payment hash.
    Fulfilled { preimage: [u8; 32] },
}

/// Errors that make an HTLC impossible to resolve with the data at hand;
/// indicates an internal invariant violation (§7, kind 3) since by the time
/// settlement is requested the HTLC must carry exactly one of a why_bad, a
/// failure_payload, or a preimage.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display, Error)]
pub enum ResolutionError {
    /// HTLC has neither a decode failure, a failure payload, nor a preimage
    /// recorded; it cannot yet be resolved
    NotSettled,
}

/// Chooses the resolution for an HTLC the master has asked us to settle
/// (§4.6). Deterministic given the HTLC's stored fields.
pub fn send_fail_or_fulfill(
    htlc: &Htlc,
) -> Result<Resolution, ResolutionError> {
    if let Some(preimage) = htlc.preimage {
        return Ok(Resolution::Fulfilled { preimage });
    }
    if htlc.shared_secret.is_none() {
        let (sha256_of_onion, failure_code) = match htlc.why_bad {
            Some(WhyBad::InvalidOnionHmac) => {
                ([0u8; 32], 0x8000 | 0x2000 | 1)
            }
            Some(WhyBad::InvalidOnionVersion) => {
                ([0u8; 32], 0x8000 | 0x2000 | 2)
            }
            Some(WhyBad::InvalidOnionKey) => ([0u8; 32], 0x8000 | 0x2000 | 3),
            // unrecognized failure codes coerce to temporary_channel_failure
            _ => ([0u8; 32], 0x1000 | 7),
        };
        return Ok(Resolution::Malformed {
            sha256_of_onion,
            failure_code,
        });
    }
    if let Some(ref reason) = htlc.failure_payload {
        return Ok(Resolution::Failed {
            reason: reason.clone(),
        });
    }
    Err(ResolutionError::NotSettled)
}

/// The BADONION bit BOLT-2 requires on every `update_fail_malformed_htlc`
/// failure code.
const BADONION: u16 = 0x8000;

/// `temporary_channel_failure`, the code an unrecognized malformed-failure
/// code coerces to (§4.2, inbound `update_fail_malformed_htlc`).
const TEMPORARY_CHANNEL_FAILURE: u16 = 0x1000 | 7;

/// The only malformed-failure codes BOLT-4 defines.
const KNOWN_MALFORMED_CODES: [u16; 3] = [
    BADONION | 1, // invalid_onion_version
    BADONION | 2, // invalid_onion_hmac
    BADONION | 3, // invalid_onion_key
];

/// Error raised when a peer's `update_fail_malformed_htlc` violates BOLT-2's
/// BADONION requirement.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display, Error)]
#[display(doc_comments)]
pub enum MalformedHtlcError {
    /// update_fail_malformed_htlc failure code {0:#06x} does not have the
    /// BADONION bit set
    BadonionBitMissing(u16),
}

/// Validates an inbound `update_fail_malformed_htlc` failure code (§4.2):
/// the BADONION bit must be set, and any code BOLT-4 does not define is
/// coerced to `temporary_channel_failure` before we forward it upstream.
pub fn validate_malformed_failure_code(
    failure_code: u16,
) -> Result<u16, MalformedHtlcError> {
    if failure_code & BADONION == 0 {
        return Err(MalformedHtlcError::BadonionBitMissing(failure_code));
    }
    if KNOWN_MALFORMED_CODES.contains(&failure_code) {
        Ok(failure_code)
    } else {
        Ok(TEMPORARY_CHANNEL_FAILURE)
    }
}

#[cfg(test)]
mod test {
    use bitcoin::hashes::{sha256, Hash};

    use super::*;

    #[test]
    fn malformed_onion_resolves_as_malformed_with_badonion_bit() {
        let mut htlc = Htlc::received(
            0,
            1_000_000,
            sha256::Hash::hash(&[0u8; 32]),
            144,
            vec![0u8; 1366],
        );
        htlc.attach_onion_result([0u8; 32], Some(WhyBad::InvalidOnionHmac));
        let resolution = send_fail_or_fulfill(&htlc).unwrap();
        match resolution {
            Resolution::Malformed { failure_code, .. } => {
                assert_eq!(failure_code & 0x8000, 0x8000, "BADONION bit set");
            }
            other => panic!("expected Malformed, got {:?}", other),
        }
    }

    #[test]
    fn fulfilled_htlc_resolves_with_preimage() {
        let mut htlc = Htlc::offered(
            0,
            1_000_000,
            sha256::Hash::hash(&[0u8; 32]),
            144,
            vec![0u8; 1366],
        );
        htlc.attach_onion_result([1u8; 32], None);
        htlc.fulfill([7u8; 32]);
        assert_eq!(
            send_fail_or_fulfill(&htlc).unwrap(),
            Resolution::Fulfilled { preimage: [7u8; 32] }
        );
    }

    #[test]
    fn unsettled_htlc_is_an_internal_error() {
        let mut htlc = Htlc::offered(
            0,
            1_000_000,
            sha256::Hash::hash(&[0u8; 32]),
            144,
            vec![0u8; 1366],
        );
        htlc.attach_onion_result([1u8; 32], None);
        assert_eq!(
            send_fail_or_fulfill(&htlc).unwrap_err(),
            ResolutionError::NotSettled
        );
    }

    #[test]
    fn failmsg_embeds_channel_update_when_required() {
        let update = vec![0x01, 0x02, 0xaa, 0xbb];
        let msg =
            make_failmsg(FailCode::TemporaryChannelFailure, Some(&update));
        // stray 2-byte prefix stripped, remaining update length-prefixed
        assert_eq!(&msg[2..4], &[0x00, 0x02]);
        assert_eq!(&msg[4..], &[0xaa, 0xbb]);
    }

    #[test]
    fn failmsg_omits_channel_update_when_not_required() {
        let msg = make_failmsg(FailCode::PermanentChannelFailure, None);
        assert_eq!(msg.len(), 2);
    }

    #[test]
    fn malformed_failure_code_without_badonion_bit_is_rejected() {
        assert_eq!(
            validate_malformed_failure_code(0x0007).unwrap_err(),
            MalformedHtlcError::BadonionBitMissing(0x0007)
        );
    }

    #[test]
    fn known_malformed_failure_codes_pass_through_unchanged() {
        assert_eq!(validate_malformed_failure_code(0x8001).unwrap(), 0x8001);
        assert_eq!(validate_malformed_failure_code(0x8003).unwrap(), 0x8003);
    }

    #[test]
    fn unrecognized_malformed_failure_code_coerces_to_temporary_channel_failure() {
        assert_eq!(
            validate_malformed_failure_code(0x8fff).unwrap(),
            TEMPORARY_CHANNEL_FAILURE
        );
    }
}
