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

use std::ops::Range;

/// BOLT-3 dust limit, used as a sanity floor when the master hands us
/// parameters it negotiated during channel opening.
pub const BOLT3_DUST_LIMIT: u64 = 354;

/// Errors raised while enforcing the parameter bounds the master supplies
/// for an already-open channel (the core never negotiates `open_channel` /
/// `accept_channel` itself — that happened before this daemon was started).
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, Debug, Display, Error, StrictEncode,
    StrictDecode
)]
#[display(doc_comments)]
pub enum PolicyError {
    /// proposed fee rate {proposed} sat/kw is outside of the band
    /// ({lowest_accepted}..{highest_accepted} sat/kw) supplied by the
    /// master; rejecting `update_fee` according to BOLT-2
    FeeRateUnreasonable {
        proposed: u32,
        lowest_accepted: u32,
        highest_accepted: u32,
    },

    /// `update_fee` received while the local side is the channel funder;
    /// only the funder may set the feerate
    FeeFromNonFunder,

    /// offered HTLC amount {proposed} msat is below the minimum
    /// {allowed_minimum} msat negotiated for this channel
    HtlcBelowMinimum { proposed: u64, allowed_minimum: u64 },

    /// accepting this HTLC would push the in-flight total above the
    /// negotiated maximum of {allowed_maximum} msat
    HtlcValueInFlightExceeded { allowed_maximum: u64 },

    /// accepting this HTLC would exceed the negotiated limit of
    /// {allowed_maximum} accepted HTLCs
    MaxAcceptedHtlcsExceeded { allowed_maximum: u16 },

    /// `cltv_expiry` {proposed} is not a sane block height
    CltvExpiryUnreasonable { proposed: u32 },
}

/// Feerate and HTLC-acceptance bounds as supplied by the master via the
/// `feerates` / `specific_feerates` messages (§6). These are never chosen
/// by the core itself -- it only enforces them.
#[derive(Clone, Eq, PartialEq, Hash, Debug, StrictEncode, StrictDecode)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
pub struct Policy {
    /// Acceptable feerate band for `update_fee`, in sat/kw.
    pub feerate_per_kw_range: Range<u32>,
    /// Smallest value HTLC this node will accept, in msat.
    pub htlc_minimum_msat: u64,
    /// Maximum inbound HTLC value in flight, in msat.
    pub max_htlc_value_in_flight_msat: u64,
    /// Maximum number of HTLCs this node will accept concurrently.
    pub max_accepted_htlcs: u16,
    /// Dust limit negotiated for this channel, in satoshis.
    pub dust_limit_satoshis: u64,
}

impl Default for Policy {
    fn default() -> Policy {
        Policy {
            feerate_per_kw_range: 1..1000,
            htlc_minimum_msat: 1,
            max_htlc_value_in_flight_msat: 1_000_000_000,
            max_accepted_htlcs: 483,
            dust_limit_satoshis: BOLT3_DUST_LIMIT,
        }
    }
}

impl Policy {
    /// Validates a peer-proposed `update_fee` rate against the band and the
    /// local funder/non-funder role (§4.2).
    pub fn validate_update_fee(
        &self,
        proposed: u32,
        we_are_funder: bool,
    ) -> Result<(), PolicyError> {
        if we_are_funder {
            return Err(PolicyError::FeeFromNonFunder);
        }
        if !self.feerate_per_kw_range.contains(&proposed) {
            return Err(PolicyError::FeeRateUnreasonable {
                proposed,
                lowest_accepted: self.feerate_per_kw_range.start,
                highest_accepted: self.feerate_per_kw_range.end,
            });
        }
        Ok(())
    }

    /// Validates an inbound `update_add_htlc` against negotiated limits,
    /// given the amount already in flight and the count already accepted.
    pub fn validate_add_htlc(
        &self,
        amount_msat: u64,
        cltv_expiry: u32,
        in_flight_msat_after: u64,
        accepted_count_after: u16,
    ) -> Result<(), PolicyError> {
        if amount_msat < self.htlc_minimum_msat {
            return Err(PolicyError::HtlcBelowMinimum {
                proposed: amount_msat,
                allowed_minimum: self.htlc_minimum_msat,
            });
        }
        if in_flight_msat_after > self.max_htlc_value_in_flight_msat {
            return Err(PolicyError::HtlcValueInFlightExceeded {
                allowed_maximum: self.max_htlc_value_in_flight_msat,
            });
        }
        if accepted_count_after > self.max_accepted_htlcs {
            return Err(PolicyError::MaxAcceptedHtlcsExceeded {
                allowed_maximum: self.max_accepted_htlcs,
            });
        }
        // BOLT-2: MUST fail the channel if `cltv_expiry` is unreasonably far
        // in the future; we use the same 500,000,000 threshold the source
        // uses to distinguish block height from unix time.
        if cltv_expiry >= 500_000_000 {
            return Err(PolicyError::CltvExpiryUnreasonable {
                proposed: cltv_expiry,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fee_from_non_funder_rejected() {
        let policy = Policy::default();
        assert_eq!(
            policy.validate_update_fee(500, true),
            Err(PolicyError::FeeFromNonFunder)
        );
    }

    #[test]
    fn fee_out_of_band_rejected() {
        let policy = Policy::default();
        let err = policy.validate_update_fee(2000, false).unwrap_err();
        assert_eq!(
            err,
            PolicyError::FeeRateUnreasonable {
                proposed: 2000,
                lowest_accepted: 1,
                highest_accepted: 1000,
            }
        );
    }

    #[test]
    fn fee_within_band_for_non_funder_accepted() {
        let policy = Policy::default();
        assert!(policy.validate_update_fee(250, false).is_ok());
    }

    #[test]
    fn htlc_below_minimum_rejected() {
        let mut policy = Policy::default();
        policy.htlc_minimum_msat = 1000;
        assert_eq!(
            policy.validate_add_htlc(999, 144, 999, 1),
            Err(PolicyError::HtlcBelowMinimum {
                proposed: 999,
                allowed_minimum: 1000,
            })
        );
    }

    #[test]
    fn htlc_in_flight_exceeded_rejected() {
        let mut policy = Policy::default();
        policy.max_htlc_value_in_flight_msat = 1000;
        assert_eq!(
            policy.validate_add_htlc(500, 144, 1500, 1),
            Err(PolicyError::HtlcValueInFlightExceeded {
                allowed_maximum: 1000,
            })
        );
    }

    #[test]
    fn max_accepted_htlcs_exceeded_rejected() {
        let mut policy = Policy::default();
        policy.max_accepted_htlcs = 1;
        assert_eq!(
            policy.validate_add_htlc(500, 144, 500, 2),
            Err(PolicyError::MaxAcceptedHtlcsExceeded { allowed_maximum: 1 })
        );
    }

    #[test]
    fn unreasonable_cltv_expiry_rejected() {
        let policy = Policy::default();
        assert_eq!(
            policy.validate_add_htlc(500, 500_000_000, 500, 1),
            Err(PolicyError::CltvExpiryUnreasonable {
                proposed: 500_000_000
            })
        );
    }
}
