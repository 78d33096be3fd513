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

//! Announcement negotiation (§4.5): exchanging the signatures that make a
//! channel publicly routable.

use p2p::bolt::ShortChannelId;

/// What to do once a relevant state change makes announcement negotiation
/// worth reconsidering (§4.5).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AnnouncementStep {
    /// Gate not yet satisfied; nothing to do.
    NotReady,
    /// Publish a local-add-channel and disabled-by-default `channel_update`
    /// to gossip so outgoing payments can use the channel ahead of public
    /// announcement.
    PublishLocalChannel,
    /// Request node/bitcoin signatures from the signer over the canonical
    /// announcement bytes, then emit `announcement_signatures`.
    RequestAndSendOwnSignatures,
    /// Both sides' signatures are present and agree; forward to master and
    /// broadcast the assembled `channel_announcement`.
    BroadcastAnnouncement,
}

/// Error raised when both sides produced signatures but over disagreeing
/// `short_channel_id`s (§4.5, "fail channel otherwise").
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display, Error)]
pub enum AnnouncementError {
    /// local short_channel_id {local} disagrees with remote's {remote}
    ShortChannelIdMismatch { local: ShortChannelId, remote: ShortChannelId },
}

/// Decides the next announcement step given the current gate state (§4.5).
/// `confirmations` is how many confirmations the funding transaction has.
pub fn next_step(
    local_funding_locked: bool,
    remote_funding_locked: bool,
    local_shutdown_sent: bool,
    channel_announces: bool,
    confirmations: u32,
    have_sigs_local: bool,
    have_sigs_remote: bool,
) -> AnnouncementStep {
    let gate = local_funding_locked
        && remote_funding_locked
        && !local_shutdown_sent
        && channel_announces;
    if !gate {
        return AnnouncementStep::NotReady;
    }
    if have_sigs_local && have_sigs_remote {
        return AnnouncementStep::BroadcastAnnouncement;
    }
    if confirmations < MINIMUM_DEPTH {
        return AnnouncementStep::PublishLocalChannel;
    }
    if !have_sigs_local {
        return AnnouncementStep::RequestAndSendOwnSignatures;
    }
    AnnouncementStep::NotReady
}

/// Confirmations required before announcement signatures are requested
/// (§3, "Announcement signatures are born upon reaching 6 confirmations").
pub const MINIMUM_DEPTH: u32 = 6;

/// Validates that both sides agree on the channel's `short_channel_id`
/// before broadcasting the assembled announcement (§4.5).
pub fn check_short_channel_ids_agree(
    local: ShortChannelId,
    remote: ShortChannelId,
) -> Result<(), AnnouncementError> {
    if local == remote {
        Ok(())
    } else {
        Err(AnnouncementError::ShortChannelIdMismatch { local, remote })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn not_ready_until_both_funding_locked() {
        let step = next_step(true, false, false, true, 10, false, false);
        assert_eq!(step, AnnouncementStep::NotReady);
    }

    #[test]
    fn not_ready_when_shutdown_already_sent() {
        let step = next_step(true, true, true, true, 10, false, false);
        assert_eq!(step, AnnouncementStep::NotReady);
    }

    #[test]
    fn not_ready_when_announce_bit_unset() {
        let step = next_step(true, true, false, false, 10, false, false);
        assert_eq!(step, AnnouncementStep::NotReady);
    }

    #[test]
    fn publishes_local_channel_before_depth_reached() {
        let step = next_step(true, true, false, true, 3, false, false);
        assert_eq!(step, AnnouncementStep::PublishLocalChannel);
    }

    #[test]
    fn requests_own_signatures_once_depth_reached() {
        let step = next_step(true, true, false, true, 6, false, false);
        assert_eq!(step, AnnouncementStep::RequestAndSendOwnSignatures);
    }

    #[test]
    fn broadcasts_once_both_sigs_present() {
        let step = next_step(true, true, false, true, 6, true, true);
        assert_eq!(step, AnnouncementStep::BroadcastAnnouncement);
    }

    #[test]
    fn waits_when_only_local_sig_present() {
        let step = next_step(true, true, false, true, 6, true, false);
        assert_eq!(step, AnnouncementStep::NotReady);
    }

    #[test]
    fn matching_short_channel_ids_pass() {
        let scid = ShortChannelId::new(700_000, 1, 0).unwrap();
        assert!(check_short_channel_ids_agree(scid, scid).is_ok());
    }

    #[test]
    fn mismatched_short_channel_ids_fail_the_channel() {
        let a = ShortChannelId::new(700_000, 1, 0).unwrap();
        let b = ShortChannelId::new(700_001, 2, 0).unwrap();
        assert!(check_short_channel_ids_agree(a, b).is_err());
    }
}
