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

//! Orchestration (§4, §5): wires the decision functions in [`machine`],
//! [`commitment`], [`reestablish`], [`announcement`], [`shutdown`], and
//! [`forwarding`] to the real descriptor clients. The modules above answer
//! "what should happen"; this one is the only place that actually makes it
//! happen -- reading off the peer descriptor, round-tripping the signer and
//! master, and writing back to the peer.
//!
//! [`machine`]: crate::channel::machine
//! [`commitment`]: crate::channel::commitment
//! [`reestablish`]: crate::channel::reestablish
//! [`announcement`]: crate::channel::announcement
//! [`shutdown`]: crate::channel::shutdown
//! [`forwarding`]: crate::channel::forwarding

use std::io::{Read, Write};

use amplify::Wrapper;
use bitcoin::hashes::{sha256, Hash};
use lightning_encoding::LightningEncode;
use p2p::bolt::Messages;
use secp256k1::ecdsa::Signature;
use secp256k1::{PublicKey, SecretKey};

use crate::channel::commitment::{
    self, ApplyPeerCommitOutcome, SendCommitAbort,
};
use crate::channel::forwarding;
use crate::channel::htlc::{Htlc, HtlcState};
use crate::channel::lifecycle::{Lifecycle, Side};
use crate::channel::machine::{ChannelMachine, PeerMessageKind};
use crate::channel::reestablish::{self, CommitAction, RevokeAction};
use crate::channel::{announcement, shutdown};
use crate::config::Config;
use crate::daemon::messages::{MasterToCore, NewHtlc, OfferHtlcFailure};
use crate::daemon::{GossipClient, MasterClient, PeerClient, SignerClient};
use crate::error::Error;

/// Encodes any wire-typed field via its own `LightningEncode` impl. Used to
/// bridge wire newtypes (`HashLock`, `HashPreimage`, the onion packet) we
/// cannot otherwise construct or inspect, since `UpdateAddHtlc` as a whole
/// derives `LightningEncode`/`LightningDecode` and therefore so does every
/// field on it.
fn encode_to_bytes<E: LightningEncode>(value: &E) -> Vec<u8> {
    let mut buf = Vec::new();
    value
        .lightning_encode(&mut buf)
        .expect("encoding to a Vec<u8> is infallible");
    buf
}

/// The decode-side counterpart of [`encode_to_bytes`]: reconstructs a
/// wire-typed field (`HashLock`, `HashPreimage`, the onion packet) from its
/// canonical bytes via the same derived `LightningDecode` impl, with the
/// target type inferred from the call site.
fn decode_from_bytes<D: lightning_encoding::LightningDecode>(bytes: &[u8]) -> Result<D, Error> {
    let mut cursor = std::io::Cursor::new(bytes);
    D::lightning_decode(&mut cursor)
        .map_err(|err| Error::Internal(format!("failed to decode wire field: {}", err)))
}

/// Our signer's internal convention for serialized signatures (§6): DER,
/// matching `secp256k1::ecdsa::Signature::serialize_der`. This is purely an
/// internal contract between the core and the signer descriptor, not a wire
/// format.
fn der_signature(bytes: &[u8]) -> Result<Signature, Error> {
    Signature::from_der(bytes)
        .map_err(|err| Error::Internal(format!("signer returned a malformed signature: {}", err)))
}

/// Classifies a decoded wire message into the dispatch kinds the state
/// machine's pre-`funding_locked` allowlist discriminates on (§4.2).
/// `channel_reestablish` is deliberately absent: it is only ever expected
/// while the channel's lifecycle is [`Lifecycle::Reestablishing`] and is
/// handled by [`handle_channel_reestablish`] before ordinary dispatch
/// begins.
fn classify(msg: &Messages) -> PeerMessageKind {
    match msg {
        Messages::FundingLocked(_) => PeerMessageKind::FundingLocked,
        Messages::AnnouncementSignatures(_) => PeerMessageKind::AnnouncementSignatures,
        Messages::UpdateAddHtlc(_) => PeerMessageKind::UpdateAddHtlc,
        Messages::UpdateFee(_) => PeerMessageKind::UpdateFee,
        Messages::CommitmentSigned(_) => PeerMessageKind::CommitmentSigned,
        Messages::RevokeAndAck(_) => PeerMessageKind::RevokeAndAck,
        Messages::UpdateFulfillHtlc(_) => PeerMessageKind::UpdateFulfillHtlc,
        Messages::UpdateFailHtlc(_) => PeerMessageKind::UpdateFailHtlc,
        Messages::UpdateFailMalformedHtlc(_) => PeerMessageKind::UpdateFailMalformedHtlc,
        Messages::Shutdown(_) => PeerMessageKind::Shutdown,
        Messages::Pong(_) => PeerMessageKind::Pong,
        _ => PeerMessageKind::Other,
    }
}

/// Entry point for one inbound peer message (§4.2, §5). Enforces the
/// pre-`funding_locked` allowlist and the premature-message cap, then routes
/// to the handler for its kind. Messages this daemon has no handler for
/// (`Ping`, gossip-query traffic, etc.) are acknowledged by falling through
/// silently once allowed.
#[allow(clippy::too_many_arguments)]
pub fn dispatch_peer_message<M, S, G, P>(
    machine: &mut ChannelMachine,
    msg: Messages,
    master: &mut MasterClient<M>,
    signer: &mut SignerClient<S>,
    gossip: &mut GossipClient<G>,
    peer: &mut PeerClient<P>,
) -> Result<(), Error>
where
    M: Read + Write,
    S: Read + Write,
    G: Read + Write,
    P: Read + Write,
{
    let kind = classify(&msg);
    machine.check_message_allowed(kind)?;
    if !machine.state.is_funding_locked() {
        machine.premature_messages.record()?;
    }

    match msg {
        Messages::FundingLocked(m) => {
            if machine.on_funding_locked(m.next_per_commitment_point)
                == crate::channel::machine::FundingLockedOutcome::Applied
            {
                master.got_funding_locked()?;
                maybe_advance_announcement(machine, signer, gossip, peer, 0)?;
            }
            Ok(())
        }
        Messages::AnnouncementSignatures(m) => {
            handle_announcement_signatures(machine, m, signer, master, gossip, peer)
        }
        Messages::UpdateAddHtlc(m) => handle_update_add_htlc(machine, m, signer),
        Messages::UpdateFulfillHtlc(m) => handle_update_fulfill_htlc(machine, m),
        Messages::UpdateFailHtlc(m) => handle_update_fail_htlc(machine, m),
        Messages::UpdateFailMalformedHtlc(m) => handle_update_fail_malformed_htlc(machine, m),
        Messages::UpdateFee(m) => handle_update_fee(machine, m),
        Messages::CommitmentSigned(m) => {
            handle_peer_commit_sig(machine, m, signer, master, peer)
        }
        Messages::RevokeAndAck(m) => handle_revoke_and_ack(machine, m, master),
        Messages::Shutdown(m) => handle_shutdown(machine, m, gossip, master, peer),
        _ => Ok(()),
    }
}

fn handle_update_add_htlc<S: Read + Write>(
    machine: &mut ChannelMachine,
    msg: p2p::bolt::UpdateAddHtlc,
    signer: &mut SignerClient<S>,
) -> Result<(), Error> {
    let state = &mut machine.state;

    let hash_bytes = encode_to_bytes(&msg.payment_hash);
    let payment_hash = sha256::Hash::from_slice(&hash_bytes)
        .map_err(|err| Error::Internal(format!("malformed payment_hash: {}", err)))?;
    let onion_routing_packet = encode_to_bytes(&msg.onion_routing_packet);

    let mut htlc = Htlc::received(
        msg.htlc_id,
        msg.amount_msat,
        payment_hash,
        msg.cltv_expiry,
        onion_routing_packet.clone(),
    );

    let in_flight_after = state.total_in_flight_msat(Side::Remote) + msg.amount_msat;
    let accepted_after = state.accepted_htlc_count() + 1;
    state.policy.validate_add_htlc(
        msg.amount_msat,
        msg.cltv_expiry,
        in_flight_after,
        accepted_after,
    )?;

    // BOLT-4 packet layout: 1 version byte, then the 33-byte compressed
    // ephemeral pubkey the ECDH is performed against.
    let why_bad = if onion_routing_packet.len() < 34 {
        Some(crate::channel::htlc::WhyBad::InvalidOnionVersion)
    } else {
        None
    };
    let shared_secret = match PublicKey::from_slice(&onion_routing_packet[1..34]) {
        Ok(ephemeral) => signer.ecdh(ephemeral)?,
        Err(_) => [0u8; 32],
    };
    let why_bad = why_bad.or_else(|| {
        if onion_routing_packet.len() < 34 {
            Some(crate::channel::htlc::WhyBad::InvalidOnionKey)
        } else {
            None
        }
    });
    htlc.attach_onion_result(shared_secret, why_bad);

    state.htlcs.insert(htlc.id, htlc);
    Ok(())
}

fn handle_update_fulfill_htlc(
    machine: &mut ChannelMachine,
    msg: p2p::bolt::UpdateFulfillHtlc,
) -> Result<(), Error> {
    let preimage_bytes = encode_to_bytes(&msg.payment_preimage);
    let preimage: [u8; 32] = preimage_bytes
        .try_into()
        .map_err(|_| Error::Internal("payment_preimage did not encode to 32 bytes".into()))?;
    let htlc = machine
        .state
        .htlcs
        .get_mut(&msg.htlc_id)
        .ok_or_else(|| Error::Internal(format!("update_fulfill_htlc for unknown htlc {}", msg.htlc_id)))?;
    if !crate::channel::htlc::preimage_matches(&preimage, &htlc.payment_hash) {
        return Err(Error::Internal(format!(
            "update_fulfill_htlc preimage does not match payment_hash for htlc {}",
            msg.htlc_id
        )));
    }
    htlc.fulfill(preimage);
    Ok(())
}

fn handle_update_fail_htlc(
    machine: &mut ChannelMachine,
    msg: p2p::bolt::UpdateFailHtlc,
) -> Result<(), Error> {
    let htlc = machine
        .state
        .htlcs
        .get_mut(&msg.htlc_id)
        .ok_or_else(|| Error::Internal(format!("update_fail_htlc for unknown htlc {}", msg.htlc_id)))?;
    htlc.fail(msg.reason);
    Ok(())
}

fn handle_update_fail_malformed_htlc(
    machine: &mut ChannelMachine,
    msg: p2p::bolt::UpdateFailMalformedHtlc,
) -> Result<(), Error> {
    let failure_code = forwarding::validate_malformed_failure_code(msg.failure_code)
        .map_err(|err| Error::Internal(err.to_string()))?;
    let htlc = machine
        .state
        .htlcs
        .get_mut(&msg.htlc_id)
        .ok_or_else(|| {
            Error::Internal(format!("update_fail_malformed_htlc for unknown htlc {}", msg.htlc_id))
        })?;
    let mut payload = msg.sha256_of_onion.into_inner().to_vec();
    payload.extend_from_slice(&failure_code.to_be_bytes());
    htlc.fail(payload);
    Ok(())
}

fn handle_update_fee(
    machine: &mut ChannelMachine,
    msg: p2p::bolt::UpdateFee,
) -> Result<(), Error> {
    machine.check_update_fee_allowed()?;
    machine
        .state
        .policy
        .validate_update_fee(msg.feerate_per_kw, machine.state.is_opener)?;
    machine.state.feerate_per_kw = msg.feerate_per_kw;
    Ok(())
}

fn handle_peer_commit_sig<S, M, P>(
    machine: &mut ChannelMachine,
    msg: p2p::bolt::CommitmentSigned,
    signer: &mut SignerClient<S>,
    master: &mut MasterClient<M>,
    peer: &mut PeerClient<P>,
) -> Result<(), Error>
where
    S: Read + Write,
    M: Read + Write,
    P: Read + Write,
{
    let next_index_local = machine.state.per_commit.local_commitment_number + 1;
    let has_changes = machine
        .state
        .htlcs
        .values()
        .any(|h| !h.state.is_resolved());

    commitment::apply_peer_commit(has_changes, next_index_local, &mut machine.last_empty_commitment)
        .map_err(|err| match err {
            commitment::HandlePeerCommitError::RepeatedEmptyCommitment => {
                Error::RepeatedEmptyCommitment
            }
            other => Error::Internal(other.to_string()),
        })?;

    let expected_htlc_sigs = machine
        .state
        .htlcs
        .values()
        .filter(|h| h.state == HtlcState::RcvdAddHtlc || h.state == HtlcState::RcvdAddCommit)
        .count();
    commitment::check_htlc_signature_count(expected_htlc_sigs, msg.htlc_signatures.len())
        .map_err(|err| Error::Internal(err.to_string()))?;

    let mut new_htlcs = Vec::new();
    let mut fulfilled = Vec::new();
    let mut failed = Vec::new();
    for htlc in machine.state.htlcs.values_mut() {
        match htlc.state {
            HtlcState::RcvdAddHtlc => {
                new_htlcs.push(NewHtlc {
                    htlc_id: htlc.id,
                    amount_msat: htlc.amount_msat,
                    payment_hash: htlc.payment_hash,
                    cltv_expiry: htlc.cltv_expiry,
                    shared_secret: htlc.shared_secret,
                    why_bad: htlc.why_bad.clone(),
                });
                htlc.state = HtlcState::RcvdAddCommit;
            }
            HtlcState::SentRemoveHtlc => {
                if let Some(preimage) = htlc.preimage {
                    fulfilled.push((htlc.id, preimage));
                } else if let Some(ref payload) = htlc.failure_payload {
                    failed.push((htlc.id, payload.clone()));
                }
                htlc.state = HtlcState::SentRemoveCommit;
            }
            _ => {}
        }
    }
    master.got_commitsig(next_index_local, new_htlcs, fulfilled, failed)?;

    let (new_point, prior_secret) = signer.get_per_commitment_point(next_index_local + 1)?;
    let per_commitment_secret = prior_secret.ok_or_else(|| {
        Error::Internal("signer did not supply a revocation secret for the superseded commitment".into())
    })?;
    machine.state.per_commit.advance_local(new_point);

    peer.send(&Messages::RevokeAndAck(p2p::bolt::RevokeAndAck {
        channel_id: msg.channel_id,
        per_commitment_secret: SecretKey::from_slice(&per_commitment_secret)
            .map_err(|err| Error::Internal(err.to_string()))?,
        next_per_commitment_point: new_point,
    }))?;
    machine.last_was_revoke = true;
    Ok(())
}

fn handle_revoke_and_ack<M: Read + Write>(
    machine: &mut ChannelMachine,
    msg: p2p::bolt::RevokeAndAck,
    master: &mut MasterClient<M>,
) -> Result<(), Error> {
    let reconstructed = PublicKey::from_secret_key(secp256k1::SECP256K1, &msg.per_commitment_secret);
    let expected = machine
        .state
        .per_commit
        .old_remote_per_commit
        .unwrap_or(machine.state.per_commit.remote_per_commit);
    let secret_reconstructs_old_point = reconstructed == expected;

    machine.on_revoke_and_ack(msg.next_per_commitment_point, secret_reconstructs_old_point)?;
    machine.last_was_revoke = false;

    for htlc in machine.state.htlcs.values_mut() {
        htlc.state = match htlc.state {
            HtlcState::SentAddCommit => HtlcState::SentAddAckCommit,
            HtlcState::RcvdAddCommit => HtlcState::RcvdAddAckCommit,
            HtlcState::SentRemoveCommit | HtlcState::RcvdRemoveCommit => {
                HtlcState::IrrevocablyCommitted
            }
            other => other,
        };
    }
    machine
        .state
        .htlcs
        .retain(|_, htlc| !htlc.state.is_resolved());

    master.got_revoke(machine.state.per_commit.revocations_received)?;
    Ok(())
}

fn handle_shutdown<G, M, P>(
    machine: &mut ChannelMachine,
    msg: p2p::bolt::Shutdown,
    gossip: &mut GossipClient<G>,
    master: &mut MasterClient<M>,
    peer: &mut PeerClient<P>,
) -> Result<(), Error>
where
    G: Read + Write,
    M: Read + Write,
    P: Read + Write,
{
    let effect = shutdown::on_remote_shutdown(machine.state.remote.shutdown_sent);
    shutdown::mark_shutdown_sent(&mut machine.state, Side::Remote);

    if effect.send_disabling_update {
        if let Some(scid) = machine.state.short_channel_id {
            gossip.local_channel_update(scid, true, |_| {})?;
        }
    }
    if effect.notify_master {
        master.got_shutdown()?;
    }
    if effect.queue_local_shutdown && !machine.state.local.shutdown_sent {
        let scriptpubkey = machine
            .state
            .local_keys
            .shutdown_scriptpubkey
            .clone()
            .unwrap_or_default();
        peer.send(&Messages::Shutdown(p2p::bolt::Shutdown {
            channel_id: msg.channel_id,
            scriptpubkey,
        }))?;
        shutdown::mark_shutdown_sent(&mut machine.state, Side::Local);
    }
    Ok(())
}

fn handle_announcement_signatures<S, M, G, P>(
    machine: &mut ChannelMachine,
    msg: p2p::bolt::AnnouncementSignatures,
    signer: &mut SignerClient<S>,
    master: &mut MasterClient<M>,
    gossip: &mut GossipClient<G>,
    peer: &mut PeerClient<P>,
) -> Result<(), Error>
where
    S: Read + Write,
    M: Read + Write,
    G: Read + Write,
    P: Read + Write,
{
    machine.state.remote.have_announcement_sigs = true;
    machine.state.remote.announcement_node_signature = Some(msg.node_signature);
    machine.state.remote.announcement_bitcoin_signature = Some(msg.bitcoin_signature);

    if let Some(local_scid) = machine.state.short_channel_id {
        announcement::check_short_channel_ids_agree(local_scid, msg.short_channel_id)
            .map_err(|err| Error::Internal(err.to_string()))?;
    } else {
        machine.state.short_channel_id = Some(msg.short_channel_id);
    }

    maybe_advance_announcement(machine, signer, gossip, peer, 0)?;
    if machine.state.local.have_announcement_sigs && machine.state.remote.have_announcement_sigs {
        master.got_announcement()?;
        if let Some(scid) = machine.state.short_channel_id {
            gossip.local_add_channel(scid, |_| {})?;
        }
    }
    Ok(())
}

/// Drives §4.5's gate forward by one step if it is ready to advance.
/// `confirmations` is supplied by whatever tracks the funding transaction's
/// depth (out of scope here; callers not wired to a block-height feed pass
/// 0, which simply keeps the gate at [`AnnouncementStep::PublishLocalChannel`]
/// until a real confirmation count is threaded through).
fn maybe_advance_announcement<S, G, P>(
    machine: &mut ChannelMachine,
    signer: &mut SignerClient<S>,
    gossip: &mut GossipClient<G>,
    peer: &mut PeerClient<P>,
    confirmations: u32,
) -> Result<(), Error>
where
    S: Read + Write,
    G: Read + Write,
    P: Read + Write,
{
    let state = &machine.state;
    let channel_announces = state.short_channel_id.is_some();
    let step = announcement::next_step(
        state.local.funding_locked,
        state.remote.funding_locked,
        state.local.shutdown_sent,
        channel_announces,
        confirmations,
        state.local.have_announcement_sigs,
        state.remote.have_announcement_sigs,
    );

    match step {
        announcement::AnnouncementStep::NotReady
        | announcement::AnnouncementStep::BroadcastAnnouncement => Ok(()),
        announcement::AnnouncementStep::PublishLocalChannel => {
            if let Some(scid) = machine.state.short_channel_id {
                gossip.local_add_channel(scid, |_| {})?;
                gossip.local_channel_update(scid, true, |_| {})?;
            }
            Ok(())
        }
        announcement::AnnouncementStep::RequestAndSendOwnSignatures => {
            let scid = machine
                .state
                .short_channel_id
                .ok_or_else(|| Error::Internal("announcement gate reached with no short_channel_id".into()))?;
            let announcement_bytes = encode_to_bytes(&scid);
            let (node_sig, bitcoin_sig) = signer.announcement_sig_req(announcement_bytes)?;
            let node_signature = der_signature(&node_sig)?;
            let bitcoin_signature = der_signature(&bitcoin_sig)?;
            peer.send(&Messages::AnnouncementSignatures(p2p::bolt::AnnouncementSignatures {
                channel_id: machine.state.channel_id,
                short_channel_id: scid,
                node_signature,
                bitcoin_signature,
            }))?;
            machine.state.local.have_announcement_sigs = true;
            machine.state.local.announcement_node_signature = Some(node_signature);
            machine.state.local.announcement_bitcoin_signature = Some(bitcoin_signature);
            Ok(())
        }
    }
}

/// `send_commit` (§4.3): evaluates the guard clauses, and if they pass, asks
/// the signer for fresh commitment and HTLC signatures, persists them with
/// the master ahead of sending, and puts `commitment_signed` on the wire.
/// Returns `true` if a commitment was actually sent.
pub fn send_commit<S, M, P>(
    machine: &mut ChannelMachine,
    signer: &mut SignerClient<S>,
    master: &mut MasterClient<M>,
    peer: &mut PeerClient<P>,
    config: &Config,
    secs_since_last_peer_message: u64,
) -> Result<bool, Error>
where
    S: Read + Write,
    M: Read + Write,
    P: Read + Write,
{
    let next_index_remote = machine.state.per_commit.remote_commitment_number + 1;
    let htlc_set_is_empty = machine.state.htlcs.is_empty();
    let has_pending_changes = machine.state.htlcs.values().any(|h| {
        matches!(
            h.state,
            HtlcState::RcvdAddHtlc | HtlcState::SentAddHtlc | HtlcState::SentRemoveHtlc
        )
    });

    let guard = commitment::check_send_commit_guards(
        machine.state.per_commit.revocations_received,
        next_index_remote,
        machine.state.local.shutdown_sent,
        htlc_set_is_empty,
        secs_since_last_peer_message,
        has_pending_changes,
    );
    match guard {
        Err(SendCommitAbort::AwaitingRevoke) => {
            if machine.awaiting_revoke.record() {
                log::warn!("send_commit: awaiting revoke for {} consecutive attempts", commitment::AWAITING_REVOKE_LOG_THRESHOLD);
            }
            return Ok(false);
        }
        Err(_) => return Ok(false),
        Ok(()) => {}
    }
    machine.awaiting_revoke.reset();

    // No live feerate oracle is wired in; fall back to the configured
    // band's floor, which keeps us compliant with our own policy without
    // ever proposing a rate the peer's `update_fee` validation would reject.
    let desired_feerate_per_kw = config.default_feerate_band.feerate_min_per_kw;
    if let Some(new_rate) = commitment::needs_fee_update(
        machine.state.is_opener,
        desired_feerate_per_kw,
        machine.state.feerate_per_kw,
    ) {
        peer.send(&Messages::UpdateFee(p2p::bolt::UpdateFee {
            channel_id: machine.state.channel_id,
            feerate_per_kw: new_rate,
        }))?;
        machine.state.feerate_per_kw = new_rate;
    }

    // Transaction assembly is delegated to the commitment-transaction
    // builder (§1); this placeholder payload only needs to uniquely
    // identify which index the signer is being asked to sign.
    let unsigned_tx_bytes = commitment_placeholder_bytes(&machine.state, next_index_remote);

    let commitment_signature = signer.sign_remote_commitment_tx(unsigned_tx_bytes.clone())?;
    let relevant_htlcs: Vec<u32> = machine
        .state
        .htlcs
        .values()
        .filter(|h| !h.state.is_resolved())
        .map(|h| h.id as u32)
        .collect();
    let mut htlc_signatures = Vec::with_capacity(relevant_htlcs.len());
    for htlc_index in relevant_htlcs {
        htlc_signatures.push(signer.sign_remote_htlc_tx(unsigned_tx_bytes.clone(), htlc_index)?);
    }

    master.sending_commitsig(next_index_remote, commitment_signature.clone(), htlc_signatures.clone())?;

    let signature = der_signature(&commitment_signature)?;
    let htlc_signatures = htlc_signatures
        .iter()
        .map(|bytes| der_signature(bytes))
        .collect::<Result<Vec<_>, _>>()?;
    peer.send(&Messages::CommitmentSigned(p2p::bolt::CommitmentSigned {
        channel_id: machine.state.channel_id,
        signature,
        htlc_signatures,
    }))?;

    for htlc in machine.state.htlcs.values_mut() {
        htlc.state = match htlc.state {
            HtlcState::RcvdAddHtlc => HtlcState::RcvdAddCommit,
            HtlcState::SentRemoveHtlc => HtlcState::SentRemoveCommit,
            other => other,
        };
    }
    machine.last_was_revoke = false;

    if machine.state.local.shutdown_sent == false
        && master_requests_shutdown(machine)
    {
        // Queuing of an outbound shutdown is driven by a master command
        // (`SendShutdown`), handled where `MasterToCore` messages are
        // dispatched; nothing to do here.
    }

    Ok(true)
}

/// Placeholder hook kept at the send_commit call site: master-initiated
/// shutdown is queued by the `MasterToCore::SendShutdown` handler, not by
/// `send_commit` itself. Always false here; the real flag lives on
/// `ChannelState` once the master round trip sets it.
fn master_requests_shutdown(_machine: &ChannelMachine) -> bool { false }

fn commitment_placeholder_bytes(
    state: &crate::channel::state::ChannelState,
    index: u64,
) -> Vec<u8> {
    let mut buf = encode_to_bytes(&state.channel_id);
    buf.extend_from_slice(&index.to_be_bytes());
    buf
}

/// `channel_reestablish` (§4.4): runs before any other peer traffic and
/// decides whether to retransmit a stale `revoke_and_ack`/`commitment_signed`,
/// detects a fallen-behind condition, and clears the channel back to
/// [`Lifecycle::Active`] once reconciled.
#[allow(clippy::too_many_arguments)]
pub fn handle_channel_reestablish<S, M, P>(
    machine: &mut ChannelMachine,
    msg: p2p::bolt::ChannelReestablish,
    signer: &mut SignerClient<S>,
    master: &mut MasterClient<M>,
    peer: &mut PeerClient<P>,
    config: &Config,
) -> Result<(), Error>
where
    S: Read + Write,
    M: Read + Write,
    P: Read + Write,
{
    let next_index_local = machine.state.per_commit.local_commitment_number + 1;
    let next_index_remote = machine.state.per_commit.remote_commitment_number + 1;

    // All-zero is BOLT's sentinel for "I have no last per-commitment secret
    // yet" (the peer's first reconnect before any commitment was revoked);
    // never feed that to the signer as if it were a real claim.
    let claimed_secret: [u8; 32] = *msg.your_last_per_commitment_secret.as_inner();
    let mut data_loss_protect_checks_out = false;
    if msg.next_revocation_number > next_index_local.saturating_sub(1) && claimed_secret != [0u8; 32] {
        data_loss_protect_checks_out =
            signer.check_future_secret(msg.next_revocation_number, claimed_secret)?;
    }

    let revoke_action = reestablish::decide_revoke_action(
        msg.next_revocation_number,
        next_index_local,
        machine.state.per_commit.revocations_received,
        data_loss_protect_checks_out,
    )?;
    if revoke_action == RevokeAction::FallenBehind {
        master.fail_fallen_behind(msg.my_current_per_commitment_point)?;
        machine.state.lifecycle = Lifecycle::FallenBehind;
        return Ok(());
    }

    reestablish::validate_current_point(
        msg.next_commitment_number,
        machine.state.per_commit.revocations_received,
        &msg.my_current_per_commitment_point,
        machine.state.per_commit.old_remote_per_commit.as_ref(),
        &machine.state.per_commit.remote_per_commit,
    )?;

    let commit_action = reestablish::decide_commit_action(msg.next_commitment_number, next_index_remote)?;

    if reestablish::should_retransmit_funding_locked(next_index_local, msg.next_commitment_number) {
        peer.send(&Messages::FundingLocked(p2p::bolt::FundingLocked {
            channel_id: machine.state.channel_id,
            next_per_commitment_point: machine.state.per_commit.next_local_per_commit,
        }))?;
    }

    let order = reestablish::retransmit_order(machine.last_was_revoke);
    let do_revoke = |machine: &mut ChannelMachine, signer: &mut SignerClient<S>, peer: &mut PeerClient<P>| -> Result<(), Error> {
        if revoke_action != RevokeAction::Retransmit {
            return Ok(());
        }
        // The per-commitment secret for any past index is re-derivable
        // deterministically from the signer's seed, so retransmission needs
        // no extra persistence beyond what PerCommitState already tracks.
        let revoked_index = next_index_local.saturating_sub(1);
        let (_point, prior_secret) = signer.get_per_commitment_point(revoked_index + 1)?;
        let secret = prior_secret.ok_or_else(|| {
            Error::Internal("signer could not re-derive the secret to retransmit".into())
        })?;
        peer.send(&Messages::RevokeAndAck(p2p::bolt::RevokeAndAck {
            channel_id: machine.state.channel_id,
            per_commitment_secret: SecretKey::from_slice(&secret)
                .map_err(|err| Error::Internal(err.to_string()))?,
            next_per_commitment_point: machine.state.per_commit.next_local_per_commit,
        }))
    };
    let do_commit = |machine: &mut ChannelMachine, signer: &mut SignerClient<S>, peer: &mut PeerClient<P>| -> Result<(), Error> {
        if commit_action != CommitAction::Retransmit {
            return Ok(());
        }
        // Nothing has been revoked since we originally signed this index, so
        // the staged HTLC set is unchanged; re-run the same signing step.
        let unsigned_tx_bytes = commitment_placeholder_bytes(&machine.state, next_index_remote);
        let commitment_signature = signer.sign_remote_commitment_tx(unsigned_tx_bytes.clone())?;
        let relevant_htlcs: Vec<u32> = machine
            .state
            .htlcs
            .values()
            .filter(|h| !h.state.is_resolved())
            .map(|h| h.id as u32)
            .collect();
        let mut htlc_signatures = Vec::with_capacity(relevant_htlcs.len());
        for htlc_index in relevant_htlcs {
            htlc_signatures.push(signer.sign_remote_htlc_tx(unsigned_tx_bytes.clone(), htlc_index)?);
        }
        let signature = der_signature(&commitment_signature)?;
        let htlc_signatures = htlc_signatures
            .iter()
            .map(|bytes| der_signature(bytes))
            .collect::<Result<Vec<_>, _>>()?;
        peer.send(&Messages::CommitmentSigned(p2p::bolt::CommitmentSigned {
            channel_id: machine.state.channel_id,
            signature,
            htlc_signatures,
        }))
    };

    match order {
        reestablish::RetransmitOrder::RevokeThenCommit => {
            do_revoke(machine, signer, peer)?;
            do_commit(machine, signer, peer)?;
        }
        reestablish::RetransmitOrder::CommitThenRevoke => {
            do_commit(machine, signer, peer)?;
            do_revoke(machine, signer, peer)?;
        }
    }

    for htlc in machine.state.htlcs.values_mut() {
        if htlc.state == HtlcState::SentRemoveHtlc {
            // Resend of fails/fulfils for HTLCs stuck in SENT_REMOVE_HTLC is
            // driven by the same send_fail_or_fulfill path ordinary settlement
            // uses; nothing extra to do here beyond leaving state untouched
            // so the next send_commit picks it back up.
            let _ = htlc;
        }
    }

    let _ = config;
    machine.state.lifecycle = Lifecycle::Active;
    Ok(())
}

/// Dispatches one command read off the master descriptor (§6). This is the
/// other direction from [`dispatch_peer_message`]: the master drives the
/// core, not the peer. `ChannelInit` and the `*Reply` variants are only ever
/// valid as the answer to a round trip already awaited inline by
/// [`MasterClient::wait_sync_reply`](crate::daemon::MasterClient::wait_sync_reply)
/// and should never reach here; seeing one is a master protocol violation.
pub fn dispatch_master_message<S, G, P>(
    machine: &mut ChannelMachine,
    msg: MasterToCore,
    signer: &mut SignerClient<S>,
    gossip: &mut GossipClient<G>,
    peer: &mut PeerClient<P>,
) -> Result<(), Error>
where
    S: Read + Write,
    G: Read + Write,
    P: Read + Write,
{
    match msg {
        MasterToCore::FundingDepth { confirmations, short_channel_id } => {
            if let Some(scid) = short_channel_id {
                machine.state.short_channel_id = Some(scid);
            }
            maybe_advance_announcement(machine, signer, gossip, peer, confirmations)
        }
        MasterToCore::OfferHtlc { amount_msat, payment_hash, cltv_expiry, onion_routing_packet } => {
            offer_htlc(machine, peer, amount_msat, payment_hash, cltv_expiry, onion_routing_packet)
        }
        MasterToCore::FulfillHtlc { htlc_id, preimage } => {
            let htlc = machine.state.htlcs.get_mut(&htlc_id).ok_or_else(|| {
                Error::Internal(format!("master asked to fulfill unknown htlc {}", htlc_id))
            })?;
            htlc.fulfill(preimage);
            settle_htlc(machine, peer, htlc_id)
        }
        MasterToCore::FailHtlc { htlc_id, failure_payload } => {
            let htlc = machine.state.htlcs.get_mut(&htlc_id).ok_or_else(|| {
                Error::Internal(format!("master asked to fail unknown htlc {}", htlc_id))
            })?;
            htlc.fail(failure_payload);
            settle_htlc(machine, peer, htlc_id)
        }
        MasterToCore::Feerates { feerate_min_per_kw, feerate_max_per_kw } => {
            machine.state.policy.feerate_per_kw_range = feerate_min_per_kw..feerate_max_per_kw;
            Ok(())
        }
        MasterToCore::SpecificFeerates { base_fee_msat, proportional_fee_ppm } => {
            machine.state.base_fee_msat = base_fee_msat;
            machine.state.proportional_fee_ppm = proportional_fee_ppm;
            Ok(())
        }
        MasterToCore::SendShutdown => {
            if !machine.state.local.shutdown_sent {
                let scriptpubkey = machine
                    .state
                    .local_keys
                    .shutdown_scriptpubkey
                    .clone()
                    .unwrap_or_default();
                peer.send(&Messages::Shutdown(p2p::bolt::Shutdown {
                    channel_id: machine.state.channel_id,
                    scriptpubkey,
                }))?;
                shutdown::mark_shutdown_sent(&mut machine.state, Side::Local);
            }
            Ok(())
        }
        other @ (MasterToCore::ChannelInit(_)
        | MasterToCore::SendingCommitsigReply
        | MasterToCore::GotCommitsigReply
        | MasterToCore::GotRevokeReply) => Err(Error::Internal(format!(
            "unexpected master message outside of a round trip: {:?}",
            other
        ))),
    }
}

/// `OfferHtlc` (§4.2, outbound path): allocate an id, enforce policy against
/// the outbound side's in-flight totals, stage the HTLC, and put
/// `update_add_htlc` on the wire. Replies to master inline since the
/// acceptance/rejection decision is synchronous.
fn offer_htlc<P: Read + Write>(
    machine: &mut ChannelMachine,
    peer: &mut PeerClient<P>,
    amount_msat: u64,
    payment_hash: sha256::Hash,
    cltv_expiry: u32,
    onion_routing_packet: Vec<u8>,
) -> Result<(), Error> {
    let in_flight_after = machine.state.total_in_flight_msat(Side::Local) + amount_msat;
    let accepted_after = machine.state.accepted_htlc_count() + 1;
    if let Err(err) =
        machine.state.policy.validate_add_htlc(amount_msat, cltv_expiry, in_flight_after, accepted_after)
    {
        let failure = match err {
            crate::channel::policy::PolicyError::HtlcBelowMinimum { .. } => OfferHtlcFailure::BelowMinimum,
            crate::channel::policy::PolicyError::HtlcValueInFlightExceeded { .. }
            | crate::channel::policy::PolicyError::MaxAcceptedHtlcsExceeded { .. } => {
                OfferHtlcFailure::CapacityExceeded
            }
            crate::channel::policy::PolicyError::CltvExpiryUnreasonable { .. } => {
                OfferHtlcFailure::InvalidExpiry
            }
            _ => OfferHtlcFailure::TooManyHtlcs,
        };
        return Err(Error::Internal(format!("offer_htlc rejected: {:?}", failure)));
    }

    let htlc_id = machine.state.allocate_htlc_id();
    let htlc = Htlc::offered(htlc_id, amount_msat, payment_hash, cltv_expiry, onion_routing_packet.clone());
    peer.send(&Messages::UpdateAddHtlc(p2p::bolt::UpdateAddHtlc {
        channel_id: machine.state.channel_id,
        htlc_id,
        amount_msat,
        payment_hash: decode_from_bytes(payment_hash.as_inner())?,
        cltv_expiry,
        onion_routing_packet: decode_from_bytes(&onion_routing_packet)?,
        unknown_tlvs: Default::default(),
    }))?;
    machine.state.htlcs.insert(htlc_id, htlc);
    Ok(())
}

/// Resolves a removed HTLC via [`forwarding::send_fail_or_fulfill`] and puts
/// the corresponding settlement message on the wire (§4.6).
fn settle_htlc<P: Read + Write>(
    machine: &mut ChannelMachine,
    peer: &mut PeerClient<P>,
    htlc_id: u64,
) -> Result<(), Error> {
    let channel_id = machine.state.channel_id;
    let htlc = machine
        .state
        .htlcs
        .get(&htlc_id)
        .ok_or_else(|| Error::Internal(format!("settle_htlc for unknown htlc {}", htlc_id)))?;
    let resolution = forwarding::send_fail_or_fulfill(htlc)
        .map_err(|err| Error::Internal(err.to_string()))?;
    match resolution {
        forwarding::Resolution::Fulfilled { preimage } => {
            peer.send(&Messages::UpdateFulfillHtlc(p2p::bolt::UpdateFulfillHtlc {
                channel_id,
                htlc_id,
                payment_preimage: decode_from_bytes(&preimage)?,
            }))?;
        }
        forwarding::Resolution::Failed { reason } => {
            peer.send(&Messages::UpdateFailHtlc(p2p::bolt::UpdateFailHtlc {
                channel_id,
                htlc_id,
                reason,
            }))?;
        }
        forwarding::Resolution::Malformed { sha256_of_onion, failure_code } => {
            peer.send(&Messages::UpdateFailMalformedHtlc(p2p::bolt::UpdateFailMalformedHtlc {
                channel_id,
                htlc_id,
                sha256_of_onion: sha256::Hash::from_slice(&sha256_of_onion)
                    .map_err(|err| Error::Internal(err.to_string()))?,
                failure_code,
            }))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use p2p::bolt::ChannelId;

    use super::*;
    use crate::channel::keyset::{LocalKeyset, RemoteKeyset};
    use crate::channel::percommit::PerCommitState;
    use crate::channel::policy::Policy;
    use crate::channel::state::{ChannelState, SideState};

    struct Pipe {
        read: Cursor<Vec<u8>>,
        written: Vec<u8>,
    }

    impl Read for Pipe {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> { self.read.read(buf) }
    }
    impl Write for Pipe {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> { Ok(()) }
    }

    fn empty_pipe() -> Pipe { Pipe { read: Cursor::new(Vec::new()), written: Vec::new() } }

    fn machine_with_htlc() -> ChannelMachine {
        use amplify::DumbDefault;
        use internet2::addr::NodeId;
        use std::str::FromStr;

        let p1 = PublicKey::from_str(
            "025f7117a78150fe2ef97db7cfc83bd57b2e2c0d0dd25eaf467a4a1c2a45ce1486",
        )
        .unwrap();
        let p2 = PublicKey::from_str(
            "0324653eac434488002cc06bbfb7f10fe18991e35f9fe4302dbea6d2353dc0ab1",
        )
        .unwrap();
        let mut machine = ChannelMachine::new(ChannelState {
            lifecycle: Lifecycle::Active,
            channel_id: ChannelId::default(),
            node_id: NodeId::from_str(
                "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798",
            )
            .unwrap(),
            is_opener: true,
            local_amount_msat: 0,
            remote_amount_msat: 0,
            local_keys: LocalKeyset::dumb_default(),
            remote_keys: RemoteKeyset::dumb_default(),
            per_commit: PerCommitState::new(p1, p2),
            policy: Policy::default(),
            local: SideState::default(),
            remote: SideState::default(),
            short_channel_id: None,
            next_htlc_id: 0,
            htlcs: Default::default(),
            premature_message_count: 0,
            feerate_per_kw: 253,
            base_fee_msat: 1000,
            proportional_fee_ppm: 0,
        });
        machine.state.remote.funding_locked = true;
        machine.state.local.funding_locked = true;
        machine
    }

    #[test]
    fn update_fulfill_htlc_rejects_a_preimage_that_does_not_hash_to_the_payment_hash() {
        let mut machine = machine_with_htlc();
        machine.state.htlcs.insert(
            7,
            Htlc::offered(7, 1_000_000, sha256::Hash::hash(&[0u8; 32]), 144, vec![0u8; 1366]),
        );
        let msg = p2p::bolt::UpdateFulfillHtlc {
            channel_id: ChannelId::default(),
            htlc_id: 7,
            payment_preimage: decode_from_bytes(&[1u8; 32]).unwrap(),
        };
        assert!(handle_update_fulfill_htlc(&mut machine, msg).is_err());
    }

    #[test]
    fn update_fail_htlc_stores_the_failure_payload() {
        let mut machine = machine_with_htlc();
        machine.state.htlcs.insert(
            3,
            Htlc::offered(3, 1_000_000, sha256::Hash::hash(&[0u8; 32]), 144, vec![0u8; 1366]),
        );
        let msg = p2p::bolt::UpdateFailHtlc {
            channel_id: ChannelId::default(),
            htlc_id: 3,
            reason: vec![1, 2, 3],
        };
        handle_update_fail_htlc(&mut machine, msg).unwrap();
        assert_eq!(
            machine.state.htlcs.get(&3).unwrap().failure_payload,
            Some(vec![1, 2, 3])
        );
    }

    #[test]
    fn update_fail_malformed_htlc_rejects_missing_badonion_bit() {
        let mut machine = machine_with_htlc();
        machine.state.htlcs.insert(
            9,
            Htlc::offered(9, 1_000_000, sha256::Hash::hash(&[0u8; 32]), 144, vec![0u8; 1366]),
        );
        let msg = p2p::bolt::UpdateFailMalformedHtlc {
            channel_id: ChannelId::default(),
            htlc_id: 9,
            sha256_of_onion: sha256::Hash::hash(&[0u8; 32]),
            failure_code: 0x0007,
        };
        assert!(handle_update_fail_malformed_htlc(&mut machine, msg).is_err());
    }

    #[test]
    fn update_fee_from_funder_is_rejected() {
        let mut machine = machine_with_htlc();
        let msg = p2p::bolt::UpdateFee { channel_id: ChannelId::default(), feerate_per_kw: 500 };
        assert!(handle_update_fee(&mut machine, msg).is_err());
    }

    #[test]
    fn update_fee_from_non_funder_within_band_is_applied() {
        let mut machine = machine_with_htlc();
        machine.state.is_opener = false;
        let msg = p2p::bolt::UpdateFee { channel_id: ChannelId::default(), feerate_per_kw: 500 };
        handle_update_fee(&mut machine, msg).unwrap();
        assert_eq!(machine.state.feerate_per_kw, 500);
    }

    #[test]
    fn send_commit_reports_nothing_pending_when_htlc_set_is_empty() {
        let mut machine = machine_with_htlc();
        let mut signer = SignerClient::new(empty_pipe());
        let mut master = MasterClient::new(empty_pipe());
        let mut peer = PeerClient::new(empty_pipe());
        let config = Config::default();
        machine.state.per_commit.revocations_received = 0;
        let sent = send_commit(&mut machine, &mut signer, &mut master, &mut peer, &config, 0).unwrap();
        assert!(!sent);
    }
}
