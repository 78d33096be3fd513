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

//! Process entry point (§10.4). Wires the descriptors named in
//! [`Config::descriptors`] to the [`channeld::daemon`] clients,
//! reconstructs the channel from the master's `channel_init` snapshot, and
//! runs the cooperative event loop to completion or fatal exit. This is
//! the only place a [`Disposition`] becomes a process exit code -- the
//! rest of the crate only ever returns `Result`.
//!
//! Readiness across the master/peer/gossip-store descriptors is polled by
//! giving each a short read timeout and trying them in the priority order
//! [`select_next_source`] dictates, rather than linking a separate
//! event-reactor crate just for this; the ordering contract lives in
//! [`channeld::daemon::dispatcher`], not here. Readiness itself is read via
//! `UnixStream::peek` on a cloned handle to each descriptor: non-destructive,
//! so it never steals bytes the owning client still needs to read.

use std::io::Read;
use std::os::unix::io::FromRawFd;
use std::os::unix::net::UnixStream;
use std::time::{Duration, Instant};

use channeld::channel::{self, ChannelMachine, Lifecycle};
use channeld::config::Config;
use channeld::daemon::messages::{CoreToMaster, MasterToCore};
use channeld::daemon::{
    is_shutdown_complete, select_next_source, EventSource, GossipClient, MasterClient, PeerClient,
    SignerClient,
};
use channeld::p2p::bolt::Messages;
use channeld::{logging, Disposition, Error};

/// Read timeout given to the master/peer/gossip-store descriptors while
/// polling for readiness; short enough that the priority order in
/// [`select_next_source`] gets re-evaluated often, long enough not to spin.
const POLL_TIMEOUT: Duration = Duration::from_millis(20);

fn main() {
    logging::init();
    let config = match Config::with_cli_and_file() {
        Ok(config) => config,
        Err(err) => {
            log::error!("failed to load configuration: {}", err);
            std::process::exit(Disposition::Internal.exit_code());
        }
    };

    match run(&config) {
        Ok(()) => {
            log::info!("channel closed cleanly, exiting");
            std::process::exit(Disposition::Transient.exit_code());
        }
        Err(err) => {
            let disposition = err.disposition();
            log::error!("fatal error ({}): {}", disposition, err);
            std::process::exit(disposition.exit_code());
        }
    }
}

/// Opens the descriptor named by `fd`, set to block for at most
/// `POLL_TIMEOUT` on reads so the main loop can round-robin it against the
/// others instead of blocking indefinitely on whichever happens to be
/// checked first.
fn open_polled(fd: std::os::raw::c_int) -> std::io::Result<UnixStream> {
    let stream = unsafe { UnixStream::from_raw_fd(fd) };
    stream.set_read_timeout(Some(POLL_TIMEOUT))?;
    Ok(stream)
}

/// Non-destructive readiness check: `true` once a byte is sitting in the
/// descriptor's receive buffer (or the peer has closed it -- surfaced as
/// "ready" so the owning client's next `recv` raises the EOF itself), `false`
/// once `POLL_TIMEOUT` has elapsed with nothing to read.
fn is_ready(stream: &UnixStream) -> std::io::Result<bool> {
    match stream.peek(&mut [0u8]) {
        Ok(_) => Ok(true),
        Err(err) if matches!(err.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) => {
            Ok(false)
        }
        Err(err) => Err(err),
    }
}

/// Reads and discards whatever is waiting on the gossip-store descriptor.
/// No gossip-store wire schema is defined in this daemon (the descriptor
/// exists to let `gossipd` keep the store in sync out of band); draining it
/// here only keeps the descriptor from backing up.
fn drain_gossip_store(stream: &mut UnixStream) -> std::io::Result<()> {
    let mut buf = [0u8; 4096];
    match stream.read(&mut buf) {
        Ok(0) => Ok(()),
        Ok(n) => {
            log::debug!("gossip-store: discarded {} bytes (no schema parsed by this daemon)", n);
            Ok(())
        }
        Err(err) if matches!(err.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) => {
            Ok(())
        }
        Err(err) => Err(err),
    }
}

fn run(config: &Config) -> Result<(), Error> {
    let master_stream = open_polled(config.descriptors.master)?;
    let master_peek = master_stream.try_clone()?;
    let mut master = MasterClient::new(master_stream);

    // Block for the master's initial snapshot before entering the loop;
    // anything else that arrives first is deferred for the loop to drain.
    let channel_init = master.wait_sync_reply(&CoreToMaster::GotFundingLocked, |msg| {
        matches!(msg, MasterToCore::ChannelInit(_))
    })?;
    let state = match channel_init {
        MasterToCore::ChannelInit(state) => *state,
        _ => unreachable!("wait_sync_reply only returns messages matching is_expected"),
    };
    let mut machine = ChannelMachine::new(state);

    let peer_stream = open_polled(config.descriptors.peer)?;
    let peer_peek = peer_stream.try_clone()?;
    let mut peer = PeerClient::new(peer_stream);

    let gossip_stream = open_polled(config.descriptors.gossip)?;
    let mut gossip = GossipClient::new(gossip_stream);

    let mut gossip_store = open_polled(config.descriptors.gossip_store)?;
    let gossip_store_peek = gossip_store.try_clone()?;

    let signer_stream = open_polled(config.descriptors.signer)?;
    let mut signer = SignerClient::new(signer_stream);

    let mut commit_due_at: Option<Instant> = None;
    let mut last_peer_message_at = Instant::now();

    loop {
        if is_shutdown_complete(&machine.state) {
            master.shutdown_complete()?;
            return Ok(());
        }

        let deferred = master.pop_deferred();
        let has_deferred = deferred.is_some();
        let timer_due = commit_due_at.map_or(false, |at| Instant::now() >= at);
        let master_ready = is_ready(&master_peek)?;
        let peer_ready = is_ready(&peer_peek)?;
        let gossip_store_due = is_ready(&gossip_store_peek)?;

        match select_next_source(has_deferred, timer_due, master_ready, peer_ready, gossip_store_due) {
            Some(EventSource::DeferredMaster) => {
                let msg = deferred.expect("has_deferred implies a deferred message was popped above");
                channel::dispatch_master_message(&mut machine, msg, &mut signer, &mut gossip, &mut peer)?;
            }
            Some(EventSource::Timer) => {
                commit_due_at = None;
                let secs_since_last_peer_message = last_peer_message_at.elapsed().as_secs();
                channel::send_commit(
                    &mut machine,
                    &mut signer,
                    &mut master,
                    &mut peer,
                    config,
                    secs_since_last_peer_message,
                )?;
            }
            Some(EventSource::Master) => {
                let msg = master.recv()?;
                channel::dispatch_master_message(&mut machine, msg, &mut signer, &mut gossip, &mut peer)?;
                if commit_due_at.is_none() {
                    commit_due_at = Some(Instant::now() + Duration::from_millis(config.commit_msec));
                }
            }
            Some(EventSource::Peer) => {
                let msg = peer.recv()?;
                last_peer_message_at = Instant::now();
                if let Messages::ChannelReestablish(reestablish_msg) = msg {
                    channel::handle_channel_reestablish(
                        &mut machine,
                        reestablish_msg,
                        &mut signer,
                        &mut master,
                        &mut peer,
                        config,
                    )?;
                } else if machine.state.lifecycle == Lifecycle::Reestablishing {
                    // The peer is required to lead with channel_reestablish
                    // on reconnect; anything else arriving first is a
                    // protocol violation we simply don't act on.
                    log::warn!("dropping peer message received before channel_reestablish completed");
                } else {
                    channel::dispatch_peer_message(
                        &mut machine,
                        msg,
                        &mut master,
                        &mut signer,
                        &mut gossip,
                        &mut peer,
                    )?;
                    if commit_due_at.is_none() {
                        commit_due_at = Some(Instant::now() + Duration::from_millis(config.commit_msec));
                    }
                }
            }
            Some(EventSource::GossipStore) => {
                drain_gossip_store(&mut gossip_store)?;
            }
            None => {}
        }
    }
}
