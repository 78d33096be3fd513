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

//! Master-descriptor client (§6). Wraps strict-encoded read/write over any
//! `Read + Write` transport and implements the `master_wait_sync_reply`
//! idiom: send a `CoreToMaster` request, then block for the matching
//! `MasterToCore` reply, deferring anything else onto the main loop's
//! [`DeferredQueue`](crate::daemon::dispatcher::DeferredQueue).

use std::io::{self, Read, Write};

use strict_encoding::{StrictDecode, StrictEncode};

use crate::daemon::dispatcher::DeferredQueue;
use crate::daemon::messages::{CoreToMaster, MasterToCore};

/// Client half of the master descriptor (§6). Generic over any
/// `Read + Write` transport so tests can substitute an in-memory pipe
/// (§10.4) instead of the real descriptor.
pub struct MasterClient<T> {
    transport: T,
    deferred: DeferredQueue<MasterToCore>,
}

impl<T: Read + Write> MasterClient<T> {
    pub fn new(transport: T) -> Self {
        MasterClient { transport, deferred: DeferredQueue::new() }
    }

    /// Sends a message to the master without waiting for a reply (§6,
    /// one-way notifications like `GotFundingLocked`/`GotShutdown`).
    pub fn notify(&mut self, msg: &CoreToMaster) -> io::Result<()> {
        let bytes = msg
            .strict_serialize()
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.to_string()))?;
        self.transport.write_all(&bytes)
    }

    /// Reads one `MasterToCore` message off the wire, blocking until a
    /// complete message is available.
    pub fn recv(&mut self) -> io::Result<MasterToCore> {
        MasterToCore::strict_decode(&mut self.transport)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.to_string()))
    }

    /// Drains and returns the oldest deferred master message, if any (§4.1:
    /// serviced ahead of everything else at the top of the next iteration).
    pub fn pop_deferred(&mut self) -> Option<MasterToCore> {
        self.deferred.pop()
    }

    /// Persist-then-send round trip (§5, §7): sends `request`, then blocks
    /// reading messages until `is_expected` matches, deferring every other
    /// message it sees in between. Used for `SendingCommitsig`/
    /// `GotCommitsig`/`GotRevoke` acknowledgement waits, where the reply
    /// must be durably recorded by the master before the core is allowed to
    /// put the corresponding wire message on the peer descriptor.
    pub fn wait_sync_reply(
        &mut self,
        request: &CoreToMaster,
        is_expected: impl Fn(&MasterToCore) -> bool,
    ) -> io::Result<MasterToCore> {
        self.notify(request)?;
        loop {
            let msg = self.recv()?;
            if is_expected(&msg) {
                return Ok(msg);
            }
            self.deferred.push(msg);
        }
    }

    /// Persist-then-send round trip ahead of emitting `commitment_signed`
    /// (§4.3, `send_commit`): the master must durably record the signature
    /// before the wire message goes out.
    pub fn sending_commitsig(
        &mut self,
        next_index_remote: u64,
        commitment_signature: Vec<u8>,
        htlc_signatures: Vec<Vec<u8>>,
    ) -> io::Result<()> {
        self.wait_sync_reply(
            &CoreToMaster::SendingCommitsig { next_index_remote, commitment_signature, htlc_signatures },
            |msg| matches!(msg, MasterToCore::SendingCommitsigReply),
        )?;
        Ok(())
    }

    /// Persist-then-send round trip ahead of emitting `revoke_and_ack`
    /// (§4.3, `handle_peer_commit_sig`).
    pub fn got_commitsig(
        &mut self,
        next_index_local: u64,
        new_htlcs: Vec<crate::daemon::messages::NewHtlc>,
        fulfilled: Vec<(u64, [u8; 32])>,
        failed: Vec<(u64, Vec<u8>)>,
    ) -> io::Result<()> {
        self.wait_sync_reply(
            &CoreToMaster::GotCommitsig { next_index_local, new_htlcs, fulfilled, failed },
            |msg| matches!(msg, MasterToCore::GotCommitsigReply),
        )?;
        Ok(())
    }

    /// Round trip after applying an inbound `revoke_and_ack` (§4.3,
    /// `on_revoke_and_ack`).
    pub fn got_revoke(&mut self, revocations_received: u64) -> io::Result<()> {
        self.wait_sync_reply(&CoreToMaster::GotRevoke { revocations_received }, |msg| {
            matches!(msg, MasterToCore::GotRevokeReply)
        })?;
        Ok(())
    }

    /// One-way notification that REMOTE's `funding_locked` arrived (§4.1).
    pub fn got_funding_locked(&mut self) -> io::Result<()> {
        self.notify(&CoreToMaster::GotFundingLocked)
    }

    /// One-way notification that announcement signature exchange completed
    /// (§4.5).
    pub fn got_announcement(&mut self) -> io::Result<()> {
        self.notify(&CoreToMaster::GotAnnouncement)
    }

    /// One-way notification that REMOTE's `shutdown` arrived (§4.6).
    pub fn got_shutdown(&mut self) -> io::Result<()> {
        self.notify(&CoreToMaster::GotShutdown)
    }

    /// Final message before the core exits (§4.6, §6).
    pub fn shutdown_complete(&mut self) -> io::Result<()> {
        self.notify(&CoreToMaster::ShutdownComplete)
    }

    /// Reports that the remote proved itself ahead via data-loss-protect
    /// (§4.4, §7 kind 2).
    pub fn fail_fallen_behind(
        &mut self,
        remote_current_per_commit: secp256k1::PublicKey,
    ) -> io::Result<()> {
        self.notify(&CoreToMaster::FailFallenBehind { remote_current_per_commit })
    }

    /// Success or failure reply to the master's `OfferHtlc` (§4.2, §7 kind
    /// 4).
    pub fn offer_htlc_reply(
        &mut self,
        result: Result<u64, crate::daemon::messages::OfferHtlcFailure>,
    ) -> io::Result<()> {
        self.notify(&CoreToMaster::OfferHtlcReply(result))
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use super::*;

    /// An in-memory transport splicing together a canned read buffer and a
    /// growable write buffer, standing in for the real descriptor (§10.4).
    struct MockTransport {
        read: Cursor<Vec<u8>>,
        written: Vec<u8>,
    }

    impl Read for MockTransport {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.read.read(buf)
        }
    }

    impl Write for MockTransport {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> { Ok(()) }
    }

    fn encode_all(msgs: &[MasterToCore]) -> Vec<u8> {
        let mut buf = Vec::new();
        for msg in msgs {
            buf.extend(msg.strict_serialize().unwrap());
        }
        buf
    }

    #[test]
    fn wait_sync_reply_defers_intervening_master_messages() {
        let incoming = vec![
            MasterToCore::SendShutdown,
            MasterToCore::GotRevokeReply,
            MasterToCore::SendingCommitsigReply,
        ];
        let transport = MockTransport { read: Cursor::new(encode_all(&incoming)), written: Vec::new() };
        let mut client = MasterClient::new(transport);

        let reply = client
            .wait_sync_reply(&CoreToMaster::GotFundingLocked, |msg| {
                matches!(msg, MasterToCore::SendingCommitsigReply)
            })
            .unwrap();
        assert!(matches!(reply, MasterToCore::SendingCommitsigReply));

        assert!(matches!(client.pop_deferred(), Some(MasterToCore::SendShutdown)));
        assert!(matches!(client.pop_deferred(), Some(MasterToCore::GotRevokeReply)));
        assert!(client.pop_deferred().is_none());
    }

    #[test]
    fn notify_writes_a_nonempty_message() {
        let transport = MockTransport { read: Cursor::new(Vec::new()), written: Vec::new() };
        let mut client = MasterClient::new(transport);
        client.notify(&CoreToMaster::GotShutdown).unwrap();
        assert!(!client.transport.written.is_empty());
    }
}
