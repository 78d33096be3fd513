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

//! Signer-descriptor client (§5, §6). Strictly synchronous: every request
//! is answered before the next one is sent, so unlike the master and
//! gossip clients there is no deferred queue or inline forwarding here.

use std::io::{self, Read, Write};

use secp256k1::PublicKey;
use strict_encoding::{StrictDecode, StrictEncode};

use crate::daemon::messages::{SignerReply, SignerRequest};

fn unexpected_reply(got: &SignerReply) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("signer returned an unexpected reply: {:?}", got),
    )
}

/// Client half of the signer descriptor (§6). No interleaving is tolerated
/// on this descriptor (§5): a request is always answered before the core
/// does anything else with the signer.
pub struct SignerClient<T> {
    transport: T,
}

impl<T: Read + Write> SignerClient<T> {
    pub fn new(transport: T) -> Self {
        SignerClient { transport }
    }

    /// Sends `request` and blocks for exactly one reply.
    pub fn request(&mut self, request: &SignerRequest) -> io::Result<SignerReply> {
        let bytes = request
            .strict_serialize()
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.to_string()))?;
        self.transport.write_all(&bytes)?;
        SignerReply::strict_decode(&mut self.transport)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.to_string()))
    }

    /// ECDH against the remote's onion ephemeral key (§4.2, `update_add_htlc`
    /// onion processing).
    pub fn ecdh(&mut self, remote_ephemeral_pubkey: PublicKey) -> io::Result<[u8; 32]> {
        match self.request(&SignerRequest::Ecdh { remote_ephemeral_pubkey })? {
            SignerReply::Ecdh { shared_secret } => Ok(shared_secret),
            other => Err(unexpected_reply(&other)),
        }
    }

    /// Requests per-commitment point `index`, plus the secret for `index - 2`
    /// when the signer has one to reveal (§4.3).
    pub fn get_per_commitment_point(
        &mut self,
        index: u64,
    ) -> io::Result<(PublicKey, Option<[u8; 32]>)> {
        match self.request(&SignerRequest::GetPerCommitmentPoint { index })? {
            SignerReply::PerCommitmentPoint { point, prior_secret } => Ok((point, prior_secret)),
            other => Err(unexpected_reply(&other)),
        }
    }

    /// Requests a signature over the remote's version of the commitment
    /// transaction (§4.3, `send_commit`).
    pub fn sign_remote_commitment_tx(&mut self, unsigned_tx_bytes: Vec<u8>) -> io::Result<Vec<u8>> {
        match self.request(&SignerRequest::SignRemoteCommitmentTx { unsigned_tx_bytes })? {
            SignerReply::Signature { signature } => Ok(signature),
            other => Err(unexpected_reply(&other)),
        }
    }

    /// Requests a signature over one of the remote's HTLC transactions
    /// (§4.3, `send_commit`).
    pub fn sign_remote_htlc_tx(
        &mut self,
        unsigned_tx_bytes: Vec<u8>,
        htlc_index: u32,
    ) -> io::Result<Vec<u8>> {
        match self.request(&SignerRequest::SignRemoteHtlcTx { unsigned_tx_bytes, htlc_index })? {
            SignerReply::Signature { signature } => Ok(signature),
            other => Err(unexpected_reply(&other)),
        }
    }

    /// Requests the node and bitcoin signatures over a channel announcement
    /// (§4.5).
    pub fn announcement_sig_req(
        &mut self,
        announcement_bytes: Vec<u8>,
    ) -> io::Result<(Vec<u8>, Vec<u8>)> {
        match self.request(&SignerRequest::AnnouncementSigReq { announcement_bytes })? {
            SignerReply::AnnouncementSigs { node_signature, bitcoin_signature } => {
                Ok((node_signature, bitcoin_signature))
            }
            other => Err(unexpected_reply(&other)),
        }
    }

    /// Asks the signer to confirm a peer's claimed data-loss-protect secret
    /// for commitment `index` (§4.4).
    pub fn check_future_secret(
        &mut self,
        index: u64,
        claimed_secret: [u8; 32],
    ) -> io::Result<bool> {
        match self.request(&SignerRequest::CheckFutureSecret { index, claimed_secret })? {
            SignerReply::FutureSecretValid(valid) => Ok(valid),
            other => Err(unexpected_reply(&other)),
        }
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use super::*;

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

    #[test]
    fn request_round_trips_a_single_reply() {
        let reply = SignerReply::FutureSecretValid(true);
        let transport = MockTransport {
            read: Cursor::new(reply.strict_serialize().unwrap()),
            written: Vec::new(),
        };
        let mut client = SignerClient::new(transport);
        let got = client
            .request(&SignerRequest::CheckFutureSecret { index: 2, claimed_secret: [0u8; 32] })
            .unwrap();
        assert!(matches!(got, SignerReply::FutureSecretValid(true)));
        assert!(!client.transport.written.is_empty());
    }
}
