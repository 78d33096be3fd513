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

//! Peer-descriptor client (§5, §6): reads and writes real BOLT wire
//! messages. Unlike the master and gossip descriptors there is no
//! request/reply framing here -- the peer may send anything at any time, so
//! this client is a thin `Messages` codec and the ordering rules live in the
//! dispatch layer that calls it.

use std::io::{self, Read, Write};

use lightning_encoding::{LightningDecode, LightningEncode};
use p2p::bolt::Messages;

/// Client half of the peer descriptor (§6). `p2p::bolt::Messages` already
/// implements `LightningEncode`/`LightningDecode` end to end via its own
/// unmarshaller, so this client does no framing of its own.
pub struct PeerClient<T> {
    transport: T,
}

impl<T: Read + Write> PeerClient<T> {
    pub fn new(transport: T) -> Self {
        PeerClient { transport }
    }

    /// Writes one message to the peer.
    pub fn send(&mut self, msg: &Messages) -> io::Result<()> {
        msg.lightning_encode(&mut self.transport)
            .map(|_| ())
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.to_string()))
    }

    /// Reads one message from the peer, blocking until a complete message
    /// is available.
    pub fn recv(&mut self) -> io::Result<Messages> {
        Messages::lightning_decode(&mut self.transport)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.to_string()))
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use p2p::bolt::{ChannelId, Shutdown};

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
    fn send_then_recv_round_trips_a_shutdown_message() {
        let msg = Messages::Shutdown(Shutdown {
            channel_id: ChannelId::default(),
            scriptpubkey: bitcoin_scripts::PubkeyScript::default(),
        });

        let mut encoded = Vec::new();
        msg.lightning_encode(&mut encoded).unwrap();

        let transport = MockTransport { read: Cursor::new(encoded), written: Vec::new() };
        let mut client = PeerClient::new(transport);
        let got = client.recv().unwrap();
        assert!(matches!(got, Messages::Shutdown(_)));

        client.send(&msg).unwrap();
        assert!(!client.transport.written.is_empty());
    }
}
