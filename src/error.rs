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

//! Top-level error type and exit disposition (§7, §10.2).

use crate::channel::machine::DispatchError;
use crate::channel::policy::PolicyError;
use crate::channel::reestablish::ReestablishError;

/// Everything that can go wrong while driving the channel (§7). Carries
/// `From` conversions from the lower-level decision-table errors so
/// handlers can use `?` without manual wrapping.
#[derive(Clone, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum Error {
    /// policy negotiation error: {0}
    #[from]
    Policy(PolicyError),

    /// channel reestablish error: {0}
    #[from]
    Reestablish(ReestablishError),

    /// protocol state machine error: {0}
    #[from]
    Dispatch(DispatchError),

    /// commit_sig with no changes (again!)
    RepeatedEmptyCommitment,

    /// wire decode error: {0}
    #[from]
    Decode(lightning_encoding::Error),

    /// I/O error talking to master, signer, or gossip: {0}
    #[from]
    Io(std::io::Error),

    /// internal invariant violated: {0}
    Internal(String),
}

/// How a fatal [`Error`] must be handled by the process (§7, §10.2).
/// `main` is the only place this is turned into an exit code and a wire
/// message; no `std::process::exit` is scattered through the core itself.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
pub enum Disposition {
    /// peer violated the protocol; send a wire-error and exit
    #[display("peer-failure")]
    PeerFailure,
    /// data-loss-protect proved the remote is ahead of us
    #[display("fallen-behind")]
    FallenBehind,
    /// an internal invariant was violated; a bug or a compromised trust
    /// boundary, not a retry candidate
    #[display("internal")]
    Internal,
    /// a transient HTLC-add error; reply to master, channel state is
    /// untouched
    #[display("transient")]
    Transient,
}

impl Error {
    /// Classifies this error into its exit [`Disposition`] (§7).
    pub fn disposition(&self) -> Disposition {
        match self {
            Error::Policy(_)
            | Error::Reestablish(ReestablishError::BadRevocationNumber { .. })
            | Error::Reestablish(ReestablishError::BadCommitmentNumber { .. })
            | Error::Reestablish(ReestablishError::CurrentPointMismatch)
            | Error::Dispatch(_)
            | Error::RepeatedEmptyCommitment => Disposition::PeerFailure,
            Error::Reestablish(ReestablishError::InvalidDataLossProof) => {
                Disposition::FallenBehind
            }
            Error::Decode(_) | Error::Io(_) | Error::Internal(_) => {
                Disposition::Internal
            }
        }
    }
}

/// Process exit codes matching each [`Disposition`] (§10.4: `main` is the
/// only place a `Disposition` becomes a process exit code).
impl Disposition {
    pub fn exit_code(self) -> i32 {
        match self {
            Disposition::PeerFailure => 1,
            Disposition::FallenBehind => 2,
            Disposition::Internal => 3,
            Disposition::Transient => 0,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn repeated_empty_commitment_is_a_peer_failure() {
        assert_eq!(
            Error::RepeatedEmptyCommitment.disposition(),
            Disposition::PeerFailure
        );
    }

    #[test]
    fn invalid_data_loss_proof_is_fallen_behind() {
        let err: Error =
            ReestablishError::InvalidDataLossProof.into();
        assert_eq!(err.disposition(), Disposition::FallenBehind);
    }

    #[test]
    fn io_error_is_internal() {
        let err: Error =
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "eof").into();
        assert_eq!(err.disposition(), Disposition::Internal);
    }

    #[test]
    fn exit_codes_are_stable() {
        assert_eq!(Disposition::PeerFailure.exit_code(), 1);
        assert_eq!(Disposition::FallenBehind.exit_code(), 2);
        assert_eq!(Disposition::Internal.exit_code(), 3);
        assert_eq!(Disposition::Transient.exit_code(), 0);
    }
}
