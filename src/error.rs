use std::io;

use thiserror::Error;

use crate::status::NtStatus;

/// Failure of a secure-channel operation.
///
/// Status codes received from the peer are carried verbatim. Downgrade
/// findings carry no payload; the flag evidence is logged at the detection
/// site.
#[derive(Debug, Error)]
pub enum Error {
    /// Endpoint resolution, connection setup or bind traffic failed below
    /// the RPC layer.
    #[error("transport failure: {0}")]
    Transport(#[from] io::Error),

    /// The RPC layer answered with a fault instead of a response.
    #[error("RPC fault: {0}")]
    Fault(NtStatus),

    /// The server rejected the request at the application level.
    #[error("request rejected by server: {0}")]
    Rejected(NtStatus),

    /// Observed capability evidence is weaker than the configured policy
    /// allows.
    #[error("crypto downgrade detected")]
    DowngradeDetected,

    /// A credential returned by the server does not match the session
    /// credential chain.
    #[error("schannel credential verification failed")]
    CredentialVerification,

    /// The machine account has no usable secret to key the channel with.
    #[error("machine account secret is not available")]
    NoMachineSecret,

    /// The transport resumed the exchange with a response of the wrong kind.
    #[error("unexpected {0} response from transport")]
    UnexpectedResponse(&'static str),

    #[error("out of resources: {0}")]
    OutOfResources(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
