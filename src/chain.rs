use rand::rngs::OsRng;
use rand::RngCore;

use crate::credentials::MachineAccount;
use crate::flags::NegotiateFlags;
use crate::rpc::{AuthLevel, AuthType};
use crate::secret::Secret;
use crate::Result;

pub const CREDENTIAL_SIZE: usize = 8;

/// 8-byte nonce/proof value exchanged during the challenge rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Credential(pub [u8; CREDENTIAL_SIZE]);

impl Credential {
    /// Fresh client challenge. Generated once per challenge round and again
    /// for the downgrade retry.
    pub fn random() -> Self {
        let mut data = [0u8; CREDENTIAL_SIZE];
        OsRng.fill_bytes(&mut data);

        Self(data)
    }
}

impl AsRef<[u8]> for Credential {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Per-call authenticator derived from the rolling chain state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Authenticator {
    pub credential: Credential,
    pub timestamp: u32,
}

/// Everything the chain is keyed from after a successful challenge round
/// trip.
#[derive(Debug)]
pub struct ChainInit<'a> {
    pub account: &'a MachineAccount,
    pub client_challenge: &'a Credential,
    pub server_challenge: &'a Credential,
    pub machine_secret: &'a Secret<Vec<u8>>,
    /// Flags the client put on the wire; frozen for the session.
    pub requested_flags: NegotiateFlags,
    /// Flags the client is currently willing to operate with.
    pub local_flags: NegotiateFlags,
}

/// Rolling session credential state.
///
/// The cryptographic scheme (session-key derivation, per-call proof
/// computation) lives behind this trait; the exchange only sequences it.
/// Implementations must be cheap to clone: the capability cross-check
/// produces authenticators on a scratch copy and commits the copy only after
/// the server's return authenticator verifies, so the chain never advances
/// past an unverified exchange.
pub trait CredentialChain: Clone + Send {
    /// Derives the initial chain state, returning it together with the
    /// client proof to present in the authenticate call.
    fn initialize(init: ChainInit<'_>) -> Result<(Self, Credential)>;

    /// Produces the authenticator for the next authenticated call,
    /// advancing the internal sequence.
    fn authenticator(&mut self) -> Result<Authenticator>;

    /// Checks a credential returned by the server against the current
    /// state. A mismatch means tampering or desynchronization and is fatal
    /// to the session.
    fn verify(&mut self, returned: &Credential, auth_type: AuthType, auth_level: AuthLevel) -> Result<()>;

    /// Capability set the chain is operating with.
    fn negotiate_flags(&self) -> NegotiateFlags;

    /// Drops every capability bit not present in `keep`.
    fn restrict_flags(&mut self, keep: NegotiateFlags);
}
