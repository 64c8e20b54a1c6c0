//! Shared fixtures: a scripted transport that records every request it is
//! asked to execute, and a deterministic credential chain.

use std::collections::VecDeque;
use std::io;

use netlogon::rpc::{AuthenticateReply, CapabilitiesReply, ChallengeReply, ControlReply};
use netlogon::{
    AuthLevel, AuthType, Authenticator, ChainInit, Credential, CredentialChain, Error, MachineAccount, NegotiateFlags,
    NtStatus, RpcRequest, RpcResponse, SecureChannelType, Transport, WError,
};

/// The only server proof [`FakeChain::verify`] accepts.
pub const SERVER_PROOF: Credential = Credential([0x5A; 8]);

pub const SERVER_CHALLENGE: Credential = Credential([0x10; 8]);
pub const RETRY_SERVER_CHALLENGE: Credential = Credential([0x20; 8]);

pub fn account() -> MachineAccount {
    MachineAccount::new("WS01$", "WS01", SecureChannelType::Workstation, vec![0x11; 16])
}

/// Credential chain with a fixed verification rule: any returned credential
/// equal to [`SERVER_PROOF`] verifies, everything else is a mismatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeChain {
    pub flags: NegotiateFlags,
    /// Number of authenticators produced.
    pub sequence: u32,
    /// Number of successful verifications.
    pub verified: u32,
    pub client_challenge: Credential,
    pub server_challenge: Credential,
}

impl CredentialChain for FakeChain {
    fn initialize(init: ChainInit<'_>) -> netlogon::Result<(Self, Credential)> {
        let mut proof = [0u8; 8];
        for (i, byte) in proof.iter_mut().enumerate() {
            *byte = init.client_challenge.0[i] ^ init.server_challenge.0[i];
        }

        let chain = Self {
            flags: init.local_flags,
            sequence: 0,
            verified: 0,
            client_challenge: *init.client_challenge,
            server_challenge: *init.server_challenge,
        };

        Ok((chain, Credential(proof)))
    }

    fn authenticator(&mut self) -> netlogon::Result<Authenticator> {
        self.sequence += 1;

        Ok(Authenticator {
            credential: Credential([self.sequence as u8; 8]),
            timestamp: self.sequence,
        })
    }

    fn verify(&mut self, returned: &Credential, _: AuthType, _: AuthLevel) -> netlogon::Result<()> {
        if *returned != SERVER_PROOF {
            return Err(Error::CredentialVerification);
        }

        self.verified += 1;
        Ok(())
    }

    fn negotiate_flags(&self) -> NegotiateFlags {
        self.flags
    }

    fn restrict_flags(&mut self, keep: NegotiateFlags) {
        self.flags &= keep;
    }
}

#[derive(Default)]
pub struct ScriptedTransport {
    script: VecDeque<netlogon::Result<RpcResponse>>,
    pub requests: Vec<RpcRequest>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, response: RpcResponse) -> Self {
        self.script.push_back(Ok(response));
        self
    }

    pub fn fail(mut self, error: Error) -> Self {
        self.script.push_back(Err(error));
        self
    }

    /// Endpoint resolution, secondary connection and the unauthenticated
    /// bind every session starts with.
    pub fn session_prelude(self) -> Self {
        self.reply(RpcResponse::EndpointResolved)
            .reply(RpcResponse::Connected)
            .reply(bound(AuthType::None, AuthLevel::None))
    }

    pub fn request_kinds(&self) -> Vec<&'static str> {
        self.requests.iter().map(RpcRequest::kind).collect()
    }
}

impl Transport for ScriptedTransport {
    fn send(&mut self, request: RpcRequest) -> netlogon::Result<RpcResponse> {
        self.requests.push(request);

        self.script.pop_front().unwrap_or_else(|| {
            Err(Error::Transport(io::Error::new(
                io::ErrorKind::Other,
                "transport script exhausted",
            )))
        })
    }
}

pub fn bound(auth_type: AuthType, auth_level: AuthLevel) -> RpcResponse {
    RpcResponse::Bound { auth_type, auth_level }
}

pub fn challenge_ok(server_challenge: Credential) -> RpcResponse {
    RpcResponse::Challenge(ChallengeReply {
        server_challenge,
        status: NtStatus::Ok,
    })
}

pub fn authenticate(negotiate_flags: NegotiateFlags, status: NtStatus) -> RpcResponse {
    RpcResponse::Authenticate(AuthenticateReply {
        negotiate_flags,
        server_credential: SERVER_PROOF,
        status,
    })
}

pub fn authenticate_bad_proof(negotiate_flags: NegotiateFlags) -> RpcResponse {
    RpcResponse::Authenticate(AuthenticateReply {
        negotiate_flags,
        server_credential: Credential([0xFF; 8]),
        status: NtStatus::Ok,
    })
}

pub fn capabilities(capabilities: NegotiateFlags, status: NtStatus) -> RpcResponse {
    RpcResponse::Capabilities(CapabilitiesReply {
        capabilities,
        return_authenticator: Authenticator {
            credential: SERVER_PROOF,
            timestamp: 0,
        },
        status,
    })
}

pub fn control(status: WError) -> RpcResponse {
    RpcResponse::Control(ControlReply { status })
}

pub fn rpc_fault(status: NtStatus) -> Error {
    Error::Fault(status)
}
