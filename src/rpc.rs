//! Typed surface of the RPC calls the secure-channel flows consume.
//!
//! Wire encoding, endpoint resolution and connection management belong to
//! the transport. The flows in this crate only sequence calls: each network
//! operation is yielded as an [`RpcRequest`] and answered with an
//! [`RpcResponse`] (or an error) by whatever drives the exchange.

use num_derive::{FromPrimitive, ToPrimitive};
use uuid::Uuid;

use crate::chain::{Authenticator, Credential};
use crate::credentials::SecureChannelType;
use crate::flags::NegotiateFlags;
use crate::status::{NtStatus, WError};
use crate::{Error, Result};

/// RPC interface identity (syntax id).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceId {
    pub uuid: Uuid,
    pub version: u16,
    pub version_minor: u16,
}

/// The netlogon interface.
pub const NETLOGON: InterfaceId = InterfaceId {
    uuid: Uuid::from_u128(0x12345678_1234_abcd_ef00_01234567cffb),
    version: 1,
    version_minor: 0,
};

/// DCERPC authentication service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum AuthType {
    #[default]
    None = 0x00,
    GssNegotiate = 0x09,
    Winnt = 0x0a,
    GssKerberos = 0x10,
    /// Netlogon secure channel.
    Schannel = 0x44,
}

/// DCERPC authentication level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum AuthLevel {
    Default = 0x00,
    #[default]
    None = 0x01,
    Connect = 0x02,
    Call = 0x03,
    Pkt = 0x04,
    PktIntegrity = 0x05,
    PktPrivacy = 0x06,
}

/// Function codes of the LogonControl call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum ControlFunction {
    Query = 1,
    Replicate = 2,
    Synchronize = 3,
    PdcReplicate = 4,
    Rediscover = 5,
    TcQuery = 6,
}

/// Capability view the LogonGetCapabilities call reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum QueryLevel {
    /// What the server believes was negotiated.
    ServerCapabilities = 1,
    /// Echo of what the server saw the client request.
    RequestedFlags = 2,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeRequest {
    pub server_name: String,
    pub computer_name: String,
    pub client_challenge: Credential,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticateRequest {
    pub server_name: String,
    pub account_name: String,
    pub channel_type: SecureChannelType,
    pub computer_name: String,
    pub negotiate_flags: NegotiateFlags,
    pub client_credential: Credential,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilitiesRequest {
    pub server_name: String,
    pub computer_name: String,
    pub authenticator: Authenticator,
    pub query_level: QueryLevel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlRequest {
    pub server_name: String,
    pub function: ControlFunction,
    pub level: u32,
}

/// One network operation of the establishment flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcRequest {
    /// Resolve the endpoint the given interface is reachable on.
    ResolveEndpoint(InterfaceId),
    /// Open the secondary connection the challenge rounds run over.
    SecondaryConnect,
    /// Bind the connection with the given authentication parameters.
    Bind {
        interface: InterfaceId,
        auth_type: AuthType,
        auth_level: AuthLevel,
    },
    Challenge(ChallengeRequest),
    Authenticate(AuthenticateRequest),
    GetCapabilities(CapabilitiesRequest),
    LogonControl(ControlRequest),
}

impl RpcRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            RpcRequest::ResolveEndpoint(_) => "resolve-endpoint",
            RpcRequest::SecondaryConnect => "secondary-connect",
            RpcRequest::Bind { .. } => "bind",
            RpcRequest::Challenge(_) => "challenge",
            RpcRequest::Authenticate(_) => "authenticate",
            RpcRequest::GetCapabilities(_) => "get-capabilities",
            RpcRequest::LogonControl(_) => "logon-control",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeReply {
    pub server_challenge: Credential,
    pub status: NtStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticateReply {
    /// Capability set the server granted.
    pub negotiate_flags: NegotiateFlags,
    /// The server's proof over the exchanged challenges.
    pub server_credential: Credential,
    pub status: NtStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilitiesReply {
    /// Server capabilities or the requested-flags echo, depending on the
    /// query level.
    pub capabilities: NegotiateFlags,
    pub return_authenticator: Authenticator,
    pub status: NtStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlReply {
    pub status: WError,
}

/// Reply to one [`RpcRequest`].
///
/// Transport-level failures are not responses: they resume the exchange as
/// [`Error::Transport`], and RPC faults as [`Error::Fault`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcResponse {
    EndpointResolved,
    Connected,
    /// Bind completed; reports the authentication parameters in effect on
    /// the binding, which later feed credential verification.
    Bound {
        auth_type: AuthType,
        auth_level: AuthLevel,
    },
    Challenge(ChallengeReply),
    Authenticate(AuthenticateReply),
    Capabilities(CapabilitiesReply),
    Control(ControlReply),
}

impl RpcResponse {
    pub fn kind(&self) -> &'static str {
        match self {
            RpcResponse::EndpointResolved => "endpoint-resolved",
            RpcResponse::Connected => "connected",
            RpcResponse::Bound { .. } => "bound",
            RpcResponse::Challenge(_) => "challenge",
            RpcResponse::Authenticate(_) => "authenticate",
            RpcResponse::Capabilities(_) => "capabilities",
            RpcResponse::Control(_) => "control",
        }
    }

    pub(crate) fn expect_endpoint_resolved(self) -> Result<()> {
        match self {
            RpcResponse::EndpointResolved => Ok(()),
            other => Err(Error::UnexpectedResponse(other.kind())),
        }
    }

    pub(crate) fn expect_connected(self) -> Result<()> {
        match self {
            RpcResponse::Connected => Ok(()),
            other => Err(Error::UnexpectedResponse(other.kind())),
        }
    }

    pub(crate) fn expect_bound(self) -> Result<(AuthType, AuthLevel)> {
        match self {
            RpcResponse::Bound { auth_type, auth_level } => Ok((auth_type, auth_level)),
            other => Err(Error::UnexpectedResponse(other.kind())),
        }
    }

    pub(crate) fn expect_challenge(self) -> Result<ChallengeReply> {
        match self {
            RpcResponse::Challenge(reply) => Ok(reply),
            other => Err(Error::UnexpectedResponse(other.kind())),
        }
    }

    pub(crate) fn expect_authenticate(self) -> Result<AuthenticateReply> {
        match self {
            RpcResponse::Authenticate(reply) => Ok(reply),
            other => Err(Error::UnexpectedResponse(other.kind())),
        }
    }

    pub(crate) fn expect_capabilities(self) -> Result<CapabilitiesReply> {
        match self {
            RpcResponse::Capabilities(reply) => Ok(reply),
            other => Err(Error::UnexpectedResponse(other.kind())),
        }
    }

    pub(crate) fn expect_control(self) -> Result<ControlReply> {
        match self {
            RpcResponse::Control(reply) => Ok(reply),
            other => Err(Error::UnexpectedResponse(other.kind())),
        }
    }
}

/// Executes requests yielded by an exchange, one at a time.
///
/// Implemented by real RPC transports and by scripted fakes in tests. The
/// exchange guarantees a single outstanding request.
pub trait Transport {
    fn send(&mut self, request: RpcRequest) -> Result<RpcResponse>;
}
