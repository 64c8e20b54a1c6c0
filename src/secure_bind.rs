//! Authenticated bind orchestration: binds the connection with the freshly
//! negotiated chain and, for the netlogon interface, cross-checks the
//! negotiated capabilities against what the server reports.

use crate::chain::CredentialChain;
use crate::config::SchannelPolicy;
use crate::credentials::MachineAccount;
use crate::flags::NegotiateFlags;
use crate::generator::{Generator, SecureBindGenerator, YieldPoint};
use crate::key_exchange::run_key_exchange;
use crate::rpc::{
    self, AuthLevel, AuthType, CapabilitiesRequest, ControlFunction, ControlRequest, InterfaceId, QueryLevel,
    RpcRequest,
};
use crate::status::{NtStatus, WError};
use crate::{Error, Result};

/// Starts the full secure-channel establishment against `server_name`:
/// key exchange, authenticated bind to `interface` at `auth_level`, and the
/// capability cross-check when `interface` is netlogon.
///
/// The generator completes with the established chain; every failure path
/// consumes it.
pub fn initiate_authenticated_bind<'a, C: CredentialChain + 'a>(
    server_name: &'a str,
    interface: InterfaceId,
    account: &'a MachineAccount,
    policy: SchannelPolicy,
    auth_level: AuthLevel,
) -> SecureBindGenerator<'a, C> {
    Generator::new(move |mut yield_point| async move {
        run_secure_bind(&mut yield_point, server_name, interface, account, &policy, auth_level).await
    })
}

#[instrument(level = "debug", skip_all, fields(server = server_name, interface = %interface.uuid))]
async fn run_secure_bind<C: CredentialChain>(
    yield_point: &mut YieldPoint,
    server_name: &str,
    interface: InterfaceId,
    account: &MachineAccount,
    policy: &SchannelPolicy,
    auth_level: AuthLevel,
) -> Result<C> {
    let (chain, requested) = run_key_exchange::<C>(yield_point, server_name, account, policy).await?;

    let (auth_type, auth_level) = yield_point
        .suspend(RpcRequest::Bind {
            interface,
            auth_type: AuthType::Schannel,
            auth_level,
        })
        .await?
        .expect_bound()?;

    if interface != rpc::NETLOGON {
        return Ok(chain);
    }

    debug!("schannel connection established, verifying logon capabilities");

    cross_check_capabilities(
        yield_point,
        &format!(r"\\{server_name}"),
        &account.computer_name,
        chain,
        requested,
        auth_type,
        auth_level,
    )
    .await
}

/// Two-phase capability cross-check over the authenticated binding.
///
/// Phase 1 asks what the server believes was negotiated, phase 2 has it echo
/// what it saw the client request. Both answers are authenticated by the
/// chain; the ambiguous error paths fall back to [`probe_logon_control`].
async fn cross_check_capabilities<C: CredentialChain>(
    yield_point: &mut YieldPoint,
    server_name: &str,
    computer_name: &str,
    mut chain: C,
    requested: NegotiateFlags,
    auth_type: AuthType,
    auth_level: AuthLevel,
) -> Result<C> {
    // Authenticators are produced on a scratch copy; the copy replaces the
    // session chain only once the server's return authenticator verifies.
    let mut scratch = chain.clone();
    let authenticator = scratch.authenticator()?;

    let reply = yield_point
        .suspend(RpcRequest::GetCapabilities(CapabilitiesRequest {
            server_name: server_name.to_owned(),
            computer_name: computer_name.to_owned(),
            authenticator,
            query_level: QueryLevel::ServerCapabilities,
        }))
        .await;

    let reply = match reply {
        Err(Error::Fault(NtStatus::RpcProcnumOutOfRange)) => {
            let negotiated = chain.negotiate_flags();
            if negotiated.intersects(NegotiateFlags::SUPPORTS_AES | NegotiateFlags::STRONG_KEYS) {
                error!(
                    negotiated = %format_args!("{:#010x}", negotiated.bits()),
                    "server claims not to implement the capability call"
                );
                return Err(Error::DowngradeDetected);
            }

            // Probably an NT4-era server that predates the capability call.
            probe_logon_control(yield_point, server_name).await?;
            return Ok(chain);
        }
        Err(err) => return Err(err),
        Ok(response) => response.expect_capabilities()?,
    };

    if reply.status == NtStatus::NotImplemented {
        if chain.negotiate_flags().contains(NegotiateFlags::SUPPORTS_AES) {
            error!("server refused the capability query on an AES channel");
            return Err(Error::DowngradeDetected);
        }

        // Old but honest server; the scratch copy is discarded unused.
        return Ok(chain);
    }

    scratch.verify(&reply.return_authenticator.credential, auth_type, auth_level)?;
    chain = scratch;

    if reply.status != NtStatus::Ok {
        return Err(Error::Rejected(reply.status));
    }

    if reply.capabilities != chain.negotiate_flags() {
        error!(
            local = %format_args!("{:#010x}", chain.negotiate_flags().bits()),
            remote = %format_args!("{:#010x}", reply.capabilities.bits()),
            "negotiated capabilities do not match what the server reports"
        );
        return Err(Error::DowngradeDetected);
    }

    if requested.contains(NegotiateFlags::SUPPORTS_AES) && !chain.negotiate_flags().contains(NegotiateFlags::SUPPORTS_AES)
    {
        error!("AES was requested but is missing from the negotiated flags");
        return Err(Error::DowngradeDetected);
    }

    let mut scratch = chain.clone();
    let authenticator = scratch.authenticator()?;

    let reply = yield_point
        .suspend(RpcRequest::GetCapabilities(CapabilitiesRequest {
            server_name: server_name.to_owned(),
            computer_name: computer_name.to_owned(),
            authenticator,
            query_level: QueryLevel::RequestedFlags,
        }))
        .await;

    let reply = match reply {
        // Unpatched servers answer the level-2 query with broken stub data;
        // treat it like the out-of-range error.
        Err(Error::Fault(NtStatus::RpcBadStubData)) | Err(Error::Fault(NtStatus::RpcEnumValueOutOfRange)) => {
            // Level 1 already verified the negotiated flags, so a genuine
            // server supports this call. A forged error desynchronizes the
            // authenticator sequence; the control query below tells the two
            // apart.
            probe_logon_control(yield_point, server_name).await?;
            return Ok(chain);
        }
        Err(err) => return Err(err),
        Ok(response) => response.expect_capabilities()?,
    };

    scratch.verify(&reply.return_authenticator.credential, auth_type, auth_level)?;

    if reply.status != NtStatus::Ok {
        return Err(Error::Rejected(reply.status));
    }

    if reply.capabilities != requested {
        error!(
            requested = %format_args!("{:#010x}", requested.bits()),
            echoed = %format_args!("{:#010x}", reply.capabilities.bits()),
            "requested capabilities arrived modified at the server"
        );
        return Err(Error::DowngradeDetected);
    }

    chain = scratch;
    Ok(chain)
}

/// Benign control query separating a genuinely old server from a forged
/// capability error: a legacy server answers with the specific
/// "not supported" code, anything else marks the earlier error as forged.
async fn probe_logon_control(yield_point: &mut YieldPoint, server_name: &str) -> Result<()> {
    let reply = yield_point
        .suspend(RpcRequest::LogonControl(ControlRequest {
            server_name: server_name.to_owned(),
            function: ControlFunction::Query,
            level: 2,
        }))
        .await;

    let reply = match reply {
        Ok(response) => response.expect_control()?,
        Err(err) => {
            error!(%err, "control query failed, treating the capability error as forged");
            return Err(Error::DowngradeDetected);
        }
    };

    if reply.status != WError::NotSupported {
        error!(status = %reply.status, "unexpected control query result, treating the capability error as forged");
        return Err(Error::DowngradeDetected);
    }

    Ok(())
}
