//! Schannel key negotiation: the challenge/authenticate exchange that keys
//! the session credential chain and pins down the channel's capabilities.

use crate::chain::{ChainInit, Credential, CredentialChain};
use crate::config::SchannelPolicy;
use crate::credentials::{MachineAccount, SecureChannelType};
use crate::flags::NegotiateFlags;
use crate::generator::{Generator, KeyExchangeGenerator, YieldPoint};
use crate::rpc::{self, AuthLevel, AuthType, AuthenticateRequest, ChallengeRequest, RpcRequest};
use crate::status::NtStatus;
use crate::{Error, Result};

/// Capability sets selected from policy before the exchange starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FlagSelection {
    /// What the client offers. Frozen as the session's requested flags, then
    /// only ever narrowed by the downgrade retry.
    pub(crate) local: NegotiateFlags,
    /// What policy does not allow the server to refuse.
    pub(crate) required: NegotiateFlags,
    /// Whether one automatic downgrade retry is available.
    pub(crate) auto_retry: bool,
}

/// Translates the channel-security policy into the offered and required
/// capability sets.
pub(crate) fn select_flags(policy: &SchannelPolicy, channel_type: SecureChannelType) -> FlagSelection {
    let mut local = NegotiateFlags::AUTH2_FLAGS;
    let mut required = NegotiateFlags::AUTHENTICATED_RPC;

    let mut reject_md5_servers = false;
    let mut require_strong_key = false;
    let mut auto_retry = false;

    if policy.require_128bit {
        local = NegotiateFlags::AUTH2_ADS_FLAGS;
        require_strong_key = true;
    }
    if policy.require_aes {
        local = NegotiateFlags::AUTH2_ADS_FLAGS;
        reject_md5_servers = true;
    }
    if policy.auto_negotiate {
        local = NegotiateFlags::AUTH2_ADS_FLAGS | NegotiateFlags::SUPPORTS_AES;
        auto_retry = true;
        reject_md5_servers = policy.reject_md5_servers;
        require_strong_key = policy.require_strong_key;
    }

    if policy.weak_crypto_disallowed {
        reject_md5_servers = true;
    }

    if reject_md5_servers {
        require_strong_key = true;
    }

    if require_strong_key {
        required |= NegotiateFlags::ARCFOUR;
        required |= NegotiateFlags::STRONG_KEYS;
    }

    if reject_md5_servers {
        required |= NegotiateFlags::PASSWORD_SET2;
        required |= NegotiateFlags::SUPPORTS_AES;
    }

    local |= required;

    // AES supersedes the legacy cipher and strong-key requirements.
    if required.contains(NegotiateFlags::SUPPORTS_AES) {
        required -= NegotiateFlags::ARCFOUR;
        required -= NegotiateFlags::STRONG_KEYS;
    }

    if channel_type == SecureChannelType::ReadOnlyDc {
        local |= NegotiateFlags::RODC_PASSTHROUGH;
    }

    FlagSelection {
        local,
        required,
        auto_retry,
    }
}

/// Starts the schannel key exchange against `server_name`.
///
/// The returned generator yields the endpoint/connect/bind provisioning
/// requests followed by the challenge rounds, and completes with the keyed
/// chain and the session's requested flags.
pub fn initiate_key_exchange<'a, C: CredentialChain + 'a>(
    server_name: &'a str,
    account: &'a MachineAccount,
    policy: SchannelPolicy,
) -> KeyExchangeGenerator<'a, C> {
    Generator::new(move |mut yield_point| async move {
        run_key_exchange(&mut yield_point, server_name, account, &policy).await
    })
}

#[instrument(level = "debug", skip_all, fields(server = server_name))]
pub(crate) async fn run_key_exchange<C: CredentialChain>(
    yield_point: &mut YieldPoint,
    server_name: &str,
    account: &MachineAccount,
    policy: &SchannelPolicy,
) -> Result<(C, NegotiateFlags)> {
    let selection = select_flags(policy, account.channel_type);
    let mut local = selection.local;
    let required = selection.required;
    let mut retry_available = selection.auto_retry;

    let requested = local;

    debug!(
        local = %format_args!("{:#010x}", local.bits()),
        required = %format_args!("{:#010x}", required.bits()),
        "negotiating schannel key"
    );

    yield_point
        .suspend(RpcRequest::ResolveEndpoint(rpc::NETLOGON))
        .await?
        .expect_endpoint_resolved()?;

    yield_point
        .suspend(RpcRequest::SecondaryConnect)
        .await?
        .expect_connected()?;

    // The challenge rounds run over an unauthenticated bind; the granted
    // auth parameters feed credential verification below.
    let (auth_type, auth_level) = yield_point
        .suspend(RpcRequest::Bind {
            interface: rpc::NETLOGON,
            auth_type: AuthType::None,
            auth_level: AuthLevel::None,
        })
        .await?
        .expect_bound()?;

    let unc_server_name = format!(r"\\{server_name}");
    let mut client_challenge = Credential::random();

    loop {
        let challenge = yield_point
            .suspend(RpcRequest::Challenge(ChallengeRequest {
                server_name: unc_server_name.clone(),
                computer_name: account.computer_name.clone(),
                client_challenge,
            }))
            .await?
            .expect_challenge()?;
        if challenge.status != NtStatus::Ok {
            return Err(Error::Rejected(challenge.status));
        }

        let machine_secret = account.machine_secret()?;

        // The chain computes the client proof sent with the authenticate
        // call; a failed round discards it and re-keys from fresh nonces.
        let (mut chain, client_credential) = C::initialize(ChainInit {
            account,
            client_challenge: &client_challenge,
            server_challenge: &challenge.server_challenge,
            machine_secret,
            requested_flags: requested,
            local_flags: local,
        })?;

        let reply = yield_point
            .suspend(RpcRequest::Authenticate(AuthenticateRequest {
                server_name: unc_server_name.clone(),
                account_name: account.account_name.clone(),
                channel_type: account.channel_type,
                computer_name: account.computer_name.clone(),
                negotiate_flags: requested,
                client_credential,
            }))
            .await?
            .expect_authenticate()?;

        if reply.status != NtStatus::Ok && reply.status != NtStatus::AccessDenied {
            return Err(Error::Rejected(reply.status));
        }

        let remote = reply.negotiate_flags;

        {
            // When both sides support AES the legacy-cipher and strong-key
            // requirements are implied; tighten the required set for this
            // comparison only.
            let mut tightened = required;
            if remote.contains(NegotiateFlags::SUPPORTS_AES) && local.contains(NegotiateFlags::SUPPORTS_AES) {
                tightened -= NegotiateFlags::ARCFOUR;
                tightened -= NegotiateFlags::STRONG_KEYS;
            }

            if !remote.contains(tightened) {
                error!(
                    local = %format_args!("{:#010x}", local.bits()),
                    required = %format_args!("{:#010x}", required.bits()),
                    remote = %format_args!("{:#010x}", remote.bits()),
                    "server did not grant a capability the policy requires"
                );
                return Err(Error::DowngradeDetected);
            }
        }

        // Access denied with weaker server flags usually means an old or
        // restricted server; one retry with the intersected flags is allowed.
        if reply.status == NtStatus::AccessDenied {
            if (local & remote) == local {
                // The server did not weaken anything we offered; retrying
                // cannot change the outcome.
                retry_available = false;
            }

            if !retry_available {
                return Err(Error::Rejected(reply.status));
            }
            retry_available = false;

            let offered = if local.contains(NegotiateFlags::SUPPORTS_AES) {
                if remote.contains(NegotiateFlags::SUPPORTS_AES) {
                    return Err(Error::Rejected(reply.status));
                }
                "aes"
            } else if local.contains(NegotiateFlags::STRONG_KEYS) {
                if remote.contains(NegotiateFlags::STRONG_KEYS) {
                    return Err(Error::Rejected(reply.status));
                }
                "strong"
            } else {
                "des"
            };

            let granted = if remote.contains(NegotiateFlags::SUPPORTS_AES) {
                "aes"
            } else if remote.contains(NegotiateFlags::STRONG_KEYS) {
                "strong"
            } else {
                "des"
            };

            debug!(
                offered,
                granted,
                local = %format_args!("{:#010x}", local.bits()),
                remote = %format_args!("{:#010x}", remote.bits()),
                "server doesn't support the offered keys, downgrading and retrying"
            );

            local &= remote;
            client_challenge = Credential::random();
            continue;
        }

        chain.verify(&reply.server_credential, auth_type, auth_level)?;

        if requested == local {
            // No downgrade happened; keep only what the server actually
            // advertised before handing the chain out.
            chain.restrict_flags(remote);
        } else if local != remote {
            // One downgrade already happened this session; a second one is
            // never legitimate.
            error!(
                local = %format_args!("{:#010x}", local.bits()),
                remote = %format_args!("{:#010x}", remote.bits()),
                "server capabilities changed again after the downgrade retry"
            );
            return Err(Error::DowngradeDetected);
        }

        return Ok((chain, requested));
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn policy(
        require_128bit: bool,
        require_aes: bool,
        auto_negotiate: bool,
        reject_md5_servers: bool,
        require_strong_key: bool,
        weak_crypto_disallowed: bool,
    ) -> SchannelPolicy {
        SchannelPolicy {
            require_128bit,
            require_aes,
            auto_negotiate,
            reject_md5_servers,
            require_strong_key,
            weak_crypto_disallowed,
        }
    }

    #[test]
    fn default_policy_offers_base_flags() {
        let selection = select_flags(&SchannelPolicy::default(), SecureChannelType::Workstation);

        assert_eq!(
            selection.local,
            NegotiateFlags::AUTH2_FLAGS | NegotiateFlags::AUTHENTICATED_RPC
        );
        assert_eq!(selection.required, NegotiateFlags::AUTHENTICATED_RPC);
        assert!(!selection.auto_retry);
    }

    #[test]
    fn strong_key_tier_requires_legacy_cipher_and_strong_keys() {
        let selection = select_flags(&policy(true, false, false, false, false, false), SecureChannelType::Workstation);

        assert_eq!(selection.local, NegotiateFlags::AUTH2_ADS_FLAGS);
        assert_eq!(
            selection.required,
            NegotiateFlags::AUTHENTICATED_RPC | NegotiateFlags::ARCFOUR | NegotiateFlags::STRONG_KEYS
        );
    }

    #[test]
    fn aes_tier_supersedes_legacy_requirements() {
        let selection = select_flags(&SchannelPolicy::aes(), SecureChannelType::Workstation);

        assert_eq!(
            selection.required,
            NegotiateFlags::AUTHENTICATED_RPC | NegotiateFlags::PASSWORD_SET2 | NegotiateFlags::SUPPORTS_AES
        );
        // The implied strong-key bits stay in the offer even though the
        // requirement drops them.
        assert!(selection.local.contains(NegotiateFlags::STRONG_KEYS));
        assert!(selection.local.contains(NegotiateFlags::SUPPORTS_AES));
    }

    #[test]
    fn auto_negotiate_offers_aes_and_arms_the_retry() {
        let selection = select_flags(&SchannelPolicy::auto(false, false), SecureChannelType::Workstation);

        assert_eq!(
            selection.local,
            NegotiateFlags::AUTH2_ADS_FLAGS | NegotiateFlags::SUPPORTS_AES
        );
        assert_eq!(selection.required, NegotiateFlags::AUTHENTICATED_RPC);
        assert!(selection.auto_retry);
    }

    #[test]
    fn auto_negotiate_reads_reject_and_require_from_policy() {
        let selection = select_flags(&SchannelPolicy::auto(true, false), SecureChannelType::Workstation);

        assert!(selection.required.contains(NegotiateFlags::SUPPORTS_AES));
        assert!(selection.required.contains(NegotiateFlags::PASSWORD_SET2));
        assert!(!selection.required.contains(NegotiateFlags::STRONG_KEYS));
    }

    #[test]
    fn weak_crypto_disallowed_forces_md5_rejection() {
        let selection = select_flags(&policy(false, false, false, false, false, true), SecureChannelType::Workstation);

        assert!(selection.required.contains(NegotiateFlags::SUPPORTS_AES));
        assert!(selection.required.contains(NegotiateFlags::PASSWORD_SET2));
        assert!(selection.local.contains(NegotiateFlags::STRONG_KEYS));
    }

    #[test]
    fn rodc_accounts_offer_passthrough() {
        let selection = select_flags(&SchannelPolicy::default(), SecureChannelType::ReadOnlyDc);

        assert!(selection.local.contains(NegotiateFlags::RODC_PASSTHROUGH));

        let selection = select_flags(&SchannelPolicy::default(), SecureChannelType::Workstation);
        assert!(!selection.local.contains(NegotiateFlags::RODC_PASSTHROUGH));
    }

    proptest! {
        #[test]
        fn local_flags_always_cover_required_flags(
            require_128bit: bool,
            require_aes: bool,
            auto_negotiate: bool,
            reject_md5_servers: bool,
            require_strong_key: bool,
            weak_crypto_disallowed: bool,
        ) {
            let selection = select_flags(
                &policy(
                    require_128bit,
                    require_aes,
                    auto_negotiate,
                    reject_md5_servers,
                    require_strong_key,
                    weak_crypto_disallowed,
                ),
                SecureChannelType::Workstation,
            );

            prop_assert!(selection.local.contains(selection.required));
            // AES requirement never coexists with the legacy bits it
            // supersedes.
            if selection.required.contains(NegotiateFlags::SUPPORTS_AES) {
                prop_assert!(!selection.required.contains(NegotiateFlags::ARCFOUR));
                prop_assert!(!selection.required.contains(NegotiateFlags::STRONG_KEYS));
            }
        }

        #[test]
        fn stronger_requests_never_shrink_the_offer(
            reject_md5_servers: bool,
            require_strong_key: bool,
            weak_crypto_disallowed: bool,
        ) {
            let site = |require_128bit, require_aes, auto_negotiate| {
                select_flags(
                    &policy(
                        require_128bit,
                        require_aes,
                        auto_negotiate,
                        reject_md5_servers,
                        require_strong_key,
                        weak_crypto_disallowed,
                    ),
                    SecureChannelType::Workstation,
                )
                .local
            };

            let base = site(false, false, false);
            prop_assert!(site(true, false, false).contains(base));
            prop_assert!(site(true, true, false).contains(site(true, false, false)));
            prop_assert!(site(true, true, true).contains(site(true, true, false)));
        }
    }
}
