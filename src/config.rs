/// Channel-security policy for schannel establishment.
///
/// The policy is handed to the initiators explicitly; nothing here is read
/// from ambient configuration. The first three fields express what the
/// caller asks of this session, the last three are site-wide policy
/// consulted when `auto_negotiate` is set (and `weak_crypto_disallowed`
/// unconditionally).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SchannelPolicy {
    /// Require 128-bit session keys.
    pub require_128bit: bool,
    /// Require the AES channel cipher.
    pub require_aes: bool,
    /// Offer the strongest crypto available and allow a single downgrade
    /// retry if the server refuses it.
    pub auto_negotiate: bool,
    /// Refuse servers that only speak the legacy MD5-based key derivation.
    pub reject_md5_servers: bool,
    /// Insist on a strong (128-bit) session key.
    pub require_strong_key: bool,
    /// Site-wide switch disallowing weak crypto; forces MD5 rejection.
    pub weak_crypto_disallowed: bool,
}

impl SchannelPolicy {
    /// Policy requiring the AES cipher outright.
    pub fn aes() -> Self {
        Self {
            require_aes: true,
            ..Self::default()
        }
    }

    /// Policy negotiating the strongest mutually supported crypto, with the
    /// reject/require knobs taken from the given site policy.
    pub fn auto(reject_md5_servers: bool, require_strong_key: bool) -> Self {
        Self {
            auto_negotiate: true,
            reject_md5_servers,
            require_strong_key,
            ..Self::default()
        }
    }
}
