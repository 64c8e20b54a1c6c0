use bitflags::bitflags;

bitflags! {
    /// Capability bits each side advertises during the netlogon
    /// challenge/authenticate exchange.
    ///
    /// # MSDN
    ///
    /// * [[MS-NRPC]: Netlogon Negotiable Options](https://learn.microsoft.com/en-us/openspecs/windows_protocols/ms-nrpc/5805bc9f-e4c9-4c8a-b191-3c3a7de7eeed)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
    pub struct NegotiateFlags: u32 {
        const ACCOUNT_LOCKOUT = 0x0000_0001;
        const PERSISTENT_SAMREPL = 0x0000_0002;
        /// Legacy RC4-based channel cipher.
        const ARCFOUR = 0x0000_0004;
        const PROMOTION_COUNT = 0x0000_0008;
        const CHANGELOG_BDC = 0x0000_0010;
        const FULL_SYNC_REPL = 0x0000_0020;
        const MULTIPLE_SIDS = 0x0000_0040;
        const REDO = 0x0000_0080;
        const PASSWORD_CHANGE_REFUSAL = 0x0000_0100;
        const SEND_PASSWORD_INFO_PDC = 0x0000_0200;
        const GENERIC_PASSTHROUGH = 0x0000_0400;
        const CONCURRENT_RPC = 0x0000_0800;
        const AVOID_ACCOUNT_DB_REPL = 0x0000_1000;
        const AVOID_SECURITYAUTH_DB_REPL = 0x0000_2000;
        /// 128-bit session keys.
        const STRONG_KEYS = 0x0000_4000;
        const TRANSITIVE_TRUSTS = 0x0000_8000;
        const DNS_DOMAIN_TRUSTS = 0x0001_0000;
        /// SamrServerPasswordSet2-style password changes.
        const PASSWORD_SET2 = 0x0002_0000;
        const GET_DOMAIN_INFO = 0x0004_0000;
        const CROSS_FOREST_TRUSTS = 0x0008_0000;
        const NEUTRALIZE_NT4_EMULATION = 0x0010_0000;
        /// Pass-through authentication for read-only domain controllers.
        const RODC_PASSTHROUGH = 0x0020_0000;
        /// AES-CFB8 channel cipher with SHA-2 session-key derivation.
        const SUPPORTS_AES = 0x0100_0000;
        const AUTHENTICATED_RPC_LSASS = 0x2000_0000;
        /// Calls after the exchange must run over an authenticated binding.
        const AUTHENTICATED_RPC = 0x4000_0000;

        /// Base set offered by NT4-era clients.
        const AUTH2_FLAGS = Self::ACCOUNT_LOCKOUT.bits()
            | Self::PERSISTENT_SAMREPL.bits()
            | Self::ARCFOUR.bits()
            | Self::PROMOTION_COUNT.bits()
            | Self::CHANGELOG_BDC.bits()
            | Self::FULL_SYNC_REPL.bits()
            | Self::MULTIPLE_SIDS.bits()
            | Self::REDO.bits()
            | Self::PASSWORD_CHANGE_REFUSAL.bits()
            | Self::DNS_DOMAIN_TRUSTS.bits()
            | Self::PASSWORD_SET2.bits()
            | Self::GET_DOMAIN_INFO.bits();

        /// Extended set offered by AD-capable clients.
        const AUTH2_ADS_FLAGS = Self::ACCOUNT_LOCKOUT.bits()
            | Self::PERSISTENT_SAMREPL.bits()
            | Self::ARCFOUR.bits()
            | Self::PROMOTION_COUNT.bits()
            | Self::CHANGELOG_BDC.bits()
            | Self::FULL_SYNC_REPL.bits()
            | Self::MULTIPLE_SIDS.bits()
            | Self::REDO.bits()
            | Self::PASSWORD_CHANGE_REFUSAL.bits()
            | Self::SEND_PASSWORD_INFO_PDC.bits()
            | Self::GENERIC_PASSTHROUGH.bits()
            | Self::CONCURRENT_RPC.bits()
            | Self::AVOID_ACCOUNT_DB_REPL.bits()
            | Self::AVOID_SECURITYAUTH_DB_REPL.bits()
            | Self::STRONG_KEYS.bits()
            | Self::TRANSITIVE_TRUSTS.bits()
            | Self::DNS_DOMAIN_TRUSTS.bits()
            | Self::PASSWORD_SET2.bits()
            | Self::GET_DOMAIN_INFO.bits()
            | Self::CROSS_FOREST_TRUSTS.bits()
            | Self::AUTHENTICATED_RPC_LSASS.bits()
            | Self::AUTHENTICATED_RPC.bits();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_offer_sets() {
        assert_eq!(NegotiateFlags::AUTH2_FLAGS.bits(), 0x0007_01FF);
        assert_eq!(NegotiateFlags::AUTH2_ADS_FLAGS.bits(), 0x600F_FFFF);
        assert!(NegotiateFlags::AUTH2_ADS_FLAGS.contains(NegotiateFlags::AUTH2_FLAGS));
        assert!(!NegotiateFlags::AUTH2_ADS_FLAGS.contains(NegotiateFlags::SUPPORTS_AES));
    }
}
