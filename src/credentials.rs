use num_derive::{FromPrimitive, ToPrimitive};

use crate::secret::Secret;
use crate::{Error, Result};

/// Kind of trust relationship the account maintains with the domain
/// controller.
///
/// # MSDN
///
/// * [[MS-NRPC]: NETLOGON_SECURE_CHANNEL_TYPE](https://learn.microsoft.com/en-us/openspecs/windows_protocols/ms-nrpc/4d1235e3-2c96-4e9f-a147-3cb338a0d09f)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum SecureChannelType {
    Null = 0,
    MsvApSecureChannel = 1,
    #[default]
    Workstation = 2,
    DnsDomain = 3,
    Domain = 4,
    LanmanBdc = 5,
    Bdc = 6,
    ReadOnlyDc = 7,
}

/// Identity of the machine account the channel is keyed by.
#[derive(Debug, Clone)]
pub struct MachineAccount {
    /// sAMAccountName of the machine account, trailing `$` included.
    pub account_name: String,
    /// NetBIOS name the client presents as `computer_name` in each call.
    pub computer_name: String,
    pub channel_type: SecureChannelType,
    /// One-way function of the machine password; the credential chain is
    /// keyed from it.
    pub secret: Secret<Vec<u8>>,
}

impl MachineAccount {
    pub fn new(
        account_name: impl Into<String>,
        computer_name: impl Into<String>,
        channel_type: SecureChannelType,
        secret: impl Into<Secret<Vec<u8>>>,
    ) -> Self {
        Self {
            account_name: account_name.into(),
            computer_name: computer_name.into(),
            channel_type,
            secret: secret.into(),
        }
    }

    pub(crate) fn machine_secret(&self) -> Result<&Secret<Vec<u8>>> {
        if self.secret.is_empty() {
            return Err(Error::NoMachineSecret);
        }

        Ok(&self.secret)
    }
}
