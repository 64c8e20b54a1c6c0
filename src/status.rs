use std::fmt;

use num_derive::{FromPrimitive, ToPrimitive};

/// NTSTATUS codes the secure-channel flows dispatch on.
///
/// Application-level results and RPC faults both arrive as NTSTATUS values;
/// anything a flow does not recognize is surfaced verbatim by numeric value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum NtStatus {
    Ok = 0x0000_0000,
    NotImplemented = 0xC000_0002,
    NoMemory = 0xC000_0017,
    AccessDenied = 0xC000_0022,
    InternalError = 0xC000_00E5,
    DowngradeDetected = 0xC000_0388,
    RpcProcnumOutOfRange = 0xC002_002E,
    RpcEnumValueOutOfRange = 0xC003_000A,
    RpcBadStubData = 0xC003_000C,
}

impl NtStatus {
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    pub fn is_ok(self) -> bool {
        self == NtStatus::Ok
    }
}

impl fmt::Display for NtStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({:#010x})", self, self.as_u32())
    }
}

/// Win32 error codes returned by the LogonControl query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum WError {
    Ok = 0x0000_0000,
    AccessDenied = 0x0000_0005,
    NotSupported = 0x0000_0032,
    InvalidLevel = 0x0000_007C,
}

impl WError {
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for WError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({:#010x})", self, self.as_u32())
    }
}

#[cfg(test)]
mod tests {
    use num_traits::FromPrimitive;

    use super::*;

    #[test]
    fn nt_status_from_wire_value() {
        assert_eq!(NtStatus::from_u32(0xC000_0022), Some(NtStatus::AccessDenied));
        assert_eq!(NtStatus::from_u32(0xC002_002E), Some(NtStatus::RpcProcnumOutOfRange));
        assert_eq!(NtStatus::from_u32(0xDEAD_BEEF), None);
    }

    #[test]
    fn werror_from_wire_value() {
        assert_eq!(WError::from_u32(0x32), Some(WError::NotSupported));
        assert_eq!(WError::from_u32(0), Some(WError::Ok));
    }
}
