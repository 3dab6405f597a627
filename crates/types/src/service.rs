//! Service flags advertised in the version handshake.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Bitmask of services a peer advertises.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceFlags(pub u64);

impl ServiceFlags {
    /// No services.
    pub const NONE: Self = Self(0);
    /// Full node able to serve the complete block chain.
    pub const NETWORK: Self = Self(1 << 0);
    /// Node able to answer UTXO queries.
    pub const GETUTXO: Self = Self(1 << 1);
    /// Node supporting bloom-filtered connections.
    pub const BLOOM: Self = Self(1 << 2);

    /// True when every flag in `other` is set.
    pub fn has(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ServiceFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ServiceFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for ServiceFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceFlags({:#x})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has() {
        let flags = ServiceFlags::NETWORK | ServiceFlags::BLOOM;
        assert!(flags.has(ServiceFlags::NETWORK));
        assert!(flags.has(ServiceFlags::BLOOM));
        assert!(!flags.has(ServiceFlags::GETUTXO));
        assert!(!ServiceFlags::NONE.has(ServiceFlags::NETWORK));
    }
}
