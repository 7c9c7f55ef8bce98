use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Script verification flags.
///
/// Each flag switches on one rule beyond the base consensus checks. Combine them with `|`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct VerifyFlags(u32);

impl VerifyFlags {
    pub const NONE: VerifyFlags = VerifyFlags(0);
    /// Evaluate pay to script hash redeem scripts.
    pub const P2SH: VerifyFlags = VerifyFlags(1 << 0);
    /// Signatures and public keys must be canonically encoded.
    pub const STRICTENC: VerifyFlags = VerifyFlags(1 << 1);
    /// Signatures must be strict DER.
    pub const DERSIG: VerifyFlags = VerifyFlags(1 << 2);
    /// Signatures must have S in the lower half of the curve order.
    pub const LOW_S: VerifyFlags = VerifyFlags(1 << 3);
    /// The extra element popped by CHECKMULTISIG must be empty.
    pub const NULLDUMMY: VerifyFlags = VerifyFlags(1 << 4);
    /// scriptSig may only contain pushes.
    pub const SIGPUSHONLY: VerifyFlags = VerifyFlags(1 << 5);
    /// Pushes and numeric operands must use their shortest encoding.
    pub const MINIMALDATA: VerifyFlags = VerifyFlags(1 << 6);
    pub const DISCOURAGE_UPGRADABLE_NOPS: VerifyFlags = VerifyFlags(1 << 7);
    /// Exactly one element must remain after evaluation. Only meaningful together with P2SH.
    pub const CLEANSTACK: VerifyFlags = VerifyFlags(1 << 8);
    /// Enforce OP_CHECKLOCKTIMEVERIFY instead of treating it as OP_NOP2.
    pub const CHECKLOCKTIMEVERIFY: VerifyFlags = VerifyFlags(1 << 9);

    /// Rules used when validating blocks.
    pub const CONSENSUS: VerifyFlags = VerifyFlags(Self::P2SH.0 | Self::CHECKLOCKTIMEVERIFY.0);

    /// Everything, for relay-policy style checks.
    pub const STANDARD: VerifyFlags = VerifyFlags(
        Self::P2SH.0
            | Self::STRICTENC.0
            | Self::DERSIG.0
            | Self::LOW_S.0
            | Self::NULLDUMMY.0
            | Self::MINIMALDATA.0
            | Self::DISCOURAGE_UPGRADABLE_NOPS.0
            | Self::CLEANSTACK.0
            | Self::CHECKLOCKTIMEVERIFY.0,
    );

    pub fn contains(&self, other: VerifyFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn bits(&self) -> u32 {
        self.0
    }
}

impl BitOr for VerifyFlags {
    type Output = VerifyFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        VerifyFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for VerifyFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for VerifyFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(VerifyFlags, &str); 10] = [
            (VerifyFlags::P2SH, "P2SH"),
            (VerifyFlags::STRICTENC, "STRICTENC"),
            (VerifyFlags::DERSIG, "DERSIG"),
            (VerifyFlags::LOW_S, "LOW_S"),
            (VerifyFlags::NULLDUMMY, "NULLDUMMY"),
            (VerifyFlags::SIGPUSHONLY, "SIGPUSHONLY"),
            (VerifyFlags::MINIMALDATA, "MINIMALDATA"),
            (VerifyFlags::DISCOURAGE_UPGRADABLE_NOPS, "DISCOURAGE_UPGRADABLE_NOPS"),
            (VerifyFlags::CLEANSTACK, "CLEANSTACK"),
            (VerifyFlags::CHECKLOCKTIMEVERIFY, "CHECKLOCKTIMEVERIFY"),
        ];
        let set: Vec<&str> = NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "VerifyFlags({})", set.join("|"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combine_and_query() {
        let f = VerifyFlags::P2SH | VerifyFlags::LOW_S;
        assert!(f.contains(VerifyFlags::P2SH));
        assert!(!f.contains(VerifyFlags::DERSIG));
        assert!(VerifyFlags::STANDARD.contains(f));
        assert!(!VerifyFlags::STANDARD.contains(VerifyFlags::SIGPUSHONLY));
        assert_eq!(format!("{:?}", f), "VerifyFlags(P2SH|LOW_S)");
    }
}
