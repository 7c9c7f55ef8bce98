use std::fmt;

/// Reasons a script fails to authorize a spend.
///
/// Every variant means "this input cannot spend this output", none of them are program faults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    /// The script is larger than the 10,000 byte limit.
    ScriptSize,
    /// A push runs past the end of the script.
    MalformedPush,
    /// A single push is larger than 520 bytes.
    PushSize,
    /// More than 201 non-push operations.
    OpCount,
    /// Stack plus alt-stack exceed 1,000 elements.
    StackSize,
    /// An operation needed more stack elements than were present.
    InvalidStackOperation,
    /// Same as above, for the alt stack.
    InvalidAltStackOperation,
    /// CAT, SUBSTR, multiply and friends.
    DisabledOpcode(u8),
    /// Reserved, VERIF/VERNOTIF or undefined opcode.
    BadOpcode(u8),
    /// Upgradable NOP used while DISCOURAGE_UPGRADABLE_NOPS is set.
    DiscourageUpgradableNops,
    /// ELSE/ENDIF without IF, or IF without ENDIF.
    UnbalancedConditional,
    /// OP_RETURN executed.
    OpReturn,
    /// A *VERIFY operation found false.
    VerifyFailed(&'static str),
    /// A numeric operand is longer than allowed.
    NumberOverflow,
    /// A numeric operand or push is not minimally encoded under MINIMALDATA.
    MinimalData,
    NegativeLockTime,
    LockTimeTypeMismatch,
    LockTimeNotSatisfied,
    /// The spending input has a final sequence number.
    FinalInputForLockTime,
    /// CHECKLOCKTIMEVERIFY or a signature check needs a transaction.
    NoTransactionContext,
    PubKeyCount,
    SigCount,
    NullDummy,
    SigPushOnly,
    CleanStack,
    /// The scriptSig of a P2SH spend contains non-push operations.
    P2shNotPushOnly,
    /// The final stack is empty or its top is false.
    EvalFalse,
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ScriptError::ScriptSize => f.write_str("Script larger than 10,000 bytes"),
            ScriptError::MalformedPush => f.write_str("Push data extends past end of script"),
            ScriptError::PushSize => f.write_str("Push data larger than 520 bytes"),
            ScriptError::OpCount => f.write_str("More script operations than allowed"),
            ScriptError::StackSize => f.write_str("Stack size exceeded range"),
            ScriptError::InvalidStackOperation => {
                f.write_str("Operation on a stack that is too small")
            }
            ScriptError::InvalidAltStackOperation => f.write_str("Operation on an empty alt stack"),
            ScriptError::DisabledOpcode(op) => {
                write!(f, "Script included disabled opcode {:#04x}", op)
            }
            ScriptError::BadOpcode(op) => write!(f, "Script included bad opcode {:#04x}", op),
            ScriptError::DiscourageUpgradableNops => {
                f.write_str("Upgradable NOP used with DISCOURAGE_UPGRADABLE_NOPS")
            }
            ScriptError::UnbalancedConditional => f.write_str("Unbalanced conditional"),
            ScriptError::OpReturn => f.write_str("Script called OP_RETURN"),
            ScriptError::VerifyFailed(op) => write!(f, "Script failed {}", op),
            ScriptError::NumberOverflow => f.write_str("Script number longer than allowed"),
            ScriptError::MinimalData => f.write_str("Data not minimally encoded"),
            ScriptError::NegativeLockTime => f.write_str("Negative locktime"),
            ScriptError::LockTimeTypeMismatch => f.write_str("Locktime requirement type mismatch"),
            ScriptError::LockTimeNotSatisfied => f.write_str("Locktime requirement not satisfied"),
            ScriptError::FinalInputForLockTime => f.write_str(
                "Transaction contains a final transaction input for a CHECKLOCKTIMEVERIFY script",
            ),
            ScriptError::NoTransactionContext => f.write_str("Operation requires a transaction"),
            ScriptError::PubKeyCount => {
                f.write_str("OP_CHECKMULTISIG with pubkey count out of range")
            }
            ScriptError::SigCount => f.write_str("OP_CHECKMULTISIG with sig count out of range"),
            ScriptError::NullDummy => f.write_str("OP_CHECKMULTISIG with non-null dummy"),
            ScriptError::SigPushOnly => f.write_str("scriptSig contains non-push operations"),
            ScriptError::CleanStack => f.write_str("Stack not clean after evaluation"),
            ScriptError::P2shNotPushOnly => f.write_str(
                "Attempted to spend a P2SH scriptPubKey with a script that contained script ops",
            ),
            ScriptError::EvalFalse => f.write_str("Script resulted in a non-true stack"),
        }
    }
}

impl std::error::Error for ScriptError {}
