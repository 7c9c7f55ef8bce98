use crate::bitcoin::script::ScriptError;
use bytes::{Buf, BufMut, Bytes};

/// Largest element that may be pushed onto the stack.
pub const MAX_SCRIPT_ELEMENT_SIZE: usize = 520;

// Generates the Operation enum and both directions of the opcode table from one list, so the
// two can never disagree.
macro_rules! operations {
    ($($(#[$doc:meta])* $name:ident = $code:literal,)*) => {
        /// One chunk of a script: an opcode, or a push together with its data.
        ///
        /// The push variants record which encoding was used so that re-serializing a parsed script
        /// reproduces its bytes exactly.
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        #[allow(non_camel_case_types)] // we want to keep the Bitcoin standard naming convention
        pub enum Operation {
            /// Pushes an empty array onto the stack.
            OP_0,
            /// Pushes 1-75 bytes, the opcode is the length.
            OP_PUSH(Bytes),
            /// The next byte sets the number of bytes to push onto the stack
            OP_PUSHDATA1(Bytes),
            /// The next two bytes sets the number of bytes to push onto the stack
            OP_PUSHDATA2(Bytes),
            /// The next four bytes sets the number of bytes to push onto the stack
            OP_PUSHDATA4(Bytes),
            $($(#[$doc])* $name,)*
            /// Any byte without an assigned meaning.
            OP_UNKNOWN(u8),
        }

        impl Operation {
            /// The opcode byte that starts this operation.
            pub fn opcode(&self) -> u8 {
                match self {
                    Operation::OP_0 => 0,
                    Operation::OP_PUSH(data) => data.len() as u8,
                    Operation::OP_PUSHDATA1(_) => 76,
                    Operation::OP_PUSHDATA2(_) => 77,
                    Operation::OP_PUSHDATA4(_) => 78,
                    $(Operation::$name => $code,)*
                    Operation::OP_UNKNOWN(code) => *code,
                }
            }

            // opcodes that carry no data
            fn from_plain_opcode(code: u8) -> Operation {
                match code {
                    $($code => Operation::$name,)*
                    other => Operation::OP_UNKNOWN(other),
                }
            }
        }
    };
}

operations! {
    /// Pushes -1 onto the stack
    OP_1NEGATE = 79,
    OP_RESERVED = 80,
    OP_1 = 81,
    OP_2 = 82,
    OP_3 = 83,
    OP_4 = 84,
    OP_5 = 85,
    OP_6 = 86,
    OP_7 = 87,
    OP_8 = 88,
    OP_9 = 89,
    OP_10 = 90,
    OP_11 = 91,
    OP_12 = 92,
    OP_13 = 93,
    OP_14 = 94,
    OP_15 = 95,
    OP_16 = 96,
    OP_NOP = 97,
    OP_VER = 98,
    OP_IF = 99,
    OP_NOTIF = 100,
    /// Fails even inside an unexecuted branch.
    OP_VERIF = 101,
    /// Fails even inside an unexecuted branch.
    OP_VERNOTIF = 102,
    OP_ELSE = 103,
    OP_ENDIF = 104,
    OP_VERIFY = 105,
    OP_RETURN = 106,
    OP_TOALTSTACK = 107,
    OP_FROMALTSTACK = 108,
    OP_2DROP = 109,
    OP_2DUP = 110,
    OP_3DUP = 111,
    OP_2OVER = 112,
    OP_2ROT = 113,
    OP_2SWAP = 114,
    OP_IFDUP = 115,
    OP_DEPTH = 116,
    OP_DROP = 117,
    OP_DUP = 118,
    OP_NIP = 119,
    OP_OVER = 120,
    OP_PICK = 121,
    OP_ROLL = 122,
    OP_ROT = 123,
    OP_SWAP = 124,
    OP_TUCK = 125,
    OP_CAT = 126,
    OP_SUBSTR = 127,
    OP_LEFT = 128,
    OP_RIGHT = 129,
    OP_SIZE = 130,
    OP_INVERT = 131,
    OP_AND = 132,
    OP_OR = 133,
    OP_XOR = 134,
    OP_EQUAL = 135,
    OP_EQUALVERIFY = 136,
    OP_RESERVED1 = 137,
    OP_RESERVED2 = 138,
    OP_1ADD = 139,
    OP_1SUB = 140,
    OP_2MUL = 141,
    OP_2DIV = 142,
    OP_NEGATE = 143,
    OP_ABS = 144,
    OP_NOT = 145,
    OP_0NOTEQUAL = 146,
    OP_ADD = 147,
    OP_SUB = 148,
    OP_MUL = 149,
    OP_DIV = 150,
    OP_MOD = 151,
    OP_LSHIFT = 152,
    OP_RSHIFT = 153,
    OP_BOOLAND = 154,
    OP_BOOLOR = 155,
    OP_NUMEQUAL = 156,
    OP_NUMEQUALVERIFY = 157,
    OP_NUMNOTEQUAL = 158,
    OP_LESSTHAN = 159,
    OP_GREATERTHAN = 160,
    OP_LESSTHANOREQUAL = 161,
    OP_GREATERTHANOREQUAL = 162,
    OP_MIN = 163,
    OP_MAX = 164,
    OP_WITHIN = 165,
    OP_RIPEMD160 = 166,
    OP_SHA1 = 167,
    OP_SHA256 = 168,
    OP_HASH160 = 169,
    OP_HASH256 = 170,
    /// Signature checks only cover the script after the most recent separator.
    OP_CODESEPARATOR = 171,
    OP_CHECKSIG = 172,
    OP_CHECKSIGVERIFY = 173,
    OP_CHECKMULTISIG = 174,
    OP_CHECKMULTISIGVERIFY = 175,
    OP_NOP1 = 176,
    /// Formerly OP_NOP2.
    OP_CHECKLOCKTIMEVERIFY = 177,
    OP_NOP3 = 178,
    OP_NOP4 = 179,
    OP_NOP5 = 180,
    OP_NOP6 = 181,
    OP_NOP7 = 182,
    OP_NOP8 = 183,
    OP_NOP9 = 184,
    OP_NOP10 = 185,
}

impl Operation {
    pub const OP_FALSE: Operation = Operation::OP_0;
    pub const OP_TRUE: Operation = Operation::OP_1;

    /// The smallest operation that pushes `data`.
    pub fn push(data: impl Into<Bytes>) -> Operation {
        let data: Bytes = data.into();
        match data.len() {
            0 => Operation::OP_0,
            1..=75 => Operation::OP_PUSH(data),
            76..=0xff => Operation::OP_PUSHDATA1(data),
            0x100..=0xffff => Operation::OP_PUSHDATA2(data),
            _ => Operation::OP_PUSHDATA4(data),
        }
    }

    /// The operation pushing the small integer `n` (-1..=16), None outside that range.
    pub fn small_int(n: i64) -> Option<Operation> {
        match n {
            -1 => Some(Operation::OP_1NEGATE),
            0 => Some(Operation::OP_0),
            1..=16 => Some(Operation::from_plain_opcode(80 + n as u8)),
            _ => None,
        }
    }

    /// The value of OP_0, OP_1NEGATE and OP_1..OP_16.
    pub fn small_int_value(&self) -> Option<i64> {
        match self.opcode() {
            0 => Some(0),
            79 => Some(-1),
            c @ 81..=96 => Some(c as i64 - 80),
            _ => None,
        }
    }

    /// The data a push operation places on the stack.
    pub fn push_data(&self) -> Option<&Bytes> {
        match self {
            Operation::OP_PUSH(d)
            | Operation::OP_PUSHDATA1(d)
            | Operation::OP_PUSHDATA2(d)
            | Operation::OP_PUSHDATA4(d) => Some(d),
            _ => None,
        }
    }

    /// Push-only in the consensus sense: any opcode up to OP_16, OP_RESERVED included.
    pub fn is_push(&self) -> bool {
        self.opcode() <= 96
    }

    /// Operations that count toward the 201 operation limit.
    pub fn counts_toward_limit(&self) -> bool {
        self.opcode() > 96
    }

    pub fn is_disabled(&self) -> bool {
        matches!(
            self,
            Operation::OP_CAT
                | Operation::OP_SUBSTR
                | Operation::OP_LEFT
                | Operation::OP_RIGHT
                | Operation::OP_INVERT
                | Operation::OP_AND
                | Operation::OP_OR
                | Operation::OP_XOR
                | Operation::OP_2MUL
                | Operation::OP_2DIV
                | Operation::OP_MUL
                | Operation::OP_DIV
                | Operation::OP_MOD
                | Operation::OP_LSHIFT
                | Operation::OP_RSHIFT
        )
    }

    pub fn is_conditional(&self) -> bool {
        matches!(
            self,
            Operation::OP_IF | Operation::OP_NOTIF | Operation::OP_ELSE | Operation::OP_ENDIF
        )
    }

    /// NOPs reserved for soft-fork upgrades.
    pub fn is_upgradable_nop(&self) -> bool {
        matches!(self.opcode(), 176 | 178..=185)
    }

    /// True when no shorter encoding pushes the same data.
    pub fn is_minimal_push(&self) -> bool {
        let Some(data) = self.push_data() else {
            return true;
        };
        match data.len() {
            0 => matches!(self, Operation::OP_0),
            1 if (1..=16).contains(&data[0]) || data[0] == 0x81 => false,
            1..=75 => matches!(self, Operation::OP_PUSH(_)),
            76..=0xff => matches!(self, Operation::OP_PUSHDATA1(_)),
            0x100..=0xffff => matches!(self, Operation::OP_PUSHDATA2(_)),
            _ => true,
        }
    }

    /// Read one operation from the buffer.
    pub fn read(buffer: &mut dyn Buf) -> Result<Operation, ScriptError> {
        if !buffer.has_remaining() {
            return Err(ScriptError::MalformedPush);
        }
        let code = buffer.get_u8();
        let size = match code {
            0 => return Ok(Operation::OP_0),
            1..=75 => code as usize,
            76 if buffer.remaining() >= 1 => buffer.get_u8() as usize,
            77 if buffer.remaining() >= 2 => buffer.get_u16_le() as usize,
            78 if buffer.remaining() >= 4 => buffer.get_u32_le() as usize,
            76..=78 => return Err(ScriptError::MalformedPush),
            _ => return Ok(Operation::from_plain_opcode(code)),
        };
        if size > buffer.remaining() {
            return Err(ScriptError::MalformedPush);
        }
        let data = buffer.copy_to_bytes(size);
        Ok(match code {
            76 => Operation::OP_PUSHDATA1(data),
            77 => Operation::OP_PUSHDATA2(data),
            78 => Operation::OP_PUSHDATA4(data),
            _ => Operation::OP_PUSH(data),
        })
    }

    /// Write the operation in its recorded encoding.
    pub fn write(&self, buffer: &mut dyn BufMut) {
        buffer.put_u8(self.opcode());
        match self {
            Operation::OP_PUSHDATA1(d) => buffer.put_u8(d.len() as u8),
            Operation::OP_PUSHDATA2(d) => buffer.put_u16_le(d.len() as u16),
            Operation::OP_PUSHDATA4(d) => buffer.put_u32_le(d.len() as u32),
            _ => {}
        }
        if let Some(d) = self.push_data() {
            buffer.put_slice(d);
        }
    }

    /// Encoded length in bytes.
    pub fn size(&self) -> usize {
        match self {
            Operation::OP_PUSH(d) => d.len() + 1,
            Operation::OP_PUSHDATA1(d) => d.len() + 2,
            Operation::OP_PUSHDATA2(d) => d.len() + 3,
            Operation::OP_PUSHDATA4(d) => d.len() + 5,
            _ => 1,
        }
    }
}
