//! CIL opcode table.
//!
//! Only the opcodes that matter to decrypter bodies and their call sites are modelled.
//! Each opcode carries its raw encoding (`0xFEnn` for two-byte opcodes), mnemonic,
//! operand kind and control-flow class.

use strum::{EnumCount, EnumIter};

/// Encoding of an instruction's inline operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandKind {
    /// No operand
    None,
    /// `int8` immediate
    ShortI,
    /// `int32` immediate
    I,
    /// `int64` immediate
    I8,
    /// `float32` immediate
    ShortR,
    /// `float64` immediate
    R,
    /// `uint8` argument or local index
    ShortVar,
    /// `uint16` argument or local index
    Var,
    /// Metadata token
    Token,
    /// `#US` heap token
    String,
    /// `int8` relative branch offset
    ShortBranch,
    /// `int32` relative branch offset
    Branch,
    /// Jump table
    Switch,
}

/// How an instruction transfers control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowType {
    /// Falls through to the next instruction
    Sequential,
    /// Either branches or falls through, depending on the stack
    ConditionalBranch,
    /// Always branches
    UnconditionalBranch,
    /// Indexed jump table with fall-through default
    Switch,
    /// Invokes another method, then falls through
    Call,
    /// Leaves the method
    Return,
    /// Raises an exception
    Throw,
    /// Ends a `finally` or `fault` handler
    EndFinally,
}

macro_rules! opcodes {
    ($( $variant:ident = $code:literal, $mnemonic:literal, $operand:ident; )*) => {
        /// A CIL opcode.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount)]
        pub enum OpCode {
            $(
                #[doc = $mnemonic]
                $variant,
            )*
        }

        impl OpCode {
            /// Raw encoding; two-byte opcodes are returned as `0xFEnn`.
            #[must_use]
            pub const fn code(self) -> u16 {
                match self {
                    $( OpCode::$variant => $code, )*
                }
            }

            /// The ILASM mnemonic.
            #[must_use]
            pub const fn mnemonic(self) -> &'static str {
                match self {
                    $( OpCode::$variant => $mnemonic, )*
                }
            }

            /// The encoding of the inline operand.
            #[must_use]
            pub const fn operand_kind(self) -> OperandKind {
                match self {
                    $( OpCode::$variant => OperandKind::$operand, )*
                }
            }

            /// Looks up an opcode by its raw encoding.
            #[must_use]
            pub fn from_code(code: u16) -> Option<Self> {
                match code {
                    $( $code => Some(OpCode::$variant), )*
                    _ => None,
                }
            }
        }
    };
}

opcodes! {
    Nop = 0x00, "nop", None;
    Ldarg0 = 0x02, "ldarg.0", None;
    Ldarg1 = 0x03, "ldarg.1", None;
    Ldarg2 = 0x04, "ldarg.2", None;
    Ldarg3 = 0x05, "ldarg.3", None;
    Ldloc0 = 0x06, "ldloc.0", None;
    Ldloc1 = 0x07, "ldloc.1", None;
    Ldloc2 = 0x08, "ldloc.2", None;
    Ldloc3 = 0x09, "ldloc.3", None;
    Stloc0 = 0x0A, "stloc.0", None;
    Stloc1 = 0x0B, "stloc.1", None;
    Stloc2 = 0x0C, "stloc.2", None;
    Stloc3 = 0x0D, "stloc.3", None;
    LdargS = 0x0E, "ldarg.s", ShortVar;
    LdargaS = 0x0F, "ldarga.s", ShortVar;
    StargS = 0x10, "starg.s", ShortVar;
    LdlocS = 0x11, "ldloc.s", ShortVar;
    LdlocaS = 0x12, "ldloca.s", ShortVar;
    StlocS = 0x13, "stloc.s", ShortVar;
    Ldnull = 0x14, "ldnull", None;
    LdcI4M1 = 0x15, "ldc.i4.m1", None;
    LdcI4_0 = 0x16, "ldc.i4.0", None;
    LdcI4_1 = 0x17, "ldc.i4.1", None;
    LdcI4_2 = 0x18, "ldc.i4.2", None;
    LdcI4_3 = 0x19, "ldc.i4.3", None;
    LdcI4_4 = 0x1A, "ldc.i4.4", None;
    LdcI4_5 = 0x1B, "ldc.i4.5", None;
    LdcI4_6 = 0x1C, "ldc.i4.6", None;
    LdcI4_7 = 0x1D, "ldc.i4.7", None;
    LdcI4_8 = 0x1E, "ldc.i4.8", None;
    LdcI4S = 0x1F, "ldc.i4.s", ShortI;
    LdcI4 = 0x20, "ldc.i4", I;
    LdcI8 = 0x21, "ldc.i8", I8;
    LdcR4 = 0x22, "ldc.r4", ShortR;
    LdcR8 = 0x23, "ldc.r8", R;
    Dup = 0x25, "dup", None;
    Pop = 0x26, "pop", None;
    Call = 0x28, "call", Token;
    Ret = 0x2A, "ret", None;
    BrS = 0x2B, "br.s", ShortBranch;
    BrfalseS = 0x2C, "brfalse.s", ShortBranch;
    BrtrueS = 0x2D, "brtrue.s", ShortBranch;
    BeqS = 0x2E, "beq.s", ShortBranch;
    BgeS = 0x2F, "bge.s", ShortBranch;
    BgtS = 0x30, "bgt.s", ShortBranch;
    BleS = 0x31, "ble.s", ShortBranch;
    BltS = 0x32, "blt.s", ShortBranch;
    BneUnS = 0x33, "bne.un.s", ShortBranch;
    BgeUnS = 0x34, "bge.un.s", ShortBranch;
    BgtUnS = 0x35, "bgt.un.s", ShortBranch;
    BleUnS = 0x36, "ble.un.s", ShortBranch;
    BltUnS = 0x37, "blt.un.s", ShortBranch;
    Br = 0x38, "br", Branch;
    Brfalse = 0x39, "brfalse", Branch;
    Brtrue = 0x3A, "brtrue", Branch;
    Beq = 0x3B, "beq", Branch;
    Bge = 0x3C, "bge", Branch;
    Bgt = 0x3D, "bgt", Branch;
    Ble = 0x3E, "ble", Branch;
    Blt = 0x3F, "blt", Branch;
    BneUn = 0x40, "bne.un", Branch;
    BgeUn = 0x41, "bge.un", Branch;
    BgtUn = 0x42, "bgt.un", Branch;
    BleUn = 0x43, "ble.un", Branch;
    BltUn = 0x44, "blt.un", Branch;
    Switch = 0x45, "switch", Switch;
    LdindI1 = 0x46, "ldind.i1", None;
    LdindU1 = 0x47, "ldind.u1", None;
    LdindI2 = 0x48, "ldind.i2", None;
    LdindU2 = 0x49, "ldind.u2", None;
    LdindI4 = 0x4A, "ldind.i4", None;
    LdindU4 = 0x4B, "ldind.u4", None;
    LdindI8 = 0x4C, "ldind.i8", None;
    LdindI = 0x4D, "ldind.i", None;
    LdindR4 = 0x4E, "ldind.r4", None;
    LdindR8 = 0x4F, "ldind.r8", None;
    LdindRef = 0x50, "ldind.ref", None;
    StindRef = 0x51, "stind.ref", None;
    StindI1 = 0x52, "stind.i1", None;
    StindI2 = 0x53, "stind.i2", None;
    StindI4 = 0x54, "stind.i4", None;
    Add = 0x58, "add", None;
    Sub = 0x59, "sub", None;
    Mul = 0x5A, "mul", None;
    Div = 0x5B, "div", None;
    DivUn = 0x5C, "div.un", None;
    Rem = 0x5D, "rem", None;
    RemUn = 0x5E, "rem.un", None;
    And = 0x5F, "and", None;
    Or = 0x60, "or", None;
    Xor = 0x61, "xor", None;
    Shl = 0x62, "shl", None;
    Shr = 0x63, "shr", None;
    ShrUn = 0x64, "shr.un", None;
    Neg = 0x65, "neg", None;
    Not = 0x66, "not", None;
    ConvI1 = 0x67, "conv.i1", None;
    ConvI2 = 0x68, "conv.i2", None;
    ConvI4 = 0x69, "conv.i4", None;
    ConvI8 = 0x6A, "conv.i8", None;
    ConvR4 = 0x6B, "conv.r4", None;
    ConvR8 = 0x6C, "conv.r8", None;
    ConvU4 = 0x6D, "conv.u4", None;
    ConvU8 = 0x6E, "conv.u8", None;
    Callvirt = 0x6F, "callvirt", Token;
    Ldstr = 0x72, "ldstr", String;
    Newobj = 0x73, "newobj", Token;
    Castclass = 0x74, "castclass", Token;
    Isinst = 0x75, "isinst", Token;
    Throw = 0x7A, "throw", None;
    Ldfld = 0x7B, "ldfld", Token;
    Ldflda = 0x7C, "ldflda", Token;
    Stfld = 0x7D, "stfld", Token;
    Ldsfld = 0x7E, "ldsfld", Token;
    Ldsflda = 0x7F, "ldsflda", Token;
    Stsfld = 0x80, "stsfld", Token;
    Box = 0x8C, "box", Token;
    Newarr = 0x8D, "newarr", Token;
    Ldlen = 0x8E, "ldlen", None;
    LdelemI1 = 0x90, "ldelem.i1", None;
    LdelemU1 = 0x91, "ldelem.u1", None;
    LdelemI2 = 0x92, "ldelem.i2", None;
    LdelemU2 = 0x93, "ldelem.u2", None;
    LdelemI4 = 0x94, "ldelem.i4", None;
    LdelemU4 = 0x95, "ldelem.u4", None;
    LdelemI8 = 0x96, "ldelem.i8", None;
    LdelemRef = 0x9A, "ldelem.ref", None;
    StelemI1 = 0x9C, "stelem.i1", None;
    StelemI2 = 0x9D, "stelem.i2", None;
    StelemI4 = 0x9E, "stelem.i4", None;
    StelemI8 = 0x9F, "stelem.i8", None;
    StelemRef = 0xA2, "stelem.ref", None;
    UnboxAny = 0xA5, "unbox.any", Token;
    Ldtoken = 0xD0, "ldtoken", Token;
    ConvU2 = 0xD1, "conv.u2", None;
    ConvU1 = 0xD2, "conv.u1", None;
    Endfinally = 0xDC, "endfinally", None;
    Leave = 0xDD, "leave", Branch;
    LeaveS = 0xDE, "leave.s", ShortBranch;
    Ceq = 0xFE01, "ceq", None;
    Cgt = 0xFE02, "cgt", None;
    CgtUn = 0xFE03, "cgt.un", None;
    Clt = 0xFE04, "clt", None;
    CltUn = 0xFE05, "clt.un", None;
    Ldftn = 0xFE06, "ldftn", Token;
    Ldarg = 0xFE09, "ldarg", Var;
    Ldarga = 0xFE0A, "ldarga", Var;
    Starg = 0xFE0B, "starg", Var;
    Ldloc = 0xFE0C, "ldloc", Var;
    Ldloca = 0xFE0D, "ldloca", Var;
    Stloc = 0xFE0E, "stloc", Var;
}

impl OpCode {
    /// Returns true for two-byte (`0xFE`-prefixed) opcodes.
    #[must_use]
    pub const fn is_two_byte(self) -> bool {
        self.code() > 0xFF
    }

    /// Size of the opcode itself, excluding the operand.
    #[must_use]
    pub const fn size(self) -> usize {
        if self.is_two_byte() {
            2
        } else {
            1
        }
    }

    /// How this opcode transfers control.
    #[must_use]
    pub const fn flow_type(self) -> FlowType {
        match self {
            OpCode::Br | OpCode::BrS | OpCode::Leave | OpCode::LeaveS => {
                FlowType::UnconditionalBranch
            }
            OpCode::Brfalse
            | OpCode::BrfalseS
            | OpCode::Brtrue
            | OpCode::BrtrueS
            | OpCode::Beq
            | OpCode::BeqS
            | OpCode::Bge
            | OpCode::BgeS
            | OpCode::Bgt
            | OpCode::BgtS
            | OpCode::Ble
            | OpCode::BleS
            | OpCode::Blt
            | OpCode::BltS
            | OpCode::BneUn
            | OpCode::BneUnS
            | OpCode::BgeUn
            | OpCode::BgeUnS
            | OpCode::BgtUn
            | OpCode::BgtUnS
            | OpCode::BleUn
            | OpCode::BleUnS
            | OpCode::BltUn
            | OpCode::BltUnS => FlowType::ConditionalBranch,
            OpCode::Switch => FlowType::Switch,
            OpCode::Call | OpCode::Callvirt | OpCode::Newobj => FlowType::Call,
            OpCode::Ret => FlowType::Return,
            OpCode::Throw => FlowType::Throw,
            OpCode::Endfinally => FlowType::EndFinally,
            _ => FlowType::Sequential,
        }
    }

    /// Returns true for opcodes the branch emulator handles.
    #[must_use]
    pub const fn is_branch(self) -> bool {
        matches!(
            self.flow_type(),
            FlowType::ConditionalBranch | FlowType::UnconditionalBranch | FlowType::Switch
        )
    }

    /// Returns true if execution never falls through to the next instruction.
    #[must_use]
    pub const fn ends_block(self) -> bool {
        !matches!(
            self.flow_type(),
            FlowType::Sequential | FlowType::Call
        )
    }

    /// Returns the long form of a short branch, or the opcode itself.
    #[must_use]
    pub const fn long_form(self) -> OpCode {
        match self {
            OpCode::BrS => OpCode::Br,
            OpCode::BrfalseS => OpCode::Brfalse,
            OpCode::BrtrueS => OpCode::Brtrue,
            OpCode::BeqS => OpCode::Beq,
            OpCode::BgeS => OpCode::Bge,
            OpCode::BgtS => OpCode::Bgt,
            OpCode::BleS => OpCode::Ble,
            OpCode::BltS => OpCode::Blt,
            OpCode::BneUnS => OpCode::BneUn,
            OpCode::BgeUnS => OpCode::BgeUn,
            OpCode::BgtUnS => OpCode::BgtUn,
            OpCode::BleUnS => OpCode::BleUn,
            OpCode::BltUnS => OpCode::BltUn,
            OpCode::LeaveS => OpCode::Leave,
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_codes_are_unique_and_reversible() {
        let mut seen = std::collections::HashSet::new();
        for op in OpCode::iter() {
            assert!(seen.insert(op.code()), "duplicate code for {}", op.mnemonic());
            assert_eq!(OpCode::from_code(op.code()), Some(op));
        }
        assert_eq!(seen.len(), OpCode::COUNT);
    }

    #[test]
    fn test_unknown_code() {
        assert_eq!(OpCode::from_code(0x24), None);
        assert_eq!(OpCode::from_code(0xFE20), None);
    }

    #[test]
    fn test_flow_types() {
        assert_eq!(OpCode::Ret.flow_type(), FlowType::Return);
        assert_eq!(OpCode::BrtrueS.flow_type(), FlowType::ConditionalBranch);
        assert_eq!(OpCode::Leave.flow_type(), FlowType::UnconditionalBranch);
        assert_eq!(OpCode::Callvirt.flow_type(), FlowType::Call);
        assert_eq!(OpCode::Add.flow_type(), FlowType::Sequential);

        assert!(OpCode::Switch.is_branch());
        assert!(!OpCode::Call.is_branch());
        assert!(OpCode::Throw.ends_block());
        assert!(!OpCode::Call.ends_block());
    }

    #[test]
    fn test_long_forms() {
        for op in OpCode::iter() {
            let long = op.long_form();
            if long != op {
                assert_eq!(op.operand_kind(), OperandKind::ShortBranch);
                assert_eq!(long.operand_kind(), OperandKind::Branch);
                assert_eq!(op.flow_type(), long.flow_type());
            }
        }
    }

    #[test]
    fn test_two_byte() {
        assert!(OpCode::Ceq.is_two_byte());
        assert_eq!(OpCode::Stloc.size(), 2);
        assert_eq!(OpCode::Ldarg0.size(), 1);
        assert_eq!(OpCode::LdcI4S.mnemonic(), "ldc.i4.s");
    }
}
