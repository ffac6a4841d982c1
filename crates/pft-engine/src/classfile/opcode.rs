//! JVM instruction set
//!
//! Opcodes are single bytes; operand layout is described by [`Opcode::operand_layout`].
//! Categories follow JVMS chapter 6:
//! - 0x00-0x14: constants
//! - 0x15-0x35: loads
//! - 0x36-0x56: stores
//! - 0x57-0x5F: stack
//! - 0x60-0x84: math
//! - 0x85-0x93: conversions
//! - 0x94-0xA6: comparisons
//! - 0xA7-0xB1: control
//! - 0xB2-0xC3: references
//! - 0xC4-0xC9: extended

macro_rules! opcodes {
    ($($variant:ident = $byte:literal => $name:literal,)*) => {
        /// JVM opcode
        #[repr(u8)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[allow(missing_docs)]
        pub enum Opcode {
            $($variant = $byte,)*
        }

        impl Opcode {
            /// Decode an opcode byte
            pub fn from_u8(byte: u8) -> Option<Self> {
                match byte {
                    $($byte => Some(Self::$variant),)*
                    _ => None,
                }
            }

            /// Mnemonic as printed by disassemblers
            pub fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)*
                }
            }
        }
    };
}

opcodes! {
    Nop = 0x00 => "nop",
    AconstNull = 0x01 => "aconst_null",
    IconstM1 = 0x02 => "iconst_m1",
    Iconst0 = 0x03 => "iconst_0",
    Iconst1 = 0x04 => "iconst_1",
    Iconst2 = 0x05 => "iconst_2",
    Iconst3 = 0x06 => "iconst_3",
    Iconst4 = 0x07 => "iconst_4",
    Iconst5 = 0x08 => "iconst_5",
    Lconst0 = 0x09 => "lconst_0",
    Lconst1 = 0x0A => "lconst_1",
    Fconst0 = 0x0B => "fconst_0",
    Fconst1 = 0x0C => "fconst_1",
    Fconst2 = 0x0D => "fconst_2",
    Dconst0 = 0x0E => "dconst_0",
    Dconst1 = 0x0F => "dconst_1",
    Bipush = 0x10 => "bipush",
    Sipush = 0x11 => "sipush",
    Ldc = 0x12 => "ldc",
    LdcW = 0x13 => "ldc_w",
    Ldc2W = 0x14 => "ldc2_w",
    Iload = 0x15 => "iload",
    Lload = 0x16 => "lload",
    Fload = 0x17 => "fload",
    Dload = 0x18 => "dload",
    Aload = 0x19 => "aload",
    Iload0 = 0x1A => "iload_0",
    Iload1 = 0x1B => "iload_1",
    Iload2 = 0x1C => "iload_2",
    Iload3 = 0x1D => "iload_3",
    Lload0 = 0x1E => "lload_0",
    Lload1 = 0x1F => "lload_1",
    Lload2 = 0x20 => "lload_2",
    Lload3 = 0x21 => "lload_3",
    Fload0 = 0x22 => "fload_0",
    Fload1 = 0x23 => "fload_1",
    Fload2 = 0x24 => "fload_2",
    Fload3 = 0x25 => "fload_3",
    Dload0 = 0x26 => "dload_0",
    Dload1 = 0x27 => "dload_1",
    Dload2 = 0x28 => "dload_2",
    Dload3 = 0x29 => "dload_3",
    Aload0 = 0x2A => "aload_0",
    Aload1 = 0x2B => "aload_1",
    Aload2 = 0x2C => "aload_2",
    Aload3 = 0x2D => "aload_3",
    Iaload = 0x2E => "iaload",
    Laload = 0x2F => "laload",
    Faload = 0x30 => "faload",
    Daload = 0x31 => "daload",
    Aaload = 0x32 => "aaload",
    Baload = 0x33 => "baload",
    Caload = 0x34 => "caload",
    Saload = 0x35 => "saload",
    Istore = 0x36 => "istore",
    Lstore = 0x37 => "lstore",
    Fstore = 0x38 => "fstore",
    Dstore = 0x39 => "dstore",
    Astore = 0x3A => "astore",
    Istore0 = 0x3B => "istore_0",
    Istore1 = 0x3C => "istore_1",
    Istore2 = 0x3D => "istore_2",
    Istore3 = 0x3E => "istore_3",
    Lstore0 = 0x3F => "lstore_0",
    Lstore1 = 0x40 => "lstore_1",
    Lstore2 = 0x41 => "lstore_2",
    Lstore3 = 0x42 => "lstore_3",
    Fstore0 = 0x43 => "fstore_0",
    Fstore1 = 0x44 => "fstore_1",
    Fstore2 = 0x45 => "fstore_2",
    Fstore3 = 0x46 => "fstore_3",
    Dstore0 = 0x47 => "dstore_0",
    Dstore1 = 0x48 => "dstore_1",
    Dstore2 = 0x49 => "dstore_2",
    Dstore3 = 0x4A => "dstore_3",
    Astore0 = 0x4B => "astore_0",
    Astore1 = 0x4C => "astore_1",
    Astore2 = 0x4D => "astore_2",
    Astore3 = 0x4E => "astore_3",
    Iastore = 0x4F => "iastore",
    Lastore = 0x50 => "lastore",
    Fastore = 0x51 => "fastore",
    Dastore = 0x52 => "dastore",
    Aastore = 0x53 => "aastore",
    Bastore = 0x54 => "bastore",
    Castore = 0x55 => "castore",
    Sastore = 0x56 => "sastore",
    Pop = 0x57 => "pop",
    Pop2 = 0x58 => "pop2",
    Dup = 0x59 => "dup",
    DupX1 = 0x5A => "dup_x1",
    DupX2 = 0x5B => "dup_x2",
    Dup2 = 0x5C => "dup2",
    Dup2X1 = 0x5D => "dup2_x1",
    Dup2X2 = 0x5E => "dup2_x2",
    Swap = 0x5F => "swap",
    Iadd = 0x60 => "iadd",
    Ladd = 0x61 => "ladd",
    Fadd = 0x62 => "fadd",
    Dadd = 0x63 => "dadd",
    Isub = 0x64 => "isub",
    Lsub = 0x65 => "lsub",
    Fsub = 0x66 => "fsub",
    Dsub = 0x67 => "dsub",
    Imul = 0x68 => "imul",
    Lmul = 0x69 => "lmul",
    Fmul = 0x6A => "fmul",
    Dmul = 0x6B => "dmul",
    Idiv = 0x6C => "idiv",
    Ldiv = 0x6D => "ldiv",
    Fdiv = 0x6E => "fdiv",
    Ddiv = 0x6F => "ddiv",
    Irem = 0x70 => "irem",
    Lrem = 0x71 => "lrem",
    Frem = 0x72 => "frem",
    Drem = 0x73 => "drem",
    Ineg = 0x74 => "ineg",
    Lneg = 0x75 => "lneg",
    Fneg = 0x76 => "fneg",
    Dneg = 0x77 => "dneg",
    Ishl = 0x78 => "ishl",
    Lshl = 0x79 => "lshl",
    Ishr = 0x7A => "ishr",
    Lshr = 0x7B => "lshr",
    Iushr = 0x7C => "iushr",
    Lushr = 0x7D => "lushr",
    Iand = 0x7E => "iand",
    Land = 0x7F => "land",
    Ior = 0x80 => "ior",
    Lor = 0x81 => "lor",
    Ixor = 0x82 => "ixor",
    Lxor = 0x83 => "lxor",
    Iinc = 0x84 => "iinc",
    I2l = 0x85 => "i2l",
    I2f = 0x86 => "i2f",
    I2d = 0x87 => "i2d",
    L2i = 0x88 => "l2i",
    L2f = 0x89 => "l2f",
    L2d = 0x8A => "l2d",
    F2i = 0x8B => "f2i",
    F2l = 0x8C => "f2l",
    F2d = 0x8D => "f2d",
    D2i = 0x8E => "d2i",
    D2l = 0x8F => "d2l",
    D2f = 0x90 => "d2f",
    I2b = 0x91 => "i2b",
    I2c = 0x92 => "i2c",
    I2s = 0x93 => "i2s",
    Lcmp = 0x94 => "lcmp",
    Fcmpl = 0x95 => "fcmpl",
    Fcmpg = 0x96 => "fcmpg",
    Dcmpl = 0x97 => "dcmpl",
    Dcmpg = 0x98 => "dcmpg",
    Ifeq = 0x99 => "ifeq",
    Ifne = 0x9A => "ifne",
    Iflt = 0x9B => "iflt",
    Ifge = 0x9C => "ifge",
    Ifgt = 0x9D => "ifgt",
    Ifle = 0x9E => "ifle",
    IfIcmpeq = 0x9F => "if_icmpeq",
    IfIcmpne = 0xA0 => "if_icmpne",
    IfIcmplt = 0xA1 => "if_icmplt",
    IfIcmpge = 0xA2 => "if_icmpge",
    IfIcmpgt = 0xA3 => "if_icmpgt",
    IfIcmple = 0xA4 => "if_icmple",
    IfAcmpeq = 0xA5 => "if_acmpeq",
    IfAcmpne = 0xA6 => "if_acmpne",
    Goto = 0xA7 => "goto",
    Jsr = 0xA8 => "jsr",
    Ret = 0xA9 => "ret",
    Tableswitch = 0xAA => "tableswitch",
    Lookupswitch = 0xAB => "lookupswitch",
    Ireturn = 0xAC => "ireturn",
    Lreturn = 0xAD => "lreturn",
    Freturn = 0xAE => "freturn",
    Dreturn = 0xAF => "dreturn",
    Areturn = 0xB0 => "areturn",
    Return = 0xB1 => "return",
    Getstatic = 0xB2 => "getstatic",
    Putstatic = 0xB3 => "putstatic",
    Getfield = 0xB4 => "getfield",
    Putfield = 0xB5 => "putfield",
    Invokevirtual = 0xB6 => "invokevirtual",
    Invokespecial = 0xB7 => "invokespecial",
    Invokestatic = 0xB8 => "invokestatic",
    Invokeinterface = 0xB9 => "invokeinterface",
    Invokedynamic = 0xBA => "invokedynamic",
    New = 0xBB => "new",
    Newarray = 0xBC => "newarray",
    Anewarray = 0xBD => "anewarray",
    Arraylength = 0xBE => "arraylength",
    Athrow = 0xBF => "athrow",
    Checkcast = 0xC0 => "checkcast",
    Instanceof = 0xC1 => "instanceof",
    Monitorenter = 0xC2 => "monitorenter",
    Monitorexit = 0xC3 => "monitorexit",
    Wide = 0xC4 => "wide",
    Multianewarray = 0xC5 => "multianewarray",
    Ifnull = 0xC6 => "ifnull",
    Ifnonnull = 0xC7 => "ifnonnull",
    GotoW = 0xC8 => "goto_w",
    JsrW = 0xC9 => "jsr_w",
}

/// Shape of the operands following an opcode byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandLayout {
    /// No operands
    None,
    /// Signed byte immediate (`bipush`) or array type (`newarray`)
    Byte,
    /// Signed short immediate (`sipush`)
    Short,
    /// One-byte local variable index (two bytes under `wide`)
    Local,
    /// One-byte constant pool index (`ldc`)
    ConstU8,
    /// Two-byte constant pool index
    ConstU16,
    /// Local index plus signed increment (`iinc`)
    Iinc,
    /// Two-byte signed branch offset
    Branch16,
    /// Four-byte signed branch offset
    Branch32,
    /// Constant pool index, count, zero (`invokeinterface`)
    Interface,
    /// Constant pool index, two zero bytes (`invokedynamic`)
    Dynamic,
    /// Constant pool index, dimensions (`multianewarray`)
    MultiArray,
    /// `tableswitch` body
    TableSwitch,
    /// `lookupswitch` body
    LookupSwitch,
    /// `wide` prefix
    Wide,
}

impl Opcode {
    /// Convert to the raw byte
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Operand layout of the instruction
    pub fn operand_layout(self) -> OperandLayout {
        use Opcode::*;
        match self {
            Bipush | Newarray => OperandLayout::Byte,
            Sipush => OperandLayout::Short,
            Ldc => OperandLayout::ConstU8,
            LdcW | Ldc2W | Getstatic | Putstatic | Getfield | Putfield | Invokevirtual
            | Invokespecial | Invokestatic | New | Anewarray | Checkcast | Instanceof => {
                OperandLayout::ConstU16
            }
            Iload | Lload | Fload | Dload | Aload | Istore | Lstore | Fstore | Dstore | Astore
            | Ret => OperandLayout::Local,
            Iinc => OperandLayout::Iinc,
            Ifeq | Ifne | Iflt | Ifge | Ifgt | Ifle | IfIcmpeq | IfIcmpne | IfIcmplt
            | IfIcmpge | IfIcmpgt | IfIcmple | IfAcmpeq | IfAcmpne | Goto | Jsr | Ifnull
            | Ifnonnull => OperandLayout::Branch16,
            GotoW | JsrW => OperandLayout::Branch32,
            Invokeinterface => OperandLayout::Interface,
            Invokedynamic => OperandLayout::Dynamic,
            Multianewarray => OperandLayout::MultiArray,
            Tableswitch => OperandLayout::TableSwitch,
            Lookupswitch => OperandLayout::LookupSwitch,
            Wide => OperandLayout::Wide,
            _ => OperandLayout::None,
        }
    }

    /// Check if this opcode returns from the method
    pub fn is_return(self) -> bool {
        matches!(
            self,
            Self::Ireturn | Self::Lreturn | Self::Freturn | Self::Dreturn | Self::Areturn | Self::Return
        )
    }

    /// Check if this opcode transfers control unconditionally
    pub fn is_unconditional_jump(self) -> bool {
        matches!(
            self,
            Self::Goto | Self::GotoW | Self::Ret | Self::Tableswitch | Self::Lookupswitch
        )
    }

    /// Check if this opcode ends a basic block with no fall-through
    pub fn is_terminator(self) -> bool {
        self.is_return() || self.is_unconditional_jump() || self == Self::Athrow
    }

    /// Check if this opcode is a method invocation
    pub fn is_invoke(self) -> bool {
        matches!(
            self,
            Self::Invokevirtual
                | Self::Invokespecial
                | Self::Invokestatic
                | Self::Invokeinterface
                | Self::Invokedynamic
        )
    }

    /// Check if this opcode accesses a field
    pub fn is_field_access(self) -> bool {
        matches!(
            self,
            Self::Getstatic | Self::Putstatic | Self::Getfield | Self::Putfield
        )
    }

    /// Check if this opcode is a local load/store that names a long or double slot pair
    pub fn is_wide_local(self) -> bool {
        use Opcode::*;
        matches!(
            self,
            Lload | Dload | Lstore | Dstore | Lload0 | Lload1 | Lload2 | Lload3 | Dload0 | Dload1
                | Dload2 | Dload3 | Lstore0 | Lstore1 | Lstore2 | Lstore3 | Dstore0 | Dstore1
                | Dstore2 | Dstore3
        )
    }

    /// Local slot addressed by the `_0`.. `_3` shorthand forms
    pub fn implicit_local(self) -> Option<u16> {
        let byte = self as u8;
        match byte {
            0x1A..=0x2D => Some(((byte - 0x1A) % 4) as u16),
            0x3B..=0x4E => Some(((byte - 0x3B) % 4) as u16),
            _ => None,
        }
    }
}
