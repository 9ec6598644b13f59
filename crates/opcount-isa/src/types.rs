//! Instruction descriptors.
//!
//! A descriptor is the read-only set of facts about one static instruction
//! that the classifier needs: opcode family, address, whether it returns,
//! and every register, memory and immediate operand it touches. Implicit
//! register uses (e.g. `RAX`/`RDX` for `DIV`) are listed as operands too.

use std::fmt;

/// Opcode family of a decoded instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpcodeFamily {
    Add,
    Sub,
    Adc,
    Sbb,
    Mul,
    Imul,
    Mulx,
    Adcx,
    Adox,
    Div,
    Idiv,
    /// Packed 64-bit-lane add (`PADDQ`, `VPADDQ`).
    PackedAddQ,
    /// Packed 64-bit-lane subtract (`PSUBQ`, `VPSUBQ`).
    PackedSubQ,
    Other,
}

impl OpcodeFamily {
    /// Families tracked on the scalar path.
    pub const SCALAR: [Self; 11] = [
        Self::Add,
        Self::Sub,
        Self::Adc,
        Self::Sbb,
        Self::Mul,
        Self::Imul,
        Self::Mulx,
        Self::Adcx,
        Self::Adox,
        Self::Div,
        Self::Idiv,
    ];

    /// Check if this is a tracked scalar arithmetic family.
    #[must_use]
    pub const fn is_scalar_arith(self) -> bool {
        !matches!(self, Self::PackedAddQ | Self::PackedSubQ | Self::Other)
    }

    /// Check if this is a packed 64-bit-lane family.
    #[must_use]
    pub const fn is_packed(self) -> bool {
        matches!(self, Self::PackedAddQ | Self::PackedSubQ)
    }

    /// Lowercase mnemonic.
    #[must_use]
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Adc => "adc",
            Self::Sbb => "sbb",
            Self::Mul => "mul",
            Self::Imul => "imul",
            Self::Mulx => "mulx",
            Self::Adcx => "adcx",
            Self::Adox => "adox",
            Self::Div => "div",
            Self::Idiv => "idiv",
            Self::PackedAddQ => "paddq",
            Self::PackedSubQ => "psubq",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for OpcodeFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Identity class of a register.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RegClass {
    /// 64-bit general-purpose register other than the stack/frame pointer.
    Gpr64,
    StackPointer,
    FramePointer,
    /// Vector register of the given byte size (16, 32 or 64).
    Vector { bytes: u16 },
    /// Predicate/mask register.
    Mask,
    /// Anything else (narrow GPRs, flags, segment registers, ...).
    Other,
}

impl RegClass {
    /// Stack pointer or frame pointer.
    #[must_use]
    pub const fn is_stack(self) -> bool {
        matches!(self, Self::StackPointer | Self::FramePointer)
    }
}

/// A register with its identity class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Reg {
    /// Architectural number within its class.
    pub index: u8,
    pub class: RegClass,
}

const GPR_NAMES: [&str; 16] = [
    "rax", "rcx", "rdx", "rbx", "rsp", "rbp", "rsi", "rdi",
    "r8", "r9", "r10", "r11", "r12", "r13", "r14", "r15",
];

pub const RSP_INDEX: u8 = 4;
pub const RBP_INDEX: u8 = 5;

impl Reg {
    /// 64-bit GPR by encoding number. Numbers 4 and 5 map to RSP/RBP.
    #[must_use]
    pub const fn gpr(index: u8) -> Self {
        let class = match index {
            RSP_INDEX => RegClass::StackPointer,
            RBP_INDEX => RegClass::FramePointer,
            _ => RegClass::Gpr64,
        };
        Self { index, class }
    }

    #[must_use]
    pub const fn rsp() -> Self {
        Self::gpr(RSP_INDEX)
    }

    #[must_use]
    pub const fn rbp() -> Self {
        Self::gpr(RBP_INDEX)
    }

    #[must_use]
    pub const fn xmm(index: u8) -> Self {
        Self::vector(index, 16)
    }

    #[must_use]
    pub const fn ymm(index: u8) -> Self {
        Self::vector(index, 32)
    }

    #[must_use]
    pub const fn zmm(index: u8) -> Self {
        Self::vector(index, 64)
    }

    #[must_use]
    pub const fn vector(index: u8, bytes: u16) -> Self {
        Self {
            index,
            class: RegClass::Vector { bytes },
        }
    }

    /// Opmask register `k<index>`.
    #[must_use]
    pub const fn mask(index: u8) -> Self {
        Self {
            index,
            class: RegClass::Mask,
        }
    }

    #[must_use]
    pub const fn other(index: u8) -> Self {
        Self {
            index,
            class: RegClass::Other,
        }
    }

    /// 64-bit GPR that is neither stack pointer nor frame pointer.
    #[must_use]
    pub const fn is_plain_gpr64(self) -> bool {
        matches!(self.class, RegClass::Gpr64)
    }

    /// Register width in bits, if known.
    #[must_use]
    pub const fn bits(self) -> u16 {
        match self.class {
            RegClass::Gpr64 | RegClass::StackPointer | RegClass::FramePointer | RegClass::Mask => {
                64
            }
            RegClass::Vector { bytes } => bytes * 8,
            RegClass::Other => 0,
        }
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.class {
            RegClass::Gpr64 | RegClass::StackPointer | RegClass::FramePointer => {
                match GPR_NAMES.get(self.index as usize) {
                    Some(name) => f.write_str(name),
                    None => write!(f, "gpr{}", self.index),
                }
            }
            RegClass::Vector { bytes: 16 } => write!(f, "xmm{}", self.index),
            RegClass::Vector { bytes: 32 } => write!(f, "ymm{}", self.index),
            RegClass::Vector { bytes: 64 } => write!(f, "zmm{}", self.index),
            RegClass::Vector { bytes } => write!(f, "v{}.{bytes}", self.index),
            RegClass::Mask => write!(f, "k{}", self.index),
            RegClass::Other => write!(f, "reg{}", self.index),
        }
    }
}

/// Operand access direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Access {
    Read,
    Write,
    ReadWrite,
}

impl Access {
    #[must_use]
    pub const fn reads(self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }

    #[must_use]
    pub const fn writes(self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }
}

/// One operand of an instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operand {
    Register {
        reg: Reg,
        access: Access,
        /// Not encoded in the instruction bytes (e.g. `RDX` for `DIV`).
        implicit: bool,
    },
    Memory {
        /// Access size in bytes.
        size: u8,
        access: Access,
        /// Stack reference (RSP/RBP based, push/pop).
        stack: bool,
    },
    Immediate {
        bits: u8,
    },
}

impl Operand {
    /// Operand width in bits.
    #[must_use]
    pub const fn bits(&self) -> u16 {
        match *self {
            Self::Register { reg, .. } => reg.bits(),
            Self::Memory { size, .. } => size as u16 * 8,
            Self::Immediate { bits } => bits as u16,
        }
    }
}

/// Read-only facts about one static instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstrDescriptor {
    pub family: OpcodeFamily,
    pub address: u64,
    pub is_return: bool,
    pub operands: Vec<Operand>,
}

impl InstrDescriptor {
    /// Create a descriptor with no operands.
    #[must_use]
    pub const fn new(family: OpcodeFamily, address: u64) -> Self {
        Self {
            family,
            address,
            is_return: false,
            operands: Vec::new(),
        }
    }

    /// A near return at `address`.
    #[must_use]
    pub fn ret(address: u64) -> Self {
        Self {
            is_return: true,
            ..Self::new(OpcodeFamily::Other, address)
        }
        .with_implicit_reg(Reg::rsp(), Access::ReadWrite)
        .with_stack_mem(8, Access::Read)
    }

    #[must_use]
    pub fn with_reg(mut self, reg: Reg, access: Access) -> Self {
        self.operands.push(Operand::Register {
            reg,
            access,
            implicit: false,
        });
        self
    }

    #[must_use]
    pub fn with_implicit_reg(mut self, reg: Reg, access: Access) -> Self {
        self.operands.push(Operand::Register {
            reg,
            access,
            implicit: true,
        });
        self
    }

    /// Add a non-stack memory operand.
    #[must_use]
    pub fn with_mem(mut self, size: u8, access: Access) -> Self {
        self.operands.push(Operand::Memory {
            size,
            access,
            stack: false,
        });
        self
    }

    #[must_use]
    pub fn with_stack_mem(mut self, size: u8, access: Access) -> Self {
        self.operands.push(Operand::Memory {
            size,
            access,
            stack: true,
        });
        self
    }

    #[must_use]
    pub fn with_imm(mut self, bits: u8) -> Self {
        self.operands.push(Operand::Immediate { bits });
        self
    }

    /// Registers read, explicit and implicit.
    pub fn regs_read(&self) -> impl Iterator<Item = Reg> + '_ {
        self.operands.iter().filter_map(|op| match *op {
            Operand::Register { reg, access, .. } if access.reads() => Some(reg),
            _ => None,
        })
    }

    /// Registers written, explicit and implicit.
    pub fn regs_written(&self) -> impl Iterator<Item = Reg> + '_ {
        self.operands.iter().filter_map(|op| match *op {
            Operand::Register { reg, access, .. } if access.writes() => Some(reg),
            _ => None,
        })
    }

    /// `(size, access, stack)` of every memory operand.
    pub fn memory_operands(&self) -> impl Iterator<Item = (u8, Access, bool)> + '_ {
        self.operands.iter().filter_map(|op| match *op {
            Operand::Memory {
                size,
                access,
                stack,
            } => Some((size, access, stack)),
            _ => None,
        })
    }

    #[must_use]
    pub fn memory_operand_count(&self) -> usize {
        self.memory_operands().count()
    }

    #[must_use]
    pub fn has_immediate(&self) -> bool {
        self.operands
            .iter()
            .any(|op| matches!(op, Operand::Immediate { .. }))
    }

    /// Reads or writes RSP/RBP, or references stack memory.
    #[must_use]
    pub fn touches_stack(&self) -> bool {
        self.operands.iter().any(|op| match *op {
            Operand::Register { reg, .. } => reg.class.is_stack(),
            Operand::Memory { stack, .. } => stack,
            Operand::Immediate { .. } => false,
        })
    }

    /// Reads a 64-bit GPR other than RSP/RBP.
    #[must_use]
    pub fn reads_gpr64(&self) -> bool {
        self.regs_read().any(Reg::is_plain_gpr64)
    }

    /// Writes a 64-bit GPR other than RSP/RBP.
    #[must_use]
    pub fn writes_gpr64(&self) -> bool {
        self.regs_written().any(Reg::is_plain_gpr64)
    }

    /// Has an 8-byte memory read.
    #[must_use]
    pub fn reads_mem8(&self) -> bool {
        self.memory_operands()
            .any(|(size, access, _)| size == 8 && access.reads())
    }

    /// Has an 8-byte memory write.
    #[must_use]
    pub fn writes_mem8(&self) -> bool {
        self.memory_operands()
            .any(|(size, access, _)| size == 8 && access.writes())
    }

    /// Byte size of the widest vector register written.
    #[must_use]
    pub fn widest_vector_write(&self) -> Option<u16> {
        self.regs_written()
            .filter_map(|reg| match reg.class {
                RegClass::Vector { bytes } => Some(bytes),
                _ => None,
            })
            .max()
    }

    /// First mask register among the reads.
    #[must_use]
    pub fn mask_read(&self) -> Option<Reg> {
        self.regs_read().find(|reg| reg.class == RegClass::Mask)
    }
}
