//! x86-64 machine code to descriptors.
//!
//! Decoding is done by `iced-x86`; this module only translates its operand
//! and register-usage information into an [`InstrDescriptor`].

use iced_x86::{
    Decoder, DecoderOptions, FlowControl, Instruction, InstructionInfoFactory, Mnemonic,
    OpAccess, OpKind, Register,
};
use thiserror::Error;

use crate::{Access, InstrDescriptor, OpcodeFamily, Operand, Reg};

/// Decode errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("no instruction bytes at {address:#x}")]
    Empty { address: u64 },
    #[error("invalid instruction at {address:#x}")]
    Invalid { address: u64 },
    #[error("{extra} trailing byte(s) after instruction at {address:#x}")]
    TrailingBytes { address: u64, extra: usize },
}

/// Decode exactly one instruction from `bytes`, located at `address`.
///
/// # Errors
///
/// Returns an error if `bytes` is empty, does not decode, or holds more
/// than one instruction.
pub fn describe(bytes: &[u8], address: u64) -> Result<InstrDescriptor, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty { address });
    }
    let mut decoder = Decoder::with_ip(64, bytes, address, DecoderOptions::NONE);
    let instr = decoder.decode();
    if instr.is_invalid() {
        return Err(DecodeError::Invalid { address });
    }
    if instr.len() != bytes.len() {
        return Err(DecodeError::TrailingBytes {
            address,
            extra: bytes.len() - instr.len(),
        });
    }
    Ok(describe_instruction(&instr))
}

/// Build a descriptor from an already decoded instruction.
#[must_use]
pub fn describe_instruction(instr: &Instruction) -> InstrDescriptor {
    let mut factory = InstructionInfoFactory::new();
    let info = factory.info(instr);

    let mut desc = InstrDescriptor::new(opcode_family(instr.mnemonic()), instr.ip());
    desc.is_return = instr.flow_control() == FlowControl::Return;

    let explicit: Vec<Register> = (0..instr.op_count())
        .filter(|&i| instr.op_kind(i) == OpKind::Register)
        .map(|i| instr.op_register(i).full_register())
        .collect();

    for used in info.used_registers() {
        let Some(access) = map_access(used.access()) else {
            continue;
        };
        let reg = used.register();
        desc.operands.push(Operand::Register {
            reg: map_register(reg),
            access,
            implicit: !explicit.contains(&reg.full_register()),
        });
    }

    // push/pop/call/ret move RSP; their memory operand is stack memory.
    let moves_stack = instr.stack_pointer_increment() != 0;
    for mem in info.used_memory() {
        let Some(access) = map_access(mem.access()) else {
            continue;
        };
        desc.operands.push(Operand::Memory {
            size: u8::try_from(mem.memory_size().size()).unwrap_or(u8::MAX),
            access,
            stack: moves_stack || matches!(mem.base(), Register::RSP | Register::RBP),
        });
    }

    for i in 0..instr.op_count() {
        if let Some(bits) = immediate_bits(instr.op_kind(i)) {
            desc.operands.push(Operand::Immediate { bits });
        }
    }

    desc
}

fn opcode_family(mnemonic: Mnemonic) -> OpcodeFamily {
    match mnemonic {
        Mnemonic::Add => OpcodeFamily::Add,
        Mnemonic::Sub => OpcodeFamily::Sub,
        Mnemonic::Adc => OpcodeFamily::Adc,
        Mnemonic::Sbb => OpcodeFamily::Sbb,
        Mnemonic::Mul => OpcodeFamily::Mul,
        Mnemonic::Imul => OpcodeFamily::Imul,
        Mnemonic::Mulx => OpcodeFamily::Mulx,
        Mnemonic::Adcx => OpcodeFamily::Adcx,
        Mnemonic::Adox => OpcodeFamily::Adox,
        Mnemonic::Div => OpcodeFamily::Div,
        Mnemonic::Idiv => OpcodeFamily::Idiv,
        Mnemonic::Paddq | Mnemonic::Vpaddq => OpcodeFamily::PackedAddQ,
        Mnemonic::Psubq | Mnemonic::Vpsubq => OpcodeFamily::PackedSubQ,
        _ => OpcodeFamily::Other,
    }
}

fn map_access(access: OpAccess) -> Option<Access> {
    match access {
        OpAccess::Read | OpAccess::CondRead => Some(Access::Read),
        OpAccess::Write | OpAccess::CondWrite => Some(Access::Write),
        OpAccess::ReadWrite | OpAccess::ReadCondWrite => Some(Access::ReadWrite),
        _ => None,
    }
}

fn map_register(reg: Register) -> Reg {
    let index = u8::try_from(reg.number()).unwrap_or(u8::MAX);
    if reg.is_gpr64() {
        Reg::gpr(index)
    } else if reg.is_xmm() || reg.is_ymm() || reg.is_zmm() {
        Reg::vector(index, u16::try_from(reg.size()).unwrap_or(u16::MAX))
    } else if reg.is_mm() {
        Reg::vector(index, 8)
    } else if reg.is_k() {
        Reg::mask(index)
    } else {
        Reg::other(index)
    }
}

const fn immediate_bits(kind: OpKind) -> Option<u8> {
    match kind {
        OpKind::Immediate8 | OpKind::Immediate8_2nd => Some(8),
        OpKind::Immediate16 | OpKind::Immediate8to16 => Some(16),
        OpKind::Immediate32 | OpKind::Immediate8to32 => Some(32),
        OpKind::Immediate64 | OpKind::Immediate8to64 | OpKind::Immediate32to64 => Some(64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ArithFamily, Bucket, ClassifyPolicy, Locality, Probe, SimdFamily, classify};

    fn bucket_of(bytes: &[u8]) -> Option<Bucket> {
        let desc = describe(bytes, 0x40_1000).expect("decode failed");
        classify(&desc, &ClassifyPolicy::default()).map(Probe::bucket)
    }

    #[test]
    fn test_add_reg_reg() {
        // add rax, rbx
        let desc = describe(&[0x48, 0x01, 0xD8], 0x40_1000).unwrap();
        assert_eq!(desc.family, OpcodeFamily::Add);
        assert_eq!(desc.address, 0x40_1000);
        assert!(desc.reads_gpr64());
        assert!(desc.writes_gpr64());
        assert_eq!(desc.memory_operand_count(), 0);
        assert_eq!(
            bucket_of(&[0x48, 0x01, 0xD8]),
            Some(Bucket::scalar(ArithFamily::Add, Locality::RegReg))
        );
    }

    #[test]
    fn test_imul_and_div() {
        // imul rax, rbx
        assert_eq!(
            bucket_of(&[0x48, 0x0F, 0xAF, 0xC3]),
            Some(Bucket::scalar(ArithFamily::Mul, Locality::RegReg))
        );
        // div rcx
        assert_eq!(
            bucket_of(&[0x48, 0xF7, 0xF1]),
            Some(Bucket::scalar(ArithFamily::Div, Locality::RegReg))
        );
        // adc rax, rbx
        assert_eq!(
            bucket_of(&[0x48, 0x11, 0xD8]),
            Some(Bucket::scalar(ArithFamily::Adc, Locality::RegReg))
        );
    }

    #[test]
    fn test_memory_forms() {
        // add rax, [rcx]
        assert_eq!(
            bucket_of(&[0x48, 0x03, 0x01]),
            Some(Bucket::scalar(ArithFamily::Add, Locality::RegMem))
        );
        // add [rcx], rax
        assert_eq!(
            bucket_of(&[0x48, 0x01, 0x01]),
            Some(Bucket::scalar(ArithFamily::Add, Locality::RegMem))
        );
    }

    #[test]
    fn test_excluded_forms() {
        // add rax, 5
        let desc = describe(&[0x48, 0x83, 0xC0, 0x05], 0).unwrap();
        assert!(desc.has_immediate());
        assert_eq!(bucket_of(&[0x48, 0x83, 0xC0, 0x05]), None);
        // sub rsp, rax
        assert_eq!(bucket_of(&[0x48, 0x29, 0xC4]), None);
        // add rax, [rsp+8]
        let desc = describe(&[0x48, 0x03, 0x44, 0x24, 0x08], 0).unwrap();
        assert!(desc.touches_stack());
        assert_eq!(bucket_of(&[0x48, 0x03, 0x44, 0x24, 0x08]), None);
    }

    #[test]
    fn test_ret() {
        let desc = describe(&[0xC3], 0x40_2000).unwrap();
        assert!(desc.is_return);
        assert_eq!(desc.family, OpcodeFamily::Other);
    }

    #[test]
    fn test_packed() {
        // paddq xmm0, xmm1
        let desc = describe(&[0x66, 0x0F, 0xD4, 0xC1], 0).unwrap();
        let probe = classify(&desc, &ClassifyPolicy::default()).unwrap();
        assert_eq!(probe.bucket(), Bucket::simd(SimdFamily::AddQ, false));
        assert_eq!(probe.lanes(), Some(2));

        // vpaddq zmm0{k1}, zmm1, zmm2
        let desc = describe(&[0x62, 0xF1, 0xF5, 0x49, 0xD4, 0xC2], 0).unwrap();
        let probe = classify(&desc, &ClassifyPolicy::default()).unwrap();
        assert_eq!(probe.bucket(), Bucket::simd(SimdFamily::AddQ, true));
        assert_eq!(probe.lanes(), Some(8));
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(describe(&[], 0x10), Err(DecodeError::Empty { address: 0x10 }));
        assert_eq!(
            describe(&[0xC3, 0x90], 0x10),
            Err(DecodeError::TrailingBytes {
                address: 0x10,
                extra: 1
            })
        );
    }
}
