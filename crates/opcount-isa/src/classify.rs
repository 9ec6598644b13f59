//! Instruction classifier.
//!
//! Maps a descriptor to at most one bucket. The packed path is tried first;
//! scalar arithmetic is then split into register-register and
//! register-memory forms:
//!
//! - **RegReg**: no memory operand, reads and writes a 64-bit GPR that is not
//!   RSP/RBP.
//! - **RegMem**: either a load-combine (8-byte memory read, GPR write, no
//!   8-byte memory write) or, if enabled, a store-combine (8-byte memory
//!   write, GPR read).
//!
//! Anything else, including opcode families outside the tracked set, is
//! skipped silently.

use crate::{ArithFamily, Bucket, InstrDescriptor, Locality, SimdFamily};

/// Lanes assumed for a packed op when no vector register write is visible
/// (128-bit register, two 64-bit lanes).
pub const DEFAULT_LANES: u8 = 2;

/// Classification policy switches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClassifyPolicy {
    /// Skip scalar ops with an immediate operand.
    pub exclude_immediates: bool,
    /// Skip scalar ops touching RSP/RBP or stack memory.
    pub exclude_stack: bool,
    /// Count `op [mem], reg` read-modify-write forms as RegMem.
    pub count_mem_dest_rmw: bool,
    /// Route excluded immediate forms to [`Bucket::ImmediateSanity`].
    pub immediate_sanity: bool,
}

impl Default for ClassifyPolicy {
    fn default() -> Self {
        Self {
            exclude_immediates: true,
            exclude_stack: true,
            count_mem_dest_rmw: true,
            immediate_sanity: false,
        }
    }
}

impl ClassifyPolicy {
    #[must_use]
    pub const fn with_exclude_immediates(mut self, exclude: bool) -> Self {
        self.exclude_immediates = exclude;
        self
    }

    #[must_use]
    pub const fn with_exclude_stack(mut self, exclude: bool) -> Self {
        self.exclude_stack = exclude;
        self
    }

    #[must_use]
    pub const fn with_mem_dest_rmw(mut self, count: bool) -> Self {
        self.count_mem_dest_rmw = count;
        self
    }

    #[must_use]
    pub const fn with_immediate_sanity(mut self, enabled: bool) -> Self {
        self.immediate_sanity = enabled;
        self
    }
}

/// What to record on each dynamic execution of a classified instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Probe {
    /// One event in the bucket.
    Count(Bucket),
    /// One instruction plus its active lanes as lane-ops.
    Lanes { bucket: Bucket, lanes: u8 },
}

impl Probe {
    #[must_use]
    pub const fn bucket(self) -> Bucket {
        match self {
            Self::Count(bucket) | Self::Lanes { bucket, .. } => bucket,
        }
    }

    /// Vector width in lanes, for packed probes.
    #[must_use]
    pub const fn lanes(self) -> Option<u8> {
        match self {
            Self::Count(_) => None,
            Self::Lanes { lanes, .. } => Some(lanes),
        }
    }
}

/// Classify one static instruction.
#[must_use]
pub fn classify(desc: &InstrDescriptor, policy: &ClassifyPolicy) -> Option<Probe> {
    if let Some(family) = SimdFamily::from_opcode(desc.family) {
        return Some(classify_packed(desc, family));
    }

    let family = ArithFamily::from_opcode(desc.family)?;

    if policy.exclude_immediates && desc.has_immediate() {
        return policy
            .immediate_sanity
            .then_some(Probe::Count(Bucket::ImmediateSanity));
    }
    if policy.exclude_stack && desc.touches_stack() {
        return None;
    }

    let locality = if is_reg_reg(desc) {
        Locality::RegReg
    } else if is_reg_mem(desc, policy) {
        Locality::RegMem
    } else {
        return None;
    };
    Some(Probe::Count(Bucket::scalar(family, locality)))
}

fn is_reg_reg(desc: &InstrDescriptor) -> bool {
    desc.memory_operand_count() == 0 && desc.reads_gpr64() && desc.writes_gpr64()
}

fn is_reg_mem(desc: &InstrDescriptor, policy: &ClassifyPolicy) -> bool {
    let mem_r8 = desc.reads_mem8();
    let mem_w8 = desc.writes_mem8();

    // mem -> reg
    if mem_r8 && !mem_w8 && desc.writes_gpr64() {
        return true;
    }
    // reg -> mem
    policy.count_mem_dest_rmw && mem_w8 && desc.reads_gpr64()
}

fn classify_packed(desc: &InstrDescriptor, family: SimdFamily) -> Probe {
    let lanes = desc
        .widest_vector_write()
        .map_or(DEFAULT_LANES, |bytes| u8::try_from(bytes / 8).unwrap_or(u8::MAX).max(1));
    let masked = desc.mask_read().is_some();
    Probe::Lanes {
        bucket: Bucket::simd(family, masked),
        lanes,
    }
}

/// Lanes that actually execute for a `lanes`-wide op under `mask`.
///
/// Without a mask every lane is active.
#[must_use]
pub const fn active_lanes(lanes: u8, mask: Option<u64>) -> u32 {
    match mask {
        None => lanes as u32,
        Some(bits) => {
            let lane_mask = if lanes >= 64 {
                u64::MAX
            } else {
                (1u64 << lanes) - 1
            };
            (bits & lane_mask).count_ones()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Access, OpcodeFamily, Reg};

    fn rr(family: OpcodeFamily) -> InstrDescriptor {
        InstrDescriptor::new(family, 0x1000)
            .with_reg(Reg::gpr(0), Access::ReadWrite)
            .with_reg(Reg::gpr(3), Access::Read)
    }

    fn scalar(family: ArithFamily, locality: Locality) -> Option<Probe> {
        Some(Probe::Count(Bucket::scalar(family, locality)))
    }

    #[test]
    fn test_reg_reg_families() {
        let policy = ClassifyPolicy::default();
        assert_eq!(
            classify(&rr(OpcodeFamily::Add), &policy),
            scalar(ArithFamily::Add, Locality::RegReg)
        );
        assert_eq!(
            classify(&rr(OpcodeFamily::Imul), &policy),
            scalar(ArithFamily::Mul, Locality::RegReg)
        );
        assert_eq!(
            classify(&rr(OpcodeFamily::Adox), &policy),
            scalar(ArithFamily::Adox, Locality::RegReg)
        );
    }

    #[test]
    fn test_div_with_implicit_registers() {
        // div rcx: reads rcx, rax, rdx; writes rax, rdx
        let desc = InstrDescriptor::new(OpcodeFamily::Idiv, 0)
            .with_reg(Reg::gpr(1), Access::Read)
            .with_implicit_reg(Reg::gpr(0), Access::ReadWrite)
            .with_implicit_reg(Reg::gpr(2), Access::ReadWrite);
        assert_eq!(
            classify(&desc, &ClassifyPolicy::default()),
            scalar(ArithFamily::Div, Locality::RegReg)
        );
    }

    #[test]
    fn test_untracked_opcode_skipped() {
        assert_eq!(classify(&rr(OpcodeFamily::Other), &ClassifyPolicy::default()), None);
    }

    #[test]
    fn test_immediate_excluded() {
        let desc = InstrDescriptor::new(OpcodeFamily::Add, 0)
            .with_reg(Reg::gpr(0), Access::ReadWrite)
            .with_imm(8);
        let policy = ClassifyPolicy::default();
        assert_eq!(classify(&desc, &policy), None);

        let sanity = policy.with_immediate_sanity(true);
        assert_eq!(
            classify(&desc, &sanity),
            Some(Probe::Count(Bucket::ImmediateSanity))
        );

        // Immediate with a memory operand goes the same way.
        let mem = InstrDescriptor::new(OpcodeFamily::Sub, 0)
            .with_mem(8, Access::ReadWrite)
            .with_imm(32);
        assert_eq!(classify(&mem, &policy), None);
    }

    #[test]
    fn test_immediates_allowed_when_not_excluded() {
        let desc = InstrDescriptor::new(OpcodeFamily::Add, 0)
            .with_reg(Reg::gpr(0), Access::ReadWrite)
            .with_imm(8);
        let policy = ClassifyPolicy::default().with_exclude_immediates(false);
        assert_eq!(
            classify(&desc, &policy),
            scalar(ArithFamily::Add, Locality::RegReg)
        );
    }

    #[test]
    fn test_stack_excluded() {
        // sub rsp, rax
        let desc = InstrDescriptor::new(OpcodeFamily::Sub, 0)
            .with_reg(Reg::rsp(), Access::ReadWrite)
            .with_reg(Reg::gpr(0), Access::Read);
        assert_eq!(classify(&desc, &ClassifyPolicy::default()), None);

        // add rax, [rbp-8]
        let desc = InstrDescriptor::new(OpcodeFamily::Add, 0)
            .with_reg(Reg::gpr(0), Access::ReadWrite)
            .with_implicit_reg(Reg::rbp(), Access::Read)
            .with_stack_mem(8, Access::Read);
        assert_eq!(classify(&desc, &ClassifyPolicy::default()), None);
    }

    #[test]
    fn test_stack_register_never_satisfies_gpr_test() {
        // With stack exclusion off, rsp still does not count as a GPR operand.
        let desc = InstrDescriptor::new(OpcodeFamily::Add, 0)
            .with_reg(Reg::rsp(), Access::ReadWrite)
            .with_reg(Reg::rbp(), Access::Read);
        let policy = ClassifyPolicy::default().with_exclude_stack(false);
        assert_eq!(classify(&desc, &policy), None);
    }

    #[test]
    fn test_load_combine() {
        // add rax, [rcx]
        let desc = InstrDescriptor::new(OpcodeFamily::Add, 0)
            .with_reg(Reg::gpr(0), Access::ReadWrite)
            .with_implicit_reg(Reg::gpr(1), Access::Read)
            .with_mem(8, Access::Read);
        assert_eq!(
            classify(&desc, &ClassifyPolicy::default()),
            scalar(ArithFamily::Add, Locality::RegMem)
        );
    }

    #[test]
    fn test_store_combine_gated_by_policy() {
        // sub [rcx], rax
        let desc = InstrDescriptor::new(OpcodeFamily::Sub, 0)
            .with_mem(8, Access::ReadWrite)
            .with_implicit_reg(Reg::gpr(1), Access::Read)
            .with_reg(Reg::gpr(0), Access::Read);
        let policy = ClassifyPolicy::default();
        assert_eq!(
            classify(&desc, &policy),
            scalar(ArithFamily::Sub, Locality::RegMem)
        );
        assert_eq!(classify(&desc, &policy.with_mem_dest_rmw(false)), None);
    }

    #[test]
    fn test_narrow_memory_skipped() {
        // add rax, dword [rcx] style shapes never match the 8-byte tests.
        let desc = InstrDescriptor::new(OpcodeFamily::Add, 0)
            .with_reg(Reg::gpr(0), Access::ReadWrite)
            .with_mem(4, Access::Read);
        assert_eq!(classify(&desc, &ClassifyPolicy::default()), None);
    }

    #[test]
    fn test_packed_lanes() {
        let desc = InstrDescriptor::new(OpcodeFamily::PackedAddQ, 0)
            .with_reg(Reg::ymm(0), Access::Write)
            .with_reg(Reg::ymm(1), Access::Read)
            .with_reg(Reg::ymm(2), Access::Read);
        let probe = classify(&desc, &ClassifyPolicy::default()).unwrap();
        assert_eq!(probe.bucket(), Bucket::simd(SimdFamily::AddQ, false));
        assert_eq!(probe.lanes(), Some(4));
    }

    #[test]
    fn test_packed_default_lanes() {
        let desc = InstrDescriptor::new(OpcodeFamily::PackedSubQ, 0).with_mem(16, Access::Read);
        let probe = classify(&desc, &ClassifyPolicy::default()).unwrap();
        assert_eq!(probe.lanes(), Some(DEFAULT_LANES));
    }

    #[test]
    fn test_packed_masked() {
        let desc = InstrDescriptor::new(OpcodeFamily::PackedSubQ, 0)
            .with_reg(Reg::zmm(0), Access::ReadWrite)
            .with_reg(Reg::mask(1), Access::Read)
            .with_reg(Reg::zmm(1), Access::Read);
        let probe = classify(&desc, &ClassifyPolicy::default()).unwrap();
        assert_eq!(probe.bucket(), Bucket::simd(SimdFamily::SubQ, true));
        assert_eq!(probe.lanes(), Some(8));
    }

    #[test]
    fn test_packed_ignores_scalar_policy() {
        // Packed ops are classified before any immediate/stack filtering.
        let desc = InstrDescriptor::new(OpcodeFamily::PackedAddQ, 0)
            .with_reg(Reg::xmm(0), Access::ReadWrite)
            .with_stack_mem(16, Access::Read);
        assert!(classify(&desc, &ClassifyPolicy::default()).is_some());
    }

    #[test]
    fn test_active_lanes() {
        assert_eq!(active_lanes(4, Some(0b1011)), 3);
        assert_eq!(active_lanes(4, None), 4);
        assert_eq!(active_lanes(2, Some(0b1111_1111)), 2);
        assert_eq!(active_lanes(8, Some(0)), 0);
        assert_eq!(active_lanes(64, Some(u64::MAX)), 64);
    }
}
