//! Counting buckets.
//!
//! Buckets are a fixed, enumerable set. Each maps to a dense index so a
//! counter block can be a flat array indexed by bucket.

use std::fmt;

use crate::OpcodeFamily;

/// Scalar arithmetic family kept in a bucket.
///
/// Signed and unsigned multiply/divide share a family.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArithFamily {
    Add,
    Sub,
    Adc,
    Sbb,
    Mul,
    Mulx,
    Adcx,
    Adox,
    Div,
}

impl ArithFamily {
    pub const ALL: [Self; 9] = [
        Self::Add,
        Self::Sub,
        Self::Adc,
        Self::Sbb,
        Self::Mul,
        Self::Mulx,
        Self::Adcx,
        Self::Adox,
        Self::Div,
    ];

    /// Map an opcode family, merging IMUL into MUL and IDIV into DIV.
    #[must_use]
    pub const fn from_opcode(family: OpcodeFamily) -> Option<Self> {
        Some(match family {
            OpcodeFamily::Add => Self::Add,
            OpcodeFamily::Sub => Self::Sub,
            OpcodeFamily::Adc => Self::Adc,
            OpcodeFamily::Sbb => Self::Sbb,
            OpcodeFamily::Mul | OpcodeFamily::Imul => Self::Mul,
            OpcodeFamily::Mulx => Self::Mulx,
            OpcodeFamily::Adcx => Self::Adcx,
            OpcodeFamily::Adox => Self::Adox,
            OpcodeFamily::Div | OpcodeFamily::Idiv => Self::Div,
            OpcodeFamily::PackedAddQ | OpcodeFamily::PackedSubQ | OpcodeFamily::Other => {
                return None;
            }
        })
    }

    /// Summary family this one folds into.
    #[must_use]
    pub const fn summary(self) -> SummaryFamily {
        match self {
            Self::Add | Self::Adc | Self::Adcx | Self::Adox => SummaryFamily::Add,
            Self::Sub | Self::Sbb => SummaryFamily::Sub,
            Self::Mul | Self::Mulx => SummaryFamily::Mul,
            Self::Div => SummaryFamily::Div,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Add => "ADD",
            Self::Sub => "SUB",
            Self::Adc => "ADC",
            Self::Sbb => "SBB",
            Self::Mul => "MUL",
            Self::Mulx => "MULX",
            Self::Adcx => "ADCX",
            Self::Adox => "ADOX",
            Self::Div => "DIV",
        }
    }
}

/// The four families of the compact report.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SummaryFamily {
    Add,
    Sub,
    Mul,
    Div,
}

impl SummaryFamily {
    pub const ALL: [Self; 4] = [Self::Add, Self::Sub, Self::Mul, Self::Div];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Add => "ADD",
            Self::Sub => "SUB",
            Self::Mul => "MUL",
            Self::Div => "DIV",
        }
    }
}

/// Operand locality of a scalar bucket.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Locality {
    RegReg,
    RegMem,
}

/// Packed 64-bit-lane family.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SimdFamily {
    AddQ,
    SubQ,
}

impl SimdFamily {
    pub const ALL: [Self; 2] = [Self::AddQ, Self::SubQ];

    #[must_use]
    pub const fn from_opcode(family: OpcodeFamily) -> Option<Self> {
        match family {
            OpcodeFamily::PackedAddQ => Some(Self::AddQ),
            OpcodeFamily::PackedSubQ => Some(Self::SubQ),
            _ => None,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::AddQ => "PADDQ",
            Self::SubQ => "PSUBQ",
        }
    }
}

/// One counting category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Bucket {
    Scalar {
        family: ArithFamily,
        locality: Locality,
    },
    Simd {
        family: SimdFamily,
        masked: bool,
    },
    /// Tracked arithmetic with an immediate operand, kept apart for sanity checks.
    ImmediateSanity,
}

pub const NUM_SCALAR_BUCKETS: usize = ArithFamily::ALL.len() * 2;
pub const NUM_SIMD_BUCKETS: usize = SimdFamily::ALL.len() * 2;
pub const NUM_BUCKETS: usize = NUM_SCALAR_BUCKETS + NUM_SIMD_BUCKETS + 1;

const BUCKET_NAMES: [&str; NUM_BUCKETS] = [
    "add_rr", "add_rm", "sub_rr", "sub_rm", "adc_rr", "adc_rm", "sbb_rr", "sbb_rm",
    "mul_rr", "mul_rm", "mulx_rr", "mulx_rm", "adcx_rr", "adcx_rm", "adox_rr", "adox_rm",
    "div_rr", "div_rm",
    "paddq", "paddq_masked", "psubq", "psubq_masked",
    "imm_sanity",
];

impl Bucket {
    #[must_use]
    pub const fn scalar(family: ArithFamily, locality: Locality) -> Self {
        Self::Scalar { family, locality }
    }

    #[must_use]
    pub const fn simd(family: SimdFamily, masked: bool) -> Self {
        Self::Simd { family, masked }
    }

    /// Dense index in `0..NUM_BUCKETS`.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Scalar { family, locality } => family as usize * 2 + locality as usize,
            Self::Simd { family, masked } => {
                NUM_SCALAR_BUCKETS + family as usize * 2 + masked as usize
            }
            Self::ImmediateSanity => NUM_BUCKETS - 1,
        }
    }

    /// Index into the lane-op counters, for SIMD buckets.
    #[must_use]
    pub const fn lane_index(self) -> Option<usize> {
        match self {
            Self::Simd { family, masked } => Some(family as usize * 2 + masked as usize),
            _ => None,
        }
    }

    /// Inverse of [`Bucket::index`].
    #[must_use]
    pub const fn from_index(index: usize) -> Option<Self> {
        if index < NUM_SCALAR_BUCKETS {
            let family = ArithFamily::ALL[index / 2];
            let locality = if index % 2 == 0 {
                Locality::RegReg
            } else {
                Locality::RegMem
            };
            Some(Self::scalar(family, locality))
        } else if index < NUM_SCALAR_BUCKETS + NUM_SIMD_BUCKETS {
            let i = index - NUM_SCALAR_BUCKETS;
            Some(Self::simd(SimdFamily::ALL[i / 2], i % 2 == 1))
        } else if index == NUM_BUCKETS - 1 {
            Some(Self::ImmediateSanity)
        } else {
            None
        }
    }

    /// Every bucket in index order.
    pub fn all() -> impl Iterator<Item = Self> {
        (0..NUM_BUCKETS).filter_map(Self::from_index)
    }

    /// Short lowercase name, e.g. `add_rr` or `paddq_masked`.
    #[must_use]
    pub const fn name(self) -> &'static str {
        BUCKET_NAMES[self.index()]
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_roundtrip_covers_all() {
        let all: Vec<_> = Bucket::all().collect();
        assert_eq!(all.len(), NUM_BUCKETS);
        for (i, bucket) in all.iter().enumerate() {
            assert_eq!(bucket.index(), i);
        }
        assert_eq!(Bucket::from_index(NUM_BUCKETS), None);
    }

    #[test]
    fn test_names() {
        assert_eq!(
            Bucket::scalar(ArithFamily::Mulx, Locality::RegMem).name(),
            "mulx_rm"
        );
        assert_eq!(Bucket::simd(SimdFamily::SubQ, true).name(), "psubq_masked");
        assert_eq!(Bucket::ImmediateSanity.name(), "imm_sanity");
    }

    #[test]
    fn test_signed_variants_merge() {
        assert_eq!(
            ArithFamily::from_opcode(OpcodeFamily::Imul),
            Some(ArithFamily::Mul)
        );
        assert_eq!(
            ArithFamily::from_opcode(OpcodeFamily::Idiv),
            Some(ArithFamily::Div)
        );
        assert_eq!(ArithFamily::from_opcode(OpcodeFamily::PackedAddQ), None);
    }

    #[test]
    fn test_summary_grouping() {
        assert_eq!(ArithFamily::Adox.summary(), SummaryFamily::Add);
        assert_eq!(ArithFamily::Sbb.summary(), SummaryFamily::Sub);
        assert_eq!(ArithFamily::Mulx.summary(), SummaryFamily::Mul);
        assert_eq!(ArithFamily::Div.summary(), SummaryFamily::Div);
    }

    #[test]
    fn test_lane_index() {
        assert_eq!(Bucket::simd(SimdFamily::AddQ, false).lane_index(), Some(0));
        assert_eq!(Bucket::simd(SimdFamily::SubQ, true).lane_index(), Some(3));
        assert_eq!(Bucket::ImmediateSanity.lane_index(), None);
    }
}
