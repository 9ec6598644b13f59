//! End-of-run report.

use std::fmt;

use opcount_isa::{ArithFamily, Bucket, Locality, SimdFamily, SummaryFamily};
use opcount_state::CounterTotals;

use crate::config::ReportStyle;
use crate::engine::Diagnostic;

/// Aggregated counts after finalize.
#[derive(Clone, Debug)]
pub struct Report {
    /// Number of threads whose counters were summed.
    pub threads: usize,
    pub totals: CounterTotals,
    pub style: ReportStyle,
    /// Whether the immediate-sanity bucket was being filled.
    pub immediate_sanity: bool,
    pub diagnostics: Vec<Diagnostic>,
}

impl Report {
    /// Compact-report total for one family.
    #[must_use]
    pub fn family_total(&self, family: SummaryFamily) -> u64 {
        self.totals.family_total(family)
    }

    #[must_use]
    pub const fn count(&self, bucket: Bucket) -> u64 {
        self.totals.count(bucket)
    }

    #[must_use]
    pub fn lane_ops(&self, bucket: Bucket) -> u64 {
        self.totals.lane_ops(bucket)
    }

    fn fmt_compact(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for family in SummaryFamily::ALL {
            writeln!(f, "{}: {}", family.name(), self.family_total(family))?;
        }
        Ok(())
    }

    fn fmt_verbose(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- 64-bit integer arithmetic ---")?;
        for family in ArithFamily::ALL {
            writeln!(
                f,
                "{:<5} rr: {}   rm/mr: {}",
                family.name(),
                self.count(Bucket::scalar(family, Locality::RegReg)),
                self.count(Bucket::scalar(family, Locality::RegMem)),
            )?;
        }

        writeln!(f, "--- packed 64-bit lanes ---")?;
        for family in SimdFamily::ALL {
            for masked in [false, true] {
                let bucket = Bucket::simd(family, masked);
                let label = if masked {
                    format!("{}{{k}}", family.name())
                } else {
                    family.name().to_string()
                };
                writeln!(
                    f,
                    "{label:<9} insts: {}   lane-ops: {}",
                    self.count(bucket),
                    self.lane_ops(bucket),
                )?;
            }
        }

        if self.immediate_sanity {
            writeln!(f, "IMM sanity: {}", self.count(Bucket::ImmediateSanity))?;
        }
        writeln!(f, "threads: {}", self.threads)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.style {
            ReportStyle::Compact => self.fmt_compact(f),
            ReportStyle::Verbose => self.fmt_verbose(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(style: ReportStyle, immediate_sanity: bool) -> Report {
        let mut totals = CounterTotals::default();
        totals.counts[Bucket::scalar(ArithFamily::Add, Locality::RegReg).index()] = 5;
        totals.counts[Bucket::scalar(ArithFamily::Adc, Locality::RegMem).index()] = 2;
        totals.counts[Bucket::scalar(ArithFamily::Div, Locality::RegMem).index()] = 1;
        let masked = Bucket::simd(SimdFamily::AddQ, true);
        totals.counts[masked.index()] = 4;
        totals.lane_ops[masked.lane_index().unwrap()] = 11;
        totals.counts[Bucket::ImmediateSanity.index()] = 9;
        Report {
            threads: 3,
            totals,
            style,
            immediate_sanity,
            diagnostics: Vec::new(),
        }
    }

    #[test]
    fn test_compact_format() {
        let text = report(ReportStyle::Compact, false).to_string();
        assert_eq!(text, "ADD: 7\nSUB: 0\nMUL: 0\nDIV: 1\n");
    }

    #[test]
    fn test_verbose_format() {
        let text = report(ReportStyle::Verbose, true).to_string();
        assert!(text.starts_with("--- 64-bit integer arithmetic ---\n"));
        assert!(text.contains("ADD   rr: 5   rm/mr: 0\n"));
        assert!(text.contains("ADC   rr: 0   rm/mr: 2\n"));
        assert!(text.contains("ADOX  rr: 0   rm/mr: 0\n"));
        assert!(text.contains("PADDQ{k}  insts: 4   lane-ops: 11\n"));
        assert!(text.contains("PSUBQ     insts: 0   lane-ops: 0\n"));
        assert!(text.contains("IMM sanity: 9\n"));
        assert!(text.ends_with("threads: 3\n"));
    }

    #[test]
    fn test_verbose_hides_disabled_sanity() {
        let text = report(ReportStyle::Verbose, false).to_string();
        assert!(!text.contains("IMM sanity"));
    }
}
