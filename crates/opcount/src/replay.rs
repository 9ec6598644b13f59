//! Trace replay host.
//!
//! Drives a [`Profiler`] from a recorded execution instead of a live
//! instrumentation framework. Trace format, one record per line:
//!
//! ```text
//! rtn   <name> <start> <end>               routine [start, end)
//! ins   <addr> <hex bytes>                 static x86-64 instruction
//! exec  <tid> <addr> [x<count>] [k=<mask>] dynamic execution(s)
//! enter <tid> <routine start>              routine entry
//! leave <tid> <routine start>              routine exit
//! ```
//!
//! `#` starts a comment. Addresses are hex with `0x` or decimal. Files ending
//! in `.zst` are zstd-compressed.

use std::collections::hash_map::Entry;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::OnceLock;

use rayon::prelude::*;
use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, info};

use opcount_isa::InstrDescriptor;
use opcount_isa::decode::describe;
use opcount_state::{ThreadId, ThreadState};

use crate::config::parse_address;
use crate::dispatch;
use crate::engine::{Analysis, Profiler, RoutineHooks};
use crate::host::{Routine, RoutineTable};
use crate::report::Report;
use crate::{Error, Result};

/// One dynamic event of one thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    Exec {
        address: u64,
        count: u64,
        mask: Option<u64>,
    },
    Enter {
        routine: u64,
    },
    Leave {
        routine: u64,
    },
}

/// A parsed trace.
#[derive(Debug, Default)]
pub struct Trace {
    routines: RoutineTable,
    instructions: Vec<InstrDescriptor>,
    events: Vec<(ThreadId, Event)>,
}

static RTN_PATTERN: OnceLock<Regex> = OnceLock::new();
static INS_PATTERN: OnceLock<Regex> = OnceLock::new();
static EXEC_PATTERN: OnceLock<Regex> = OnceLock::new();
static EDGE_PATTERN: OnceLock<Regex> = OnceLock::new();

fn trace_error(line: usize, message: impl Into<String>) -> Error {
    Error::Trace {
        line,
        message: message.into(),
    }
}

fn address_at(line: usize, text: &str) -> Result<u64> {
    parse_address(text).map_err(|_| trace_error(line, format!("invalid address '{text}'")))
}

fn parse_hex_bytes(line: usize, text: &str) -> Result<Vec<u8>> {
    let digits: Vec<u8> = text.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    if digits.len() % 2 != 0 {
        return Err(trace_error(line, "odd number of hex digits"));
    }
    digits
        .chunks_exact(2)
        .map(|pair| {
            std::str::from_utf8(pair)
                .ok()
                .and_then(|s| u8::from_str_radix(s, 16).ok())
                .ok_or_else(|| trace_error(line, "invalid hex byte"))
        })
        .collect()
}

impl Trace {
    /// Parse trace text.
    ///
    /// # Errors
    ///
    /// Returns a line-numbered error for an unrecognized or malformed
    /// record, a duplicate instruction address, or undecodable bytes.
    pub fn parse(text: &str) -> Result<Self> {
        let rtn = RTN_PATTERN
            .get_or_init(|| Regex::new(r"^rtn\s+(\S+)\s+(\S+)\s+(\S+)$").unwrap());
        let ins = INS_PATTERN
            .get_or_init(|| Regex::new(r"^ins\s+(\S+)\s+([0-9a-fA-F][0-9a-fA-F\s]*)$").unwrap());
        let exec = EXEC_PATTERN.get_or_init(|| {
            Regex::new(r"^exec\s+(\d+)\s+(\S+)(?:\s+x(\d+))?(?:\s+k=(\S+))?$").unwrap()
        });
        let edge =
            EDGE_PATTERN.get_or_init(|| Regex::new(r"^(enter|leave)\s+(\d+)\s+(\S+)$").unwrap());

        let mut routines = Vec::new();
        let mut instructions = Vec::new();
        let mut seen_addresses = FxHashSet::default();
        let mut events = Vec::new();

        for (idx, raw) in text.lines().enumerate() {
            let line = idx + 1;
            let content = raw.split('#').next().unwrap_or_default().trim();
            if content.is_empty() {
                continue;
            }

            if let Some(caps) = rtn.captures(content) {
                let start = address_at(line, &caps[2])?;
                let end = address_at(line, &caps[3])?;
                if end <= start {
                    return Err(trace_error(line, "routine end must be above start"));
                }
                routines.push(Routine::new(&caps[1], start, end));
            } else if let Some(caps) = ins.captures(content) {
                let address = address_at(line, &caps[1])?;
                if !seen_addresses.insert(address) {
                    return Err(trace_error(
                        line,
                        format!("duplicate instruction at {address:#x}"),
                    ));
                }
                let bytes = parse_hex_bytes(line, &caps[2])?;
                let desc =
                    describe(&bytes, address).map_err(|source| Error::Decode { line, source })?;
                instructions.push(desc);
            } else if let Some(caps) = exec.captures(content) {
                let tid = parse_tid(line, &caps[1])?;
                let address = address_at(line, &caps[2])?;
                let count = caps
                    .get(3)
                    .map_or(Ok(1), |m| m.as_str().parse::<u64>())
                    .map_err(|_| trace_error(line, "invalid repeat count"))?;
                let mask = caps
                    .get(4)
                    .map(|m| {
                        parse_address(m.as_str())
                            .map_err(|_| trace_error(line, format!("invalid mask '{}'", m.as_str())))
                    })
                    .transpose()?;
                events.push((
                    tid,
                    Event::Exec {
                        address,
                        count,
                        mask,
                    },
                ));
            } else if let Some(caps) = edge.captures(content) {
                let tid = parse_tid(line, &caps[2])?;
                let routine = address_at(line, &caps[3])?;
                let event = if &caps[1] == "enter" {
                    Event::Enter { routine }
                } else {
                    Event::Leave { routine }
                };
                events.push((tid, event));
            } else {
                return Err(trace_error(line, format!("unrecognized record '{content}'")));
            }
        }

        Ok(Self {
            routines: RoutineTable::from_routines(routines),
            instructions,
            events,
        })
    }

    /// Read and parse a trace file, decompressing `.zst` files.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read or decompressed, or
    /// any error from [`Trace::parse`].
    pub fn load(path: &Path) -> Result<Self> {
        let mut text = String::new();
        let file = File::open(path)?;
        if path.extension().is_some_and(|ext| ext == "zst") {
            zstd::stream::Decoder::new(file)?.read_to_string(&mut text)?;
        } else {
            std::io::BufReader::new(file).read_to_string(&mut text)?;
        }
        Self::parse(&text)
    }

    #[must_use]
    pub const fn routines(&self) -> &RoutineTable {
        &self.routines
    }

    #[must_use]
    pub fn instructions(&self) -> &[InstrDescriptor] {
        &self.instructions
    }

    #[must_use]
    pub fn events(&self) -> &[(ThreadId, Event)] {
        &self.events
    }

    /// Thread ids in order of first appearance.
    #[must_use]
    pub fn threads(&self) -> Vec<ThreadId> {
        let mut seen = FxHashSet::default();
        self.events
            .iter()
            .filter_map(|&(tid, _)| seen.insert(tid).then_some(tid))
            .collect()
    }
}

fn parse_tid(line: usize, text: &str) -> Result<ThreadId> {
    text.parse()
        .map(ThreadId)
        .map_err(|_| trace_error(line, format!("invalid thread id '{text}'")))
}

/// How thread event streams are replayed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReplayMode {
    /// One rayon task per thread.
    #[default]
    Parallel,
    /// Every event in file order on the calling thread.
    Serial,
}

/// Instrumentation results, looked up per event.
struct Instrumented {
    instructions: FxHashMap<u64, Vec<Analysis>>,
    routines: FxHashMap<u64, RoutineHooks>,
}

impl Instrumented {
    fn new(profiler: &Profiler, trace: &Trace) -> Self {
        let instructions = trace
            .instructions
            .iter()
            .map(|desc| (desc.address, profiler.instrument_instruction(desc)))
            .collect();
        let routines = trace
            .routines
            .iter()
            .map(|routine| (routine.start, profiler.instrument_routine(routine)))
            .collect();
        Self {
            instructions,
            routines,
        }
    }

    #[inline]
    fn step(&self, state: &mut ThreadState, event: Event) -> Result<()> {
        match event {
            Event::Exec {
                address,
                count,
                mask,
            } => {
                let tid = state.tid();
                let analyses = self
                    .instructions
                    .get(&address)
                    .ok_or(Error::UnknownInstruction { tid, address })?;
                if !analyses.is_empty() {
                    for _ in 0..count {
                        dispatch::run_all(state, analyses, mask);
                    }
                }
            }
            Event::Enter { routine } => {
                let hooks = self.hooks(state.tid(), routine)?;
                dispatch::enter_routine(state, hooks);
            }
            Event::Leave { routine } => {
                let hooks = self.hooks(state.tid(), routine)?;
                dispatch::exit_routine(state, hooks);
            }
        }
        Ok(())
    }

    fn hooks(&self, tid: ThreadId, routine: u64) -> Result<&RoutineHooks> {
        self.routines.get(&routine).ok_or(Error::UnknownRoutine {
            tid,
            address: routine,
        })
    }
}

/// Replay `trace` through `profiler` and return the final report.
///
/// # Errors
///
/// Returns an error if a thread's counters cannot be allocated, or an event
/// refers to an instruction or routine the trace never declared.
pub fn replay(mut profiler: Profiler, trace: &Trace, mode: ReplayMode) -> Result<Report> {
    profiler.resolve(&trace.routines);
    let program = Instrumented::new(&profiler, trace);
    debug!(
        instructions = program.instructions.len(),
        routines = program.routines.len(),
        "instrumented trace"
    );

    match mode {
        ReplayMode::Parallel => replay_parallel(&profiler, &program, trace)?,
        ReplayMode::Serial => replay_serial(&profiler, &program, trace)?,
    }

    info!(
        threads = profiler.thread_count(),
        events = trace.events.len(),
        "replay finished"
    );
    Ok(profiler.finalize())
}

fn replay_parallel(profiler: &Profiler, program: &Instrumented, trace: &Trace) -> Result<()> {
    let mut index: FxHashMap<ThreadId, usize> = FxHashMap::default();
    let mut streams: Vec<(ThreadState, Vec<Event>)> = Vec::new();
    for &(tid, event) in &trace.events {
        let slot = if let Some(&slot) = index.get(&tid) {
            slot
        } else {
            streams.push((profiler.register_thread(tid)?, Vec::new()));
            index.insert(tid, streams.len() - 1);
            streams.len() - 1
        };
        streams[slot].1.push(event);
    }

    streams.into_par_iter().try_for_each(|(mut state, events)| {
        events
            .into_iter()
            .try_for_each(|event| program.step(&mut state, event))
    })
}

fn replay_serial(profiler: &Profiler, program: &Instrumented, trace: &Trace) -> Result<()> {
    let mut states: FxHashMap<ThreadId, ThreadState> = FxHashMap::default();
    for &(tid, event) in &trace.events {
        let state = match states.entry(tid) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => e.insert(profiler.register_thread(tid)?),
        };
        program.step(state, event)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProfilerConfig;
    use opcount_isa::SummaryFamily;

    const SAMPLE: &str = "\
# two threads adding
rtn main 0x1000 0x1100
ins 0x1000 48 01 d8     # add rax, rbx
ins 0x1003 480fafc3     # imul rax, rbx
ins 0x1007 c3           # ret
exec 1 0x1000 x10
exec 2 0x1000
exec 2 0x1003 x3
exec 1 0x1007
";

    #[test]
    fn test_parse() {
        let trace = Trace::parse(SAMPLE).unwrap();
        assert_eq!(trace.routines().len(), 1);
        assert_eq!(trace.instructions().len(), 3);
        assert_eq!(trace.events().len(), 4);
        assert_eq!(trace.threads(), vec![ThreadId(1), ThreadId(2)]);
        assert_eq!(
            trace.events()[0],
            (
                ThreadId(1),
                Event::Exec {
                    address: 0x1000,
                    count: 10,
                    mask: None
                }
            )
        );
    }

    #[test]
    fn test_parse_mask_and_edges() {
        let err = Trace::parse("exec 0 4096 x2 k=0b\nenter 3 0x10").unwrap_err();
        assert!(matches!(err, Error::Trace { line: 1, .. }));

        let trace = Trace::parse("exec 0 4096 x2 k=0xb\nenter 3 0x10\nleave 3 16").unwrap();
        assert_eq!(
            trace.events(),
            &[
                (
                    ThreadId(0),
                    Event::Exec {
                        address: 4096,
                        count: 2,
                        mask: Some(0xb)
                    }
                ),
                (ThreadId(3), Event::Enter { routine: 0x10 }),
                (ThreadId(3), Event::Leave { routine: 0x10 }),
            ]
        );
    }

    #[test]
    fn test_parse_errors_carry_line() {
        let err = Trace::parse("rtn f 0x10 0x20\nbogus line").unwrap_err();
        assert!(matches!(err, Error::Trace { line: 2, .. }));

        let err = Trace::parse("\n\nins 0x10 48 01").unwrap_err();
        assert!(matches!(err, Error::Decode { line: 3, .. }));

        let err = Trace::parse("ins 0x10 480").unwrap_err();
        assert!(matches!(err, Error::Trace { line: 1, .. }));
    }

    #[test]
    fn test_replay_modes_agree() {
        let trace = Trace::parse(SAMPLE).unwrap();
        let parallel = replay(Profiler::new(ProfilerConfig::new()), &trace, ReplayMode::Parallel)
            .unwrap();
        let serial =
            replay(Profiler::new(ProfilerConfig::new()), &trace, ReplayMode::Serial).unwrap();

        assert_eq!(parallel.totals, serial.totals);
        assert_eq!(parallel.threads, 2);
        assert_eq!(parallel.family_total(SummaryFamily::Add), 11);
        assert_eq!(parallel.family_total(SummaryFamily::Mul), 3);
    }

    #[test]
    fn test_unknown_instruction() {
        let trace = Trace::parse("exec 4 0x2000").unwrap();
        let err = replay(Profiler::new(ProfilerConfig::new()), &trace, ReplayMode::Serial)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::UnknownInstruction {
                tid: ThreadId(4),
                address: 0x2000
            }
        ));
    }
}
