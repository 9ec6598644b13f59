//! Symbol resolution supplied by the host.

use rustc_hash::FxHashMap;

/// A routine in the observed program: `[start, end)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Routine {
    pub name: String,
    pub start: u64,
    pub end: u64,
}

impl Routine {
    /// Create a routine covering `[start, end)`.
    pub fn new(name: impl Into<String>, start: u64, end: u64) -> Self {
        Self {
            name: name.into(),
            start,
            end,
        }
    }

    /// Whether `address` lies inside the routine.
    #[must_use]
    pub const fn contains(&self, address: u64) -> bool {
        address >= self.start && address < self.end
    }
}

/// Name and address lookups against the observed program.
pub trait SymbolResolver {
    /// Start address of the routine named `name`.
    fn address_of(&self, name: &str) -> Option<u64>;

    /// Routine enclosing `address`.
    fn routine_at(&self, address: u64) -> Option<&Routine>;
}

/// In-memory routine table, sorted by start address.
#[derive(Debug, Default)]
pub struct RoutineTable {
    routines: Vec<Routine>,
    by_name: FxHashMap<String, usize>,
}

impl RoutineTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from unsorted routines. On duplicate names the lowest start wins.
    pub fn from_routines(routines: impl IntoIterator<Item = Routine>) -> Self {
        let mut routines: Vec<Routine> = routines.into_iter().collect();
        routines.sort_by_key(|r| r.start);

        let mut by_name = FxHashMap::default();
        for (i, routine) in routines.iter().enumerate() {
            by_name.entry(routine.name.clone()).or_insert(i);
        }
        Self { routines, by_name }
    }

    /// Number of routines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routines.is_empty()
    }

    /// Routines in start-address order.
    pub fn iter(&self) -> impl Iterator<Item = &Routine> {
        self.routines.iter()
    }

    /// Routine starting exactly at `start`.
    #[must_use]
    pub fn get(&self, start: u64) -> Option<&Routine> {
        self.routines
            .binary_search_by_key(&start, |r| r.start)
            .ok()
            .map(|i| &self.routines[i])
    }
}

impl SymbolResolver for RoutineTable {
    fn address_of(&self, name: &str) -> Option<u64> {
        self.by_name.get(name).map(|&i| self.routines[i].start)
    }

    fn routine_at(&self, address: u64) -> Option<&Routine> {
        let idx = self.routines.partition_point(|r| r.start <= address);
        let routine = self.routines.get(idx.checked_sub(1)?)?;
        routine.contains(address).then_some(routine)
    }
}
