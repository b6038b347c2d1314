use parking_lot::{Mutex, MutexGuard};

pub const STRAND_FORWARD: u8 = b'+';
pub const STRAND_REVERSE: u8 = b'-';
pub const STRAND_NONE: u8 = b'?';

/// One read base placed on the reference, as reported by the alignment
/// parser. `skip` marks bases that carry no usable conversion evidence
/// (soft clips, insertions, foreign mismatches, missing qualities).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseObservation {
    pub ref_offset: i32,
    pub qual: u8,
    pub converted: bool,
    pub skip: bool,
}

/// Dedup record for one read at one position. `qual_index` is where the
/// entry's quality character currently sits in its quality string, so a
/// retraction deletes exactly the character this read contributed.
#[derive(Debug, Clone, Copy)]
struct ReadEntry {
    read_name_id: u64,
    converted: bool,
    qual_index: usize,
    removed: bool,
}

#[derive(Debug)]
pub struct PositionState {
    pub chromosome: String,
    pub location: i64,
    pub strand: u8,
    pub converted_qualities: Vec<u8>,
    pub unconverted_qualities: Vec<u8>,
    read_entries: Vec<ReadEntry>,
}

impl PositionState {
    fn new() -> Self {
        Self {
            chromosome: String::new(),
            location: -1,
            strand: STRAND_NONE,
            converted_qualities: Vec::new(),
            unconverted_qualities: Vec::new(),
            read_entries: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.converted_qualities.is_empty() && self.unconverted_qualities.is_empty()
    }

    fn clear(&mut self) {
        self.chromosome.clear();
        self.location = -1;
        self.strand = STRAND_NONE;
        self.converted_qualities.clear();
        self.unconverted_qualities.clear();
        self.read_entries.clear();
    }

    /// Dedup bookkeeping is only needed while the position is live in
    /// the window; drop it before the record travels to the writer.
    pub(crate) fn release_dedup(&mut self) {
        self.read_entries = Vec::new();
    }

    fn append_observation(&mut self, read_name_id: u64, converted: bool, qual: u8) {
        let slot = match self
            .read_entries
            .binary_search_by_key(&read_name_id, |entry| entry.read_name_id)
        {
            Ok(found) => {
                let entry = self.read_entries[found];
                if entry.removed || entry.converted == converted {
                    return;
                }
                // Same read reporting both states: retract its earlier
                // contribution and ignore the new one.
                self.read_entries[found].removed = true;
                self.retract(entry.converted, entry.qual_index);
                return;
            }
            Err(slot) => slot,
        };

        let qualities = if converted {
            &mut self.converted_qualities
        } else {
            &mut self.unconverted_qualities
        };
        let qual_index = qualities.len();
        qualities.push(qual);
        self.read_entries.insert(
            slot,
            ReadEntry {
                read_name_id,
                converted,
                qual_index,
                removed: false,
            },
        );
    }

    fn retract(&mut self, converted: bool, qual_index: usize) {
        let qualities = if converted {
            &mut self.converted_qualities
        } else {
            &mut self.unconverted_qualities
        };
        qualities.remove(qual_index);
        for entry in &mut self.read_entries {
            if !entry.removed && entry.converted == converted && entry.qual_index > qual_index {
                entry.qual_index -= 1;
            }
        }
    }

    #[cfg(test)]
    fn live_entries(&self) -> usize {
        self.read_entries
            .iter()
            .filter(|entry| !entry.removed)
            .count()
    }
}

/// One reference position under accumulation. Workers touching the same
/// alignment hit contiguous distinct positions, so each position locks
/// independently and the critical section stays one observation long.
pub struct Position {
    state: Mutex<PositionState>,
}

impl Position {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PositionState::new()),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, PositionState> {
        self.state.lock()
    }

    pub(crate) fn init(&self, chromosome: &str, location: i64) {
        let mut state = self.state.lock();
        state.chromosome.clear();
        state.chromosome.push_str(chromosome);
        state.location = location;
        state.strand = STRAND_NONE;
    }

    pub(crate) fn set_strand(&self, strand: u8) {
        self.state.lock().strand = strand;
    }

    /// Records one read's evidence. Total: duplicate and contradictory
    /// observations resolve through the dedup entries, and positions
    /// outside the conversion classes ignore everything.
    pub fn append_base(&self, read_name_id: u64, observation: BaseObservation, location: i64) {
        let mut state = self.state.lock();
        debug_assert_eq!(
            state.location, location,
            "window misaligned with alignment stream"
        );
        if state.strand == STRAND_NONE {
            return;
        }
        state.append_observation(read_name_id, observation.converted, observation.qual);
    }

    pub(crate) fn reset(&self) {
        self.state.lock().clear();
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::new()
    }
}
