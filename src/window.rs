use crate::alignment::Alignment;
use crate::cli::TableConfig;
use crate::errors::Result;
use crate::pools::{OutputQueue, Pools};
use crate::position::{Position, STRAND_FORWARD, STRAND_NONE, STRAND_REVERSE};
use crate::reference::ReferenceReader;
use std::collections::VecDeque;
use std::sync::Arc;

/// Sliding window of positions for the active chromosome. Loaded and
/// slid only by the driver while the workers are quiesced; read by the
/// workers otherwise, so none of its own fields need a lock.
pub struct ReferenceWindow {
    config: Arc<TableConfig>,
    reference: ReferenceReader,
    chromosome: String,
    /// Reference bases streamed so far on the active chromosome.
    location: i64,
    /// High-water mark of bases allowed into the window.
    ref_covered_position: i64,
    last_base: u8,
    /// Location of the front position; the deque is strictly contiguous.
    start_location: i64,
    ref_positions: VecDeque<Arc<Position>>,
    line_buffer: Vec<u8>,
}

impl ReferenceWindow {
    pub fn new(config: Arc<TableConfig>, reference: ReferenceReader) -> Self {
        Self {
            config,
            reference,
            chromosome: String::new(),
            location: 0,
            ref_covered_position: 0,
            last_base: b'X',
            start_location: 1,
            ref_positions: VecDeque::new(),
            line_buffer: Vec::new(),
        }
    }

    pub fn chromosome(&self) -> &str {
        &self.chromosome
    }

    pub fn is_empty(&self) -> bool {
        self.ref_positions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ref_positions.len()
    }

    /// Seeds the window with the first ~2 blocks of `name`. The caller
    /// must have flushed the previous chromosome with
    /// `move_all_to_output` first.
    pub fn load_new_chromosome(
        &mut self,
        name: &str,
        pools: &Pools,
        output_queue: &OutputQueue,
    ) -> Result<()> {
        self.reference.seek_to_chromosome(name)?;
        self.chromosome.clear();
        self.chromosome.push_str(name);
        self.location = 0;
        self.ref_covered_position = 2 * self.config.loading_block_size;
        self.last_base = b'X';
        self.start_location = 1;
        self.fill(pools, output_queue);
        Ok(())
    }

    /// Extends the window by one block of reference bases.
    pub fn load_more(&mut self, pools: &Pools, output_queue: &OutputQueue) {
        self.ref_covered_position += self.config.loading_block_size;
        self.fill(pools, output_queue);
    }

    fn fill(&mut self, pools: &Pools, output_queue: &OutputQueue) {
        let mut line = std::mem::take(&mut self.line_buffer);
        while self.location < self.ref_covered_position {
            if !self.reference.read_line_into(&mut line) {
                break;
            }
            if line.is_empty() {
                continue;
            }
            if line[0] == b'>' {
                break;
            }
            line.make_ascii_uppercase();
            self.append_ref_position(&line, pools, output_queue);
        }
        self.line_buffer = line;
    }

    fn append_ref_position(&mut self, line: &[u8], pools: &Pools, output_queue: &OutputQueue) {
        for (index, &base) in line.iter().enumerate() {
            let position = pools.get_free_position(output_queue);
            position.init(&self.chromosome, self.location + index as i64 + 1);
            if self.config.cg_only {
                if self.last_base == b'C' && base == b'G' {
                    if let Some(previous) = self.ref_positions.back() {
                        previous.set_strand(STRAND_FORWARD);
                    }
                    position.set_strand(STRAND_REVERSE);
                }
            } else if base == self.config.convert_from {
                position.set_strand(STRAND_FORWARD);
            } else if base == self.config.convert_from_complement {
                position.set_strand(STRAND_REVERSE);
            }
            self.ref_positions.push_back(position);
            self.last_base = base;
        }
        self.location += line.len() as i64;
    }

    /// Evicts every position that has fallen one whole block behind the
    /// covered high-water mark. Pushed in ascending location order, so a
    /// FIFO output queue keeps the table sorted.
    pub fn move_block_to_output(&mut self, pools: &Pools, output_queue: &OutputQueue) {
        let cutoff = self.ref_covered_position - self.config.loading_block_size;
        while self.start_location < cutoff {
            let Some(position) = self.ref_positions.pop_front() else {
                break;
            };
            self.start_location += 1;
            emit_or_recycle(position, pools, output_queue);
        }
    }

    /// Flushes the whole window, at end of input or before switching
    /// chromosomes.
    pub fn move_all_to_output(&mut self, pools: &Pools, output_queue: &OutputQueue) {
        while let Some(position) = self.ref_positions.pop_front() {
            self.start_location += 1;
            emit_or_recycle(position, pools, output_queue);
        }
    }

    /// Applies one parsed record's evidence to the window. Runs on
    /// worker threads under the window's read guard.
    pub fn apply_alignment(&self, alignment: &Alignment) {
        if !alignment.mapped || alignment.bases.is_empty() {
            return;
        }
        let base_index = alignment.location - self.start_location;
        for observation in &alignment.bases {
            if observation.skip {
                continue;
            }
            let window_index = base_index + i64::from(observation.ref_offset);
            let position = &self.ref_positions[window_index as usize];
            position.append_base(
                alignment.read_name_id,
                *observation,
                alignment.location + i64::from(observation.ref_offset),
            );
        }
    }
}

fn emit_or_recycle(position: Arc<Position>, pools: &Pools, output_queue: &OutputQueue) {
    let keep = {
        let mut state = position.state();
        let keep = state.strand != STRAND_NONE && !state.is_empty();
        if keep {
            state.release_dedup();
        }
        keep
    };
    if keep {
        output_queue.push(position);
    } else {
        pools.return_position(position);
    }
}
