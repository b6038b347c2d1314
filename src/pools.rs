use crate::position::Position;
use crossbeam_queue::SegQueue;
use std::sync::Arc;
use std::time::Duration;

/// Finalized positions waiting for the writer, FIFO in window order.
pub type OutputQueue = SegQueue<Arc<Position>>;

/// The window loader stops drawing fresh positions while the writer is
/// this far behind, which bounds live positions when workers outrun it.
pub const OUTPUT_QUEUE_CAP: usize = 10_000;

/// Adaptive wait for the spin points of the pipeline: yield first, then
/// sleep with the pause doubling up to a cap, reset after progress.
pub struct IdleBackoff {
    wait_us: u64,
}

impl IdleBackoff {
    const MIN_WAIT_US: u64 = 1;
    const MAX_WAIT_US: u64 = 256;

    pub fn new() -> Self {
        Self {
            wait_us: Self::MIN_WAIT_US,
        }
    }

    pub fn reset(&mut self) {
        self.wait_us = Self::MIN_WAIT_US;
    }

    pub fn wait(&mut self) {
        if self.wait_us <= Self::MIN_WAIT_US {
            std::thread::yield_now();
        } else {
            std::thread::sleep(Duration::from_micros(self.wait_us));
        }
        self.wait_us = (self.wait_us * 2).min(Self::MAX_WAIT_US);
    }
}

impl Default for IdleBackoff {
    fn default() -> Self {
        Self::new()
    }
}

/// Recycling pools for line buffers and position records. Pop-or-allocate;
/// every returned object comes back cleared.
pub struct Pools {
    free_lines: SegQueue<String>,
    free_positions: SegQueue<Arc<Position>>,
}

impl Pools {
    pub fn new() -> Self {
        Self {
            free_lines: SegQueue::new(),
            free_positions: SegQueue::new(),
        }
    }

    pub fn get_free_line(&self) -> String {
        self.free_lines.pop().unwrap_or_default()
    }

    pub fn return_line(&self, mut line: String) {
        line.clear();
        self.free_lines.push(line);
    }

    /// Blocks while the output queue is at capacity; the writer draining
    /// below the cap is the only thing that unblocks the window loader.
    pub fn get_free_position(&self, output_queue: &OutputQueue) -> Arc<Position> {
        let mut backoff = IdleBackoff::new();
        while output_queue.len() >= OUTPUT_QUEUE_CAP {
            backoff.wait();
        }
        self.free_positions
            .pop()
            .unwrap_or_else(|| Arc::new(Position::new()))
    }

    pub fn return_position(&self, position: Arc<Position>) {
        position.reset();
        self.free_positions.push(position);
    }
}

impl Default for Pools {
    fn default() -> Self {
        Self::new()
    }
}
