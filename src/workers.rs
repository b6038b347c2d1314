use crate::alignment::Alignment;
use crate::cli::TableConfig;
use crate::errors::Result;
use crate::pools::{IdleBackoff, OutputQueue, Pools};
use crate::reference::ReferenceReader;
use crate::window::ReferenceWindow;
use crossbeam_queue::SegQueue;
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;

/// Everything the driver, the workers and the writer share. The window
/// guard doubles as the quiesce barrier: workers hold the read side for
/// one record at a time, and the driver's write acquisition cannot
/// complete while any per-base append is in flight.
pub struct PipelineShared {
    pub config: Arc<TableConfig>,
    pub window: RwLock<ReferenceWindow>,
    pub line_queue: SegQueue<String>,
    pub output_queue: OutputQueue,
    pub pools: Pools,
    pub working: AtomicBool,
    pub rows_written: AtomicU64,
}

impl PipelineShared {
    pub fn new(config: Arc<TableConfig>, reference: ReferenceReader) -> Self {
        let window = ReferenceWindow::new(Arc::clone(&config), reference);
        Self {
            config,
            window: RwLock::new(window),
            line_queue: SegQueue::new(),
            output_queue: OutputQueue::new(),
            pools: Pools::new(),
            working: AtomicBool::new(true),
            rows_written: AtomicU64::new(0),
        }
    }
}

pub fn spawn_workers(shared: &Arc<PipelineShared>) -> Result<Vec<JoinHandle<()>>> {
    let mut workers = Vec::with_capacity(shared.config.threads);
    for index in 0..shared.config.threads {
        let shared = Arc::clone(shared);
        let handle = std::thread::Builder::new()
            .name(format!("table3n-worker-{index}"))
            .spawn(move || worker_loop(&shared))?;
        workers.push(handle);
    }
    Ok(workers)
}

/// The read guard is taken before the pop and held through the apply:
/// once the driver sees the line queue empty, its write acquisition
/// cannot complete until every popped record has landed, which is what
/// makes sliding the window safe.
fn worker_loop(shared: &PipelineShared) {
    let mut backoff = IdleBackoff::new();
    while shared.working.load(Ordering::Acquire) {
        let mut window = shared.window.read();
        let Some(line) = shared.line_queue.pop() else {
            drop(window);
            backoff.wait();
            continue;
        };
        backoff.reset();
        // The window may still be seeding at startup; records are only
        // queued for a loaded chromosome, so this settles immediately.
        while window.is_empty() {
            drop(window);
            if !shared.working.load(Ordering::Acquire) {
                shared.pools.return_line(line);
                return;
            }
            backoff.wait();
            window = shared.window.read();
        }
        let alignment = Alignment::parse(&line, &shared.config);
        shared.pools.return_line(line);
        if let Some(alignment) = alignment {
            window.apply_alignment(&alignment);
        }
    }
}
