use crate::cli::TableArgs;
use crate::errors::{AppError, Result};
use crate::pools::IdleBackoff;
use crate::workers::{PipelineShared, spawn_workers};
use crate::writer::spawn_writer;
use flate2::read::GzDecoder;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::fs::File;
use std::io::{BufRead, BufReader, stdin};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::info;

/// The driver stalls a window slide until the writer has caught up to
/// this backlog, so a slide cannot pile the whole chromosome up in the
/// output queue.
const OUTPUT_SLIDE_THRESHOLD: usize = 100_000;

/// Per-worker budget of parsed-but-unapplied lines.
const LINE_QUEUE_CAP_PER_WORKER: usize = 1000;

pub fn run(args: &TableArgs) -> Result<()> {
    let config = Arc::new(args.config());
    let reference =
        crate::reference::ReferenceReader::open(&args.reference, args.name_style())?;
    info!(
        chromosomes = reference.index().len(),
        threads = config.threads,
        block_size = config.loading_block_size,
        "reference indexed"
    );

    let out = crate::writer::open_output(&args.output_name)?;
    let shared = Arc::new(PipelineShared::new(config, reference));
    let workers = spawn_workers(&shared)?;
    let writer = spawn_writer(&shared, out)?;

    let outcome = drive(&shared, args);

    // Reached with everything drained on success; on error it releases
    // whatever is still blocked so the joins below complete.
    shared.working.store(false, Ordering::Release);
    for worker in workers {
        worker.join().map_err(|_| AppError::ThreadPanicked {
            thread: "worker".to_string(),
        })?;
    }
    let writer_outcome = writer.join().map_err(|_| AppError::ThreadPanicked {
        thread: "writer".to_string(),
    })?;

    let records = outcome?;
    writer_outcome?;
    info!(
        records,
        rows = shared.rows_written.load(Ordering::Relaxed),
        "table complete"
    );
    Ok(())
}

/// The single producer: streams the sorted alignment input, slides the
/// window at chromosome transitions and block boundaries, and feeds the
/// line queue. Returns the number of records pushed to the workers.
fn drive(shared: &PipelineShared, args: &TableArgs) -> Result<u64> {
    let mut reader = open_alignment_reader(&args.alignments)?;
    let mut progress = DriverProgress::new(args.progress, &args.alignments);
    let line_queue_cap = LINE_QUEUE_CAP_PER_WORKER * shared.config.threads;

    let mut current_chromosome = String::new();
    let mut reload_pos = 0i64;
    let mut last_pos = 0i64;
    let mut records = 0u64;

    loop {
        let mut line = shared.pools.get_free_line();
        if reader.read_line(&mut line)? == 0 {
            shared.pools.return_line(line);
            break;
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        if line.is_empty() || line.starts_with('@') {
            shared.pools.return_line(line);
            continue;
        }

        let Some((sam_chromosome, sam_pos)) = sam_chromosome_pos(&line) else {
            shared.pools.return_line(line);
            continue;
        };

        let mut backoff = IdleBackoff::new();
        while shared.line_queue.len() > line_queue_cap {
            backoff.wait();
        }

        if sam_chromosome != current_chromosome {
            let name = sam_chromosome.to_string();
            wait_for_slide(shared);
            {
                let mut window = shared.window.write();
                window.move_all_to_output(&shared.pools, &shared.output_queue);
                window.load_new_chromosome(&name, &shared.pools, &shared.output_queue)?;
            }
            current_chromosome = name;
            reload_pos = shared.config.loading_block_size;
            last_pos = 0;
        }

        while sam_pos > reload_pos {
            wait_for_slide(shared);
            {
                let mut window = shared.window.write();
                window.move_block_to_output(&shared.pools, &shared.output_queue);
                window.load_more(&shared.pools, &shared.output_queue);
            }
            reload_pos += shared.config.loading_block_size;
        }

        if last_pos > sam_pos {
            return Err(AppError::InputNotSorted {
                chromosome: current_chromosome,
                last_pos,
                new_pos: sam_pos,
            });
        }

        shared.line_queue.push(line);
        last_pos = sam_pos;
        records += 1;
        progress.on_record(&current_chromosome, sam_pos);
    }

    let mut backoff = IdleBackoff::new();
    while !shared.line_queue.is_empty() {
        backoff.wait();
    }
    {
        let mut window = shared.window.write();
        window.move_all_to_output(&shared.pools, &shared.output_queue);
    }
    backoff.reset();
    while !shared.output_queue.is_empty() {
        backoff.wait();
    }
    shared.working.store(false, Ordering::Release);
    progress.finish(records);
    Ok(records)
}

/// Quiesce point before a window mutation: every queued line applied
/// and the writer within reach of the backlog cap. The write-lock
/// acquisition that follows takes care of records still in flight.
fn wait_for_slide(shared: &PipelineShared) {
    let mut backoff = IdleBackoff::new();
    while !shared.line_queue.is_empty() || shared.output_queue.len() >= OUTPUT_SLIDE_THRESHOLD {
        backoff.wait();
    }
}

/// Pulls (reference name, 1-based position) out of the four leading SAM
/// fields. None for unmapped (`*`) records and for lines too short to
/// be a record.
fn sam_chromosome_pos(line: &str) -> Option<(&str, i64)> {
    let mut fields = line.split('\t');
    let _qname = fields.next()?;
    let _flag = fields.next()?;
    let chromosome = fields.next()?;
    let position = fields.next()?.parse::<i64>().ok()?;
    (chromosome != "*").then_some((chromosome, position))
}

fn open_alignment_reader(path: &str) -> Result<Box<dyn BufRead>> {
    if path == "-" {
        return Ok(Box::new(BufReader::new(stdin())));
    }
    let open_failed = |source: std::io::Error| AppError::OpenFailed {
        path: path.to_string(),
        source,
    };
    let file = File::open(path).map_err(open_failed)?;
    if path.ends_with(".gz") {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

#[derive(Debug)]
struct DriverProgress {
    progress_bar: Option<ProgressBar>,
    records: u64,
    finished: bool,
}

impl DriverProgress {
    const UPDATE_EVERY: u64 = 10_000;

    fn new(enabled: bool, alignments: &str) -> Self {
        let progress_bar = if enabled {
            let bar = ProgressBar::new_spinner();
            bar.set_draw_target(ProgressDrawTarget::stderr_with_hz(4));
            let style = ProgressStyle::with_template("{spinner:.green} {elapsed_precise} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            bar.set_style(style);
            bar.enable_steady_tick(Duration::from_millis(200));
            bar.set_message(format!("starting alignments={alignments}"));
            Some(bar)
        } else {
            None
        };

        Self {
            progress_bar,
            records: 0,
            finished: false,
        }
    }

    fn on_record(&mut self, chromosome: &str, position: i64) {
        self.records += 1;
        if self.records == 1 || self.records.is_multiple_of(Self::UPDATE_EVERY) {
            if let Some(bar) = &self.progress_bar {
                bar.set_message(format!(
                    "records={} locus={chromosome}:{position}",
                    self.records
                ));
            }
        }
    }

    fn finish(&mut self, records: u64) {
        if let Some(bar) = &self.progress_bar {
            bar.finish_with_message(format!("done records={records}"));
        }
        self.finished = true;
    }
}

impl Drop for DriverProgress {
    fn drop(&mut self) {
        if !self.finished
            && let Some(bar) = &self.progress_bar
        {
            bar.finish_and_clear();
        }
    }
}
