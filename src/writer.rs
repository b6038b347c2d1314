use crate::errors::{AppError, Result};
use crate::pools::IdleBackoff;
use crate::position::PositionState;
use crate::workers::PipelineShared;
use std::fs::File;
use std::io::{BufWriter, Write, stdout};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::JoinHandle;

pub const TABLE_HEADER: &str =
    "ref\tpos\tstrand\tconvertedBaseQualities\tconvertedBaseCount\tunconvertedBaseQualities\tunconvertedBaseCount";

pub fn open_output(output_name: &str) -> Result<Box<dyn Write + Send>> {
    if output_name.is_empty() || output_name == "-" {
        return Ok(Box::new(BufWriter::new(stdout())));
    }
    let file = File::create(output_name).map_err(|source| AppError::OpenFailed {
        path: output_name.to_string(),
        source,
    })?;
    Ok(Box::new(BufWriter::new(file)))
}

pub fn write_header<W: Write + ?Sized>(out: &mut W) -> Result<()> {
    out.write_all(TABLE_HEADER.as_bytes())?;
    out.write_all(b"\n")?;
    Ok(())
}

/// One table row. Quality strings go out as raw characters; downstream
/// tools consume them unquoted.
pub fn write_position_row<W: Write + ?Sized>(out: &mut W, state: &PositionState) -> Result<()> {
    out.write_all(state.chromosome.as_bytes())?;
    write!(out, "\t{}\t", state.location)?;
    out.write_all(&[state.strand])?;
    out.write_all(b"\t")?;
    out.write_all(&state.converted_qualities)?;
    write!(out, "\t{}\t", state.converted_qualities.len())?;
    out.write_all(&state.unconverted_qualities)?;
    writeln!(out, "\t{}", state.unconverted_qualities.len())?;
    Ok(())
}

/// Single consumer of the output queue. Runs until shutdown, then keeps
/// draining whatever is still queued before exiting. The caller opens
/// the output up front so a bad path fails before any thread starts.
pub fn spawn_writer(
    shared: &Arc<PipelineShared>,
    mut out: Box<dyn Write + Send>,
) -> Result<JoinHandle<Result<()>>> {
    let shared = Arc::clone(shared);
    let handle = std::thread::Builder::new()
        .name("table3n-writer".to_string())
        .spawn(move || {
            writer_loop(&shared, out.as_mut())?;
            out.flush()?;
            Ok(())
        })?;
    Ok(handle)
}

/// After a write error the loop keeps consuming and recycling positions
/// so the driver's backpressure never wedges on a dead writer; the
/// first error is reported once the pipeline shuts down.
fn writer_loop(shared: &PipelineShared, out: &mut dyn Write) -> Result<()> {
    let mut failure = write_header(out).err();
    let mut backoff = IdleBackoff::new();
    loop {
        match shared.output_queue.pop() {
            Some(position) => {
                if failure.is_none() {
                    let written = {
                        let state = position.state();
                        write_position_row(out, &state)
                    };
                    match written {
                        Ok(()) => {
                            shared.rows_written.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(error) => failure = Some(error),
                    }
                }
                shared.pools.return_position(position);
                backoff.reset();
            }
            None => {
                if !shared.working.load(Ordering::Acquire) {
                    break;
                }
                backoff.wait();
            }
        }
    }
    match failure {
        Some(error) => Err(error),
        None => Ok(()),
    }
}
