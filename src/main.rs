use std::process::ExitCode;

#[cfg(feature = "mimalloc-allocator")]
use mimalloc::MiMalloc;

#[cfg(feature = "mimalloc-allocator")]
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() -> ExitCode {
    table3n::init_tracing();
    match table3n::cli::parse_from_env().and_then(table3n::run_from_args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("table3n: {error}");
            ExitCode::from(1)
        }
    }
}
