pub mod alignment;
pub mod cli;
pub mod errors;
pub mod pipeline;
pub mod pools;
pub mod position;
pub mod reference;
pub mod window;
pub mod workers;
pub mod writer;

use cli::TableArgs;
use errors::Result;
use std::sync::Once;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: Once = Once::new();

pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    });
}

pub fn run_from_args(args: TableArgs) -> Result<()> {
    pipeline::run(&args)
}
