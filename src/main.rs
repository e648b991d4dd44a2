use std::error::Error;
use std::path::PathBuf;

use hand_rc::config;
use hand_rc::ingest::nwis;
use hand_rc::logging::{self, DataSource};
use hand_rc::pipeline::{self, Sources};

fn main() -> Result<(), Box<dyn Error>> {
    // An explicit path argument wins over HAND_RC_CONFIG.
    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(config::config_path);
    let cfg = config::load_config(&path)?;

    logging::init_logger(
        cfg.logging.min_level()?,
        cfg.logging.file.as_deref(),
        cfg.logging.timestamps,
    );
    logging::info(
        DataSource::System,
        None,
        &format!("Loaded configuration from {}", path.display()),
    );

    let sources = Sources::open(&cfg.hand, &cfg.crosswalk)?;
    let client = nwis::http_client(cfg.nwis.timeout_secs)?;
    let reach_ids = sources.batch_reach_ids(&cfg.run.reach_ids);

    let report = pipeline::run_batch(&reach_ids, &sources, &client, &cfg)?;
    let report_path = pipeline::write_report(&report, &cfg.run.output_dir)?;

    pipeline::print_summary(&report);
    println!("\nReport written to {}", report_path.display());
    Ok(())
}
