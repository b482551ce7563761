use std::env;
use std::process;
use std::time::Instant;

use filterfasta::cli::{self, CliOutcome};
use filterfasta::config::{AnnotMode, Config, Verbosity};

/// Process exit code for runtime failures.
const EXIT_RUNTIME: i32 = -1;
/// Process exit code for configuration errors.
const EXIT_CONFIG: i32 = -2;

fn main() {
    let program = env::args()
        .next()
        .unwrap_or_else(|| "filterfasta".to_string());

    let cfg = match cli::parse_args(env::args_os().skip(1)) {
        Ok(CliOutcome::Help) => {
            cli::print_usage(&program);
            return;
        }
        Ok(CliOutcome::Run(cfg)) => cfg,
        Err(err) => {
            eprintln!("configuration error: {err}");
            eprintln!();
            cli::print_usage(&program);
            process::exit(EXIT_CONFIG);
        }
    };

    if cfg.verbosity.verbose() {
        print_config(&cfg);
    }

    let start = Instant::now();
    match filterfasta::run(&cfg) {
        Ok(summary) => {
            if let Some(missing) = summary.hits_not_found {
                if missing > 0 && cfg.verbosity.verbose() {
                    eprintln!("{missing} hit IDs matched no record");
                }
            }
            eprintln!(
                "workers={} records={} bytes={} elapsed_ms={}",
                summary.workers,
                summary.records_extracted,
                summary.bytes_written,
                start.elapsed().as_millis()
            );
        }
        Err(err) => {
            eprintln!("error: {err}");
            process::exit(EXIT_RUNTIME);
        }
    }
}

/// Verbose-mode configuration dump, before the scan starts.
fn print_config(cfg: &Config) {
    eprintln!("query file = {}", cfg.query.display());
    eprintln!("output file = {}", cfg.output.display());
    if cfg.max_records == u64::MAX {
        eprintln!("max records = unlimited");
    } else {
        eprintln!("max records = {}", cfg.max_records);
    }
    if cfg.byte_limit == u64::MAX {
        eprintln!("byte budget = unlimited");
    } else {
        eprintln!("byte budget = {}", cfg.byte_limit);
    }
    match cfg.annot {
        AnnotMode::All => eprintln!("annotation fields = all"),
        AnnotMode::SequenceOnly => eprintln!("annotation fields = none"),
        AnnotMode::Fields { count, with_body } => eprintln!(
            "annotation fields = first {count} {} body",
            if with_body { "with" } else { "without" }
        ),
    }
    match &cfg.hit_source {
        Some(source) => eprintln!("hit source = {}", source.path().display()),
        None if cfg.lengths.is_empty() => eprintln!("length filter = all"),
        None => eprintln!("length filter = configured"),
    }
    eprintln!("workers = {}", cfg.workers);
    if cfg.verbosity == Verbosity::Trace {
        eprintln!("window bytes = {}", cfg.window_bytes);
    }
}
