//! Command-line parsing for the `filterfasta` binary.
//!
//! Hand-rolled over `std::env::args_os()`; no parser dependency.
//!
//! # Grammar
//!
//! ```text
//! filterfasta -q QUERY [-o OUT] [-c COUNT] [-l LEN | -l LO:HI]...
//!             [-a ANNOT] [-b BYTES[KB|MB|GB]] [-t TABLE -p PIPE]
//!             [-s SEARCH] [-w WORKERS] [--window-bytes N] [-v] [-z] [-h]
//! ```
//!
//! Every option takes `-x VALUE`, `-x=VALUE`, `--long VALUE`, or
//! `--long=VALUE`. Parsing collects raw values; every cross-option rule is
//! applied by [`Config::validate`] so the outcome is testable without a
//! process. Positional arguments are ignored with a warning.

use std::ffi::OsString;
use std::path::PathBuf;

use crate::config::{
    AnnotMode, Config, ConfigError, FilterPush, HitSource, LengthFilter, Verbosity,
    DEFAULT_OUTPUT,
};

/// What the argument list asked for.
#[derive(Debug)]
pub enum CliOutcome {
    /// Run an extraction with this configuration.
    Run(Config),
    /// Print usage and exit successfully.
    Help,
}

/// Parses an argument list (without the program name) into a validated
/// configuration.
pub fn parse_args<I>(args: I) -> Result<CliOutcome, ConfigError>
where
    I: IntoIterator<Item = OsString>,
{
    let mut args = args.into_iter();

    let mut query: Option<PathBuf> = None;
    let mut output = PathBuf::from(DEFAULT_OUTPUT);
    let mut max_records = u64::MAX;
    let mut byte_limit = u64::MAX;
    let mut lengths = LengthFilter::default();
    let mut annot = AnnotMode::All;
    let mut table: Option<PathBuf> = None;
    let mut search: Option<PathBuf> = None;
    let mut pipe_mode = 0i64;
    let mut workers = 1usize;
    let mut window_bytes = crate::scan::DEFAULT_WINDOW_BYTES;
    let mut verbosity = Verbosity::Quiet;

    while let Some(arg) = args.next() {
        let text = arg.to_string_lossy().into_owned();

        let (name, inline): (&'static str, Option<String>) = if let Some(rest) = text.strip_prefix("--")
        {
            match rest.split_once('=') {
                Some((n, v)) => (long_name(n)?, Some(v.to_string())),
                None => (long_name(rest)?, None),
            }
        } else if text.len() > 1 && text.starts_with('-') && text.is_char_boundary(2) {
            let (flag, rest) = text.split_at(2);
            let inline = if rest.is_empty() {
                None
            } else {
                // `-q=path` arrives as one argument; drop the joiner.
                Some(rest.strip_prefix('=').unwrap_or(rest).to_string())
            };
            (short_name(flag)?, inline)
        } else {
            eprintln!("warning: ignoring non-option argument '{text}'");
            continue;
        };

        match name {
            "help" => return Ok(CliOutcome::Help),
            "verbose" => {
                if verbosity == Verbosity::Quiet {
                    verbosity = Verbosity::Verbose;
                }
            }
            "trace" => verbosity = Verbosity::Trace,
            "query" => query = Some(PathBuf::from(value(name, inline, &mut args)?)),
            "output" => output = PathBuf::from(value(name, inline, &mut args)?),
            "table" => table = Some(PathBuf::from(value(name, inline, &mut args)?)),
            "search" => search = Some(PathBuf::from(value(name, inline, &mut args)?)),
            "count" => {
                let raw = parse_i64("count", &value(name, inline, &mut args)?)?;
                if raw < 0 {
                    return Err(ConfigError::InvalidCount(raw));
                }
                max_records = raw as u64;
            }
            "length" => {
                let text = value(name, inline, &mut args)?;
                push_length(&mut lengths, &text)?;
            }
            "annot" => {
                let raw = value(name, inline, &mut args)?;
                let raw: i32 = raw.parse().map_err(|_| ConfigError::InvalidNumber {
                    option: "annot",
                    value: raw.clone(),
                })?;
                annot = AnnotMode::from_raw(raw)?;
            }
            "bytes" => byte_limit = parse_byte_limit(&value(name, inline, &mut args)?)?,
            "pipe" => pipe_mode = parse_i64("pipe", &value(name, inline, &mut args)?)?,
            "workers" => {
                let raw = parse_i64("workers", &value(name, inline, &mut args)?)?;
                if raw < 1 {
                    return Err(ConfigError::InvalidWorkers);
                }
                workers = raw as usize;
            }
            "window-bytes" => {
                let raw = parse_i64("window-bytes", &value(name, inline, &mut args)?)?;
                if raw < 0 {
                    return Err(ConfigError::InvalidNumber {
                        option: "window-bytes",
                        value: raw.to_string(),
                    });
                }
                window_bytes = raw as u64;
            }
            _ => unreachable!("option table covers every resolved name"),
        }
    }

    // Resolve the lookup source. Pipeline mode owns the BLAST table; a
    // search file is the plain-ID alternative; both at once conflict.
    let hit_source = match pipe_mode {
        0 => {
            if table.is_some() {
                eprintln!("warning: ignoring BLAST table file, pipeline mode is not set");
            }
            search.map(HitSource::IdList)
        }
        1 => {
            if search.is_some() {
                return Err(ConfigError::ConflictingHitSources);
            }
            match table {
                Some(table) => Some(HitSource::BlastTable(table)),
                None => return Err(ConfigError::MissingTable),
            }
        }
        2 => return Err(ConfigError::PipelineUnimplemented),
        other => return Err(ConfigError::InvalidPipeline(other)),
    };

    let cfg = Config {
        query: query.ok_or(ConfigError::MissingQuery)?,
        output,
        max_records,
        byte_limit,
        lengths,
        annot,
        hit_source,
        workers,
        window_bytes,
        verbosity,
    };
    cfg.validate()?;
    Ok(CliOutcome::Run(cfg))
}

/// Usage text, printed on `--help` and after configuration errors.
pub fn print_usage(program: &str) {
    eprintln!("usage: {program} -q QUERY [OPTIONS]");
    eprintln!();
    eprintln!("Extracts a filtered subset of records from a FASTA file.");
    eprintln!();
    eprintln!("  -q, --query=FILE       input FASTA file (required)");
    eprintln!("  -o, --output=FILE      output FASTA file (default {DEFAULT_OUTPUT})");
    eprintln!("  -c, --count=N          number of records to extract");
    eprintln!("  -l, --length=N         exact sequence length to extract");
    eprintln!("  -l, --length=LO:HI     inclusive length range (LO:, :HI, : open ends)");
    eprintln!("  -a, --annot=N          annotation fields to keep (+N with body,");
    eprintln!("                         -N without, 0 sequence only, default all)");
    eprintln!("  -b, --bytes=N[SUFFIX]  per-worker output byte budget (KB, MB, GB)");
    eprintln!("  -t, --table=FILE       BLAST tabular results file");
    eprintln!("  -p, --pipe=N           pipeline mode (0 = none, 1 = HMMER, 2 = MUSCLE)");
    eprintln!("  -s, --search=FILE      plain ID-per-line lookup file");
    eprintln!("  -w, --workers=N        worker count (default 1)");
    eprintln!("      --window-bytes=N   scan window ceiling (default 256 MiB)");
    eprintln!("  -v, --verbose          progress output");
    eprintln!("  -z, --trace            debug output");
    eprintln!("  -h, --help             this message");
}

fn long_name(name: &str) -> Result<&'static str, ConfigError> {
    Ok(match name {
        "help" => "help",
        "verbose" => "verbose",
        "trace" => "trace",
        "query" => "query",
        "output" => "output",
        "table" => "table",
        "search" => "search",
        "count" => "count",
        "length" => "length",
        "annot" => "annot",
        "bytes" => "bytes",
        "pipe" => "pipe",
        "workers" => "workers",
        "window-bytes" => "window-bytes",
        other => return Err(ConfigError::UnknownOption(format!("--{other}"))),
    })
}

fn short_name(flag: &str) -> Result<&'static str, ConfigError> {
    Ok(match flag {
        "-h" => "help",
        "-v" => "verbose",
        "-z" => "trace",
        "-q" => "query",
        "-o" => "output",
        "-t" => "table",
        "-s" => "search",
        "-c" => "count",
        "-l" => "length",
        "-a" => "annot",
        "-b" => "bytes",
        "-p" => "pipe",
        "-w" => "workers",
        other => return Err(ConfigError::UnknownOption(other.to_string())),
    })
}

/// Takes an option's value: inline (`-x=v`) or the next argument.
fn value<I>(
    option: &'static str,
    inline: Option<String>,
    args: &mut I,
) -> Result<String, ConfigError>
where
    I: Iterator<Item = OsString>,
{
    if let Some(v) = inline {
        return Ok(v);
    }
    match args.next() {
        Some(next) => {
            let text = next.to_string_lossy().into_owned();
            // Tolerate `-x =v` and `-x =` joiners.
            Ok(text.strip_prefix('=').unwrap_or(&text).to_string())
        }
        None => Err(ConfigError::MissingValue(option)),
    }
}

fn parse_i64(option: &'static str, text: &str) -> Result<i64, ConfigError> {
    text.parse().map_err(|_| ConfigError::InvalidNumber {
        option,
        value: text.to_string(),
    })
}

fn parse_u64(option: &'static str, text: &str) -> Result<u64, ConfigError> {
    text.parse().map_err(|_| ConfigError::InvalidNumber {
        option,
        value: text.to_string(),
    })
}

/// Adds `-l` values: a bare number is an exact length, `LO:HI` an
/// inclusive range with either end optional.
fn push_length(lengths: &mut LengthFilter, text: &str) -> Result<(), ConfigError> {
    let outcome = match text.split_once(':') {
        None => {
            let len = parse_u64("length", text)?;
            lengths.push_exact(len)
        }
        Some((lo, hi)) => {
            if hi.contains(':') {
                return Err(ConfigError::InvalidNumber {
                    option: "length",
                    value: text.to_string(),
                });
            }
            let lo = if lo.is_empty() {
                0
            } else {
                parse_u64("length", lo)?
            };
            let hi = if hi.is_empty() {
                u64::MAX
            } else {
                parse_u64("length", hi)?
            };
            if hi <= lo {
                return Err(ConfigError::InvalidRange { lo, hi });
            }
            lengths.push_range(lo, hi)
        }
    };
    if outcome == FilterPush::Full {
        eprintln!("warning: too many length options, ignoring '{text}'");
    }
    Ok(())
}

/// Parses a byte limit with optional binary suffix (KB, MB, GB).
fn parse_byte_limit(text: &str) -> Result<u64, ConfigError> {
    let bytes = text.as_bytes();
    let has_suffix = bytes.len() >= 2
        && bytes[bytes.len() - 1].is_ascii_alphabetic()
        && bytes[bytes.len() - 2].is_ascii_alphabetic();

    let (digits, multiplier) = if has_suffix {
        let (digits, suffix) = text.split_at(text.len() - 2);
        let multiplier = match suffix.to_ascii_uppercase().as_str() {
            "KB" => 1u64 << 10,
            "MB" => 1 << 20,
            "GB" => 1 << 30,
            _ => return Err(ConfigError::InvalidSuffix(suffix.to_string())),
        };
        (digits, multiplier)
    } else {
        (text, 1)
    };

    let value = parse_i64("bytes", digits)?;
    if value < 1 {
        return Err(ConfigError::InvalidByteLimit(value));
    }
    Ok(value as u64 * multiplier)
}
