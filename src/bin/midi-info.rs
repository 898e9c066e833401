//! Prints the analysis report of a Standard MIDI File

use std::path::PathBuf;

use clap::Parser;
use smf_scan::{
    parser::{DEFAULT_BUFFER_SIZE, DEFAULT_MAX_WORKERS},
    MidiParser, ParseError, ParseOptions, ParseResult,
};
use thiserror::Error;

fn main() {
    let result = main_result();
    std::process::exit(match result {
        Ok(()) => 0,
        Err(err) => {
            log::error!("{err}");
            1
        }
    });
}

/// Parses the arguments, runs the parse and prints the report
fn main_result() -> Result<(), AppError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("smf_scan=info"))
        .init();

    let args = CliArgs::parse();
    if !args.file.exists() {
        return Err(AppError::NotFound(args.file));
    }

    let options = ParseOptions::default()
        .with_analysis_only(!args.full)
        .with_max_workers(args.workers)
        .with_buffer_size(args.buffer_size);

    let result = MidiParser::new(options).parse_file(&args.file)?;
    print_report(&result, args.full);

    Ok(())
}

/// Writes the report to stdout
fn print_report(result: &ParseResult, full: bool) {
    println!("Note Count: {}", result.total_note_count);
    println!("Event Count: {}", result.total_event_count);
    println!("PPQ: {}", result.ppq);
    println!("Format: {}", result.format);
    println!("Track Count (header): {}", result.declared_track_count);
    println!("True Track Count: {}", result.true_track_count);
    println!("Length: {} ticks", result.length_ticks);
    println!("Status: {}", result.status);

    if full {
        println!();
        for track in &result.tracks {
            println!(
                "Track {:>3}: {} notes, {} events, {} ticks, {} paired notes",
                track.index,
                track.note_count,
                track.event_count,
                track.length_ticks,
                track.notes.len()
            );
        }
    }

    for failure in &result.failed_tracks {
        println!("Track {:>3}: failed, {}", failure.index, failure.reason);
    }
}

/// Command line arguments
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct CliArgs {
    /// Path to the MIDI file.
    file: PathBuf,
    /// Also record events and pair notes, printing per-track detail.
    #[arg(long, default_value_t = false)]
    full: bool,
    /// Maximum number of tracks decoded at once.
    #[arg(long, default_value_t = DEFAULT_MAX_WORKERS)]
    workers: usize,
    /// Size in bytes of each read-ahead buffer.
    #[arg(long, default_value_t = DEFAULT_BUFFER_SIZE)]
    buffer_size: usize,
}

/// Failures reported by the binary
#[derive(Debug, Error)]
enum AppError {
    /// The input path does not exist
    #[error("MIDI file not found {0:?}")]
    NotFound(PathBuf),
    /// Parsing failed as a whole
    #[error("parsing error: {0}")]
    Parse(#[from] ParseError),
}
