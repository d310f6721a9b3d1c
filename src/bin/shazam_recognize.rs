//! Recognize a local audio file with Shazam and print a one-line JSON summary.
//!
//! Usage:
//!     shazam_recognize [--language en-US] [--country GB] [--segment 12] [--timeout 30] <audio_file>
//!
//! Stdout carries exactly one JSON object; diagnostics go to stderr.

use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process;

use clap::error::ErrorKind;
use clap::Parser;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use shazam_recognize::{recognize_audio, Config, RecognitionOutput, Shazam};

const PROGRAM: &str = "shazam_recognize";

/// Command-line arguments for shazam_recognize
#[derive(Parser, Debug)]
#[command(name = "shazam_recognize")]
#[command(about = "Identify a song in a local audio file using Shazam")]
#[command(version)]
struct Args {
    /// Audio file to recognize (WAV, MP3, FLAC, OGG)
    #[arg(allow_hyphen_values = true)]
    audio_file: Option<PathBuf>,

    /// Anything after the audio file is ignored
    #[arg(hide = true, allow_hyphen_values = true)]
    _ignored: Vec<OsString>,

    /// Response language
    #[arg(long, env = "SHAZAM_LANGUAGE")]
    language: Option<String>,

    /// Shazam endpoint country code
    #[arg(long, env = "SHAZAM_COUNTRY")]
    country: Option<String>,

    /// Seconds of audio, taken from the middle of the file, to fingerprint
    #[arg(long)]
    segment: Option<u32>,

    /// Request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Log debug output to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Show built-in default configuration values and exit
    #[arg(long)]
    show_defaults: bool,

    /// Show saved default configuration from file and exit
    #[arg(long)]
    show_saved_defaults: bool,

    /// Save current command-line options as defaults
    #[arg(long)]
    save_defaults: bool,
}

impl Args {
    fn to_config(&self) -> Config {
        Config {
            language: self.language.clone(),
            endpoint_country: self.country.clone(),
            segment_seconds: self.segment,
            timeout_secs: self.timeout,
        }
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "shazam_recognize=debug"
    } else {
        "shazam_recognize=warn"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(std::io::stderr().is_terminal()),
        )
        .init();
}

fn usage_error() -> ! {
    println!("{}", RecognitionOutput::usage(PROGRAM).to_json_line());
    process::exit(1);
}

/// Outcome of parsing the command line.
#[derive(Debug)]
enum CommandLine {
    Run(Args),
    /// `--help` / `--version`, printed by clap itself
    Info(clap::Error),
    /// Missing or malformed arguments
    Usage,
}

fn parse_command_line<I, T>(argv: I) -> CommandLine
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    match Args::try_parse_from(argv) {
        Ok(args) => CommandLine::Run(args),
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            CommandLine::Info(e)
        }
        Err(_) => CommandLine::Usage,
    }
}

fn main() {
    let args = match parse_command_line(std::env::args_os()) {
        CommandLine::Run(args) => args,
        CommandLine::Info(e) => e.exit(),
        CommandLine::Usage => usage_error(),
    };

    init_logging(args.verbose);

    // Built-in defaults, then saved defaults, then the command line
    let saved_config = Config::load().unwrap_or_else(|e| {
        warn!("Ignoring saved defaults: {}", e);
        Config::new()
    });
    let cmdline_config = args.to_config();

    let mut effective_config = Config::builtin();
    effective_config.merge(&saved_config);
    effective_config.merge(&cmdline_config);

    if args.show_defaults {
        Config::builtin().print("Built-in defaults");
        return;
    }

    if args.show_saved_defaults {
        match Config::get_config_path() {
            Ok(path) if path.exists() => {
                println!("Saved defaults from {:?}:", path);
                saved_config.print("Configuration");
            }
            Ok(path) => {
                println!("No saved defaults file found at {:?}", path);
                println!("Use --save-defaults to create one.");
            }
            Err(e) => eprintln!("Cannot locate defaults file: {}", e),
        }
        return;
    }

    if args.save_defaults {
        let mut config_to_save = saved_config.clone();
        config_to_save.merge(&cmdline_config);
        match config_to_save.save() {
            Ok(path) => eprintln!("Defaults saved to {:?}", path),
            Err(e) => eprintln!("Error saving defaults: {}", e),
        }
        if args.audio_file.is_none() {
            return;
        }
    }

    let audio_file = match &args.audio_file {
        Some(path) => path,
        None => usage_error(),
    };

    let shazam = Shazam::from_config(&effective_config);
    let output = recognize_audio(audio_file, &shazam);
    println!("{}", output.to_json_line());
}
