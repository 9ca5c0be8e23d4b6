use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use pumplog_core::*;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// File name used under the configured output directory
const SAVED_RECORDS_FILE: &str = "records.jsonl";

#[derive(Parser)]
#[command(name = "pumplog")]
#[command(about = "Medtronic 600-series pump history decoder", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Read configuration from this file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging on stderr
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List decoded events without correlating them
    Decode {
        /// Page files, one hex-encoded page per line
        #[arg(required = true)]
        pages: Vec<PathBuf>,
    },

    /// Decode, correlate and write domain records as JSON lines
    Parse {
        /// Page files, one hex-encoded page per line
        #[arg(required = true)]
        pages: Vec<PathBuf>,

        /// IANA zone the pump clock was set to
        #[arg(long)]
        timezone: Option<String>,

        /// When the history was read from the pump (RFC 3339)
        #[arg(long)]
        now: Option<DateTime<Utc>>,

        /// Skip records that fail correlation checks instead of failing
        #[arg(long)]
        lenient: bool,

        /// Current pump settings (JSON) to rebuild settings snapshots from
        #[arg(long)]
        settings: Option<PathBuf>,

        /// Append records to this file instead of stdout
        #[arg(long, conflicts_with = "save")]
        output: Option<PathBuf>,

        /// Append records to the configured output directory
        #[arg(long)]
        save: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        pumplog_core::logging::init_with_level("debug");
    } else {
        pumplog_core::logging::init();
    }

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Decode { pages } => cmd_decode(&pages),
        Commands::Parse {
            pages,
            timezone,
            now,
            lenient,
            settings,
            output,
            save,
        } => {
            let mut parse_config = config.parse_config();
            if let Some(timezone) = timezone {
                parse_config = parse_config.with_timezone(timezone);
            }
            if let Some(now) = now {
                parse_config = parse_config.with_now(now);
            }
            if lenient {
                parse_config = parse_config.lenient();
            }

            let output = if save {
                Some(config.output.output_dir.join(SAVED_RECORDS_FILE))
            } else {
                output
            };

            cmd_parse(&pages, parse_config, settings.as_deref(), output)
        }
    }
}

/// Decode page files in order, one page per non-empty line
fn read_history(paths: &[PathBuf]) -> Result<HistoryLog> {
    let mut log = HistoryLog::new();
    for path in paths {
        let contents = std::fs::read_to_string(path)?;
        let mut pages = 0;
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            log.push_page(&hex::decode(line)?)?;
            pages += 1;
        }
        tracing::debug!("Read {} pages from {:?}", pages, path);
    }
    Ok(log)
}

fn cmd_decode(paths: &[PathBuf]) -> Result<()> {
    let log = read_history(paths)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for (index, event) in log.events().iter().enumerate() {
        writeln!(
            out,
            "{:>5}  0x{:02X}  {:<40} {}",
            index,
            event.code(),
            event.name(),
            event.timestamp.device_time()?
        )?;
    }
    out.flush()?;

    eprintln!("Decoded {} events", log.len());
    Ok(())
}

fn cmd_parse(
    paths: &[PathBuf],
    parse_config: ParseConfig,
    settings: Option<&Path>,
    output: Option<PathBuf>,
) -> Result<()> {
    let mut parser = HistoryParser::new(parse_config);
    if let Some(path) = settings {
        parser = parser.with_settings(CurrentSettings::load_from(path)?);
    }

    let log = read_history(paths)?;

    let report = match output {
        Some(path) => {
            // Collected first so a failed parse leaves the file untouched
            let mut collector = RecordCollector::new();
            let report = parser.parse_log(&log, &mut collector)?;
            let mut sink = JsonlSink::new(&path);
            sink.append_all(&collector.into_records())?;
            eprintln!("Appended {} records to {}", sink.written(), path.display());
            report
        }
        None => {
            let stdout = io::stdout();
            let mut writer = LineWriter { out: stdout.lock() };
            let report = parser.parse_log(&log, &mut writer)?;
            writer.out.flush()?;
            report
        }
    };

    eprintln!(
        "Parsed {} events into {} records ({} skipped, {} clock changes)",
        report.events, report.records, report.skipped, report.time_changes
    );
    Ok(())
}

/// One JSON object per line on a writer
struct LineWriter<W: Write> {
    out: W,
}

impl<W: Write> RecordFactory for LineWriter<W> {
    fn accept(&mut self, record: DomainRecord) -> Result<()> {
        serde_json::to_writer(&mut self.out, &record)?;
        self.out.write_all(b"\n")?;
        Ok(())
    }
}
