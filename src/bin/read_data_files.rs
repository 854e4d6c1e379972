//! Print or benchmark the series of one on-disk fileset.

use std::ffi::OsString;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process;

use clap::error::ErrorKind;
use clap::Parser;
use log::{error, info};

use m3tsz::fileset::{FileSetType, FilesetId, FilesetReader};
use m3tsz::inspect::{scan, BenchmarkMode, ScanConfig};
use m3tsz::{Options, ReaderIteratorPool};

#[derive(Parser, Debug)]
#[command(name = "read_data_files")]
#[command(about = "Read the series of a fileset and print or benchmark their datapoints")]
struct Args {
    /// Path prefix [e.g. /var/lib/m3db]
    #[arg(short = 'p', long)]
    path_prefix: PathBuf,

    /// Namespace [e.g. metrics]
    #[arg(short, long, default_value = "default")]
    namespace: String,

    /// Shard
    #[arg(short, long, default_value = "0")]
    shard: u32,

    /// Block start time [in nsec]
    #[arg(short, long)]
    block_start: i64,

    /// Volume number
    #[arg(short, long, default_value = "0")]
    volume: u32,

    /// flush|snapshot
    #[arg(short = 't', long, default_value = "flush")]
    fileset_type: String,

    /// ID contains filter (optional)
    #[arg(short = 'f', long)]
    id_filter: Option<String>,

    /// Benchmark mode (optional), [series|datapoints]
    #[arg(short = 'B', long, default_value = "")]
    benchmark: String,

    /// Encoding options as JSON; defaults to the options in the info file
    #[arg(long)]
    encoding_config: Option<String>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = match parse_args(std::env::args_os()) {
        Ok(args) => args,
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    };
    if let Err(e) = run(args) {
        error!("{e}");
        process::exit(1);
    }
}

/// Parses the command line. Help and version requests print and exit here;
/// every other parse failure is returned.
fn parse_args<I, T>(argv: I) -> Result<Args, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    match Args::try_parse_from(argv) {
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        res => res,
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    if args.namespace.is_empty() {
        return Err("namespace must not be empty".into());
    }
    if args.block_start <= 0 {
        return Err(format!("block start must be positive, got {}", args.block_start).into());
    }
    let fileset_type: FileSetType = args.fileset_type.parse()?;
    let benchmark: BenchmarkMode = args.benchmark.parse()?;

    let id = FilesetId {
        namespace: args.namespace,
        shard: args.shard,
        block_start: args.block_start,
        volume: args.volume,
        fileset_type,
    };
    let reader = FilesetReader::open(&args.path_prefix, &id)
        .map_err(|e| format!("unable to open reader: {e}"))?;

    let opts: Options = match args.encoding_config.as_deref() {
        Some(json) => serde_json::from_str(json)?,
        None => reader.info().encoding,
    };
    info!(
        "reading {} entries from {} fileset {}/{}",
        reader.entries(),
        id.fileset_type,
        id.namespace,
        id.shard
    );

    let pool = ReaderIteratorPool::new(opts, 1);
    let cfg = ScanConfig {
        id_filter: args.id_filter,
        benchmark,
    };

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let stats = scan(reader, &pool, &cfg, &mut out)?;
    stats.write_report(benchmark, &mut out)?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_required_args_is_an_error() {
        let err = parse_args(["read_data_files", "-p", "/var/lib/m3db"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);

        let err = parse_args(["read_data_files", "-b", "1600000000000000000"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_parse_defaults() {
        let args = parse_args(["read_data_files", "-p", "/data", "-b", "1600000000000000000"]).unwrap();
        assert_eq!(args.path_prefix, PathBuf::from("/data"));
        assert_eq!(args.namespace, "default");
        assert_eq!(args.shard, 0);
        assert_eq!(args.block_start, 1_600_000_000_000_000_000);
        assert_eq!(args.fileset_type, "flush");
        assert_eq!(args.benchmark, "");
        assert!(args.id_filter.is_none());
    }

    #[test]
    fn test_bad_value_is_an_error() {
        let err = parse_args(["read_data_files", "-p", "/data", "-b", "soon"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
    }
}
