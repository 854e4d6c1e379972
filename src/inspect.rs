//! The scan loop behind `read_data_files`: decode every series of a fileset
//! and either print its datapoints or time the read.

use std::io::{self, Write};
use std::str::FromStr;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::debug;
use thiserror::Error;

use crate::error::DecodeError;
use crate::fileset::{FilesetError, FilesetReader};
use crate::pool::IteratorPool;

#[derive(Debug, Error)]
pub enum InspectError {
    #[error(transparent)]
    Fileset(#[from] FilesetError),

    #[error("unable to iterate series {id}: {source}")]
    Decode {
        id: String,
        #[source]
        source: DecodeError,
    },

    #[error("actual time series count ({actual}) did not match info file data ({expected})")]
    SeriesCountMismatch { actual: usize, expected: usize },

    #[error("unknown benchmark type: {0}")]
    UnknownBenchmark(String),

    #[error("write failed: {0}")]
    Output(#[from] io::Error),
}

/// What the scan does with each series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BenchmarkMode {
    /// Print every datapoint; no timing.
    #[default]
    None,
    /// Read series without decoding them.
    Series,
    /// Read and decode series, printing nothing.
    Datapoints,
}

impl FromStr for BenchmarkMode {
    type Err = InspectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" => Ok(Self::None),
            "series" => Ok(Self::Series),
            "datapoints" => Ok(Self::Datapoints),
            other => Err(InspectError::UnknownBenchmark(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScanConfig {
    /// Only series whose id contains this substring are processed.
    pub id_filter: Option<String>,
    pub benchmark: BenchmarkMode,
}

impl ScanConfig {
    fn matches(&self, id: &str) -> bool {
        match self.id_filter.as_deref() {
            Some(filter) if !filter.is_empty() => id.contains(filter),
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanStats {
    /// Entries read from the data file, filtered or not.
    pub entries_read: usize,
    /// Entries that passed the id filter.
    pub series: usize,
    pub datapoints: u64,
    pub annotation_bytes: u64,
    pub elapsed: Duration,
}

impl ScanStats {
    /// Writes the benchmark summary for `mode`. Writes nothing in
    /// [`BenchmarkMode::None`].
    pub fn write_report<W: Write>(&self, mode: BenchmarkMode, out: &mut W) -> io::Result<()> {
        if mode == BenchmarkMode::None {
            return Ok(());
        }

        let secs = self.elapsed.as_secs_f64();
        writeln!(out, "Running time: {:?}", self.elapsed)?;
        writeln!(out, "\n{} series read", self.series)?;
        if secs > 0.0 {
            writeln!(out, "({:.2} series/second)", self.series as f64 / secs)?;
        }

        if mode == BenchmarkMode::Datapoints {
            writeln!(out, "\n{} datapoints decoded", self.datapoints)?;
            if secs > 0.0 {
                writeln!(out, "({:.2} datapoints/second)", self.datapoints as f64 / secs)?;
            }
            writeln!(out, "\nTotal annotation size: {} bytes", self.annotation_bytes)?;
        }
        Ok(())
    }
}

/// Reads every entry of `reader`, decoding with iterators from `pool`, and
/// closes the reader.
///
/// Fails on the first read or decode error, and if the number of entries
/// read differs from the count in the info file.
pub fn scan<W: Write>(
    mut reader: FilesetReader,
    pool: &dyn IteratorPool,
    cfg: &ScanConfig,
    out: &mut W,
) -> Result<ScanStats, InspectError> {
    let started = Instant::now();
    let mut stats = ScanStats::default();

    while let Some(entry) = reader.streaming_read()? {
        stats.entries_read += 1;
        if !cfg.matches(&entry.id) {
            continue;
        }
        stats.series += 1;

        if cfg.benchmark == BenchmarkMode::Series {
            continue;
        }

        let mut iter = pool.get();
        iter.reset(entry.data);
        while iter.next() {
            let (dp, _, annotation) = iter.current();
            if cfg.benchmark == BenchmarkMode::None {
                write!(out, "{{id: {}, dp: {}", entry.id, dp)?;
                if !annotation.is_empty() {
                    write!(out, ", annotation: {}", STANDARD.encode(annotation))?;
                }
                writeln!(out, "}}")?;
            }
            stats.annotation_bytes += annotation.len() as u64;
            stats.datapoints += 1;
        }
        let err = iter.err().cloned();
        pool.put(iter);
        if let Some(source) = err {
            return Err(InspectError::Decode {
                id: entry.id,
                source,
            });
        }
    }

    if stats.entries_read != reader.entries() {
        return Err(InspectError::SeriesCountMismatch {
            actual: stats.entries_read,
            expected: reader.entries(),
        });
    }
    reader.close()?;

    stats.elapsed = started.elapsed();
    debug!(
        "scanned {} series ({} matched), {} datapoints in {:?}",
        stats.entries_read, stats.series, stats.datapoints, stats.elapsed
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::DataPoint;
    use crate::encoder::Encoder;
    use crate::fileset::{FileSetType, FilesetId, FilesetInfo, FilesetWriter};
    use crate::options::Options;
    use crate::pool::ReaderIteratorPool;
    use crate::scheme::TimeUnit;

    const START: i64 = 1_600_000_000 * 1_000_000_000;
    const SEC: i64 = 1_000_000_000;

    fn fileset_id() -> FilesetId {
        FilesetId {
            namespace: "default".to_string(),
            shard: 0,
            block_start: START,
            volume: 0,
            fileset_type: FileSetType::Flush,
        }
    }

    fn series(values: &[f64], annotation: Option<&[u8]>) -> Vec<u8> {
        let mut enc = Encoder::new(START, Options::default());
        for (i, v) in values.iter().enumerate() {
            let dp = DataPoint::new(START + i as i64 * 10 * SEC, *v);
            enc.encode(dp, TimeUnit::Second, annotation).unwrap();
        }
        enc.finish().to_vec()
    }

    fn write_fixture(dir: &std::path::Path) {
        let mut writer = FilesetWriter::new(dir, fileset_id(), Options::default());
        writer.write("cpu.user", &series(&[1.0, 2.5], None));
        writer.write("mem.free", &series(&[7.0], Some(b"hi".as_slice())));
        writer.close().unwrap();
    }

    fn run(dir: &std::path::Path, cfg: &ScanConfig) -> (Result<ScanStats, InspectError>, String) {
        let reader = FilesetReader::open(dir, &fileset_id()).unwrap();
        let pool = ReaderIteratorPool::new(reader.info().encoding, 4);
        let mut out = Vec::new();
        let res = scan(reader, &pool, cfg, &mut out);
        (res, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_prints_datapoints() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());

        let (res, out) = run(dir.path(), &ScanConfig::default());
        let stats = res.unwrap();
        assert_eq!(stats.series, 2);
        assert_eq!(stats.datapoints, 3);
        assert_eq!(stats.annotation_bytes, 2);
        assert_eq!(
            out,
            format!(
                "{{id: cpu.user, dp: {{timestamp: {}, value: 1}}}}\n\
                 {{id: cpu.user, dp: {{timestamp: {}, value: 2.5}}}}\n\
                 {{id: mem.free, dp: {{timestamp: {}, value: 7}}, annotation: aGk=}}\n",
                START,
                START + 10 * SEC,
                START
            )
        );
    }

    #[test]
    fn test_id_filter_and_series_benchmark() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());

        let cfg = ScanConfig {
            id_filter: Some("mem".to_string()),
            benchmark: BenchmarkMode::Series,
        };
        let (res, out) = run(dir.path(), &cfg);
        let stats = res.unwrap();
        assert_eq!(stats.entries_read, 2);
        assert_eq!(stats.series, 1);
        assert_eq!(stats.datapoints, 0);
        assert!(out.is_empty());
    }

    #[test]
    fn test_datapoints_benchmark_report() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());

        let cfg = ScanConfig {
            benchmark: BenchmarkMode::Datapoints,
            ..Default::default()
        };
        let (res, out) = run(dir.path(), &cfg);
        let stats = res.unwrap();
        assert!(out.is_empty());

        let mut report = Vec::new();
        stats.write_report(BenchmarkMode::Datapoints, &mut report).unwrap();
        let report = String::from_utf8(report).unwrap();
        assert!(report.contains("2 series read"));
        assert!(report.contains("3 datapoints decoded"));
        assert!(report.contains("Total annotation size: 2 bytes"));
    }

    #[test]
    fn test_series_count_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());

        let info_path = fileset_id().info_path(dir.path());
        let mut info: FilesetInfo =
            serde_json::from_slice(&std::fs::read(&info_path).unwrap()).unwrap();
        info.entries = 5;
        std::fs::write(&info_path, serde_json::to_vec(&info).unwrap()).unwrap();

        let (res, _) = run(dir.path(), &ScanConfig::default());
        assert!(matches!(
            res,
            Err(InspectError::SeriesCountMismatch {
                actual: 2,
                expected: 5
            })
        ));
    }

    #[test]
    fn test_decode_error_names_series() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = FilesetWriter::new(dir.path(), fileset_id(), Options::default());
        let mut broken = series(&[1.5, 2.75], None);
        broken.truncate(9);
        writer.write("broken", &broken);
        writer.close().unwrap();

        let (res, _) = run(dir.path(), &ScanConfig::default());
        match res {
            Err(InspectError::Decode { id, source }) => {
                assert_eq!(id, "broken");
                assert!(matches!(source, DecodeError::StreamExhausted { .. }));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_benchmark_mode_from_str() {
        assert_eq!("".parse::<BenchmarkMode>().unwrap(), BenchmarkMode::None);
        assert_eq!("series".parse::<BenchmarkMode>().unwrap(), BenchmarkMode::Series);
        assert!(matches!(
            "everything".parse::<BenchmarkMode>(),
            Err(InspectError::UnknownBenchmark(_))
        ));
    }
}
