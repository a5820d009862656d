//! Dataset persistence: hive-style partitioned CSV files under a data root.
//!
//! A partitioned dataset is a directory of `<prefix>=<YYYY-MM-DD>.csv`
//! files, optionally gzip-compressed. Partition writes go to a `.tmp`
//! sibling first and are renamed into place, so an interrupted run never
//! leaves a corrupt partition ("overwrite-or-ignore" semantics).

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

/// Partition key prefix for day-partitioned datasets.
pub const DAY_KEY: &str = "date";
/// Partition key prefix for month-partitioned datasets.
pub const MONTH_KEY: &str = "month";

/// File name of one partition, e.g. `date=2024-03-01.csv`.
pub fn partition_file_name(prefix: &str, key: NaiveDate, gzip: bool) -> String {
    let ext = if gzip { "csv.gz" } else { "csv" };
    format!("{}={}.{}", prefix, key.format("%Y-%m-%d"), ext)
}

/// Distinct partition keys present in a dataset directory.
///
/// A dataset that does not exist yet is an empty set, not an error.
/// Files that do not match the partition naming scheme (stray `.tmp`
/// leftovers included) are ignored.
pub fn list_partitions(dir: &Path, prefix: &str) -> Result<BTreeSet<NaiveDate>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
        Err(e) => return Err(e).with_context(|| format!("listing dataset {}", dir.display())),
    };

    let mut keys = BTreeSet::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(key) = parse_partition_file_name(name, prefix) {
            keys.insert(key);
        }
    }
    Ok(keys)
}

fn parse_partition_file_name(name: &str, prefix: &str) -> Option<NaiveDate> {
    let rest = name.strip_prefix(prefix)?.strip_prefix('=')?;
    let date = rest
        .strip_suffix(".csv.gz")
        .or_else(|| rest.strip_suffix(".csv"))?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

/// Reads all rows of one partition, trying the plain and gzipped variants.
pub fn read_partition<T: DeserializeOwned>(
    dir: &Path,
    prefix: &str,
    key: NaiveDate,
) -> Result<Vec<T>> {
    for gzip in [false, true] {
        let path = dir.join(partition_file_name(prefix, key, gzip));
        if path.exists() {
            return read_csv(&path);
        }
    }
    bail!(
        "partition {}={} not found in {}",
        prefix,
        key,
        dir.display()
    )
}

/// Writes one partition atomically, replacing any previous content for the
/// same key (including a variant with the other compression extension).
pub fn write_partition<T: Serialize>(
    dir: &Path,
    prefix: &str,
    key: NaiveDate,
    rows: &[T],
    gzip: bool,
) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("creating dataset directory {}", dir.display()))?;

    let path = dir.join(partition_file_name(prefix, key, gzip));
    let mut body = to_csv_bytes(rows)?;
    if gzip {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&body)?;
        body = encoder.finish()?;
    }
    write_atomic(&path, &body)?;

    // A stale variant with the other extension would show up as a duplicate
    // partition on the next read.
    let other = dir.join(partition_file_name(prefix, key, !gzip));
    if other.exists() {
        fs::remove_file(&other)
            .with_context(|| format!("removing stale partition {}", other.display()))?;
    }

    debug!(path = %path.display(), rows = rows.len(), "Partition written");
    Ok(())
}

/// Reads a whole CSV file, transparently decompressing `.gz` paths.
pub fn read_csv<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file =
        File::open(path).with_context(|| format!("opening dataset file {}", path.display()))?;

    let mut raw = Vec::new();
    if path.extension().and_then(|e| e.to_str()) == Some("gz") {
        GzDecoder::new(file).read_to_end(&mut raw)?;
    } else {
        let mut file = file;
        file.read_to_end(&mut raw)?;
    }

    let mut reader = csv::Reader::from_reader(raw.as_slice());
    let mut rows = Vec::new();
    for result in reader.deserialize() {
        let row: T =
            result.with_context(|| format!("decoding row in {}", path.display()))?;
        rows.push(row);
    }
    Ok(rows)
}

/// Writes an unpartitioned CSV file atomically.
pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    write_atomic(path, &to_csv_bytes(rows)?)
}

/// Writes a JSON document atomically.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let body = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &body)
}

fn to_csv_bytes<T: Serialize>(rows: &[T]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("finishing csv buffer: {}", e.error()))
}

fn write_atomic(path: &Path, body: &[u8]) -> Result<()> {
    let tmp = tmp_sibling(path);
    fs::write(&tmp, body).with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("moving {} into place", tmp.display()))?;
    Ok(())
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RouteName;
    use std::env;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = env::temp_dir().join(format!("transit_leg_stats_store_{}", name));
        let _ = fs::remove_dir_all(&dir); // clean up any prior run
        dir
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample_rows(date: NaiveDate) -> Vec<RouteName> {
        vec![RouteName {
            operating_date: date,
            data_source: "SRC".into(),
            line_ref: "L1".into(),
            direction_ref: "0".into(),
            origin: "A".into(),
            destination: "B".into(),
        }]
    }

    #[test]
    fn test_missing_dataset_is_empty_set() {
        let dir = temp_dir("missing");
        assert!(list_partitions(&dir, DAY_KEY).unwrap().is_empty());
    }

    #[test]
    fn test_partition_round_trip() {
        let dir = temp_dir("round_trip");
        let key = day(2024, 3, 5);
        let rows = sample_rows(key);

        write_partition(&dir, DAY_KEY, key, &rows, false).unwrap();
        let back: Vec<RouteName> = read_partition(&dir, DAY_KEY, key).unwrap();
        assert_eq!(back, rows);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_gzip_partition_round_trip() {
        let dir = temp_dir("gzip");
        let key = day(2024, 3, 5);
        let rows = sample_rows(key);

        write_partition(&dir, DAY_KEY, key, &rows, true).unwrap();
        assert!(dir.join("date=2024-03-05.csv.gz").exists());
        let back: Vec<RouteName> = read_partition(&dir, DAY_KEY, key).unwrap();
        assert_eq!(back, rows);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_rewrite_replaces_other_compression_variant() {
        let dir = temp_dir("variant");
        let key = day(2024, 3, 5);
        let rows = sample_rows(key);

        write_partition(&dir, DAY_KEY, key, &rows, false).unwrap();
        write_partition(&dir, DAY_KEY, key, &rows, true).unwrap();
        assert!(!dir.join("date=2024-03-05.csv").exists());
        assert_eq!(list_partitions(&dir, DAY_KEY).unwrap().len(), 1);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_list_partitions_ignores_foreign_files() {
        let dir = temp_dir("foreign");
        let key = day(2024, 1, 1);
        write_partition(&dir, DAY_KEY, key, &sample_rows(key), false).unwrap();
        fs::write(dir.join("date=2024-01-02.csv.tmp"), b"partial").unwrap();
        fs::write(dir.join("notes.txt"), b"hello").unwrap();

        let keys = list_partitions(&dir, DAY_KEY).unwrap();
        assert_eq!(keys, BTreeSet::from([key]));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_rewrite_is_idempotent() {
        let dir = temp_dir("idempotent");
        let key = day(2024, 2, 2);
        let rows = sample_rows(key);

        write_partition(&dir, DAY_KEY, key, &rows, false).unwrap();
        let first = fs::read(dir.join("date=2024-02-02.csv")).unwrap();
        write_partition(&dir, DAY_KEY, key, &rows, false).unwrap();
        let second = fs::read(dir.join("date=2024-02-02.csv")).unwrap();
        assert_eq!(first, second);

        fs::remove_dir_all(&dir).unwrap();
    }
}
