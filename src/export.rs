//! CSV export of assembled station history.
//!
//! Three files per station, matching the layout downstream notebooks read:
//!
//!   {STATION}_stage_flow_ALL.csv   datetime,stage_ft,flow_cfs
//!   {STATION}_stage_ALL.csv        datetime,stage_ft
//!   {STATION}_flow_ALL.csv         datetime,flow_cfs
//!
//! Each file is written to a temporary sibling and renamed into place; the
//! three files of one export are renamed only after all of them are written.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::info;

use crate::model::{CombinedRecord, Series};
use crate::session::StationHistory;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
}

/// Output locations for one station.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPaths {
    pub combined: PathBuf,
    pub stage: PathBuf,
    pub flow: PathBuf,
}

impl ExportPaths {
    pub fn for_station(dir: impl AsRef<Path>, station_id: &str) -> Self {
        let dir = dir.as_ref();
        let station = station_id.to_uppercase();
        Self {
            combined: dir.join(format!("{station}_stage_flow_ALL.csv")),
            stage: dir.join(format!("{station}_stage_ALL.csv")),
            flow: dir.join(format!("{station}_flow_ALL.csv")),
        }
    }
}

// ---------------------------------------------------------------------------
// Writers
// ---------------------------------------------------------------------------

type CsvBody<'a> = Box<dyn FnOnce(&mut dyn Write) -> io::Result<()> + 'a>;

pub fn write_stage_csv(path: impl AsRef<Path>, stage: &Series) -> Result<(), ExportError> {
    write_atomically(path.as_ref(), series_body("stage_ft", stage))
}

pub fn write_flow_csv(path: impl AsRef<Path>, flow: &Series) -> Result<(), ExportError> {
    write_atomically(path.as_ref(), series_body("flow_cfs", flow))
}

/// Absent values are written as empty fields.
pub fn write_combined_csv(
    path: impl AsRef<Path>,
    records: &[CombinedRecord],
) -> Result<(), ExportError> {
    write_atomically(path.as_ref(), combined_body(records))
}

/// Writes all three files for `history` into `dir`, creating it if needed.
///
/// Every file is fully written to a temporary sibling before any of them is
/// renamed into place, so a failed write leaves earlier exports untouched.
pub fn write_station_history(
    dir: impl AsRef<Path>,
    history: &StationHistory,
) -> Result<ExportPaths, ExportError> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir).map_err(|source| ExportError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let paths = ExportPaths::for_station(dir, &history.station_id);
    write_all_or_nothing(vec![
        (paths.combined.as_path(), combined_body(&history.combined)),
        (paths.stage.as_path(), series_body("stage_ft", &history.stage)),
        (paths.flow.as_path(), series_body("flow_cfs", &history.flow)),
    ])?;

    info!(
        station = %history.station_id,
        combined = %paths.combined.display(),
        rows = history.combined.len(),
        "wrote station history"
    );
    Ok(paths)
}

fn series_body<'a>(column: &'a str, series: &'a Series) -> CsvBody<'a> {
    Box::new(move |out: &mut dyn Write| {
        writeln!(out, "datetime,{column}")?;
        for reading in series {
            writeln!(out, "{},{}", format_timestamp(reading.timestamp), reading.value)?;
        }
        Ok(())
    })
}

fn combined_body(records: &[CombinedRecord]) -> CsvBody<'_> {
    Box::new(move |out: &mut dyn Write| {
        writeln!(out, "datetime,stage_ft,flow_cfs")?;
        for record in records {
            writeln!(
                out,
                "{},{},{}",
                format_timestamp(record.timestamp),
                format_value(record.stage_value),
                format_value(record.flow_value)
            )?;
        }
        Ok(())
    })
}

fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn format_value(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn io_error(path: &Path) -> impl Fn(io::Error) -> ExportError + '_ {
    move |source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Runs `body` against a temp file beside `path`, then renames it over `path`.
/// On any error the temp file is removed and `path` is left untouched.
fn write_atomically(path: &Path, body: CsvBody<'_>) -> Result<(), ExportError> {
    write_all_or_nothing(vec![(path, body)])
}

/// Writes every body to its own temp file first; renames happen only once
/// all of them have been flushed. Temp files are removed on drop if any
/// write fails.
fn write_all_or_nothing(files: Vec<(&Path, CsvBody<'_>)>) -> Result<(), ExportError> {
    let mut staged = Vec::with_capacity(files.len());
    for (path, body) in files {
        staged.push((path, write_temp(path, body)?));
    }
    for (path, tmp) in staged {
        tmp.persist(path).map_err(|e| io_error(path)(e.error))?;
    }
    Ok(())
}

fn write_temp(path: &Path, body: CsvBody<'_>) -> Result<NamedTempFile, ExportError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(io_error(path))?;
    {
        let mut out = BufWriter::new(&mut tmp);
        body(&mut out).map_err(io_error(path))?;
        out.flush().map_err(io_error(path))?;
    }
    Ok(tmp)
}
