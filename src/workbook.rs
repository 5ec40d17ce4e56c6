//! xlsx output: one sheet per division
//!
//! Every write rebuilds the workbook in memory, carries over sheets that do
//! not belong to the event, and atomically replaces the file on disk.

use std::io::Write;
use std::path::{Path, PathBuf};

use calamine::{open_workbook, Data, Reader, Xlsx};
use chrono::{NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::ScraperError;
use crate::race::{Division, Entrant, Event};

pub const HEADER: [&str; 8] = [
    "Name", "Number", "Driver", "Trainer", "V75%", "Trend", "Odds", "Equipment",
];

const COLUMN_WIDTHS: [f64; 8] = [28.0, 8.0, 22.0, 22.0, 8.0, 8.0, 8.0, 22.0];

const DATE_FORMAT: &str = "yyyy-mm-dd hh:mm:ss";

pub fn sheet_name(division_number: u32) -> String {
    format!("Division{}", division_number)
}

/// Inverse of [`sheet_name`].
pub fn division_of_sheet(name: &str) -> Option<u32> {
    name.strip_prefix("Division")?.parse().ok()
}

/// Cells of a sheet that is carried over untouched.
struct ForeignSheet {
    name: String,
    cells: Vec<(u32, u16, Data)>,
}

enum SheetPlan<'e> {
    Division(&'e Division),
    /// A division sheet from an earlier write that this event lacks. Rows are
    /// kept, the sheet layout is reapplied.
    StaleDivision(ForeignSheet),
    Foreign(ForeignSheet),
}

pub struct WorkbookWriter {
    path: PathBuf,
    backup_before_write: bool,
}

impl WorkbookWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            backup_before_write: true,
        }
    }

    pub fn with_backup(mut self, enabled: bool) -> Self {
        self.backup_before_write = enabled;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace every division sheet of `event`. Headers are rewritten
    /// verbatim and all data rows below them are replaced, so writing the
    /// same event twice yields the same rows. On failure the previous file is
    /// left as it was.
    pub fn write(&self, event: &Event) -> Result<(), ScraperError> {
        if self.backup_before_write && self.path.exists() {
            if let Err(e) = self.create_backup() {
                warn!("Backup failed, writing anyway: {}", e);
            }
        }

        let plan = self.plan(event)?;

        let mut workbook = Workbook::new();
        let header_format = Format::new().set_bold();
        let date_format = Format::new().set_num_format(DATE_FORMAT);
        for sheet in &plan {
            let worksheet = workbook.add_worksheet();
            let written = match sheet {
                SheetPlan::Division(division) => {
                    write_division(worksheet, division, &header_format)
                }
                SheetPlan::StaleDivision(stale) => write_foreign(worksheet, stale, &date_format)
                    .and_then(|_| apply_layout(worksheet, &header_format)),
                SheetPlan::Foreign(foreign) => write_foreign(worksheet, foreign, &date_format),
            };
            written.map_err(|e| ScraperError::persist(&self.path, e))?;
        }

        let buffer = workbook
            .save_to_buffer()
            .map_err(|e| ScraperError::persist(&self.path, e))?;
        self.replace_file(&buffer)?;

        info!(
            "Wrote {} divisions ({} entrants) to {:?}",
            event.divisions.len(),
            event.entrant_count(),
            self.path
        );
        Ok(())
    }

    /// Existing sheets keep their order; division sheets not yet in the file
    /// are appended in division order.
    fn plan<'e>(&self, event: &'e Event) -> Result<Vec<SheetPlan<'e>>, ScraperError> {
        let mut plan = Vec::new();
        let mut placed = vec![false; event.divisions.len()];

        for foreign in self.existing_sheets()? {
            match event
                .divisions
                .iter()
                .position(|d| sheet_name(d.division_number) == foreign.name)
            {
                Some(i) if !placed[i] => {
                    placed[i] = true;
                    plan.push(SheetPlan::Division(&event.divisions[i]));
                }
                Some(_) => {}
                None if division_of_sheet(&foreign.name).is_some() => {
                    warn!("Sheet {} is not part of this event, keeping its previous rows", foreign.name);
                    plan.push(SheetPlan::StaleDivision(foreign));
                }
                None => plan.push(SheetPlan::Foreign(foreign)),
            }
        }

        for (division, done) in event.divisions.iter().zip(placed) {
            if !done {
                debug!("Creating sheet {}", sheet_name(division.division_number));
                plan.push(SheetPlan::Division(division));
            }
        }
        Ok(plan)
    }

    fn existing_sheets(&self) -> Result<Vec<ForeignSheet>, ScraperError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let mut workbook: Xlsx<_> =
            open_workbook(&self.path).map_err(|e| ScraperError::persist(&self.path, e))?;

        let mut sheets = Vec::new();
        for name in workbook.sheet_names() {
            let range = workbook
                .worksheet_range(&name)
                .map_err(|e| ScraperError::persist(&self.path, e))?;
            let (row0, col0) = range.start().unwrap_or((0, 0));
            let cells = range
                .cells()
                .filter(|(_, _, value)| !matches!(value, Data::Empty))
                .map(|(r, c, value)| (row0 + r as u32, (col0 as usize + c) as u16, value.clone()))
                .collect();
            sheets.push(ForeignSheet { name, cells });
        }
        Ok(sheets)
    }

    /// Write-then-replace through a temporary file in the same directory.
    fn replace_file(&self, bytes: &[u8]) -> Result<(), ScraperError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|e| ScraperError::persist(&self.path, e))?;

        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| ScraperError::persist(&self.path, e))?;
        tmp.write_all(bytes)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| ScraperError::persist(&self.path, e))?;
        tmp.persist(&self.path)
            .map_err(|e| ScraperError::persist(&self.path, e.error))?;
        Ok(())
    }

    /// Copy the current file to a timestamped sibling. Returns `None` when
    /// there is nothing to back up.
    pub fn create_backup(&self) -> Result<Option<PathBuf>, ScraperError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let stamp = Utc::now()
            .to_rfc3339_opts(SecondsFormat::Nanos, true)
            .replace([':', '.'], "-");
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "workbook".to_string());
        let ext = self
            .path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_else(|| "xlsx".to_string());

        let mut backup = self
            .path
            .with_file_name(format!("{}.backup-{}.{}", stem, stamp, ext));
        let mut suffix = 1;
        while backup.exists() {
            backup = self
                .path
                .with_file_name(format!("{}.backup-{}-{}.{}", stem, stamp, suffix, ext));
            suffix += 1;
        }

        std::fs::copy(&self.path, &backup)?;
        info!("Backed up {:?} to {:?}", self.path, backup);
        Ok(Some(backup))
    }

    /// Sheet names in workbook order.
    pub fn sheet_names(&self) -> Result<Vec<String>, ScraperError> {
        let workbook: Xlsx<_> =
            open_workbook(&self.path).map_err(|e| ScraperError::persist(&self.path, e))?;
        Ok(workbook.sheet_names())
    }

    /// Cell text of one sheet, row by row.
    pub fn read_sheet(&self, name: &str) -> Result<Vec<Vec<String>>, ScraperError> {
        let mut workbook: Xlsx<_> =
            open_workbook(&self.path).map_err(|e| ScraperError::persist(&self.path, e))?;
        let range = workbook
            .worksheet_range(name)
            .map_err(|e| ScraperError::persist(&self.path, e))?;
        Ok(range
            .rows()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .collect())
    }
}

fn write_division(
    worksheet: &mut Worksheet,
    division: &Division,
    header_format: &Format,
) -> Result<(), XlsxError> {
    worksheet.set_name(sheet_name(division.division_number))?;
    apply_layout(worksheet, header_format)?;

    for (i, entrant) in division.entrants.iter().enumerate() {
        write_entrant(worksheet, i as u32 + 1, entrant)?;
    }
    Ok(())
}

/// Bold header row, fixed column widths, frozen header.
fn apply_layout(worksheet: &mut Worksheet, header_format: &Format) -> Result<(), XlsxError> {
    for (col, (title, width)) in HEADER.iter().zip(COLUMN_WIDTHS).enumerate() {
        worksheet.write_string_with_format(0, col as u16, *title, header_format)?;
        worksheet.set_column_width(col as u16, width)?;
    }
    worksheet.set_freeze_panes(1, 0)?;
    Ok(())
}

fn write_entrant(worksheet: &mut Worksheet, row: u32, entrant: &Entrant) -> Result<(), XlsxError> {
    let mut entrant = entrant.clone();
    entrant.enforce_scratch_invariant();

    worksheet.write_string(row, 0, &entrant.name)?;
    worksheet.write_number(row, 1, entrant.number)?;
    worksheet.write_string(row, 2, &entrant.driver_name)?;
    if !entrant.trainer.is_empty() {
        worksheet.write_string(row, 3, &entrant.trainer)?;
    }
    worksheet.write_number(row, 4, entrant.v75_percent)?;
    worksheet.write_number(row, 5, entrant.trend_percent)?;
    worksheet.write_number(row, 6, entrant.win_odds)?;
    worksheet.write_string(row, 7, entrant.equipment.as_str())?;
    Ok(())
}

fn write_foreign(
    worksheet: &mut Worksheet,
    sheet: &ForeignSheet,
    date_format: &Format,
) -> Result<(), XlsxError> {
    worksheet.set_name(&sheet.name)?;
    for (row, col, value) in &sheet.cells {
        match value {
            Data::Int(i) => worksheet.write_number(*row, *col, *i as f64)?,
            Data::Float(f) => worksheet.write_number(*row, *col, *f)?,
            Data::Bool(b) => worksheet.write_boolean(*row, *col, *b)?,
            Data::String(s) => worksheet.write_string(*row, *col, s)?,
            Data::DateTime(dt) => {
                worksheet.write_number_with_format(*row, *col, dt.as_f64(), date_format)?
            }
            Data::DateTimeIso(iso) => match iso_serial(iso) {
                Some(serial) => worksheet.write_number_with_format(*row, *col, serial, date_format)?,
                None => worksheet.write_string(*row, *col, iso)?,
            },
            Data::Empty => continue,
            other => worksheet.write_string(*row, *col, other.to_string())?,
        };
    }
    Ok(())
}

/// Excel serial day number of an ISO 8601 date or datetime.
fn iso_serial(iso: &str) -> Option<f64> {
    let dt = NaiveDateTime::parse_from_str(iso, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(iso, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    Some((dt - epoch).num_milliseconds() as f64 / 86_400_000.0)
}
