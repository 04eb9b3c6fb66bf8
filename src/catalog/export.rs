use std::io::{Read, Write};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use thiserror::Error;

use super::bulk::{run_batch, BatchReport, ItemOutcome};
use super::records::{non_empty, DatasetSplit, Emotion, FileId, FilePatch, FileRecord};
use super::store::{Store, StoreError};

pub const CSV_HEADERS: [&str; 15] = [
    "ID",
    "Original Filename",
    "File Path",
    "File Size (MB)",
    "Original Format",
    "Uploaded By",
    "Emotion",
    "Description",
    "Duration (s)",
    "Sample Rate (Hz)",
    "Channels",
    "Audio Level (dB)",
    "Dataset Type",
    "Created At",
    "Version",
];

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("CSV write failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON write failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Export write failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("CSV read failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("CSV has no ID column")]
    MissingIdColumn,

    #[error("CSV contains no data rows")]
    Empty,
}

#[derive(Debug, Error)]
pub enum RowError {
    #[error("Invalid file id '{0}'")]
    InvalidId(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub fn write_csv<W: Write>(files: &[FileRecord], writer: W) -> Result<(), ExportError> {
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(CSV_HEADERS)?;

    for file in files {
        let meta = file.metadata.as_ref();
        out.write_record([
            file.id.to_string(),
            file.original_filename.clone(),
            file.file_path.clone(),
            if file.file_size == 0 {
                String::new()
            } else {
                format!("{:.2}", file.size_mb())
            },
            file.original_format.as_str().to_string(),
            file.uploaded_by.clone(),
            file.emotion.map(|e| e.as_str().to_string()).unwrap_or_default(),
            file.description.clone().unwrap_or_default(),
            meta.map(|m| format!("{:.2}", m.duration_seconds)).unwrap_or_default(),
            meta.map(|m| m.sample_rate_hz.to_string()).unwrap_or_default(),
            meta.map(|m| m.channel_count.to_string()).unwrap_or_default(),
            meta.map(|m| format!("{:.1}", m.average_level_db)).unwrap_or_default(),
            file.dataset_type.map(|d| d.as_str().to_string()).unwrap_or_default(),
            file.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            file.current_version.to_string(),
        ])?;
    }
    out.flush()?;
    log::info!("Exported {} file(s) to CSV", files.len());
    Ok(())
}

#[derive(Serialize)]
struct JsonFile<'a> {
    id: FileId,
    original_filename: &'a str,
    file_path: &'a str,
    file_size_bytes: u64,
    file_size_mb: Option<String>,
    original_format: &'a str,
    uploaded_by: &'a str,
    emotion: Option<Emotion>,
    description: Option<&'a str>,
    duration: Option<f64>,
    sample_rate: Option<u32>,
    channels: Option<u16>,
    audio_level: Option<f64>,
    dataset_type: Option<DatasetSplit>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    current_version: u32,
}

#[derive(Serialize)]
struct JsonExport<'a> {
    export_date: DateTime<Utc>,
    total_files: usize,
    files: Vec<JsonFile<'a>>,
}

pub fn write_json<W: Write>(files: &[FileRecord], writer: W, export_date: DateTime<Utc>) -> Result<(), ExportError> {
    let doc = JsonExport {
        export_date,
        total_files: files.len(),
        files: files
            .iter()
            .map(|f| JsonFile {
                id: f.id,
                original_filename: &f.original_filename,
                file_path: &f.file_path,
                file_size_bytes: f.file_size,
                file_size_mb: (f.file_size > 0).then(|| format!("{:.2}", f.size_mb())),
                original_format: f.original_format.as_str(),
                uploaded_by: &f.uploaded_by,
                emotion: f.emotion,
                description: f.description.as_deref(),
                duration: f.metadata.map(|m| m.duration_seconds),
                sample_rate: f.metadata.map(|m| m.sample_rate_hz),
                channels: f.metadata.map(|m| m.channel_count),
                audio_level: f.metadata.map(|m| m.average_level_db),
                dataset_type: f.dataset_type,
                created_at: f.created_at,
                updated_at: f.updated_at,
                current_version: f.current_version,
            })
            .collect(),
    };
    serde_json::to_writer_pretty(writer, &doc)?;
    log::info!("Exported {} file(s) to JSON", files.len());
    Ok(())
}

/// Column positions of the fields an import can touch, resolved once from
/// the header row. Accepts English, Turkish and snake_case header names.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImportColumns {
    pub id: usize,
    pub split: Option<usize>,
    pub emotion: Option<usize>,
    pub description: Option<usize>,
}

const ID_ALIASES: &[&str] = &["ID", "id"];
const SPLIT_ALIASES: &[&str] = &["Dataset Type", "dataset_type"];
const EMOTION_ALIASES: &[&str] = &["Emotion", "Duygu", "emotion"];
const DESCRIPTION_ALIASES: &[&str] = &["Description", "Açıklama", "description"];

impl ImportColumns {
    pub fn resolve(headers: &csv::StringRecord) -> Result<Self, ImportError> {
        let find = |aliases: &[&str]| {
            aliases
                .iter()
                .find_map(|alias| headers.iter().position(|h| h.trim() == *alias))
        };
        Ok(Self {
            id: find(ID_ALIASES).ok_or(ImportError::MissingIdColumn)?,
            split: find(SPLIT_ALIASES),
            emotion: find(EMOTION_ALIASES),
            description: find(DESCRIPTION_ALIASES),
        })
    }

    /// Id cell plus the changes a row asks for. Empty cells and unknown
    /// labels leave the field untouched.
    pub fn row_patch(&self, row: &csv::StringRecord) -> (String, FilePatch) {
        let cell = |idx: Option<usize>| idx.and_then(|i| row.get(i)).map(str::trim).unwrap_or("");
        let mut patch = FilePatch::default();

        let split = cell(self.split);
        if !split.is_empty() {
            match split.parse::<DatasetSplit>() {
                Ok(s) => patch.dataset_type = Some(Some(s)),
                Err(e) => log::debug!("Ignoring cell: {}", e),
            }
        }

        let emotion = cell(self.emotion);
        if !emotion.is_empty() {
            match emotion.parse::<Emotion>() {
                Ok(e) => patch.emotion = Some(Some(e)),
                Err(e) => log::debug!("Ignoring cell: {}", e),
            }
        }

        if let Some(text) = non_empty(cell(self.description)) {
            patch.description = Some(Some(text));
        }

        (cell(Some(self.id)).to_string(), patch)
    }
}

#[derive(Clone, Debug)]
pub struct ImportRow {
    pub id: String,
    pub patch: FilePatch,
}

/// Parse an import sheet. Rows whose field count differs from the header
/// are dropped.
pub fn parse_import<R: Read>(reader: R) -> Result<Vec<ImportRow>, ImportError> {
    let mut csv = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = csv.headers()?.clone();
    let columns = ImportColumns::resolve(&headers)?;

    let mut rows = Vec::new();
    for record in csv.records() {
        let record = record?;
        if record.len() != headers.len() {
            log::warn!(
                "Dropping CSV line {}: {} fields, expected {}",
                record.position().map_or(0, |p| p.line()),
                record.len(),
                headers.len()
            );
            continue;
        }
        let (id, patch) = columns.row_patch(&record);
        rows.push(ImportRow { id, patch });
    }
    Ok(rows)
}

/// Apply label changes from a CSV sheet to existing records.
pub fn import_csv<S, R, P>(store: &mut S, reader: R, progress: P) -> Result<BatchReport, ImportError>
where
    S: Store + ?Sized,
    R: Read,
    P: FnMut(usize, usize),
{
    let rows = parse_import(reader)?;
    if rows.is_empty() {
        return Err(ImportError::Empty);
    }

    let report = run_batch(
        &rows,
        |row| -> Result<ItemOutcome, RowError> {
            if row.id.is_empty() || row.patch.is_empty() {
                return Ok(ItemOutcome::Skipped);
            }
            let id: FileId = row.id.parse().map_err(|_| RowError::InvalidId(row.id.clone()))?;
            store.update_file(id, &row.patch)?;
            Ok(ItemOutcome::Done)
        },
        progress,
    );
    log::info!("CSV import: {}", report);
    Ok(report)
}

/// `audio_dataset_{split|all}_{date}.{ext}`
pub fn dataset_file_name(split: Option<DatasetSplit>, extension: &str, date: NaiveDate) -> String {
    format!(
        "audio_dataset_{}_{}.{}",
        split.map_or("all", DatasetSplit::as_str),
        date.format("%Y-%m-%d"),
        extension
    )
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ZipSelection {
    All,
    Split(DatasetSplit),
    Selected,
}

/// `audio_files_{split|all|selected}_{date}.zip`
pub fn zip_file_name(selection: ZipSelection, date: NaiveDate) -> String {
    let label = match selection {
        ZipSelection::All => "all",
        ZipSelection::Split(split) => split.as_str(),
        ZipSelection::Selected => "selected",
    };
    format!("audio_files_{}_{}.zip", label, date.format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::store::tests::{draft, signed_in};
    use crate::catalog::tests::record;

    #[test]
    fn csv_has_fixed_headers_and_blank_optionals() {
        let mut with_meta = record(1, Some((2.346, 44100, 2)), 3 * 1024 * 1024);
        with_meta.emotion = Some(Emotion::Angry);
        with_meta.description = Some("yells, then laughs".into());
        let bare = record(2, None, 0);

        let mut out = Vec::new();
        write_csv(&[with_meta, bare], &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], CSV_HEADERS.join(","));
        assert!(lines[1].starts_with("1,clip1.wav,audio-files/1_clip1.wav,3.00,wav,Celina,angry,\"yells, then laughs\",2.35,44100,2,-20.0,,"));
        assert!(lines[1].ends_with(",1"));
        assert!(lines[2].starts_with("2,clip2.wav,audio-files/1_clip2.wav,,wav,Celina,,,,,,,,"));
    }

    #[test]
    fn json_export_shape() {
        let files = vec![record(1, Some((1.5, 8000, 1)), 1024 * 1024), record(2, None, 0)];
        let mut out = Vec::new();
        write_json(&files, &mut out, Utc::now()).unwrap();

        let doc: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(doc["total_files"], 2);
        assert_eq!(doc["files"][0]["file_size_mb"], "1.00");
        assert_eq!(doc["files"][0]["sample_rate"], 8000);
        assert!(doc["files"][1]["duration"].is_null());
        assert!(doc["files"][1]["file_size_mb"].is_null());
        assert!(doc["export_date"].is_string());
    }

    #[test]
    fn resolves_header_aliases() {
        let headers = csv::StringRecord::from(vec!["Açıklama", "Duygu", "id"]);
        let cols = ImportColumns::resolve(&headers).unwrap();
        assert_eq!(cols, ImportColumns { id: 2, split: None, emotion: Some(1), description: Some(0) });

        let headers = csv::StringRecord::from(vec!["Name"]);
        assert!(matches!(ImportColumns::resolve(&headers), Err(ImportError::MissingIdColumn)));
    }

    #[test]
    fn drops_ragged_rows_and_ignores_bad_labels() {
        let sheet = "ID,Dataset Type,Emotion,Description\n\
                     1,TEST,Mutlu,\n\
                     2,dev,bored,  note  \n\
                     3,train\n";
        let rows = parse_import(sheet.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);

        assert_eq!(rows[0].patch.dataset_type, Some(Some(DatasetSplit::Test)));
        assert_eq!(rows[0].patch.emotion, Some(Some(Emotion::Happy)));
        assert_eq!(rows[0].patch.description, None);

        assert_eq!(rows[1].patch.dataset_type, None);
        assert_eq!(rows[1].patch.emotion, None);
        assert_eq!(rows[1].patch.description, Some(Some("note".to_string())));
    }

    #[test]
    fn import_applies_and_tallies() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = signed_in(dir.path());
        let a = store.insert_file(draft("a")).unwrap();
        let b = store.insert_file(draft("b")).unwrap();

        let sheet = format!(
            "ID,Dataset Type,Emotion\n{},validation,sad\n{},,\n,train,happy\n777,train,\nabc,test,\n",
            a.id, b.id
        );
        let report = import_csv(&mut store, sheet.as_bytes(), |_, _| {}).unwrap();
        // a updated; b and the id-less row skipped; 777 and abc fail
        assert_eq!(report, BatchReport { succeeded: 1, failed: 2, skipped: 2 });

        let a = store.get_file(a.id).unwrap();
        assert_eq!(a.dataset_type, Some(DatasetSplit::Validation));
        assert_eq!(a.emotion, Some(Emotion::Sad));
    }

    #[test]
    fn header_only_sheet_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = signed_in(dir.path());
        assert!(matches!(
            import_csv(&mut store, "ID,Emotion\n".as_bytes(), |_, _| {}),
            Err(ImportError::Empty)
        ));
    }

    #[test]
    fn export_names() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(dataset_file_name(None, "csv", date), "audio_dataset_all_2024-03-09.csv");
        assert_eq!(
            dataset_file_name(Some(DatasetSplit::Train), "json", date),
            "audio_dataset_train_2024-03-09.json"
        );
        assert_eq!(zip_file_name(ZipSelection::Selected, date), "audio_files_selected_2024-03-09.zip");
        assert_eq!(
            zip_file_name(ZipSelection::Split(DatasetSplit::Test), date),
            "audio_files_test_2024-03-09.zip"
        );
    }
}
