use std::collections::HashSet;
use std::fmt;
use std::io::{Seek, Write};

use serde::Serialize;

use super::records::{DatasetSplit, FileId, FilePatch, FileRecord};
use super::store::Store;
use crate::audio::convert::file_stem;

/// Per-item tally of a batch run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.skipped
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} succeeded, {} failed", self.succeeded, self.failed)?;
        if self.skipped > 0 {
            write!(f, ", {} skipped", self.skipped)?;
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ItemOutcome {
    Done,
    Skipped,
}

/// Run `op` over every item in order. A failing item is logged and counted;
/// it never stops the batch. `progress(done, total)` fires after each item.
pub fn run_batch<T, E, F, P>(items: &[T], mut op: F, mut progress: P) -> BatchReport
where
    E: fmt::Display,
    F: FnMut(&T) -> Result<ItemOutcome, E>,
    P: FnMut(usize, usize),
{
    let mut report = BatchReport::default();
    for (i, item) in items.iter().enumerate() {
        match op(item) {
            Ok(ItemOutcome::Done) => report.succeeded += 1,
            Ok(ItemOutcome::Skipped) => report.skipped += 1,
            Err(e) => {
                log::warn!("Batch item {} of {} failed: {}", i + 1, items.len(), e);
                report.failed += 1;
            }
        }
        progress(i + 1, items.len());
    }
    report
}

pub fn bulk_delete<S, P>(store: &mut S, files: &[FileRecord], progress: P) -> BatchReport
where
    S: Store + ?Sized,
    P: FnMut(usize, usize),
{
    let report = run_batch(
        files,
        |file| super::delete_file(&mut *store, file).map(|_| ItemOutcome::Done),
        progress,
    );
    log::info!("Bulk delete: {}", report);
    report
}

pub fn bulk_assign_split<S, P>(store: &mut S, ids: &[FileId], split: DatasetSplit, progress: P) -> BatchReport
where
    S: Store + ?Sized,
    P: FnMut(usize, usize),
{
    let patch = FilePatch {
        dataset_type: Some(Some(split)),
        ..Default::default()
    };
    let report = run_batch(
        ids,
        |&id| store.update_file(id, &patch).map(|_| ItemOutcome::Done),
        progress,
    );
    log::info!("Assigned {} file(s) to {}: {}", report.succeeded, split, report);
    report
}

/// Name of a file inside the download archive: `{stem}.wav`, then
/// `{stem}_{id}.wav`, then `{stem}_{id}_{n}.wav` until one is free.
fn entry_name(file: &FileRecord, used: &mut HashSet<String>) -> String {
    let stem = file_stem(&file.original_filename);
    let mut name = format!("{}.wav", stem);
    let mut attempt = 1u64;
    while used.contains(&name) {
        name = match attempt {
            1 => format!("{}_{}.wav", stem, file.id),
            n => format!("{}_{}_{}.wav", stem, file.id, n),
        };
        attempt += 1;
    }
    used.insert(name.clone());
    name
}

/// Write the current blob of each file into a ZIP archive on `writer`.
///
/// Missing or unreadable blobs count as failures and are left out; the
/// archive is still finished. Only an error while finishing it is fatal.
pub fn download_zip<S, W, P>(
    store: &S,
    files: &[FileRecord],
    writer: W,
    progress: P,
) -> zip::result::ZipResult<BatchReport>
where
    S: Store + ?Sized,
    W: Write + Seek,
    P: FnMut(usize, usize),
{
    let mut zip = zip::ZipWriter::new(writer);
    let options = zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);
    let mut used = HashSet::new();

    let report = run_batch(
        files,
        |file| -> anyhow::Result<ItemOutcome> {
            let bytes = store.download_blob(&file.file_path)?;
            let name = entry_name(file, &mut used);
            zip.start_file(name, options)?;
            zip.write_all(&bytes)?;
            Ok(ItemOutcome::Done)
        },
        progress,
    );

    zip.finish()?;
    log::info!("ZIP download: {}", report);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::store::tests::{draft, signed_in};
    use std::io::Cursor;

    #[test]
    fn failing_item_does_not_stop_the_batch() {
        let items = [1, 2, 3, 4, 5];
        let mut attempted = Vec::new();
        let mut ticks = Vec::new();
        let report = run_batch(
            &items,
            |&n| {
                attempted.push(n);
                if n == 3 {
                    Err("boom")
                } else {
                    Ok(ItemOutcome::Done)
                }
            },
            |done, total| ticks.push((done, total)),
        );
        assert_eq!(report, BatchReport { succeeded: 4, failed: 1, skipped: 0 });
        assert_eq!(attempted, vec![1, 2, 3, 4, 5]);
        assert_eq!(ticks.last(), Some(&(5, 5)));
        assert_eq!(report.to_string(), "4 succeeded, 1 failed");
    }

    #[test]
    fn skips_are_tallied_separately() {
        let report = run_batch(
            &[true, false, true],
            |&keep| -> Result<_, String> {
                Ok(if keep { ItemOutcome::Done } else { ItemOutcome::Skipped })
            },
            |_, _| {},
        );
        assert_eq!(report.skipped, 1);
        assert_eq!(report.total(), 3);
    }

    #[test]
    fn bulk_delete_counts_missing_records() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = signed_in(dir.path());
        let a = store.insert_file(draft("a")).unwrap();
        let b = store.insert_file(draft("b")).unwrap();
        let mut gone = a.clone();
        gone.id = 999;

        let report = bulk_delete(&mut store, &[a, gone, b], |_, _| {});
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        assert!(store.list_files().unwrap().is_empty());
    }

    #[test]
    fn assigns_split_per_item() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = signed_in(dir.path());
        let a = store.insert_file(draft("a")).unwrap();
        let report = bulk_assign_split(&mut store, &[a.id, 42], DatasetSplit::Train, |_, _| {});
        assert_eq!((report.succeeded, report.failed), (1, 1));
        assert_eq!(store.get_file(a.id).unwrap().dataset_type, Some(DatasetSplit::Train));
    }

    #[test]
    fn zip_contains_available_blobs_with_unique_names() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = signed_in(dir.path());

        let mut first = draft("take");
        first.file_path = "audio-files/1_take.wav".into();
        let mut second = draft("take");
        second.file_path = "audio-files/2_take.wav".into();
        let missing = draft("lost");

        let first = store.insert_file(first).unwrap();
        let second = store.insert_file(second).unwrap();
        let missing = store.insert_file(missing).unwrap();
        store.upload_blob(&first.file_path, b"first", false).unwrap();
        store.upload_blob(&second.file_path, b"second", false).unwrap();

        let mut out = Cursor::new(Vec::new());
        let report = download_zip(&store, &[first, second.clone(), missing], &mut out, |_, _| {}).unwrap();
        assert_eq!((report.succeeded, report.failed), (2, 1));

        let mut archive = zip::ZipArchive::new(Cursor::new(out.into_inner())).unwrap();
        let mut names: Vec<String> = archive.file_names().map(String::from).collect();
        names.sort();
        assert_eq!(names, vec!["take.wav".to_string(), format!("take_{}.wav", second.id)]);

        let mut entry = archive.by_name("take.wav").unwrap();
        let mut body = String::new();
        std::io::Read::read_to_string(&mut entry, &mut body).unwrap();
        assert_eq!(body, "first");
    }

    #[test]
    fn zip_fallback_name_never_reuses_an_existing_entry() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = signed_in(dir.path());

        let mut records = Vec::new();
        for (i, name) in ["take", "other", "take"].into_iter().enumerate() {
            let mut d = draft(name);
            d.file_path = format!("audio-files/{}_{}.wav", i, name);
            let rec = store.insert_file(d).unwrap();
            store.upload_blob(&rec.file_path, name.as_bytes(), false).unwrap();
            records.push(rec);
        }
        // Second file's own stem matches the fallback for the third
        records[1].original_filename = format!("take_{}.wav", records[2].id);

        let mut out = Cursor::new(Vec::new());
        let report = download_zip(&store, &records, &mut out, |_, _| {}).unwrap();
        assert_eq!(report.succeeded, 3);

        let archive = zip::ZipArchive::new(Cursor::new(out.into_inner())).unwrap();
        let names: HashSet<String> = archive.file_names().map(String::from).collect();
        assert_eq!(archive.len(), 3);
        assert_eq!(names.len(), 3);
        assert!(names.contains(&format!("take_{}_2.wav", records[2].id)));
    }
}
