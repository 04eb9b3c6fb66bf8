pub mod bulk;
pub mod export;
pub mod records;
pub mod stats;
pub mod store;
pub mod upload;

use records::{non_empty, DatasetSplit, Emotion, FileId, FilePatch, FileRecord};
use store::{Store, StoreError};

/// Label edit: every field is written, `None` clears it.
#[derive(Clone, Debug, Default)]
pub struct FileEdit {
    pub emotion: Option<Emotion>,
    pub description: Option<String>,
    pub dataset_type: Option<DatasetSplit>,
}

pub fn edit_file<S: Store + ?Sized>(store: &mut S, id: FileId, edit: FileEdit) -> Result<FileRecord, StoreError> {
    let patch = FilePatch {
        emotion: Some(edit.emotion),
        description: Some(edit.description.as_deref().and_then(non_empty)),
        dataset_type: Some(edit.dataset_type),
        ..Default::default()
    };
    store.update_file(id, &patch)
}

/// Remove every blob the file ever had, then the record itself.
///
/// Blob removal failures are logged and skipped; only the record deletion
/// decides the outcome.
pub fn delete_file<S: Store + ?Sized>(store: &mut S, file: &FileRecord) -> Result<(), StoreError> {
    let mut paths: Vec<String> = store
        .list_versions(file.id)?
        .into_iter()
        .map(|v| v.file_path)
        .collect();
    if !paths.contains(&file.file_path) {
        paths.push(file.file_path.clone());
    }

    for path in &paths {
        if let Err(e) = store.remove_blob(path) {
            log::warn!("Could not remove blob {} of file {}: {}", path, file.id, e);
        }
    }

    store.delete_file(file.id)?;
    log::info!("Deleted {} ({} blob(s))", file.original_filename, paths.len());
    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelLayout {
    Mono,
    Stereo,
}

impl ChannelLayout {
    pub fn channel_count(self) -> u16 {
        match self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Stereo => 2,
        }
    }
}

/// List filters. Acoustic bounds only apply to records that have the
/// corresponding metadata; records without it pass.
#[derive(Clone, Debug, Default)]
pub struct FileFilter {
    pub emotion: Option<Emotion>,
    pub duration_min: Option<f64>,
    pub duration_max: Option<f64>,
    pub sample_rate: Option<u32>,
    pub channels: Option<ChannelLayout>,
    pub size_min_mb: Option<f64>,
    pub size_max_mb: Option<f64>,
    pub split: Option<DatasetSplit>,
}

impl FileFilter {
    pub fn matches(&self, file: &FileRecord) -> bool {
        if self.emotion.is_some() && file.emotion != self.emotion {
            return false;
        }
        if self.split.is_some() && file.dataset_type != self.split {
            return false;
        }

        if let Some(meta) = &file.metadata {
            let d = meta.duration_seconds;
            if self.duration_min.is_some_and(|min| d < min) || self.duration_max.is_some_and(|max| d > max) {
                return false;
            }
            if self.sample_rate.is_some_and(|rate| meta.sample_rate_hz != rate) {
                return false;
            }
            if self.channels.is_some_and(|c| meta.channel_count != c.channel_count()) {
                return false;
            }
        }

        if file.file_size > 0 {
            let mb = file.size_mb();
            if self.size_min_mb.is_some_and(|min| mb < min) || self.size_max_mb.is_some_and(|max| mb > max) {
                return false;
            }
        }
        true
    }

    pub fn apply(&self, files: &[FileRecord]) -> Vec<FileRecord> {
        files.iter().filter(|f| self.matches(f)).cloned().collect()
    }

    pub fn active_count(&self) -> usize {
        [
            self.emotion.is_some(),
            self.duration_min.is_some(),
            self.duration_max.is_some(),
            self.sample_rate.is_some(),
            self.channels.is_some(),
            self.size_min_mb.is_some(),
            self.size_max_mb.is_some(),
            self.split.is_some(),
        ]
        .into_iter()
        .filter(|&b| b)
        .count()
    }
}

/// Records tagged with `split`; all records when `split` is `None`.
pub fn filter_by_split(files: &[FileRecord], split: Option<DatasetSplit>) -> Vec<FileRecord> {
    match split {
        Some(split) => files.iter().filter(|f| f.dataset_type == Some(split)).cloned().collect(),
        None => files.to_vec(),
    }
}
