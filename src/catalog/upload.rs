use chrono::Utc;
use thiserror::Error;

use super::records::{
    non_empty, DatasetSplit, Emotion, FileDraft, FileId, FilePatch, FileRecord, VersionDraft, VersionRecord,
};
use super::store::{Store, StoreError, BLOB_PREFIX};
use crate::audio::convert::{file_stem, to_canonical_wav, ConvertError, ConvertedAudio, SourceFormat};
use crate::audio::metadata::{self, AudioMetadata};

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Uploader name is required")]
    MissingUploader,

    #[error("Version {0} does not exist")]
    NoSuchVersion(u32),

    #[error(transparent)]
    Convert(#[from] ConvertError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone, Debug)]
pub struct NewUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub uploaded_by: String,
    pub emotion: Option<Emotion>,
    pub description: Option<String>,
    pub dataset_type: Option<DatasetSplit>,
}

/// Convert, analyze and store a brand-new clip as version 1.
pub fn upload_new<S: Store + ?Sized>(store: &mut S, upload: NewUpload) -> Result<FileRecord, UploadError> {
    if SourceFormat::from_file_name(&upload.file_name).is_none() {
        return Err(ConvertError::UnsupportedFormat(upload.file_name).into());
    }
    let uploaded_by = non_empty(&upload.uploaded_by).ok_or(UploadError::MissingUploader)?;
    let description = upload.description.as_deref().and_then(non_empty);

    let converted = to_canonical_wav(&upload.file_name, upload.bytes)?;
    let metadata = analyze(&converted);

    let blob_name = format!("{}_{}.wav", Utc::now().timestamp_millis(), file_stem(&upload.file_name));
    let blob_path = format!("{}/{}", BLOB_PREFIX, blob_name);
    store.upload_blob(&blob_path, &converted.bytes, false)?;

    let draft = FileDraft {
        filename: blob_name,
        original_filename: upload.file_name.clone(),
        file_path: blob_path.clone(),
        file_size: converted.bytes.len() as u64,
        original_file_size: converted.original_size,
        original_format: converted.original_format,
        is_converted: converted.is_converted,
        uploaded_by: uploaded_by.clone(),
        emotion: upload.emotion,
        description: description.clone(),
        dataset_type: upload.dataset_type,
        metadata,
    };
    let record = match store.insert_file(draft) {
        Ok(record) => record,
        Err(e) => {
            discard_blob(store, &blob_path);
            return Err(e.into());
        }
    };

    store.insert_version(VersionDraft {
        audio_file_id: record.id,
        version_number: 1,
        file_path: blob_path,
        file_size: record.file_size,
        original_format: converted.original_format,
        is_converted: converted.is_converted,
        uploaded_by,
        notes: description,
        metadata,
    })?;

    if converted.is_converted {
        log::info!("Converted {} to WAV and uploaded as file {}", upload.file_name, record.id);
    } else {
        log::info!("Uploaded {} as file {}", upload.file_name, record.id);
    }
    Ok(record)
}

/// Store a replacement recording as the next version and point the file at it.
pub fn upload_version<S: Store + ?Sized>(
    store: &mut S,
    id: FileId,
    file_name: &str,
    bytes: Vec<u8>,
    notes: Option<&str>,
) -> Result<VersionRecord, UploadError> {
    let file = store.get_file(id)?;
    let converted = to_canonical_wav(file_name, bytes)?;
    let metadata = analyze(&converted);

    let next = file.current_version + 1;
    let blob_name = format!(
        "{}_v{}_{}.wav",
        Utc::now().timestamp_millis(),
        next,
        file_stem(&file.original_filename)
    );
    let blob_path = format!("{}/{}", BLOB_PREFIX, blob_name);
    store.upload_blob(&blob_path, &converted.bytes, false)?;

    let draft = VersionDraft {
        audio_file_id: id,
        version_number: next,
        file_path: blob_path.clone(),
        file_size: converted.bytes.len() as u64,
        original_format: converted.original_format,
        is_converted: converted.is_converted,
        uploaded_by: file.uploaded_by.clone(),
        notes: notes.and_then(non_empty),
        metadata,
    };
    let version = insert_version_or_discard(store, draft)?;

    store.update_file(
        id,
        &FilePatch {
            filename: Some(blob_name),
            file_path: Some(blob_path),
            file_size: Some(version.file_size),
            current_version: Some(next),
            metadata: Some(metadata),
            ..Default::default()
        },
    )?;

    log::info!("File {} is now at version {}", id, next);
    Ok(version)
}

/// Make an earlier version current again.
///
/// The restored audio is copied into a new version numbered after the highest
/// existing one, so version numbers only ever grow and history is kept.
pub fn restore_version<S: Store + ?Sized>(store: &mut S, id: FileId, version_number: u32) -> Result<VersionRecord, UploadError> {
    let file = store.get_file(id)?;
    let versions = store.list_versions(id)?;
    let source = versions
        .iter()
        .find(|v| v.version_number == version_number)
        .ok_or(UploadError::NoSuchVersion(version_number))?;

    let latest = versions.first().map_or(file.current_version, |v| v.version_number);
    let next = latest.max(file.current_version) + 1;

    let bytes = store.download_blob(&source.file_path)?;
    let blob_name = format!(
        "{}_v{}_{}.wav",
        Utc::now().timestamp_millis(),
        next,
        file_stem(&file.original_filename)
    );
    let blob_path = format!("{}/{}", BLOB_PREFIX, blob_name);
    store.upload_blob(&blob_path, &bytes, false)?;

    let draft = VersionDraft {
        audio_file_id: id,
        version_number: next,
        file_path: blob_path.clone(),
        file_size: bytes.len() as u64,
        original_format: source.original_format,
        is_converted: source.is_converted,
        uploaded_by: file.uploaded_by.clone(),
        notes: Some(format!("Restored from version {}", version_number)),
        metadata: source.metadata,
    };
    let version = insert_version_or_discard(store, draft)?;

    store.update_file(
        id,
        &FilePatch {
            filename: Some(blob_name),
            file_path: Some(blob_path),
            file_size: Some(version.file_size),
            current_version: Some(next),
            metadata: Some(source.metadata),
            ..Default::default()
        },
    )?;

    log::info!("File {} restored from version {} as version {}", id, version_number, next);
    Ok(version)
}

/// Metadata is enrichment only; failures leave the fields empty.
fn analyze(converted: &ConvertedAudio) -> Option<AudioMetadata> {
    match metadata::extract_from_bytes(converted.bytes.clone(), Some("wav")) {
        Ok(meta) => Some(meta),
        Err(e) => {
            log::warn!("Could not extract metadata from {}: {}", converted.file_name, e);
            None
        }
    }
}

/// Insert a version whose blob is already uploaded; the blob is removed again
/// if no record ends up pointing at it.
fn insert_version_or_discard<S: Store + ?Sized>(store: &mut S, draft: VersionDraft) -> Result<VersionRecord, UploadError> {
    let blob_path = draft.file_path.clone();
    store.insert_version(draft).map_err(|e| {
        discard_blob(store, &blob_path);
        UploadError::from(e)
    })
}

fn discard_blob<S: Store + ?Sized>(store: &mut S, path: &str) {
    if let Err(e) = store.remove_blob(path) {
        log::warn!("Could not remove orphaned blob {}: {}", path, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::buffer::SampleBuffer;
    use std::time::Duration;

    use crate::catalog::store::tests::signed_in;
    use crate::catalog::store::{LocalStore, Session};
    use crate::encode::wav::encode_wav;

    /// Local store whose version table refuses every insert.
    struct NoVersions(LocalStore);

    impl Store for NoVersions {
        fn sign_in(&mut self, email: &str, password: &str) -> Result<Session, StoreError> {
            self.0.sign_in(email, password)
        }
        fn sign_out(&mut self) {
            self.0.sign_out()
        }
        fn session(&self) -> Option<&Session> {
            self.0.session()
        }
        fn list_files(&self) -> Result<Vec<FileRecord>, StoreError> {
            self.0.list_files()
        }
        fn get_file(&self, id: FileId) -> Result<FileRecord, StoreError> {
            self.0.get_file(id)
        }
        fn insert_file(&mut self, draft: FileDraft) -> Result<FileRecord, StoreError> {
            self.0.insert_file(draft)
        }
        fn update_file(&mut self, id: FileId, patch: &FilePatch) -> Result<FileRecord, StoreError> {
            self.0.update_file(id, patch)
        }
        fn delete_file(&mut self, id: FileId) -> Result<(), StoreError> {
            self.0.delete_file(id)
        }
        fn list_versions(&self, id: FileId) -> Result<Vec<VersionRecord>, StoreError> {
            self.0.list_versions(id)
        }
        fn insert_version(&mut self, draft: VersionDraft) -> Result<VersionRecord, StoreError> {
            Err(StoreError::VersionExists {
                file: draft.audio_file_id,
                version: draft.version_number,
            })
        }
        fn upload_blob(&mut self, path: &str, bytes: &[u8], upsert: bool) -> Result<(), StoreError> {
            self.0.upload_blob(path, bytes, upsert)
        }
        fn download_blob(&self, path: &str) -> Result<Vec<u8>, StoreError> {
            self.0.download_blob(path)
        }
        fn remove_blob(&mut self, path: &str) -> Result<(), StoreError> {
            self.0.remove_blob(path)
        }
        fn create_signed_url(&self, path: &str, ttl: Duration) -> Result<String, StoreError> {
            self.0.create_signed_url(path, ttl)
        }
    }

    fn blob_count(root: &std::path::Path) -> usize {
        std::fs::read_dir(root.join("blobs").join(BLOB_PREFIX)).map_or(0, |d| d.count())
    }

    fn wav(seconds: f32, rate: u32) -> Vec<u8> {
        let frames = (seconds * rate as f32) as usize;
        let plane: Vec<f32> = (0..frames).map(|i| 0.5 * (i as f32 * 0.05).sin()).collect();
        encode_wav(&SampleBuffer::new(vec![plane], rate).unwrap()).unwrap()
    }

    fn request(name: &str, bytes: Vec<u8>) -> NewUpload {
        NewUpload {
            file_name: name.into(),
            bytes,
            uploaded_by: "  Ömer ".into(),
            emotion: Some(Emotion::Happy),
            description: Some("   ".into()),
            dataset_type: None,
        }
    }

    #[test]
    fn uploads_wav_with_metadata_and_first_version() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = signed_in(dir.path());
        let record = upload_new(&mut store, request("laugh.wav", wav(1.0, 8000))).unwrap();

        assert_eq!(record.uploaded_by, "Ömer");
        assert_eq!(record.description, None);
        assert_eq!(record.current_version, 1);
        assert!(!record.is_converted);
        assert!(record.file_path.starts_with("audio-files/"));
        assert!(record.file_path.ends_with("_laugh.wav"));

        let meta = record.metadata.unwrap();
        assert_eq!(meta.sample_rate_hz, 8000);
        assert!((meta.duration_seconds - 1.0).abs() < 1e-6);

        let versions = store.list_versions(record.id).unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].file_path, record.file_path);
        assert_eq!(store.download_blob(&record.file_path).unwrap().len() as u64, record.file_size);
    }

    #[test]
    fn undecodable_wav_still_uploads_without_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = signed_in(dir.path());
        let record = upload_new(&mut store, request("odd.wav", b"RIFF....garbage".to_vec())).unwrap();
        assert!(record.metadata.is_none());
    }

    #[test]
    fn broken_mp3_aborts_upload() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = signed_in(dir.path());
        let err = upload_new(&mut store, request("bad.mp3", b"not audio".to_vec())).unwrap_err();
        assert!(matches!(err, UploadError::Convert(ConvertError::Decode(_))));
        assert!(store.list_files().unwrap().is_empty());
    }

    #[test]
    fn validates_extension_and_uploader() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = signed_in(dir.path());
        let err = upload_new(&mut store, request("notes.txt", vec![1])).unwrap_err();
        assert!(matches!(err, UploadError::Convert(ConvertError::UnsupportedFormat(_))));

        let mut req = request("a.wav", wav(0.1, 8000));
        req.uploaded_by = " ".into();
        assert!(matches!(upload_new(&mut store, req), Err(UploadError::MissingUploader)));
    }

    #[test]
    fn new_version_becomes_current() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = signed_in(dir.path());
        let record = upload_new(&mut store, request("cry.wav", wav(1.0, 8000))).unwrap();

        let v2 = upload_version(&mut store, record.id, "cry_retake.wav", wav(2.0, 16000), Some(" louder ")).unwrap();
        assert_eq!(v2.version_number, 2);
        assert_eq!(v2.notes.as_deref(), Some("louder"));
        assert!(v2.file_path.contains("_v2_cry.wav"));

        let file = store.get_file(record.id).unwrap();
        assert_eq!(file.current_version, 2);
        assert_eq!(file.file_path, v2.file_path);
        assert_eq!(file.metadata.unwrap().sample_rate_hz, 16000);
        assert!(file.updated_at >= file.created_at);
    }

    #[test]
    fn restore_appends_a_new_version() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = signed_in(dir.path());
        let record = upload_new(&mut store, request("sigh.wav", wav(1.0, 8000))).unwrap();
        upload_version(&mut store, record.id, "sigh2.wav", wav(0.5, 8000), None).unwrap();

        let v3 = restore_version(&mut store, record.id, 1).unwrap();
        assert_eq!(v3.version_number, 3);

        let file = store.get_file(record.id).unwrap();
        assert_eq!(file.current_version, 3);
        assert!((file.duration().unwrap() - 1.0).abs() < 1e-6);
        assert_eq!(store.list_versions(record.id).unwrap().len(), 3);

        assert!(matches!(
            restore_version(&mut store, record.id, 9),
            Err(UploadError::NoSuchVersion(9))
        ));
    }

    #[test]
    fn rejected_version_record_removes_its_blob() {
        let dir = tempfile::tempdir().unwrap();
        let mut local = signed_in(dir.path());
        let record = upload_new(&mut local, request("gasp.wav", wav(0.5, 8000))).unwrap();
        assert_eq!(blob_count(dir.path()), 1);

        let mut store = NoVersions(local);
        let err = upload_version(&mut store, record.id, "gasp2.wav", wav(0.5, 8000), None).unwrap_err();
        assert!(matches!(err, UploadError::Store(StoreError::VersionExists { .. })));
        assert_eq!(blob_count(dir.path()), 1);

        assert!(restore_version(&mut store, record.id, 1).is_err());
        assert_eq!(blob_count(dir.path()), 1);

        let file = store.get_file(record.id).unwrap();
        assert_eq!(file.current_version, 1);
        assert_eq!(file.file_path, record.file_path);
    }
}
