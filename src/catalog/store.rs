use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::records::{FileDraft, FileId, FilePatch, FileRecord, VersionDraft, VersionRecord};

/// Bucket-relative prefix for stored audio blobs.
pub const BLOB_PREFIX: &str = "audio-files";

const CATALOG_FILE: &str = "catalog.json";
const BLOB_DIR: &str = "blobs";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not signed in")]
    Unauthorized,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("File {0} not found")]
    FileNotFound(FileId),

    #[error("Version {version} of file {file} already exists")]
    VersionExists { file: FileId, version: u32 },

    #[error("Blob '{0}' not found")]
    BlobNotFound(String),

    #[error("Blob '{0}' already exists")]
    BlobExists(String),

    #[error("Invalid blob path '{0}'")]
    InvalidPath(String),

    #[error("Storage I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Catalog file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Clone, Debug)]
pub struct Session {
    pub email: String,
    pub signed_in_at: DateTime<Utc>,
}

/// Data-access contract of the catalog backend.
///
/// Every call except the session ones requires a signed-in session.
pub trait Store {
    fn sign_in(&mut self, email: &str, password: &str) -> Result<Session, StoreError>;
    fn sign_out(&mut self);
    fn session(&self) -> Option<&Session>;

    /// Newest first.
    fn list_files(&self) -> Result<Vec<FileRecord>, StoreError>;
    fn get_file(&self, id: FileId) -> Result<FileRecord, StoreError>;
    fn insert_file(&mut self, draft: FileDraft) -> Result<FileRecord, StoreError>;
    /// Applies `patch` and bumps `updated_at`.
    fn update_file(&mut self, id: FileId, patch: &FilePatch) -> Result<FileRecord, StoreError>;
    /// Removes the record and its version records. Blobs are left alone.
    fn delete_file(&mut self, id: FileId) -> Result<(), StoreError>;

    /// Highest version number first.
    fn list_versions(&self, id: FileId) -> Result<Vec<VersionRecord>, StoreError>;
    fn insert_version(&mut self, draft: VersionDraft) -> Result<VersionRecord, StoreError>;

    fn upload_blob(&mut self, path: &str, bytes: &[u8], upsert: bool) -> Result<(), StoreError>;
    fn download_blob(&self, path: &str) -> Result<Vec<u8>, StoreError>;
    fn remove_blob(&mut self, path: &str) -> Result<(), StoreError>;
    fn create_signed_url(&self, path: &str, ttl: Duration) -> Result<String, StoreError>;
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct Catalog {
    next_id: FileId,
    files: Vec<FileRecord>,
    versions: Vec<VersionRecord>,
}

impl Catalog {
    fn file_index(&self, id: FileId) -> Result<usize, StoreError> {
        self.files
            .iter()
            .position(|f| f.id == id)
            .ok_or(StoreError::FileNotFound(id))
    }
}

/// Filesystem-backed store: `catalog.json` plus a `blobs/` tree under one root.
pub struct LocalStore {
    root: PathBuf,
    users: Vec<Credentials>,
    session: Option<Session>,
    catalog: Catalog,
}

impl LocalStore {
    pub fn open(root: &Path, users: Vec<Credentials>) -> Result<Self, StoreError> {
        let blobs = root.join(BLOB_DIR);
        fs::create_dir_all(&blobs).map_err(|source| StoreError::Io {
            path: blobs.clone(),
            source,
        })?;
        let root = fs::canonicalize(root).map_err(|source| StoreError::Io {
            path: root.to_path_buf(),
            source,
        })?;

        let catalog_path = root.join(CATALOG_FILE);
        let catalog = if catalog_path.exists() {
            let text = fs::read_to_string(&catalog_path).map_err(|source| StoreError::Io {
                path: catalog_path.clone(),
                source,
            })?;
            serde_json::from_str(&text)?
        } else {
            Catalog::default()
        };

        log::debug!(
            "Opened store at {} ({} files, {} versions)",
            root.display(),
            catalog.files.len(),
            catalog.versions.len()
        );

        Ok(Self {
            root,
            users,
            session: None,
            catalog,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn require_session(&self) -> Result<(), StoreError> {
        self.session.as_ref().map(|_| ()).ok_or(StoreError::Unauthorized)
    }

    fn blob_path(&self, path: &str) -> Result<PathBuf, StoreError> {
        let rel = Path::new(path);
        let valid = !path.is_empty() && rel.components().all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(BLOB_DIR).join(rel))
    }

    fn file_index(&self, id: FileId) -> Result<usize, StoreError> {
        self.catalog.file_index(id)
    }

    /// Apply `change` to a copy of the catalog and adopt it only once it is on
    /// disk, so a failed write leaves memory and file in agreement.
    fn commit<T>(&mut self, change: impl FnOnce(&mut Catalog) -> Result<T, StoreError>) -> Result<T, StoreError> {
        let mut next = self.catalog.clone();
        let out = change(&mut next)?;
        self.persist(&next)?;
        self.catalog = next;
        Ok(out)
    }

    /// Write-to-temp then rename.
    fn persist(&self, catalog: &Catalog) -> Result<(), StoreError> {
        let path = self.root.join(CATALOG_FILE);
        let tmp = self.root.join(format!("{}.tmp", CATALOG_FILE));
        let json = serde_json::to_vec_pretty(catalog)?;
        fs::write(&tmp, json).map_err(|source| StoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| StoreError::Io { path, source })
    }
}

impl Store for LocalStore {
    fn sign_in(&mut self, email: &str, password: &str) -> Result<Session, StoreError> {
        let known = self
            .users
            .iter()
            .any(|u| u.email.eq_ignore_ascii_case(email.trim()) && u.password == password);
        if !known {
            return Err(StoreError::InvalidCredentials);
        }
        let session = Session {
            email: email.trim().to_string(),
            signed_in_at: Utc::now(),
        };
        log::info!("Signed in as {}", session.email);
        self.session = Some(session.clone());
        Ok(session)
    }

    fn sign_out(&mut self) {
        self.session = None;
    }

    fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    fn list_files(&self) -> Result<Vec<FileRecord>, StoreError> {
        self.require_session()?;
        let mut files = self.catalog.files.clone();
        files.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(files)
    }

    fn get_file(&self, id: FileId) -> Result<FileRecord, StoreError> {
        self.require_session()?;
        Ok(self.catalog.files[self.file_index(id)?].clone())
    }

    fn insert_file(&mut self, draft: FileDraft) -> Result<FileRecord, StoreError> {
        self.require_session()?;
        self.commit(|catalog| {
            catalog.next_id += 1;
            let record = draft.into_record(catalog.next_id, Utc::now());
            catalog.files.push(record.clone());
            Ok(record)
        })
    }

    fn update_file(&mut self, id: FileId, patch: &FilePatch) -> Result<FileRecord, StoreError> {
        self.require_session()?;
        self.commit(|catalog| {
            let idx = catalog.file_index(id)?;
            let record = &mut catalog.files[idx];
            patch.apply(record);
            record.updated_at = Utc::now();
            Ok(record.clone())
        })
    }

    fn delete_file(&mut self, id: FileId) -> Result<(), StoreError> {
        self.require_session()?;
        self.commit(|catalog| {
            let idx = catalog.file_index(id)?;
            catalog.files.remove(idx);
            catalog.versions.retain(|v| v.audio_file_id != id);
            Ok(())
        })
    }

    fn list_versions(&self, id: FileId) -> Result<Vec<VersionRecord>, StoreError> {
        self.require_session()?;
        let mut versions: Vec<VersionRecord> = self
            .catalog
            .versions
            .iter()
            .filter(|v| v.audio_file_id == id)
            .cloned()
            .collect();
        versions.sort_by(|a, b| b.version_number.cmp(&a.version_number));
        Ok(versions)
    }

    fn insert_version(&mut self, draft: VersionDraft) -> Result<VersionRecord, StoreError> {
        self.require_session()?;
        self.file_index(draft.audio_file_id)?;
        let duplicate = self
            .catalog
            .versions
            .iter()
            .any(|v| v.audio_file_id == draft.audio_file_id && v.version_number == draft.version_number);
        if duplicate {
            return Err(StoreError::VersionExists {
                file: draft.audio_file_id,
                version: draft.version_number,
            });
        }
        self.commit(|catalog| {
            let record = draft.into_record(Utc::now());
            catalog.versions.push(record.clone());
            Ok(record)
        })
    }

    fn upload_blob(&mut self, path: &str, bytes: &[u8], upsert: bool) -> Result<(), StoreError> {
        self.require_session()?;
        let target = self.blob_path(path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let mut options = fs::OpenOptions::new();
        options.write(true);
        if upsert {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }
        let mut file = options.open(&target).map_err(|source| {
            if source.kind() == std::io::ErrorKind::AlreadyExists {
                StoreError::BlobExists(path.to_string())
            } else {
                StoreError::Io {
                    path: target.clone(),
                    source,
                }
            }
        })?;
        file.write_all(bytes).map_err(|source| StoreError::Io {
            path: target.clone(),
            source,
        })?;
        log::debug!("Stored blob {} ({} bytes)", path, bytes.len());
        Ok(())
    }

    fn download_blob(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        self.require_session()?;
        let target = self.blob_path(path)?;
        fs::read(&target).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                StoreError::BlobNotFound(path.to_string())
            } else {
                StoreError::Io { path: target, source }
            }
        })
    }

    fn remove_blob(&mut self, path: &str) -> Result<(), StoreError> {
        self.require_session()?;
        let target = self.blob_path(path)?;
        fs::remove_file(&target).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                StoreError::BlobNotFound(path.to_string())
            } else {
                StoreError::Io { path: target, source }
            }
        })
    }

    fn create_signed_url(&self, path: &str, ttl: Duration) -> Result<String, StoreError> {
        self.require_session()?;
        let target = self.blob_path(path)?;
        if !target.exists() {
            return Err(StoreError::BlobNotFound(path.to_string()));
        }
        let expires = Utc::now().timestamp() + ttl.as_secs() as i64;
        Ok(format!("file://{}?expires={}", target.display(), expires))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::audio::convert::SourceFormat;
    use crate::fetch::fetch_bytes;

    pub(crate) const EMAIL: &str = "team@example.com";
    pub(crate) const PASSWORD: &str = "hunter2";

    pub(crate) fn signed_in(dir: &Path) -> LocalStore {
        let mut store = LocalStore::open(
            dir,
            vec![Credentials {
                email: EMAIL.into(),
                password: PASSWORD.into(),
            }],
        )
        .unwrap();
        store.sign_in(EMAIL, PASSWORD).unwrap();
        store
    }

    pub(crate) fn draft(name: &str) -> FileDraft {
        FileDraft {
            filename: format!("1_{name}.wav"),
            original_filename: format!("{name}.wav"),
            file_path: format!("{BLOB_PREFIX}/1_{name}.wav"),
            file_size: 2048,
            original_file_size: 2048,
            original_format: SourceFormat::Wav,
            is_converted: false,
            uploaded_by: "Celina".into(),
            emotion: None,
            description: None,
            dataset_type: None,
            metadata: None,
        }
    }

    #[test]
    fn data_calls_need_a_session() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = LocalStore::open(dir.path(), Vec::new()).unwrap();
        assert!(matches!(store.list_files(), Err(StoreError::Unauthorized)));
        assert!(matches!(
            store.sign_in("nobody@example.com", "x"),
            Err(StoreError::InvalidCredentials)
        ));
        assert!(store.session().is_none());
    }

    #[test]
    fn catalog_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let mut store = signed_in(dir.path());
            store.insert_file(draft("a")).unwrap().id
        };
        let store = signed_in(dir.path());
        assert_eq!(store.get_file(id).unwrap().original_filename, "a.wav");
    }

    #[test]
    fn lists_newest_first_and_versions_descending() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = signed_in(dir.path());
        let a = store.insert_file(draft("a")).unwrap();
        let b = store.insert_file(draft("b")).unwrap();
        let ids: Vec<_> = store.list_files().unwrap().iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![b.id, a.id]);

        for n in [1, 3, 2] {
            store
                .insert_version(VersionDraft {
                    audio_file_id: a.id,
                    version_number: n,
                    file_path: format!("{BLOB_PREFIX}/v{n}.wav"),
                    file_size: 1,
                    original_format: SourceFormat::Wav,
                    is_converted: false,
                    uploaded_by: "Celina".into(),
                    notes: None,
                    metadata: None,
                })
                .unwrap();
        }
        let numbers: Vec<_> = store.list_versions(a.id).unwrap().iter().map(|v| v.version_number).collect();
        assert_eq!(numbers, vec![3, 2, 1]);

        store.delete_file(a.id).unwrap();
        assert!(store.list_versions(a.id).unwrap().is_empty());
        assert!(matches!(store.get_file(a.id), Err(StoreError::FileNotFound(_))));
    }

    #[test]
    fn failed_write_leaves_catalog_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = signed_in(dir.path());
        let kept = store.insert_file(draft("kept")).unwrap();

        // A directory where the temp file goes makes every write fail
        let tmp = dir.path().join(format!("{}.tmp", CATALOG_FILE));
        std::fs::create_dir(&tmp).unwrap();

        assert!(matches!(store.insert_file(draft("lost")), Err(StoreError::Io { .. })));
        assert!(store.delete_file(kept.id).is_err());
        let patch = FilePatch {
            description: Some(Some("changed".into())),
            ..Default::default()
        };
        assert!(store.update_file(kept.id, &patch).is_err());

        let files = store.list_files().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].description, None);

        std::fs::remove_dir(&tmp).unwrap();
        let next = store.insert_file(draft("next")).unwrap();
        assert_eq!(next.id, kept.id + 1);
        assert_eq!(signed_in(dir.path()).list_files().unwrap().len(), 2);
    }

    #[test]
    fn blob_upload_respects_upsert() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = signed_in(dir.path());
        let path = format!("{BLOB_PREFIX}/x.wav");
        store.upload_blob(&path, b"one", false).unwrap();
        assert!(matches!(store.upload_blob(&path, b"two", false), Err(StoreError::BlobExists(_))));
        store.upload_blob(&path, b"two", true).unwrap();
        assert_eq!(store.download_blob(&path).unwrap(), b"two");

        store.remove_blob(&path).unwrap();
        assert!(matches!(store.download_blob(&path), Err(StoreError::BlobNotFound(_))));
    }

    #[test]
    fn rejects_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = signed_in(dir.path());
        assert!(matches!(
            store.upload_blob("../outside.wav", b"x", true),
            Err(StoreError::InvalidPath(_))
        ));
        assert!(matches!(store.download_blob("/etc/passwd"), Err(StoreError::InvalidPath(_))));
    }

    #[test]
    fn signed_urls_are_fetchable() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = signed_in(dir.path());
        let path = format!("{BLOB_PREFIX}/y.wav");
        store.upload_blob(&path, b"payload", false).unwrap();

        let url = store.create_signed_url(&path, Duration::from_secs(3600)).unwrap();
        assert!(url.starts_with("file://"));
        assert_eq!(fetch_bytes(&url).unwrap(), b"payload");
    }
}
