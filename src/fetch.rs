use std::path::PathBuf;

use chrono::Utc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP request to {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Link expired: {0}")]
    Expired(String),
}

/// Fetch raw bytes from an `http(s)://` URL, a `file://` URL or a plain path.
///
/// `file://` URLs may carry an `expires=<unix seconds>` query parameter (the
/// form issued by the local store's signed URLs); expired links are refused.
pub fn fetch_bytes(source: &str) -> Result<Vec<u8>, FetchError> {
    if source.starts_with("http://") || source.starts_with("https://") {
        return fetch_http(source);
    }

    let (path_part, query) = match source.strip_prefix("file://") {
        Some(rest) => match rest.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (rest, None),
        },
        None => (source, None),
    };

    if let Some(expires) = query.and_then(expires_param) {
        if Utc::now().timestamp() > expires {
            return Err(FetchError::Expired(source.to_string()));
        }
    }

    let path = PathBuf::from(path_part);
    log::debug!("Reading {}", path.display());
    std::fs::read(&path).map_err(|source| FetchError::Io { path, source })
}

fn fetch_http(url: &str) -> Result<Vec<u8>, FetchError> {
    log::debug!("GET {}", url);
    let response = reqwest::blocking::get(url).map_err(|source| FetchError::Http {
        url: url.to_string(),
        source,
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let bytes = response.bytes().map_err(|source| FetchError::Http {
        url: url.to_string(),
        source,
    })?;
    Ok(bytes.to_vec())
}

fn expires_param(query: &str) -> Option<i64> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == "expires")
        .and_then(|(_, v)| v.parse().ok())
}
