//! Source scheme dispatch. `spec.md` §4.3: `http(s)://`, `file://`,
//! absolute path; nothing else.

use std::path::{Path, PathBuf};

use futures::StreamExt;

use crate::error::{Result, StagerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    File,
    AbsolutePath,
}

pub fn classify(url: &str) -> Result<Scheme> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(Scheme::Http)
    } else if url.starts_with("file://") {
        Ok(Scheme::File)
    } else if Path::new(url).is_absolute() {
        Ok(Scheme::AbsolutePath)
    } else {
        Err(StagerError::UnsupportedScheme(url.to_string()))
    }
}

/// Resolve `url` into bytes on disk at `tmp_path`. For `http(s)://` this
/// streams the download; for `file://`/absolute paths this copies the
/// source (the original stays untouched so repeated stages of the same
/// path are always consistent).
pub async fn fetch_to(url: &str, tmp_path: &Path) -> Result<()> {
    match classify(url)? {
        Scheme::Http => fetch_http(url, tmp_path).await,
        Scheme::File => {
            let local = url.strip_prefix("file://").unwrap_or(url);
            tokio::fs::copy(local, tmp_path).await.map_err(StagerError::Io)?;
            Ok(())
        }
        Scheme::AbsolutePath => {
            tokio::fs::copy(url, tmp_path).await.map_err(StagerError::Io)?;
            Ok(())
        }
    }
}

async fn fetch_http(url: &str, tmp_path: &Path) -> Result<()> {
    let response = reqwest::get(url).await.map_err(|source| StagerError::Fetch {
        url: url.to_string(),
        source,
    })?;
    let response = response.error_for_status().map_err(|source| StagerError::Fetch {
        url: url.to_string(),
        source,
    })?;

    let mut file = tokio::fs::File::create(tmp_path).await.map_err(StagerError::Io)?;
    let mut stream = response.bytes_stream();
    use tokio::io::AsyncWriteExt;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|source| StagerError::Fetch {
            url: url.to_string(),
            source,
        })?;
        file.write_all(&chunk).await.map_err(StagerError::Io)?;
    }
    file.flush().await.map_err(StagerError::Io)?;
    Ok(())
}

pub fn artifact_name(url: &str) -> PathBuf {
    let local = url.rsplit('/').next().unwrap_or(url);
    PathBuf::from(if local.is_empty() { "artifact" } else { local })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_schemes() {
        assert_eq!(classify("https://x/y").unwrap(), Scheme::Http);
        assert_eq!(classify("file:///tmp/a").unwrap(), Scheme::File);
        assert_eq!(classify("/tmp/a").unwrap(), Scheme::AbsolutePath);
    }

    #[test]
    fn rejects_unknown_scheme() {
        assert!(classify("ftp://x/y").is_err());
        assert!(classify("relative/path").is_err());
    }

    #[tokio::test]
    async fn fetch_to_copies_local_file_scheme() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.img");
        std::fs::write(&src, b"disk image").unwrap();
        let dst = dir.path().join("dst.img");
        fetch_to(&format!("file://{}", src.display()), &dst).await.unwrap();
        assert_eq!(std::fs::read(&dst).unwrap(), b"disk image");
    }
}
