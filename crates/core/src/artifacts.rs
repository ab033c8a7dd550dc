//! Extracted-text artifacts: one `<stem>-<YYYYmmdd-HHMMSS>.txt` per source file.

use chrono::{DateTime, NaiveDateTime, Utc};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub written_at: NaiveDateTime,
    pub modified: SystemTime,
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn ensure_dir(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await
    }

    pub fn file_name(stem: &str, at: DateTime<Utc>) -> String {
        format!("{stem}-{}.txt", at.format(TIMESTAMP_FORMAT))
    }

    /// Latest artifact written for `stem`, by the timestamp in its name.
    pub async fn latest(&self, stem: &str) -> io::Result<Option<Artifact>> {
        Ok(self
            .artifacts_for(stem)
            .await?
            .into_iter()
            .max_by(|left, right| left.written_at.cmp(&right.written_at)))
    }

    pub async fn write(&self, stem: &str, text: &str) -> io::Result<PathBuf> {
        self.write_at(stem, text, Utc::now()).await
    }

    /// Write a new artifact and remove the ones it supersedes.
    pub async fn write_at(&self, stem: &str, text: &str, at: DateTime<Utc>) -> io::Result<PathBuf> {
        self.ensure_dir().await?;
        let path = self.dir.join(Self::file_name(stem, at));
        tokio::fs::write(&path, text).await?;

        for stale in self.artifacts_for(stem).await? {
            if stale.path != path {
                debug!(path = %stale.path.display(), "removing superseded artifact");
                tokio::fs::remove_file(&stale.path).await?;
            }
        }

        Ok(path)
    }

    pub async fn read(&self, artifact: &Artifact) -> io::Result<String> {
        tokio::fs::read_to_string(&artifact.path).await
    }

    /// An artifact is fresh when it was written no earlier than the source was modified.
    pub async fn is_fresh(&self, artifact: &Artifact, source: &Path) -> io::Result<bool> {
        let source_modified = tokio::fs::metadata(source).await?.modified()?;
        Ok(artifact.modified >= source_modified)
    }

    pub async fn count(&self) -> io::Result<usize> {
        let mut count = 0;
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(error) => return Err(error),
        };
        while let Some(entry) = entries.next_entry().await? {
            let is_text = entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"));
            if is_text {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn artifacts_for(&self, stem: &str) -> io::Result<Vec<Artifact>> {
        let mut found = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(found),
            Err(error) => return Err(error),
        };

        let prefix = format!("{stem}-");
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let Some(written_at) = name
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(".txt"))
                .and_then(|stamp| NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok())
            else {
                continue;
            };

            found.push(Artifact {
                path: entry.path(),
                written_at,
                modified: entry.metadata().await?.modified()?,
            });
        }

        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::fs::{self, File};
    use std::time::Duration;
    use tempfile::tempdir;

    fn at(second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 7, 16, 43, second)
            .single()
            .expect("valid timestamp")
    }

    #[test]
    fn names_are_deterministic() {
        assert_eq!(
            ArtifactStore::file_name("2016_GCE-O-LEVEL-ENGLISH-1128-Paper-1", at(30)),
            "2016_GCE-O-LEVEL-ENGLISH-1128-Paper-1-20251107-164330.txt"
        );
    }

    #[tokio::test]
    async fn latest_prefers_newest_and_write_prunes_older() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = ArtifactStore::new(dir.path().join("texts"));
        assert!(store.latest("paper").await?.is_none());

        store.write_at("paper", "old", at(1)).await?;
        let newest = store.write_at("paper", "new", at(2)).await?;

        let latest = store.latest("paper").await?.expect("artifact exists");
        assert_eq!(latest.path, newest);
        assert_eq!(store.read(&latest).await?, "new");
        assert_eq!(store.count().await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn stems_sharing_a_prefix_are_kept_apart() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = ArtifactStore::new(dir.path());
        store.write_at("Paper-1", "one", at(1)).await?;
        store.write_at("Paper-1-extra", "extra", at(2)).await?;

        let latest = store.latest("Paper-1").await?.expect("artifact exists");
        assert_eq!(store.read(&latest).await?, "one");
        assert_eq!(store.count().await?, 2);
        Ok(())
    }

    #[tokio::test]
    async fn freshness_compares_modification_times() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let source = dir.path().join("paper.pdf");
        fs::write(&source, b"%PDF-1.4")?;
        File::options()
            .write(true)
            .open(&source)?
            .set_modified(SystemTime::now() - Duration::from_secs(60))?;

        let store = ArtifactStore::new(dir.path().join("texts"));
        store.write("paper", "text").await?;
        let artifact = store.latest("paper").await?.expect("artifact exists");
        assert!(store.is_fresh(&artifact, &source).await?);

        File::options()
            .write(true)
            .open(&source)?
            .set_modified(SystemTime::now() + Duration::from_secs(60))?;
        assert!(!store.is_fresh(&artifact, &source).await?);
        Ok(())
    }
}
