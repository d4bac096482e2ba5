use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    time::SystemTime,
};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::Serialize;

/// A newsletter HTML file found in the local newsletter directory.
#[derive(Debug, Clone, Serialize)]
pub struct LocalNewsletter {
    pub filename: String,
    pub created: String,
    pub size: u64,
    pub location: String,
    #[serde(skip)]
    created_at: SystemTime,
}

/// `.html` files in `dir`, newest first. A missing directory lists as empty.
pub async fn list_local_newsletters(dir: &Path) -> Result<Vec<LocalNewsletter>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", dir.display()));
        }
    };

    let location = dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| dir.display().to_string());

    let mut newsletters = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let filename = entry.file_name().to_string_lossy().into_owned();
        if !filename.ends_with(".html") {
            continue;
        }
        let metadata = entry.metadata().await?;
        if !metadata.is_file() {
            continue;
        }
        let created_at = metadata
            .created()
            .or_else(|_| metadata.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);

        newsletters.push(LocalNewsletter {
            filename,
            created: DateTime::<Local>::from(created_at)
                .naive_local()
                .format("%Y-%m-%dT%H:%M:%S%.6f")
                .to_string(),
            size: metadata.len(),
            location: location.clone(),
            created_at,
        });
    }

    newsletters.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(newsletters)
}

/// Every entry name in `dir`, or `None` when the directory does not exist.
pub async fn directory_listing(dir: &Path) -> Result<Option<Vec<String>>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", dir.display()));
        }
    };

    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(Some(names))
}

/// Path of `id` inside `dir` with anything unsafe for a file name removed.
pub fn newsletter_path(dir: &Path, id: &str) -> PathBuf {
    dir.join(sanitize_filename::sanitize(id))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn lists_only_html_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("alphaminr_2024-05-01.html"), "<p>old</p>").unwrap();
        std::thread::sleep(Duration::from_millis(20));
        std::fs::write(dir.path().join("alphaminr_2024-05-02.html"), "<p>newer</p>").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "skip").unwrap();

        let listing = list_local_newsletters(dir.path()).await.unwrap();
        let names: Vec<_> = listing.iter().map(|n| n.filename.as_str()).collect();
        assert_eq!(names, ["alphaminr_2024-05-02.html", "alphaminr_2024-05-01.html"]);
        assert_eq!(listing[0].size, 12);
    }

    #[tokio::test]
    async fn missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(list_local_newsletters(&missing).await.unwrap().is_empty());
        assert!(directory_listing(&missing).await.unwrap().is_none());
    }

    #[test]
    fn newsletter_path_strips_traversal() {
        let path = newsletter_path(Path::new("newsletters"), "../../etc/passwd");
        assert_eq!(path.parent(), Some(Path::new("newsletters")));
    }
}
