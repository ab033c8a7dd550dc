use globset::{Glob, GlobMatcher};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Glob over source file names, e.g. `*Paper-1*`.
#[derive(Debug, Clone)]
pub struct FileFilter {
    matcher: GlobMatcher,
}

impl FileFilter {
    pub fn new(pattern: &str) -> Result<Self, globset::Error> {
        Ok(Self {
            matcher: Glob::new(pattern)?.compile_matcher(),
        })
    }

    pub fn matches(&self, path: &Path) -> bool {
        path.file_name()
            .is_some_and(|name| self.matcher.is_match(Path::new(name)))
    }
}

/// PDFs directly inside `folder`, sorted by path.
pub fn discover_pdf_files(folder: &Path, filter: Option<&FileFilter>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf && filter.map_or(true, |filter| filter.matches(entry.path())) {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn lists_top_level_pdfs_in_order() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("b.PDF"), b"")?;
        fs::write(dir.path().join("a.pdf"), b"")?;
        fs::write(dir.path().join("notes.txt"), b"")?;
        fs::create_dir(dir.path().join("nested"))?;
        fs::write(dir.path().join("nested").join("c.pdf"), b"")?;

        let names: Vec<_> = discover_pdf_files(dir.path(), None)
            .iter()
            .map(|path| file_name(path))
            .collect();
        assert_eq!(names, vec!["a.pdf", "b.PDF"]);
        Ok(())
    }

    #[test]
    fn filter_matches_file_names() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("2016_GCE-O-LEVEL-ENGLISH-1128-Paper-1.pdf"), b"")?;
        fs::write(dir.path().join("2016_GCE-O-LEVEL-ENGLISH-1128-Paper-2.pdf"), b"")?;

        let filter = FileFilter::new("*Paper-2*")?;
        let files = discover_pdf_files(dir.path(), Some(&filter));
        assert_eq!(files.len(), 1);
        assert_eq!(file_stem(&files[0]), "2016_GCE-O-LEVEL-ENGLISH-1128-Paper-2");
        assert!(FileFilter::new("[").is_err());
        Ok(())
    }
}
