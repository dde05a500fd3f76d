//! Polling change detection over the script directory, run once per frame.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use walkdir::WalkDir;

use super::error::ScanError;
use super::importer::Importer;
use super::instance::ScriptInstance;

/// A non-empty file seen during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub name: String,
    pub modified: SystemTime,
}

/// Walks `root` recursively and returns every regular, non-empty file.
///
/// Only an unreadable `root` is an error. Entries that vanish or cannot be
/// stat'ed mid-walk are logged and skipped.
pub fn collect_sources(root: &Path) -> Result<Vec<SourceFile>, ScanError> {
    let mut out = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => {
                return Err(ScanError { path: root.to_path_buf(), source: err.into() });
            }
            Err(err) => {
                tracing::warn!(root = %root.display(), "skipping directory entry: {err}");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(err) => {
                tracing::warn!(file = %entry.path().display(), "skipping file without metadata: {err}");
                continue;
            }
        };
        // An empty file is most likely still being written.
        if metadata.len() == 0 {
            continue;
        }
        let Ok(modified) = metadata.modified() else {
            continue;
        };
        let Some(name) = entry.path().file_stem().and_then(|stem| stem.to_str()).map(str::to_string) else {
            continue;
        };
        out.push(SourceFile { path: entry.into_path(), name, modified });
    }
    Ok(out)
}

/// Reloads every instance whose source file changed after it was last loaded.
/// Returns the number of reloads attempted.
pub fn scan(root: &Path, instances: &mut [ScriptInstance], importer: &Importer) -> Result<usize, ScanError> {
    let sources = collect_sources(root)?;
    let mut attempted = 0;
    for source in &sources {
        for instance in instances.iter_mut().filter(|instance| instance.name() == source.name) {
            let stale = instance.load_time().map_or(true, |loaded| loaded < source.modified);
            if stale {
                tracing::debug!(script = %instance.name(), file = %source.path.display(), "source changed");
                attempted += 1;
                let _ = instance.reload(importer);
            }
        }
    }
    Ok(attempted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn nested_files_are_found_and_empty_ones_skipped() {
        let dir = TempDir::new().expect("temp dir");
        fs::create_dir_all(dir.path().join("libraries/util")).expect("mkdir");
        fs::write(dir.path().join("Smiley.rhai"), "fn OnUpdate() {}").expect("write");
        fs::write(dir.path().join("libraries/util/math.rhai"), "fn double(x) { x * 2 }").expect("write");
        fs::write(dir.path().join("Pending.rhai"), "").expect("write");

        let mut names: Vec<String> =
            collect_sources(dir.path()).expect("scan").into_iter().map(|source| source.name).collect();
        names.sort();

        assert_eq!(names, vec!["Smiley".to_string(), "math".to_string()]);
    }

    #[test]
    fn unreadable_root_is_a_scan_error() {
        let dir = TempDir::new().expect("temp dir");
        let missing = dir.path().join("absent");

        let err = collect_sources(&missing).expect_err("missing root must fail");

        assert_eq!(err.path, missing);
        assert_eq!(err.source.kind(), std::io::ErrorKind::NotFound);
    }
}
