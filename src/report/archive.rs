use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Local, Timelike};
use sha1::{Digest, Sha1};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::error::{GateError, Result};

/// Zips `workspace/report_dir` into `workspace/archive_name`.
///
/// Entries are rooted at the report directory's base name. An archive of the
/// same name is replaced.
pub fn create_archive(workspace: &Path, report_dir: &str, archive_name: &str) -> Result<PathBuf> {
    let report = workspace.join(report_dir);
    if !report.is_dir() {
        return Err(GateError::ReportDirectoryNotFound(report));
    }

    let archive = workspace.join(archive_name);
    if archive.exists() {
        fs::remove_file(&archive)?;
    }

    let base = report.parent().unwrap_or(workspace);
    let mut zip = ZipWriter::new(BufWriter::new(File::create(&archive)?));

    for entry in WalkDir::new(&report).sort_by_file_name() {
        let entry = entry?;
        let Some(name) = entry_name(base, entry.path()) else {
            continue;
        };
        let options = SimpleFileOptions::default().last_modified_time(modified_time(&entry)?);

        if entry.file_type().is_dir() {
            zip.add_directory(name, options)?;
        } else {
            zip.start_file(name, options)?;
            io::copy(&mut File::open(entry.path())?, &mut zip)?;
        }
    }

    zip.finish()?.flush()?;
    Ok(archive)
}

/// Hex-encoded SHA-1 of a file.
pub fn sha1_file(path: &Path) -> Result<String> {
    let mut hasher = Sha1::new();
    io::copy(&mut File::open(path)?, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

pub fn sha1_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha1::digest(bytes))
}

/// Copies a directory tree, replacing `target` if it exists.
pub fn copy_tree(source: &Path, target: &Path) -> Result<()> {
    if target.exists() {
        fs::remove_dir_all(target)?;
    }

    for entry in WalkDir::new(source) {
        let entry = entry?;
        let Ok(relative) = entry.path().strip_prefix(source) else {
            continue;
        };
        let destination = target.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&destination)?;
        } else {
            fs::copy(entry.path(), &destination)?;
        }
    }
    Ok(())
}

fn entry_name(base: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(base).ok()?;
    let parts: Vec<_> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

fn modified_time(entry: &walkdir::DirEntry) -> Result<zip::DateTime> {
    let modified: DateTime<Local> = entry.metadata()?.modified()?.into();

    #[allow(clippy::cast_possible_truncation)]
    let time = zip::DateTime::from_date_and_time(
        u16::try_from(modified.year()).unwrap_or(1980),
        modified.month() as u8,
        modified.day() as u8,
        modified.hour() as u8,
        modified.minute() as u8,
        modified.second() as u8,
    )
    // Outside the 1980..=2107 range zip timestamps can express.
    .unwrap_or_default();

    Ok(time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use zip::ZipArchive;

    fn report_tree(workspace: &Path) {
        let report = workspace.join("out/allure-report");
        fs::create_dir_all(report.join("widgets")).unwrap();
        fs::create_dir_all(report.join("data")).unwrap();
        fs::write(report.join("index.html"), "<html/>").unwrap();
        fs::write(report.join("widgets/summary.json"), r#"{"passed":1}"#).unwrap();
    }

    #[test]
    fn test_archive_rooted_at_report_name() {
        let dir = tempfile::tempdir().unwrap();
        report_tree(dir.path());

        let archive = create_archive(dir.path(), "out/allure-report", "allure-report.zip").unwrap();

        let mut zip = ZipArchive::new(File::open(&archive).unwrap()).unwrap();
        let mut names: Vec<String> = zip.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "allure-report/",
                "allure-report/data/",
                "allure-report/index.html",
                "allure-report/widgets/",
                "allure-report/widgets/summary.json",
            ]
        );
        assert!(zip.by_name("allure-report/data/").unwrap().is_dir());

        let mut content = String::new();
        zip.by_name("allure-report/widgets/summary.json")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, r#"{"passed":1}"#);
    }

    #[test]
    fn test_file_entries_carry_source_mtime() {
        let dir = tempfile::tempdir().unwrap();
        report_tree(dir.path());
        let source = dir.path().join("out/allure-report/index.html");
        let mtime = std::time::UNIX_EPOCH + std::time::Duration::from_secs(1_600_000_000);
        File::options()
            .write(true)
            .open(&source)
            .unwrap()
            .set_modified(mtime)
            .unwrap();

        let archive = create_archive(dir.path(), "out/allure-report", "allure-report.zip").unwrap();

        let mut zip = ZipArchive::new(File::open(&archive).unwrap()).unwrap();
        let stored = zip
            .by_name("allure-report/index.html")
            .unwrap()
            .last_modified()
            .unwrap();
        let expected: DateTime<Local> = mtime.into();
        assert_eq!(
            (stored.year(), stored.month(), stored.day()),
            (expected.year() as u16, expected.month() as u8, expected.day() as u8)
        );
        assert_eq!(
            (stored.hour(), stored.minute(), stored.second()),
            (expected.hour() as u8, expected.minute() as u8, expected.second() as u8)
        );
    }

    #[test]
    fn test_archive_replaces_existing() {
        let dir = tempfile::tempdir().unwrap();
        report_tree(dir.path());
        fs::write(dir.path().join("allure-report.zip"), b"stale").unwrap();

        let archive = create_archive(dir.path(), "out/allure-report", "allure-report.zip").unwrap();

        assert!(ZipArchive::new(File::open(archive).unwrap()).is_ok());
    }

    #[test]
    fn test_missing_report_directory() {
        let dir = tempfile::tempdir().unwrap();

        let err = create_archive(dir.path(), "missing", "allure-report.zip").unwrap_err();

        assert!(matches!(err, GateError::ReportDirectoryNotFound(_)));
    }

    #[test]
    fn test_sha1_file_matches_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob");
        fs::write(&path, b"abc").unwrap();

        let digest = sha1_file(&path).unwrap();

        assert_eq!(digest, "a9993e364706816aba3e25717850c26c9cd0d89d");
        assert_eq!(digest, sha1_bytes(b"abc"));
    }

    #[test]
    fn test_copy_tree_replaces_target() {
        let dir = tempfile::tempdir().unwrap();
        report_tree(dir.path());
        let target = dir.path().join("copy");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("stale.txt"), "x").unwrap();

        copy_tree(&dir.path().join("out/allure-report"), &target).unwrap();

        assert!(target.join("widgets/summary.json").is_file());
        assert!(target.join("data").is_dir());
        assert!(!target.join("stale.txt").exists());
    }
}
