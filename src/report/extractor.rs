use std::fs::{self, File};
use std::io::{ErrorKind, Read};
use std::path::PathBuf;

use log::debug;
use serde_json::Value;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::error::Result;
use crate::models::{BuildRef, BuildSummary, ReportLocation};

const KEY_STATISTIC: &str = "statistic";

/// Summary candidates of the Allure 3 report layouts, most specific first.
const V3_CANDIDATES: &[&str] = &[
    "awesome/widgets/statistic.json",
    "widgets/statistic.json",
    "awesome/export/summary.json",
    "awesome/widgets/summary.json",
    "export/summary.json",
    "widgets/summary.json",
];

const V2_CANDIDATES: &[&str] = &["export/summary.json", "widgets/summary.json"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportVersion {
    #[default]
    V2,
    V3,
}

impl ReportVersion {
    pub fn from_major(major: u32) -> Self {
        if major >= 3 {
            Self::V3
        } else {
            Self::V2
        }
    }

    pub fn candidates(self) -> &'static [&'static str] {
        match self {
            Self::V2 => V2_CANDIDATES,
            Self::V3 => V3_CANDIDATES,
        }
    }
}

/// Extracts the report summary of `build`, falling back to the empty summary.
pub fn extract(build: &BuildRef, report_name: &str, version: ReportVersion) -> BuildSummary {
    extract_located(build, report_name, version).unwrap_or(BuildSummary::EMPTY)
}

/// Like [`extract`], but tells "no summary anywhere" apart from a real summary.
pub fn extract_located(
    build: &BuildRef,
    report_name: &str,
    version: ReportVersion,
) -> Option<BuildSummary> {
    let locations = [
        ReportLocation::archive(build, report_name),
        ReportLocation::directory(build, report_name),
    ];

    locations.iter().find_map(|location| {
        match open_source(location).and_then(|source| first_summary(source, version)) {
            Ok(found) => found,
            Err(e) => {
                debug!(
                    "Unable to read Allure summary from {} for {report_name}: {e}",
                    location.path().display()
                );
                None
            }
        }
    })
}

/// Parses either the bare statistic object or one wrapped under `statistic`.
pub fn parse_summary(bytes: &[u8]) -> Result<BuildSummary> {
    let root: Value = serde_json::from_slice(bytes)?;
    let statistic = match root.get(KEY_STATISTIC) {
        Some(inner) if !inner.is_null() => inner,
        _ => &root,
    };

    let counter = |key: &str| statistic.get(key).and_then(counter_value).unwrap_or(0);

    Ok(BuildSummary::new(
        counter("passed"),
        counter("failed"),
        counter("broken"),
        counter("skipped"),
        counter("unknown"),
    ))
}

/// Integers, floats (truncated) and numeric strings; negatives count as 0.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn counter_value(value: &Value) -> Option<u64> {
    let lenient = |number: f64| (number.is_finite() && number >= 0.0).then(|| number.trunc() as u64);
    match value {
        Value::Number(number) => number.as_u64().or_else(|| number.as_f64().and_then(lenient)),
        Value::String(text) => {
            let text = text.trim();
            text.parse::<u64>()
                .ok()
                .or_else(|| text.parse::<f64>().ok().and_then(lenient))
        }
        _ => None,
    }
}

/// Read access to report files relative to the report root.
trait ReportSource {
    /// `Ok(None)` when the file is absent.
    fn read(&mut self, relative: &str) -> Result<Option<Vec<u8>>>;
}

struct ArchiveSource {
    archive: ZipArchive<File>,
    root: String,
}

impl ReportSource for ArchiveSource {
    fn read(&mut self, relative: &str) -> Result<Option<Vec<u8>>> {
        let name = format!("{}/{relative}", self.root);
        let mut entry = match self.archive.by_name(&name) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes)?;
        Ok(Some(bytes))
    }
}

struct DirectorySource {
    root: PathBuf,
}

impl ReportSource for DirectorySource {
    fn read(&mut self, relative: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.root.join(relative)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Opens a location, `Ok(None)` when it does not exist at all.
fn open_source(location: &ReportLocation) -> Result<Option<Box<dyn ReportSource>>> {
    match location {
        ReportLocation::Archive { archive, root } => {
            if !archive.is_file() {
                return Ok(None);
            }
            let archive = ZipArchive::new(File::open(archive)?)?;
            Ok(Some(Box::new(ArchiveSource {
                archive,
                root: root.clone(),
            })))
        }
        ReportLocation::Directory(dir) => {
            if !dir.is_dir() {
                return Ok(None);
            }
            Ok(Some(Box::new(DirectorySource { root: dir.clone() })))
        }
    }
}

/// Walks the candidate list in order; unreadable or malformed candidates are misses.
fn first_summary(
    source: Option<Box<dyn ReportSource>>,
    version: ReportVersion,
) -> Result<Option<BuildSummary>> {
    let Some(mut source) = source else {
        return Ok(None);
    };

    for candidate in version.candidates() {
        let parsed = source
            .read(candidate)
            .and_then(|bytes| bytes.map(|b| parse_summary(&b)).transpose());

        match parsed {
            Ok(Some(summary)) => {
                debug!("Allure summary found at {candidate}");
                return Ok(Some(summary));
            }
            Ok(None) => {}
            Err(e) => debug!("Skipping malformed summary candidate {candidate}: {e}"),
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::Path;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn build_in(dir: &Path) -> BuildRef {
        BuildRef::new(1, dir.join("build"), dir.join("build/archive"))
    }

    fn write_archive(build: &BuildRef, entries: &[(&str, &str)]) {
        fs::create_dir_all(&build.artifacts_dir).unwrap();
        let file = File::create(build.artifacts_dir.join("allure-report.zip")).unwrap();
        let mut zip = ZipWriter::new(file);
        for (name, content) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    fn write_directory(build: &BuildRef, entries: &[(&str, &str)]) {
        for (name, content) in entries {
            let path = build.root_dir.join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
    }

    #[test]
    fn test_v3_statistic_in_archive() {
        let dir = tempfile::tempdir().unwrap();
        let build = build_in(dir.path());
        write_archive(&build, &[("report/widgets/statistic.json", r#"{"passed":3,"failed":1}"#)]);

        let summary = extract(&build, "report", ReportVersion::V3);

        assert_eq!(summary, BuildSummary::new(3, 1, 0, 0, 0));
    }

    #[test]
    fn test_nothing_found_is_empty_summary() {
        let dir = tempfile::tempdir().unwrap();
        let build = build_in(dir.path());

        assert_eq!(extract(&build, "report", ReportVersion::V3), BuildSummary::EMPTY);
        assert_eq!(extract_located(&build, "report", ReportVersion::V2), None);
    }

    #[test]
    fn test_wrapped_statistic_with_nulls() {
        let summary =
            parse_summary(br#"{"statistic":{"passed":5,"failed":null,"broken":2}}"#).unwrap();

        assert_eq!(summary, BuildSummary::new(5, 0, 2, 0, 0));
    }

    #[test]
    fn test_null_wrapper_falls_back_to_root() {
        let summary = parse_summary(br#"{"statistic":null,"passed":4}"#).unwrap();

        assert_eq!(summary, BuildSummary::new(4, 0, 0, 0, 0));
    }

    #[test]
    fn test_v2_ignores_v3_locations() {
        let dir = tempfile::tempdir().unwrap();
        let build = build_in(dir.path());
        write_archive(
            &build,
            &[
                ("report/widgets/statistic.json", r#"{"passed":9}"#),
                ("report/widgets/summary.json", r#"{"statistic":{"passed":2,"skipped":1}}"#),
            ],
        );

        let summary = extract(&build, "report", ReportVersion::V2);

        assert_eq!(summary, BuildSummary::new(2, 0, 0, 1, 0));
    }

    #[test]
    fn test_candidate_order_prefers_export_summary() {
        let dir = tempfile::tempdir().unwrap();
        let build = build_in(dir.path());
        write_archive(
            &build,
            &[
                ("report/widgets/summary.json", r#"{"passed":1}"#),
                ("report/export/summary.json", r#"{"passed":2}"#),
            ],
        );

        assert_eq!(extract(&build, "report", ReportVersion::V2).passed(), 2);
    }

    #[test]
    fn test_malformed_candidate_falls_through() {
        let dir = tempfile::tempdir().unwrap();
        let build = build_in(dir.path());
        write_archive(
            &build,
            &[
                ("report/export/summary.json", "{not json"),
                ("report/widgets/summary.json", r#"{"failed":4}"#),
            ],
        );

        assert_eq!(extract(&build, "report", ReportVersion::V2).failed(), 4);
    }

    #[test]
    fn test_directory_strategy_when_archive_misses() {
        let dir = tempfile::tempdir().unwrap();
        let build = build_in(dir.path());
        write_archive(&build, &[("report/index.html", "<html/>")]);
        write_directory(&build, &[("report/awesome/widgets/statistic.json", r#"{"broken":6}"#)]);

        assert_eq!(extract(&build, "report", ReportVersion::V3).broken(), 6);
    }

    #[test]
    fn test_corrupt_archive_falls_back_to_directory() {
        let dir = tempfile::tempdir().unwrap();
        let build = build_in(dir.path());
        fs::create_dir_all(&build.artifacts_dir).unwrap();
        fs::write(build.artifacts_dir.join("allure-report.zip"), b"not a zip").unwrap();
        write_directory(&build, &[("report/export/summary.json", r#"{"unknown":2}"#)]);

        assert_eq!(
            extract_located(&build, "report", ReportVersion::V2),
            Some(BuildSummary::new(0, 0, 0, 0, 2))
        );
    }

    #[test]
    fn test_counters_accept_floats_and_numeric_strings() {
        let summary = parse_summary(
            br#"{"passed":"5","failed":2.0,"broken":-3,"skipped":" 4 ","unknown":true}"#,
        )
        .unwrap();

        assert_eq!(summary, BuildSummary::new(5, 2, 0, 4, 0));
    }

    #[test]
    fn test_version_from_major() {
        assert_eq!(ReportVersion::from_major(1), ReportVersion::V2);
        assert_eq!(ReportVersion::from_major(2), ReportVersion::V2);
        assert_eq!(ReportVersion::from_major(3), ReportVersion::V3);
        assert_eq!(ReportVersion::from_major(4), ReportVersion::V3);
        assert!(V3_CANDIDATES.ends_with(V2_CANDIDATES));
    }
}
