use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde_json::Value;
use zip::ZipArchive;

use crate::error::Result;
use crate::host::Lineage;
use crate::models::{BuildRef, REPORT_ARCHIVE_NAME};

const HISTORY_DIR: &str = "history";
const HISTORY_FILE: &str = "history.json";

/// A prior report whose archive carries non-empty trend history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRef {
    pub build: BuildRef,
    pub archive: PathBuf,
    pub report_name: String,
}

/// Finds the nearest previous completed build with non-empty history.
///
/// Unreadable candidates are skipped; this never fails.
pub fn locate<L: Lineage>(lineage: &L, build: &BuildRef, report_name: &str) -> Option<HistoryRef> {
    lineage.ancestors(build).find_map(|candidate| {
        let archive = candidate.artifacts_dir.join(REPORT_ARCHIVE_NAME);
        match has_history(&archive, report_name) {
            Ok(true) => {
                info!("Using history of build #{}", candidate.number);
                Some(HistoryRef {
                    build: candidate,
                    archive,
                    report_name: report_name.to_string(),
                })
            }
            Ok(false) => {
                debug!("Build #{} has no history, skipping", candidate.number);
                None
            }
            Err(e) => {
                debug!("Skipping build #{}: {e}", candidate.number);
                None
            }
        }
    })
}

fn has_history(archive: &Path, report_name: &str) -> Result<bool> {
    if !archive.is_file() {
        return Ok(false);
    }

    let mut zip = ZipArchive::new(File::open(archive)?)?;
    let wanted = format!("{report_name}/{HISTORY_DIR}/{HISTORY_FILE}");
    if zip.file_names().filter(|name| *name == wanted).count() != 1 {
        return Ok(false);
    }

    let history: Value = serde_json::from_reader(zip.by_name(&wanted)?)?;
    Ok(match history {
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
        _ => false,
    })
}

/// Copies `<report>/history/*` of the located archive into `results_dir/history/`.
///
/// Returns the number of files written.
pub fn copy_history(history: &HistoryRef, results_dir: &Path) -> Result<usize> {
    let mut zip = ZipArchive::new(File::open(&history.archive)?)?;
    let prefix = Path::new(&history.report_name);
    let mut copied = 0;

    for index in 0..zip.len() {
        let mut entry = zip.by_index(index)?;
        if entry.is_dir() {
            continue;
        }
        let Some(relative) = entry
            .enclosed_name()
            .and_then(|name| name.strip_prefix(prefix).ok().map(Path::to_path_buf))
        else {
            continue;
        };
        if !relative.starts_with(HISTORY_DIR) {
            continue;
        }

        let target = results_dir.join(&relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        io::copy(&mut entry, &mut File::create(&target)?)?;
        copied += 1;
    }

    debug!(
        "Copied {copied} history files from build #{} into {}",
        history.build.number,
        results_dir.display()
    );
    Ok(copied)
}
