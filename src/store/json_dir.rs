//! One pretty-printed `report_<ts>.json` file per cycle.

use std::fs;
use std::io::{BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::agent_log;
use crate::detection::report::{ReportListing, ReportSummary};
use crate::store::{ReportStore, StoreError};
use log::Level;

const PREFIX: &str = "report_";
const SUFFIX: &str = ".json";

#[derive(Debug, Clone)]
pub struct JsonDirStore {
    dir: PathBuf,
}

impl JsonDirStore {
    /// Use `dir`, creating it when missing.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        agent_log!(Level::Info, "store", "Report directory ready at {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, ts: i64) -> PathBuf {
        self.dir.join(format!("{PREFIX}{ts}{SUFFIX}"))
    }

    fn timestamp_of(path: &Path) -> Option<i64> {
        path.file_name()?
            .to_str()?
            .strip_prefix(PREFIX)?
            .strip_suffix(SUFFIX)?
            .parse()
            .ok()
    }

    fn load(path: &Path) -> Result<ReportSummary, StoreError> {
        let file = fs::File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}

impl ReportStore for JsonDirStore {
    fn exists(&self, ts: i64) -> Result<bool, StoreError> {
        Ok(self.path_for(ts).is_file())
    }

    fn write(&self, report: &ReportSummary) -> Result<(), StoreError> {
        let path = self.path_for(report.timestamp);
        // write-then-rename so readers never see a half-written report
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(report)?;
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&body)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        agent_log!(Level::Info, "store", "Saved report: {}", path.display());
        Ok(())
    }

    fn read(&self, ts: i64) -> Result<Option<ReportSummary>, StoreError> {
        match Self::load(&self.path_for(ts)) {
            Ok(r) => Ok(Some(r)),
            Err(StoreError::Io(e)) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn list(&self) -> Result<Vec<ReportListing>, StoreError> {
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.dir)?.flatten() {
            let path = entry.path();
            let Some(ts) = Self::timestamp_of(&path) else { continue };
            match Self::load(&path) {
                Ok(report) => {
                    let mut row = ReportListing::from(&report);
                    row.timestamp = ts;
                    out.push(row);
                }
                // unreadable reports are skipped, not fatal for the listing
                Err(e) => agent_log!(Level::Warn, "store", "Skipping {}: {}", path.display(), e),
            }
        }
        out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(out)
    }

    fn delete(&self, ts: i64) -> Result<bool, StoreError> {
        match fs::remove_file(self.path_for(ts)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn purge_older_than(&self, cutoff: i64) -> Result<usize, StoreError> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)?.flatten() {
            let path = entry.path();
            if Self::timestamp_of(&path).is_some_and(|ts| ts < cutoff) {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}
