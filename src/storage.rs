use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::models::{CollectionMetadata, ScheduleData};

const METADATA_FILE: &str = "collection_metadata.json";
const METADATA_KEEP: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    None,
    Gzip,
}

/// Snapshot store: timestamped JSON files under one data directory, with a
/// `_latest` copy per term and a rolling collection-metadata log.
pub struct Storage {
    data_dir: PathBuf,
    compression: Compression,
}

impl Storage {
    pub fn new(data_dir: impl Into<PathBuf>, compression: Compression) -> Result<Self> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;
        Ok(Storage { data_dir, compression })
    }

    /// Write one snapshot as `schedule_{term_code}_{timestamp}.json[.gz]`
    /// and refresh the `_latest` copy. Returns the snapshot path.
    pub fn save_schedule(&self, schedule: &ScheduleData) -> Result<PathBuf> {
        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        let name = format!("schedule_{}_{}.json{}", schedule.term_code, stamp, self.ext());
        let path = self.data_dir.join(&name);

        let json = serde_json::to_string_pretty(schedule)?;
        self.write_bytes(&path, json.as_bytes())?;
        info!("saved {} courses to {}", schedule.total_courses, path.display());

        let latest = self
            .data_dir
            .join(format!("schedule_{}_latest.json{}", schedule.term_code, self.ext()));
        if let Err(e) = fs::copy(&path, &latest) {
            warn!("could not refresh latest copy: {e}");
        }

        Ok(path)
    }

    /// Load a snapshot, detecting gzip from the `.gz` extension.
    pub fn load_schedule(path: &Path) -> Result<ScheduleData> {
        let text = Self::read_text(path)?;
        serde_json::from_str(&text)
            .with_context(|| format!("failed to parse snapshot {}", path.display()))
    }

    /// Saved snapshots for a term (or all terms), newest first. The
    /// `_latest` copies are excluded.
    pub fn list_schedules(&self, term_code: Option<&str>) -> Result<Vec<PathBuf>> {
        let prefix = match term_code {
            Some(code) => format!("schedule_{code}_"),
            None => "schedule_".to_string(),
        };
        let mut files: Vec<PathBuf> = fs::read_dir(&self.data_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(&prefix) && n.contains(".json") && !n.contains("_latest"))
            })
            .collect();
        files.sort();
        files.reverse();
        Ok(files)
    }

    pub fn latest_schedule(&self, term_code: Option<&str>) -> Result<Option<PathBuf>> {
        Ok(self.list_schedules(term_code)?.into_iter().next())
    }

    /// Delete snapshots beyond the newest `keep`. The `_latest` copies and
    /// the metadata log are untouched. Returns how many files were removed.
    pub fn cleanup_old(&self, keep: usize) -> Result<usize> {
        let files = self.list_schedules(None)?;
        let mut removed = 0;
        for path in files.iter().skip(keep) {
            match fs::remove_file(path) {
                Ok(()) => {
                    info!("removed old snapshot {}", path.display());
                    removed += 1;
                }
                Err(e) => warn!("could not remove {}: {e}", path.display()),
            }
        }
        Ok(removed)
    }

    /// Append one run's metadata to the rolling log, keeping the tail.
    pub fn save_metadata(&self, metadata: &CollectionMetadata) -> Result<PathBuf> {
        let path = self.data_dir.join(METADATA_FILE);
        let mut entries: Vec<CollectionMetadata> = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_default(),
            Err(_) => Vec::new(),
        };
        entries.push(metadata.clone());
        if entries.len() > METADATA_KEEP {
            entries.drain(..entries.len() - METADATA_KEEP);
        }
        fs::write(&path, serde_json::to_string_pretty(&entries)?)?;
        Ok(path)
    }

    fn ext(&self) -> &'static str {
        match self.compression {
            Compression::None => "",
            Compression::Gzip => ".gz",
        }
    }

    fn write_bytes(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        match self.compression {
            Compression::None => {
                let mut file = file;
                file.write_all(bytes)?;
            }
            Compression::Gzip => {
                let mut enc = GzEncoder::new(file, flate2::Compression::default());
                enc.write_all(bytes)?;
                enc.finish()?;
            }
        }
        Ok(())
    }

    fn read_text(path: &Path) -> Result<String> {
        let mut text = String::new();
        let file =
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        if path.extension().is_some_and(|e| e == "gz") {
            GzDecoder::new(file).read_to_string(&mut text)?;
        } else {
            let mut file = file;
            file.read_to_string(&mut text)?;
        }
        Ok(text)
    }
}

// ── Tests ──
