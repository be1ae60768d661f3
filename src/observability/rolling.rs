//! Rolling log files.
//!
//! # Naming
//! A path template `logs/app..log` receives the day stamp between the dots:
//! `logs/app.20260101.log`. A size rollover within the same day appends a
//! sequence: `logs/app.20260101_001.log`, `logs/app.20260101_002.log`, ...
//!
//! # Rollover
//! - Day boundary (local time): next write opens the new day's file
//! - Size: a write that would push a non-empty file past the cap goes to
//!   the next sequence instead
//! - Retention: after opening a file, the oldest files beyond the limit are
//!   deleted
//!
//! Nothing in this module logs through `tracing`; it runs inside the sink
//! router and must not re-enter it.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local, NaiveDate};

const MAX_SEQUENCE: u32 = 9_999;

/// Size, latency and retention bounds for one rolling file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollingLimits {
    pub max_bytes: u64,
    pub flush_interval: Duration,
    /// 0 keeps every file.
    pub retained_files: usize,
}

impl Default for RollingLimits {
    fn default() -> Self {
        Self {
            max_bytes: 104_857_600,
            flush_interval: Duration::from_secs(1),
            retained_files: 31,
        }
    }
}

/// A parsed `dir/stem.ext` path template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    source: String,
    dir: PathBuf,
    stem: String,
    extension: Option<String>,
}

impl PathTemplate {
    pub fn parse(template: &str) -> Self {
        let path = Path::new(template);
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let (stem, extension) = match file_name.rsplit_once('.') {
            Some((stem, ext)) if !ext.is_empty() => (stem.to_string(), Some(ext.to_string())),
            _ => (file_name, None),
        };

        Self {
            source: template.to_string(),
            dir,
            stem,
            extension,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn path_for(&self, day: NaiveDate, sequence: u32) -> PathBuf {
        let mut name = format!("{}{}", self.stem, day.format("%Y%m%d"));
        if sequence > 0 {
            name.push_str(&format!("_{sequence:03}"));
        }
        if let Some(ext) = &self.extension {
            name.push('.');
            name.push_str(ext);
        }
        self.dir.join(name)
    }

    /// True for files this template produced on any day.
    fn owns(&self, file_name: &str) -> bool {
        let Some(rest) = file_name.strip_prefix(&self.stem) else {
            return false;
        };
        let stamp = match &self.extension {
            Some(ext) => match rest.strip_suffix(ext).and_then(|r| r.strip_suffix('.')) {
                Some(stamp) => stamp,
                None => return false,
            },
            None => rest,
        };
        stamp.len() >= 8 && stamp.chars().all(|c| c.is_ascii_digit() || c == '_')
    }
}

struct ActiveFile {
    day: NaiveDate,
    sequence: u32,
    path: PathBuf,
    writer: BufWriter<File>,
    len: u64,
}

/// A buffered file writer that rolls over by day and by size.
pub struct RollingFile {
    template: PathTemplate,
    limits: RollingLimits,
    active: Option<ActiveFile>,
    last_flush: Instant,
}

impl RollingFile {
    pub fn new(template: &str, limits: RollingLimits) -> Self {
        Self {
            template: PathTemplate::parse(template),
            limits,
            active: None,
            last_flush: Instant::now(),
        }
    }

    pub fn template(&self) -> &str {
        self.template.source()
    }

    pub fn set_limits(&mut self, limits: RollingLimits) {
        self.limits = limits;
    }

    /// Path of the file currently open, if any.
    pub fn current_path(&self) -> Option<&Path> {
        self.active.as_ref().map(|active| active.path.as_path())
    }

    /// Append one rendered record.
    pub fn write(&mut self, record: &str, now: DateTime<Local>) -> io::Result<()> {
        let day = now.date_naive();
        let incoming = record.len() as u64;

        let roll_to = match &self.active {
            None => Some((day, 0)),
            Some(active) if active.day != day => Some((day, 0)),
            Some(active) if active.len > 0 && active.len + incoming > self.limits.max_bytes => {
                Some((day, active.sequence + 1))
            }
            Some(_) => None,
        };
        if let Some((day, sequence)) = roll_to {
            self.open(day, sequence)?;
        }

        let active = self
            .active
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "no active log file"))?;
        active.writer.write_all(record.as_bytes())?;
        active.len += incoming;

        if self.last_flush.elapsed() >= self.limits.flush_interval {
            self.flush()?;
        }
        Ok(())
    }

    /// Push buffered records to disk.
    pub fn flush(&mut self) -> io::Result<()> {
        self.last_flush = Instant::now();
        match self.active.as_mut() {
            Some(active) => active.writer.flush(),
            None => Ok(()),
        }
    }

    fn open(&mut self, day: NaiveDate, mut sequence: u32) -> io::Result<()> {
        if let Some(mut previous) = self.active.take() {
            previous.writer.flush()?;
        }
        if !self.template.dir.as_os_str().is_empty() {
            fs::create_dir_all(&self.template.dir)?;
        }

        let (path, len) = loop {
            let path = self.template.path_for(day, sequence);
            let len = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            if len >= self.limits.max_bytes && sequence < MAX_SEQUENCE {
                sequence += 1;
                continue;
            }
            break (path, len);
        };

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        self.active = Some(ActiveFile {
            day,
            sequence,
            path,
            writer: BufWriter::new(file),
            len,
        });
        self.enforce_retention();
        Ok(())
    }

    fn enforce_retention(&self) {
        let keep = self.limits.retained_files;
        if keep == 0 {
            return;
        }
        let dir = if self.template.dir.as_os_str().is_empty() {
            Path::new(".")
        } else {
            self.template.dir.as_path()
        };
        let Ok(entries) = fs::read_dir(dir) else {
            return;
        };

        let mut owned: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .filter(|entry| self.template.owns(&entry.file_name().to_string_lossy()))
            .map(|entry| entry.path())
            .collect();
        if owned.len() <= keep {
            return;
        }

        owned.sort();
        let excess = owned.len() - keep;
        let active = self.current_path();
        for path in owned.into_iter().take(excess) {
            if Some(path.as_path()) != active {
                let _ = fs::remove_file(path);
            }
        }
    }
}

impl Drop for RollingFile {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}
