//! Track identifiers (`GP_00001`) and where the next one comes from.
//!
//! Nothing here locks the output root. Two processes scanning the same root can
//! hand out the same UID; use [`FixedUidSequence`] with an externally
//! coordinated number when that matters.

use std::{fs, path::PathBuf};

use tracing::debug;

use crate::error::Result;

pub fn format_uid(prefix: &str, number: u32, padding: usize) -> String {
    format!("{prefix}_{number:0padding$}")
}

/// Numeric suffix of a directory or UID named `{prefix}_{n}[_...]`.
pub fn parse_uid_number(name: &str, prefix: &str) -> Option<u32> {
    let rest = name.strip_prefix(prefix)?.strip_prefix('_')?;
    rest.split('_').next()?.parse().ok()
}

pub trait UidSequence {
    fn next_uid(&mut self) -> Result<String>;
}

/// `max(existing suffix under the output root) + 1`.
///
/// Track directories are looked for one and two levels down, so both
/// `root/GP_00007_...` and `root/Batch_x/GP_00007_...` count. The root is only
/// scanned once; later calls keep counting in memory.
#[derive(Clone, Debug)]
pub struct ScanningUidSequence {
    root: PathBuf,
    prefix: String,
    padding: usize,
    last: Option<u32>,
}

impl ScanningUidSequence {
    pub fn new(root: impl Into<PathBuf>, prefix: impl Into<String>, padding: usize) -> Self {
        Self {
            root: root.into(),
            prefix: prefix.into(),
            padding,
            last: None,
        }
    }

    /// Highest suffix currently on disk, 0 if none.
    pub fn scan_max(&self) -> Result<u32> {
        let mut max = 0;
        if !self.root.is_dir() {
            return Ok(max);
        }

        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            if let Some(n) = parse_uid_number(&name.to_string_lossy(), &self.prefix) {
                max = max.max(n);
            }
            for child in fs::read_dir(entry.path())? {
                let child = child?;
                if !child.file_type()?.is_dir() {
                    continue;
                }
                if let Some(n) = parse_uid_number(&child.file_name().to_string_lossy(), &self.prefix)
                {
                    max = max.max(n);
                }
            }
        }

        Ok(max)
    }
}

impl UidSequence for ScanningUidSequence {
    fn next_uid(&mut self) -> Result<String> {
        let last = match self.last {
            Some(n) => n,
            None => {
                let n = self.scan_max()?;
                debug!(root = %self.root.display(), max = n, "scanned existing UIDs");
                n
            }
        };
        let next = last + 1;
        self.last = Some(next);
        Ok(format_uid(&self.prefix, next, self.padding))
    }
}

/// Counts up from a caller-supplied number without looking at the disk.
#[derive(Clone, Debug)]
pub struct FixedUidSequence {
    prefix: String,
    next: u32,
    padding: usize,
}

impl FixedUidSequence {
    pub fn new(prefix: impl Into<String>, first: u32, padding: usize) -> Self {
        Self {
            prefix: prefix.into(),
            next: first,
            padding,
        }
    }
}

impl UidSequence for FixedUidSequence {
    fn next_uid(&mut self) -> Result<String> {
        let uid = format_uid(&self.prefix, self.next, self.padding);
        self.next += 1;
        Ok(uid)
    }
}
