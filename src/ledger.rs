use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::formats::{MasterRecord, StatusRecord};

/// Append-only record of every successful download.
#[derive(Debug, Clone)]
pub struct MasterLedger {
    path: PathBuf,
}

impl MasterLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row, writing the header only when the file is created.
    pub fn append(&self, record: &MasterRecord) -> anyhow::Result<()> {
        let write_header = !self.path.exists();

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create ledger dir: {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open master ledger: {}", self.path.display()))?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(write_header)
            .from_writer(file);
        writer.serialize(record).context("write master row")?;
        writer.flush().context("flush master ledger")?;

        Ok(())
    }
}

pub type StatusKey = (String, String);

/// Per-municipality crawl status, keyed by (census subdivision id, type).
/// Upserts rewrite the whole table, so one status file must never have
/// two concurrent writers.
#[derive(Debug, Clone)]
pub struct StatusLedger {
    path: PathBuf,
}

impl StatusLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> anyhow::Result<BTreeMap<StatusKey, StatusRecord>> {
        let mut table = BTreeMap::new();
        if !self.path.exists() {
            return Ok(table);
        }

        let mut reader = csv::Reader::from_path(&self.path)
            .with_context(|| format!("open status ledger: {}", self.path.display()))?;
        for row in reader.deserialize() {
            let record: StatusRecord = row.context("parse status row")?;
            let key = (
                record.census_subdivision_id.clone(),
                record.municipality_type.clone(),
            );
            table.insert(key, record);
        }

        Ok(table)
    }

    pub fn upsert(&self, record: StatusRecord) -> anyhow::Result<()> {
        let mut table = self.load().context("load status ledger")?;
        let key = (
            record.census_subdivision_id.clone(),
            record.municipality_type.clone(),
        );
        table.insert(key, record);

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create ledger dir: {}", parent.display()))?;
        }

        let mut writer = csv::Writer::from_path(&self.path)
            .with_context(|| format!("rewrite status ledger: {}", self.path.display()))?;
        for row in table.values() {
            writer.serialize(row).context("write status row")?;
        }
        writer.flush().context("flush status ledger")?;

        Ok(())
    }
}
