use anyhow::{bail, Context, Result};
use keihi_core::Transaction;
use std::path::{Path, PathBuf};

/// The working set of classified transactions between commands.
pub struct Session {
    path: PathBuf,
    pub transactions: Vec<Transaction>,
}

impl Session {
    pub fn new(path: PathBuf, transactions: Vec<Transaction>) -> Self {
        Self { path, transactions }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).with_context(|| {
            format!("read session {} (run `keihi import` first)", path.display())
        })?;
        let transactions = serde_json::from_slice(&bytes)
            .with_context(|| format!("parse session {}", path.display()))?;
        Ok(Self::new(path.to_path_buf(), transactions))
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create {}", parent.display()))?;
            }
        }
        let json = serde_json::to_vec_pretty(&self.transactions).context("serialize session")?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("write session {}", self.path.display()))?;
        Ok(())
    }

    /// Resolves every id up front so a typo leaves the session untouched.
    pub fn indices(&self, ids: &[String]) -> Result<Vec<usize>> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            match self.transactions.iter().position(|t| &t.id == id) {
                Some(i) => out.push(i),
                None => bail!("no transaction with id {id}"),
            }
        }
        Ok(out)
    }
}
