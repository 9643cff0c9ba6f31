use anyhow::{bail, Context, Result};
use chrono::{Local, Utc};
use keihi_core::{category_name, ExpenseCategory, Transaction, EXPENSE_CATEGORIES};
use keihi_import::{
    default_file_name, export_confirmed, CsvIngestor, ExpenseClassifier, ExportError, MemoPicker,
    RandomPicker,
};
use keihi_storage::{LearningRepository, LearningStore};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::session::Session;

/// Everything a command needs: the learning store, the import pipeline and
/// where the current session lives.
pub struct Workspace<R, P = RandomPicker> {
    pub store: LearningStore<R>,
    pub ingestor: CsvIngestor,
    pub classifier: ExpenseClassifier<P>,
    pub session_path: PathBuf,
}

fn describe(t: &Transaction) -> String {
    let category = t.category.as_deref().unwrap_or("-");
    format!(
        "{}  {}  {}  ¥{}  {} {}  [{} {:.2}]  {}{}",
        t.id,
        t.date,
        t.merchant,
        t.amount,
        category,
        category_name(category),
        t.confidence_level(),
        t.confidence,
        t.memo.as_deref().unwrap_or(""),
        if t.is_confirmed { "  ✓" } else { "" },
    )
}

impl<R: LearningRepository, P: MemoPicker> Workspace<R, P> {
    fn session(&self) -> Result<Session> {
        Session::load(&self.session_path)
    }

    /// Reads a statement, classifies every row and replaces the session.
    pub async fn import(&self, csv: &Path, out: &mut impl Write) -> Result<()> {
        let report = self
            .ingestor
            .ingest_file(csv)
            .with_context(|| format!("import {}", csv.display()))?;

        let learned = self.store.snapshot().await;
        let results = self.classifier.classify_batch(&report.transactions, &learned);
        let now = Utc::now();

        let mut transactions = Vec::with_capacity(results.len());
        for (index, (txn, result)) in report.transactions.iter().zip(results).enumerate() {
            let history = result.learning_record.as_ref().map(|r| r.history_line());
            let record = Transaction::classified(index, txn, result, now);
            writeln!(out, "{}", describe(&record))?;
            if let Some(history) = history {
                writeln!(out, "    {history}")?;
            }
            transactions.push(record);
        }

        writeln!(
            out,
            "{} transactions from {} ({}, {} rows skipped)",
            transactions.len(),
            csv.display(),
            report.encoding,
            report.rejected
        )?;

        Session::new(self.session_path.clone(), transactions).save()
    }

    /// Assigns `code` to every listed transaction. Without an explicit memo
    /// each one gets a fresh template memo for the new category.
    pub fn set_category(
        &self,
        code: &str,
        ids: &[String],
        memo: Option<&str>,
        out: &mut impl Write,
    ) -> Result<()> {
        let Some(category) = ExpenseCategory::lookup(code) else {
            bail!("unknown category code {code} (see `keihi categories`)");
        };
        let mut session = self.session()?;
        let now = Utc::now();
        for i in session.indices(ids)? {
            let t = &mut session.transactions[i];
            let memo = match memo {
                Some(m) => m.to_string(),
                None => self.classifier.memo_for(category.code, t.amount),
            };
            t.set_category(category.code, memo, now);
            writeln!(out, "{}", describe(t))?;
        }
        session.save()
    }

    /// Sets the memo. Without one, reuses the memo last confirmed for the
    /// same merchant.
    pub async fn set_memo(&self, id: &str, memo: Option<&str>, out: &mut impl Write) -> Result<()> {
        let mut session = self.session()?;
        let i = session.indices(&[id.to_string()])?[0];
        let t = &mut session.transactions[i];
        let memo = match memo {
            Some(m) => m.to_string(),
            None => match self.store.memo_suggestions(&t.merchant).await.into_iter().next() {
                Some(m) => m,
                None => bail!("no learned memo for {}; pass one explicitly", t.merchant),
            },
        };
        t.set_memo(memo, Utc::now());
        writeln!(out, "{}", describe(t))?;
        session.save()
    }

    pub fn regenerate_memo(&self, ids: &[String], out: &mut impl Write) -> Result<()> {
        let mut session = self.session()?;
        let now = Utc::now();
        for i in session.indices(ids)? {
            let t = &mut session.transactions[i];
            if t.regenerate_memo(|category, amount| self.classifier.memo_for(category, amount), now) {
                writeln!(out, "{}", describe(t))?;
            } else {
                writeln!(out, "{}: no category, memo unchanged", t.id)?;
            }
        }
        session.save()
    }

    /// Confirms transactions and teaches the store each merchant's category.
    /// Already confirmed transactions are left alone so they are not counted
    /// twice. The session is saved even when learning fails part way, so the
    /// transactions already learned stay confirmed.
    pub async fn confirm(&self, ids: &[String], all: bool, out: &mut impl Write) -> Result<()> {
        let mut session = self.session()?;
        let targets = if all {
            (0..session.transactions.len()).collect()
        } else {
            session.indices(ids)?
        };

        let now = Utc::now();
        let mut confirmed = 0;
        for i in targets {
            let t = &mut session.transactions[i];
            if t.is_confirmed {
                continue;
            }
            let Some(category) = t.category.clone() else {
                writeln!(out, "{}: no category, skipped", t.id)?;
                continue;
            };
            if let Err(e) = self
                .store
                .upsert(&t.merchant, &category, t.memo.as_deref())
                .await
            {
                let err = anyhow::Error::new(e).context(format!("learn {}", t.id));
                session.save()?;
                writeln!(out, "confirmed {confirmed} transactions before stopping")?;
                return Err(err);
            }
            t.confirm(now);
            confirmed += 1;
        }

        session.save()?;
        writeln!(out, "confirmed {confirmed} transactions")?;
        Ok(())
    }

    /// Writes confirmed transactions to `output`, or to a dated file in the
    /// current directory.
    pub fn export(&self, output: Option<PathBuf>, out: &mut impl Write) -> Result<PathBuf> {
        let session = self.session()?;
        let csv = match export_confirmed(&session.transactions) {
            Ok(csv) => csv,
            Err(ExportError::NothingConfirmed) => {
                bail!("nothing to export: confirm transactions first")
            }
            Err(e) => return Err(e.into()),
        };
        let path = output.unwrap_or_else(|| PathBuf::from(default_file_name(Local::now().date_naive())));
        std::fs::write(&path, csv).with_context(|| format!("write {}", path.display()))?;

        let count = session.transactions.iter().filter(|t| t.is_confirmed).count();
        writeln!(out, "exported {count} transactions to {}", path.display())?;
        Ok(path)
    }

    pub async fn stats(&self, json: bool, out: &mut impl Write) -> Result<()> {
        let stats = self.store.stats().await;
        if json {
            serde_json::to_writer_pretty(&mut *out, &stats)?;
            writeln!(out)?;
            return Ok(());
        }

        writeln!(out, "merchants learned: {}", stats.total_merchants)?;
        writeln!(out, "confirmations:     {}", stats.total_frequency)?;
        writeln!(out, "most learned:")?;
        for r in &stats.most_learned {
            writeln!(out, "  {} ({}回) {} {}", r.merchant, r.frequency, r.category, category_name(&r.category))?;
        }
        writeln!(out, "recent:")?;
        for r in &stats.recent {
            writeln!(out, "  {} {} {}", r.updated_at.format("%Y-%m-%d %H:%M"), r.merchant, r.category)?;
        }
        Ok(())
    }

    pub async fn history(&self, merchant: &str, out: &mut impl Write) -> Result<()> {
        let Some(d) = self.store.detail(merchant).await else {
            writeln!(out, "no history for {merchant}")?;
            return Ok(());
        };
        writeln!(out, "{}", d.merchant)?;
        writeln!(out, "  category:   {} {}", d.category, d.category_name)?;
        writeln!(out, "  frequency:  {}", d.frequency)?;
        writeln!(out, "  confidence: {:.2}", d.confidence)?;
        writeln!(out, "  last memo:  {}", d.last_memo.as_deref().unwrap_or("なし"))?;
        writeln!(out, "  updated:    {}", d.updated_at.to_rfc3339())?;
        Ok(())
    }
}

pub fn categories(out: &mut impl Write) -> Result<()> {
    for c in EXPENSE_CATEGORIES {
        writeln!(out, "{c}")?;
    }
    Ok(())
}
