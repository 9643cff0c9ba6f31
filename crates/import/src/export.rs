use chrono::NaiveDate;
use keihi_core::Transaction;
use thiserror::Error;

/// Spreadsheet tools need the byte-order mark to read the file as UTF-8.
pub const BOM: &str = "\u{FEFF}";

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Exported text is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("No confirmed transactions to export")]
    NothingConfirmed,
}

/// Serializes transactions as `date, merchant, amount, "", "", category, memo`
/// with a BOM prefix and no header row. The two blank columns are kept for
/// the downstream bookkeeping sheet.
pub fn export_csv<'a, I>(transactions: I) -> Result<String, ExportError>
where
    I: IntoIterator<Item = &'a Transaction>,
{
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::CRLF)
        .from_writer(BOM.as_bytes().to_vec());

    for tx in transactions {
        let amount = tx.amount.to_string();
        writer.write_record([
            tx.date.as_str(),
            tx.merchant.as_str(),
            amount.as_str(),
            "",
            "",
            tx.category.as_deref().unwrap_or_default(),
            tx.memo.as_deref().unwrap_or_default(),
        ])?;
    }

    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    Ok(String::from_utf8(bytes)?)
}

/// Exports only the confirmed transactions.
pub fn export_confirmed(transactions: &[Transaction]) -> Result<String, ExportError> {
    let confirmed: Vec<&Transaction> = transactions.iter().filter(|t| t.is_confirmed).collect();
    if confirmed.is_empty() {
        return Err(ExportError::NothingConfirmed);
    }
    export_csv(confirmed)
}

pub fn default_file_name(date: NaiveDate) -> String {
    format!("expense_{}.csv", date.format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csv::ingest;
    use chrono::{TimeZone, Utc};

    fn tx(id: usize, date: &str, merchant: &str, amount: i64, confirmed: bool) -> Transaction {
        let now = Utc.timestamp_opt(1_750_000_000, 0).unwrap();
        Transaction {
            id: format!("transaction-{id}"),
            date: date.to_string(),
            merchant: merchant.to_string(),
            amount,
            category: Some("717".to_string()),
            memo: Some("経費".to_string()),
            confidence: 0.6,
            is_confirmed: confirmed,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn fixed_column_layout_with_bom() {
        let out = export_csv(&[tx(0, "2025/05/17", "スターバックス", 500, true)]).unwrap();
        assert_eq!(out, "\u{FEFF}2025/05/17,スターバックス,500,,,717,経費\r\n");
    }

    #[test]
    fn missing_category_and_memo_are_blank() {
        let mut t = tx(0, "2025/05/17", "A", 150, true);
        t.category = None;
        t.memo = None;
        let out = export_csv(&[t]).unwrap();
        assert_eq!(out, "\u{FEFF}2025/05/17,A,150,,,,\r\n");
    }

    #[test]
    fn fields_with_commas_are_quoted() {
        let out = export_csv(&[tx(0, "2025/05/17", "Foods, Inc.", 1200, true)]).unwrap();
        assert!(out.contains("\"Foods, Inc.\""));
    }

    #[test]
    fn only_confirmed_rows_are_exported() {
        let txs = vec![
            tx(0, "2025/05/17", "A", 500, true),
            tx(1, "2025/05/18", "B", 600, false),
        ];
        let out = export_confirmed(&txs).unwrap();
        assert!(out.contains(",A,"));
        assert!(!out.contains(",B,"));
    }

    #[test]
    fn nothing_confirmed_is_an_error() {
        let txs = vec![tx(0, "2025/05/17", "A", 500, false)];
        assert!(matches!(export_confirmed(&txs), Err(ExportError::NothingConfirmed)));
    }

    #[test]
    fn reingest_recovers_date_merchant_amount() {
        let txs = vec![
            tx(0, "2025/05/17", "スターバックス", 500, true),
            tx(1, "2025/05/18", "Foods, Inc.", 12345, true),
            tx(2, "2025/06/01", "ENEOS 中央店", 4800, true),
        ];
        let out = export_csv(&txs).unwrap();
        let back = ingest(out.as_bytes()).unwrap();
        let got: Vec<_> = back.iter().map(|t| (t.date(), t.merchant(), t.amount())).collect();
        let want: Vec<_> = txs
            .iter()
            .map(|t| (t.date.as_str(), t.merchant.as_str(), t.amount))
            .collect();
        assert_eq!(got, want);
    }

    #[test]
    fn default_file_name_uses_iso_date() {
        let d = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();
        assert_eq!(default_file_name(d), "expense_2025-06-30.csv");
    }
}
