// 📇 Reference Index Builder - reference spreadsheet → MappingIndex
// Builds the exact-lookup store plus the per-group candidate lists used by
// the fallback search. The index is constructed once and injected read-only;
// nothing in this module mutates it after `load` returns.

use crate::ingest::{fold_header, sniff_separator};
use crate::normalize::{canonical_modality, normalize};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Delimiter used to join composite-key segments. Not expected in the data.
pub const KEY_DELIMITER: char = '|';

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum ReferenceLoadError {
    #[error("failed to read reference file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse reference file: {0}")]
    Csv(#[from] csv::Error),

    #[error("reference file is missing required column: {0}")]
    MissingColumn(&'static str),

    #[error("reference file produced no usable entries")]
    Empty,
}

// ============================================================================
// REFERENCE ENTRY
// ============================================================================

/// One row of the reference table. Immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceEntry {
    /// Partner bank name (normalized)
    pub bank: String,

    /// Product type, e.g. INSS, FGTS, SPPREV (normalized)
    pub product_type: String,

    /// Operation modality, e.g. MARGEM LIVRE (NOVO) (canonicalized)
    pub modality: String,

    /// Table name exactly as the bank reports it (pre-normalization)
    pub table_name: String,

    /// Canonical internal product code
    pub code: String,

    /// Rate associated with the table, kept verbatim for the result artifact
    pub rate: String,
}

impl ReferenceEntry {
    /// Normalized table name, as used in composite keys and containment checks.
    pub fn normalized_table_name(&self) -> String {
        normalize(&self.table_name)
    }
}

/// Exact-lookup key: `BANK|PRODUCT|MODALITY|NORMALIZED_TABLE_NAME`.
pub fn composite_key(bank: &str, product_type: &str, modality: &str, table_name: &str) -> String {
    format!(
        "{}{d}{}{d}{}{d}{}",
        normalize(bank),
        normalize(product_type),
        canonical_modality(modality),
        normalize(table_name),
        d = KEY_DELIMITER,
    )
}

/// Fallback-group key: `BANK|PRODUCT|MODALITY`.
pub fn group_key(bank: &str, product_type: &str, modality: &str) -> String {
    format!(
        "{}{d}{}{d}{}",
        normalize(bank),
        normalize(product_type),
        canonical_modality(modality),
        d = KEY_DELIMITER,
    )
}

// ============================================================================
// MAPPING INDEX
// ============================================================================

/// The lookup index built from the reference spreadsheet.
///
/// `exact` resolves a full composite key in one probe; `groups` holds the
/// insertion-ordered candidate lists the Resolver walks when the exact key
/// misses. Read-only after construction, safe to share behind an `Arc`.
#[derive(Debug, Default)]
pub struct MappingIndex {
    exact: HashMap<String, ReferenceEntry>,
    groups: HashMap<String, Vec<ReferenceEntry>>,
    entry_count: usize,
}

/// Header positions for the required reference columns.
struct ColumnLayout {
    bank: usize,
    product_type: usize,
    modality: usize,
    table_name: usize,
    code: usize,
    rate: Option<usize>,
}

impl ColumnLayout {
    /// Locate required columns by folded substring match. The reference
    /// file ships with Latin-1 mojibake in some headers (ORGÃO, OPERAÇÃO);
    /// folding keeps the undamaged part of the name matchable.
    fn detect(headers: &csv::StringRecord) -> Result<Self, ReferenceLoadError> {
        let mut bank = None;
        let mut product_type = None;
        let mut modality = None;
        let mut table_name = None;
        let mut code = None;
        let mut rate = None;

        for (idx, raw) in headers.iter().enumerate() {
            let header = fold_header(raw);
            if header.starts_with("BANCO") && bank.is_none() {
                bank = Some(idx);
            } else if header.contains("ORG") && product_type.is_none() {
                product_type = Some(idx);
            } else if header.contains("OPERA") && modality.is_none() {
                modality = Some(idx);
            } else if header.contains("CODIGO") && code.is_none() {
                code = Some(idx);
            } else if header.contains("TABELA") && table_name.is_none() {
                table_name = Some(idx);
            } else if header.contains("TAXA") && rate.is_none() {
                rate = Some(idx);
            }
        }

        Ok(ColumnLayout {
            bank: bank.ok_or(ReferenceLoadError::MissingColumn("BANCO"))?,
            product_type: product_type.ok_or(ReferenceLoadError::MissingColumn("ORGAO"))?,
            modality: modality.ok_or(ReferenceLoadError::MissingColumn("OPERACAO"))?,
            table_name: table_name.ok_or(ReferenceLoadError::MissingColumn("TABELA"))?,
            code: code.ok_or(ReferenceLoadError::MissingColumn("CODIGO"))?,
            rate,
        })
    }
}

impl MappingIndex {
    /// Load the reference spreadsheet from disk and build the index.
    ///
    /// Fatal on unreadable input or missing required columns; no partial
    /// index is ever returned.
    pub fn load(path: &Path) -> Result<Self, ReferenceLoadError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    /// Build the index from an in-memory reference file.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ReferenceLoadError> {
        let text = String::from_utf8_lossy(bytes);
        let separator = sniff_separator(&text);

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(separator as u8)
            .flexible(true)
            .from_reader(text.as_bytes());

        let headers = reader.headers()?.clone();
        let layout = ColumnLayout::detect(&headers)?;

        let mut index = MappingIndex::default();
        let mut skipped = 0usize;

        for row in reader.records() {
            let row = row?;
            let field = |idx: usize| row.get(idx).unwrap_or("").trim().to_string();

            let bank = field(layout.bank);
            let code = field(layout.code);
            // Rows without a bank or code cannot resolve anything
            if bank.is_empty() || code.is_empty() {
                skipped += 1;
                continue;
            }

            let entry = ReferenceEntry {
                bank,
                product_type: field(layout.product_type),
                modality: field(layout.modality),
                table_name: field(layout.table_name),
                code,
                rate: layout.rate.map(field).unwrap_or_default(),
            };
            index.insert(entry);
        }

        if index.entry_count == 0 {
            return Err(ReferenceLoadError::Empty);
        }

        info!(
            "Reference index built: {} entries, {} groups, {} rows skipped",
            index.entry_count,
            index.groups.len(),
            skipped
        );
        Ok(index)
    }

    /// Insert one reference entry into both structures.
    ///
    /// Exact-key collisions overwrite (last write wins) and are logged; a
    /// duplicated key is a data-quality issue in the reference file, not a
    /// load failure.
    fn insert(&mut self, entry: ReferenceEntry) {
        let key = composite_key(
            &entry.bank,
            &entry.product_type,
            &entry.modality,
            &entry.table_name,
        );
        if let Some(previous) = self.exact.get(&key) {
            warn!(
                "⚠️ Duplicate reference key '{}': code {} overwrites {}",
                key, entry.code, previous.code
            );
        }
        self.exact.insert(key, entry.clone());

        let group = group_key(&entry.bank, &entry.product_type, &entry.modality);
        self.groups.entry(group).or_default().push(entry);
        self.entry_count += 1;
    }

    /// Exact composite-key lookup.
    pub fn lookup_exact(&self, key: &str) -> Option<&ReferenceEntry> {
        self.exact.get(key)
    }

    /// Fallback candidates for a `(bank, product_type, modality)` group, in
    /// reference-file insertion order.
    pub fn candidates(&self, group: &str) -> &[ReferenceEntry] {
        self.groups.get(group).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of entries loaded (collisions counted once per row).
    pub fn len(&self) -> usize {
        self.entry_count
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count == 0
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const REFERENCE_CSV: &str = "\
BANCO;ORGAO;TABELA;CODIGO;OPERACAO;TAXA
AVERBAI;FGTS;Tabela Exponencial;994;Margem Livre (Novo);1,80
AVERBAI;FGTS;Tabela Flex;992;Margem Livre (Novo);1,85
BANCO DIGIO;INSS;DIGIO GOLD;4410;Portabilidade;1,66
";

    #[test]
    fn test_load_builds_exact_and_group_stores() {
        let index = MappingIndex::from_bytes(REFERENCE_CSV.as_bytes()).unwrap();
        assert_eq!(index.len(), 3);

        let key = composite_key("AVERBAI", "FGTS", "Margem Livre (Novo)", "tabela exponencial");
        let entry = index.lookup_exact(&key).expect("exact key should resolve");
        assert_eq!(entry.code, "994");

        let group = group_key("averbai", "fgts", "MARGEM LIVRE (NOVO)");
        assert_eq!(index.candidates(&group).len(), 2);
    }

    #[test]
    fn test_candidates_preserve_insertion_order() {
        let index = MappingIndex::from_bytes(REFERENCE_CSV.as_bytes()).unwrap();
        let group = group_key("AVERBAI", "FGTS", "MARGEM LIVRE (NOVO)");
        let candidates = index.candidates(&group);
        assert_eq!(candidates[0].code, "994");
        assert_eq!(candidates[1].code, "992");
    }

    #[test]
    fn test_key_collision_last_write_wins() {
        let csv = "\
BANCO;ORGAO;TABELA;CODIGO;OPERACAO;TAXA
AVERBAI;FGTS;Tabela Exponencial;994;Margem Livre (Novo);1,80
AVERBAI;FGTS;Tabela Exponencial;1005;Margem Livre (Novo);1,80
";
        let index = MappingIndex::from_bytes(csv.as_bytes()).unwrap();
        let key = composite_key("AVERBAI", "FGTS", "Margem Livre (Novo)", "TABELA EXPONENCIAL");
        assert_eq!(index.lookup_exact(&key).unwrap().code, "1005");
    }

    #[test]
    fn test_rows_without_code_are_skipped() {
        let csv = "\
BANCO;ORGAO;TABELA;CODIGO;OPERACAO;TAXA
AVERBAI;FGTS;Tabela Exponencial;;Margem Livre (Novo);1,80
;FGTS;Tabela Flex;992;Margem Livre (Novo);1,85
AVERBAI;FGTS;Tabela Gold;990;Margem Livre (Novo);1,70
";
        let index = MappingIndex::from_bytes(csv.as_bytes()).unwrap();
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_missing_required_column_is_fatal() {
        let csv = "BANCO;ORGAO;TABELA;OPERACAO\nAVERBAI;FGTS;Tabela A;Portabilidade\n";
        let err = MappingIndex::from_bytes(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, ReferenceLoadError::MissingColumn("CODIGO")));
    }

    #[test]
    fn test_empty_reference_is_fatal() {
        let csv = "BANCO;ORGAO;TABELA;CODIGO;OPERACAO;TAXA\n";
        let err = MappingIndex::from_bytes(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, ReferenceLoadError::Empty));
    }

    #[test]
    fn test_mojibake_headers_still_detected() {
        // Latin-1 damage in ORGÃO / OPERAÇÃO headers as shipped upstream
        let csv = "\
BANCO;ORG\u{fffd}O;TABELA BANCO;CODIGO TABELA;OPERA\u{fffd}\u{fffd}O;TAXA
AVERBAI;FGTS;Tabela Exponencial;994;Margem Livre (Novo);1,80
";
        let index = MappingIndex::from_bytes(csv.as_bytes()).unwrap();
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_comma_separated_reference_is_sniffed() {
        let csv = "\
BANCO,ORGAO,TABELA,CODIGO,OPERACAO,TAXA
BANCO DIGIO,INSS,DIGIO GOLD,4410,Portabilidade,\"1,66\"
";
        let index = MappingIndex::from_bytes(csv.as_bytes()).unwrap();
        assert_eq!(index.len(), 1);
        let key = composite_key("BANCO DIGIO", "INSS", "Portabilidade", "DIGIO GOLD");
        assert_eq!(index.lookup_exact(&key).unwrap().code, "4410");
    }
}
