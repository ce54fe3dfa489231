// 🏦 Bank schema adapters - per-bank column layouts → uniform record fields
// Each partner bank exports a different spreadsheet layout. One adapter per
// bank extracts the uniform tuple the resolver and the batch processor work
// with, so everything downstream stays bank-agnostic.

use log::{info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ingest::Dataset;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum RecordParseError {
    #[error("could not detect the bank for file '{0}'")]
    UnknownBank(String),

    #[error("file '{file}' is missing required column: {column}")]
    MissingColumn { file: String, column: &'static str },
}

// ============================================================================
// BANK KIND
// ============================================================================

/// Supported partner banks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BankKind {
    Averbai,
    Digio,
    Prata,
    Vctex,
    Daycoval,
    Santander,
}

impl BankKind {
    /// Bank name as it appears in the reference table.
    pub fn reference_name(&self) -> &'static str {
        match self {
            BankKind::Averbai => "AVERBAI",
            BankKind::Digio => "BANCO DIGIO",
            BankKind::Prata => "BANCO PRATA DIGITAL",
            BankKind::Vctex => "BANCO VCTEX",
            BankKind::Daycoval => "BANCO DAYCOVAL",
            BankKind::Santander => "BANCO SANTANDER",
        }
    }

    /// Short code for filenames and logs.
    pub fn code(&self) -> &'static str {
        match self {
            BankKind::Averbai => "AVERBAI",
            BankKind::Digio => "DIGIO",
            BankKind::Prata => "PRATA",
            BankKind::Vctex => "VCTEX",
            BankKind::Daycoval => "DAYCOVAL",
            BankKind::Santander => "SANTANDER",
        }
    }
}

// ============================================================================
// UNIFORM RECORD FIELDS
// ============================================================================

/// The uniform shape every adapter produces: the resolution tuple, the
/// dedup identity, the status, and the business fields carried into the
/// result artifact.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordFields {
    pub bank: String,
    pub product_type: String,
    pub modality: String,
    pub table_name: String,

    /// Bank-specific identity (proposal/contract number), dedup key
    pub identity_key: String,

    /// Raw status text, normalized later by the summarizer
    pub status: String,

    // Business fields for the result artifact
    pub cpf: String,
    pub client_name: String,
    pub registration_date: String,
    pub payment_date: String,
    pub installments: String,
    pub installment_value: String,
    pub operation_value: String,
    pub released_value: String,
}

/// Result of extracting a whole dataset through one adapter.
#[derive(Debug, Default)]
pub struct Extraction {
    pub records: Vec<RecordFields>,
    /// Rows dropped for value-level issues (no identity key); counted,
    /// never silently discarded
    pub rows_skipped: usize,
}

// ============================================================================
// ADAPTER TRAIT & FACTORY
// ============================================================================

/// One adapter per supported bank. `extract` validates the structural
/// requirements of the layout (missing required columns fail the job) and
/// produces the uniform record fields row by row.
pub trait BankAdapter: Send + Sync {
    fn kind(&self) -> BankKind;

    fn extract(&self, dataset: &Dataset) -> Result<Extraction, RecordParseError>;
}

/// Factory: adapter for a detected bank.
pub fn adapter_for(kind: BankKind) -> Box<dyn BankAdapter> {
    match kind {
        BankKind::Averbai => Box::new(AverbaiAdapter),
        BankKind::Digio => Box::new(DigioAdapter),
        BankKind::Prata => Box::new(PrataAdapter),
        BankKind::Vctex => Box::new(VctexAdapter),
        BankKind::Daycoval => Box::new(DaycovalAdapter),
        BankKind::Santander => Box::new(SantanderAdapter::new()),
    }
}

// ============================================================================
// BANK DETECTION
// ============================================================================

/// Detect which bank produced a dataset.
///
/// Filename wins when it names the bank; otherwise header structure, and as
/// a last resort the content of the first rows (DIGIO and DAYCOVAL exports
/// share near-identical layouts and only differ in the data itself).
pub fn detect_bank(dataset: &Dataset) -> Result<BankKind, RecordParseError> {
    let filename = dataset.filename.to_lowercase();
    let by_filename = [
        ("averbai", BankKind::Averbai),
        ("digio", BankKind::Digio),
        ("prata", BankKind::Prata),
        ("vctex", BankKind::Vctex),
        ("daycoval", BankKind::Daycoval),
        ("santander", BankKind::Santander),
    ];
    for (needle, kind) in by_filename {
        if filename.contains(needle) {
            info!("Bank detected by filename '{}': {}", dataset.filename, kind.code());
            return Ok(kind);
        }
    }

    let has_header = |pattern: &str| dataset.find_column(&[pattern]).is_some();

    if has_header("IDTABLECOMISSAO") || has_header("TIPOPRODUTO") {
        return Ok(BankKind::Averbai);
    }
    if has_header("CONVENIO") && has_header("PRODUTO") {
        return Ok(BankKind::Santander);
    }
    if has_header("NUMERO DO CONTRATO") {
        return Ok(BankKind::Vctex);
    }
    if has_header("NUMERO DA PROPOSTA") {
        return Ok(BankKind::Prata);
    }

    // DIGIO vs DAYCOVAL: same column skeleton, discriminate on content
    if has_header("PROPOSTA") && has_header("ORGAO") {
        let sample: String = dataset
            .rows
            .iter()
            .take(5)
            .flat_map(|row| row.iter())
            .collect::<Vec<_>>()
            .join(" ")
            .to_uppercase();
        if sample.contains("DAYCOVAL") {
            return Ok(BankKind::Daycoval);
        }
        if sample.contains("DIGIO") {
            return Ok(BankKind::Digio);
        }
        // Layout matches the consolidated CSV export both banks use
        return Ok(BankKind::Daycoval);
    }

    Err(RecordParseError::UnknownBank(dataset.filename.clone()))
}

// ============================================================================
// SHARED EXTRACTION PLUMBING
// ============================================================================

/// Column handles an adapter resolves once per dataset.
struct Columns<'a> {
    dataset: &'a Dataset,
}

impl<'a> Columns<'a> {
    fn new(dataset: &'a Dataset) -> Self {
        Columns { dataset }
    }

    fn optional(&self, patterns: &[&str]) -> Option<usize> {
        self.dataset.find_column(patterns)
    }

    fn required(
        &self,
        patterns: &[&str],
        column: &'static str,
    ) -> Result<usize, RecordParseError> {
        self.dataset
            .find_column(patterns)
            .ok_or(RecordParseError::MissingColumn {
                file: self.dataset.filename.clone(),
                column,
            })
    }
}

/// Metadata lines partner exports embed above/below the data (report
/// titles, page totals). Extraction drops them without counting them as
/// skipped records.
fn is_metadata_row(joined: &str) -> bool {
    const INDICATORS: &[&str] = &[
        "RELATORIO",
        "TOTAL DE REGISTROS",
        "TOTAL:",
        "PAGINA",
        "DATA DE EMISSAO",
        "PERIODO",
    ];
    let upper = joined.to_uppercase();
    INDICATORS.iter().any(|indicator| upper.contains(indicator))
}

// ============================================================================
// AVERBAI
// ============================================================================

/// AVERBAI exports one proposal per row with the product in `TipoProduto`
/// and the commission table name in `Tabela`.
pub struct AverbaiAdapter;

impl AverbaiAdapter {
    /// Product type and modality both derive from the TipoProduto text.
    /// Portability and refinancing proposals are registered under INSS in
    /// the reference table even when the text says otherwise.
    fn classify(tipo_produto: &str) -> (&'static str, String) {
        let upper = tipo_produto.to_uppercase();
        let modality = if upper.contains("PORTABILIDADE") && upper.contains("REFIN") {
            "Refinanciamento da Portabilidade"
        } else if upper.contains("PORTABILIDADE") {
            "Portabilidade"
        } else if upper.contains("REFIN") {
            "Refinanciamento"
        } else {
            "Margem Livre (Novo)"
        };

        let product = if modality != "Margem Livre (Novo)" || upper.contains("INSS") {
            "INSS"
        } else {
            "FGTS"
        };
        (product, modality.to_string())
    }
}

impl BankAdapter for AverbaiAdapter {
    fn kind(&self) -> BankKind {
        BankKind::Averbai
    }

    fn extract(&self, dataset: &Dataset) -> Result<Extraction, RecordParseError> {
        let columns = Columns::new(dataset);
        let id = columns.required(&["ID"], "Id")?;
        let tipo_produto = columns.required(&["TIPOPRODUTO"], "TipoProduto")?;
        let tabela = columns.optional(&["TABELA"]);
        let status = columns.optional(&["SITUACAO", "STATUS"]);
        let cpf = columns.optional(&["CPFCLIENTE", "CPF"]);
        let name = columns.optional(&["NOMECLIENTE", "NOME"]);
        let date = columns.optional(&["DATACADASTRO", "DATA"]);
        let installments = columns.optional(&["PRAZO", "PARCELAS"]);
        let installment_value = columns.optional(&["VALORPARCELA"]);
        let operation_value = columns.optional(&["VALOROPERACAO", "VALORPROPOSTA"]);
        let released_value = columns.optional(&["VALORLIBERADO"]);

        let mut extraction = Extraction::default();
        for row in &dataset.rows {
            let identity = dataset.cell(row, Some(id)).to_string();
            if identity.is_empty() {
                extraction.rows_skipped += 1;
                continue;
            }
            let (product, modality) = Self::classify(dataset.cell(row, Some(tipo_produto)));

            extraction.records.push(RecordFields {
                bank: self.kind().reference_name().to_string(),
                product_type: product.to_string(),
                modality,
                table_name: dataset.cell(row, tabela).to_string(),
                identity_key: identity,
                status: dataset.cell(row, status).to_string(),
                cpf: dataset.cell(row, cpf).to_string(),
                client_name: dataset.cell(row, name).to_string(),
                registration_date: dataset.cell(row, date).to_string(),
                payment_date: String::new(),
                installments: dataset.cell(row, installments).to_string(),
                installment_value: dataset.cell(row, installment_value).to_string(),
                operation_value: dataset.cell(row, operation_value).to_string(),
                released_value: dataset.cell(row, released_value).to_string(),
            });
        }
        Ok(extraction)
    }
}

// ============================================================================
// DIGIO
// ============================================================================

/// BANCO DIGIO consolidated CSV export: named headers, table code already
/// present in the CODIGO TABELA column.
pub struct DigioAdapter;

impl BankAdapter for DigioAdapter {
    fn kind(&self) -> BankKind {
        BankKind::Digio
    }

    fn extract(&self, dataset: &Dataset) -> Result<Extraction, RecordParseError> {
        let columns = Columns::new(dataset);
        let proposta = columns.required(&["PROPOSTA"], "PROPOSTA")?;
        let situacao = columns.required(&["SITUACAO", "STATUS"], "SITUACAO")?;
        let orgao = columns.optional(&["ORGAO", "CONVENIO"]);
        let operacao = columns.optional(&["TIPO DE OPERACAO", "OPERACAO", "PRODUTO"]);
        let tabela = columns.optional(&["CODIGO TABELA", "TABELA"]);
        let cadastro = columns.optional(&["DATA CADASTRO"]);
        let pagamento = columns.optional(&["DATA DE PAGAMENTO", "DATA PAGAMENTO"]);
        let cpf = columns.optional(&["CPF"]);
        let nome = columns.optional(&["NOME"]);
        let parcelas = columns.optional(&["NUMERO PARCELAS", "PARCELAS"]);
        let valor_parcelas = columns.optional(&["VALOR PARCELAS", "VALOR PARCELA"]);
        let valor_operacao = columns.optional(&["VALOR OPERACAO"]);
        let valor_liberado = columns.optional(&["VALOR LIBERADO"]);

        let mut extraction = Extraction::default();
        for row in &dataset.rows {
            let joined = row.iter().collect::<Vec<_>>().join(" ");
            if is_metadata_row(&joined) {
                continue;
            }
            let identity = dataset.cell(row, Some(proposta)).to_string();
            if identity.is_empty() {
                extraction.rows_skipped += 1;
                continue;
            }

            extraction.records.push(RecordFields {
                bank: self.kind().reference_name().to_string(),
                product_type: non_empty_or(dataset.cell(row, orgao), "INSS"),
                modality: non_empty_or(dataset.cell(row, operacao), "Margem Livre (Novo)"),
                table_name: dataset.cell(row, tabela).to_string(),
                identity_key: identity,
                status: dataset.cell(row, Some(situacao)).to_string(),
                cpf: dataset.cell(row, cpf).to_string(),
                client_name: dataset.cell(row, nome).to_string(),
                registration_date: dataset.cell(row, cadastro).to_string(),
                payment_date: dataset.cell(row, pagamento).to_string(),
                installments: dataset.cell(row, parcelas).to_string(),
                installment_value: dataset.cell(row, valor_parcelas).to_string(),
                operation_value: dataset.cell(row, valor_operacao).to_string(),
                released_value: dataset.cell(row, valor_liberado).to_string(),
            });
        }
        Ok(extraction)
    }
}

// ============================================================================
// PRATA
// ============================================================================

/// BANCO PRATA DIGITAL: FGTS-only layout; the term comes in months and the
/// reference counts years.
pub struct PrataAdapter;

impl BankAdapter for PrataAdapter {
    fn kind(&self) -> BankKind {
        BankKind::Prata
    }

    fn extract(&self, dataset: &Dataset) -> Result<Extraction, RecordParseError> {
        let columns = Columns::new(dataset);
        let proposta = columns.required(&["NUMERO DA PROPOSTA", "PROPOSTA"], "Número da Proposta")?;
        let status = columns.required(&["STATUS", "SITUACAO"], "Status")?;
        let tabela = columns.optional(&["TABELA"]);
        let data_operacao = columns.optional(&["DATA DA OPERACAO", "DATA"]);
        let desembolso_data = columns.optional(&["DATA DO DESEMBOLSO"]);
        let prazo = columns.optional(&["PRAZO"]);
        let emissao = columns.optional(&["VALOR DA EMISSAO"]);
        let desembolso = columns.optional(&["VALOR DESEMBOLSO"]);
        let cpf = columns.optional(&["CPF"]);
        let nome = columns.optional(&["NOME DO CLIENTE", "NOME"]);

        let mut extraction = Extraction::default();
        for row in &dataset.rows {
            let identity = dataset.cell(row, Some(proposta)).to_string();
            if identity.is_empty() {
                extraction.rows_skipped += 1;
                continue;
            }

            // Term comes in months; the reference table counts years
            let term = dataset.cell(row, prazo);
            let installments = match term.parse::<u32>() {
                Ok(months) if months >= 12 => (months / 12).to_string(),
                _ => term.to_string(),
            };

            extraction.records.push(RecordFields {
                bank: self.kind().reference_name().to_string(),
                product_type: "FGTS".to_string(),
                modality: "Margem Livre (Novo)".to_string(),
                table_name: dataset.cell(row, tabela).to_string(),
                identity_key: identity,
                status: dataset.cell(row, Some(status)).to_string(),
                cpf: dataset.cell(row, cpf).to_string(),
                client_name: dataset.cell(row, nome).to_string(),
                registration_date: dataset.cell(row, data_operacao).to_string(),
                payment_date: dataset.cell(row, desembolso_data).to_string(),
                installments,
                installment_value: String::new(),
                operation_value: dataset.cell(row, emissao).to_string(),
                released_value: dataset.cell(row, desembolso).to_string(),
            });
        }
        Ok(extraction)
    }
}

// ============================================================================
// VCTEX
// ============================================================================

/// BANCO VCTEX: contract-numbered FGTS proposals.
pub struct VctexAdapter;

impl BankAdapter for VctexAdapter {
    fn kind(&self) -> BankKind {
        BankKind::Vctex
    }

    fn extract(&self, dataset: &Dataset) -> Result<Extraction, RecordParseError> {
        let columns = Columns::new(dataset);
        let contrato =
            columns.required(&["NUMERO DO CONTRATO", "CONTRATO", "PROPOSTA"], "Número do Contrato")?;
        let status = columns.required(&["STATUS", "SITUACAO"], "Status")?;
        let tabela = columns.optional(&["TABELA"]);
        let data_operacao = columns.optional(&["DATA DA OPERACAO", "DATA DE CRIACAO", "DATA CONTRATO"]);
        let pagamento = columns.optional(&["DATA PAGAMENTO", "DATA LIQUIDACAO"]);
        let prazo = columns.optional(&["PRAZO"]);
        let valor = columns.optional(&["VALOR DA EMISSAO", "VALOR DA OPERACAO", "VALOR"]);
        let liberado = columns.optional(&["VALOR DESEMBOLSO", "VALOR LIBERADO"]);
        let cpf = columns.optional(&["CPF"]);
        let nome = columns.optional(&["NOME"]);

        let mut extraction = Extraction::default();
        for row in &dataset.rows {
            let identity = dataset.cell(row, Some(contrato)).to_string();
            if identity.is_empty() {
                extraction.rows_skipped += 1;
                continue;
            }

            let term = dataset.cell(row, prazo);
            let installments = match term.parse::<u32>() {
                Ok(months) if months >= 12 => (months / 12).to_string(),
                _ => term.to_string(),
            };

            extraction.records.push(RecordFields {
                bank: self.kind().reference_name().to_string(),
                product_type: "FGTS".to_string(),
                modality: "Margem Livre (Novo)".to_string(),
                table_name: dataset.cell(row, tabela).to_string(),
                identity_key: identity,
                status: dataset.cell(row, Some(status)).to_string(),
                cpf: dataset.cell(row, cpf).to_string(),
                client_name: dataset.cell(row, nome).to_string(),
                registration_date: dataset.cell(row, data_operacao).to_string(),
                payment_date: dataset.cell(row, pagamento).to_string(),
                installments,
                installment_value: String::new(),
                operation_value: dataset.cell(row, valor).to_string(),
                released_value: dataset.cell(row, liberado).to_string(),
            });
        }
        Ok(extraction)
    }
}

// ============================================================================
// DAYCOVAL
// ============================================================================

/// BANCO DAYCOVAL consolidated CSV: the table code ships in the file, the
/// organ and operation columns drive the group.
pub struct DaycovalAdapter;

impl BankAdapter for DaycovalAdapter {
    fn kind(&self) -> BankKind {
        BankKind::Daycoval
    }

    fn extract(&self, dataset: &Dataset) -> Result<Extraction, RecordParseError> {
        let columns = Columns::new(dataset);
        let proposta = columns.required(&["PROPOSTA"], "PROPOSTA")?;
        let orgao = columns.required(&["ORGAO"], "ORGAO")?;
        let operacao = columns.optional(&["TIPO DE OPERACAO", "TP. OPERACAO", "OPERACAO"]);
        let tabela = columns.optional(&["CODIGO TABELA", "TABELA"]);
        let situacao = columns.optional(&["SITUACAO", "STATUS"]);
        let cadastro = columns.optional(&["DATA CADASTRO", "DT.CAD"]);
        let pagamento = columns.optional(&["DATA DE PAGAMENTO", "DATA PAGAMENTO"]);
        let cpf = columns.optional(&["CPF"]);
        let nome = columns.optional(&["NOME", "CLIENTE"]);
        let parcelas = columns.optional(&["NUMERO PARCELAS", "PRZ"]);
        let valor_parcelas = columns.optional(&["VALOR PARCELAS"]);
        let valor_operacao = columns.optional(&["VALOR OPERACAO", "VLR.OPER"]);
        let valor_liberado = columns.optional(&["VALOR LIBERADO"]);

        let mut extraction = Extraction::default();
        for row in &dataset.rows {
            let joined = row.iter().collect::<Vec<_>>().join(" ");
            if is_metadata_row(&joined) {
                continue;
            }
            let identity = dataset.cell(row, Some(proposta)).to_string();
            if identity.is_empty() {
                extraction.rows_skipped += 1;
                continue;
            }

            extraction.records.push(RecordFields {
                bank: self.kind().reference_name().to_string(),
                product_type: non_empty_or(dataset.cell(row, Some(orgao)), "INSS"),
                modality: non_empty_or(dataset.cell(row, operacao), "Margem Livre (Novo)"),
                table_name: dataset.cell(row, tabela).to_string(),
                identity_key: identity,
                status: dataset.cell(row, situacao).to_string(),
                cpf: dataset.cell(row, cpf).to_string(),
                client_name: dataset.cell(row, nome).to_string(),
                registration_date: dataset.cell(row, cadastro).to_string(),
                payment_date: dataset.cell(row, pagamento).to_string(),
                installments: dataset.cell(row, parcelas).to_string(),
                installment_value: dataset.cell(row, valor_parcelas).to_string(),
                operation_value: dataset.cell(row, valor_operacao).to_string(),
                released_value: dataset.cell(row, valor_liberado).to_string(),
            });
        }
        Ok(extraction)
    }
}

// ============================================================================
// SANTANDER
// ============================================================================

/// BANCO SANTANDER embeds the table code inside the PRODUTO description
/// ("21387 - 810021387 - 1 OFERTA NOVO COM SEGURO"); the middle number is
/// the code the reference table knows.
pub struct SantanderAdapter {
    paired_code: Regex,
    any_number: Regex,
}

impl SantanderAdapter {
    pub fn new() -> Self {
        SantanderAdapter {
            // Pattern: <number> - <number> - <description>; the second
            // number is the table code
            paired_code: Regex::new(r"(\d+)\s*-\s*(\d+)\s*-").expect("static pattern"),
            any_number: Regex::new(r"\d+").expect("static pattern"),
        }
    }

    fn extract_table_code(&self, produto: &str) -> String {
        if let Some(captures) = self.paired_code.captures(produto) {
            return captures[2].to_string();
        }

        // Degenerate exports: take the longest number present
        self.any_number
            .find_iter(produto)
            .map(|m| m.as_str())
            .max_by_key(|n| n.len())
            .unwrap_or("")
            .to_string()
    }

    fn classify_modality(produto: &str) -> &'static str {
        let upper = produto.to_uppercase();
        if upper.contains("NOVO") {
            // NOVO wins even when REFIN also appears in the offer text
            "Margem Livre (Novo)"
        } else if upper.contains("REFIN") {
            "Refinanciamento"
        } else {
            "Margem Livre (Novo)"
        }
    }

    fn classify_product(convenio: &str) -> String {
        let upper = convenio.to_uppercase();
        if upper.contains("PREF") || upper.contains("PREFEITURA") {
            convenio.trim().to_string()
        } else {
            "INSS".to_string()
        }
    }
}

impl Default for SantanderAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl BankAdapter for SantanderAdapter {
    fn kind(&self) -> BankKind {
        BankKind::Santander
    }

    fn extract(&self, dataset: &Dataset) -> Result<Extraction, RecordParseError> {
        let columns = Columns::new(dataset);
        let proposta = columns.required(&["PROPOSTA"], "Proposta")?;
        let produto = columns.required(&["PRODUTO"], "Produto")?;
        let convenio = columns.optional(&["CONVENIO"]);
        let status = columns.optional(&["SITUACAO", "STATUS"]);
        let cadastro = columns.optional(&["DATA CADASTRO", "DATA"]);
        let cpf = columns.optional(&["CPF"]);
        let nome = columns.optional(&["NOME"]);
        let parcelas = columns.optional(&["PARCELAS", "PRAZO"]);
        let valor_operacao = columns.optional(&["VALOR OPERACAO", "VALOR"]);
        let valor_liberado = columns.optional(&["VALOR LIBERADO"]);

        let mut extraction = Extraction::default();
        for row in &dataset.rows {
            let identity = dataset.cell(row, Some(proposta)).to_string();
            if identity.is_empty() {
                extraction.rows_skipped += 1;
                continue;
            }
            let produto_text = dataset.cell(row, Some(produto));
            let table_code = self.extract_table_code(produto_text);
            if table_code.is_empty() {
                warn!(
                    "⚠️ SANTANDER proposal {}: no table code in PRODUTO '{}'",
                    identity, produto_text
                );
            }

            extraction.records.push(RecordFields {
                bank: self.kind().reference_name().to_string(),
                product_type: Self::classify_product(dataset.cell(row, convenio)),
                modality: Self::classify_modality(produto_text).to_string(),
                table_name: table_code,
                identity_key: identity,
                status: dataset.cell(row, status).to_string(),
                cpf: dataset.cell(row, cpf).to_string(),
                client_name: dataset.cell(row, nome).to_string(),
                registration_date: dataset.cell(row, cadastro).to_string(),
                payment_date: String::new(),
                installments: dataset.cell(row, parcelas).to_string(),
                installment_value: String::new(),
                operation_value: dataset.cell(row, valor_operacao).to_string(),
                released_value: dataset.cell(row, valor_liberado).to_string(),
            });
        }
        Ok(extraction)
    }
}

fn non_empty_or(value: &str, default: &str) -> String {
    if value.is_empty() {
        default.to_string()
    } else {
        value.to_string()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::Dataset;

    fn dataset(filename: &str, content: &str) -> Dataset {
        Dataset::from_bytes(content.as_bytes(), filename).unwrap()
    }

    #[test]
    fn test_detect_by_filename() {
        let ds = dataset("relatorio_averbai_junho.csv", "A;B\n1;2\n");
        assert_eq!(detect_bank(&ds).unwrap(), BankKind::Averbai);

        let ds = dataset("digio-2025-06.csv", "A;B\n1;2\n");
        assert_eq!(detect_bank(&ds).unwrap(), BankKind::Digio);
    }

    #[test]
    fn test_detect_averbai_by_headers() {
        let ds = dataset(
            "upload.csv",
            "Id;TipoProduto;Tabela;IdTableComissao\n1;Saque FGTS;Tabela Exp;994\n",
        );
        assert_eq!(detect_bank(&ds).unwrap(), BankKind::Averbai);
    }

    #[test]
    fn test_detect_santander_by_headers() {
        let ds = dataset(
            "upload.csv",
            "Proposta;Convenio;Produto\n9;INSS;21387 - 810021387 - 1 OFERTA NOVO\n",
        );
        assert_eq!(detect_bank(&ds).unwrap(), BankKind::Santander);
    }

    #[test]
    fn test_detect_digio_daycoval_by_content() {
        let ds = dataset(
            "upload.csv",
            "PROPOSTA;ORGAO;BANCO\n100;INSS;BANCO DIGIO S.A.\n",
        );
        assert_eq!(detect_bank(&ds).unwrap(), BankKind::Digio);

        let ds = dataset(
            "upload.csv",
            "PROPOSTA;ORGAO;BANCO\n100;INSS;BANCO DAYCOVAL\n",
        );
        assert_eq!(detect_bank(&ds).unwrap(), BankKind::Daycoval);
    }

    #[test]
    fn test_detect_unknown_bank_errors() {
        let ds = dataset("misterio.csv", "X;Y\n1;2\n");
        assert!(matches!(
            detect_bank(&ds),
            Err(RecordParseError::UnknownBank(_))
        ));
    }

    #[test]
    fn test_averbai_extraction_classifies_product_and_modality() {
        let ds = dataset(
            "averbai.csv",
            "Id;TipoProduto;Tabela;Situacao;CpfCliente;NomeCliente\n\
             10;Saque FGTS;Tabela Exponencial;Pago;12345678901;MARIA\n\
             11;Portabilidade INSS;Tabela Port;Digitada;98765432100;JOAO\n",
        );
        let extraction = AverbaiAdapter.extract(&ds).unwrap();
        assert_eq!(extraction.records.len(), 2);

        let first = &extraction.records[0];
        assert_eq!(first.bank, "AVERBAI");
        assert_eq!(first.product_type, "FGTS");
        assert_eq!(first.modality, "Margem Livre (Novo)");
        assert_eq!(first.table_name, "Tabela Exponencial");
        assert_eq!(first.identity_key, "10");

        let second = &extraction.records[1];
        assert_eq!(second.product_type, "INSS");
        assert_eq!(second.modality, "Portabilidade");
    }

    #[test]
    fn test_averbai_missing_required_column_fails() {
        let ds = dataset("averbai.csv", "Tabela;Situacao\nX;Pago\n");
        assert!(matches!(
            AverbaiAdapter.extract(&ds),
            Err(RecordParseError::MissingColumn { .. })
        ));
    }

    #[test]
    fn test_digio_rows_without_proposal_are_counted_skipped() {
        let ds = dataset(
            "digio.csv",
            "PROPOSTA;SITUACAO;ORGAO;TIPO DE OPERACAO;CODIGO TABELA\n\
             100;Pago;INSS;Portabilidade;4410\n\
             ;Pago;INSS;Portabilidade;4410\n",
        );
        let extraction = DigioAdapter.extract(&ds).unwrap();
        assert_eq!(extraction.records.len(), 1);
        assert_eq!(extraction.rows_skipped, 1);
    }

    #[test]
    fn test_prata_converts_term_months_to_years() {
        let ds = dataset(
            "prata.csv",
            "Número da Proposta;Status;Tabela;Prazo proposta\n55;Pago;Tabela Flex;24\n",
        );
        let extraction = PrataAdapter.extract(&ds).unwrap();
        assert_eq!(extraction.records[0].installments, "2");
        assert_eq!(extraction.records[0].product_type, "FGTS");
    }

    #[test]
    fn test_santander_extracts_embedded_table_code() {
        let adapter = SantanderAdapter::new();
        assert_eq!(
            adapter.extract_table_code("21387 - 810021387 - 1 OFERTA NOVO COM SEGURO"),
            "810021387"
        );
        assert_eq!(adapter.extract_table_code("oferta 810022222"), "810022222");
        assert_eq!(adapter.extract_table_code("sem codigo"), "");
    }

    #[test]
    fn test_santander_modality_prefers_novo_over_refin() {
        assert_eq!(
            SantanderAdapter::classify_modality("OFERTA NOVO REFIN"),
            "Margem Livre (Novo)"
        );
        assert_eq!(
            SantanderAdapter::classify_modality("OFERTA REFIN"),
            "Refinanciamento"
        );
    }

    #[test]
    fn test_daycoval_metadata_rows_are_dropped() {
        let ds = dataset(
            "daycoval.csv",
            "PROPOSTA;ORGAO;SITUACAO\n\
             Relatorio detalhado - total de registros: 2;;\n\
             700;INSS;Pago\n",
        );
        let extraction = DaycovalAdapter.extract(&ds).unwrap();
        assert_eq!(extraction.records.len(), 1);
        assert_eq!(extraction.records[0].identity_key, "700");
    }

    #[test]
    fn test_adapter_factory_round_trip() {
        for kind in [
            BankKind::Averbai,
            BankKind::Digio,
            BankKind::Prata,
            BankKind::Vctex,
            BankKind::Daycoval,
            BankKind::Santander,
        ] {
            assert_eq!(adapter_for(kind).kind(), kind);
        }
    }
}
