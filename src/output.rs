// 🖨️ Result writer - consolidated CSV with the resolved code attached
// The downstream import expects a fixed column order, ';' separation,
// DD/MM/YYYY dates, formatted CPFs and decimal-comma values.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::path::Path;

use crate::batch::ResolvedRecord;

/// Placeholder written when a record resolved to no code. The import keeps
/// the row; the summary already counted it as unmapped.
pub const UNMAPPED_CODE: &str = "SEM_CODIGO";

/// Column order the downstream import expects.
pub const OUTPUT_COLUMNS: [&str; 16] = [
    "PROPOSTA",
    "DATA CADASTRO",
    "BANCO",
    "ORGAO",
    "TIPO DE OPERACAO",
    "TABELA BANCO",
    "CODIGO TABELA",
    "TAXA",
    "NUMERO PARCELAS",
    "VALOR PARCELAS",
    "VALOR OPERACAO",
    "VALOR LIBERADO",
    "SITUACAO",
    "DATA DE PAGAMENTO",
    "CPF",
    "NOME",
];

// ============================================================================
// FIELD FORMATTERS
// ============================================================================

/// Convert a date to DD/MM/YYYY. Unparseable values pass through unchanged
/// so the artifact never loses information the source had.
pub fn format_date_br(raw: &str) -> String {
    let date = raw.trim();
    if date.is_empty() {
        return String::new();
    }

    // Timestamps: keep the date part
    let date = date.split_whitespace().next().unwrap_or(date);

    // Two-digit years first; %Y would otherwise swallow them as year 24
    if let Ok(parsed) = NaiveDate::parse_from_str(date, "%d/%m/%y") {
        return parsed.format("%d/%m/%Y").to_string();
    }

    // Already DD/MM/YYYY
    if NaiveDate::parse_from_str(date, "%d/%m/%Y").is_ok() {
        return date.to_string();
    }

    for format in ["%Y-%m-%d", "%d-%m-%Y", "%d.%m.%Y", "%Y/%m/%d"] {
        if let Ok(parsed) = NaiveDate::parse_from_str(date, format) {
            return parsed.format("%d/%m/%Y").to_string();
        }
    }

    date.to_string()
}

/// Format a CPF as XXX.XXX.XXX-XX. Inputs with extra digits (some exports
/// concatenate agency digits) keep the first 11; anything shorter than a
/// CPF passes through unchanged.
pub fn format_cpf(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < 11 {
        return raw.trim().to_string();
    }
    let cpf = &digits[..11];
    format!("{}.{}.{}-{}", &cpf[..3], &cpf[3..6], &cpf[6..9], &cpf[9..11])
}

/// Format a monetary value with decimal comma and thousands dots
/// (1500.39 → "1.500,39"). Values already decimal-comma formatted pass
/// through; empty or unparseable values become "0,00".
pub fn format_value_br(raw: &str) -> String {
    let clean = raw.trim().replace("R$", "").replace(' ', "");
    if clean.is_empty() {
        return "0,00".to_string();
    }

    // Already Brazilian: one comma, two decimals
    if let Some((_, decimals)) = clean.split_once(',') {
        if clean.matches(',').count() == 1 && decimals.len() == 2 {
            return clean;
        }
    }

    let numeric = clean.replace(',', "");
    match numeric.parse::<f64>() {
        Ok(value) => format_float_br(value),
        Err(_) => raw.trim().to_string(),
    }
}

fn format_float_br(value: f64) -> String {
    let negative = value < 0.0;
    let cents = (value.abs() * 100.0).round() as u64;
    let integer = cents / 100;
    let fraction = cents % 100;

    let digits = integer.to_string();
    let mut grouped = String::new();
    for (position, c) in digits.chars().enumerate() {
        if position > 0 && (digits.len() - position) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }

    format!(
        "{}{},{:02}",
        if negative { "-" } else { "" },
        grouped,
        fraction
    )
}

// ============================================================================
// RESULT CSV
// ============================================================================

/// Render the consolidated result CSV for a set of resolved records.
pub fn render_result_csv(records: &[ResolvedRecord]) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b';')
        .from_writer(Vec::new());

    writer
        .write_record(OUTPUT_COLUMNS)
        .context("failed to write result header")?;

    for record in records {
        let fields = &record.fields;
        let code = record
            .resolution
            .code
            .clone()
            .unwrap_or_else(|| UNMAPPED_CODE.to_string());
        let rate = record.resolution.rate.clone().unwrap_or_default();
        let registration_date = format_date_br(&fields.registration_date);
        let payment_date = format_date_br(&fields.payment_date);
        let installment_value = format_value_br(&fields.installment_value);
        let operation_value = format_value_br(&fields.operation_value);
        let released_value = format_value_br(&fields.released_value);
        let cpf = format_cpf(&fields.cpf);

        writer
            .write_record([
                fields.identity_key.as_str(),
                registration_date.as_str(),
                fields.bank.as_str(),
                fields.product_type.as_str(),
                fields.modality.as_str(),
                fields.table_name.as_str(),
                code.as_str(),
                rate.as_str(),
                fields.installments.as_str(),
                installment_value.as_str(),
                operation_value.as_str(),
                released_value.as_str(),
                record.status.as_str(),
                payment_date.as_str(),
                cpf.as_str(),
                fields.client_name.as_str(),
            ])
            .context("failed to write result row")?;
    }

    let bytes = writer.into_inner().context("failed to flush result csv")?;
    String::from_utf8(bytes).context("result csv was not valid UTF-8")
}

/// Write the consolidated result CSV to disk.
pub fn write_result_csv(records: &[ResolvedRecord], path: &Path) -> Result<()> {
    let csv = render_result_csv(records)?;
    std::fs::write(path, csv)
        .with_context(|| format!("failed to write result file {}", path.display()))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::banks::RecordFields;
    use crate::resolver::{MatchKind, ResolutionResult};

    #[test]
    fn test_format_date_br_passthrough_and_iso() {
        assert_eq!(format_date_br("25/12/2024"), "25/12/2024");
        assert_eq!(format_date_br("2024-12-25"), "25/12/2024");
        assert_eq!(format_date_br("25/12/24"), "25/12/2024");
        assert_eq!(format_date_br("25/12/2024 14:30:00"), "25/12/2024");
        assert_eq!(format_date_br(""), "");
        assert_eq!(format_date_br("sem data"), "sem data");
    }

    #[test]
    fn test_format_cpf() {
        assert_eq!(format_cpf("12345678901"), "123.456.789-01");
        assert_eq!(format_cpf("123.456.789-01"), "123.456.789-01");
        // Extra digits keep the first 11
        assert_eq!(format_cpf("1234567890199"), "123.456.789-01");
        assert_eq!(format_cpf("123"), "123");
        assert_eq!(format_cpf(""), "");
    }

    #[test]
    fn test_format_value_br() {
        assert_eq!(format_value_br("1500.39"), "1.500,39");
        assert_eq!(format_value_br("87.5"), "87,50");
        assert_eq!(format_value_br("87"), "87,00");
        assert_eq!(format_value_br("1.500,39"), "1.500,39");
        assert_eq!(format_value_br("R$ 2000.00"), "2.000,00");
        assert_eq!(format_value_br(""), "0,00");
        assert_eq!(format_value_br("1234567.89"), "1.234.567,89");
    }

    fn sample_record(code: Option<&str>) -> ResolvedRecord {
        let resolution = match code {
            Some(code) => ResolutionResult {
                code: Some(code.to_string()),
                rate: Some("1,80".to_string()),
                matched: true,
                kind: MatchKind::Exact,
            },
            None => ResolutionResult {
                code: None,
                rate: None,
                matched: false,
                kind: MatchKind::None,
            },
        };
        ResolvedRecord {
            fields: RecordFields {
                bank: "AVERBAI".to_string(),
                product_type: "FGTS".to_string(),
                modality: "Margem Livre (Novo)".to_string(),
                table_name: "Tabela Exponencial".to_string(),
                identity_key: "12345".to_string(),
                status: "Pago".to_string(),
                cpf: "12345678901".to_string(),
                client_name: "MARIA DA SILVA".to_string(),
                registration_date: "2025-06-01".to_string(),
                payment_date: String::new(),
                installments: "12".to_string(),
                installment_value: "150.00".to_string(),
                operation_value: "1800.00".to_string(),
                released_value: "1500.39".to_string(),
                ..Default::default()
            },
            status: "PAGO".to_string(),
            resolution,
        }
    }

    #[test]
    fn test_render_result_csv_attaches_code_and_formats() {
        let csv = render_result_csv(&[sample_record(Some("994"))]).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next().unwrap(), OUTPUT_COLUMNS.join(";"));

        let row = lines.next().unwrap();
        assert!(row.contains(";994;"));
        assert!(row.contains("01/06/2025"));
        assert!(row.contains("123.456.789-01"));
        assert!(row.contains("1.500,39"));
    }

    #[test]
    fn test_render_result_csv_marks_unmapped_rows() {
        let csv = render_result_csv(&[sample_record(None)]).unwrap();
        assert!(csv.contains(UNMAPPED_CODE));
    }
}
