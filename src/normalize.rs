// 🧹 Record Normalizer - shared text canonicalization
// The same rules are applied to reference rows at index-build time and to
// incoming records at resolution time, so lookups stay deterministic.

/// Canonicalize a raw text field: trim, collapse internal whitespace runs
/// to a single space, uppercase.
///
/// Pure and idempotent: `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

// ============================================================================
// STATUS CANONICALIZATION
// ============================================================================

/// Known raw status variants, lowercased, mapped to the canonical set.
/// Collected from real partner-bank exports; extend as new variants show up.
const STATUS_VARIANTS: &[(&str, &str)] = &[
    // PAGO variants (proposal finished and paid out)
    ("pago", "PAGO"),
    ("paga", "PAGO"),
    ("pago ao cliente", "PAGO"),
    ("integrada", "PAGO"),
    ("integrado", "PAGO"),
    ("proposta integrada", "PAGO"),
    ("int", "PAGO"),
    ("finalizado", "PAGO"),
    ("finalizada", "PAGO"),
    ("finalizada / paga", "PAGO"),
    ("emitido", "PAGO"),
    ("quitado", "PAGO"),
    ("quitada", "PAGO"),
    ("concluido", "PAGO"),
    ("liberado", "PAGO"),
    ("liberada", "PAGO"),
    ("credito liberado", "PAGO"),
    ("desembolsado", "PAGO"),
    ("desembolsada", "PAGO"),
    ("aprovado", "PAGO"),
    ("aprovada", "PAGO"),
    // CANCELADO variants (proposal cancelled/denied)
    ("cancelado", "CANCELADO"),
    ("cancelada", "CANCELADO"),
    ("cancelado permanentemente", "CANCELADO"),
    ("reprovado", "CANCELADO"),
    ("reprovada", "CANCELADO"),
    ("reprovada pelo banco", "CANCELADO"),
    ("reprovada por averbadora", "CANCELADO"),
    ("rejeitado", "CANCELADO"),
    ("rejeitada", "CANCELADO"),
    ("negado", "CANCELADO"),
    ("negada", "CANCELADO"),
    ("recusado", "CANCELADO"),
    ("recusada", "CANCELADO"),
    ("expirado", "CANCELADO"),
    ("expirada", "CANCELADO"),
    ("proposta expirada", "CANCELADO"),
    ("invalido", "CANCELADO"),
    ("invalida", "CANCELADO"),
    ("nao aprovado", "CANCELADO"),
    ("desistencia", "CANCELADO"),
    ("cliente desistiu", "CANCELADO"),
    ("rep", "CANCELADO"),
    ("can", "CANCELADO"),
    // AGUARDANDO variants (proposal still in flight)
    ("aguardando", "AGUARDANDO"),
    ("aguardando pagamento", "AGUARDANDO"),
    ("aguardando averbacao", "AGUARDANDO"),
    ("aguardando portabilidade", "AGUARDANDO"),
    ("aguardando saldo cip", "AGUARDANDO"),
    ("aguardando assinatura", "AGUARDANDO"),
    ("aguardando prova de vida", "AGUARDANDO"),
    ("aguardando prova de vida / assinatura", "AGUARDANDO"),
    ("andamento", "AGUARDANDO"),
    ("em andamento", "AGUARDANDO"),
    ("and", "AGUARDANDO"),
    ("pendente", "AGUARDANDO"),
    ("pendencia", "AGUARDANDO"),
    ("pendencia autorizacao", "AGUARDANDO"),
    ("pendencia / documentacao", "AGUARDANDO"),
    ("pendente documentacao", "AGUARDANDO"),
    ("pendente formalizacao", "AGUARDANDO"),
    ("digitada", "AGUARDANDO"),
    ("digitada / aguardando formalizacao", "AGUARDANDO"),
    ("criada / aguardando link de formalizacao", "AGUARDANDO"),
    ("emitido/aguardando averbacao", "AGUARDANDO"),
    ("formalizacao", "AGUARDANDO"),
    ("checagem - mesa formalizacao", "AGUARDANDO"),
    ("em aberto", "AGUARDANDO"),
    ("aberto", "AGUARDANDO"),
    ("aberta", "AGUARDANDO"),
    ("analise", "AGUARDANDO"),
    ("em analise", "AGUARDANDO"),
    ("analise corban", "AGUARDANDO"),
    ("processando", "AGUARDANDO"),
    ("em processamento", "AGUARDANDO"),
    ("cadastrada", "AGUARDANDO"),
    ("cadastrado", "AGUARDANDO"),
    ("nova", "AGUARDANDO"),
    ("novo", "AGUARDANDO"),
    ("enviado", "AGUARDANDO"),
    ("enviada", "AGUARDANDO"),
];

/// Map a raw status cell to the canonical set (PAGO / CANCELADO /
/// AGUARDANDO). Unknown values pass through normalized so they are still
/// counted in the status distribution rather than dropped.
pub fn normalize_status(raw: &str) -> String {
    let trimmed = normalize(raw);
    if trimmed.is_empty() {
        return "AGUARDANDO".to_string();
    }
    let lookup = trimmed.to_lowercase();
    for (variant, canonical) in STATUS_VARIANTS {
        if *variant == lookup {
            return (*canonical).to_string();
        }
    }
    trimmed
}

// ============================================================================
// MODALITY CANONICALIZATION
// ============================================================================

/// Exact modality variants mapped to the canonical set.
const MODALITY_VARIANTS: &[(&str, &str)] = &[
    ("margem livre (novo)", "MARGEM LIVRE (NOVO)"),
    ("margem livre", "MARGEM LIVRE"),
    ("novo", "MARGEM LIVRE (NOVO)"),
    ("saque fgts", "MARGEM LIVRE (NOVO)"),
    ("consignado fgts", "MARGEM LIVRE (NOVO)"),
    ("consignado inss", "MARGEM LIVRE (NOVO)"),
    ("portabilidade", "PORTABILIDADE"),
    ("portabilidade + refin", "PORTABILIDADE + REFIN"),
    ("refinanciamento", "REFINANCIAMENTO"),
    ("refinanciamento da portabilidade", "REFINANCIAMENTO DA PORTABILIDADE"),
    ("refinanciamento de portabilidade", "REFINANCIAMENTO DA PORTABILIDADE"),
    ("refin portabilidade", "REFINANCIAMENTO DA PORTABILIDADE"),
];

/// Canonicalize an operation/modality description.
///
/// Tries the exact variant table first, then keyword rules, and finally
/// falls back to the normalized input so the composite key still carries
/// whatever the bank reported.
pub fn canonical_modality(raw: &str) -> String {
    let normalized = normalize(raw);
    if normalized.is_empty() {
        return normalized;
    }
    let lookup = normalized.to_lowercase();

    for (variant, canonical) in MODALITY_VARIANTS {
        if *variant == lookup {
            return (*canonical).to_string();
        }
    }

    // Keyword rules: most specific combination first
    if lookup.contains("portabilidade") && lookup.contains("refin") {
        return "REFINANCIAMENTO DA PORTABILIDADE".to_string();
    }
    if lookup.contains("portabilidade") {
        return "PORTABILIDADE".to_string();
    }
    if lookup.contains("refinanciamento") {
        return "REFINANCIAMENTO".to_string();
    }
    if lookup.contains("margem") {
        return "MARGEM LIVRE (NOVO)".to_string();
    }

    normalized
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_trims_and_collapses() {
        assert_eq!(normalize(" Tabela   EXP "), "TABELA EXP");
        assert_eq!(normalize("TABELA EXP"), "TABELA EXP");
        assert_eq!(normalize("\ttabela\n exp  "), "TABELA EXP");
    }

    #[test]
    fn test_normalize_idempotent() {
        let once = normalize("  Margem   livre (Novo)  ");
        assert_eq!(normalize(&once), once);
    }

    #[test]
    fn test_normalize_empty() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   "), "");
    }

    #[test]
    fn test_status_paid_variants() {
        assert_eq!(normalize_status("Pago"), "PAGO");
        assert_eq!(normalize_status("  integrada "), "PAGO");
        assert_eq!(normalize_status("FINALIZADA / PAGA"), "PAGO");
    }

    #[test]
    fn test_status_cancelled_variants() {
        assert_eq!(normalize_status("reprovada pelo banco"), "CANCELADO");
        assert_eq!(normalize_status("Expirada"), "CANCELADO");
    }

    #[test]
    fn test_status_pending_variants() {
        assert_eq!(normalize_status("em andamento"), "AGUARDANDO");
        assert_eq!(normalize_status("Digitada"), "AGUARDANDO");
    }

    #[test]
    fn test_status_unknown_passes_through() {
        assert_eq!(normalize_status("  status exotico "), "STATUS EXOTICO");
    }

    #[test]
    fn test_status_empty_defaults_to_pending() {
        assert_eq!(normalize_status(""), "AGUARDANDO");
    }

    #[test]
    fn test_modality_exact_variants() {
        assert_eq!(canonical_modality("Saque FGTS"), "MARGEM LIVRE (NOVO)");
        assert_eq!(canonical_modality("portabilidade"), "PORTABILIDADE");
    }

    #[test]
    fn test_modality_keyword_rules() {
        assert_eq!(
            canonical_modality("Refin da Portabilidade Especial"),
            "REFINANCIAMENTO DA PORTABILIDADE"
        );
        assert_eq!(canonical_modality("margem consignavel"), "MARGEM LIVRE (NOVO)");
    }

    #[test]
    fn test_modality_unknown_passes_through_normalized() {
        assert_eq!(canonical_modality(" cartao  rmc "), "CARTAO RMC");
    }
}
