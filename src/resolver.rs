// 🔍 Resolver - composite-key lookup with containment fallback
// Exact match first; on miss, an ordered fallback search over the group's
// candidates with total, deterministic tie-breaks. Every fallback decision
// is logged with the candidate set considered, so an ambiguous reference
// file is observable instead of silently resolved.

use crate::normalize::{canonical_modality, normalize};
use crate::reference::{composite_key, group_key, MappingIndex, ReferenceEntry};
use log::{debug, info};
use serde::{Deserialize, Serialize};

// ============================================================================
// QUERY & RESULT TYPES
// ============================================================================

/// A normalized lookup tuple. Construction applies the same normalization
/// used at index-build time, so exact matches are deterministic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionQuery {
    pub bank: String,
    pub product_type: String,
    pub modality: String,
    pub table_name: String,
}

impl ResolutionQuery {
    pub fn new(bank: &str, product_type: &str, modality: &str, table_name: &str) -> Self {
        ResolutionQuery {
            bank: normalize(bank),
            product_type: normalize(product_type),
            modality: canonical_modality(modality),
            table_name: normalize(table_name),
        }
    }
}

/// How a record was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    /// Direct composite-key hit
    Exact,
    /// Bidirectional-containment match within the group
    Fallback,
    /// No candidate matched; the record is unmapped (counted, not rejected)
    None,
}

/// Outcome of resolving one record. Derived per record, never stored back
/// into the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub code: Option<String>,
    pub rate: Option<String>,
    pub matched: bool,
    pub kind: MatchKind,
}

impl ResolutionResult {
    fn hit(entry: &ReferenceEntry, kind: MatchKind) -> Self {
        ResolutionResult {
            code: Some(entry.code.clone()),
            rate: Some(entry.rate.clone()),
            matched: true,
            kind,
        }
    }

    fn unmapped() -> Self {
        ResolutionResult {
            code: None,
            rate: None,
            matched: false,
            kind: MatchKind::None,
        }
    }
}

// ============================================================================
// RESOLUTION
// ============================================================================

/// Resolve a normalized query against the index.
///
/// 1. Exact composite-key lookup.
/// 2. On miss, enumerate the group's candidates; a candidate matches when the
///    input table-name contains, or is contained in, the candidate's
///    normalized table-name.
/// 3. Tie-breaks among containment matches: equal-length match first, then
///    the shortest candidate table-name, then the first-inserted entry.
/// 4. No match is a valid outcome, not an error.
///
/// Read-only: the index is never mutated here.
pub fn resolve(index: &MappingIndex, query: &ResolutionQuery) -> ResolutionResult {
    let key = composite_key(
        &query.bank,
        &query.product_type,
        &query.modality,
        &query.table_name,
    );
    if let Some(entry) = index.lookup_exact(&key) {
        debug!("Exact match: '{}' -> {}", key, entry.code);
        return ResolutionResult::hit(entry, MatchKind::Exact);
    }

    let group = group_key(&query.bank, &query.product_type, &query.modality);
    let candidates = index.candidates(&group);
    if candidates.is_empty() {
        debug!("Unmapped: empty group '{}'", group);
        return ResolutionResult::unmapped();
    }

    match fallback_search(&query.table_name, candidates) {
        Some((position, entry)) => {
            info!(
                "Fallback match: '{}' -> '{}' (code {}, candidate {}/{} in group '{}')",
                query.table_name,
                entry.normalized_table_name(),
                entry.code,
                position + 1,
                candidates.len(),
                group
            );
            ResolutionResult::hit(entry, MatchKind::Fallback)
        }
        None => {
            debug!(
                "Unmapped: '{}' matched none of {} candidates in group '{}'",
                query.table_name,
                candidates.len(),
                group
            );
            ResolutionResult::unmapped()
        }
    }
}

/// Walk the group's candidates and pick the best containment match.
///
/// Returns the winning candidate's position and entry, or None. The full
/// candidate set considered is logged at debug level: ambiguous fallback
/// matches are the known failure mode of this lookup, and the log is how
/// they get diagnosed.
fn fallback_search<'a>(
    table_name: &str,
    candidates: &'a [ReferenceEntry],
) -> Option<(usize, &'a ReferenceEntry)> {
    let mut best: Option<(usize, String, &ReferenceEntry)> = None;

    for (position, candidate) in candidates.iter().enumerate() {
        let candidate_name = candidate.normalized_table_name();
        let contains = !table_name.is_empty()
            && !candidate_name.is_empty()
            && (candidate_name.contains(table_name) || table_name.contains(&candidate_name));

        debug!(
            "  candidate {}: '{}' (code {}) containment={}",
            position + 1,
            candidate_name,
            candidate.code,
            contains
        );
        if !contains {
            continue;
        }

        let replace = match &best {
            None => true,
            Some((_, current_name, _)) => prefer_over(&candidate_name, current_name, table_name),
        };
        if replace {
            best = Some((position, candidate_name, candidate));
        }
    }

    best.map(|(position, _, entry)| (position, entry))
}

/// Tie-break rule: does `challenger` beat the `current` best match?
///
/// (a) an equal-length match (identical string, given containment) beats a
/// partial one; (b) otherwise the shorter table-name wins (most specific);
/// (c) otherwise the earlier-inserted entry stands.
fn prefer_over(challenger: &str, current: &str, table_name: &str) -> bool {
    let challenger_equal = challenger.len() == table_name.len();
    let current_equal = current.len() == table_name.len();
    if challenger_equal != current_equal {
        return challenger_equal;
    }
    challenger.len() < current.len()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::MappingIndex;

    fn index_from(rows: &str) -> MappingIndex {
        let csv = format!("BANCO;ORGAO;TABELA;CODIGO;OPERACAO;TAXA\n{}", rows);
        MappingIndex::from_bytes(csv.as_bytes()).unwrap()
    }

    #[test]
    fn test_exact_match_returns_entry_code() {
        let index = index_from("BANCO X;FGTS;TABELA A;100;MARGEM LIVRE;1,80\n");
        let query = ResolutionQuery::new("banco x", "fgts", "margem livre", " tabela  a ");
        let result = resolve(&index, &query);

        assert!(result.matched);
        assert_eq!(result.kind, MatchKind::Exact);
        assert_eq!(result.code.as_deref(), Some("100"));
        assert_eq!(result.rate.as_deref(), Some("1,80"));
    }

    #[test]
    fn test_every_reference_entry_resolves_exactly() {
        let index = index_from(
            "BANCO X;FGTS;TABELA A;100;MARGEM LIVRE;1,80\n\
             BANCO X;FGTS;TABELA B;200;MARGEM LIVRE;1,85\n\
             BANCO Y;INSS;TABELA GOLD;300;PORTABILIDADE;1,66\n",
        );
        for (bank, product, modality, table, code) in [
            ("BANCO X", "FGTS", "MARGEM LIVRE", "TABELA A", "100"),
            ("BANCO X", "FGTS", "MARGEM LIVRE", "TABELA B", "200"),
            ("BANCO Y", "INSS", "PORTABILIDADE", "TABELA GOLD", "300"),
        ] {
            let result = resolve(&index, &ResolutionQuery::new(bank, product, modality, table));
            assert_eq!(result.kind, MatchKind::Exact);
            assert_eq!(result.code.as_deref(), Some(code));
        }
    }

    #[test]
    fn test_fallback_containment_single_candidate() {
        // Reference only knows the long form; the bank reports a prefix
        let index = index_from("BANCO X;FGTS;TABELA EXPONENCIAL;994;MARGEM LIVRE;1,80\n");
        let query = ResolutionQuery::new("BANCO X", "FGTS", "MARGEM LIVRE", "Tabela EXP");
        let result = resolve(&index, &query);

        assert!(result.matched);
        assert_eq!(result.kind, MatchKind::Fallback);
        assert_eq!(result.code.as_deref(), Some("994"));
    }

    #[test]
    fn test_fallback_containment_is_bidirectional() {
        // The bank reports a longer variant than the reference knows
        let index = index_from("BANCO X;FGTS;TABELA EXP;994;MARGEM LIVRE;1,80\n");
        let query =
            ResolutionQuery::new("BANCO X", "FGTS", "MARGEM LIVRE", "Tabela Exp Especial");
        let result = resolve(&index, &query);

        assert_eq!(result.kind, MatchKind::Fallback);
        assert_eq!(result.code.as_deref(), Some("994"));
    }

    #[test]
    fn test_equal_length_match_preferred_over_partial() {
        // "TABELA A" is contained in "TABELA A PREMIUM" too; the identical
        // candidate must win even though the premium row was inserted first
        let index = index_from(
            "BANCO X;FGTS;TABELA A PREMIUM;201;MARGEM LIVRE;1,85\n\
             BANCO X;FGTS;TABELA A;200;MARGEM LIVRE;1,80\n",
        );
        let result = resolve(
            &index,
            &ResolutionQuery::new("BANCO X", "FGTS", "MARGEM LIVRE", "tabela a"),
        );
        assert!(result.matched);
        assert_eq!(result.code.as_deref(), Some("200"));
    }

    #[test]
    fn test_tiebreak_shortest_candidate_wins() {
        let index = index_from(
            "BANCO X;FGTS;TABELA GOLD PREMIUM PLUS;301;MARGEM LIVRE;1,85\n\
             BANCO X;FGTS;TABELA GOLD PREMIUM;300;MARGEM LIVRE;1,80\n",
        );
        let result = resolve(
            &index,
            &ResolutionQuery::new("BANCO X", "FGTS", "MARGEM LIVRE", "TABELA GOLD"),
        );
        assert_eq!(result.kind, MatchKind::Fallback);
        assert_eq!(result.code.as_deref(), Some("300"));
    }

    #[test]
    fn test_tiebreak_first_inserted_wins_on_equal_specificity() {
        // Two distinct candidates, same length, both contain the input:
        // insertion order decides, deterministically
        let index = index_from(
            "BANCO X;FGTS;EXP TABELA UM;401;MARGEM LIVRE;1,85\n\
             BANCO X;FGTS;EXP TABELA DO;402;MARGEM LIVRE;1,80\n",
        );
        let result = resolve(
            &index,
            &ResolutionQuery::new("BANCO X", "FGTS", "MARGEM LIVRE", "EXP TABELA"),
        );
        assert_eq!(result.kind, MatchKind::Fallback);
        assert_eq!(result.code.as_deref(), Some("401"));
    }

    #[test]
    fn test_unmapped_when_group_is_empty() {
        let index = index_from("BANCO X;FGTS;TABELA A;100;MARGEM LIVRE;1,80\n");
        let result = resolve(
            &index,
            &ResolutionQuery::new("BANCO Z", "FGTS", "MARGEM LIVRE", "TABELA A"),
        );
        assert!(!result.matched);
        assert_eq!(result.kind, MatchKind::None);
        assert!(result.code.is_none());
    }

    #[test]
    fn test_unmapped_when_no_candidate_contains() {
        let index = index_from("BANCO X;FGTS;TABELA A;100;MARGEM LIVRE;1,80\n");
        let result = resolve(
            &index,
            &ResolutionQuery::new("BANCO X", "FGTS", "MARGEM LIVRE", "OUTRA COISA"),
        );
        assert!(!result.matched);
        assert_eq!(result.kind, MatchKind::None);
    }

    #[test]
    fn test_empty_table_name_never_matches_by_containment() {
        let index = index_from("BANCO X;FGTS;TABELA A;100;MARGEM LIVRE;1,80\n");
        let result = resolve(
            &index,
            &ResolutionQuery::new("BANCO X", "FGTS", "MARGEM LIVRE", "   "),
        );
        assert_eq!(result.kind, MatchKind::None);
    }

    #[test]
    fn test_tabela_a_beats_tabela_a_premium() {
        let index = index_from(
            "BANCO X;FGTS;TABELA A;500;MARGEM LIVRE;1,80\n\
             BANCO X;FGTS;TABELA A PREMIUM;501;MARGEM LIVRE;1,85\n",
        );
        let result = resolve(
            &index,
            &ResolutionQuery::new("BANCO X", "FGTS", "MARGEM LIVRE", "tabela a"),
        );
        assert!(result.matched);
        assert_eq!(result.code.as_deref(), Some("500"));
    }

    #[test]
    fn test_tabela_exp_matches_tabela_exponencial() {
        let index = index_from("BANCO X;FGTS;TABELA EXPONENCIAL;994;MARGEM LIVRE;1,80\n");
        let result = resolve(
            &index,
            &ResolutionQuery::new("BANCO X", "FGTS", "MARGEM LIVRE", "Tabela EXP"),
        );
        assert!(result.matched);
        assert_eq!(result.kind, MatchKind::Fallback);
        assert_eq!(result.code.as_deref(), Some("994"));
    }
}
