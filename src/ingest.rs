// 📂 Dataset reader - uploaded bytes → tabular rows
// Partner banks export with whatever separator their tooling picked, so the
// separator is sniffed from the first lines. Encoding repair happens
// upstream; here a damaged byte only costs the characters it occupied.

use anyhow::{bail, Context, Result};
use csv::StringRecord;
use log::info;

use crate::normalize::normalize;

/// Separators seen in real partner exports, in preference order.
const CANDIDATE_SEPARATORS: [char; 4] = [';', ',', '\t', '|'];

/// Fold a header for matching: normalize, transliterate the Portuguese
/// accented letters, drop anything else non-ASCII (mojibake from damaged
/// encodings folds away instead of breaking the match).
pub fn fold_header(raw: &str) -> String {
    normalize(raw)
        .chars()
        .filter_map(|c| match c {
            'Á' | 'À' | 'Â' | 'Ã' => Some('A'),
            'É' | 'Ê' => Some('E'),
            'Í' => Some('I'),
            'Ó' | 'Ô' | 'Õ' => Some('O'),
            'Ú' | 'Ü' => Some('U'),
            'Ç' => Some('C'),
            c if c.is_ascii() => Some(c),
            _ => None,
        })
        .collect()
}

/// Pick the separator that appears most often in the first lines.
/// Ties and absence fall back to `;`, the dominant format.
pub fn sniff_separator(text: &str) -> char {
    let mut counts = [0usize; CANDIDATE_SEPARATORS.len()];
    for line in text.lines().take(5) {
        for (slot, separator) in CANDIDATE_SEPARATORS.iter().enumerate() {
            counts[slot] += line.matches(*separator).count();
        }
    }

    let mut best = 0;
    for slot in 1..counts.len() {
        if counts[slot] > counts[best] {
            best = slot;
        }
    }
    CANDIDATE_SEPARATORS[best]
}

// ============================================================================
// DATASET
// ============================================================================

/// A parsed upload: header row plus data rows, all kept as strings.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub filename: String,
    pub headers: Vec<String>,
    pub rows: Vec<StringRecord>,
}

impl Dataset {
    /// Parse an uploaded buffer. Structural problems (empty file, no data
    /// rows) are errors; the caller decides whether they fail the job.
    pub fn from_bytes(bytes: &[u8], filename: &str) -> Result<Self> {
        if bytes.is_empty() {
            bail!("file '{}' is empty", filename);
        }

        let text = String::from_utf8_lossy(bytes);
        let separator = sniff_separator(&text);

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(separator as u8)
            .flexible(true)
            .from_reader(text.as_bytes());

        let headers: Vec<String> = reader
            .headers()
            .with_context(|| format!("failed to read headers of '{}'", filename))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for row in reader.records() {
            let row = row.with_context(|| format!("failed to parse a row of '{}'", filename))?;
            // Drop rows that are entirely empty cells
            if row.iter().any(|cell| !cell.trim().is_empty()) {
                rows.push(row);
            }
        }

        if rows.is_empty() {
            bail!("file '{}' contains no data rows", filename);
        }

        info!(
            "Read '{}': separator '{}', {} columns, {} rows",
            filename,
            separator.escape_default(),
            headers.len(),
            rows.len()
        );

        Ok(Dataset {
            filename: filename.to_string(),
            headers,
            rows,
        })
    }

    /// Find the first column whose folded header contains any of the given
    /// patterns (patterns given pre-folded: uppercase, unaccented).
    pub fn find_column(&self, patterns: &[&str]) -> Option<usize> {
        self.headers.iter().position(|header| {
            let folded = fold_header(header);
            patterns.iter().any(|pattern| folded.contains(pattern))
        })
    }

    /// Cell accessor, trimmed; missing cells read as empty.
    pub fn cell<'a>(&self, row: &'a StringRecord, column: Option<usize>) -> &'a str {
        column
            .and_then(|idx| row.get(idx))
            .map(str::trim)
            .unwrap_or("")
    }
}

// ============================================================================
// TESTS
// ============================================================================
