use std::path::Path;

use tracing::{info, warn};

/// Header of the column holding whitelist terms.
const TERM_COLUMN: &str = "university";

/// Case-insensitive allow-list of organization names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Whitelist {
    terms: Vec<String>,
}

impl Whitelist {
    pub fn new<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut terms: Vec<String> = terms
            .into_iter()
            .map(|t| t.as_ref().trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        terms.sort();
        terms.dedup();
        Self { terms }
    }

    /// Load the whitelist CSV. A missing file means "no filtering".
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Option<Self>> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(
                "Whitelist file {} not found, collecting without filtering",
                path.display()
            );
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)?;
        let whitelist = Self::from_csv(&content);
        info!("Loaded {} whitelist terms", whitelist.len());
        Ok(Some(whitelist))
    }

    /// Parse CSV content with a header row. Terms come from the `university`
    /// column, or the first column when no such header exists.
    pub fn from_csv(content: &str) -> Self {
        let mut records = csv_records(content.trim_start_matches('\u{feff}')).into_iter();
        let column = match records.next() {
            Some(header) => header
                .iter()
                .position(|h| h.trim() == TERM_COLUMN)
                .unwrap_or(0),
            None => return Self::default(),
        };

        Self::new(records.filter_map(|record| record.into_iter().nth(column)))
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn matches(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.terms.iter().any(|term| text.contains(term.as_str()))
    }
}

/// Whether an entry passes the optional whitelist. An absent or empty
/// whitelist admits everything.
pub fn admits(whitelist: Option<&Whitelist>, title: &str, summary: &str) -> bool {
    match whitelist {
        Some(list) if !list.is_empty() => list.matches(&format!("{} {}", title, summary)),
        _ => true,
    }
}

/// Split CSV content into records. Quoted fields may hold commas, doubled
/// quotes and line breaks. Blank lines are skipped.
fn csv_records(content: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => record.push(std::mem::take(&mut field)),
            '\r' if !in_quotes => {}
            '\n' if !in_quotes => finish_record(&mut records, &mut record, &mut field),
            _ => field.push(c),
        }
    }
    finish_record(&mut records, &mut record, &mut field);
    records
}

fn finish_record(records: &mut Vec<Vec<String>>, record: &mut Vec<String>, field: &mut String) {
    record.push(std::mem::take(field));
    let record = std::mem::take(record);
    if record.iter().any(|f| !f.trim().is_empty()) {
        records.push(record);
    }
}
