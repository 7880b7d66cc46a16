//! Table formatting utilities for structured output.

use comfy_table::{
    Attribute, Cell, ContentArrangement, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL,
};

use crate::search::{ResultRecord, ServiceStatus};

/// Builder for creating formatted tables.
pub struct TableBuilder {
    table: Table,
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TableBuilder {
    /// Create a new table builder.
    pub fn new() -> Self {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        // Apply rounded corners
        table.apply_modifier(UTF8_ROUND_CORNERS);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        Self { table }
    }

    /// Set the table headers.
    pub fn set_headers(mut self, headers: Vec<&str>) -> Self {
        let header_cells: Vec<Cell> = headers
            .into_iter()
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
            .collect();
        self.table.set_header(header_cells);
        self
    }

    /// Add a row to the table.
    pub fn add_row(mut self, row: Vec<String>) -> Self {
        self.table.add_row(row);
        self
    }

    /// Build and return the formatted table.
    pub fn build(self) -> String {
        self.table.to_string()
    }
}

/// Create the results table for a search.
///
/// An explanation column is added only when some match carries one.
pub fn create_results_table(matches: &[ResultRecord]) -> String {
    let explained = matches.iter().any(|m| m.ai_explanation.is_some());

    let mut headers = vec!["#", "Verse", "Text", "Distance"];
    if explained {
        headers.push("Explanation");
    }

    matches
        .iter()
        .fold(TableBuilder::new().set_headers(headers), |table, m| {
            let mut row = vec![
                m.rank.to_string(),
                format!("{}.{}", m.chapter, m.verse),
                m.text.clone(),
                format!("{:.4}", m.distance),
            ];
            if explained {
                row.push(m.ai_explanation.clone().unwrap_or_default());
            }
            table.add_row(row)
        })
        .build()
}

/// Create a key/value table describing the service.
pub fn create_status_table(status: &ServiceStatus) -> String {
    let mut builder = TableBuilder::new()
        .set_headers(vec!["Property", "Value"])
        .add_row(vec!["State".to_string(), format!("{:?}", status.state)]);

    if let Some(reason) = &status.reason {
        builder = builder.add_row(vec!["Reason".to_string(), reason.clone()]);
    }
    if let Some(backend) = status.backend {
        builder = builder.add_row(vec!["Backend".to_string(), backend.to_string()]);
    }
    if let Some(model) = &status.model_name {
        let model = match status.dimension {
            Some(dim) => format!("{model} ({dim} dimensions)"),
            None => model.clone(),
        };
        builder = builder.add_row(vec!["Model".to_string(), model]);
    }
    if status.reason.is_none() {
        builder = builder
            .add_row(vec!["Entries".to_string(), status.entries.to_string()])
            .add_row(vec!["Corpus verses".to_string(), status.corpus_len.to_string()]);
    }
    if let Some(built_at) = status
        .built_at
        .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
    {
        builder = builder.add_row(vec![
            "Built".to_string(),
            built_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        ]);
    }
    builder
        .add_row(vec![
            "Explanations".to_string(),
            if status.explanations { "enabled" } else { "disabled" }.to_string(),
        ])
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(rank: usize, explanation: Option<&str>) -> ResultRecord {
        ResultRecord {
            rank,
            chapter: 2,
            verse: 46 + rank as u32,
            text: "Perform your duty".to_string(),
            interpretation: String::new(),
            distance: 0.25,
            ai_explanation: explanation.map(str::to_string),
        }
    }

    #[test]
    fn test_table_builder() {
        let table = TableBuilder::new()
            .set_headers(vec!["Column 1", "Column 2"])
            .add_row(vec!["Value 1".to_string(), "Value 2".to_string()])
            .build();

        assert!(table.contains("Column 1"));
        assert!(table.contains("Value 1"));
    }

    #[test]
    fn test_results_table_columns() {
        let plain = create_results_table(&[record(1, None)]);
        assert!(plain.contains("2.47"));
        assert!(plain.contains("0.2500"));
        assert!(!plain.contains("Explanation"));

        let explained = create_results_table(&[record(1, Some("Act selflessly"))]);
        assert!(explained.contains("Explanation"));
        assert!(explained.contains("Act selflessly"));
    }
}
