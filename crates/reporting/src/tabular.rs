//! Minimal CSV reading and writing for the pipeline's flat input and output
//! tables. Quoted fields with `""` escapes are supported in both directions.

use campaign_core::types::{Row, Table};
use campaign_core::{CampaignError, CampaignResult};

/// Parse CSV text into a [`Table`]. The first non-blank record is the header.
pub fn parse_csv(name: &str, text: &str) -> CampaignResult<Table> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut records = parse_records(name, text)?.into_iter();

    let Some(header) = records.next() else {
        return Err(CampaignError::Parse {
            table: name.to_string(),
            line: 1,
            column: String::new(),
            message: "missing header row".to_string(),
        });
    };
    let headers: Vec<String> = header.cells.iter().map(|h| h.trim().to_string()).collect();

    let mut rows = Vec::new();
    for row in records {
        if row.cells.len() != headers.len() {
            return Err(CampaignError::Parse {
                table: name.to_string(),
                line: row.line,
                column: String::new(),
                message: format!(
                    "expected {} fields, found {}",
                    headers.len(),
                    row.cells.len()
                ),
            });
        }
        rows.push(row);
    }

    Ok(Table::new(name, headers, rows))
}

fn parse_records(name: &str, text: &str) -> CampaignResult<Vec<Row>> {
    let mut records = Vec::new();
    let mut cells: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut quoted = false;
    let mut line = 1;
    let mut record_line = 1;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(c);
                }
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' if field.is_empty() => {
                in_quotes = true;
                quoted = true;
            }
            ',' => cells.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                cells.push(std::mem::take(&mut field));
                push_record(&mut records, std::mem::take(&mut cells), record_line, quoted);
                quoted = false;
                line += 1;
                record_line = line;
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(CampaignError::Parse {
            table: name.to_string(),
            line: record_line,
            column: String::new(),
            message: "unterminated quoted field".to_string(),
        });
    }
    if !field.is_empty() || !cells.is_empty() || quoted {
        cells.push(field);
        push_record(&mut records, cells, record_line, quoted);
    }

    Ok(records)
}

fn push_record(records: &mut Vec<Row>, cells: Vec<String>, line: usize, quoted: bool) {
    let blank = !quoted && cells.len() == 1 && cells[0].trim().is_empty();
    if !blank {
        records.push(Row { line, cells });
    }
}

/// Quote a cell only when it would otherwise break the record structure.
pub fn escape_cell(cell: &str) -> String {
    if cell.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

/// Render a header plus rows as CSV text with `\n` line endings.
pub fn write_csv(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut csv = headers
        .iter()
        .map(|h| escape_cell(h))
        .collect::<Vec<_>>()
        .join(",");
    csv.push('\n');
    for row in rows {
        let cells: Vec<String> = row.iter().map(|c| escape_cell(c)).collect();
        csv.push_str(&cells.join(","));
        csv.push('\n');
    }
    csv
}
