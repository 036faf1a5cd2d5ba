//! Shared whitespace-column text parsing for the consistent_trees-family
//! dialects: every halo row is one whitespace-separated line, and a fixed
//! `name -> column index` table (from the dialect's header/definitions)
//! says which token is which field.
//!
//! Grounded in `original_source/ytree/frontends/consistent_trees/io.py`'s
//! `ldata[fi[field]["column"]]` indexing.

use arbor_error::{Error, Result};

#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub index: usize,
    pub unit: &'static str,
}

pub fn column_index(columns: &[Column], name: &str) -> Result<usize> {
    columns
        .iter()
        .find(|c| c.name == name)
        .map(|c| c.index)
        .ok_or_else(|| Error::field_not_found(name))
}

pub fn parse_token(line: &str, column: usize) -> Result<f64> {
    line.split_whitespace()
        .nth(column)
        .ok_or_else(|| Error::header_malformed(format!("row has no column {}", column)))?
        .parse::<f64>()
        .map_err(|e| Error::header_malformed(format!("could not parse column {}: {}", column, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const COLUMNS: &[Column] =
        &[Column { name: "uid", index: 1, unit: "" }, Column { name: "mvir", index: 10, unit: "Msun/h" }];

    #[test]
    fn finds_registered_column() {
        assert_eq!(column_index(COLUMNS, "mvir").unwrap(), 10);
        assert!(column_index(COLUMNS, "missing").is_err());
    }

    #[test]
    fn parses_the_requested_token() {
        let line = "0.5 123 0 -1 0 7 8 9 10 11 1.2e13";
        assert_eq!(parse_token(line, 10).unwrap(), 1.2e13);
        assert!(parse_token(line, 99).is_err());
    }
}
