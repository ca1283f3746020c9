use crate::query;
use crate::session::ColumnDef;
use crate::state::SortSpec;

/// `col:asc`, `col:desc`, or `none`.
pub fn parse_sort_arg(value: &str) -> Result<Option<SortSpec>, String> {
    let raw = value.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    query::parse_sort(&raw.to_ascii_lowercase().replace(' ', ""))
        .map(Some)
        .ok_or_else(|| "expected COL:asc or COL:desc".to_string())
}

/// `col:value`, split on the first colon. The value may be empty.
pub fn parse_filter_arg(value: &str) -> Result<(String, String), String> {
    let (column, filter) = value
        .split_once(':')
        .ok_or_else(|| "expected COL:VALUE".to_string())?;
    let column = column.trim();
    if column.is_empty() {
        return Err("column name is empty".to_string());
    }
    if filter.contains(',') {
        return Err("filter values cannot contain ','".to_string());
    }
    Ok((column.to_string(), filter.to_string()))
}

pub fn ensure_known_column(columns: &[ColumnDef], column: &str) -> Result<(), String> {
    if columns.iter().any(|c| c.id == column) {
        return Ok(());
    }
    let known = columns
        .iter()
        .map(|c| c.id.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    Err(format!("unknown column '{column}' (expected one of: {known})"))
}

pub fn parse_positive(value: usize, name: &str) -> Result<usize, String> {
    if value == 0 {
        return Err(format!("invalid {name}, expected positive integer"));
    }
    Ok(value)
}
