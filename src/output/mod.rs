use serde::Serialize;

use crate::pagination;
use crate::query;
use crate::session::{ColumnDef, TableView};
use crate::state::TableStateSnapshot;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "text" | "txt" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct PageReport {
    pub url: String,
    pub sort: Option<String>,
    pub search: Option<String>,
    pub page: usize,
    pub page_size: usize,
    pub page_count: usize,
    pub total_count: u64,
    pub can_previous_page: bool,
    pub can_next_page: bool,
    pub columns: Vec<ColumnDef>,
    pub rows: Vec<Vec<String>>,
}

pub fn build_report(
    url: &str,
    snapshot: &TableStateSnapshot,
    view: &TableView,
    columns: &[ColumnDef],
) -> PageReport {
    let page_index = snapshot.pagination.page_index();
    let rows = view
        .rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|c| row.cell(&c.id).unwrap_or_default())
                .collect()
        })
        .collect();
    PageReport {
        url: url.to_string(),
        sort: snapshot.sort.as_ref().map(query::format_sort),
        search: (!snapshot.filters.is_empty()).then(|| query::format_search(&snapshot.filters)),
        page: snapshot.pagination.page_number(),
        page_size: snapshot.pagination.page_size(),
        page_count: view.page_count,
        total_count: view.total_count,
        can_previous_page: pagination::can_previous_page(page_index),
        can_next_page: pagination::can_next_page(page_index, view.page_count),
        columns: columns.to_vec(),
        rows,
    }
}

pub fn page_footer(report: &PageReport) -> String {
    format!("Page {} of {}", report.page, report.page_count)
}

pub fn render_text(report: &PageReport) -> Vec<u8> {
    let mut widths: Vec<usize> = report
        .columns
        .iter()
        .map(|c| c.header.chars().count())
        .collect();
    for row in report.rows.iter() {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.chars().count());
            }
        }
    }

    let mut out = String::new();
    let headers: Vec<&str> = report.columns.iter().map(|c| c.header.as_str()).collect();
    push_line(&mut out, &headers, &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    push_line(&mut out, &rule, &widths);
    for row in report.rows.iter() {
        push_line(&mut out, row, &widths);
    }
    if report.rows.is_empty() {
        out.push_str("(no rows)\n");
    }
    out.push('\n');
    out.push_str(&page_footer(report));
    out.push_str(&format!(" ({} total)\n", report.total_count));
    out.into_bytes()
}

fn push_line<S: AsRef<str>>(out: &mut String, cells: &[S], widths: &[usize]) {
    let line = cells
        .iter()
        .zip(widths.iter())
        .map(|(cell, w)| format!("{:<width$}", cell.as_ref(), width = *w))
        .collect::<Vec<_>>()
        .join("  ");
    out.push_str(line.trim_end());
    out.push('\n');
}

pub fn render_json(report: &PageReport) -> Vec<u8> {
    serde_json::to_vec_pretty(report).unwrap_or_else(|_| b"{}\n".to_vec())
}

pub fn render(report: &PageReport, format: OutputFormat) -> Vec<u8> {
    match format {
        OutputFormat::Text => render_text(report),
        OutputFormat::Json => render_json(report),
    }
}
