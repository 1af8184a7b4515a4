//! CSV export and HTML table of the final registry.
//!
//! Presentation only: rows are written exactly as the registry holds them.

use crate::config::SiteConfig;
use crate::error::{RegistryError, Result};
use crate::publication::Publication;
use crate::store::write_bytes_atomic;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;
use tracing::info;

/// CSV column order
pub const CSV_COLUMNS: &[&str] = &["Authors", "Title", "Journal", "Pub Date", "DOI", "Source"];

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    #[serde(rename = "Authors")]
    authors: &'a str,
    #[serde(rename = "Title")]
    title: &'a str,
    #[serde(rename = "Journal")]
    journal: &'a str,
    #[serde(rename = "Pub Date")]
    date: &'a str,
    #[serde(rename = "DOI")]
    doi: &'a str,
    #[serde(rename = "Source")]
    source: &'static str,
}

impl<'a> From<&'a Publication> for CsvRow<'a> {
    fn from(p: &'a Publication) -> Self {
        Self {
            authors: &p.authors,
            title: &p.title,
            journal: &p.journal,
            date: &p.date,
            doi: &p.doi,
            source: p.source.as_str(),
        }
    }
}

/// Render publications as CSV, one row per record, registry order.
pub fn render_csv<'a>(publications: impl IntoIterator<Item = &'a Publication>) -> Result<Vec<u8>> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    wtr.write_record(CSV_COLUMNS)?;

    for publication in publications {
        wtr.serialize(CsvRow::from(publication))?;
    }

    wtr.into_inner()
        .map_err(|e| RegistryError::Io(std::io::Error::other(e.to_string())))
}

pub fn write_csv<'a>(
    path: &Path,
    publications: impl IntoIterator<Item = &'a Publication>,
) -> Result<()> {
    let bytes = render_csv(publications)?;
    write_bytes_atomic(path, &bytes)?;
    info!(path = %path.display(), "CSV exported");
    Ok(())
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

const STYLE: &str = r#"
    body { font-family: Arial, sans-serif; margin: 0; color: #052d4f; }
    header { background-color: #000; padding: 2em; text-align: center; }
    header h1 { margin: 0; font-size: 2em; color: #fff; }
    .container { padding: 2em; }
    .source-note { font-weight: bold; font-size: 0.95em; color: #333; }
    .warning { background: #fff3cd; border: 1px solid #e0c060; padding: 0.6em 1em; margin: 1em 0; }
    input, select, button { margin: 0.5em 1em 0.5em 0; padding: 0.5em; font-size: 1em; }
    table { border-collapse: collapse; width: 100%; }
    th, td { border: 1px solid #ccc; padding: 8px; text-align: left; vertical-align: top; }
    th { background-color: #f0f0f0; }
    a { color: #00a0c6; text-decoration: none; }
    mark { background-color: yellow; }
    .match-count { margin: 1em 0; font-weight: bold; }
    footer { margin-top: 3em; padding: 1em; text-align: center; font-size: 0.9em; color: #666; }
"#;

const SCRIPT: &str = r#"
    function escapeRegExp(s) { return s.replace(/[.*+?^${}()|[\]\\]/g, "\\$&"); }
    function escapeHtml(s) {
      return s.replace(/&/g, "&amp;").replace(/</g, "&lt;").replace(/>/g, "&gt;");
    }
    function highlight(text, keyword) {
      const safe = escapeHtml(text);
      if (!keyword) return safe;
      return safe.replace(new RegExp("(" + escapeRegExp(escapeHtml(keyword)) + ")", "gi"), "<mark>$1</mark>");
    }
    function filterAll() {
      const year = document.getElementById("yearFilter").value;
      const keyword = document.getElementById("keywordInput").value.toLowerCase();
      const rows = document.querySelectorAll("tbody tr");
      let visible = 0;
      rows.forEach(row => {
        const yearMatch = year === "all" || row.dataset.year === year;
        let keywordMatch = keyword === "";
        row.querySelectorAll("td[data-text]").forEach(cell => {
          const text = cell.dataset.text;
          if (keyword && text.toLowerCase().includes(keyword)) keywordMatch = true;
          if (!cell.querySelector("a")) cell.innerHTML = highlight(text, keyword);
        });
        const show = yearMatch && keywordMatch;
        row.style.display = show ? "" : "none";
        if (show) visible++;
      });
      document.getElementById("matchCount").textContent =
        "Showing " + visible + " of " + rows.length + " results";
    }
    function resetFilters() {
      document.getElementById("yearFilter").value = "all";
      document.getElementById("keywordInput").value = "";
      filterAll();
    }
    function toggleColumn(index, visible) {
      document.querySelectorAll("table tr").forEach(row => {
        if (row.cells.length > index) row.cells[index].style.display = visible ? "" : "none";
      });
    }
"#;

/// Render the browsable HTML table.
///
/// Rows are sorted by date, newest first; records without a usable date go last.
pub fn render_html(
    publications: &[Publication],
    skipped: usize,
    site: &SiteConfig,
    exported_at: DateTime<Local>,
) -> String {
    let mut rows: Vec<&Publication> = publications.iter().collect();
    rows.sort_by_key(|p| Reverse(p.parsed_date()));

    let mut year_counts: BTreeMap<i32, usize> = BTreeMap::new();
    for p in &rows {
        if let Some(year) = p.year() {
            *year_counts.entry(year).or_default() += 1;
        }
    }

    let title = escape_html(&site.title);
    let total = rows.len();
    let mut html = String::new();

    // write! into a String cannot fail
    let _ = write!(
        html,
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"UTF-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{title}</title>\n<style>{STYLE}</style>\n<script>{SCRIPT}</script>\n</head>\n<body>\n\
         <header><h1>{title}</h1></header>\n<div class=\"container\">\n\
         <div class=\"source-note\">{note}</div>\n",
        note = escape_html(&site.source_note),
    );

    if skipped > 0 {
        let _ = writeln!(
            html,
            "<div class=\"warning\" id=\"skipBanner\">&#9888; {skipped} record(s) were skipped \
             because they lack a title or a usable date.</div>"
        );
    }

    let _ = writeln!(
        html,
        "<p><a href=\"publications.csv\" download><strong>&#11015; Download CSV</strong></a></p>"
    );

    html.push_str("<label for=\"yearFilter\">Filter by Year:</label>\n");
    html.push_str("<select id=\"yearFilter\" onchange=\"filterAll()\">\n");
    let _ = writeln!(html, "<option value=\"all\">All years ({total})</option>");
    for (year, count) in year_counts.iter().rev() {
        let _ = writeln!(html, "<option value=\"{year}\">{year} ({count})</option>");
    }
    html.push_str("</select>\n");
    html.push_str(
        "<label for=\"keywordInput\">Search:</label>\n\
         <input type=\"text\" id=\"keywordInput\" placeholder=\"Enter keyword...\" onkeyup=\"filterAll()\">\n\
         <button onclick=\"resetFilters()\">Reset</button>\n",
    );
    let _ = writeln!(
        html,
        "<div class=\"match-count\" id=\"matchCount\">Showing {total} of {total} results</div>"
    );

    html.push_str("<fieldset><legend>Toggle Columns:</legend>\n");
    for (i, name) in ["Authors", "Title", "Journal", "Pub Date", "DOI"].iter().enumerate() {
        let _ = writeln!(
            html,
            "<label><input type=\"checkbox\" checked onchange=\"toggleColumn({i}, this.checked)\"> {name}</label>"
        );
    }
    html.push_str("</fieldset>\n");

    html.push_str(
        "<table>\n<thead><tr><th>Authors</th><th>Publication Title</th><th>Journal</th>\
         <th>Pub Date</th><th>Article DOI</th></tr></thead>\n<tbody>\n",
    );
    for p in &rows {
        let year = p.year().map(|y| y.to_string()).unwrap_or_default();
        let doi_cell = if p.doi.is_empty() {
            String::new()
        } else {
            let doi = escape_html(&p.doi);
            format!("<a href=\"https://doi.org/{doi}\" target=\"_blank\" rel=\"noopener\">{doi}</a>")
        };
        let _ = writeln!(
            html,
            "<tr data-year=\"{year}\" data-source=\"{source}\">\
             <td data-text=\"{authors}\">{authors}</td>\
             <td data-text=\"{title}\">{title}</td>\
             <td data-text=\"{journal}\">{journal}</td>\
             <td data-text=\"{date}\">{date}</td>\
             <td data-text=\"{doi}\">{doi_cell}</td></tr>",
            source = p.source,
            authors = escape_html(&p.authors),
            title = escape_html(&p.title),
            journal = escape_html(&p.journal),
            date = escape_html(&p.formatted_date()),
            doi = escape_html(&p.doi),
        );
    }
    html.push_str("</tbody>\n</table>\n</div>\n");

    let _ = write!(
        html,
        "<footer>&copy; {year} {owner}.<br>Last export: {stamp}</footer>\n</body>\n</html>\n",
        year = exported_at.format("%Y"),
        owner = escape_html(&site.owner),
        stamp = exported_at.format("%Y-%m-%d %H:%M:%S"),
    );

    html
}

pub fn write_html(
    path: &Path,
    publications: &[Publication],
    skipped: usize,
    site: &SiteConfig,
) -> Result<()> {
    let html = render_html(publications, skipped, site, Local::now());
    write_bytes_atomic(path, html.as_bytes())?;
    info!(path = %path.display(), rows = publications.len(), "HTML generated");
    Ok(())
}
