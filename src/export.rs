use chrono::{DateTime, Utc};
use std::io::{Cursor, Write};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::attend::CoreError;
use crate::report::ReportModel;
use crate::schedule;

/// Renders a `ReportModel` into downloadable artifacts. An `.xlsx`
/// workbook is a zip of OOXML parts, written straight into a
/// `ZipWriter` without a spreadsheet library in between.
/// Both exporters are deterministic for identical input: the only
/// generation-time value is the `generated_at` argument, which lands
/// in exactly one labelled header cell (and the PDF footer), so tests
/// can fix or mask it. Zip entries carry the crate's fixed default
/// mtime, never the wall clock.

const GENERATED_LABEL: &str = "Generated";

#[derive(Debug, Clone)]
enum Cell {
    Text(String),
    Num(i64),
}

fn text(v: impl Into<String>) -> Cell {
    Cell::Text(v.into())
}

/// `{unitName}_attendance_{YYYY-MM-DD}.{ext}`; the date is the session
/// date so re-exports of the same session collide by name.
pub fn export_file_name(report: &ReportModel, ext: &str) -> Result<String, CoreError> {
    let start = schedule::parse_instant(&report.session.starts_at, "startsAt")?;
    Ok(format!(
        "{}_attendance_{}.{}",
        sanitize_component(&report.unit.name),
        start.format("%Y-%m-%d"),
        ext
    ))
}

fn sanitize_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_was_sep = true;
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch);
            last_was_sep = false;
        } else if !last_was_sep {
            out.push('_');
            last_was_sep = true;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    if out.is_empty() {
        out.push_str("unit");
    }
    out
}

fn marked_time_text(marked_at: Option<&str>) -> String {
    match marked_at.and_then(|t| DateTime::parse_from_rfc3339(t).ok()) {
        Some(t) => t.with_timezone(&Utc).format("%H:%M").to_string(),
        None => "-".to_string(),
    }
}

fn status_text(present: bool) -> &'static str {
    if present {
        "Present"
    } else {
        "Absent"
    }
}

/// The report as a row grid: header key/value block, blank separator,
/// student table, blank separator, summary block. Shared by both
/// exporters so the two artifacts cannot drift apart.
fn report_rows(report: &ReportModel, generated_at: DateTime<Utc>) -> Result<Vec<Vec<Cell>>, CoreError> {
    let (start, end) = schedule::session_window(&report.session)?;

    let mut rows: Vec<Vec<Cell>> = vec![
        vec![text("Unit"), text(format!("{} {}", report.unit.code, report.unit.name))],
        vec![text("Course"), text(format!("{} {}", report.course.code, report.course.name))],
        vec![text("Level"), text(report.level.name.clone())],
        vec![text("Date"), text(start.format("%Y-%m-%d").to_string())],
        vec![
            text("Time"),
            text(format!("{} - {}", start.format("%H:%M"), end.format("%H:%M"))),
        ],
        vec![text("Location"), text(report.session.location.clone())],
        vec![
            text(GENERATED_LABEL),
            text(generated_at.format("%Y-%m-%d %H:%M:%S UTC").to_string()),
        ],
        vec![],
        vec![
            text("No."),
            text("Student ID"),
            text("Full Name"),
            text("Status"),
            text("Time Marked"),
        ],
    ];

    for (i, r) in report.students.iter().enumerate() {
        rows.push(vec![
            Cell::Num(i as i64 + 1),
            text(r.student_no.clone()),
            text(r.full_name.clone()),
            text(status_text(r.is_present)),
            text(marked_time_text(r.marked_at.as_deref())),
        ]);
    }

    rows.push(vec![]);
    rows.push(vec![text("Total"), Cell::Num(report.summary.total as i64)]);
    rows.push(vec![text("Present"), Cell::Num(report.summary.present as i64)]);
    rows.push(vec![text("Absent"), Cell::Num(report.summary.absent as i64)]);
    rows.push(vec![
        text("Attendance Rate"),
        text(format!("{}%", report.summary.rate)),
    ]);

    Ok(rows)
}

// ---------------------------------------------------------------- xlsx

pub fn export_spreadsheet(
    report: &ReportModel,
    generated_at: DateTime<Utc>,
) -> Result<Vec<u8>, CoreError> {
    let rows = report_rows(report, generated_at)?;
    let sheet_xml = sheet_xml(&rows);

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let parts: [(&str, &str); 5] = [
        ("[Content_Types].xml", CONTENT_TYPES_XML),
        ("_rels/.rels", ROOT_RELS_XML),
        ("xl/workbook.xml", WORKBOOK_XML),
        ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS_XML),
        ("xl/worksheets/sheet1.xml", &sheet_xml),
    ];
    for (name, body) in parts {
        zip.start_file(name, opts)
            .map_err(|e| CoreError::export(format!("failed to start {}: {}", name, e)))?;
        zip.write_all(body.as_bytes())
            .map_err(|e| CoreError::export(format!("failed to write {}: {}", name, e)))?;
    }

    let cursor = zip
        .finish()
        .map_err(|e| CoreError::export(format!("failed to finalize workbook: {}", e)))?;
    Ok(cursor.into_inner())
}

const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#;

const ROOT_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const WORKBOOK_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Attendance" sheetId="1" r:id="rId1"/></sheets></workbook>"#;

const WORKBOOK_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#;

fn sheet_xml(rows: &[Vec<Cell>]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );
    for (row_idx, row) in rows.iter().enumerate() {
        let row_no = row_idx + 1;
        if row.is_empty() {
            xml.push_str(&format!("<row r=\"{}\"/>", row_no));
            continue;
        }
        xml.push_str(&format!("<row r=\"{}\">", row_no));
        for (col_idx, cell) in row.iter().enumerate() {
            let cell_ref = format!("{}{}", column_letter(col_idx), row_no);
            match cell {
                Cell::Text(s) => xml.push_str(&format!(
                    "<c r=\"{}\" t=\"inlineStr\"><is><t>{}</t></is></c>",
                    cell_ref,
                    xml_escape(s)
                )),
                Cell::Num(n) => {
                    xml.push_str(&format!("<c r=\"{}\"><v>{}</v></c>", cell_ref, n))
                }
            }
        }
        xml.push_str("</row>");
    }
    xml.push_str("</sheetData></worksheet>");
    xml
}

fn column_letter(mut idx: usize) -> String {
    let mut out = String::new();
    loop {
        out.insert(0, (b'A' + (idx % 26) as u8) as char);
        if idx < 26 {
            break;
        }
        idx = idx / 26 - 1;
    }
    out
}

fn xml_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}

// ----------------------------------------------------------------- pdf

const PDF_ROWS_PER_PAGE: usize = 40;
const PAGE_WIDTH: f64 = 595.0;
const PAGE_HEIGHT: f64 = 842.0;
const MARGIN_LEFT: f64 = 50.0;
const BODY_TOP: f64 = 770.0;
const LINE_HEIGHT: f64 = 14.0;

/// The same grid as the spreadsheet, paginated into a hand-written
/// PDF 1.4 (built-in Courier, uncompressed content streams). Footer
/// carries `Page N of M` and the generation timestamp.
pub fn export_document(
    report: &ReportModel,
    generated_at: DateTime<Utc>,
) -> Result<Vec<u8>, CoreError> {
    let rows = report_rows(report, generated_at)?;
    let lines: Vec<String> = rows.iter().map(|r| row_as_line(r)).collect();

    let title = format!("{} {} - Attendance", report.unit.code, report.unit.name);
    let footer_stamp = generated_at.format("%Y-%m-%d %H:%M:%S UTC").to_string();

    let pages: Vec<&[String]> = lines.chunks(PDF_ROWS_PER_PAGE).collect();
    let page_count = pages.len().max(1);

    // Object layout: 1 catalog, 2 page tree, 3 font, then for each page
    // a page object followed by its content stream.
    let mut objects: Vec<String> = Vec::with_capacity(3 + page_count * 2);
    let kids: Vec<String> = (0..page_count)
        .map(|i| format!("{} 0 R", 4 + i * 2))
        .collect();
    objects.push("<< /Type /Catalog /Pages 2 0 R >>".to_string());
    objects.push(format!(
        "<< /Type /Pages /Kids [{}] /Count {} >>",
        kids.join(" "),
        page_count
    ));
    objects.push("<< /Type /Font /Subtype /Type1 /BaseFont /Courier >>".to_string());

    for page_no in 1..=page_count {
        let body: &[String] = pages.get(page_no - 1).map(|c| *c).unwrap_or(&[]);
        let stream = page_stream(&title, body, page_no, page_count, &footer_stamp);
        let content_obj = 4 + (page_no - 1) * 2 + 1;
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {} {}] \
             /Resources << /Font << /F1 3 0 R >> >> /Contents {} 0 R >>",
            PAGE_WIDTH, PAGE_HEIGHT, content_obj
        ));
        objects.push(format!(
            "<< /Length {} >>\nstream\n{}endstream",
            stream.len(),
            stream
        ));
    }

    Ok(assemble_pdf(&objects))
}

fn row_as_line(row: &[Cell]) -> String {
    let cols: Vec<String> = row
        .iter()
        .map(|c| match c {
            Cell::Text(s) => s.clone(),
            Cell::Num(n) => n.to_string(),
        })
        .collect();
    match cols.len() {
        0 => String::new(),
        2 => format!("{:<18}{}", cols[0], cols[1]),
        5 => format!(
            "{:<5}{:<14}{:<34}{:<9}{}",
            truncate(&cols[0], 4),
            truncate(&cols[1], 13),
            truncate(&cols[2], 33),
            truncate(&cols[3], 8),
            cols[4]
        ),
        _ => cols.join("  "),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

fn page_stream(
    title: &str,
    body: &[String],
    page_no: usize,
    page_count: usize,
    footer_stamp: &str,
) -> String {
    let mut ops = String::new();
    ops.push_str(&format!(
        "BT /F1 12 Tf {} {} Td ({}) Tj ET\n",
        MARGIN_LEFT,
        PAGE_HEIGHT - 45.0,
        pdf_escape(title)
    ));
    for (i, line) in body.iter().enumerate() {
        if line.is_empty() {
            continue;
        }
        let y = BODY_TOP - (i as f64) * LINE_HEIGHT;
        ops.push_str(&format!(
            "BT /F1 9 Tf {} {} Td ({}) Tj ET\n",
            MARGIN_LEFT,
            y,
            pdf_escape(line)
        ));
    }
    ops.push_str(&format!(
        "BT /F1 8 Tf {} 40 Td (Page {} of {} - generated {}) Tj ET\n",
        MARGIN_LEFT,
        page_no,
        page_count,
        pdf_escape(footer_stamp)
    ));
    ops
}

fn pdf_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '(' => out.push_str("\\("),
            ')' => out.push_str("\\)"),
            c if c.is_ascii() && !c.is_ascii_control() => out.push(c),
            // Courier/WinAnsi cannot carry arbitrary Unicode; degrade.
            _ => out.push('?'),
        }
    }
    out
}

fn assemble_pdf(objects: &[String]) -> Vec<u8> {
    let mut out: Vec<u8> = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");

    let mut offsets: Vec<usize> = Vec::with_capacity(objects.len());
    for (i, obj) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, obj).as_bytes());
    }

    let xref_offset = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \n");
    for off in &offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", off).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_offset
        )
        .as_bytes(),
    );
    out
}
