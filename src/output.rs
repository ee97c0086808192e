//! Rendering of fetch results for the terminal.

use chrono::{DateTime, Utc};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, Table};
use serde::Serialize;
use strum_macros::{Display, EnumIter, EnumString};
use std::fmt;

use crate::error::{FetchError, FetchErrorKind};
use crate::target::Target;
use crate::CertificateReport;

const FAILURE_MESSAGE: &str = "Failed to retrieve certificate";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum OutputFormat {
    Text,
    Json,
    Table,
}

/// Outcome of fetching one target.
#[derive(Debug)]
pub struct HostResult {
    pub target: Target,
    pub result: Result<CertificateReport, FetchError>,
}

impl HostResult {
    pub fn new(target: Target, result: Result<CertificateReport, FetchError>) -> Self {
        HostResult { target, result }
    }
}

/// Shape of a failed fetch in JSON output.
#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct FailureRecord<'a> {
    tested_server: &'a str,
    port: u16,
    message: &'static str,
    error: String,
    error_kind: FetchErrorKind,
}

#[derive(Serialize)]
#[serde(untagged)]
enum JsonEntry<'a> {
    Report(&'a CertificateReport),
    Failure(FailureRecord<'a>),
}

pub fn render(results: &[HostResult], format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => render_text(results),
        OutputFormat::Json => render_json(results),
        OutputFormat::Table => render_table(results),
    }
}

fn format_date(date: &DateTime<Utc>) -> String {
    date.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

pub fn render_text(results: &[HostResult]) -> String {
    let mut out = String::new();
    for host in results {
        out.push_str("--------------------------------------\n");
        match &host.result {
            Ok(report) => {
                out.push_str(&format!("Tested server: {}\n", report.tested_server));
                out.push_str(&format!("Port: {}\n", report.port));
                out.push_str(&format!("Common name: {}\n", report.common_name));
                out.push_str(&format!("Issuer: {}\n", report.issuer_name));
                out.push_str(&format!("Valid from: {}\n", format_date(&report.start_date)));
                out.push_str(&format!("Valid to: {}\n", format_date(&report.end_date)));
                out.push_str(&format!("Thumbprint: {}\n", report.thumbprint));
                if report.subject_alternative_names.is_available() {
                    out.push_str("Subject Alternative Names:\n");
                    for san in report.subject_alternative_names.names() {
                        out.push_str(&format!("\t{}\n", san));
                    }
                } else {
                    out.push_str(&format!(
                        "Subject Alternative Names: {}\n",
                        report.subject_alternative_names
                    ));
                }
                if let Some(message) = &report.message {
                    out.push_str(&format!("Message: {}\n", message));
                }
            }
            Err(err) => {
                out.push_str(&format!("Tested server: {}\n", host.target.host));
                out.push_str(&format!("Port: {}\n", host.target.port));
                out.push_str(&format!("Message: {}\n", FAILURE_MESSAGE));
                out.push_str(&format!("Error: {}\n", err));
            }
        }
    }
    out
}

pub fn render_json(results: &[HostResult]) -> String {
    let entries: Vec<JsonEntry> = results
        .iter()
        .map(|host| match &host.result {
            Ok(report) => JsonEntry::Report(report),
            Err(err) => JsonEntry::Failure(FailureRecord {
                tested_server: &host.target.host,
                port: host.target.port,
                message: FAILURE_MESSAGE,
                error: err.to_string(),
                error_kind: err.kind(),
            }),
        })
        .collect();

    serde_json::to_string_pretty(&entries).unwrap_or_else(|e| json_error(&e))
}

/// Single-object JSON document carrying `message`, escaped as needed.
fn json_error(message: &dyn fmt::Display) -> String {
    serde_json::json!({ "Error": message.to_string() }).to_string()
}

pub fn render_table(results: &[HostResult]) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec![
            "Server",
            "Common Name",
            "Issuer",
            "Valid From",
            "Valid To",
            "Thumbprint",
            "SANs",
        ]);

    for host in results {
        match &host.result {
            Ok(report) => {
                table.add_row(vec![
                    Cell::new(host.target.to_string()),
                    Cell::new(&report.common_name),
                    Cell::new(&report.issuer_name),
                    Cell::new(format_date(&report.start_date)),
                    Cell::new(format_date(&report.end_date)),
                    Cell::new(&report.thumbprint),
                    Cell::new(report.subject_alternative_names.to_string()),
                ]);
            }
            Err(err) => {
                table.add_row(vec![
                    Cell::new(host.target.to_string()),
                    Cell::new(format!("{}: {}", FAILURE_MESSAGE, err)).fg(Color::Red),
                ]);
            }
        }
    }

    table.to_string()
}
