//! Invoice document composer.
//!
//! Pure transformation of an assembled [`Invoice`] into one self-contained,
//! print-paginated HTML file at a caller-supplied path. The layout is fixed:
//! title, from/bill-to header, metadata grid, a two-row line-items table
//! (the second row shows unbilled preparation effort and never feeds the
//! totals), subtotal/total, payment details shaped by the payment method,
//! and a footer note.
//!
//! Every free-text value is HTML-escaped first and only then has the small
//! allow-list of formatting sequences restored. Restoring before escaping
//! would reopen the injection hole, so keep that order.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::Serialize;
use slug::slugify;
use tera::Tera;
use tracing::info;

use crate::error::{Error, Result};
use crate::model::{Invoice, MethodType, PaymentProfile};

// Embed template at compile time to ensure availability
const DOCUMENT_TEMPLATE: &str = include_str!("../templates/invoice.tera");
const TEMPLATE_NAME: &str = "invoice.tera";

const REFERENCE_PREFIX: &str = "Svc";
const FOOTER_NOTE: &str = "Thank you. Please use the payment reference shown above.";

#[derive(Serialize)]
struct LineItemRow {
    description: String,
    hours: String,
    rate: String,
    amount: String,
    muted: bool,
}

#[derive(Serialize)]
struct PaymentRow {
    label: &'static str,
    value: String,
}

#[derive(Serialize)]
struct DocumentContext {
    from_block: String,
    bill_to_block: String,
    invoice_number: String,
    invoice_date: String,
    terms_label: String,
    due_date: String,
    service_category: String,
    session_label: String,
    client_reference: String,
    currency: String,
    line_items: Vec<LineItemRow>,
    subtotal: String,
    total: String,
    payment_rows: Vec<PaymentRow>,
    footer_note: &'static str,
}

/// Renders `invoice` to `output_path`, creating parent directories as
/// needed, and returns the path written. Inputs are pre-validated by the
/// caller; an empty provider or recipient name is a caller bug and fails
/// fast instead of rendering a blank identity block.
pub fn build_invoice_document(invoice: &Invoice, output_path: &Path) -> Result<PathBuf> {
    if invoice.provider.display_name.trim().is_empty() {
        return Err(Error::InvalidInvoice("provider has no display name".into()));
    }
    if invoice.recipient.display_name.trim().is_empty() {
        return Err(Error::InvalidInvoice(
            "recipient has no display name".into(),
        ));
    }

    let context = build_context(invoice);

    let mut tera = Tera::default();
    tera.add_raw_template(TEMPLATE_NAME, DOCUMENT_TEMPLATE)?;
    let rendered = tera.render(TEMPLATE_NAME, &tera::Context::from_serialize(&context)?)?;

    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(output_path, rendered)?;
    info!(path = %output_path.display(), number = %invoice.invoice_number, "invoice document written");
    Ok(output_path.to_path_buf())
}

fn build_context(invoice: &Invoice) -> DocumentContext {
    let session_end =
        invoice.session_start + Duration::seconds((invoice.session_duration_hours * 3600.0) as i64);
    let due_date = invoice.invoice_date + Duration::days(i64::from(invoice.due_days));
    let billed = invoice.session_duration_hours * invoice.rate_per_hour;

    let session_label = format!(
        "{}  {}\u{2013}{}",
        fmt_date(invoice.session_start.date()),
        fmt_time(&invoice.session_start),
        fmt_time(&session_end),
    );

    let mut from_lines = vec![format!("<b>{}</b>", invoice.provider.display_name)];
    from_lines.extend(invoice.provider.address_lines.iter().cloned());
    if let Some(email) = trimmed(&invoice.provider.email) {
        from_lines.push(email.to_string());
    }

    let mut bill_lines = vec![
        "<b>Bill To:</b>".to_string(),
        invoice.recipient.display_name.clone(),
    ];
    bill_lines.extend(invoice.recipient.address_lines.iter().cloned());
    if let Some(email) = trimmed(&invoice.recipient.email) {
        bill_lines.push(email.to_string());
    }

    let line_items = vec![
        LineItemRow {
            description: sanitize(&format!(
                "{}\nSession date/time: {}",
                invoice.service_title, session_label
            )),
            hours: format!("{:.2}", invoice.session_duration_hours),
            rate: money(invoice.rate_per_hour),
            amount: money(billed),
            muted: false,
        },
        LineItemRow {
            description: sanitize(&format!(
                "Preparation (not billed): {:.2} hours\n{}",
                invoice.prep_hours, invoice.prep_description
            )),
            hours: format!("{:.2}", invoice.prep_hours),
            rate: money(invoice.prep_rate),
            // Informational only: never contributes to any total.
            amount: money(0.0),
            muted: true,
        },
    ];

    let reference = payment_reference(invoice);

    DocumentContext {
        from_block: sanitize(&from_lines.join("\n")),
        bill_to_block: sanitize(&bill_lines.join("\n")),
        invoice_number: sanitize(&invoice.invoice_number),
        invoice_date: fmt_date(invoice.invoice_date),
        terms_label: sanitize(&invoice.terms_label),
        due_date: fmt_date(due_date),
        service_category: sanitize(&invoice.service_category),
        session_label: session_label.clone(),
        client_reference: if invoice.student_name.trim().is_empty() {
            "-".to_string()
        } else {
            sanitize(&invoice.student_name)
        },
        currency: sanitize(&invoice.currency),
        line_items,
        subtotal: money(billed),
        total: money(billed),
        payment_rows: payment_rows(&invoice.payment_method, &reference, &invoice.currency),
        footer_note: FOOTER_NOTE,
    }
}

/// Escape first, then restore the three allowed formatting sequences, then
/// turn literal newlines into explicit breaks.
fn sanitize(text: &str) -> String {
    let mut s = text
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;");
    for (escaped, allowed) in [
        ("&lt;b&gt;", "<b>"),
        ("&lt;/b&gt;", "</b>"),
        ("&lt;br/&gt;", "<br/>"),
        ("&lt;br&gt;", "<br/>"),
    ] {
        s = s.replace(escaped, allowed);
    }
    s.replace('\n', "<br/>")
}

fn payment_rows(method: &PaymentProfile, reference: &str, currency: &str) -> Vec<PaymentRow> {
    let shown_currency = if method.detail("currency").trim().is_empty() {
        currency
    } else {
        method.detail("currency")
    };
    let mut rows = vec![
        PaymentRow {
            label: "Payment method",
            value: sanitize(&method.label),
        },
        PaymentRow {
            label: "Payment currency",
            value: sanitize(shown_currency),
        },
    ];
    match method.effective_type() {
        MethodType::Paypal => {
            rows.push(detail_row("PayPal email", method, "paypal_email"));
            rows.push(detail_row("PayPal link", method, "paypal_link"));
        }
        MethodType::BankDomestic => {
            rows.push(detail_row("Account holder", method, "account_holder"));
            rows.push(detail_row("Bank", method, "bank_name"));
            rows.push(detail_row("Sort code", method, "sort_code"));
            rows.push(detail_row("Account number", method, "account_number"));
        }
        MethodType::BankInternational | MethodType::BankTransfer => {
            rows.push(detail_row("Account holder", method, "account_holder"));
            rows.push(detail_row("Bank", method, "bank_name"));
            rows.push(detail_row("Sort code", method, "sort_code"));
            rows.push(detail_row("Account number", method, "account_number"));
            rows.push(detail_row("IBAN", method, "iban"));
            rows.push(detail_row("BIC/SWIFT", method, "bic"));
        }
    }
    rows.push(PaymentRow {
        label: "Reference",
        value: sanitize(reference),
    });
    rows
}

fn detail_row(label: &'static str, method: &PaymentProfile, key: &str) -> PaymentRow {
    PaymentRow {
        label,
        value: sanitize(method.detail(key)),
    }
}

/// Explicit reference if supplied, otherwise derived from the initials of
/// the client reference (falling back to the recipient name) plus the
/// session date in ddmmyy form.
fn payment_reference(invoice: &Invoice) -> String {
    if let Some(explicit) = trimmed(&invoice.reference) {
        return explicit.to_string();
    }
    let label = if invoice.student_name.trim().is_empty() {
        invoice.recipient.display_name.as_str()
    } else {
        invoice.student_name.as_str()
    };
    format!(
        "{}-{}-{}",
        REFERENCE_PREFIX,
        initials(label),
        invoice.session_start.format("%d%m%y")
    )
}

fn initials(name: &str) -> String {
    let letters: String = name
        .split_whitespace()
        .take(2)
        .filter_map(|word| word.chars().next())
        .flat_map(|c| c.to_uppercase())
        .collect();
    if letters.is_empty() {
        "XX".to_string()
    } else {
        letters
    }
}

/// Two decimal places with thousands separators.
fn money(value: f64) -> String {
    let raw = format!("{:.2}", value.abs());
    let (int_part, frac_part) = raw.split_once('.').unwrap_or((raw.as_str(), "00"));
    let mut grouped = String::new();
    for (i, ch) in int_part.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let int_grouped: String = grouped.chars().rev().collect();
    let sign = if value < 0.0 { "-" } else { "" };
    format!("{sign}{int_grouped}.{frac_part}")
}

fn fmt_date(date: NaiveDate) -> String {
    date.format("%d-%m-%Y").to_string()
}

fn fmt_time(datetime: &NaiveDateTime) -> String {
    datetime.format("%H:%M").to_string()
}

fn trimmed(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Invoice numbers pair the invoice date with the minute/second tail of the
/// generation instant, matching the history naming on disk.
pub fn invoice_number(invoice_date: NaiveDate, generated_at: NaiveDateTime) -> String {
    format!(
        "INV-{}-{}",
        invoice_date.format("%Y%m%d"),
        generated_at.format("%M%S")
    )
}

/// `<base>/<recipient-slug>/<year>/<invoice-number>.html`.
pub fn default_output_path(
    base: &Path,
    recipient_name: &str,
    invoice_date: NaiveDate,
    invoice_number: &str,
) -> PathBuf {
    let mut recipient_slug = slugify(recipient_name);
    if recipient_slug.is_empty() {
        recipient_slug = "recipient".to_string();
    }
    base.join(recipient_slug)
        .join(invoice_date.format("%Y").to_string())
        .join(format!("{invoice_number}.html"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_escapes_then_restores_allowed_markup() {
        assert_eq!(
            sanitize("<b>Jane & Co</b>\n<script>"),
            "<b>Jane &amp; Co</b><br/>&lt;script&gt;"
        );
    }

    #[test]
    fn sanitize_blocks_unlisted_tags() {
        assert_eq!(sanitize("<i>x</i>"), "&lt;i&gt;x&lt;/i&gt;");
    }

    #[test]
    fn initials_take_first_two_words() {
        assert_eq!(initials("Jane Smith"), "JS");
        assert_eq!(initials("Cher"), "C");
        assert_eq!(initials("anna maria lopez"), "AM");
        assert_eq!(initials("   "), "XX");
    }

    #[test]
    fn money_groups_thousands() {
        assert_eq!(money(0.0), "0.00");
        assert_eq!(money(112.5), "112.50");
        assert_eq!(money(1234.5), "1,234.50");
        assert_eq!(money(1_234_567.891), "1,234,567.89");
    }

    #[test]
    fn output_path_uses_slug_year_and_number() {
        let date = NaiveDate::from_ymd_opt(2026, 2, 21).unwrap();
        let path = default_output_path(Path::new("/tmp/inv"), "Jane Smith", date, "INV-20260221-0101");
        assert_eq!(
            path,
            Path::new("/tmp/inv/jane-smith/2026/INV-20260221-0101.html")
        );
    }

    #[test]
    fn output_path_falls_back_on_empty_name() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let path = default_output_path(Path::new("base"), "***", date, "INV-1");
        assert_eq!(path, Path::new("base/recipient/2026/INV-1.html"));
    }

    #[test]
    fn invoice_number_combines_date_and_generation_tail() {
        let date = NaiveDate::from_ymd_opt(2026, 2, 21).unwrap();
        let at = date.and_hms_opt(14, 30, 45).unwrap();
        assert_eq!(invoice_number(date, at), "INV-20260221-3045");
    }
}
