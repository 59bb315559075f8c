use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{Local, NaiveDateTime};
use clap::{Parser, Subcommand, ValueEnum};
use comfy_table::{Attribute, Cell, Color, Table};
use inquire::{Confirm, DateSelect, Select, Text};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use invoice_desk::document;
use invoice_desk::error::{Error, Result};
use invoice_desk::model::{
    HistoryEntry, Invoice, MethodType, PartyProfile, PaymentProfile, Profile, ProfileBook,
    ProfileKind, RecipientProfile,
};
use invoice_desk::paths;
use invoice_desk::store::RecordStore;

const PAYMENT_TYPES: [(MethodType, &str); 3] = [
    (MethodType::BankDomestic, "Bank transfer (domestic)"),
    (MethodType::BankInternational, "Bank transfer (international)"),
    (MethodType::Paypal, "PayPal"),
];

#[derive(Debug, Serialize, Deserialize)]
struct AppSettings {
    data_root: String,
}

#[derive(Parser)]
#[command(name = "invoice-desk")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new invoice document
    New,
    /// Add a profile (provider, recipient or payment method)
    Add {
        #[arg(value_enum)]
        kind: ProfileArg,
    },
    /// Edit an existing profile
    Edit {
        #[arg(value_enum)]
        kind: ProfileArg,
    },
    /// Soft-delete a profile
    Delete {
        #[arg(value_enum)]
        kind: ProfileArg,
    },
    /// List recent invoices
    History {
        /// How many entries to show
        #[arg(default_value_t = 25)]
        limit: usize,
    },
    /// Drop history entries whose invoice file no longer exists
    Prune,
    /// Remove history entries for one output path
    Remove { output_path: String },
    /// Open the invoices folder
    Open,
    /// Configure the data directory
    Config,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ProfileArg {
    Provider,
    Recipient,
    Payment,
}

impl From<ProfileArg> for ProfileKind {
    fn from(arg: ProfileArg) -> Self {
        match arg {
            ProfileArg::Provider => ProfileKind::Provider,
            ProfileArg::Recipient => ProfileKind::Recipient,
            ProfileArg::Payment => ProfileKind::PaymentMethod,
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    if let Err(err) = run() {
        eprintln!("❌ {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        use clap::CommandFactory;
        Cli::command().print_help().ok();
        return Ok(());
    };

    let data_dir = resolve_data_dir()?;
    let store = RecordStore::open(&data_dir);

    match command {
        Commands::New => generate_invoice(&store),
        Commands::Add { kind } => add_profile(&store, kind.into()),
        Commands::Edit { kind } => edit_profile(&store, kind.into()),
        Commands::Delete { kind } => delete_profile(&store, kind.into()),
        Commands::History { limit } => show_history(&store, limit),
        Commands::Prune => {
            let removed = store.prune_missing_history_files()?;
            println!("Removed {removed} entries with missing files.");
            Ok(())
        }
        Commands::Remove { output_path } => {
            store.remove_history_entry(&output_path)?;
            println!("Removed history entries for {output_path}");
            Ok(())
        }
        Commands::Open => {
            open_file(&paths::invoices_dir()?);
            Ok(())
        }
        Commands::Config => configure_data_root(),
    }
}

// ==========================================
// Invoice generation
// ==========================================

fn generate_invoice(store: &RecordStore) -> Result<()> {
    let mut settings = store.load_settings()?;
    let book = store.load_profiles()?;

    let provider = select_party(
        "Provider:",
        &book.providers,
        settings.selected_profiles.provider_id.as_deref(),
    )?
    .clone();
    let recipient = select_recipient(
        &book,
        settings.selected_profiles.recipient_id.as_deref(),
    )?
    .clone();

    let method_type = select_payment_type(settings.selected_profiles.payment_type)?;
    let payment = select_payment_method(
        &book,
        method_type,
        settings.selected_profiles.payment_method_id.as_deref(),
    )?
    .clone();

    let service_category = text_with_default(
        "Service category:",
        settings
            .default_str("service_category")
            .unwrap_or("Consulting"),
    )?;
    let service_title = text_with_default(
        "Service title:",
        settings
            .default_str("service_title")
            .unwrap_or("Professional service"),
    )?;
    let student_name = text_with_default(
        "Client reference (optional):",
        settings
            .default_str("student_name")
            .unwrap_or(recipient.client_reference()),
    )?;
    let rate_per_hour = prompt_non_negative(
        "Rate per hour:",
        settings.default_str("rate_per_hour").unwrap_or("75"),
    )?;
    let session_duration_hours = prompt_non_negative(
        "Session/work hours:",
        settings
            .default_str("session_duration_hours")
            .unwrap_or("1.0"),
    )?;
    let prep_hours = prompt_non_negative(
        "Extra hours (not billed):",
        settings.default_str("prep_hours").unwrap_or("0.0"),
    )?;
    let prep_description = text_with_default(
        "Extra work description:",
        settings
            .default_str("prep_description")
            .unwrap_or("Preparation and admin (not billed)."),
    )?;
    let session_start = prompt_session_start(
        settings
            .default_str("session_start")
            .map(str::to_string)
            .unwrap_or_else(|| Local::now().format("%Y-%m-%d %H:%M").to_string()),
    )?;
    let terms_label = text_with_default(
        "Terms label:",
        settings.default_str("terms_label").unwrap_or("Net 7"),
    )?;
    let due_days = prompt_due_days("Due days:", settings.default_str("due_days").unwrap_or("7"))?;
    let currency = text_with_default(
        "Currency:",
        settings.default_str("currency").unwrap_or("GBP"),
    )?;
    let invoice_date = DateSelect::new("Invoice date:")
        .with_default(Local::now().date_naive())
        .prompt()?;

    let generated_at = Local::now().naive_local();
    let number = document::invoice_number(invoice_date, generated_at);
    let out_path = document::default_output_path(
        &paths::invoices_dir()?,
        &recipient.display_name,
        invoice_date,
        &number,
    );

    let invoice = Invoice {
        provider: provider.clone(),
        recipient: recipient.clone(),
        payment_method: payment.clone(),
        service_category,
        service_title,
        student_name,
        rate_per_hour,
        session_duration_hours,
        prep_hours,
        prep_rate: 0.0,
        prep_description,
        session_start,
        invoice_date,
        terms_label,
        due_days,
        currency,
        invoice_number: number.clone(),
        reference: None,
    };

    let written = document::build_invoice_document(&invoice, &out_path)?;

    store.record_invoice_history(&HistoryEntry {
        invoice_number: number,
        recipient: recipient.display_name.clone(),
        recipient_id: recipient.id.clone(),
        service_category: invoice.service_category.clone(),
        output_path: written.to_string_lossy().to_string(),
        created_at: Local::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
        payment_method: payment.effective_type(),
    })?;

    settings.selected_profiles.provider_id = Some(provider.id.clone());
    settings.selected_profiles.recipient_id = Some(recipient.id.clone());
    settings.selected_profiles.payment_method_id = Some(payment.id.clone());
    settings.selected_profiles.payment_type = Some(method_type);
    settings.set_default("service_category", invoice.service_category.clone());
    settings.set_default("service_title", invoice.service_title.clone());
    settings.set_default("student_name", invoice.student_name.clone());
    settings.set_default("rate_per_hour", invoice.rate_per_hour.to_string());
    settings.set_default(
        "session_duration_hours",
        invoice.session_duration_hours.to_string(),
    );
    settings.set_default("prep_hours", invoice.prep_hours.to_string());
    settings.set_default("prep_description", invoice.prep_description.clone());
    settings.set_default(
        "session_start",
        invoice.session_start.format("%Y-%m-%d %H:%M").to_string(),
    );
    settings.set_default("terms_label", invoice.terms_label.clone());
    settings.set_default("due_days", invoice.due_days.to_string());
    settings.set_default("currency", invoice.currency.clone());
    store.save_settings(&settings)?;

    println!("✅ Invoice saved: {}", written.display());
    if settings.default_bool("open_on_generate") {
        open_file(&written);
    }
    Ok(())
}

fn select_party<'a>(
    prompt: &str,
    items: &'a [PartyProfile],
    default_id: Option<&str>,
) -> Result<&'a PartyProfile> {
    if items.is_empty() {
        return Err(Error::ProfileNotFound("provider"));
    }
    let options: Vec<String> = items.iter().map(|p| p.sort_key().to_string()).collect();
    let start = default_id
        .and_then(|id| items.iter().position(|p| p.id == id))
        .unwrap_or(0);
    let choice = Select::new(prompt, options)
        .with_starting_cursor(start)
        .prompt()?;
    items
        .iter()
        .find(|p| p.sort_key() == choice)
        .ok_or(Error::ProfileNotFound("provider"))
}

fn select_recipient<'a>(
    book: &'a ProfileBook,
    default_id: Option<&str>,
) -> Result<&'a RecipientProfile> {
    if book.recipients.is_empty() {
        return Err(Error::ProfileNotFound("recipient"));
    }
    let options: Vec<String> = book
        .recipients
        .iter()
        .map(|r| r.sort_key().to_string())
        .collect();
    let start = default_id
        .and_then(|id| book.recipients.iter().position(|r| r.id == id))
        .unwrap_or(0);
    let choice = Select::new("Recipient:", options)
        .with_starting_cursor(start)
        .prompt()?;
    book.recipients
        .iter()
        .find(|r| r.sort_key() == choice)
        .ok_or(Error::ProfileNotFound("recipient"))
}

fn select_payment_type(default: Option<MethodType>) -> Result<MethodType> {
    let options: Vec<&str> = PAYMENT_TYPES.iter().map(|(_, label)| *label).collect();
    let start = default
        .and_then(|d| PAYMENT_TYPES.iter().position(|(t, _)| *t == d))
        .unwrap_or(0);
    let choice = Select::new("Payment type:", options)
        .with_starting_cursor(start)
        .prompt()?;
    Ok(PAYMENT_TYPES
        .iter()
        .find(|(_, label)| *label == choice)
        .map(|(t, _)| *t)
        .unwrap_or(MethodType::BankDomestic))
}

fn select_payment_method<'a>(
    book: &'a ProfileBook,
    method_type: MethodType,
    default_id: Option<&str>,
) -> Result<&'a PaymentProfile> {
    let candidates: Vec<&PaymentProfile> = book
        .payment_methods
        .iter()
        .filter(|m| m.method_type == method_type)
        .collect();
    if candidates.is_empty() {
        println!("No payment profiles of this type yet; run `invoice-desk add payment`.");
        return Err(Error::ProfileNotFound("payment method"));
    }
    let options: Vec<String> = candidates
        .iter()
        .map(|m| m.sort_key().to_string())
        .collect();
    let start = default_id
        .and_then(|id| candidates.iter().position(|m| m.id == id))
        .unwrap_or(0);
    let choice = Select::new("Payment profile:", options)
        .with_starting_cursor(start)
        .prompt()?;
    candidates
        .into_iter()
        .find(|m| m.sort_key() == choice)
        .ok_or(Error::ProfileNotFound("payment method"))
}

// ==========================================
// Profile wizards
// ==========================================

fn new_profile_id(kind: ProfileKind) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    let prefix = match kind {
        ProfileKind::Provider => "provider",
        ProfileKind::Recipient => "recipient",
        ProfileKind::PaymentMethod => "payment",
    };
    format!("{}-{}", prefix, &hex[..8])
}

fn add_profile(store: &RecordStore, kind: ProfileKind) -> Result<()> {
    let record = match kind {
        ProfileKind::Provider => {
            println!("--- New provider ---");
            Profile::Provider(PartyProfile {
                id: new_profile_id(kind),
                display_name: required_text("Name:")?,
                address_lines: split_address(&optional_text("Address (comma-separated):")?),
                email: none_if_empty(optional_text("Email:")?),
                deleted: false,
            })
        }
        ProfileKind::Recipient => {
            println!("--- New recipient ---");
            Profile::Recipient(RecipientProfile {
                id: new_profile_id(kind),
                display_name: required_text("Name:")?,
                address_lines: split_address(&optional_text("Address (comma-separated):")?),
                email: none_if_empty(optional_text("Email:")?),
                student_name: none_if_empty(optional_text("Client reference:")?),
                deleted: false,
            })
        }
        ProfileKind::PaymentMethod => {
            println!("--- New payment method ---");
            let method_type = select_payment_type(None)?;
            let mut details = BTreeMap::new();
            for (key, label) in payment_detail_fields(method_type) {
                let value = optional_text(&format!("{label}:"))?;
                if !value.is_empty() {
                    details.insert((*key).to_string(), value);
                }
            }
            details
                .entry("currency".to_string())
                .or_insert_with(|| "GBP".to_string());
            let label = optional_text("Profile label:")?;
            Profile::PaymentMethod(PaymentProfile {
                id: new_profile_id(kind),
                label: if label.is_empty() {
                    format!("{} profile", method_type.as_str())
                } else {
                    label
                },
                method_type,
                details,
                deleted: false,
            })
        }
    };

    store.save_profile(&record)?;
    println!("✅ Saved {} profile {}", kind.as_str(), record.id());
    Ok(())
}

fn edit_profile(store: &RecordStore, kind: ProfileKind) -> Result<()> {
    let book = store.load_profiles()?;
    let updated = match kind {
        ProfileKind::Provider => {
            let current = select_party("Edit which provider?", &book.providers, None)?;
            Profile::Provider(PartyProfile {
                id: current.id.clone(),
                display_name: text_with_default("Name:", &current.display_name)?,
                address_lines: split_address(&text_with_default(
                    "Address (comma-separated):",
                    &current.address_lines.join(", "),
                )?),
                email: none_if_empty(text_with_default(
                    "Email:",
                    current.email.as_deref().unwrap_or(""),
                )?),
                deleted: false,
            })
        }
        ProfileKind::Recipient => {
            let current = select_recipient(&book, None)?;
            Profile::Recipient(RecipientProfile {
                id: current.id.clone(),
                display_name: text_with_default("Name:", &current.display_name)?,
                address_lines: split_address(&text_with_default(
                    "Address (comma-separated):",
                    &current.address_lines.join(", "),
                )?),
                email: none_if_empty(text_with_default(
                    "Email:",
                    current.email.as_deref().unwrap_or(""),
                )?),
                student_name: none_if_empty(text_with_default(
                    "Client reference:",
                    current.student_name.as_deref().unwrap_or(""),
                )?),
                deleted: false,
            })
        }
        ProfileKind::PaymentMethod => {
            if book.payment_methods.is_empty() {
                return Err(Error::ProfileNotFound("payment method"));
            }
            let options: Vec<String> = book
                .payment_methods
                .iter()
                .map(|m| m.sort_key().to_string())
                .collect();
            let choice = Select::new("Edit which payment method?", options).prompt()?;
            let current = book
                .payment_methods
                .iter()
                .find(|m| m.sort_key() == choice)
                .ok_or(Error::ProfileNotFound("payment method"))?;

            let mut details = BTreeMap::new();
            for (key, label) in payment_detail_fields(current.method_type) {
                let value = text_with_default(&format!("{label}:"), current.detail(key))?;
                if !value.is_empty() {
                    details.insert((*key).to_string(), value);
                }
            }
            Profile::PaymentMethod(PaymentProfile {
                id: current.id.clone(),
                label: text_with_default("Profile label:", &current.label)?,
                method_type: current.method_type,
                details,
                deleted: false,
            })
        }
    };

    store.upsert_profile(&updated)?;
    println!("✅ Updated {} profile {}", kind.as_str(), updated.id());
    Ok(())
}

fn delete_profile(store: &RecordStore, kind: ProfileKind) -> Result<()> {
    let book = store.load_profiles()?;
    let (id, name) = match kind {
        ProfileKind::Provider => {
            let p = select_party("Delete which provider?", &book.providers, None)?;
            (p.id.clone(), p.sort_key().to_string())
        }
        ProfileKind::Recipient => {
            let r = select_recipient(&book, None)?;
            (r.id.clone(), r.sort_key().to_string())
        }
        ProfileKind::PaymentMethod => {
            if book.payment_methods.is_empty() {
                return Err(Error::ProfileNotFound("payment method"));
            }
            let options: Vec<String> = book
                .payment_methods
                .iter()
                .map(|m| m.sort_key().to_string())
                .collect();
            let choice = Select::new("Delete which payment method?", options).prompt()?;
            let m = book
                .payment_methods
                .iter()
                .find(|m| m.sort_key() == choice)
                .ok_or(Error::ProfileNotFound("payment method"))?;
            (m.id.clone(), m.sort_key().to_string())
        }
    };

    let confirmed = Confirm::new(&format!("Delete profile '{name}'?"))
        .with_default(false)
        .prompt()?;
    if confirmed {
        store.delete_profile(&id, kind)?;
        println!("✅ Deleted {name}");
    } else {
        println!("Cancelled");
    }
    Ok(())
}

fn payment_detail_fields(method_type: MethodType) -> &'static [(&'static str, &'static str)] {
    match method_type {
        MethodType::Paypal => &[
            ("paypal_email", "PayPal email"),
            ("paypal_link", "PayPal link"),
            ("currency", "Currency"),
        ],
        MethodType::BankDomestic | MethodType::BankTransfer => &[
            ("account_holder", "Account holder"),
            ("bank_name", "Bank name"),
            ("sort_code", "Sort code"),
            ("account_number", "Account number"),
            ("currency", "Currency"),
        ],
        MethodType::BankInternational => &[
            ("account_holder", "Account holder"),
            ("bank_name", "Bank name"),
            ("sort_code", "Sort code"),
            ("account_number", "Account number"),
            ("iban", "IBAN"),
            ("bic", "BIC/SWIFT"),
            ("currency", "Currency"),
        ],
    }
}

// ==========================================
// History
// ==========================================

fn show_history(store: &RecordStore, limit: usize) -> Result<()> {
    let entries = store.load_history(limit)?;
    if entries.is_empty() {
        println!("(no invoices yet)");
        return Ok(());
    }
    let book = store.load_profiles()?;

    let mut table = Table::new();
    table.set_header(vec![
        "#", "Invoice", "Recipient", "Category", "Created", "Method", "File",
    ]);
    for (idx, entry) in entries.iter().enumerate() {
        // The snapshot name survives profile deletion; a dangling id with no
        // snapshot gets a generic label.
        let recipient = if !entry.recipient.is_empty() {
            entry.recipient.clone()
        } else if let Some(r) = book.recipient_by_id(&entry.recipient_id) {
            r.display_name.clone()
        } else {
            "Unknown recipient".to_string()
        };
        let missing = !Path::new(&entry.output_path).exists();
        let file_cell = if missing {
            Cell::new(format!("{} (missing)", entry.output_path)).fg(Color::Red)
        } else {
            Cell::new(&entry.output_path)
        };
        table.add_row(vec![
            Cell::new(idx + 1),
            Cell::new(&entry.invoice_number).add_attribute(Attribute::Bold),
            Cell::new(recipient),
            Cell::new(&entry.service_category),
            Cell::new(&entry.created_at),
            Cell::new(entry.payment_method.as_str()),
            file_cell,
        ]);
    }
    println!("{table}");
    Ok(())
}

// ==========================================
// Config & utilities
// ==========================================

fn resolve_data_dir() -> Result<PathBuf> {
    let config_path = paths::config_file()?;
    if config_path.exists() {
        let raw = fs::read_to_string(&config_path)?;
        let settings: AppSettings = toml::from_str(&raw)?;
        return Ok(PathBuf::from(paths::expand_home_dir(&settings.data_root)));
    }
    paths::user_data_dir()
}

fn configure_data_root() -> Result<()> {
    let current = resolve_data_dir()?;
    let new_root = Text::new("Data directory:")
        .with_default(&current.to_string_lossy())
        .prompt()?;
    let settings = AppSettings {
        data_root: new_root,
    };
    fs::write(paths::config_file()?, toml::to_string_pretty(&settings)?)?;
    println!("✅ Settings saved.");
    Ok(())
}

fn open_file(path: &Path) {
    #[cfg(target_os = "macos")]
    Command::new("open").arg(path).spawn().ok();

    #[cfg(target_os = "windows")]
    Command::new("explorer").arg(path).spawn().ok();

    #[cfg(target_os = "linux")]
    Command::new("xdg-open").arg(path).spawn().ok();
}

// ==========================================
// Prompt helpers
// ==========================================

fn required_text(prompt: &str) -> Result<String> {
    loop {
        let value = Text::new(prompt).prompt()?;
        let value = value.trim().to_string();
        if !value.is_empty() {
            return Ok(value);
        }
        println!("A value is required.");
    }
}

fn optional_text(prompt: &str) -> Result<String> {
    Ok(Text::new(prompt).prompt()?.trim().to_string())
}

fn text_with_default(prompt: &str, default: &str) -> Result<String> {
    Ok(Text::new(prompt)
        .with_default(default)
        .prompt()?
        .trim()
        .to_string())
}

fn prompt_non_negative(prompt: &str, default: &str) -> Result<f64> {
    loop {
        let raw = Text::new(prompt).with_default(default).prompt()?;
        match raw.trim().parse::<f64>() {
            Ok(value) if value >= 0.0 => return Ok(value),
            _ => println!("Enter a non-negative number."),
        }
    }
}

fn prompt_due_days(prompt: &str, default: &str) -> Result<u32> {
    loop {
        let raw = Text::new(prompt).with_default(default).prompt()?;
        match raw.trim().parse::<u32>() {
            Ok(value) => return Ok(value),
            Err(_) => println!("Enter a whole number of days."),
        }
    }
}

fn prompt_session_start(default: String) -> Result<NaiveDateTime> {
    loop {
        let raw = Text::new("Session start (YYYY-MM-DD HH:MM):")
            .with_default(&default)
            .prompt()?;
        match NaiveDateTime::parse_from_str(raw.trim(), "%Y-%m-%d %H:%M") {
            Ok(value) => return Ok(value),
            Err(_) => println!("Use the format YYYY-MM-DD HH:MM."),
        }
    }
}

fn none_if_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

fn split_address(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .collect()
}
