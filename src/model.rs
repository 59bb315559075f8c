use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};

/// Discriminator for the three record shapes sharing the profile logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileKind {
    Provider,
    Recipient,
    PaymentMethod,
}

impl ProfileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileKind::Provider => "provider",
            ProfileKind::Recipient => "recipient",
            ProfileKind::PaymentMethod => "payment_method",
        }
    }
}

/// One line of the profile logs. The `type` field on disk selects the
/// variant; a tombstone is just a newer line with `deleted: true`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Profile {
    Provider(PartyProfile),
    Recipient(RecipientProfile),
    PaymentMethod(PaymentProfile),
}

impl Profile {
    pub fn id(&self) -> &str {
        match self {
            Profile::Provider(p) => &p.id,
            Profile::Recipient(r) => &r.id,
            Profile::PaymentMethod(m) => &m.id,
        }
    }

    pub fn kind(&self) -> ProfileKind {
        match self {
            Profile::Provider(_) => ProfileKind::Provider,
            Profile::Recipient(_) => ProfileKind::Recipient,
            Profile::PaymentMethod(_) => ProfileKind::PaymentMethod,
        }
    }

    pub fn is_deleted(&self) -> bool {
        match self {
            Profile::Provider(p) => p.deleted,
            Profile::Recipient(r) => r.deleted,
            Profile::PaymentMethod(m) => m.deleted,
        }
    }

    /// Minimal record appended to shadow an id out of all read views.
    pub fn tombstone(kind: ProfileKind, id: impl Into<String>) -> Profile {
        let id = id.into();
        match kind {
            ProfileKind::Provider => Profile::Provider(PartyProfile {
                id,
                deleted: true,
                ..PartyProfile::default()
            }),
            ProfileKind::Recipient => Profile::Recipient(RecipientProfile {
                id,
                deleted: true,
                ..RecipientProfile::default()
            }),
            ProfileKind::PaymentMethod => Profile::PaymentMethod(PaymentProfile {
                id,
                deleted: true,
                ..PaymentProfile::default()
            }),
        }
    }
}

fn is_false(value: &bool) -> bool {
    !value
}

/// Accepts either a JSON list of lines or one free-text string (a single
/// line); blank entries are dropped either way.
fn string_or_lines<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Lines {
        One(String),
        Many(Vec<String>),
    }

    let lines = match Lines::deserialize(deserializer)? {
        Lines::One(s) => vec![s],
        Lines::Many(v) => v,
    };
    Ok(lines
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

/// Identity block for the invoice sender.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartyProfile {
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub display_name: String,
    #[serde(
        default,
        deserialize_with = "string_or_lines",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub address_lines: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub deleted: bool,
}

impl PartyProfile {
    pub fn sort_key(&self) -> &str {
        if self.display_name.is_empty() {
            &self.id
        } else {
            &self.display_name
        }
    }
}

/// Identity block for the invoice recipient; `student_name` is a free-text
/// client reference carried onto generated invoices.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecipientProfile {
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub display_name: String,
    #[serde(
        default,
        deserialize_with = "string_or_lines",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub address_lines: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_name: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub deleted: bool,
}

impl RecipientProfile {
    pub fn sort_key(&self) -> &str {
        if self.display_name.is_empty() {
            &self.id
        } else {
            &self.display_name
        }
    }

    pub fn client_reference(&self) -> &str {
        self.student_name.as_deref().unwrap_or("").trim()
    }
}

/// Payment method classification. `BankTransfer` is a legacy value still
/// present in older log lines; the store reclassifies it on load based on
/// whether the record carries an IBAN.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodType {
    BankDomestic,
    BankInternational,
    Paypal,
    #[default]
    BankTransfer,
}

impl MethodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MethodType::BankDomestic => "bank_domestic",
            MethodType::BankInternational => "bank_international",
            MethodType::Paypal => "paypal",
            MethodType::BankTransfer => "bank_transfer",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentProfile {
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub label: String,
    #[serde(default)]
    pub method_type: MethodType,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub deleted: bool,
}

impl PaymentProfile {
    pub fn sort_key(&self) -> &str {
        if self.label.is_empty() {
            &self.id
        } else {
            &self.label
        }
    }

    pub fn detail(&self, key: &str) -> &str {
        self.details.get(key).map(String::as_str).unwrap_or("")
    }

    /// Current classification with the legacy value resolved: an old
    /// `bank_transfer` record counts as international when it has an IBAN,
    /// domestic otherwise.
    pub fn effective_type(&self) -> MethodType {
        match self.method_type {
            MethodType::BankTransfer => {
                if self.detail("iban").trim().is_empty() {
                    MethodType::BankDomestic
                } else {
                    MethodType::BankInternational
                }
            }
            current => current,
        }
    }

    pub fn reclassify_legacy(&mut self) {
        self.method_type = self.effective_type();
    }
}

/// Profiles grouped by kind, each group sorted for deterministic display.
#[derive(Debug, Clone, Default)]
pub struct ProfileBook {
    pub providers: Vec<PartyProfile>,
    pub recipients: Vec<RecipientProfile>,
    pub payment_methods: Vec<PaymentProfile>,
}

impl ProfileBook {
    pub fn provider_by_id(&self, id: &str) -> Option<&PartyProfile> {
        self.providers.iter().find(|p| p.id == id)
    }

    pub fn recipient_by_id(&self, id: &str) -> Option<&RecipientProfile> {
        self.recipients.iter().find(|r| r.id == id)
    }

    pub fn payment_by_id(&self, id: &str) -> Option<&PaymentProfile> {
        self.payment_methods.iter().find(|m| m.id == id)
    }
}

/// Last-used profile selections remembered across launches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectedProfiles {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_type: Option<MethodType>,
}

/// The single whole-document settings record. `field_defaults` maps form
/// field keys to the value last saved as a default; most values are strings
/// but `open_on_generate` is a boolean, hence `serde_json::Value`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub selected_profiles: SelectedProfiles,
    #[serde(default)]
    pub field_defaults: BTreeMap<String, serde_json::Value>,
}

impl Settings {
    pub fn default_str(&self, key: &str) -> Option<&str> {
        self.field_defaults.get(key).and_then(|v| v.as_str())
    }

    pub fn default_bool(&self, key: &str) -> bool {
        self.field_defaults
            .get(key)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    pub fn set_default(&mut self, key: &str, value: impl Into<serde_json::Value>) {
        self.field_defaults.insert(key.to_string(), value.into());
    }
}

/// Fully assembled input to the document composer. The caller resolves all
/// profile references and parses all numeric fields before building this.
#[derive(Debug, Clone)]
pub struct Invoice {
    pub provider: PartyProfile,
    pub recipient: RecipientProfile,
    pub payment_method: PaymentProfile,
    pub service_category: String,
    pub service_title: String,
    pub student_name: String,
    pub rate_per_hour: f64,
    pub session_duration_hours: f64,
    pub prep_hours: f64,
    pub prep_rate: f64,
    pub prep_description: String,
    pub session_start: NaiveDateTime,
    pub invoice_date: NaiveDate,
    pub terms_label: String,
    pub due_days: u32,
    pub currency: String,
    pub invoice_number: String,
    /// Explicit payment reference; derived from initials and the session
    /// date when absent.
    pub reference: Option<String>,
}

/// One line of the history log, written after each successful generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub invoice_number: String,
    #[serde(default)]
    pub recipient: String,
    #[serde(default)]
    pub recipient_id: String,
    #[serde(default)]
    pub service_category: String,
    pub output_path: String,
    pub created_at: String,
    #[serde(default)]
    pub payment_method: MethodType,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_lines_accept_single_string() {
        let profile: PartyProfile =
            serde_json::from_str(r#"{"id":"p1","display_name":"A","address_lines":"1 High St"}"#)
                .unwrap();
        assert_eq!(profile.address_lines, vec!["1 High St"]);

        let blank: PartyProfile =
            serde_json::from_str(r#"{"id":"p2","display_name":"B","address_lines":"   "}"#)
                .unwrap();
        assert!(blank.address_lines.is_empty());
    }

    #[test]
    fn address_lines_accept_list_and_drop_blanks() {
        let profile: PartyProfile = serde_json::from_str(
            r#"{"id":"p1","display_name":"A","address_lines":["1 High St","  ","Leeds"]}"#,
        )
        .unwrap();
        assert_eq!(profile.address_lines, vec!["1 High St", "Leeds"]);
    }

    #[test]
    fn profile_round_trips_through_tagged_json() {
        let record = Profile::PaymentMethod(PaymentProfile {
            id: "payment-1".into(),
            label: "Main account".into(),
            method_type: MethodType::BankDomestic,
            details: BTreeMap::from([("bank_name".to_string(), "Example Bank".to_string())]),
            deleted: false,
        });
        let line = serde_json::to_string(&record).unwrap();
        assert!(line.contains(r#""type":"payment_method""#));
        let back: Profile = serde_json::from_str(&line).unwrap();
        assert_eq!(back.id(), "payment-1");
        assert_eq!(back.kind(), ProfileKind::PaymentMethod);
    }

    #[test]
    fn tombstone_parses_without_optional_fields() {
        let line = r#"{"type":"recipient","id":"recipient-9","deleted":true}"#;
        let record: Profile = serde_json::from_str(line).unwrap();
        assert!(record.is_deleted());
        assert_eq!(record.id(), "recipient-9");
    }

    #[test]
    fn legacy_method_type_resolves_by_iban() {
        let mut method = PaymentProfile {
            id: "payment-1".into(),
            method_type: MethodType::BankTransfer,
            ..PaymentProfile::default()
        };
        assert_eq!(method.effective_type(), MethodType::BankDomestic);

        method
            .details
            .insert("iban".into(), "GB00EXMP00000000000000".into());
        assert_eq!(method.effective_type(), MethodType::BankInternational);

        method.reclassify_legacy();
        assert_eq!(method.method_type, MethodType::BankInternational);
    }
}
