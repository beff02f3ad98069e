use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Placeholder name to display string. Values are formatted before they land here;
/// the substitution passes copy them verbatim.
pub type PlaceholderMap = BTreeMap<String, String>;

pub fn lookup<'a>(map: &'a PlaceholderMap, key: &str) -> &'a str {
    map.get(key).map(String::as_str).unwrap_or("")
}

/// A truthy placeholder has a value with at least one non-whitespace character.
pub fn is_truthy(map: &PlaceholderMap, key: &str) -> bool {
    !lookup(map, key).trim().is_empty()
}

/// Caller-supplied document field before display formatting.
///
/// Deserialises untagged, so a JSON document can mix strings, numbers, ISO dates,
/// `{"amount": 12.5}` money objects, booleans and `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Flag(bool),
    Number(f64),
    Money { amount: f64 },
    Date(NaiveDate),
    Text(String),
    Empty,
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn money(amount: f64) -> Self {
        Self::Money { amount }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Empty)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub quantity: f64,
    pub unit_price: f64,
    pub vat_rate: f64,
    /// Supplied by the caller; never recomputed from quantity and price.
    pub line_total: f64,
}

impl LineItem {
    pub fn new(
        description: impl Into<String>,
        quantity: f64,
        unit_price: f64,
        vat_rate: f64,
        line_total: f64,
    ) -> Self {
        Self {
            description: description.into(),
            quantity,
            unit_price,
            vat_rate,
            line_total,
        }
    }

    pub fn vat_amount(&self) -> f64 {
        self.line_total * self.vat_rate / 100.0
    }
}

/// Resolved logo slot. `has_logo` is derived from the URL and cannot disagree with it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LogoResult {
    logo_url: String,
    has_logo: bool,
}

impl LogoResult {
    pub fn from_url(url: impl Into<String>) -> Self {
        let logo_url = url.into();
        let has_logo = !logo_url.trim().is_empty();
        Self { logo_url, has_logo }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn logo_url(&self) -> &str {
        &self.logo_url
    }

    pub fn has_logo(&self) -> bool {
        self.has_logo
    }

    /// The value substituted for logo tokens: the URL, or nothing.
    pub fn substitution(&self) -> &str {
        if self.has_logo { &self.logo_url } else { "" }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanyProfile {
    pub company_name: Option<String>,
    pub company_address: Option<String>,
    pub company_postal_code: Option<String>,
    pub company_city: Option<String>,
    pub company_email: Option<String>,
    pub company_phone: Option<String>,
    pub company_website: Option<String>,
    pub company_vat: Option<String>,
    pub company_kvk: Option<String>,
    pub company_iban: Option<String>,
    pub company_bic: Option<String>,
    /// Free-form fields published under their own names.
    pub extra: BTreeMap<String, String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl CompanyProfile {
    /// Pairs each standard profile field with its canonical snake-case key.
    pub fn standard_fields(&self) -> [(&'static str, Option<&str>); 11] {
        [
            ("company_name", self.company_name.as_deref()),
            ("company_address", self.company_address.as_deref()),
            ("company_postal_code", self.company_postal_code.as_deref()),
            ("company_city", self.company_city.as_deref()),
            ("company_email", self.company_email.as_deref()),
            ("company_phone", self.company_phone.as_deref()),
            ("company_website", self.company_website.as_deref()),
            ("company_vat", self.company_vat.as_deref()),
            ("company_kvk", self.company_kvk.as_deref()),
            ("company_iban", self.company_iban.as_deref()),
            ("company_bic", self.company_bic.as_deref()),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub organization_id: Option<String>,
    pub document_fields: BTreeMap<String, FieldValue>,
    pub line_items: Vec<LineItem>,
    /// Skips the profile fetch when the caller already holds the profile.
    pub company_profile: Option<CompanyProfile>,
    pub today: NaiveDate,
}

impl RenderRequest {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            organization_id: None,
            document_fields: BTreeMap::new(),
            line_items: Vec::new(),
            company_profile: None,
            today,
        }
    }

    pub fn organization(mut self, organization_id: impl Into<String>) -> Self {
        self.organization_id = Some(organization_id.into());
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.document_fields.insert(key.into(), value.into());
        self
    }

    pub fn line_item(mut self, item: LineItem) -> Self {
        self.line_items.push(item);
        self
    }

    pub fn line_items(mut self, items: impl IntoIterator<Item = LineItem>) -> Self {
        self.line_items.extend(items);
        self
    }

    pub fn company_profile(mut self, profile: CompanyProfile) -> Self {
        self.company_profile = Some(profile);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logo_presence_follows_trimmed_url() {
        assert!(LogoResult::from_url("https://cdn/logo.png").has_logo());
        assert!(!LogoResult::from_url("   ").has_logo());
        assert_eq!(LogoResult::from_url(" \t").substitution(), "");
        assert_eq!(LogoResult::none().logo_url(), "");
    }

    #[test]
    fn truthiness_ignores_whitespace() {
        let mut map = PlaceholderMap::new();
        map.insert("notes".to_string(), "  \n".to_string());
        map.insert("subject".to_string(), "Advies".to_string());
        assert!(!is_truthy(&map, "notes"));
        assert!(is_truthy(&map, "subject"));
        assert!(!is_truthy(&map, "missing"));
        assert_eq!(lookup(&map, "missing"), "");
    }

    #[test]
    fn field_values_deserialize_untagged() {
        let raw = r#"{"a": "text", "b": 12.5, "c": {"amount": 3}, "d": "2024-06-14", "e": null, "f": true}"#;
        let parsed: BTreeMap<String, FieldValue> = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed["a"], FieldValue::text("text"));
        assert_eq!(parsed["b"], FieldValue::Number(12.5));
        assert_eq!(parsed["c"], FieldValue::money(3.0));
        assert_eq!(
            parsed["d"],
            FieldValue::Date(NaiveDate::from_ymd_opt(2024, 6, 14).unwrap())
        );
        assert_eq!(parsed["e"], FieldValue::Empty);
        assert_eq!(parsed["f"], FieldValue::Flag(true));
    }
}
