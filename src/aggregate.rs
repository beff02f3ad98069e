use crate::config::EngineConfig;
use crate::format::display_field;
use crate::model::{CompanyProfile, FieldValue, LineItem, PlaceholderMap};
use crate::parser::escape_template_syntax;
use crate::passes::render_rows;
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Names each profile field is published under besides its snake-case key.
const PROFILE_ALIASES: [(&str, &[&str]); 11] = [
    ("company_name", &["COMPANY_NAME", "bedrijfsnaam"]),
    ("company_address", &["COMPANY_ADDRESS", "adres"]),
    ("company_postal_code", &["COMPANY_POSTAL_CODE", "postcode"]),
    ("company_city", &["COMPANY_CITY", "plaats"]),
    ("company_email", &["COMPANY_EMAIL", "email"]),
    ("company_phone", &["COMPANY_PHONE", "telefoon"]),
    ("company_website", &["COMPANY_WEBSITE", "website"]),
    ("company_vat", &["COMPANY_VAT", "btw_nummer"]),
    ("company_kvk", &["COMPANY_KVK", "kvk"]),
    ("company_iban", &["COMPANY_IBAN", "iban"]),
    ("company_bic", &["COMPANY_BIC", "bic"]),
];

const DATE_KEYS: [&str; 3] = ["datum", "date", "DATE"];
const REFERENCE_KEYS: [&str; 2] = ["referentie", "reference"];
const SUBTOTAL_KEYS: [&str; 3] = ["subtotal", "subtotaal", "SUBTOTAL"];
const VAT_KEYS: [&str; 4] = ["vat_amount", "btw_bedrag", "btw", "VAT_AMOUNT"];
const TOTAL_KEYS: [&str; 4] = ["total", "totaal", "totaal_bedrag", "TOTAL_AMOUNT"];
const ROWS_KEYS: [&str; 2] = ["INVOICE_LINES", "regels_html"];

/// The three input sources of one render.
#[derive(Debug, Clone, Copy)]
pub struct Sources<'a> {
    pub organization_id: Option<&'a str>,
    pub profile: Option<&'a CompanyProfile>,
    pub document_fields: &'a BTreeMap<String, FieldValue>,
    pub line_items: &'a [LineItem],
    pub today: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Aggregated {
    pub scalars: PlaceholderMap,
    /// One item scope per line item, in the caller's order.
    pub items: Vec<PlaceholderMap>,
}

/// Merges document fields over the company profile over system-computed fields.
/// Each key takes the first value defined in that order; `FieldValue::Empty` and
/// unset profile fields count as undefined.
pub fn aggregate(sources: &Sources<'_>, config: &EngineConfig) -> Aggregated {
    let items: Vec<PlaceholderMap> = sources
        .line_items
        .iter()
        .enumerate()
        .map(|(idx, item)| item_scope(item, idx + 1, config))
        .collect();

    let mut scalars = system_fields(sources, &items, config);
    scalars.extend(profile_fields(sources.profile));
    scalars.extend(document_fields(sources.document_fields, config));

    tracing::debug!(
        keys = scalars.len(),
        items = items.len(),
        has_profile = sources.profile.is_some(),
        "placeholder map built"
    );
    Aggregated { scalars, items }
}

fn document_fields(fields: &BTreeMap<String, FieldValue>, config: &EngineConfig) -> PlaceholderMap {
    fields
        .iter()
        .filter(|(_, value)| !matches!(value, FieldValue::Empty))
        .map(|(key, value)| {
            let display = display_field(value, &config.numbers, &config.dates);
            (key.clone(), escape_template_syntax(&display))
        })
        .collect()
}

fn profile_fields(profile: Option<&CompanyProfile>) -> PlaceholderMap {
    let mut out = PlaceholderMap::new();
    let Some(profile) = profile else {
        return out;
    };

    for (key, value) in profile.extra.iter() {
        out.insert(key.clone(), escape_template_syntax(value));
    }
    for (key, value) in profile.standard_fields() {
        let Some(value) = value else {
            continue;
        };
        let value = escape_template_syntax(value);
        if let Some((_, aliases)) = PROFILE_ALIASES.iter().find(|(name, _)| *name == key) {
            for alias in aliases.iter() {
                out.insert(alias.to_string(), value.clone());
            }
        }
        out.insert(key.to_string(), value);
    }
    out
}

fn system_fields(sources: &Sources<'_>, items: &[PlaceholderMap], config: &EngineConfig) -> PlaceholderMap {
    let mut out = PlaceholderMap::new();
    let numbers = &config.numbers;

    let today = config.dates.format(sources.today);
    insert_all(&mut out, &DATE_KEYS, &today);
    insert_all(
        &mut out,
        &REFERENCE_KEYS,
        &reference(sources.organization_id, sources.today),
    );

    let subtotal: f64 = sources.line_items.iter().map(|item| item.line_total).sum();
    let vat: f64 = sources.line_items.iter().map(LineItem::vat_amount).sum();
    insert_all(&mut out, &SUBTOTAL_KEYS, &numbers.money(subtotal));
    insert_all(&mut out, &VAT_KEYS, &numbers.money(vat));
    insert_all(&mut out, &TOTAL_KEYS, &numbers.money(subtotal + vat));

    let rows = render_rows(&config.default_row, items, &PlaceholderMap::new(), config);
    insert_all(&mut out, &ROWS_KEYS, &rows);
    out
}

fn insert_all(map: &mut PlaceholderMap, keys: &[&str], value: &str) {
    for key in keys {
        map.insert(key.to_string(), value.to_string());
    }
}

/// `REF-<yyyymmdd>-<first 8 alphanumerics of the organization id>`.
pub fn reference(organization_id: Option<&str>, today: NaiveDate) -> String {
    let date = today.format("%Y%m%d");
    let suffix: String = organization_id
        .unwrap_or_default()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(8)
        .collect::<String>()
        .to_ascii_uppercase();
    if suffix.is_empty() {
        format!("REF-{date}")
    } else {
        format!("REF-{date}-{suffix}")
    }
}

/// Display strings for one line item, under the names templates use for them.
pub fn item_scope(item: &LineItem, index: usize, config: &EngineConfig) -> PlaceholderMap {
    let numbers = &config.numbers;
    let mut out = PlaceholderMap::new();
    insert_all(
        &mut out,
        &["description", "DESCRIPTION", "item_omschrijving", "omschrijving"],
        &escape_template_syntax(&item.description),
    );
    insert_all(
        &mut out,
        &["quantity", "QUANTITY", "item_aantal", "aantal"],
        &numbers.number(item.quantity),
    );
    insert_all(
        &mut out,
        &["unit_price", "UNIT_PRICE", "item_prijs", "prijs"],
        &numbers.money(item.unit_price),
    );
    insert_all(
        &mut out,
        &["vat_rate", "VAT_RATE", "item_btw"],
        &numbers.number(item.vat_rate),
    );
    insert_all(
        &mut out,
        &["line_total", "LINE_TOTAL", "item_totaal"],
        &numbers.money(item.line_total),
    );
    insert_all(
        &mut out,
        &["line_vat", "item_btw_bedrag"],
        &numbers.money(item.vat_amount()),
    );
    insert_all(&mut out, &["index", "nr"], &index.to_string());
    out
}
