use crate::format::{DateStyle, NumberFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

const LOGO_ALIASES: [&str; 5] = ["logo", "bedrijfslogo", "company_logo", "LOGO", "COMPANY_LOGO"];

const LOOP_COLLECTIONS: [&str; 3] = ["items", "regels", "lines"];

const EMPTY_STATE_ROW: &str = "<tr data-empty-state=\"true\"><td colspan=\"5\" style=\"text-align: center; padding: 20px; color: #666;\">Geen factuurregels toegevoegd</td></tr>";

const DEFAULT_ROW: &str = "<tr><td>{{description}}</td><td>{{quantity}}</td><td>€{{unit_price}}</td><td>{{vat_rate}}%</td><td>€{{line_total}}</td></tr>";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Synonymous tokens for the logo slot; also the names a logo guard may use.
    pub logo_aliases: Vec<String>,
    pub loop_collections: Vec<String>,
    /// Row rendered in place of the loop block when there are no line items.
    pub empty_state_row: String,
    /// Row used when a loop block has an empty body, and for the
    /// pre-rendered `INVOICE_LINES` field.
    pub default_row: String,
    pub numbers: NumberFormat,
    pub dates: DateStyle,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            logo_aliases: LOGO_ALIASES.iter().map(|value| value.to_string()).collect(),
            loop_collections: LOOP_COLLECTIONS
                .iter()
                .map(|value| value.to_string())
                .collect(),
            empty_state_row: EMPTY_STATE_ROW.to_string(),
            default_row: DEFAULT_ROW.to_string(),
            numbers: NumberFormat::default(),
            dates: DateStyle::default(),
        }
    }
}

impl EngineConfig {
    pub fn is_logo_alias(&self, name: &str) -> bool {
        self.logo_aliases.iter().any(|alias| alias == name)
    }

    pub fn is_loop_collection(&self, name: &str) -> bool {
        self.loop_collections.iter().any(|collection| collection == name)
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    locale: Option<String>,
    logo_aliases: Option<Vec<String>>,
    extra_logo_aliases: Option<Vec<String>>,
    loop_collections: Option<Vec<String>>,
    empty_state_row: Option<String>,
    empty_state_message: Option<String>,
    default_row: Option<String>,
    numbers: Option<NumberFormatFile>,
    date_format: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct NumberFormatFile {
    decimal_separator: Option<String>,
    thousands_separator: Option<String>,
    currency_symbol: Option<String>,
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };

    let contents = std::fs::read_to_string(path)?;
    parse_config(&contents)
}

pub fn parse_config(contents: &str) -> anyhow::Result<EngineConfig> {
    let parsed: ConfigFile = match serde_json::from_str(contents) {
        Ok(parsed) => parsed,
        Err(_) => json5::from_str(contents)?,
    };
    Ok(apply_config_file(EngineConfig::default(), parsed))
}

fn apply_config_file(mut config: EngineConfig, parsed: ConfigFile) -> EngineConfig {
    if let Some(locale) = parsed.locale.as_deref() {
        match locale {
            "nl" | "nl-NL" | "nl-BE" => {
                config.numbers = NumberFormat::dutch();
                config.dates = DateStyle::default();
            }
            "en" | "en-US" => {
                config.numbers = NumberFormat {
                    thousands_separator: ",".to_string(),
                    ..NumberFormat::default()
                };
                config.dates = DateStyle("%-m/%-d/%Y".to_string());
            }
            "en-GB" => {
                config.numbers = NumberFormat {
                    thousands_separator: ",".to_string(),
                    ..NumberFormat::default()
                };
                config.dates = DateStyle("%d/%m/%Y".to_string());
            }
            other => {
                tracing::warn!(locale = other, "unknown locale in config, keeping defaults");
            }
        }
    }

    if let Some(v) = parsed.logo_aliases {
        config.logo_aliases = v;
    }
    if let Some(extra) = parsed.extra_logo_aliases {
        for alias in extra {
            if !config.is_logo_alias(&alias) {
                config.logo_aliases.push(alias);
            }
        }
    }
    if let Some(v) = parsed.loop_collections {
        config.loop_collections = v;
    }
    if let Some(v) = parsed.empty_state_row {
        config.empty_state_row = v;
    } else if let Some(message) = parsed.empty_state_message {
        config.empty_state_row = format!(
            "<tr data-empty-state=\"true\"><td colspan=\"5\" style=\"text-align: center; padding: 20px; color: #666;\">{message}</td></tr>"
        );
    }
    if let Some(v) = parsed.default_row {
        config.default_row = v;
    }
    if let Some(numbers) = parsed.numbers {
        if let Some(v) = numbers.decimal_separator {
            config.numbers.decimal_separator = v;
        }
        if let Some(v) = numbers.thousands_separator {
            config.numbers.thousands_separator = v;
        }
        if let Some(v) = numbers.currency_symbol {
            config.numbers.currency_symbol = v;
        }
    }
    if let Some(v) = parsed.date_format {
        config.dates = DateStyle(v);
    }
    config
}
