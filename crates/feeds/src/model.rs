//! The feed record and its on-disk JSON form.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub use feedman_sample::Delimiter;

pub const DEFAULT_IDENTIFIER_COLUMN: &str = "SKU";
pub const DEFAULT_QUANTITY_COLUMN: &str = "Pocet_ks";
pub const DEFAULT_WAREHOUSE_ID: u32 = 2;
const KEY_SUFFIX: &str = ".json";

/// Warehouses a feed can stock into. Other identifiers are accepted but
/// have no label.
pub const WAREHOUSES: [(u32, &str); 3] = [
    (1, "All4music predajňa (Skladom)"),
    (2, "Skladom u dodávateľa (4-7 dní)"),
    (3, "Pre-Order / Predobjednávka"),
];

pub fn warehouse_label(id: u32) -> Option<&'static str> {
    WAREHOUSES.iter().find(|(known, _)| *known == id).map(|(_, label)| *label)
}

/// Storage key (file name) for a feed called `name`.
///
/// The name is lowercased, every character outside `[a-z0-9]` becomes `_`,
/// and `.json` is appended. Characters outside the Basic Multilingual Plane
/// become two underscores so keys match those written by the browser editor.
pub fn storage_key(name: &str) -> String {
    let mut key = String::with_capacity(name.len() + KEY_SUFFIX.len());
    for c in name.to_lowercase().chars() {
        match c {
            'a'..='z' | '0'..='9' => key.push(c),
            other => (0..other.len_utf16()).for_each(|_| key.push('_')),
        }
    }
    key.push_str(KEY_SUFFIX);
    key
}

/// How a CSV identifier value is resolved against the shop's products.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    /// Look the value up as an old shop SKU, take its model, then find the
    /// product by model.
    #[default]
    OldShopSku,
    Sku,
    Model,
    Ean,
}

impl MatchStrategy {
    pub const ALL: [MatchStrategy; 4] = [Self::OldShopSku, Self::Sku, Self::Model, Self::Ean];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OldShopSku => "old_shop_sku",
            Self::Sku => "sku",
            Self::Model => "model",
            Self::Ean => "ean",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::OldShopSku => "Via Old Shop SKU -> Model (recommended for supplier feeds)",
            Self::Sku => "SKU: match directly by new shop SKU",
            Self::Model => "Model: match directly by new shop Model",
            Self::Ean => "EAN: match directly by new shop EAN barcode",
        }
    }

    pub fn help(self) -> &'static str {
        match self {
            Self::OldShopSku => {
                "CSV column value -> look up in old shop SKU -> get model -> find in new shop by model. \
                 Best for supplier feeds with numeric codes."
            },
            Self::Sku => "CSV column value is matched directly against oc_product.sku in the new shop.",
            Self::Model => "CSV column value is matched directly against oc_product.model in the new shop.",
            Self::Ean => "CSV column value is matched directly against oc_product.ean in the new shop.",
        }
    }

    /// Short name of the identifier role under this strategy.
    pub fn identifier_label(self) -> &'static str {
        match self {
            Self::OldShopSku => "Identifier",
            Self::Sku => "SKU",
            Self::Model => "Model",
            Self::Ean => "EAN",
        }
    }

    /// Field label for the identifier column under this strategy.
    pub fn column_label(self) -> &'static str {
        match self {
            Self::OldShopSku => "SKU Column (old shop code)",
            Self::Sku => "SKU Column",
            Self::Model => "Model Column",
            Self::Ean => "EAN Column",
        }
    }
}

impl fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchStrategy {
    type Err = ErrorKind;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == s)
            .ok_or_else(|| ErrorKind::Validation(format!("unknown match strategy `{s}`")))
    }
}

/// The two CSV columns a feed reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Identifier,
    Quantity,
}

impl Role {
    /// Label shown next to a header mapped to this role.
    pub fn label(self, strategy: MatchStrategy) -> &'static str {
        match self {
            Self::Identifier => strategy.identifier_label(),
            Self::Quantity => "Qty",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Identifier => "identifier",
            Self::Quantity => "quantity",
        })
    }
}

impl FromStr for Role {
    type Err = ErrorKind;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "identifier" | "id" | "sku" => Ok(Self::Identifier),
            "quantity" | "qty" => Ok(Self::Quantity),
            _ => Err(ErrorKind::Validation(format!("unknown column role `{s}`"))),
        }
    }
}

fn default_identifier() -> String {
    DEFAULT_IDENTIFIER_COLUMN.to_string()
}

fn default_quantity() -> String {
    DEFAULT_QUANTITY_COLUMN.to_string()
}

/// Records written by hand or by older tools sometimes carry `null` where a
/// field was left blank; those read as if the field were missing.
fn null_as<'de, D, T>(deserializer: D, default: fn() -> T) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_else(default))
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    null_as(deserializer, T::default)
}

fn identifier_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    null_as(deserializer, default_identifier)
}

fn quantity_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    null_as(deserializer, default_quantity)
}

/// CSV header names for each [`Role`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Columns {
    #[serde(rename = "sku", default = "default_identifier", deserialize_with = "identifier_or_default")]
    pub identifier: String,
    #[serde(default = "default_quantity", deserialize_with = "quantity_or_default")]
    pub quantity: String,
}

impl Default for Columns {
    fn default() -> Self {
        Self { identifier: default_identifier(), quantity: default_quantity() }
    }
}

impl Columns {
    pub fn get(&self, role: Role) -> &str {
        match role {
            Role::Identifier => &self.identifier,
            Role::Quantity => &self.quantity,
        }
    }

    /// Map `header` to `role`, replacing whatever the role held. The other
    /// role is left alone even when it names the same header.
    pub fn assign(&mut self, role: Role, header: impl Into<String>) {
        match role {
            Role::Identifier => self.identifier = header.into(),
            Role::Quantity => self.quantity = header.into(),
        }
    }

    /// Roles currently mapped to `header`.
    pub fn roles_of(&self, header: &str) -> Vec<Role> {
        [Role::Identifier, Role::Quantity].into_iter().filter(|role| self.get(*role) == header).collect()
    }
}

fn default_enabled() -> bool {
    true
}

fn default_warehouse() -> u32 {
    DEFAULT_WAREHOUSE_ID
}

fn enabled_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<bool, D::Error> {
    null_as(deserializer, default_enabled)
}

fn warehouse_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u32, D::Error> {
    null_as(deserializer, default_warehouse)
}

/// A supplier stock feed definition.
///
/// Field order here is the field order on disk. Top-level fields this type
/// does not know about are kept in `extra` and written back after the known
/// ones, sorted by key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feed {
    pub name: String,
    #[serde(default = "default_enabled", deserialize_with = "enabled_or_default")]
    pub enabled: bool,
    #[serde(rename = "csv_url", default, deserialize_with = "null_as_default")]
    pub source_url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub delimiter: Delimiter,
    #[serde(default, deserialize_with = "null_as_default")]
    pub columns: Columns,
    #[serde(rename = "match_by", default, deserialize_with = "null_as_default")]
    pub match_strategy: MatchStrategy,
    #[serde(default = "default_warehouse", deserialize_with = "warehouse_or_default")]
    pub warehouse_id: u32,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for Feed {
    fn default() -> Self {
        Self {
            name: String::new(),
            enabled: true,
            source_url: String::new(),
            delimiter: Delimiter::default(),
            columns: Columns::default(),
            match_strategy: MatchStrategy::default(),
            warehouse_id: DEFAULT_WAREHOUSE_ID,
            extra: BTreeMap::new(),
        }
    }
}

impl Feed {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    /// Parse the stored record `key`.
    pub fn from_json(key: &str, json: &str) -> Result<Self> {
        serde_json::from_str(json).or_raise(|| ErrorKind::CorruptRecord(key.to_string()))
    }

    /// Pretty JSON with two-space indentation and a single trailing newline.
    pub fn to_json(&self) -> Result<String> {
        let mut json = serde_json::to_string_pretty(self)
            .or_raise(|| ErrorKind::Validation(format!("`{}` could not be serialized", self.name)))?;
        json.push('\n');
        Ok(json)
    }

    pub fn storage_key(&self) -> String {
        storage_key(&self.name)
    }

    /// Only the name is checked: it must contain something besides whitespace.
    pub fn validate_for_save(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            exn::bail!(ErrorKind::Validation("feed name is required".to_string()));
        }
        Ok(())
    }

    /// Copy with surrounding whitespace removed from the name, source URL and
    /// column names.
    pub fn normalized(&self) -> Self {
        let mut feed = self.clone();
        feed.name = feed.name.trim().to_string();
        feed.source_url = feed.source_url.trim().to_string();
        feed.columns.identifier = feed.columns.identifier.trim().to_string();
        feed.columns.quantity = feed.columns.quantity.trim().to_string();
        feed
    }

    /// Last path segment of the source URL, if there is one.
    pub fn source_name(&self) -> Option<&str> {
        match self.source_url.is_empty() {
            true => None,
            false => self.source_url.rsplit('/').next(),
        }
    }

    pub fn warehouse_label(&self) -> Option<&'static str> {
        warehouse_label(self.warehouse_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const STORED: &str = r#"{
  "name": "3DMX",
  "enabled": true,
  "csv_url": "https://raw.githubusercontent.com/AlL4music/Imusic/main/3dmx_sklad.csv",
  "delimiter": ";",
  "columns": {
    "sku": "SKU",
    "quantity": "Pocet_ks"
  },
  "match_by": "old_shop_sku",
  "warehouse_id": 2
}
"#;

    #[rstest]
    #[case("3DMX", "3dmx.json")]
    #[case("Ben's Shop!!", "ben_s_shop__.json")]
    #[case("A B", "a_b.json")]
    #[case("A-B", "a_b.json")]
    #[case("Kytary.sk", "kytary_sk.json")]
    #[case("Muziker ČR", "muziker__r.json")]
    #[case("Skladom 🎸", "skladom___.json")]
    #[case("already_ok_123", "already_ok_123.json")]
    fn storage_key_examples(#[case] name: &str, #[case] expected: &str) {
        assert_eq!(storage_key(name), expected);
    }

    #[rstest]
    #[case("x")]
    #[case("  spaced  ")]
    #[case("ÀÉÎ ÕÜ")]
    #[case("日本語")]
    #[case("tab\tand\nnewline")]
    fn storage_key_shape(#[case] name: &str) {
        let key = storage_key(name);
        let stem = key.strip_suffix(".json").unwrap();
        assert!(!stem.is_empty());
        assert!(stem.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'));
        // A key is a fixed point of the transformation.
        assert_eq!(storage_key(stem), key);
    }

    #[test]
    fn stored_record_round_trips_byte_for_byte() {
        let feed = Feed::from_json("3dmx.json", STORED).unwrap();
        assert_eq!(feed.name, "3DMX");
        assert_eq!(feed.delimiter, Delimiter::Semicolon);
        assert_eq!(feed.match_strategy, MatchStrategy::OldShopSku);
        assert_eq!(feed.to_json().unwrap(), STORED);
    }

    #[test]
    fn unknown_fields_are_preserved_after_known_ones() {
        let json = "{\"zeta\": 1, \"name\": \"Kytary\", \"alpha\": {\"x\": [1, 2]}, \"delimiter\": \"\\t\"}";
        let feed = Feed::from_json("kytary.json", json).unwrap();
        assert_eq!(feed.delimiter, Delimiter::Tab);
        let written = feed.to_json().unwrap();
        let warehouse = written.find("\"warehouse_id\"").unwrap();
        let alpha = written.find("\"alpha\"").unwrap();
        let zeta = written.find("\"zeta\"").unwrap();
        assert!(warehouse < alpha && alpha < zeta);
        assert_eq!(Feed::from_json("kytary.json", &written).unwrap(), feed);
    }

    #[test]
    fn missing_optional_fields_take_defaults() {
        let feed = Feed::from_json("a.json", r#"{"name": "A", "columns": {"sku": "Kod"}}"#).unwrap();
        assert!(feed.enabled);
        assert_eq!(feed.source_url, "");
        assert_eq!(feed.columns.identifier, "Kod");
        assert_eq!(feed.columns.quantity, DEFAULT_QUANTITY_COLUMN);
        assert_eq!(feed.warehouse_id, 2);
        assert_eq!(feed, Feed { columns: feed.columns.clone(), ..Feed::named("A") });
    }

    #[rstest]
    #[case(r#"{"name": "A", "enabled": null}"#)]
    #[case(r#"{"name": "A", "csv_url": null}"#)]
    #[case(r#"{"name": "A", "delimiter": null}"#)]
    #[case(r#"{"name": "A", "columns": null}"#)]
    #[case(r#"{"name": "A", "columns": {"sku": null, "quantity": null}}"#)]
    #[case(r#"{"name": "A", "match_by": null}"#)]
    #[case(r#"{"name": "A", "warehouse_id": null}"#)]
    fn null_fields_take_defaults(#[case] json: &str) {
        assert_eq!(Feed::from_json("a.json", json).unwrap(), Feed::named("A"));
    }

    #[test]
    fn null_fields_are_written_back_as_defaults() {
        let feed = Feed::from_json("a.json", r#"{"name": "A", "csv_url": null, "columns": {"sku": null}}"#).unwrap();
        let json = feed.to_json().unwrap();
        assert!(json.contains(r#""csv_url": """#));
        assert!(json.contains(r#""sku": "SKU""#));
        assert!(!json.contains("null"));
    }

    #[rstest]
    #[case("{not json")]
    #[case(r#"{"enabled": true}"#)]
    #[case(r#"{"name": "A", "match_by": "barcode"}"#)]
    #[case(r#"{"name": "A", "delimiter": "|"}"#)]
    #[case(r#"{"name": "A", "warehouse_id": "two"}"#)]
    fn unparseable_records_are_corrupt(#[case] json: &str) {
        let err = Feed::from_json("bad.json", json).unwrap_err();
        assert!(matches!(&*err, ErrorKind::CorruptRecord(key) if key == "bad.json"));
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("\t\n")]
    fn blank_names_fail_validation(#[case] name: &str) {
        let err = Feed::named(name).validate_for_save().unwrap_err();
        assert!(matches!(&*err, ErrorKind::Validation(_)));
    }

    #[test]
    fn any_other_name_passes_validation() {
        let feed = Feed {
            source_url: "not a url".to_string(),
            warehouse_id: 99,
            columns: Columns { identifier: String::new(), quantity: String::new() },
            ..Feed::named(" x ")
        };
        assert!(feed.validate_for_save().is_ok());
    }

    #[test]
    fn normalization_trims_free_text() {
        let mut feed = Feed::named("  Muziker ");
        feed.source_url = " https://example.com/muziker.csv\n".to_string();
        feed.columns.assign(Role::Quantity, " Stock ");
        let feed = feed.normalized();
        assert_eq!(feed.name, "Muziker");
        assert_eq!(feed.source_url, "https://example.com/muziker.csv");
        assert_eq!(feed.columns.quantity, "Stock");
        assert_eq!(feed.source_name(), Some("muziker.csv"));
    }

    #[test]
    fn columns_may_share_a_header() {
        let mut columns = Columns::default();
        columns.assign(Role::Identifier, "Kod");
        columns.assign(Role::Quantity, "Kod");
        assert_eq!(columns.roles_of("Kod"), vec![Role::Identifier, Role::Quantity]);
        assert!(columns.roles_of(DEFAULT_IDENTIFIER_COLUMN).is_empty());
    }

    #[rstest]
    #[case("old_shop_sku", MatchStrategy::OldShopSku)]
    #[case("ean", MatchStrategy::Ean)]
    fn match_strategy_from_str(#[case] input: &str, #[case] expected: MatchStrategy) {
        assert_eq!(input.parse::<MatchStrategy>().unwrap(), expected);
        assert_eq!(expected.to_string(), input);
    }

    #[test]
    fn warehouse_labels() {
        assert_eq!(warehouse_label(3), Some("Pre-Order / Predobjednávka"));
        assert_eq!(Feed { warehouse_id: 7, ..Feed::named("x") }.warehouse_label(), None);
    }
}
