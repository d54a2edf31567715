//! Product catalogue records and their links to a project.
//!
//! These records are supplied by the surrounding application (catalogue administration, project
//! forms). Legacy camelCase spellings of fields are accepted when deserialising.
use crate::cee::formula::FormulaDescriptor;
use crate::id::{define_id_type, eq_ignore_case};
use crate::units::{Kwh, MoneyPerMwh, Quantity};
use crate::value::{ParamValue, deserialise_lenient_number, slug};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_string_enum::{DeserializeLabeledStringEnum, SerializeLabeledStringEnum};
use std::fmt::Display;

define_id_type! {ProductID}
define_id_type! {BuildingTypeID}

/// A map of catalogue entries, keyed by product ID
pub type ProductCatalog = IndexMap<ProductID, ProductCatalogEntry>;

/// The family a product belongs to.
///
/// Anything not recognised is treated as [`ProductCategory::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProductCategory {
    /// Wall, roof and floor insulation, measured in m²
    Isolation,
    /// LED lighting, measured in fixtures
    Lighting,
    /// Heat pumps, boilers etc.
    Heating,
    /// Ventilation systems
    Ventilation,
    /// Anything else
    #[default]
    Other,
}

impl ProductCategory {
    /// Parse a category name, accepting English and French spellings
    pub fn parse(name: &str) -> Self {
        match slug(name).as_str() {
            "isolation" | "insulation" => Self::Isolation,
            "lighting" | "eclairage" | "luminaire" | "luminaires" | "led" => Self::Lighting,
            "heating" | "chauffage" => Self::Heating,
            "ventilation" | "vmc" => Self::Ventilation,
            _ => Self::Other,
        }
    }

    /// The canonical name for the category
    pub fn label(self) -> &'static str {
        match self {
            Self::Isolation => "isolation",
            Self::Lighting => "lighting",
            Self::Heating => "heating",
            Self::Ventilation => "ventilation",
            Self::Other => "other",
        }
    }
}

impl Display for ProductCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl Serialize for ProductCategory {
    fn serialize<S>(&self, serialiser: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serialiser.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for ProductCategory {
    fn deserialize<D>(deserialiser: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let name: String = Deserialize::deserialize(deserialiser)?;
        Ok(Self::parse(&name))
    }
}

/// The type of input shown for a parameter field
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    SerializeLabeledStringEnum,
    DeserializeLabeledStringEnum,
)]
pub enum ParamFieldType {
    /// A number
    #[default]
    #[string = "number"]
    Number,
    /// Free text
    #[string = "text"]
    Text,
    /// One of `options`
    #[string = "select"]
    Select,
    /// A yes/no box
    #[string = "checkbox"]
    Checkbox,
}

/// One field of a product's parameter schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamField {
    /// Key under which the value is stored in the link's dynamic params
    pub name: String,
    /// Human-readable label shown in forms
    #[serde(default)]
    pub label: Option<String>,
    /// Kind of form input
    #[serde(default, rename = "type")]
    pub kind: ParamFieldType,
    /// Smallest accepted value
    #[serde(default)]
    pub min: Option<f64>,
    /// Largest accepted value
    #[serde(default)]
    pub max: Option<f64>,
    /// Choices for select fields
    #[serde(default)]
    pub options: Vec<String>,
}

impl ParamField {
    /// The label to show for this field, falling back to its name
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }
}

/// Baseline kWh cumac values for one building type.
///
/// Separate values apply to buildings smaller than, or at least, the surface threshold (400 m²).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KwhCumacValue {
    /// Building type the values apply to
    #[serde(alias = "buildingType")]
    pub building_type: BuildingTypeID,
    /// Value for buildings below the surface threshold
    #[serde(
        default,
        alias = "kwhCumacLt400",
        deserialize_with = "deserialise_lenient_kwh"
    )]
    pub kwh_cumac_lt_400: Option<Kwh>,
    /// Value for buildings at or above the surface threshold
    #[serde(
        default,
        alias = "kwhCumacGte400",
        deserialize_with = "deserialise_lenient_kwh"
    )]
    pub kwh_cumac_gte_400: Option<Kwh>,
}

fn deserialise_lenient_kwh<'de, D>(deserialiser: D) -> Result<Option<Kwh>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(deserialise_lenient_number(deserialiser)?.map(Kwh))
}

/// A product from the catalogue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductCatalogEntry {
    /// Unique product ID
    pub id: ProductID,
    /// Product name
    pub name: String,
    /// Regulatory operation code (e.g. BAR-EN-101)
    #[serde(default)]
    pub code: String,
    /// The category as written in the catalogue; see [`ProductCatalogEntry::category`]
    #[serde(default, rename = "category")]
    pub category_name: String,
    /// Whether the product is offered in the catalogue editor
    #[serde(default = "default_active", alias = "isActive")]
    pub active: bool,
    /// Ordered parameter fields shown when configuring the product on a project
    #[serde(default, alias = "paramsSchema", alias = "params_schema")]
    pub schema: Vec<ParamField>,
    /// Bonification overriding the project's
    #[serde(default, deserialize_with = "deserialise_lenient_number")]
    pub bonification: Option<f64>,
    /// Coefficient applied to the valorisation
    #[serde(default, deserialize_with = "deserialise_lenient_number")]
    pub coefficient: Option<f64>,
    /// Stored valorisation formula
    #[serde(default, alias = "ceeFormula", alias = "cee_formula")]
    pub formula: Option<FormulaDescriptor>,
    /// Baseline kWh cumac values per building type
    #[serde(default, alias = "kwhCumacValues")]
    pub kwh_cumac_values: Vec<KwhCumacValue>,
}

fn default_active() -> bool {
    true
}

impl ProductCatalogEntry {
    /// The family the product belongs to
    pub fn category(&self) -> ProductCategory {
        ProductCategory::parse(&self.category_name)
    }

    /// Find the schema field whose name matches `key` (compared as slugs)
    pub fn find_field(&self, key: &str) -> Option<&ParamField> {
        let key = canonical_param_key(key);
        self.schema
            .iter()
            .find(|field| canonical_param_key(&field.name) == key)
    }

    /// Whether the product's code or category name starts with one of `prefixes`
    pub fn has_excluded_prefix(&self, prefixes: &[String]) -> bool {
        let code = slug(&self.code);
        let category = slug(&self.category_name);
        prefixes.iter().any(|prefix| {
            let prefix = slug(prefix);
            !prefix.is_empty() && (code.starts_with(&prefix) || category.starts_with(&prefix))
        })
    }

    /// Whether the entry has kWh values for the given building type
    pub fn kwh_values_for(&self, building_type: &str) -> Option<&KwhCumacValue> {
        self.kwh_cumac_values
            .iter()
            .find(|value| eq_ignore_case(&value.building_type.0, building_type))
    }
}

/// The canonical key for the number of LED fixtures
pub const LED_COUNT_KEY: &str = "nombre_led";

/// Spellings which all denote the number of LED fixtures, as slugs
const LED_COUNT_SYNONYMS: [&str; 12] = [
    "nombre_led",
    "nombre_de_led",
    "nombre_leds",
    "nb_led",
    "nb_leds",
    "led_count",
    "leds",
    "nombre_luminaires",
    "nombre_de_luminaires",
    "nb_luminaires",
    "fixture_count",
    "nombre_led_installees",
];

/// Reduce a dynamic parameter key to its canonical form.
///
/// Keys are slugged, then synonyms of the LED count are replaced with [`LED_COUNT_KEY`].
pub fn canonical_param_key(key: &str) -> String {
    let key = slug(key);
    if LED_COUNT_SYNONYMS.contains(&key.as_str()) {
        LED_COUNT_KEY.to_string()
    } else {
        key
    }
}

/// Values entered for a product's parameter schema, keyed by canonical key.
///
/// Keys are canonicalised once, when the map is built, so lookups never need to consider
/// spelling variants. If two spellings of the same key are present, the first one wins.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct DynamicParams(IndexMap<String, ParamValue>);

impl DynamicParams {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a value by any spelling of its key
    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(&canonical_param_key(key))
    }

    /// Look up a strictly positive number by any spelling of its key
    pub fn positive(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(ParamValue::as_positive)
    }

    /// Look up a finite number by any spelling of its key
    pub fn number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(ParamValue::as_number)
    }

    /// Iterate over the canonical keys and values
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Whether no values were entered
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: AsRef<str>> FromIterator<(K, ParamValue)> for DynamicParams {
    fn from_iter<T: IntoIterator<Item = (K, ParamValue)>>(iter: T) -> Self {
        let mut map = IndexMap::new();
        for (key, value) in iter {
            map.entry(canonical_param_key(key.as_ref()))
                .or_insert(value);
        }

        Self(map)
    }
}

impl<'de> Deserialize<'de> for DynamicParams {
    fn deserialize<D>(deserialiser: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: IndexMap<String, ParamValue> = Deserialize::deserialize(deserialiser)?;
        Ok(raw.into_iter().collect())
    }
}

/// A product as configured on a particular project
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProjectProductLink {
    /// Stable identifier of the link itself, if it has been saved
    #[serde(default)]
    pub id: Option<String>,
    /// Catalogue product this link refers to
    #[serde(alias = "productId")]
    pub product_id: Option<ProductID>,
    /// Quantity entered for the product
    #[serde(default, deserialize_with = "deserialise_lenient_quantity")]
    pub quantity: Option<Quantity>,
    /// Values entered for the product's parameter schema
    #[serde(default, alias = "dynamicParams")]
    pub dynamic_params: DynamicParams,
}

fn deserialise_lenient_quantity<'de, D>(deserialiser: D) -> Result<Option<Quantity>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(deserialise_lenient_number(deserialiser)?.map(Quantity))
}

impl ProjectProductLink {
    /// The link's quantity if it is strictly positive
    pub fn positive_quantity(&self) -> Option<Quantity> {
        self.quantity.filter(|quantity| quantity.is_positive())
    }
}

/// A buyer of certificates and the price it pays for them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delegate {
    /// Name of the delegate
    #[serde(default)]
    pub name: String,
    /// Price paid per MWh cumac
    #[serde(alias = "priceEurPerMwh")]
    pub price_eur_per_mwh: MoneyPerMwh,
}
