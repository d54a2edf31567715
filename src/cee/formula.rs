//! Normalisation of the valorisation formula stored against a catalogue product.
//!
//! The stored descriptor is loosely structured: it has been written by several versions of the
//! catalogue editor, so the same information can appear under different keys. Everything is
//! reduced to a [`CeeFormula`] here so that later stages only deal with canonical keys.
use crate::product::{LED_COUNT_KEY, ProductCatalogEntry, canonical_param_key};
use crate::value::{deserialise_lenient_number, first_positive_of};
use serde::{Deserialize, Serialize};

/// The sentinel key meaning "multiply by the link's quantity"
pub const QUANTITY_KEY: &str = "quantity";

/// A valorisation formula as stored in the catalogue
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FormulaDescriptor {
    /// Dynamic parameter (or quantity sentinel) the formula multiplies by
    #[serde(
        default,
        alias = "variableKey",
        alias = "key",
        alias = "variable",
        skip_serializing_if = "Option::is_none"
    )]
    pub variable_key: Option<String>,
    /// Label shown next to the multiplier
    #[serde(
        default,
        alias = "variableLabel",
        alias = "label",
        skip_serializing_if = "Option::is_none"
    )]
    pub variable_label: Option<String>,
    /// Multiplies the valorisation
    #[serde(
        default,
        deserialize_with = "deserialise_lenient_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub coefficient: Option<f64>,
    /// Value recorded with the formula, used for LED counts
    #[serde(
        default,
        alias = "variableValue",
        alias = "value",
        deserialize_with = "deserialise_lenient_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub variable_value: Option<f64>,
    /// Legacy LED count
    #[serde(
        default,
        alias = "ledCount",
        alias = "nombreLed",
        alias = "nombre_led",
        deserialize_with = "deserialise_lenient_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub led_count: Option<f64>,
    /// Legacy fixture count
    #[serde(
        default,
        alias = "fixtureCount",
        alias = "nombreLuminaires",
        deserialize_with = "deserialise_lenient_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub fixture_count: Option<f64>,
    /// Legacy quantity
    #[serde(
        default,
        deserialize_with = "deserialise_lenient_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub quantity: Option<f64>,
    /// Custom arithmetic expression giving the MWh per unit
    #[serde(
        default,
        alias = "customExpression",
        alias = "custom_expression",
        skip_serializing_if = "Option::is_none"
    )]
    pub expression: Option<String>,
}

/// Fields of a descriptor which may hold the number of fixtures, in order of preference
const FIXTURE_COUNT_SOURCES: [fn(&FormulaDescriptor) -> Option<f64>; 4] = [
    |d| d.variable_value,
    |d| d.led_count,
    |d| d.fixture_count,
    |d| d.quantity,
];

/// The quantity a formula multiplies the per-unit valorisation by
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariableKey {
    /// The link's own quantity
    Quantity,
    /// The number of LED fixtures
    LedCount,
    /// Any other dynamic parameter, by canonical key
    Param(String),
}

impl VariableKey {
    /// Canonicalise a raw key. Returns `None` for blank keys.
    pub fn parse(raw: &str) -> Option<Self> {
        let key = canonical_param_key(raw);
        match key.as_str() {
            "" => None,
            "quantity" | "quantite" | "qte" => Some(Self::Quantity),
            LED_COUNT_KEY => Some(Self::LedCount),
            _ => Some(Self::Param(key)),
        }
    }

    /// The canonical spelling of the key
    pub fn as_str(&self) -> &str {
        match self {
            Self::Quantity => QUANTITY_KEY,
            Self::LedCount => LED_COUNT_KEY,
            Self::Param(key) => key,
        }
    }
}

/// A formula in canonical form
#[derive(Debug, Clone, PartialEq)]
pub struct CeeFormula {
    /// Canonical variable key
    pub variable_key: VariableKey,
    /// Trimmed label, if not blank
    pub variable_label: Option<String>,
    /// A finite, strictly positive coefficient, if one was given
    pub coefficient: Option<f64>,
    /// For the LED count key this is always present (possibly zero)
    pub variable_value: Option<f64>,
}

/// Reduce a stored descriptor to canonical form.
///
/// Returns `None` if there is no descriptor or it names no variable.
pub fn normalize_formula(descriptor: Option<&FormulaDescriptor>) -> Option<CeeFormula> {
    let descriptor = descriptor?;
    let variable_key = VariableKey::parse(descriptor.variable_key.as_deref()?)?;

    let variable_value = if variable_key == VariableKey::LedCount {
        Some(first_positive_of(descriptor, &FIXTURE_COUNT_SOURCES).unwrap_or(0.0))
    } else {
        descriptor.variable_value.filter(|value| value.is_finite())
    };

    Some(CeeFormula {
        variable_key,
        variable_label: non_blank(descriptor.variable_label.as_deref()),
        coefficient: descriptor.coefficient.filter(|c| c.is_finite() && *c > 0.0),
        variable_value,
    })
}

impl CeeFormula {
    /// Convert back into a descriptor, keeping `expression` alongside
    pub fn to_descriptor(&self, expression: Option<String>) -> FormulaDescriptor {
        FormulaDescriptor {
            variable_key: Some(self.variable_key.as_str().to_string()),
            variable_label: self.variable_label.clone(),
            coefficient: self.coefficient,
            variable_value: self.variable_value,
            expression,
            ..FormulaDescriptor::default()
        }
    }
}

fn non_blank(text: Option<&str>) -> Option<String> {
    text.map(str::trim)
        .filter(|text| !text.is_empty())
        .map(ToString::to_string)
}

/// The valorisation-related settings of a catalogue product
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProductCeeConfig {
    /// Bonification overriding the project's
    pub bonification: Option<f64>,
    /// Coefficient applied to the valorisation
    pub coefficient: Option<f64>,
    /// Stored valorisation formula
    pub formula: Option<FormulaDescriptor>,
}

impl ProductCeeConfig {
    /// Extract the settings from a catalogue entry
    pub fn from_entry(entry: &ProductCatalogEntry) -> Self {
        Self {
            bonification: entry.bonification,
            coefficient: entry.coefficient,
            formula: entry.formula.clone(),
        }
    }

    /// The custom expression, if one is set and non-blank
    pub fn expression(&self) -> Option<&str> {
        self.formula
            .as_ref()
            .and_then(|formula| formula.expression.as_deref())
            .map(str::trim)
            .filter(|expression| !expression.is_empty())
    }
}

/// Put a product's valorisation settings in canonical form.
///
/// Non-positive or non-finite overrides are dropped so that defaults apply downstream. A formula
/// without a variable key is kept only if it carries a custom expression. Applying this function
/// to its own output returns the same value.
pub fn normalize_product_cee_config(config: &ProductCeeConfig) -> ProductCeeConfig {
    let positive = |value: Option<f64>| value.filter(|v| v.is_finite() && *v > 0.0);
    let expression = non_blank(config.expression());

    let formula = match normalize_formula(config.formula.as_ref()) {
        Some(formula) => Some(formula.to_descriptor(expression)),
        None => expression.map(|expression| FormulaDescriptor {
            expression: Some(expression),
            ..FormulaDescriptor::default()
        }),
    };

    ProductCeeConfig {
        bonification: positive(config.bonification),
        coefficient: positive(config.coefficient),
        formula,
    }
}
