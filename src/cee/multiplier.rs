//! Resolution of the quantity which multiplies a product's per-unit valorisation.
//!
//! A variable declared by the product's formula always takes precedence over what can be guessed
//! from the parameter schema. When nothing applies, no multiplier is returned: the product then
//! contributes nothing rather than being valued as a single unit.
use crate::cee::formula::{VariableKey, normalize_formula};
use crate::product::{
    LED_COUNT_KEY, ParamField, ProductCatalogEntry, ProjectProductLink, canonical_param_key,
};
use crate::units::Quantity;
use crate::value::slug;
use log::debug;

/// Label used when the link's own quantity is the multiplier
pub const QUANTITY_LABEL: &str = "Quantité";

/// Where a multiplier was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultiplierSource {
    /// The formula asked for the link's quantity
    FormulaQuantity,
    /// The formula named a dynamic parameter
    FormulaParam,
    /// A schema field matched one of the heuristic tiers
    Schema(HeuristicTier),
    /// Fallback on the link's quantity
    LinkQuantity,
}

/// The resolved multiplier for a project product
#[derive(Debug, Clone, PartialEq)]
pub struct Multiplier {
    /// The number of units
    pub value: Quantity,
    /// Label shown next to the number of units
    pub label: String,
    /// Where the multiplier was found
    pub source: MultiplierSource,
}

/// Kinds of schema field which can act as a multiplier, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeuristicTier {
    /// Insulated surface
    InsulatedSurface,
    /// Number of LEDs
    LedCount,
    /// A generic quantity field
    GenericQuantity,
    /// Billed surface
    BilledSurface,
    /// Number of light fixtures
    FixtureCount,
    /// Any other surface
    GenericSurface,
}

impl HeuristicTier {
    /// All tiers, highest priority first
    pub const ALL: [HeuristicTier; 6] = [
        Self::InsulatedSurface,
        Self::LedCount,
        Self::GenericQuantity,
        Self::BilledSurface,
        Self::FixtureCount,
        Self::GenericSurface,
    ];

    /// Whether a slugged field name or label belongs to this tier
    fn matches(self, key: &str) -> bool {
        let has = |part: &str| key.contains(part);
        match self {
            Self::InsulatedSurface => {
                has("surface_isol") || has("surface_a_isoler") || has("insulated_area")
            }
            Self::LedCount => {
                key == LED_COUNT_KEY
                    || (has("led")
                        && !has("watt")
                        && (has("nombre") || has("nb") || has("count") || has("quantite")))
            }
            Self::GenericQuantity => {
                ["quantite", "quantity", "qte"]
                    .iter()
                    .any(|word| key == *word || key.starts_with(&format!("{word}_")))
            }
            Self::BilledSurface => {
                has("surface_facture") || has("surface_facturation") || has("billed_surface")
            }
            Self::FixtureCount => {
                has("luminaire")
                    || has("points_lumineux")
                    || has("point_lumineux")
                    || has("fixture")
            }
            Self::GenericSurface => has("surface") || has("m2") || has("area"),
        }
    }

    fn matches_field(self, field: &ParamField) -> bool {
        self.matches(&canonical_param_key(&field.name))
            || field.label.as_deref().is_some_and(|label| self.matches(&slug(label)))
    }
}

/// Determine the multiplier for a product configured on a project.
///
/// In order of priority:
///
/// 1. The formula declares the quantity sentinel and the link has a positive quantity
/// 2. The formula names a dynamic parameter which has a positive value
/// 3. A schema field matches one of the [`HeuristicTier`]s and has a positive value
/// 4. The link has a positive quantity
pub fn resolve_multiplier(
    entry: &ProductCatalogEntry,
    link: &ProjectProductLink,
) -> Option<Multiplier> {
    let multiplier = from_formula(entry, link)
        .or_else(|| from_schema(entry, link))
        .or_else(|| {
            link.positive_quantity().map(|value| Multiplier {
                value,
                label: QUANTITY_LABEL.to_string(),
                source: MultiplierSource::LinkQuantity,
            })
        });

    if multiplier.is_none() {
        debug!("No multiplier could be resolved for product {}", entry.id);
    }

    multiplier
}

fn from_formula(entry: &ProductCatalogEntry, link: &ProjectProductLink) -> Option<Multiplier> {
    let formula = normalize_formula(entry.formula.as_ref())?;

    match &formula.variable_key {
        VariableKey::Quantity => link.positive_quantity().map(|value| Multiplier {
            value,
            label: formula
                .variable_label
                .clone()
                .unwrap_or_else(|| QUANTITY_LABEL.to_string()),
            source: MultiplierSource::FormulaQuantity,
        }),
        key => {
            let mut value = link.dynamic_params.positive(key.as_str());
            if value.is_none() && *key == VariableKey::LedCount {
                // A count recorded on the formula itself
                value = formula.variable_value.filter(|count| *count > 0.0);
            }

            let label = formula
                .variable_label
                .clone()
                .or_else(|| {
                    entry
                        .find_field(key.as_str())
                        .map(|field| field.display_label().to_string())
                })
                .unwrap_or_else(|| raw_variable_key(entry).unwrap_or(key.as_str()).to_string());

            value.map(|value| Multiplier {
                value: Quantity(value),
                label,
                source: MultiplierSource::FormulaParam,
            })
        }
    }
}

/// The formula's variable key as written in the catalogue
fn raw_variable_key(entry: &ProductCatalogEntry) -> Option<&str> {
    entry
        .formula
        .as_ref()
        .and_then(|formula| formula.variable_key.as_deref())
        .map(str::trim)
        .filter(|key| !key.is_empty())
}

fn from_schema(entry: &ProductCatalogEntry, link: &ProjectProductLink) -> Option<Multiplier> {
    HeuristicTier::ALL.into_iter().find_map(|tier| {
        entry
            .schema
            .iter()
            .filter(|field| tier.matches_field(field))
            .find_map(|field| {
                link.dynamic_params.positive(&field.name).map(|value| Multiplier {
                    value: Quantity(value),
                    label: field.display_label().to_string(),
                    source: MultiplierSource::Schema(tier),
                })
            })
    })
}
