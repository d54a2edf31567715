//! Conversion of kWh cumac savings into MWh and euros.
//!
//! All figures are rounded to two decimals on the way out, never in between, so per-unit values
//! multiplied by the multiplier may differ from the rounded totals by a cent.
use crate::cee::expression::{ExpressionContext, evaluate};
use crate::parameters::CeeParameters;
use crate::product::{DynamicParams, ProductCategory};
use crate::units::{Dimensionless, Kwh, Money, MoneyPerMwh, Mwh, MwhPerQuantity, Quantity, round2};
use log::warn;
use serde::Serialize;

/// Per-category rules for building the variables available to custom expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValorisationStrategy {
    /// LED lighting: the installed power and overseas bonus come from the product's parameters
    Lighting,
    /// Every other product
    Standard,
}

impl ValorisationStrategy {
    /// Select the strategy for a product category
    pub fn for_category(category: ProductCategory) -> Self {
        match category {
            ProductCategory::Lighting => Self::Lighting,
            _ => Self::Standard,
        }
    }

    /// Installed LED power (W) for the expression context
    fn led_watt(self, params: &DynamicParams) -> f64 {
        match self {
            Self::Lighting => params.positive("led_watt").unwrap_or(0.0),
            Self::Standard => 0.0,
        }
    }

    /// Overseas (DOM) bonus for the expression context
    fn bonus_dom(self, params: &DynamicParams) -> f64 {
        match self {
            Self::Lighting => params.positive("bonus_dom").unwrap_or(1.0),
            Self::Standard => 1.0,
        }
    }
}

/// Everything needed to value one project product
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValorisationInput {
    /// Baseline kWh cumac for one unit
    pub base_kwh: Kwh,
    /// Falls back on the default bonification when absent or not positive
    pub bonification: Option<Dimensionless>,
    /// Falls back on 1 when absent or not positive
    pub coefficient: Option<Dimensionless>,
    /// Zero when no multiplier could be resolved
    pub multiplier: Quantity,
    /// Label shown next to the multiplier
    pub multiplier_label: Option<String>,
    /// Zero when no delegate is known
    pub delegate_price: MoneyPerMwh,
    /// Custom expression giving the MWh per unit
    pub expression: Option<String>,
    /// LED power (W) for custom expressions
    pub led_watt: f64,
    /// Overseas bonus for custom expressions
    pub bonus_dom: f64,
}

impl ValorisationInput {
    /// Fill in the expression variables which depend on the product category
    pub fn with_strategy(mut self, strategy: ValorisationStrategy, params: &DynamicParams) -> Self {
        self.led_watt = strategy.led_watt(params);
        self.bonus_dom = strategy.bonus_dom(params);
        self
    }
}

/// The valorisation of a single project product
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ValorisationResult {
    /// Effective kWh cumac base for one unit
    pub base_kwh: Kwh,
    /// Bonification applied
    pub bonification: Dimensionless,
    /// Coefficient applied
    pub coefficient: Dimensionless,
    /// MWh cumac for one unit
    pub valorisation_per_unit_mwh: Mwh,
    /// Value of one unit at the delegate's price
    pub valorisation_per_unit_eur: Money,
    /// The number of units
    pub multiplier_value: Quantity,
    /// Label shown next to the number of units
    pub multiplier_label: Option<String>,
    /// MWh cumac for all units
    pub valorisation_total_mwh: Mwh,
    /// Value of all units at the delegate's price
    pub valorisation_total_eur: Money,
    /// Delegate price per MWh cumac
    pub delegate_price: MoneyPerMwh,
    /// Prime paid by the delegate
    pub total_prime: Money,
    /// No baseline kWh value was found for the building
    pub has_missing_kwh_cumac: bool,
    /// A custom expression was set but could not be used
    pub expression_failed: bool,
    /// A multiplier was found for the product
    pub multiplier_resolved: bool,
}

fn positive_or(value: Option<Dimensionless>, default: Dimensionless) -> Dimensionless {
    value
        .filter(|value| value.0.is_finite() && value.0 > 0.0)
        .unwrap_or(default)
}

/// Value a project product.
///
/// The MWh per unit is `kWh × bonification × coefficient / MWH_DIVISOR`, unless a custom
/// expression is given, in which case its result is used instead. The euro value is the MWh value
/// at the delegate's price, and totals are per-unit values times the multiplier.
///
/// A base or multiplier which is not strictly positive gives a valorisation of exactly zero, as
/// does an expression which fails or gives a negative result. Nothing here returns an error.
pub fn calculate_valorisation(
    input: &ValorisationInput,
    parameters: &CeeParameters,
) -> ValorisationResult {
    let bonification = positive_or(input.bonification, parameters.default_bonification);
    let coefficient = positive_or(input.coefficient, Dimensionless(1.0));
    let delegate_price = if input.delegate_price.is_positive() {
        input.delegate_price
    } else {
        MoneyPerMwh(0.0)
    };

    let mut result = ValorisationResult {
        base_kwh: Kwh(round2(input.base_kwh.0)),
        bonification,
        coefficient,
        multiplier_value: input.multiplier,
        multiplier_label: input.multiplier_label.clone(),
        delegate_price,
        multiplier_resolved: input.multiplier.is_positive(),
        ..ValorisationResult::default()
    };

    if !input.base_kwh.is_positive() || !input.multiplier.is_positive() {
        return result;
    }

    let divisor = parameters.mwh_divisor;
    let per_unit_mwh = match input.expression.as_deref() {
        None => (input.base_kwh * bonification * coefficient).0 / divisor,
        Some(expression) => {
            let context = ExpressionContext::new()
                .with("KWH_CUMAC", input.base_kwh.0)
                .with("BONIFICATION", bonification.0)
                .with("BONUS_DOM", input.bonus_dom)
                .with("LED_WATT", input.led_watt)
                .with("MWH_DIVISOR", divisor)
                .with("COEFFICIENT", coefficient.0);

            match evaluate(expression, &context) {
                Ok(value) if value >= 0.0 => {
                    // Report the base which the expression effectively applied
                    let effective_kwh = value * divisor / (bonification * coefficient).0;
                    result.base_kwh = Kwh(round2(effective_kwh));
                    value
                }
                Ok(value) => {
                    warn!(
                        "Valorisation expression '{expression}' gave a negative result ({value})"
                    );
                    result.expression_failed = true;
                    return result;
                }
                Err(err) => {
                    warn!("Could not evaluate valorisation expression '{expression}': {err}");
                    result.expression_failed = true;
                    return result;
                }
            }
        }
    };

    let per_unit_mwh = MwhPerQuantity(per_unit_mwh);
    let per_unit_eur = Mwh(per_unit_mwh.0) * delegate_price;
    let total_mwh = per_unit_mwh * input.multiplier;
    let total_eur = total_mwh * delegate_price;

    result.valorisation_per_unit_mwh = Mwh(round2(per_unit_mwh.0));
    result.valorisation_per_unit_eur = Money(round2(per_unit_eur.0));
    result.valorisation_total_mwh = Mwh(round2(total_mwh.0));
    result.valorisation_total_eur = Money(round2(total_eur.0));
    result.total_prime = result.valorisation_total_eur;

    result
}
