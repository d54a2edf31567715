//! Profitability of a site: turnover ("CA"), itemised costs and margin.
//!
//! The calculation works on a canonical [`RentabilityInput`]. Legacy site records are mapped onto
//! it by [`adapter`].
use crate::product::ProductCategory;
use crate::units::{Dimensionless, Money, MoneyPerQuantity, Quantity, round2, snap_to_zero};
use crate::value::slug;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_string_enum::{DeserializeLabeledStringEnum, SerializeLabeledStringEnum};
use std::str::FromStr;
use strum::{Display, EnumString};

pub mod adapter;
pub mod additional_cost;
use additional_cost::{AdditionalCost, additional_costs_total};

/// How non-subsidised works ("travaux non subventionnés") are accounted for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
pub enum TravauxOption {
    /// Not applicable: the amount is ignored
    #[default]
    #[strum(to_string = "NA", serialize = "AUCUN", serialize = "NONE")]
    Na,
    /// Paid by the client: counted as revenue
    #[strum(to_string = "CLIENT", serialize = "CLIENT_PAYE")]
    Client,
    /// Taken out of the margin: counted as a cost
    #[strum(to_string = "MARGE")]
    Marge,
    /// Split evenly between revenue and cost
    #[strum(to_string = "PARTAGE", serialize = "MOITIE", serialize = "50_50")]
    Partage,
}

impl TravauxOption {
    /// Parse a policy name.
    ///
    /// Case, accents and separators are ignored. Empty or unknown names give
    /// [`TravauxOption::Na`].
    pub fn parse(name: &str) -> Self {
        Self::from_str(&slug(name).to_uppercase()).unwrap_or_default()
    }

    /// Split `amount` into its (revenue, cost) shares
    pub fn split(self, amount: Money) -> (Money, Money) {
        if !amount.is_finite() || amount.0 == 0.0 {
            return (Money(0.0), Money(0.0));
        }

        match self {
            Self::Na => (Money(0.0), Money(0.0)),
            Self::Client => (amount, Money(0.0)),
            Self::Marge => (Money(0.0), amount),
            Self::Partage => {
                let half = Money(amount.0 / 2.0);
                (half, amount - half)
            }
        }
    }
}

impl Serialize for TravauxOption {
    fn serialize<S>(&self, serialiser: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serialiser.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TravauxOption {
    fn deserialize<D>(deserialiser: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let name: Option<String> = Deserialize::deserialize(deserialiser)?;
        Ok(name.as_deref().map(Self::parse).unwrap_or_default())
    }
}

/// What a site's units measure
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    DeserializeLabeledStringEnum,
    SerializeLabeledStringEnum,
)]
pub enum MeasurementMode {
    /// Surface in m²
    #[default]
    #[string = "surface"]
    Surface,
    /// Number of fixtures
    #[string = "fixture"]
    Fixture,
}

impl MeasurementMode {
    /// The unit label used when a site doesn't give one
    pub fn default_unit_label(self) -> &'static str {
        match self {
            Self::Surface => "m²",
            Self::Fixture => "luminaire",
        }
    }
}

/// Which unit count is trusted first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitStrategy {
    /// Billed units first, then executed units (lighting, fixtures)
    BilledFirst,
    /// Executed units first, then billed units (everything else)
    ExecutedFirst,
}

impl UnitStrategy {
    /// Select the strategy for a site
    pub fn select(category: ProductCategory, mode: MeasurementMode) -> Self {
        if category == ProductCategory::Lighting || mode == MeasurementMode::Fixture {
            Self::BilledFirst
        } else {
            Self::ExecutedFirst
        }
    }

    /// The number of units the per-unit costs apply to.
    ///
    /// The primary count is used if positive, otherwise the larger of the two. Missing or invalid
    /// counts give zero.
    pub fn effective_units(self, executed: Option<Quantity>, billed: Option<Quantity>) -> Quantity {
        let (primary, secondary) = match self {
            Self::BilledFirst => (billed, executed),
            Self::ExecutedFirst => (executed, billed),
        };
        let valid = |units: Option<Quantity>| units.filter(|u| u.is_finite()).map_or(0.0, |u| u.0);

        let primary = valid(primary);
        if primary > 0.0 {
            return Quantity(primary);
        }

        Quantity(primary.max(valid(secondary)).max(0.0))
    }
}

/// Commission paid to the salesperson
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Commission {
    /// Fixed amount
    pub fixed: Money,
    /// Amount per unit
    pub per_unit: MoneyPerQuantity,
    /// Whether the per-unit part applies
    pub per_unit_active: bool,
}

impl Commission {
    /// The commission for the given number of units
    pub fn total(&self, units: Quantity) -> Money {
        let fixed = finite_or_zero(self.fixed);
        if self.per_unit_active && self.per_unit.is_finite() {
            fixed + self.per_unit * units
        } else {
            fixed
        }
    }
}

/// Work handed to a subcontractor
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Subcontractor {
    /// Price per unit
    pub rate: MoneyPerQuantity,
    /// Units the rate applies to, if not the site's effective units
    pub base_units: Option<Quantity>,
    /// Only confirmed payments count towards the costs
    pub payment_confirmed: bool,
}

impl Subcontractor {
    /// The subcontractor's cost, whether or not the payment is confirmed
    pub fn cost(&self, effective_units: Quantity) -> Money {
        if !self.rate.is_finite() {
            return Money(0.0);
        }

        let units = self
            .base_units
            .filter(|units| units.is_positive())
            .unwrap_or(effective_units);
        self.rate * units
    }
}

/// Canonical input to the rentability calculation
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct RentabilityInput {
    /// Determines how units are counted, with `measurement_mode`
    pub category: ProductCategory,
    /// Whether units are surfaces or fixtures
    pub measurement_mode: MeasurementMode,
    /// Overrides the unit label of the measurement mode
    pub unit_label: Option<String>,
    /// Revenue before subsidy
    pub revenue: Money,
    /// The CEE subsidy value
    pub subsidy: Money,
    /// Labour cost per unit
    pub labor_rate: MoneyPerQuantity,
    /// Material cost per unit
    pub material_rate: MoneyPerQuantity,
    /// Units actually laid
    pub executed_units: Option<Quantity>,
    /// Units billed to the client
    pub billed_units: Option<Quantity>,
    /// Salesperson's commission
    pub commission: Commission,
    /// Amount of non-subsidised works
    pub travaux_amount: Money,
    /// How non-subsidised works are shared
    pub travaux_option: TravauxOption,
    /// Additional cost lines
    pub additional_costs: Vec<AdditionalCost>,
    /// Project VAT rate, either as a percentage or a fraction
    pub project_vat_rate: Option<f64>,
    /// Absent when no rate could be found
    pub subcontractor: Option<Subcontractor>,
}

/// Itemised costs
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct CostBreakdown {
    /// Labour cost
    pub labor: Money,
    /// Material cost
    pub material: Money,
    /// Additional costs, tax included
    pub additional: Money,
    /// Salesperson's commission
    pub commission: Money,
    /// Zero unless the subcontractor payment is confirmed
    pub subcontractor: Money,
    /// Cost share of non-subsidised works
    pub travaux: Money,
}

impl CostBreakdown {
    /// The sum of all cost items
    pub fn total(&self) -> Money {
        self.labor
            + self.material
            + self.additional
            + self.commission
            + self.subcontractor
            + self.travaux
    }

    fn snapped(self, tolerance: f64) -> Self {
        Self {
            labor: snap(self.labor, tolerance),
            material: snap(self.material, tolerance),
            additional: snap(self.additional, tolerance),
            commission: snap(self.commission, tolerance),
            subcontractor: snap(self.subcontractor, tolerance),
            travaux: snap(self.travaux, tolerance),
        }
    }
}

/// The totals stored on the site record
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct SnapshotTotals {
    /// Turnover
    pub revenue_ttc: Money,
    /// Total costs
    pub cost_ttc: Money,
    /// Margin
    pub margin_ttc: Money,
}

/// The outcome of the rentability calculation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RentabilityResult {
    /// Turnover: revenue + subsidy + revenue share of non-subsidised works
    pub ca: Money,
    /// Subsidy counted in the turnover
    pub subsidy: Money,
    /// Revenue share of non-subsidised works
    pub travaux_revenue: Money,
    /// Cost share of non-subsidised works
    pub travaux_cost: Money,
    /// Itemised costs
    pub costs: CostBreakdown,
    /// Sum of the itemised costs
    pub total_costs: Money,
    /// The subcontractor's cost, whether or not it is included in the totals
    pub subcontractor_estimate: Money,
    /// Whether the subcontractor's cost is included
    pub subcontractor_included: bool,
    /// Turnover less costs
    pub margin_total: Money,
    /// Margin per unit
    pub margin_per_unit: MoneyPerQuantity,
    /// Margin as a fraction of turnover
    pub margin_rate: Dimensionless,
    /// Units the per-unit figures are based on
    pub units_used: Quantity,
    /// Unit shown next to per-unit figures
    pub unit_label: String,
    /// Totals rounded to cents
    pub snapshot: SnapshotTotals,
}

fn finite_or_zero(value: Money) -> Money {
    if value.is_finite() { value } else { Money(0.0) }
}

fn snap<T>(value: T, tolerance: f64) -> T
where
    T: From<f64> + Into<f64>,
{
    T::from(snap_to_zero(value.into(), tolerance))
}

/// Calculate the rentability of a site.
///
/// # Arguments
///
/// * `input` - The site's financial figures
/// * `zero_tolerance` - Results closer than this to zero are reported as exactly zero
pub fn calculate_rentability(input: &RentabilityInput, zero_tolerance: f64) -> RentabilityResult {
    let strategy = UnitStrategy::select(input.category, input.measurement_mode);
    let units = strategy.effective_units(input.executed_units, input.billed_units);

    let (travaux_revenue, travaux_cost) = input.travaux_option.split(input.travaux_amount);

    let subcontractor_estimate = input
        .subcontractor
        .map_or(Money(0.0), |subcontractor| subcontractor.cost(units));
    let subcontractor_included = input
        .subcontractor
        .is_some_and(|subcontractor| subcontractor.payment_confirmed);

    let per_unit = |rate: MoneyPerQuantity| {
        if rate.is_finite() {
            rate * units
        } else {
            Money(0.0)
        }
    };
    let costs = CostBreakdown {
        labor: per_unit(input.labor_rate),
        material: per_unit(input.material_rate),
        additional: additional_costs_total(&input.additional_costs, input.project_vat_rate),
        commission: input.commission.total(units),
        subcontractor: if subcontractor_included {
            subcontractor_estimate
        } else {
            Money(0.0)
        },
        travaux: travaux_cost,
    };

    let tol = zero_tolerance;
    let subsidy = finite_or_zero(input.subsidy);
    let ca = finite_or_zero(input.revenue) + subsidy + travaux_revenue;
    let ca = snap(ca, tol);
    let total_costs = snap(costs.total(), tol);
    let margin_total = snap(ca - total_costs, tol);

    // Ratios are taken on the snapped figures
    let units_used = snap(units, tol);
    let margin_rate = if ca.0 == 0.0 {
        Dimensionless(0.0)
    } else {
        margin_total / ca
    };
    let margin_per_unit = if units_used.0 == 0.0 {
        MoneyPerQuantity(0.0)
    } else {
        margin_total / units_used
    };

    RentabilityResult {
        ca,
        subsidy: snap(subsidy, tol),
        travaux_revenue: snap(travaux_revenue, tol),
        travaux_cost: snap(travaux_cost, tol),
        costs: costs.snapped(tol),
        total_costs,
        subcontractor_estimate: snap(subcontractor_estimate, tol),
        subcontractor_included,
        margin_total,
        margin_per_unit: snap(margin_per_unit, tol),
        margin_rate: snap(margin_rate, tol),
        units_used,
        unit_label: input
            .unit_label
            .clone()
            .filter(|label| !label.trim().is_empty())
            .unwrap_or_else(|| input.measurement_mode.default_unit_label().to_string()),
        snapshot: SnapshotTotals {
            revenue_ttc: Money(round2(ca.0)),
            cost_ttc: Money(round2(total_costs.0)),
            margin_ttc: Money(round2(margin_total.0)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;
    use rstest::{fixture, rstest};

    #[fixture]
    fn example_input() -> RentabilityInput {
        RentabilityInput {
            category: ProductCategory::Isolation,
            revenue: Money(10000.0),
            subsidy: Money(2000.0),
            labor_rate: MoneyPerQuantity(10.0),
            material_rate: MoneyPerQuantity(5.0),
            executed_units: Some(Quantity(100.0)),
            commission: Commission {
                fixed: Money(300.0),
                per_unit: MoneyPerQuantity(2.0),
                per_unit_active: true,
            },
            travaux_amount: Money(1000.0),
            travaux_option: TravauxOption::Client,
            additional_costs: vec![AdditionalCost {
                label: "Benne".into(),
                amount_ht: Money(500.0),
                taxes: Some(Money(100.0)),
                ..AdditionalCost::default()
            }],
            subcontractor: Some(Subcontractor {
                rate: MoneyPerQuantity(50.0),
                base_units: Some(Quantity(100.0)),
                payment_confirmed: true,
            }),
            ..RentabilityInput::default()
        }
    }

    #[rstest]
    fn test_calculate_rentability(example_input: RentabilityInput) {
        let result = calculate_rentability(&example_input, 1e-6);

        assert_approx_eq!(Money, result.ca, Money(13000.0));
        assert_approx_eq!(Money, result.costs.labor, Money(1000.0));
        assert_approx_eq!(Money, result.costs.material, Money(500.0));
        assert_approx_eq!(Money, result.costs.additional, Money(600.0));
        assert_approx_eq!(Money, result.costs.commission, Money(500.0));
        assert_approx_eq!(Money, result.costs.subcontractor, Money(5000.0));
        assert_approx_eq!(Money, result.total_costs, Money(7600.0));
        assert_approx_eq!(Money, result.margin_total, Money(5400.0));
        assert_approx_eq!(
            MoneyPerQuantity,
            result.margin_per_unit,
            MoneyPerQuantity(54.0)
        );
        assert_approx_eq!(
            Dimensionless,
            result.margin_rate,
            Dimensionless(5400.0 / 13000.0)
        );
        assert_approx_eq!(Quantity, result.units_used, Quantity(100.0));
        assert_eq!(result.unit_label, "m²");
        assert_eq!(
            result.snapshot,
            SnapshotTotals {
                revenue_ttc: Money(13000.0),
                cost_ttc: Money(7600.0),
                margin_ttc: Money(5400.0),
            }
        );
    }

    #[rstest]
    fn test_unconfirmed_subcontractor_is_an_estimate(mut example_input: RentabilityInput) {
        example_input.subcontractor = Some(Subcontractor {
            payment_confirmed: false,
            base_units: None,
            ..example_input.subcontractor.unwrap()
        });
        let result = calculate_rentability(&example_input, 1e-6);

        assert!(!result.subcontractor_included);
        assert_approx_eq!(Money, result.subcontractor_estimate, Money(5000.0));
        assert_approx_eq!(Money, result.costs.subcontractor, Money(0.0));
        assert_approx_eq!(Money, result.total_costs, Money(2600.0));
    }

    #[rstest]
    #[case(TravauxOption::Na, 0.0, 0.0)]
    #[case(TravauxOption::Client, 1000.0, 0.0)]
    #[case(TravauxOption::Marge, 0.0, 1000.0)]
    #[case(TravauxOption::Partage, 500.0, 500.0)]
    fn test_travaux_split(
        mut example_input: RentabilityInput,
        #[case] option: TravauxOption,
        #[case] revenue: f64,
        #[case] cost: f64,
    ) {
        example_input.travaux_option = option;
        let result = calculate_rentability(&example_input, 1e-6);

        assert_approx_eq!(Money, result.travaux_revenue, Money(revenue));
        assert_approx_eq!(Money, result.travaux_cost, Money(cost));
        assert_approx_eq!(Money, result.ca, Money(12000.0 + revenue));
        assert_approx_eq!(Money, result.total_costs, Money(7600.0 + cost));
    }

    #[rstest]
    #[case(733.33)]
    #[case(1000.0)]
    #[case(0.01)]
    fn test_partage_shares_sum_to_amount(#[case] amount: f64) {
        let (revenue, cost) = TravauxOption::Partage.split(Money(amount));
        assert_approx_eq!(Money, revenue + cost, Money(amount));
        assert_approx_eq!(Money, revenue, Money(amount / 2.0));
        assert_approx_eq!(Money, cost, Money(amount / 2.0));
    }

    #[rstest]
    #[case(TravauxOption::Client)]
    #[case(TravauxOption::Partage)]
    fn test_travaux_zero_amount(#[case] option: TravauxOption) {
        assert_eq!(option.split(Money(0.0)), (Money(0.0), Money(0.0)));
    }

    #[rstest]
    #[case("PARTAGE", TravauxOption::Partage)]
    #[case("partage", TravauxOption::Partage)]
    #[case("Moitié", TravauxOption::Partage)]
    #[case("50/50", TravauxOption::Partage)]
    #[case("client payé", TravauxOption::Client)]
    #[case("CLIENT", TravauxOption::Client)]
    #[case("marge", TravauxOption::Marge)]
    #[case("NA", TravauxOption::Na)]
    #[case("", TravauxOption::Na)]
    #[case("something else", TravauxOption::Na)]
    fn test_travaux_option_parse(#[case] name: &str, #[case] expected: TravauxOption) {
        assert_eq!(TravauxOption::parse(name), expected);
    }

    #[test]
    fn test_travaux_option_display() {
        assert_eq!(TravauxOption::Partage.to_string(), "PARTAGE");
        assert_eq!(TravauxOption::Na.to_string(), "NA");
    }

    #[rstest]
    #[case(UnitStrategy::ExecutedFirst, Some(100.0), Some(120.0), 100.0)]
    #[case(UnitStrategy::BilledFirst, Some(100.0), Some(120.0), 120.0)]
    #[case(UnitStrategy::ExecutedFirst, None, Some(120.0), 120.0)]
    #[case(UnitStrategy::BilledFirst, Some(100.0), None, 100.0)]
    #[case(UnitStrategy::ExecutedFirst, Some(0.0), Some(80.0), 80.0)]
    #[case(UnitStrategy::BilledFirst, Some(80.0), Some(0.0), 80.0)]
    #[case(UnitStrategy::ExecutedFirst, Some(f64::NAN), Some(-5.0), 0.0)]
    #[case(UnitStrategy::BilledFirst, None, None, 0.0)]
    fn test_effective_units(
        #[case] strategy: UnitStrategy,
        #[case] executed: Option<f64>,
        #[case] billed: Option<f64>,
        #[case] expected: f64,
    ) {
        assert_approx_eq!(
            Quantity,
            strategy.effective_units(executed.map(Quantity), billed.map(Quantity)),
            Quantity(expected)
        );
    }

    #[rstest]
    #[case(ProductCategory::Lighting, MeasurementMode::Surface, UnitStrategy::BilledFirst)]
    #[case(ProductCategory::Isolation, MeasurementMode::Fixture, UnitStrategy::BilledFirst)]
    #[case(ProductCategory::Isolation, MeasurementMode::Surface, UnitStrategy::ExecutedFirst)]
    #[case(ProductCategory::Other, MeasurementMode::Surface, UnitStrategy::ExecutedFirst)]
    fn test_unit_strategy_select(
        #[case] category: ProductCategory,
        #[case] mode: MeasurementMode,
        #[case] expected: UnitStrategy,
    ) {
        assert_eq!(UnitStrategy::select(category, mode), expected);
    }

    #[rstest]
    fn test_lighting_uses_billed_units(mut example_input: RentabilityInput) {
        example_input.category = ProductCategory::Lighting;
        example_input.measurement_mode = MeasurementMode::Fixture;
        example_input.billed_units = Some(Quantity(50.0));
        let result = calculate_rentability(&example_input, 1e-6);

        assert_approx_eq!(Quantity, result.units_used, Quantity(50.0));
        assert_approx_eq!(Money, result.costs.labor, Money(500.0));
        assert_eq!(result.unit_label, "luminaire");
    }

    #[test]
    fn test_commission_per_unit_inactive() {
        let commission = Commission {
            fixed: Money(300.0),
            per_unit: MoneyPerQuantity(2.0),
            per_unit_active: false,
        };
        assert_approx_eq!(Money, commission.total(Quantity(100.0)), Money(300.0));
    }

    #[test]
    fn test_empty_input_gives_zeros() {
        let result = calculate_rentability(&RentabilityInput::default(), 1e-6);

        assert_eq!(result.ca, Money(0.0));
        assert_eq!(result.total_costs, Money(0.0));
        assert_eq!(result.margin_total, Money(0.0));
        assert_eq!(result.margin_rate, Dimensionless(0.0));
        assert_eq!(result.margin_per_unit, MoneyPerQuantity(0.0));
        assert_eq!(result.snapshot, SnapshotTotals::default());
    }

    #[test]
    fn test_near_zero_results_snap_to_zero() {
        let input = RentabilityInput {
            revenue: Money(0.1 + 0.2),
            additional_costs: vec![AdditionalCost {
                amount_ht: Money(0.3),
                ..AdditionalCost::default()
            }],
            ..RentabilityInput::default()
        };
        let result = calculate_rentability(&input, 1e-6);

        assert_eq!(result.margin_total, Money(0.0));
        assert_eq!(result.margin_rate, Dimensionless(0.0));
    }

    #[test]
    fn test_ratios_use_snapped_ca_and_units() {
        let input = RentabilityInput {
            revenue: Money(1e-7),
            additional_costs: vec![AdditionalCost {
                amount_ht: Money(100.0),
                ..AdditionalCost::default()
            }],
            ..RentabilityInput::default()
        };
        let result = calculate_rentability(&input, 1e-6);
        assert_eq!(result.ca, Money(0.0));
        assert_eq!(result.margin_total, Money(-100.0));
        assert_eq!(result.margin_rate, Dimensionless(0.0));

        let input = RentabilityInput {
            revenue: Money(100.0),
            executed_units: Some(Quantity(1e-7)),
            ..RentabilityInput::default()
        };
        let result = calculate_rentability(&input, 1e-6);
        assert_eq!(result.units_used, Quantity(0.0));
        assert_eq!(result.margin_per_unit, MoneyPerQuantity(0.0));
        assert_approx_eq!(Dimensionless, result.margin_rate, Dimensionless(1.0));
    }
}
