#![allow(missing_docs)]

//! Maps site records onto [`RentabilityInput`].
//!
//! Site records have accumulated several names for the same figure over time. In particular the
//! subsidy and the subcontractor rate can each come from several fields, which are tried in a
//! fixed order.
use super::additional_cost::AdditionalCost;
use super::{
    Commission, MeasurementMode, RentabilityInput, Subcontractor, TravauxOption, UnitStrategy,
};
use crate::parameters::CeeParameters;
use crate::product::ProductCategory;
use crate::units::{Money, MoneyPerQuantity, Quantity};
use crate::value::{
    deserialise_lenient_bool, deserialise_lenient_number, first_positive, first_positive_of,
};
use log::debug;
use serde::Deserialize;

/// The financial fields of a site, as stored
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct SiteRecord {
    #[serde(alias = "productCategory", alias = "categorie")]
    pub category: ProductCategory,
    #[serde(alias = "measurementMode", alias = "mode_mesure")]
    pub measurement_mode: Option<MeasurementMode>,
    #[serde(alias = "unitLabel", alias = "unite")]
    pub unit_label: Option<String>,

    #[serde(
        alias = "revenue_ht",
        alias = "chiffre_affaires",
        alias = "ca_initial",
        deserialize_with = "deserialise_lenient_number"
    )]
    pub revenue: Option<f64>,

    #[serde(alias = "primeCee", deserialize_with = "deserialise_lenient_number")]
    pub prime_cee: Option<f64>,
    #[serde(
        alias = "montantPrimeCee",
        deserialize_with = "deserialise_lenient_number"
    )]
    pub montant_prime_cee: Option<f64>,
    #[serde(
        alias = "valorisationCee",
        deserialize_with = "deserialise_lenient_number"
    )]
    pub valorisation_cee: Option<f64>,
    #[serde(
        alias = "ceeTotalPrime",
        deserialize_with = "deserialise_lenient_number"
    )]
    pub cee_total_prime: Option<f64>,

    #[serde(
        alias = "laborRate",
        alias = "cout_main_oeuvre",
        alias = "cout_main_oeuvre_m2",
        deserialize_with = "deserialise_lenient_number"
    )]
    pub labor_rate: Option<f64>,
    #[serde(
        alias = "materialRate",
        alias = "cout_materiaux",
        alias = "cout_materiaux_m2",
        deserialize_with = "deserialise_lenient_number"
    )]
    pub material_rate: Option<f64>,
    #[serde(
        alias = "executedUnits",
        alias = "surface_posee",
        alias = "surfacePosee",
        alias = "nb_luminaires_poses",
        deserialize_with = "deserialise_lenient_number"
    )]
    pub executed_units: Option<f64>,
    #[serde(
        alias = "billedUnits",
        alias = "surface_facturee",
        alias = "surfaceFacturee",
        alias = "nb_luminaires_factures",
        deserialize_with = "deserialise_lenient_number"
    )]
    pub billed_units: Option<f64>,

    #[serde(
        alias = "commissionFixe",
        alias = "commission_commerciale",
        deserialize_with = "deserialise_lenient_number"
    )]
    pub commission_fixed: Option<f64>,
    #[serde(
        alias = "commissionParUnite",
        alias = "commission_eur_m2",
        deserialize_with = "deserialise_lenient_number"
    )]
    pub commission_per_unit: Option<f64>,
    #[serde(
        alias = "commissionParUniteActive",
        alias = "commission_eur_m2_active",
        deserialize_with = "deserialise_lenient_bool"
    )]
    pub commission_per_unit_active: bool,

    #[serde(
        alias = "travauxNonSubventionnes",
        alias = "travaux_non_subventionnes",
        deserialize_with = "deserialise_lenient_number"
    )]
    pub travaux_amount: Option<f64>,
    #[serde(alias = "travauxOption")]
    pub travaux_option: TravauxOption,

    #[serde(alias = "additionalCosts", alias = "frais_additionnels")]
    pub additional_costs: Vec<AdditionalCost>,
    #[serde(
        alias = "vatRate",
        alias = "tva",
        alias = "taux_tva",
        deserialize_with = "deserialise_lenient_number"
    )]
    pub vat_rate: Option<f64>,

    #[serde(
        alias = "subcontractorRate",
        deserialize_with = "deserialise_lenient_number"
    )]
    pub subcontractor_rate: Option<f64>,
    #[serde(
        alias = "tarif_sous_traitant",
        deserialize_with = "deserialise_lenient_number"
    )]
    pub subcontractor_price_per_unit: Option<f64>,
    #[serde(
        alias = "cout_sous_traitant_m2",
        deserialize_with = "deserialise_lenient_number"
    )]
    pub subcontractor_cost_per_unit: Option<f64>,
    #[serde(
        alias = "subcontractorAmount",
        alias = "montant_sous_traitant",
        deserialize_with = "deserialise_lenient_number"
    )]
    pub subcontractor_amount: Option<f64>,
    #[serde(
        alias = "subcontractorBaseUnits",
        alias = "surface_sous_traitant",
        deserialize_with = "deserialise_lenient_number"
    )]
    pub subcontractor_base_units: Option<f64>,
    #[serde(
        alias = "subcontractorPaymentConfirmed",
        alias = "paiement_sous_traitant_confirme",
        deserialize_with = "deserialise_lenient_bool"
    )]
    pub subcontractor_payment_confirmed: bool,
}

/// Fields the subsidy may be stored in, in order of preference
const SUBSIDY_SOURCES: [fn(&SiteRecord) -> Option<f64>; 4] = [
    |site| site.prime_cee,
    |site| site.montant_prime_cee,
    |site| site.valorisation_cee,
    |site| site.cee_total_prime,
];

/// Fields the subcontractor's per-unit rate may be stored in, in order of preference
const SUBCONTRACTOR_RATE_SOURCES: [fn(&SiteRecord) -> Option<f64>; 3] = [
    |site| site.subcontractor_rate,
    |site| site.subcontractor_price_per_unit,
    |site| site.subcontractor_cost_per_unit,
];

fn money(value: Option<f64>) -> Money {
    Money(value.filter(|v| v.is_finite()).unwrap_or(0.0))
}

fn rate(value: Option<f64>) -> MoneyPerQuantity {
    MoneyPerQuantity(value.filter(|v| v.is_finite()).unwrap_or(0.0))
}

impl SiteRecord {
    fn measurement_mode(&self) -> MeasurementMode {
        self.measurement_mode.unwrap_or(match self.category {
            ProductCategory::Lighting => MeasurementMode::Fixture,
            _ => MeasurementMode::Surface,
        })
    }

    /// The subsidy from the site's own fields, if any is positive
    pub fn subsidy(&self) -> Option<Money> {
        first_positive_of(self, &SUBSIDY_SOURCES).map(Money)
    }

    /// The subcontractor's per-unit rate.
    ///
    /// If no rate field is set, the rate is derived from the subcontractor's total amount divided
    /// by their base units (or the site's effective units).
    pub fn subcontractor_rate(&self, effective_units: Quantity) -> Option<MoneyPerQuantity> {
        if let Some(rate) = first_positive_of(self, &SUBCONTRACTOR_RATE_SOURCES) {
            return Some(MoneyPerQuantity(rate));
        }

        let amount = first_positive([self.subcontractor_amount])?;
        let units = first_positive([self.subcontractor_base_units, Some(effective_units.0)])?;
        debug!("Deriving subcontractor rate from amount {amount} over {units} units");
        Some(MoneyPerQuantity(amount / units))
    }

    /// Build the canonical rentability input.
    ///
    /// # Arguments
    ///
    /// * `fallback_subsidy` - Used when none of the site's subsidy fields is set, e.g. the
    ///   project's CEE total
    /// * `parameters` - Supplies the VAT rate when the site has none, if `cee.toml` sets one
    pub fn to_rentability_input(
        &self,
        fallback_subsidy: Option<Money>,
        parameters: &CeeParameters,
    ) -> RentabilityInput {
        let measurement_mode = self.measurement_mode();
        let executed_units = self.executed_units.map(Quantity);
        let billed_units = self.billed_units.map(Quantity);
        let effective_units = UnitStrategy::select(self.category, measurement_mode)
            .effective_units(executed_units, billed_units);

        let subcontractor = self
            .subcontractor_rate(effective_units)
            .map(|rate| Subcontractor {
                rate,
                base_units: first_positive([self.subcontractor_base_units]).map(Quantity),
                payment_confirmed: self.subcontractor_payment_confirmed,
            });

        let project_vat_rate = self
            .vat_rate
            .filter(|rate| rate.is_finite() && *rate >= 0.0)
            .or(parameters.default_vat_rate);

        RentabilityInput {
            category: self.category,
            measurement_mode,
            unit_label: self.unit_label.clone(),
            revenue: money(self.revenue),
            subsidy: self
                .subsidy()
                .or(fallback_subsidy.filter(|subsidy| subsidy.is_positive()))
                .unwrap_or_default(),
            labor_rate: rate(self.labor_rate),
            material_rate: rate(self.material_rate),
            executed_units,
            billed_units,
            commission: Commission {
                fixed: money(self.commission_fixed),
                per_unit: rate(self.commission_per_unit),
                per_unit_active: self.commission_per_unit_active,
            },
            travaux_amount: money(self.travaux_amount),
            travaux_option: self.travaux_option,
            additional_costs: self.additional_costs.clone(),
            project_vat_rate,
            subcontractor,
        }
    }
}
