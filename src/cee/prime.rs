//! Aggregation of per-product valorisations into project totals.
use crate::cee::formula::{ProductCeeConfig, normalize_formula, normalize_product_cee_config};
use crate::cee::kwh::select_kwh_base;
use crate::cee::multiplier::resolve_multiplier;
use crate::cee::valorisation::{
    ValorisationInput, ValorisationResult, ValorisationStrategy, calculate_valorisation,
};
use crate::parameters::CeeParameters;
use crate::product::{
    BuildingTypeID, Delegate, ProductCatalog, ProductCatalogEntry, ProductCategory, ProductID,
    ProjectProductLink,
};
use crate::units::{Dimensionless, Money, MoneyPerMwh, Mwh, Quantity, round2};
use crate::value::deserialise_lenient_number;
use log::debug;
use serde::{Deserialize, Serialize};
use strum::Display;

/// The CEE-related fields of a project
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProjectCee {
    /// Building type, used to pick the kWh cumac values
    #[serde(alias = "buildingType")]
    pub building_type: BuildingTypeID,
    /// Surface of the building (m²)
    #[serde(
        default,
        alias = "surfaceM2",
        alias = "surface",
        deserialize_with = "deserialise_lenient_number"
    )]
    pub surface_m2: Option<f64>,
    /// Project-wide bonification, applied to products without their own
    #[serde(default, deserialize_with = "deserialise_lenient_number")]
    pub bonification: Option<f64>,
    /// Buyer of the certificates
    #[serde(default)]
    pub delegate: Option<Delegate>,
    /// Products configured on the project
    #[serde(default)]
    pub products: Vec<ProjectProductLink>,
}

/// Why a project product was left out of the totals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
pub enum SkipReason {
    /// The link refers to no product in the catalogue
    #[strum(serialize = "unknown product")]
    UnknownProduct,
    /// The product is not eligible for CEE
    #[strum(serialize = "not CEE-eligible")]
    Excluded,
    /// The product has no kWh cumac value for the building type
    #[strum(serialize = "missing kWh cumac")]
    MissingKwhCumac,
}

/// A project product which was left out of the totals
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedProduct {
    /// ID of the project product link
    pub link_id: Option<String>,
    /// Catalogue product the link refers to, if any
    pub product_id: Option<ProductID>,
    /// Why the product was skipped
    pub reason: SkipReason,
}

/// The valorisation of one project product
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductValorisation {
    /// ID of the project product link
    pub link_id: Option<String>,
    /// Catalogue product ID
    pub product_id: ProductID,
    /// Catalogue product name
    pub product_name: String,
    /// Regulatory operation code
    pub product_code: String,
    /// Product family
    pub category: ProductCategory,
    /// The valorisation itself
    pub result: ValorisationResult,
}

/// Project-level CEE totals
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ProjectCeeTotals {
    /// Sum of the products' primes
    pub total_prime: Money,
    /// Sum of the products' valorisations (€)
    pub total_valorisation_eur: Money,
    /// Sum of the products' valorisations (MWh cumac)
    pub total_valorisation_mwh: Mwh,
}

/// The result of valuing every product of a project
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ProjectCeeSummary {
    /// Project totals, rounded to cents
    pub totals: ProjectCeeTotals,
    /// Included products, in project order
    pub products: Vec<ProductValorisation>,
    /// Products left out, in project order
    pub skipped: Vec<SkippedProduct>,
    /// At least one eligible product has no kWh cumac value for the building type
    pub has_missing_kwh_cumac: bool,
}

impl ProjectCeeSummary {
    /// Products which are included but have no multiplier, so are valued at zero
    pub fn unresolved_multipliers(&self) -> impl Iterator<Item = &ProductValorisation> {
        self.products
            .iter()
            .filter(|product| !product.result.multiplier_resolved)
    }

    /// Products whose custom expression could not be evaluated
    pub fn failed_expressions(&self) -> impl Iterator<Item = &ProductValorisation> {
        self.products
            .iter()
            .filter(|product| product.result.expression_failed)
    }
}

/// Resolve the bonification for a product: its own, then the project's, then the default
fn resolve_bonification(
    config: &ProductCeeConfig,
    project_bonification: Option<f64>,
    parameters: &CeeParameters,
) -> Dimensionless {
    config
        .bonification
        .or(project_bonification.filter(|b| b.is_finite() && *b > 0.0))
        .map_or(parameters.default_bonification, Dimensionless)
}

/// Value a single project product, or say why it must be skipped
pub fn valorise_product(
    entry: &ProductCatalogEntry,
    link: &ProjectProductLink,
    project: &ProjectCee,
    parameters: &CeeParameters,
) -> Result<ValorisationResult, SkipReason> {
    if entry.has_excluded_prefix(&parameters.excluded_prefixes) {
        return Err(SkipReason::Excluded);
    }

    let base_kwh = select_kwh_base(
        &entry.kwh_cumac_values,
        &project.building_type.0,
        project.surface_m2,
        parameters.surface_threshold_m2,
    )
    .ok_or(SkipReason::MissingKwhCumac)?;

    let config = normalize_product_cee_config(&ProductCeeConfig::from_entry(entry));
    let formula_coefficient =
        normalize_formula(config.formula.as_ref()).and_then(|formula| formula.coefficient);
    let multiplier = resolve_multiplier(entry, link);

    let input = ValorisationInput {
        base_kwh,
        bonification: Some(resolve_bonification(&config, project.bonification, parameters)),
        coefficient: config
            .coefficient
            .or(formula_coefficient)
            .map(Dimensionless),
        multiplier: multiplier.as_ref().map_or(Quantity(0.0), |m| m.value),
        multiplier_label: multiplier.map(|m| m.label),
        delegate_price: project
            .delegate
            .as_ref()
            .map_or(MoneyPerMwh(0.0), |delegate| delegate.price_eur_per_mwh),
        expression: config.expression().map(ToString::to_string),
        ..ValorisationInput::default()
    }
    .with_strategy(
        ValorisationStrategy::for_category(entry.category()),
        &link.dynamic_params,
    );

    Ok(calculate_valorisation(&input, parameters))
}

/// Value every product of a project and sum the results.
///
/// Products are skipped, without error, when they are not in the catalogue, are not eligible for
/// CEE or have no kWh cumac value for the building type (which also sets
/// [`ProjectCeeSummary::has_missing_kwh_cumac`]). Totals are the sum of the included products'
/// rounded figures.
pub fn calculate_project_cee(
    project: &ProjectCee,
    catalog: &ProductCatalog,
    parameters: &CeeParameters,
) -> ProjectCeeSummary {
    let mut summary = ProjectCeeSummary::default();
    let mut totals = ProjectCeeTotals::default();

    for link in &project.products {
        let Some(entry) = link
            .product_id
            .as_ref()
            .and_then(|product_id| catalog.get(product_id))
        else {
            skip_product(&mut summary, link, SkipReason::UnknownProduct);
            continue;
        };

        match valorise_product(entry, link, project, parameters) {
            Ok(result) => {
                totals.total_prime += result.total_prime;
                totals.total_valorisation_eur += result.valorisation_total_eur;
                totals.total_valorisation_mwh += result.valorisation_total_mwh;
                summary.products.push(ProductValorisation {
                    link_id: link.id.clone(),
                    product_id: entry.id.clone(),
                    product_name: entry.name.clone(),
                    product_code: entry.code.clone(),
                    category: entry.category(),
                    result,
                });
            }
            Err(reason) => skip_product(&mut summary, link, reason),
        }
    }

    summary.totals = ProjectCeeTotals {
        total_prime: Money(round2(totals.total_prime.0)),
        total_valorisation_eur: Money(round2(totals.total_valorisation_eur.0)),
        total_valorisation_mwh: Mwh(round2(totals.total_valorisation_mwh.0)),
    };

    summary
}

fn skip_product(summary: &mut ProjectCeeSummary, link: &ProjectProductLink, reason: SkipReason) {
    debug!(
        "Skipping product {} for CEE valorisation: {reason}",
        link.product_id
            .as_ref()
            .map_or("(none)", |product_id| &*product_id.0)
    );

    if reason == SkipReason::MissingKwhCumac {
        summary.has_missing_kwh_cumac = true;
    }
    summary.skipped.push(SkippedProduct {
        link_id: link.id.clone(),
        product_id: link.product_id.clone(),
        reason,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{catalog, field, link_with_params, parameters};
    use crate::product::KwhCumacValue;
    use crate::units::Kwh;
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    fn project(building_type: &str, surface_m2: Option<f64>, price: f64) -> ProjectCee {
        ProjectCee {
            building_type: building_type.into(),
            surface_m2,
            bonification: None,
            delegate: Some(Delegate {
                name: "Délégataire".into(),
                price_eur_per_mwh: MoneyPerMwh(price),
            }),
            products: Vec::new(),
        }
    }

    fn link(product_id: &str, params: &[(&str, f64)]) -> ProjectProductLink {
        ProjectProductLink {
            id: Some(format!("link-{product_id}")),
            product_id: Some(product_id.into()),
            ..link_with_params(params)
        }
    }

    /// Check that the totals are the sum of the included products
    fn assert_totals_consistent(summary: &ProjectCeeSummary) {
        let prime: Money = summary.products.iter().map(|p| p.result.total_prime).sum();
        let eur: Money = summary
            .products
            .iter()
            .map(|p| p.result.valorisation_total_eur)
            .sum();
        let mwh: Mwh = summary
            .products
            .iter()
            .map(|p| p.result.valorisation_total_mwh)
            .sum();
        let totals = &summary.totals;
        assert_approx_eq!(Money, totals.total_prime, prime, epsilon = 0.005);
        assert_approx_eq!(Money, totals.total_valorisation_eur, eur, epsilon = 0.005);
        assert_approx_eq!(Mwh, totals.total_valorisation_mwh, mwh, epsilon = 0.005);
    }

    #[rstest]
    fn test_isolation_project(catalog: ProductCatalog, parameters: CeeParameters) {
        let mut project = project("Résidentiel", None, 8.0);
        project.products = vec![link("iso-1", &[("surface_isolee", 120.0)])];

        let summary = calculate_project_cee(&project, &catalog, &parameters);
        assert_eq!(summary.products.len(), 1);
        let result = &summary.products[0].result;
        assert_approx_eq!(Mwh, result.valorisation_per_unit_mwh, Mwh(10.8));
        assert_approx_eq!(Mwh, result.valorisation_total_mwh, Mwh(1296.0));
        assert_eq!(
            result.multiplier_label.as_deref(),
            Some("Surface isolée (m²)")
        );
        assert_approx_eq!(Money, summary.totals.total_prime, Money(10368.0));
        assert!(!summary.has_missing_kwh_cumac);
        assert_totals_consistent(&summary);
    }

    #[rstest]
    fn test_lighting_project(catalog: ProductCatalog, parameters: CeeParameters) {
        let mut project = project("Tertiaire", Some(450.0), 55.0);
        project.products = vec![link(
            "led-1",
            &[("Nombre de LED", 40.0), ("led_watt", 200.0), ("bonus_dom", 1.2)],
        )];

        let summary = calculate_project_cee(&project, &catalog, &parameters);
        let result = &summary.products[0].result;
        assert_approx_eq!(Kwh, result.base_kwh, Kwh(480.0));
        assert_approx_eq!(Mwh, result.valorisation_per_unit_mwh, Mwh(0.96));
        assert_approx_eq!(Mwh, result.valorisation_total_mwh, Mwh(38.4));
        assert_approx_eq!(Money, result.total_prime, Money(2112.0));
        assert_approx_eq!(Money, summary.totals.total_prime, Money(2112.0));
    }

    #[rstest]
    fn test_mixed_project_skips(mut catalog: ProductCatalog, parameters: CeeParameters) {
        let mut eco = catalog["iso-1"].clone();
        eco.id = "eco-1".into();
        eco.code = "ECO-PAC-01".into();
        catalog.insert(eco.id.clone(), eco);

        let mut other_building = catalog["iso-1"].clone();
        other_building.id = "iso-2".into();
        other_building.kwh_cumac_values = vec![KwhCumacValue {
            building_type: "Résidentiel".into(),
            kwh_cumac_lt_400: Some(Kwh(5400.0)),
            kwh_cumac_gte_400: None,
        }];
        catalog.insert(other_building.id.clone(), other_building);

        let mut project = project("Tertiaire", Some(450.0), 55.0);
        project.products = vec![
            link("iso-1", &[("surface_isolee", 100.0)]),
            link(
                "led-1",
                &[("nombre_led", 40.0), ("led_watt", 200.0), ("bonus_dom", 1.2)],
            ),
            link("missing", &[("surface_isolee", 100.0)]),
            link("eco-1", &[("surface_isolee", 100.0)]),
            link("iso-2", &[("surface_isolee", 100.0)]),
            ProjectProductLink::default(),
        ];

        let summary = calculate_project_cee(&project, &catalog, &parameters);
        assert_eq!(summary.products.len(), 2);
        let reasons: Vec<_> = summary.skipped.iter().map(|s| s.reason).collect();
        assert_eq!(
            reasons,
            [
                SkipReason::UnknownProduct,
                SkipReason::Excluded,
                SkipReason::MissingKwhCumac,
                SkipReason::UnknownProduct
            ]
        );
        assert!(summary.has_missing_kwh_cumac);

        // 5100 kWh × 2 / 1000 × 100 m² = 1020 MWh, plus 38.4 MWh of lighting
        assert_approx_eq!(Mwh, summary.totals.total_valorisation_mwh, Mwh(1058.4));
        assert_approx_eq!(Money, summary.totals.total_prime, Money(58212.0));
        assert_totals_consistent(&summary);
    }

    #[rstest]
    fn test_excluded_category_skipped(mut catalog: ProductCatalog, parameters: CeeParameters) {
        let mut service = catalog["iso-1"].clone();
        service.id = "serv-1".into();
        service.code = "SERV-01".into();
        service.category_name = "HORS_CEE".into();
        catalog.insert(service.id.clone(), service);

        let mut project = project("Résidentiel", None, 20.0);
        project.products = vec![link("serv-1", &[("surface_isolee", 10.0)])];

        let summary = calculate_project_cee(&project, &catalog, &parameters);
        assert!(summary.products.is_empty());
        assert_eq!(summary.skipped.len(), 1);
        assert_eq!(summary.skipped[0].reason, SkipReason::Excluded);
        assert_eq!(summary.totals.total_prime, Money(0.0));
    }

    #[rstest]
    fn test_bonification_priority(mut catalog: ProductCatalog, parameters: CeeParameters) {
        let mut project = project("Résidentiel", None, 10.0);
        project.bonification = Some(3.0);
        project.products = vec![link("iso-1", &[("surface_isolee", 10.0)])];

        // Project-level bonification applies when the product has none
        let summary = calculate_project_cee(&project, &catalog, &parameters);
        assert_eq!(summary.products[0].result.bonification, Dimensionless(3.0));

        // The product's own bonification wins
        catalog.get_mut("iso-1").unwrap().bonification = Some(1.5);
        let summary = calculate_project_cee(&project, &catalog, &parameters);
        assert_eq!(summary.products[0].result.bonification, Dimensionless(1.5));

        // An invalid project value falls back on the default
        catalog.get_mut("iso-1").unwrap().bonification = None;
        project.bonification = Some(-1.0);
        let summary = calculate_project_cee(&project, &catalog, &parameters);
        assert_eq!(summary.products[0].result.bonification, Dimensionless(2.0));
    }

    #[rstest]
    fn test_coefficient_from_formula(mut catalog: ProductCatalog, parameters: CeeParameters) {
        let entry = catalog.get_mut("iso-1").unwrap();
        entry.formula = Some(crate::cee::formula::FormulaDescriptor {
            variable_key: Some("surface_isolee".into()),
            coefficient: Some(0.5),
            ..Default::default()
        });
        let mut project = project("Résidentiel", None, 8.0);
        project.products = vec![link("iso-1", &[("surface_isolee", 120.0)])];

        let summary = calculate_project_cee(&project, &catalog, &parameters);
        assert_eq!(summary.products[0].result.coefficient, Dimensionless(0.5));
        assert_approx_eq!(Mwh, summary.totals.total_valorisation_mwh, Mwh(648.0));
    }

    #[rstest]
    fn test_unresolved_multiplier_included_at_zero(
        mut catalog: ProductCatalog,
        parameters: CeeParameters,
    ) {
        catalog
            .get_mut("iso-1")
            .unwrap()
            .schema
            .push(field("epaisseur", Some("Épaisseur (mm)")));
        let mut project = project("Résidentiel", None, 8.0);
        project.products = vec![link("iso-1", &[("epaisseur", 300.0)])];

        let summary = calculate_project_cee(&project, &catalog, &parameters);
        assert_eq!(summary.products.len(), 1);
        assert_eq!(summary.unresolved_multipliers().count(), 1);
        assert_eq!(summary.totals.total_prime, Money(0.0));
    }

    #[rstest]
    fn test_no_delegate(catalog: ProductCatalog, parameters: CeeParameters) {
        let mut project = project("Résidentiel", None, 8.0);
        project.delegate = None;
        project.products = vec![link("iso-1", &[("surface_isolee", 120.0)])];

        let summary = calculate_project_cee(&project, &catalog, &parameters);
        assert_approx_eq!(Mwh, summary.totals.total_valorisation_mwh, Mwh(1296.0));
        assert_eq!(summary.totals.total_prime, Money(0.0));
    }
}
