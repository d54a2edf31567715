//! The module responsible for writing results to disk.
use crate::cee::prime::{ProductValorisation, ProjectCeeSummary};
use crate::product::{ProductCategory, ProductID};
use crate::rentability::{RentabilityResult, TravauxOption};
use anyhow::{Context, Result, ensure};
use serde::Serialize;
use std::fs;
use std::path::Path;

/// The output file name for per-product valorisations
const PRODUCT_VALORISATIONS_FILE_NAME: &str = "product_valorisations.csv";

/// The output file name for project totals
const PROJECT_TOTALS_FILE_NAME: &str = "project_totals.csv";

/// The output file name for the rentability breakdown
const RENTABILITY_FILE_NAME: &str = "rentability.csv";

/// Create a new output directory.
///
/// If the directory already exists and is not empty, it is only replaced if `allow_overwrite` is
/// true.
///
/// # Returns
///
/// Whether an existing folder is being overwritten
pub fn create_output_directory(output_dir: &Path, allow_overwrite: bool) -> Result<bool> {
    let overwrite = if let Ok(mut it) = fs::read_dir(output_dir) {
        if it.next().is_none() {
            // Folder exists and is empty: nothing to do
            return Ok(false);
        }

        ensure!(
            allow_overwrite,
            "Output folder already exists and is not empty. \
            Please delete the folder or pass the --overwrite command-line option."
        );

        fs::remove_dir_all(output_dir)?;
        true
    } else {
        false
    };

    fs::create_dir_all(output_dir)?;

    Ok(overwrite)
}

/// A row of the product valorisations file
#[derive(Debug, Serialize, PartialEq)]
struct ProductValorisationRow<'a> {
    link_id: Option<&'a str>,
    product_id: &'a ProductID,
    product_name: &'a str,
    product_code: &'a str,
    category: ProductCategory,
    base_kwh: f64,
    bonification: f64,
    coefficient: f64,
    multiplier: f64,
    multiplier_label: Option<&'a str>,
    valorisation_per_unit_mwh: f64,
    valorisation_per_unit_eur: f64,
    valorisation_total_mwh: f64,
    valorisation_total_eur: f64,
    delegate_price: f64,
    total_prime: f64,
    expression_failed: bool,
    multiplier_resolved: bool,
}

impl<'a> From<&'a ProductValorisation> for ProductValorisationRow<'a> {
    fn from(product: &'a ProductValorisation) -> Self {
        let result = &product.result;
        Self {
            link_id: product.link_id.as_deref(),
            product_id: &product.product_id,
            product_name: &product.product_name,
            product_code: &product.product_code,
            category: product.category,
            base_kwh: result.base_kwh.0,
            bonification: result.bonification.0,
            coefficient: result.coefficient.0,
            multiplier: result.multiplier_value.0,
            multiplier_label: result.multiplier_label.as_deref(),
            valorisation_per_unit_mwh: result.valorisation_per_unit_mwh.0,
            valorisation_per_unit_eur: result.valorisation_per_unit_eur.0,
            valorisation_total_mwh: result.valorisation_total_mwh.0,
            valorisation_total_eur: result.valorisation_total_eur.0,
            delegate_price: result.delegate_price.0,
            total_prime: result.total_prime.0,
            expression_failed: result.expression_failed,
            multiplier_resolved: result.multiplier_resolved,
        }
    }
}

/// The single row of the project totals file
#[derive(Debug, Serialize, PartialEq)]
struct ProjectTotalsRow {
    total_prime: f64,
    total_valorisation_eur: f64,
    total_valorisation_mwh: f64,
    products_included: usize,
    products_skipped: usize,
    has_missing_kwh_cumac: bool,
}

/// The single row of the rentability file
#[derive(Debug, Serialize, PartialEq)]
struct RentabilityRow<'a> {
    ca: f64,
    subsidy: f64,
    travaux_option: TravauxOption,
    travaux_revenue: f64,
    travaux_cost: f64,
    labor_cost: f64,
    material_cost: f64,
    additional_costs: f64,
    commission: f64,
    subcontractor_cost: f64,
    subcontractor_estimate: f64,
    total_costs: f64,
    margin_total: f64,
    margin_rate: f64,
    margin_per_unit: f64,
    units_used: f64,
    unit_label: &'a str,
    revenue_ttc: f64,
    cost_ttc: f64,
    margin_ttc: f64,
}

/// Write the results of a CEE valorisation to `output_dir`
pub fn write_project_summary(output_dir: &Path, summary: &ProjectCeeSummary) -> Result<()> {
    let file_path = output_dir.join(PRODUCT_VALORISATIONS_FILE_NAME);
    let mut writer = csv::Writer::from_path(&file_path)
        .with_context(|| format!("Could not create {}", file_path.display()))?;
    for product in &summary.products {
        writer.serialize(ProductValorisationRow::from(product))?;
    }
    writer.flush()?;

    let file_path = output_dir.join(PROJECT_TOTALS_FILE_NAME);
    let mut writer = csv::Writer::from_path(&file_path)
        .with_context(|| format!("Could not create {}", file_path.display()))?;
    writer.serialize(ProjectTotalsRow {
        total_prime: summary.totals.total_prime.0,
        total_valorisation_eur: summary.totals.total_valorisation_eur.0,
        total_valorisation_mwh: summary.totals.total_valorisation_mwh.0,
        products_included: summary.products.len(),
        products_skipped: summary.skipped.len(),
        has_missing_kwh_cumac: summary.has_missing_kwh_cumac,
    })?;
    writer.flush()?;

    Ok(())
}

/// Write a rentability breakdown to `output_dir`
pub fn write_rentability(
    output_dir: &Path,
    travaux_option: TravauxOption,
    result: &RentabilityResult,
) -> Result<()> {
    let file_path = output_dir.join(RENTABILITY_FILE_NAME);
    let mut writer = csv::Writer::from_path(&file_path)
        .with_context(|| format!("Could not create {}", file_path.display()))?;
    writer.serialize(RentabilityRow {
        ca: result.ca.0,
        subsidy: result.subsidy.0,
        travaux_option,
        travaux_revenue: result.travaux_revenue.0,
        travaux_cost: result.travaux_cost.0,
        labor_cost: result.costs.labor.0,
        material_cost: result.costs.material.0,
        additional_costs: result.costs.additional.0,
        commission: result.costs.commission.0,
        subcontractor_cost: result.costs.subcontractor.0,
        subcontractor_estimate: result.subcontractor_estimate.0,
        total_costs: result.total_costs.0,
        margin_total: result.margin_total.0,
        margin_rate: result.margin_rate.0,
        margin_per_unit: result.margin_per_unit.0,
        units_used: result.units_used.0,
        unit_label: &result.unit_label,
        revenue_ttc: result.snapshot.revenue_ttc.0,
        cost_ttc: result.snapshot.cost_ttc.0,
        margin_ttc: result.snapshot.margin_ttc.0,
    })?;
    writer.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cee::prime::{ProjectCee, calculate_project_cee};
    use crate::fixture::{catalog, link_with_params, parameters};
    use crate::parameters::CeeParameters;
    use crate::product::{Delegate, ProductCatalog, ProjectProductLink};
    use crate::rentability::{RentabilityInput, calculate_rentability};
    use crate::units::{Money, MoneyPerMwh};
    use rstest::rstest;
    use std::fs::File;
    use tempfile::tempdir;

    #[test]
    fn test_create_output_directory_new() {
        let dir = tempdir().unwrap();
        let output_dir = dir.path().join("results");

        assert!(!create_output_directory(&output_dir, false).unwrap());
        assert!(output_dir.is_dir());
    }

    #[test]
    fn test_create_output_directory_empty() {
        let dir = tempdir().unwrap();
        assert!(!create_output_directory(dir.path(), false).unwrap());
    }

    #[test]
    fn test_create_output_directory_overwrite() {
        let dir = tempdir().unwrap();
        File::create(dir.path().join("old.csv")).unwrap();

        assert!(create_output_directory(dir.path(), false).is_err());
        assert!(dir.path().join("old.csv").is_file());

        assert!(create_output_directory(dir.path(), true).unwrap());
        assert!(!dir.path().join("old.csv").exists());
    }

    #[rstest]
    fn test_write_project_summary(catalog: ProductCatalog, parameters: CeeParameters) {
        let project = ProjectCee {
            building_type: "Résidentiel".into(),
            surface_m2: None,
            bonification: None,
            delegate: Some(Delegate {
                name: "Délégataire".into(),
                price_eur_per_mwh: MoneyPerMwh(55.0),
            }),
            products: vec![
                ProjectProductLink {
                    id: Some("link-1".into()),
                    product_id: Some("iso-1".into()),
                    ..link_with_params(&[("surface_isolee", 100.0)])
                },
                ProjectProductLink {
                    product_id: Some("unknown".into()),
                    ..ProjectProductLink::default()
                },
            ],
        };
        let summary = calculate_project_cee(&project, &catalog, &parameters);

        let dir = tempdir().unwrap();
        write_project_summary(dir.path(), &summary).unwrap();

        let mut reader =
            csv::Reader::from_path(dir.path().join(PRODUCT_VALORISATIONS_FILE_NAME)).unwrap();
        let headers = reader.headers().unwrap().clone();
        let records: Vec<_> = reader.records().map(Result::unwrap).collect();
        assert_eq!(records.len(), 1);
        let get = |name: &str| {
            let index = headers.iter().position(|header| header == name).unwrap();
            records[0][index].to_string()
        };
        assert_eq!(get("link_id"), "link-1");
        assert_eq!(get("product_id"), "iso-1");
        assert_eq!(get("category"), "isolation");
        assert_eq!(get("multiplier"), "100.0");
        assert_eq!(get("multiplier_resolved"), "true");

        let contents = fs::read_to_string(dir.path().join(PROJECT_TOTALS_FILE_NAME)).unwrap();
        let mut lines = contents.lines();
        assert_eq!(
            lines.next().unwrap(),
            "total_prime,total_valorisation_eur,total_valorisation_mwh,products_included,\
            products_skipped,has_missing_kwh_cumac"
        );
        assert_eq!(lines.next().unwrap(), "59400.0,59400.0,1080.0,1,1,false");
    }

    #[test]
    fn test_write_rentability() {
        let input = RentabilityInput {
            revenue: Money(1000.0),
            travaux_amount: Money(200.0),
            travaux_option: TravauxOption::Partage,
            ..RentabilityInput::default()
        };
        let result = calculate_rentability(&input, 1e-6);

        let dir = tempdir().unwrap();
        write_rentability(dir.path(), input.travaux_option, &result).unwrap();

        let mut reader = csv::Reader::from_path(dir.path().join(RENTABILITY_FILE_NAME)).unwrap();
        let headers = reader.headers().unwrap().clone();
        let record = reader.records().next().unwrap().unwrap();
        let get = |name: &str| {
            let index = headers.iter().position(|header| header == name).unwrap();
            record[index].to_string()
        };
        assert_eq!(get("ca"), "1100.0");
        assert_eq!(get("travaux_option"), "PARTAGE");
        assert_eq!(get("total_costs"), "100.0");
        assert_eq!(get("margin_ttc"), "1000.0");
        assert_eq!(get("unit_label"), "m²");
    }
}
