//! Fixtures for tests
use crate::cee::formula::FormulaDescriptor;
use crate::parameters::CeeParameters;
use crate::product::{
    KwhCumacValue, ParamField, ParamFieldType, ProductCatalog, ProductCatalogEntry,
    ProjectProductLink,
};
use crate::units::Kwh;
use crate::value::ParamValue;
use indexmap::indexmap;
use rstest::fixture;

/// Assert that an error with the given message occurs
macro_rules! assert_error {
    ($result:expr, $msg:expr) => {
        assert_eq!(
            $result.unwrap_err().chain().next().unwrap().to_string(),
            $msg
        );
    };
}
pub(crate) use assert_error;

/// A numeric schema field
pub fn field(name: &str, label: Option<&str>) -> ParamField {
    ParamField {
        name: name.into(),
        label: label.map(Into::into),
        kind: ParamFieldType::Number,
        min: Some(0.0),
        max: None,
        options: Vec::new(),
    }
}

/// A link with the given numeric dynamic params and no product
pub fn link_with_params(params: &[(&str, f64)]) -> ProjectProductLink {
    ProjectProductLink {
        dynamic_params: params
            .iter()
            .map(|(key, value)| (*key, ParamValue::Number(*value)))
            .collect(),
        ..ProjectProductLink::default()
    }
}

fn kwh(building_type: &str, lt_400: Option<f64>, gte_400: Option<f64>) -> KwhCumacValue {
    KwhCumacValue {
        building_type: building_type.into(),
        kwh_cumac_lt_400: lt_400.map(Kwh),
        kwh_cumac_gte_400: gte_400.map(Kwh),
    }
}

#[fixture]
pub fn isolation_product() -> ProductCatalogEntry {
    ProductCatalogEntry {
        id: "iso-1".into(),
        name: "Isolation des combles".into(),
        code: "BAR-EN-101".into(),
        category_name: "isolation".into(),
        active: true,
        schema: vec![field("surface_isolee", Some("Surface isolée (m²)"))],
        bonification: None,
        coefficient: None,
        formula: None,
        kwh_cumac_values: vec![
            kwh("Résidentiel", Some(5400.0), Some(5000.0)),
            kwh("Tertiaire", Some(4800.0), Some(5100.0)),
        ],
    }
}

#[fixture]
pub fn lighting_product() -> ProductCatalogEntry {
    ProductCatalogEntry {
        id: "led-1".into(),
        name: "Luminaires LED".into(),
        code: "BAT-EQ-127".into(),
        category_name: "lighting".into(),
        active: true,
        schema: vec![
            field("nombre_led", Some("Nombre de LED")),
            field("led_watt", Some("Puissance LED (W)")),
            field("bonus_dom", Some("Bonus DOM")),
        ],
        bonification: None,
        coefficient: None,
        formula: Some(FormulaDescriptor {
            variable_key: Some("nombre_led".into()),
            expression: Some("LED_WATT * BONUS_DOM * 2 * BONIFICATION / MWH_DIVISOR".into()),
            ..FormulaDescriptor::default()
        }),
        kwh_cumac_values: vec![kwh("Tertiaire", Some(450.0), Some(500.0))],
    }
}

#[fixture]
pub fn catalog(
    isolation_product: ProductCatalogEntry,
    lighting_product: ProductCatalogEntry,
) -> ProductCatalog {
    indexmap! {
        isolation_product.id.clone() => isolation_product,
        lighting_product.id.clone() => lighting_product,
    }
}

#[fixture]
pub fn parameters() -> CeeParameters {
    CeeParameters::default()
}
