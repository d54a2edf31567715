//! Defines the `CeeParameters` struct, which represents the contents of `cee.toml`.
//!
//! The file is optional: every parameter has a default matching the regulations in force, so it
//! only needs to exist when a deployment wants to override one of them.
use crate::input::{input_err_msg, read_toml};
use crate::units::Dimensionless;
use anyhow::{Context, Result, ensure};
use log::warn;
use serde::Deserialize;
use std::path::Path;

const CEE_PARAMETERS_FILE_NAME: &str = "cee.toml";

macro_rules! define_param_default {
    ($name:ident, $type: ty, $value: expr) => {
        fn $name() -> $type {
            $value
        }
    };
}

define_param_default!(default_bonification, Dimensionless, Dimensionless(2.0));
define_param_default!(default_mwh_divisor, f64, 1000.0);
define_param_default!(default_surface_threshold_m2, f64, 400.0);
define_param_default!(default_zero_tolerance, f64, 1e-6);
define_param_default!(
    default_excluded_prefixes,
    Vec<String>,
    vec!["ECO".to_string(), "HORS_CEE".to_string()]
);

/// Constants used by the valorisation and rentability calculations
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct CeeParameters {
    /// Bonification applied when neither the product nor the project sets one
    #[serde(default = "default_bonification")]
    pub default_bonification: Dimensionless,
    /// Converts kWh cumac to MWh cumac
    #[serde(default = "default_mwh_divisor")]
    pub mwh_divisor: f64,
    /// Building surface (m²) from which the large-building kWh values apply
    #[serde(default = "default_surface_threshold_m2")]
    pub surface_threshold_m2: f64,
    /// Codes or categories of products which are not eligible for CEE
    #[serde(default = "default_excluded_prefixes")]
    pub excluded_prefixes: Vec<String>,
    /// Rentability figures closer than this to zero are reported as zero
    #[serde(default = "default_zero_tolerance")]
    pub zero_tolerance: f64,
    /// VAT rate (%) applied to additional costs of sites without a rate of their own.
    ///
    /// Unset by default, in which case such costs are counted excluding tax.
    #[serde(default)]
    pub default_vat_rate: Option<f64>,
}

impl Default for CeeParameters {
    fn default() -> Self {
        Self {
            default_bonification: default_bonification(),
            mwh_divisor: default_mwh_divisor(),
            surface_threshold_m2: default_surface_threshold_m2(),
            excluded_prefixes: default_excluded_prefixes(),
            zero_tolerance: default_zero_tolerance(),
            default_vat_rate: None,
        }
    }
}

/// Check that a parameter is a finite number greater than zero
fn check_positive(value: f64, name: &str) -> Result<()> {
    ensure!(
        value.is_finite() && value > 0.0,
        "{name} must be a finite number greater than zero"
    );

    Ok(())
}

/// Check the `zero_tolerance` parameter is valid
fn check_zero_tolerance(value: f64) -> Result<()> {
    ensure!(
        value.is_finite() && value >= 0.0,
        "zero_tolerance must be a finite number greater than or equal to zero"
    );

    Ok(())
}

/// Check the `default_vat_rate` parameter is valid
fn check_vat_rate(value: f64) -> Result<()> {
    ensure!(
        value.is_finite() && (0.0..=100.0).contains(&value),
        "default_vat_rate must be a percentage between 0 and 100"
    );

    Ok(())
}

impl CeeParameters {
    /// Read the parameters file from the specified directory.
    ///
    /// If the file is not present, default values are used.
    ///
    /// # Arguments
    ///
    /// * `dir` - Folder which may contain a `cee.toml` file
    ///
    /// # Returns
    ///
    /// The parameters or an error if the file is invalid
    pub fn from_path<P: AsRef<Path>>(dir: P) -> Result<CeeParameters> {
        let file_path = dir.as_ref().join(CEE_PARAMETERS_FILE_NAME);
        if !file_path.is_file() {
            return Ok(CeeParameters::default());
        }

        let parameters: CeeParameters = read_toml(&file_path)?;
        parameters
            .validate()
            .with_context(|| input_err_msg(&file_path))?;

        Ok(parameters)
    }

    /// Validate parameters after reading in file
    fn validate(&self) -> Result<()> {
        check_positive(self.default_bonification.0, "default_bonification")?;
        check_positive(self.mwh_divisor, "mwh_divisor")?;
        check_positive(self.surface_threshold_m2, "surface_threshold_m2")?;
        check_zero_tolerance(self.zero_tolerance)?;
        if let Some(vat_rate) = self.default_vat_rate {
            check_vat_rate(vat_rate)?;
        }

        if self.excluded_prefixes.is_empty() {
            warn!("No excluded prefixes configured: all catalogue products are CEE-eligible");
        }

        Ok(())
    }
}
