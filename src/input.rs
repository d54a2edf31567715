//! Reading of project and site files.
use crate::cee::prime::ProjectCee;
use crate::parameters::CeeParameters;
use crate::product::{ProductCatalog, ProductCatalogEntry};
use crate::rentability::adapter::SiteRecord;
use anyhow::{Context, Result, ensure};
use indexmap::IndexMap;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

/// Format an error message to include the file path
pub fn input_err_msg<P: AsRef<Path>>(file_path: P) -> String {
    format!("Error reading {}", file_path.as_ref().display())
}

/// Parse a TOML file at the specified path.
///
/// # Arguments
///
/// * `file_path` - Path to the TOML file
///
/// # Returns
///
/// * The deserialised TOML data or an error if the file could not be read or parsed.
pub fn read_toml<T: DeserializeOwned>(file_path: &Path) -> Result<T> {
    let toml_str = fs::read_to_string(file_path).with_context(|| input_err_msg(file_path))?;
    let toml_data = toml::from_str(&toml_str).with_context(|| input_err_msg(file_path))?;
    Ok(toml_data)
}

/// The contents of a project file: the project's CEE fields and the catalogue it refers to
#[derive(Debug, Deserialize)]
struct ProjectFile {
    #[serde(flatten)]
    project: ProjectCee,
    #[serde(default)]
    catalog: Vec<ProductCatalogEntry>,
}

/// Convert a list of catalogue entries into a map, checking that IDs are unique
fn build_catalog(entries: Vec<ProductCatalogEntry>) -> Result<ProductCatalog> {
    let mut catalog = IndexMap::with_capacity(entries.len());
    for entry in entries {
        let id = entry.id.clone();
        ensure!(
            catalog.insert(id.clone(), entry).is_none(),
            "Duplicate product ID found: {id}"
        );
    }

    Ok(catalog)
}

/// Folder containing `file_path`, used to find `cee.toml`
fn parent_dir(file_path: &Path) -> &Path {
    file_path.parent().unwrap_or_else(|| Path::new("."))
}

/// Read a project file, along with the `cee.toml` file in the same folder, if any.
///
/// # Returns
///
/// The project, its product catalogue and the valorisation parameters
pub fn load_project(file_path: &Path) -> Result<(ProjectCee, ProductCatalog, CeeParameters)> {
    let ProjectFile { project, catalog } = read_toml(file_path)?;
    let catalog = build_catalog(catalog).with_context(|| input_err_msg(file_path))?;
    let parameters = CeeParameters::from_path(parent_dir(file_path))?;

    Ok((project, catalog, parameters))
}

/// Read a site file, along with the `cee.toml` file in the same folder, if any.
pub fn load_site(file_path: &Path) -> Result<(SiteRecord, CeeParameters)> {
    let site = read_toml(file_path)?;
    let parameters = CeeParameters::from_path(parent_dir(file_path))?;

    Ok((site, parameters))
}
