//! Valorisation of energy-savings certificates ("Prime CEE") and rentability of renovation
//! projects.
#![warn(missing_docs)]
use std::path::PathBuf;

pub mod cee;
pub mod cli;
pub mod id;
pub mod input;
pub mod log;
pub mod output;
pub mod parameters;
pub mod product;
pub mod rentability;
pub mod settings;
pub mod units;
pub mod value;

#[cfg(test)]
mod fixture;

/// Get the config folder for the program.
///
/// Falls back on the working directory if the platform has no config folder.
pub fn get_primecee_config_dir() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_default();
    path.push("primecee");
    path
}
