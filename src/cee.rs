//! Valorisation of energy-savings certificates ("Prime CEE").
//!
//! The pipeline for each product configured on a project is:
//!
//! 1. Normalise the product's stored formula ([`formula`])
//! 2. Resolve the multiplier, e.g. the insulated surface or number of fixtures ([`multiplier`])
//! 3. Pick the kWh cumac base for the building ([`kwh`])
//! 4. Convert to MWh and euros, possibly with a custom expression ([`valorisation`],
//!    [`expression`])
//!
//! [`prime`] runs this for every product of a project and sums the results.
pub mod expression;
pub mod formula;
pub mod kwh;
pub mod multiplier;
pub mod prime;
pub mod valorisation;
