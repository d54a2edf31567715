//! Additional cost lines (skips, travel, equipment hire...) and their tax-inclusive totals.
//!
//! Lines have been recorded in several ways over time: with an explicit TTC amount, with an
//! explicit tax amount, with a VAT rate, or with nothing but the HT amount. The total of a line is
//! taken from the most explicit information available.
use crate::units::Money;
use crate::value::deserialise_lenient_number;
use serde::{Deserialize, Deserializer, Serialize};

/// An additional cost line
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AdditionalCost {
    /// Description of the cost
    #[serde(default, alias = "libelle", alias = "description")]
    pub label: String,
    /// Amount excluding tax
    #[serde(
        default,
        alias = "amountHt",
        alias = "montant_ht",
        alias = "ht",
        deserialize_with = "deserialise_money_or_zero"
    )]
    pub amount_ht: Money,
    /// Tax amount, if recorded
    #[serde(
        default,
        alias = "montant_taxes",
        alias = "montant_tva",
        deserialize_with = "deserialise_money"
    )]
    pub taxes: Option<Money>,
    /// Amount including tax, if recorded
    #[serde(
        default,
        alias = "amountTtc",
        alias = "montant_ttc",
        alias = "ttc",
        deserialize_with = "deserialise_money"
    )]
    pub amount_ttc: Option<Money>,
    /// VAT rate, either as a percentage (20) or a fraction (0.2)
    #[serde(
        default,
        alias = "vatRate",
        alias = "taux_tva",
        alias = "tva",
        deserialize_with = "deserialise_lenient_number"
    )]
    pub vat_rate: Option<f64>,
}

fn deserialise_money<'de, D>(deserialiser: D) -> Result<Option<Money>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(deserialise_lenient_number(deserialiser)?.map(Money))
}

fn deserialise_money_or_zero<'de, D>(deserialiser: D) -> Result<Money, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(deserialise_money(deserialiser)?.unwrap_or_default())
}

/// Convert a VAT rate to a fraction.
///
/// Rates below 1 are taken to be fractions already (0.2), others percentages (20). Rates which are
/// not finite or not positive give `None`.
pub fn vat_fraction(rate: f64) -> Option<f64> {
    if !rate.is_finite() || rate <= 0.0 {
        return None;
    }

    Some(if rate < 1.0 { rate } else { rate / 100.0 })
}

impl AdditionalCost {
    /// The tax-inclusive total of the line.
    ///
    /// In order of preference:
    ///
    /// 1. The explicit TTC amount (never less than the HT amount)
    /// 2. HT plus the explicit tax amount
    /// 3. HT with the line's own VAT rate applied
    /// 4. HT with the project's VAT rate applied
    /// 5. HT alone
    pub fn total(&self, project_vat_rate: Option<f64>) -> Money {
        let ht = if self.amount_ht.is_finite() {
            self.amount_ht
        } else {
            Money(0.0)
        };

        if let Some(ttc) = self.amount_ttc.filter(|ttc| ttc.is_positive()) {
            return Money(ht.0.max(ttc.0));
        }

        if let Some(taxes) = self.taxes.filter(|taxes| taxes.is_positive()) {
            return ht + taxes;
        }

        let rate = self
            .vat_rate
            .and_then(vat_fraction)
            .or_else(|| project_vat_rate.and_then(vat_fraction));
        match rate {
            Some(rate) => Money(ht.0 * (1.0 + rate)),
            None => ht,
        }
    }
}

/// The sum of the tax-inclusive totals of all lines
pub fn additional_costs_total(costs: &[AdditionalCost], project_vat_rate: Option<f64>) -> Money {
    costs.iter().map(|cost| cost.total(project_vat_rate)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    fn cost(
        ht: f64,
        taxes: Option<f64>,
        ttc: Option<f64>,
        vat_rate: Option<f64>,
    ) -> AdditionalCost {
        AdditionalCost {
            label: "Benne".into(),
            amount_ht: Money(ht),
            taxes: taxes.map(Money),
            amount_ttc: ttc.map(Money),
            vat_rate,
        }
    }

    #[rstest]
    #[case(cost(500.0, Some(100.0), Some(650.0), Some(20.0)), Some(5.5), 650.0)] // TTC wins
    #[case(cost(500.0, None, Some(400.0), None), None, 500.0)] // TTC below HT
    #[case(cost(500.0, Some(100.0), None, Some(20.0)), Some(5.5), 600.0)] // explicit taxes
    #[case(cost(500.0, None, None, Some(20.0)), Some(5.5), 600.0)] // line rate as percentage
    #[case(cost(500.0, None, None, Some(0.1)), Some(5.5), 550.0)] // line rate as fraction
    #[case(cost(500.0, None, Some(0.0), None), Some(5.5), 527.5)] // project rate
    #[case(cost(500.0, Some(0.0), None, Some(-1.0)), None, 500.0)] // HT alone
    #[case(cost(f64::NAN, None, None, None), Some(20.0), 0.0)]
    fn test_total(
        #[case] cost: AdditionalCost,
        #[case] project_vat_rate: Option<f64>,
        #[case] expected: f64,
    ) {
        let total = cost.total(project_vat_rate);
        assert_approx_eq!(Money, total, Money(expected), epsilon = 1e-9);
    }

    #[rstest]
    #[case(20.0, Some(0.2))]
    #[case(5.5, Some(0.055))]
    #[case(0.2, Some(0.2))]
    #[case(0.0, None)]
    #[case(-20.0, None)]
    #[case(f64::NAN, None)]
    fn test_vat_fraction(#[case] rate: f64, #[case] expected: Option<f64>) {
        match (vat_fraction(rate), expected) {
            (Some(actual), Some(expected)) => assert_approx_eq!(f64, actual, expected),
            (actual, expected) => assert_eq!(actual, expected),
        }
    }

    #[test]
    fn test_additional_costs_total() {
        let costs = [
            cost(500.0, Some(100.0), None, None),
            cost(200.0, None, None, None),
        ];
        let total = additional_costs_total(&costs, Some(20.0));
        assert_approx_eq!(Money, total, Money(840.0));
        assert_approx_eq!(Money, additional_costs_total(&[], Some(20.0)), Money(0.0));
    }

    #[test]
    fn test_deserialise_legacy_fields() {
        #[derive(Deserialize)]
        struct Costs {
            costs: Vec<AdditionalCost>,
        }

        let costs: Costs = toml::from_str(
            r#"
            [[costs]]
            libelle = "Location nacelle"
            montant_ht = "1 200,00"
            taux_tva = "20"

            [[costs]]
            amountHt = 300
            amountTtc = 360
            "#,
        )
        .unwrap();

        assert_eq!(costs.costs[0].label, "Location nacelle");
        assert_approx_eq!(Money, costs.costs[0].total(None), Money(1440.0));
        assert_approx_eq!(Money, costs.costs[1].total(None), Money(360.0));
    }
}
