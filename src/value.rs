//! Lenient handling of the loosely-typed values which come from user-edited forms.
//!
//! Values in dynamic parameter maps and legacy records may be numbers, booleans or text. Text is
//! parsed with French conventions in mind (decimal comma, spaces as thousands separators). Parsing
//! failures never raise an error: the value is simply treated as absent.
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// A value held in a dynamic parameter map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// A numeric value
    Number(f64),
    /// A boolean flag (e.g. from a checkbox)
    Bool(bool),
    /// Free text, which may still contain a number
    Text(String),
}

impl ParamValue {
    /// Interpret the value as a finite number, if possible
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ParamValue::Number(value) => value.is_finite().then_some(*value),
            ParamValue::Bool(_) => None,
            ParamValue::Text(text) => parse_lenient_number(text),
        }
    }

    /// Interpret the value as a strictly positive, finite number
    pub fn as_positive(&self) -> Option<f64> {
        self.as_number().filter(|value| *value > 0.0)
    }

    /// Interpret the value as a flag.
    ///
    /// Numbers are true when non-zero and text is matched against common spellings of "yes".
    pub fn as_bool(&self) -> bool {
        match self {
            ParamValue::Bool(flag) => *flag,
            ParamValue::Number(value) => *value != 0.0,
            ParamValue::Text(text) => matches!(
                slug(text).as_str(),
                "true" | "1" | "oui" | "yes" | "o" | "y" | "on"
            ),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Number(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamValue::Number(value) => write!(f, "{value}"),
            ParamValue::Bool(flag) => write!(f, "{flag}"),
            ParamValue::Text(text) => write!(f, "{text}"),
        }
    }
}

/// Parse a number entered by a user, tolerating locale formatting.
///
/// Accepts a decimal comma, spaces (including non-breaking ones) and apostrophes as thousands
/// separators and a trailing currency or percent sign. Returns `None` for anything else or for
/// non-finite results.
pub fn parse_lenient_number(text: &str) -> Option<f64> {
    let cleaned: String = text
        .trim()
        .trim_end_matches(['€', '%'])
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\'' && *c != '\u{202f}')
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let commas = cleaned.matches(',').count();
    let normalised = match (cleaned.rfind(','), cleaned.rfind('.')) {
        // Both present: whichever comes last is the decimal separator
        (Some(comma), Some(dot)) if comma > dot => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (Some(_), None) if commas == 1 => cleaned.replace(',', "."),
        (Some(_), None) => cleaned.replace(',', ""),
        _ => cleaned,
    };

    normalised
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

/// Reduce a key or label to a canonical slug for comparison.
///
/// The slug is lower case, has French diacritics removed and uses a single underscore between
/// words, so that e.g. `"Nombre de LED"`, `"nombre-de-led"` and `"nombreDeLed"` compare equal once
/// camel case has been split.
pub fn slug(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_lower = false;
    for c in text.trim().chars() {
        if c.is_uppercase() && prev_lower {
            out.push('_');
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        for lower in c.to_lowercase() {
            match fold_diacritic(lower) {
                Some(folded) => out.push_str(folded),
                None if lower.is_alphanumeric() => out.push(lower),
                None => out.push('_'),
            }
        }
    }

    out.split('_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// Replacement for accented characters commonly found in French labels
fn fold_diacritic(c: char) -> Option<&'static str> {
    let folded = match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => "a",
        'ç' => "c",
        'è' | 'é' | 'ê' | 'ë' => "e",
        'ì' | 'í' | 'î' | 'ï' => "i",
        'ñ' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' => "o",
        'ù' | 'ú' | 'û' | 'ü' => "u",
        'ý' | 'ÿ' => "y",
        'œ' => "oe",
        'æ' => "ae",
        '²' => "2",
        _ => return None,
    };

    Some(folded)
}

/// Return the first candidate which is a strictly positive, finite number.
///
/// Candidates are consumed lazily, so later sources are not evaluated once a match is found.
pub fn first_positive<I>(candidates: I) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    candidates
        .into_iter()
        .flatten()
        .find(|value| value.is_finite() && *value > 0.0)
}

/// Apply an ordered list of accessors to `source`, returning the first strictly positive value.
pub fn first_positive_of<S: ?Sized>(
    source: &S,
    accessors: &[fn(&S) -> Option<f64>],
) -> Option<f64> {
    first_positive(accessors.iter().map(|accessor| accessor(source)))
}

/// Deserialise an optional number which may have been stored as text
pub fn deserialise_lenient_number<'de, D>(deserialiser: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<ParamValue> = Deserialize::deserialize(deserialiser)?;
    Ok(value.as_ref().and_then(ParamValue::as_number))
}

/// Deserialise a flag which may have been stored as a boolean, number or text
pub fn deserialise_lenient_bool<'de, D>(deserialiser: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<ParamValue> = Deserialize::deserialize(deserialiser)?;
    Ok(value.as_ref().is_some_and(ParamValue::as_bool))
}
