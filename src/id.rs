//! Code for handling IDs
use unicase::UniCase;

macro_rules! define_id_type {
    ($name:ident) => {
        #[derive(
            Clone, std::hash::Hash, PartialEq, Eq, serde::Deserialize, Debug, serde::Serialize,
        )]
        /// An ID type (e.g. `ProductID`, `BuildingTypeID`, etc.)
        pub struct $name(pub std::sync::Arc<str>);

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(std::sync::Arc::from(s))
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name(std::sync::Arc::from(s))
            }
        }

        impl $name {
            /// Create a new ID from a string slice
            pub fn new(id: &str) -> Self {
                $name(std::sync::Arc::from(id))
            }

            /// Compare against another ID, ignoring ASCII case and surrounding whitespace
            pub fn matches(&self, other: &str) -> bool {
                $crate::id::eq_ignore_case(&self.0, other)
            }
        }
    };
}
pub(crate) use define_id_type;

/// Compare two identifiers case-insensitively, ignoring surrounding whitespace
pub fn eq_ignore_case(a: &str, b: &str) -> bool {
    UniCase::new(a.trim()) == UniCase::new(b.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    define_id_type!(GenericID);

    #[rstest]
    #[case("tertiaire", "Tertiaire", true)]
    #[case(" bureaux ", "BUREAUX", true)]
    #[case("résidentiel", "RÉSIDENTIEL", true)]
    #[case("tertiaire", "industrie", false)]
    fn test_eq_ignore_case(#[case] a: &str, #[case] b: &str, #[case] expected: bool) {
        assert_eq!(eq_ignore_case(a, b), expected);
    }

    #[test]
    fn test_id_matches() {
        let id = GenericID::new("BAR-EN-101");
        assert!(id.matches("bar-en-101"));
        assert!(!id.matches("BAR-EN-102"));
        assert_eq!(id.to_string(), "BAR-EN-101");
    }
}
