use std::fmt;

/// Plate text reduced to uppercase ASCII letters and digits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct NormalizedPlate(String);

impl NormalizedPlate {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for NormalizedPlate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NormalizedPlate {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Drops everything but ASCII alphanumerics and uppercases the rest.
///
/// Restricting to ASCII keeps the function idempotent: Unicode uppercasing
/// can emit combining marks that a second pass would strip.
pub fn normalize(raw: &str) -> NormalizedPlate {
    NormalizedPlate(
        raw.chars()
            .filter(char::is_ascii_alphanumeric)
            .map(|c| c.to_ascii_uppercase())
            .collect(),
    )
}
