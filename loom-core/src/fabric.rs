use std::fmt;

use serde::{Deserialize, Serialize};

/// Trims surrounding whitespace and collapses empty text to `None`.
pub fn normalize_text(value: Option<String>) -> Option<String> {
    value.and_then(|raw| {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Full description of a fabric as recorded on a purchase or sale row.
#[derive(Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct FabricIdentity {
    pub fabric_type: String,
    pub fabric_code: Option<String>,
    pub composition: Option<String>,
}

impl FabricIdentity {
    pub fn new(
        fabric_type: impl Into<String>,
        fabric_code: Option<String>,
        composition: Option<String>,
    ) -> Self {
        Self {
            fabric_type: fabric_type.into().trim().to_string(),
            fabric_code: normalize_text(fabric_code),
            composition: normalize_text(composition),
        }
    }

    /// The stock bucket this fabric is summed into.
    pub fn key(&self) -> FabricKey {
        FabricKey {
            fabric_type: self.fabric_type.clone(),
            fabric_code: self.fabric_code.clone(),
        }
    }

    /// Text used by the free-text stock search: `"type code composition"`, lowercased.
    pub fn search_text(&self) -> String {
        format!(
            "{} {} {}",
            self.fabric_type,
            self.fabric_code.as_deref().unwrap_or_default(),
            self.composition.as_deref().unwrap_or_default()
        )
        .to_lowercase()
    }

    /// Case-insensitive substring match against [`FabricIdentity::search_text`].
    pub fn matches_search(&self, needle: &str) -> bool {
        self.search_text().contains(&needle.to_lowercase())
    }
}

impl fmt::Display for FabricIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fabric_type)?;
        if let Some(code) = &self.fabric_code {
            write!(f, " [{code}]")?;
        }
        if let Some(composition) = &self.composition {
            write!(f, " ({composition})")?;
        }
        Ok(())
    }
}

/// Grouping key for stock sums.
///
/// Two rows share a stock bucket iff their fabric type and code are equal,
/// where a missing code only equals another missing code. Composition is
/// carried by [`FabricIdentity`] for display and is not part of the key.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct FabricKey {
    pub fabric_type: String,
    pub fabric_code: Option<String>,
}

impl fmt::Display for FabricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.fabric_code {
            Some(code) => write!(f, "{} [{code}]", self.fabric_type),
            None => f.write_str(&self.fabric_type),
        }
    }
}

/// Matcher used by the availability check when recording a sale.
///
/// The fabric type always has to match. Code and composition narrow the
/// match only when the seller supplied them.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FabricFilter<'a> {
    pub fabric_type: &'a str,
    pub fabric_code: Option<&'a str>,
    pub composition: Option<&'a str>,
}

impl<'a> FabricFilter<'a> {
    pub fn from_identity(identity: &'a FabricIdentity) -> Self {
        Self {
            fabric_type: &identity.fabric_type,
            fabric_code: identity.fabric_code.as_deref(),
            composition: identity.composition.as_deref(),
        }
    }

    pub fn matches(&self, identity: &FabricIdentity) -> bool {
        if identity.fabric_type != self.fabric_type {
            return false;
        }
        if let Some(code) = self.fabric_code {
            if identity.fabric_code.as_deref() != Some(code) {
                return false;
            }
        }
        if let Some(composition) = self.composition {
            if identity.composition.as_deref() != Some(composition) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(kind: &str, code: Option<&str>, comp: Option<&str>) -> FabricIdentity {
        FabricIdentity::new(kind, code.map(String::from), comp.map(String::from))
    }

    #[test]
    fn key_ignores_composition() {
        let cotton = identity("Cotton", Some("C1"), Some("100% cotton"));
        let blend = identity("Cotton", Some("C1"), Some("60/40"));
        assert_eq!(cotton.key(), blend.key());
        assert_ne!(cotton.key(), identity("Cotton", None, None).key());
    }

    #[test]
    fn blank_optional_fields_are_dropped() {
        let fabric = identity("  Silk ", Some("   "), Some(""));
        assert_eq!(fabric.fabric_type, "Silk");
        assert_eq!(fabric.fabric_code, None);
        assert_eq!(fabric.composition, None);
    }

    #[test]
    fn filter_only_narrows_on_supplied_fields() {
        let lot = identity("Linen", Some("L9"), Some("pure"));
        let stored = lot.clone();
        let open = FabricFilter {
            fabric_type: "Linen",
            fabric_code: None,
            composition: None,
        };
        assert!(open.matches(&stored));
        assert!(FabricFilter::from_identity(&lot).matches(&stored));
        let other_code = FabricFilter {
            fabric_type: "Linen",
            fabric_code: Some("L1"),
            composition: None,
        };
        assert!(!other_code.matches(&stored));
    }

    #[test]
    fn search_is_case_insensitive() {
        let fabric = identity("Denim", Some("D-42"), Some("Stretch"));
        assert!(fabric.matches_search("d-42"));
        assert!(fabric.matches_search("STRETCH"));
        assert!(!fabric.matches_search("silk"));
    }
}
