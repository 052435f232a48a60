//! Product catalog domain model.
//!
//! Products carry a normalized tag set used by the correlation engine.
//! Validation and tag normalization live here so the create and update
//! paths in the store share one implementation.

use crate::error::LeadflowError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const MAX_NAME_LEN: usize = 255;
const MAX_DESCRIPTION_LEN: usize = 2000;
const MAX_GENRE_LEN: usize = 100;
const MAX_EXTERNAL_ID_LEN: usize = 255;

/// A catalog product available for correlation matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price: Option<f64>,
    /// 3-letter ISO code, always uppercase.
    pub currency: String,
    /// Category used for cross-selling and list filtering.
    pub genre: Option<String>,
    /// Normalized: lower-cased, trimmed, deduplicated, no blanks.
    pub tags: Vec<String>,
    pub is_active: bool,
    /// External system product ID for integration.
    pub external_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for creating a product. Also the shape of `[[products]]`
/// entries in a seed file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub external_id: Option<String>,
}

/// Partial update. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub genre: Option<String>,
    pub tags: Option<Vec<String>>,
    pub is_active: Option<bool>,
    pub external_id: Option<String>,
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_true() -> bool {
    true
}

/// Normalize a tag list: trim, lower-case, drop empties, deduplicate
/// preserving first-seen order.
///
/// Idempotent: normalizing an already-normalized list is a no-op. Both
/// catalog tags and extracted customer keywords go through this routine
/// so correlation compares a single alphabet.
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim().to_lowercase();
        if tag.is_empty() {
            continue;
        }
        if seen.insert(tag.clone()) {
            out.push(tag);
        }
    }
    out
}

/// Validate and uppercase a currency code: exactly 3 ASCII letters.
pub fn validate_currency(code: &str) -> Result<String, LeadflowError> {
    let code = code.trim().to_uppercase();
    if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_uppercase()) {
        return Err(LeadflowError::Validation(format!(
            "currency must be a 3-letter ISO code, got {code:?}"
        )));
    }
    Ok(code)
}

fn validate_name(name: &str) -> Result<(), LeadflowError> {
    if name.is_empty() {
        return Err(LeadflowError::Validation("product name is required".into()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(LeadflowError::Validation(format!(
            "product name exceeds {MAX_NAME_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_price(price: f64) -> Result<(), LeadflowError> {
    if !price.is_finite() || price < 0.0 {
        return Err(LeadflowError::Validation(format!(
            "price must be >= 0, got {price}"
        )));
    }
    Ok(())
}

fn validate_len(
    field: &str,
    value: &str,
    max: usize,
) -> Result<(), LeadflowError> {
    if value.chars().count() > max {
        return Err(LeadflowError::Validation(format!(
            "{field} exceeds {max} characters"
        )));
    }
    Ok(())
}

impl NewProduct {
    /// Validate all fields and return a normalized copy, or the first
    /// violation as a `Validation` error.
    pub fn validated(mut self) -> Result<Self, LeadflowError> {
        validate_name(&self.name)?;
        if let Some(ref d) = self.description {
            validate_len("description", d, MAX_DESCRIPTION_LEN)?;
        }
        if let Some(p) = self.price {
            validate_price(p)?;
        }
        self.currency = validate_currency(&self.currency)?;
        if let Some(ref g) = self.genre {
            validate_len("genre", g, MAX_GENRE_LEN)?;
        }
        if let Some(ref e) = self.external_id {
            validate_len("external_id", e, MAX_EXTERNAL_ID_LEN)?;
        }
        self.tags = normalize_tags(&self.tags);
        Ok(self)
    }
}

impl ProductPatch {
    /// Re-run validation and normalization on the touched fields only.
    pub fn validated(mut self) -> Result<Self, LeadflowError> {
        if let Some(ref n) = self.name {
            validate_name(n)?;
        }
        if let Some(ref d) = self.description {
            validate_len("description", d, MAX_DESCRIPTION_LEN)?;
        }
        if let Some(p) = self.price {
            validate_price(p)?;
        }
        if let Some(ref c) = self.currency {
            self.currency = Some(validate_currency(c)?);
        }
        if let Some(ref g) = self.genre {
            validate_len("genre", g, MAX_GENRE_LEN)?;
        }
        if let Some(ref e) = self.external_id {
            validate_len("external_id", e, MAX_EXTERNAL_ID_LEN)?;
        }
        if let Some(ref tags) = self.tags {
            self.tags = Some(normalize_tags(tags));
        }
        Ok(self)
    }

    /// Whether the patch touches anything at all.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.price.is_none()
            && self.currency.is_none()
            && self.genre.is_none()
            && self.tags.is_none()
            && self.is_active.is_none()
            && self.external_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_normalize_tags_trims_lowercases_dedupes() {
        let tags = strings(&[" Sci-Fi ", "sci-fi", "", "  ", "Paperback", "SCI-FI"]);
        assert_eq!(normalize_tags(&tags), strings(&["sci-fi", "paperback"]));
    }

    #[test]
    fn test_normalize_tags_idempotent() {
        let tags = strings(&["Thriller", " thriller ", "Hardcover", ""]);
        let once = normalize_tags(&tags);
        let twice = normalize_tags(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_normalize_tags_preserves_first_seen_order() {
        let tags = strings(&["b", "a", "B", "c", "a"]);
        assert_eq!(normalize_tags(&tags), strings(&["b", "a", "c"]));
    }

    #[test]
    fn test_currency_uppercased() {
        assert_eq!(validate_currency("usd").unwrap(), "USD");
        assert_eq!(validate_currency(" eur ").unwrap(), "EUR");
    }

    #[test]
    fn test_currency_rejects_bad_codes() {
        for bad in ["US", "USDX", "U1D", "", "us$"] {
            assert!(
                matches!(validate_currency(bad), Err(LeadflowError::Validation(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_new_product_validation() {
        let p = NewProduct {
            name: "Dune".into(),
            description: None,
            price: Some(12.99),
            currency: "usd".into(),
            genre: Some("books".into()),
            tags: strings(&["Sci-Fi", "paperback", "sci-fi"]),
            is_active: true,
            external_id: None,
        };
        let p = p.validated().unwrap();
        assert_eq!(p.currency, "USD");
        assert_eq!(p.tags, strings(&["sci-fi", "paperback"]));
    }

    #[test]
    fn test_new_product_rejects_empty_name() {
        let p = NewProduct {
            name: String::new(),
            description: None,
            price: None,
            currency: "USD".into(),
            genre: None,
            tags: Vec::new(),
            is_active: true,
            external_id: None,
        };
        assert!(matches!(p.validated(), Err(LeadflowError::Validation(_))));
    }

    #[test]
    fn test_new_product_rejects_negative_price() {
        let p = NewProduct {
            name: "Dune".into(),
            description: None,
            price: Some(-1.0),
            currency: "USD".into(),
            genre: None,
            tags: Vec::new(),
            is_active: true,
            external_id: None,
        };
        assert!(matches!(p.validated(), Err(LeadflowError::Validation(_))));
    }

    #[test]
    fn test_new_product_rejects_oversized_description() {
        let p = NewProduct {
            name: "Dune".into(),
            description: Some("x".repeat(2001)),
            price: None,
            currency: "USD".into(),
            genre: None,
            tags: Vec::new(),
            is_active: true,
            external_id: None,
        };
        assert!(matches!(p.validated(), Err(LeadflowError::Validation(_))));
    }

    #[test]
    fn test_patch_validates_touched_fields_only() {
        let patch = ProductPatch {
            tags: Some(strings(&[" NEW ", "new", ""])),
            ..Default::default()
        };
        let patch = patch.validated().unwrap();
        assert_eq!(patch.tags.unwrap(), strings(&["new"]));

        let bad = ProductPatch {
            currency: Some("nope".into()),
            ..Default::default()
        };
        assert!(matches!(bad.validated(), Err(LeadflowError::Validation(_))));
    }

    #[test]
    fn test_seed_toml_shape() {
        let entry: NewProduct = toml::from_str(
            r#"
            name = "Dune"
            tags = ["Sci-Fi", "paperback"]
            price = 12.99
            "#,
        )
        .unwrap();
        assert_eq!(entry.currency, "USD");
        assert!(entry.is_active);
    }
}
