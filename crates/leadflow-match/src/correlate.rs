//! Tag-overlap correlation: scores catalog products against the
//! customer's extracted keywords.

use leadflow_core::engage::ProductMatch;
use leadflow_core::error::LeadflowError;
use leadflow_core::product::{normalize_tags, Product};
use std::collections::HashSet;

/// Score active products against a keyword set.
///
/// Score = fraction of the product's tags present in the normalized
/// keyword set. Products below `threshold` are excluded; results are
/// sorted by score descending, ties broken by product id ascending, and
/// truncated to `max_results`. A product with zero tags never matches.
///
/// Returns an empty vec, not an error, when nothing clears the
/// threshold.
pub fn match_products<'a, I>(
    keywords: &[String],
    catalog: I,
    threshold: f64,
    max_results: usize,
) -> Result<Vec<ProductMatch>, LeadflowError>
where
    I: IntoIterator<Item = &'a Product>,
{
    if !(0.0..=1.0).contains(&threshold) {
        return Err(LeadflowError::InvalidThreshold(threshold));
    }
    if max_results == 0 {
        return Err(LeadflowError::InvalidMaxResults(max_results as i64));
    }

    // Catalog tags are normalized at write time; keywords come from an
    // external extractor and go through the same routine here so both
    // sides share one alphabet.
    let keywords: HashSet<String> = normalize_tags(keywords).into_iter().collect();

    let mut matches: Vec<ProductMatch> = Vec::new();
    for product in catalog {
        if !product.is_active || product.tags.is_empty() {
            continue;
        }
        let matching_tags: Vec<String> = product
            .tags
            .iter()
            .filter(|tag| keywords.contains(*tag))
            .cloned()
            .collect();
        let score = matching_tags.len() as f64 / product.tags.len() as f64;
        if score < threshold {
            continue;
        }
        matches.push(ProductMatch {
            product_id: product.id,
            correlation_score: score,
            matching_tags,
            product_name: product.name.clone(),
            product_genre: product.genre.clone(),
        });
    }

    // Deterministic ordering: score descending, then id ascending.
    matches.sort_by(|a, b| {
        b.correlation_score
            .total_cmp(&a.correlation_score)
            .then(a.product_id.cmp(&b.product_id))
    });
    matches.truncate(max_results);

    tracing::debug!(
        "correlation: {} keyword(s) -> {} match(es) at threshold {threshold}",
        keywords.len(),
        matches.len()
    );

    Ok(matches)
}
