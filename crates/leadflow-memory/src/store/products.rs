//! Product catalog CRUD and active-product listing.

use super::{fmt_ts, parse_ts, Store};
use chrono::Utc;
use leadflow_core::error::LeadflowError;
use leadflow_core::product::{NewProduct, Product, ProductPatch};

/// Optional filter for active-product listing.
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub genre: Option<String>,
    pub tag: Option<String>,
}

type ProductRow = (
    i64,            // id
    String,         // name
    Option<String>, // description
    Option<f64>,    // price
    String,         // currency
    Option<String>, // genre
    String,         // tags json
    i64,            // is_active
    Option<String>, // external_id
    String,         // created_at
    String,         // updated_at
);

fn row_to_product(row: ProductRow) -> Result<Product, LeadflowError> {
    let tags: Vec<String> = serde_json::from_str(&row.6)?;
    Ok(Product {
        id: row.0,
        name: row.1,
        description: row.2,
        price: row.3,
        currency: row.4,
        genre: row.5,
        tags,
        is_active: row.7 != 0,
        external_id: row.8,
        created_at: parse_ts(&row.9)?,
        updated_at: parse_ts(&row.10)?,
    })
}

const PRODUCT_COLUMNS: &str = "id, name, description, price, currency, genre, tags, \
     is_active, external_id, created_at, updated_at";

impl Store {
    /// Create a product. Validates and normalizes, assigns id and
    /// timestamps.
    pub async fn create_product(&self, product: NewProduct) -> Result<Product, LeadflowError> {
        let product = product.validated()?;
        let now = fmt_ts(Utc::now());
        let tags_json = serde_json::to_string(&product.tags)?;

        let result = sqlx::query(
            "INSERT INTO products \
             (name, description, price, currency, genre, tags, is_active, external_id, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price)
        .bind(&product.currency)
        .bind(&product.genre)
        .bind(&tags_json)
        .bind(product.is_active as i64)
        .bind(&product.external_id)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| LeadflowError::Storage(format!("insert failed: {e}")))?;

        self.get_product(result.last_insert_rowid()).await
    }

    /// Fetch one product by id.
    pub async fn get_product(&self, id: i64) -> Result<Product, LeadflowError> {
        let row: Option<ProductRow> = sqlx::query_as(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LeadflowError::Storage(format!("query failed: {e}")))?;

        match row {
            Some(row) => row_to_product(row),
            None => Err(LeadflowError::NotFound(format!("product {id}"))),
        }
    }

    /// Apply a partial update. Only provided fields are touched; each
    /// goes through the same validation and normalization as create.
    pub async fn update_product(
        &self,
        id: i64,
        patch: ProductPatch,
    ) -> Result<Product, LeadflowError> {
        let patch = patch.validated()?;
        // Existence check up front so an empty patch still reports
        // NotFound correctly.
        let current = self.get_product(id).await?;
        if patch.is_empty() {
            return Ok(current);
        }

        let mut sets: Vec<&str> = Vec::new();
        let mut query = String::from("UPDATE products SET ");
        if patch.name.is_some() {
            sets.push("name = ?");
        }
        if patch.description.is_some() {
            sets.push("description = ?");
        }
        if patch.price.is_some() {
            sets.push("price = ?");
        }
        if patch.currency.is_some() {
            sets.push("currency = ?");
        }
        if patch.genre.is_some() {
            sets.push("genre = ?");
        }
        if patch.tags.is_some() {
            sets.push("tags = ?");
        }
        if patch.is_active.is_some() {
            sets.push("is_active = ?");
        }
        if patch.external_id.is_some() {
            sets.push("external_id = ?");
        }
        sets.push("updated_at = ?");
        query.push_str(&sets.join(", "));
        query.push_str(" WHERE id = ?");

        let tags_json = match &patch.tags {
            Some(tags) => Some(serde_json::to_string(tags)?),
            None => None,
        };

        let mut q = sqlx::query(&query);
        if let Some(ref v) = patch.name {
            q = q.bind(v);
        }
        if let Some(ref v) = patch.description {
            q = q.bind(v);
        }
        if let Some(v) = patch.price {
            q = q.bind(v);
        }
        if let Some(ref v) = patch.currency {
            q = q.bind(v);
        }
        if let Some(ref v) = patch.genre {
            q = q.bind(v);
        }
        if let Some(ref v) = tags_json {
            q = q.bind(v);
        }
        if let Some(v) = patch.is_active {
            q = q.bind(v as i64);
        }
        if let Some(ref v) = patch.external_id {
            q = q.bind(v);
        }
        q = q.bind(fmt_ts(Utc::now())).bind(id);

        q.execute(&self.pool)
            .await
            .map_err(|e| LeadflowError::Storage(format!("update failed: {e}")))?;

        self.get_product(id).await
    }

    /// List active products matching the filter, ordered by id
    /// ascending. The ordering is what makes correlation results
    /// reproducible across calls.
    pub async fn list_active_products(
        &self,
        filter: &ProductFilter,
    ) -> Result<Vec<Product>, LeadflowError> {
        let rows: Vec<ProductRow> = match &filter.genre {
            Some(genre) => sqlx::query_as(&format!(
                "SELECT {PRODUCT_COLUMNS} FROM products \
                 WHERE is_active = 1 AND genre = ? ORDER BY id ASC"
            ))
            .bind(genre)
            .fetch_all(&self.pool)
            .await,
            None => {
                sqlx::query_as(&format!(
                    "SELECT {PRODUCT_COLUMNS} FROM products \
                     WHERE is_active = 1 ORDER BY id ASC"
                ))
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(|e| LeadflowError::Storage(format!("query failed: {e}")))?;

        let mut products = Vec::with_capacity(rows.len());
        for row in rows {
            products.push(row_to_product(row)?);
        }

        // Tags are a JSON column; the tag filter is applied after decode.
        if let Some(tag) = &filter.tag {
            let tag = tag.trim().to_lowercase();
            products.retain(|p| p.tags.iter().any(|t| *t == tag));
        }

        Ok(products)
    }

    /// Returns (total, active) product counts.
    pub async fn product_counts(&self) -> Result<(i64, i64), LeadflowError> {
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| LeadflowError::Storage(format!("query failed: {e}")))?;
        let (active,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM products WHERE is_active = 1")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| LeadflowError::Storage(format!("query failed: {e}")))?;
        Ok((total, active))
    }
}
