//! Persistence sink over the shop's Postgres schema
//!
//! Idempotent upserts of the category tree and product records. The store's
//! own constraints are the true arbiter of "is this a duplicate": a unique
//! violation on insert is treated as "already saved", never as an error,
//! because two workers can race past the in-memory check.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::category::{CategoryNode, FALLBACK_CATEGORY_NAME, FALLBACK_CATEGORY_SLUG};
use crate::domain::product::{extract_item_id, ItemId, ProductRecord};
use crate::domain::services::ProductSink;

/// DECIMAL(10,2) ceiling of the products price columns, in whole won.
pub const MAX_PRICE_WON: i64 = 99_999_999;

/// 신규 상품/옵션의 기본 재고
const DEFAULT_STOCK: i32 = 10;

/// Clamp a price to the maximum representable value, logging when a value
/// had to be cut down. Never fails an insert over an oversized price.
pub fn clamp_price(value: i64, field: &str) -> i64 {
    if value > MAX_PRICE_WON {
        warn!(
            "Price overflow on {}: {} clamped to {}",
            field, value, MAX_PRICE_WON
        );
        MAX_PRICE_WON
    } else {
        value
    }
}

/// 부모 링크 backfill 판정: 저장된 `parent_slug`가 비어 있고 후보가 비어
/// 있지 않을 때만 후보를 반환한다. 비어 있지 않은 링크는 절대 덮어쓰지
/// 않는다.
fn parent_backfill<'a>(stored: Option<&str>, candidate: Option<&'a str>) -> Option<&'a str> {
    if stored.is_none_or(str::is_empty) {
        candidate.filter(|s| !s.is_empty())
    } else {
        None
    }
}

#[derive(Clone)]
pub struct PgProductRepository {
    pool: Arc<PgPool>,
}

impl PgProductRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect and verify the store is reachable. Failure here is fatal for
    /// the run: the harvester must not start without its sink.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .context("Failed to connect to the product database")?;
        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .context("Product database did not answer a probe query")?;
        Ok(Self::new(pool))
    }

    /// Insert one category node, or return the existing row's id. An empty
    /// stored parent link is backfilled from the candidate; a non-empty one
    /// is never overwritten.
    async fn ensure_category(
        &self,
        name: &str,
        slug: &str,
        parent_id: Option<i64>,
        parent_slug: Option<&str>,
        depth: u32,
    ) -> Result<i64> {
        let existing = sqlx::query("SELECT id, parent_slug FROM categories WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&*self.pool)
            .await?;

        if let Some(row) = existing {
            let id: i64 = row.get::<i32, _>("id").into();
            let stored_parent: Option<String> = row.get("parent_slug");

            if let Some(candidate) = parent_backfill(stored_parent.as_deref(), parent_slug) {
                debug!("Backfilling parent link of category '{}' -> '{}'", slug, candidate);
                sqlx::query(
                    "UPDATE categories SET parent_slug = $1, parent_id = $2 WHERE id = $3",
                )
                .bind(candidate)
                .bind(parent_id.map(|v| v as i32))
                .bind(id as i32)
                .execute(&*self.pool)
                .await?;
            }
            return Ok(id);
        }

        // Two workers can race to create the same slug; ON CONFLICT keeps
        // the insert idempotent and the re-select picks up the winner's row.
        let inserted = sqlx::query(
            r"
            INSERT INTO categories (name, slug, parent_id, parent_slug, depth, description)
            VALUES ($1, $2, $3, $4, $5, 'imported from crawler')
            ON CONFLICT (slug) DO NOTHING
            RETURNING id
            ",
        )
        .bind(name)
        .bind(slug)
        .bind(parent_id.map(|v| v as i32))
        .bind(parent_slug.unwrap_or(""))
        .bind(depth as i32)
        .fetch_optional(&*self.pool)
        .await?;

        if let Some(row) = inserted {
            return Ok(row.get::<i32, _>("id").into());
        }

        let row = sqlx::query("SELECT id FROM categories WHERE slug = $1")
            .bind(slug)
            .fetch_one(&*self.pool)
            .await?;
        Ok(row.get::<i32, _>("id").into())
    }
}

#[async_trait]
impl ProductSink for PgProductRepository {
    async fn load_known_item_ids(&self) -> Result<Vec<ItemId>> {
        let rows = sqlx::query(
            "SELECT description FROM products WHERE description IS NOT NULL AND description <> ''",
        )
        .fetch_all(&*self.pool)
        .await?;

        // description 첫 줄이 수집 당시의 원본 URL
        let ids: Vec<ItemId> = rows
            .into_iter()
            .filter_map(|row| {
                let description: String = row.get("description");
                description.lines().next().and_then(extract_item_id)
            })
            .collect();

        info!("Seeded {} known item ids from persisted products", ids.len());
        Ok(ids)
    }

    async fn upsert_category_path(&self, path: &[CategoryNode]) -> Result<i64> {
        if path.is_empty() {
            return self
                .ensure_category(FALLBACK_CATEGORY_NAME, FALLBACK_CATEGORY_SLUG, None, None, 1)
                .await;
        }

        let mut parent_id: Option<i64> = None;
        let mut leaf_id: i64 = 0;
        for node in path {
            leaf_id = self
                .ensure_category(
                    &node.name,
                    &node.slug,
                    parent_id,
                    node.parent_slug.as_deref(),
                    node.depth,
                )
                .await?;
            parent_id = Some(leaf_id);
        }
        Ok(leaf_id)
    }

    async fn save_product_if_new(&self, record: &ProductRecord, category_id: i64) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query("SELECT id FROM products WHERE name = $1 AND category_id = $2")
            .bind(&record.name)
            .bind(category_id as i32)
            .fetch_optional(&mut *tx)
            .await?;
        if existing.is_some() {
            return Ok(false);
        }

        let price = clamp_price(record.price, "price");
        let department_price = clamp_price(record.department_price, "department_price");

        let inserted = sqlx::query(
            r"
            INSERT INTO products
                (name, description, price, department_price, category_id, image_url, stock, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, true)
            RETURNING id
            ",
        )
        .bind(&record.name)
        .bind(record.description())
        .bind(price)
        .bind((department_price > 0).then_some(department_price))
        .bind(category_id as i32)
        .bind(&record.image_url)
        .bind(DEFAULT_STOCK)
        .fetch_one(&mut *tx)
        .await;

        let product_id: i32 = match inserted {
            Ok(row) => row.get("id"),
            // 다른 워커가 먼저 저장한 경우: 중복은 에러가 아니라 성공
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                debug!("Duplicate insert rejected by store: {}", record.name);
                return Ok(false);
            }
            Err(err) => return Err(err.into()),
        };

        for group in &record.options {
            for value in &group.values {
                sqlx::query(
                    r"
                    INSERT INTO product_options
                        (product_id, option_name, option_value, price_adjustment, stock)
                    VALUES ($1, $2, $3, $4, $5)
                    ON CONFLICT DO NOTHING
                    ",
                )
                .bind(product_id)
                .bind(&group.name)
                .bind(&value.value)
                .bind(value.price_adjustment)
                .bind(DEFAULT_STOCK)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(true)
    }
}
