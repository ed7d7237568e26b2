//! Product catalog service

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use shared::{ProductCategory, ProductType};

#[derive(Clone)]
pub struct ProductService {
    db: PgPool,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub stock: i32,
    pub category: String,
    pub product_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn product_type(&self) -> ProductType {
        ProductType::from_str(&self.product_type)
            .unwrap_or_else(|| ProductType::from_product_name(&self.name))
    }

    pub fn is_made_to_order(&self) -> bool {
        ProductCategory::from_str(&self.category) == Some(ProductCategory::MadeToOrder)
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductInput {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    #[validate(range(min = 0))]
    pub stock: Option<i32>,
    pub category: Option<ProductCategory>,
    pub product_type: Option<ProductType>,
}

impl ProductService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list_products(&self) -> AppResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>("SELECT * FROM products ORDER BY name")
            .fetch_all(&self.db)
            .await?;
        Ok(products)
    }

    pub async fn get_product(&self, product_id: Uuid) -> AppResult<Product> {
        sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
            .bind(product_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Product".to_string()))
    }

    pub async fn create_product(&self, input: CreateProductInput) -> AppResult<Product> {
        input.validate()?;
        if input.price < Decimal::ZERO {
            return Err(AppError::Validation {
                field: "price".to_string(),
                message: "Price cannot be negative".to_string(),
            });
        }

        let product_type = input
            .product_type
            .unwrap_or_else(|| ProductType::from_product_name(&input.name));
        // Stocked goods skip stage tracking and are produced in daily batches
        let category = input.category.unwrap_or(if product_type.requires_tracking() {
            ProductCategory::MadeToOrder
        } else {
            ProductCategory::Stocked
        });

        let product = sqlx::query_as::<_, Product>(
            r#"
            INSERT INTO products (name, description, price, stock, category, product_type)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(&input.name)
        .bind(&input.description)
        .bind(input.price)
        .bind(input.stock.unwrap_or(0))
        .bind(category.as_str())
        .bind(product_type.as_str())
        .fetch_one(&self.db)
        .await?;

        tracing::info!(product = %product.name, product_type = %product_type, "Product created");
        Ok(product)
    }
}
