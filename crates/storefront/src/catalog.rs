//! Cached catalog reads.
//!
//! Products, categories, filter facets and catalogues are cached for five
//! minutes using `moka`. List reads never block a page: a failed fetch logs a
//! warning and yields an empty collection. Single-item lookups propagate
//! their errors so a missing product can be told apart from an outage.

use std::time::Duration;

use moka::future::Cache;
use pashmiya_core::{CatalogueId, ProductId};
use tracing::{debug, instrument, warn};

use crate::api::{
    ApiClient, ApiError, Catalogue, CatalogueQuery, Category, FilterOptions, Product,
    ProductQuery,
};

/// Cache key for catalog reads.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
enum CacheKey {
    Product(ProductId),
    Products(ProductQuery),
    Categories,
    Filters,
    Catalogue(CatalogueId),
    Catalogues(CatalogueQuery),
}

/// Cached value types.
#[derive(Debug, Clone)]
enum CacheValue {
    Product(Box<Product>),
    Products(Vec<Product>),
    Categories(Vec<Category>),
    Filters(FilterOptions),
    Catalogue(Box<Catalogue>),
    Catalogues(Vec<Catalogue>),
}

/// Read-through cache over the catalog endpoints.
#[derive(Clone)]
pub struct Catalog {
    api: ApiClient,
    cache: Cache<CacheKey, CacheValue>,
}

impl Catalog {
    #[must_use]
    pub fn new(api: ApiClient) -> Self {
        let cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(Duration::from_secs(300)) // 5 minutes
            .build();
        Self { api, cache }
    }

    /// Products matching `query`, or an empty list if the service is down.
    #[instrument(skip(self))]
    pub async fn products(&self, query: &ProductQuery) -> Vec<Product> {
        let key = CacheKey::Products(query.clone());
        if let Some(CacheValue::Products(products)) = self.cache.get(&key).await {
            debug!("Cache hit for products");
            return products;
        }

        match self.api.get_products(query).await {
            Ok(products) => {
                self.cache
                    .insert(key, CacheValue::Products(products.clone()))
                    .await;
                products
            }
            Err(e) => {
                warn!(error = %e, "Failed to load products, showing none");
                Vec::new()
            }
        }
    }

    /// A single product.
    ///
    /// # Errors
    ///
    /// Returns error if the product is not found or the request fails.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn product(&self, id: ProductId) -> Result<Product, ApiError> {
        let key = CacheKey::Product(id);
        if let Some(CacheValue::Product(product)) = self.cache.get(&key).await {
            debug!("Cache hit for product");
            return Ok(*product);
        }

        let product = self.api.get_product(id).await?;
        self.cache
            .insert(key, CacheValue::Product(Box::new(product.clone())))
            .await;
        Ok(product)
    }

    /// All categories, or an empty list if the service is down.
    #[instrument(skip(self))]
    pub async fn categories(&self) -> Vec<Category> {
        if let Some(CacheValue::Categories(categories)) =
            self.cache.get(&CacheKey::Categories).await
        {
            return categories;
        }

        match self.api.get_categories().await {
            Ok(categories) => {
                self.cache
                    .insert(CacheKey::Categories, CacheValue::Categories(categories.clone()))
                    .await;
                categories
            }
            Err(e) => {
                warn!(error = %e, "Failed to load categories, showing none");
                Vec::new()
            }
        }
    }

    /// Filter facets, or empty facets if the service is down.
    #[instrument(skip(self))]
    pub async fn filters(&self) -> FilterOptions {
        if let Some(CacheValue::Filters(filters)) = self.cache.get(&CacheKey::Filters).await {
            return filters;
        }

        match self.api.get_filters().await {
            Ok(filters) => {
                self.cache
                    .insert(CacheKey::Filters, CacheValue::Filters(filters.clone()))
                    .await;
                filters
            }
            Err(e) => {
                warn!(error = %e, "Failed to load filters, showing none");
                FilterOptions::default()
            }
        }
    }

    /// Catalogues matching `query`, or an empty list if the service is down.
    #[instrument(skip(self))]
    pub async fn catalogues(&self, query: &CatalogueQuery) -> Vec<Catalogue> {
        let key = CacheKey::Catalogues(query.clone());
        if let Some(CacheValue::Catalogues(catalogues)) = self.cache.get(&key).await {
            return catalogues;
        }

        match self.api.get_catalogues(query).await {
            Ok(catalogues) => {
                self.cache
                    .insert(key, CacheValue::Catalogues(catalogues.clone()))
                    .await;
                catalogues
            }
            Err(e) => {
                warn!(error = %e, "Failed to load catalogues, showing none");
                Vec::new()
            }
        }
    }

    /// A single catalogue with its products.
    ///
    /// # Errors
    ///
    /// Returns error if the catalogue is not found or the request fails.
    #[instrument(skip(self), fields(catalogue_id = %id))]
    pub async fn catalogue(&self, id: CatalogueId) -> Result<Catalogue, ApiError> {
        let key = CacheKey::Catalogue(id);
        if let Some(CacheValue::Catalogue(catalogue)) = self.cache.get(&key).await {
            return Ok(*catalogue);
        }

        let catalogue = self.api.get_catalogue(id).await?;
        self.cache
            .insert(key, CacheValue::Catalogue(Box::new(catalogue.clone())))
            .await;
        Ok(catalogue)
    }

    /// Drop every cached entry.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }
}
