use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::Expr;
use sea_orm::sea_query::extension::postgres::PgExpr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::products::{
        CreateProductRequest, ProductList, ProductWithVariants, UpdateProductRequest, VariantInput,
    },
    entity::{
        product_variants::{
            ActiveModel as VariantActive, Column as VariantCol, Entity as ProductVariants,
            Model as VariantModel,
        },
        products::{
            ActiveModel as ProductActive, Column, Entity as Products, Model as ProductModel,
        },
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Product, ProductVariant},
    response::{ApiResponse, Meta},
    routes::params::{ProductQuery, ProductSortBy, SortOrder},
    state::AppState,
};

pub async fn list_products(
    state: &AppState,
    query: ProductQuery,
) -> AppResult<ApiResponse<ProductList>> {
    let (page, limit, offset) = query.pagination.normalize();
    let mut condition = Condition::all();

    if let Some(search) = query.q.as_ref().filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search);
        condition = condition.add(
            Condition::any()
                .add(Expr::col(Column::Name).ilike(pattern.clone()))
                .add(Expr::col(Column::Description).ilike(pattern)),
        );
    }

    if let Some(category) = query.category.as_ref().filter(|s| !s.is_empty()) {
        condition = condition.add(Column::Category.eq(category.clone()));
    }

    if let Some(min_price) = query.min_price {
        condition = condition.add(Column::OriginalPrice.gte(min_price));
    }

    if let Some(max_price) = query.max_price {
        condition = condition.add(Column::OriginalPrice.lte(max_price));
    }

    let sort_by = query.sort_by.unwrap_or(ProductSortBy::CreatedAt);
    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
    let sort_col = match sort_by {
        ProductSortBy::CreatedAt => Column::CreatedAt,
        ProductSortBy::Price => Column::OriginalPrice,
        ProductSortBy::Name => Column::Name,
    };

    let mut finder = Products::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(sort_col),
        SortOrder::Desc => finder.order_by_desc(sort_col),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(product_from_entity)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Products", ProductList { items }, Some(meta)))
}

pub async fn get_product(state: &AppState, id: Uuid) -> AppResult<ApiResponse<ProductWithVariants>> {
    let product = Products::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let variants = ProductVariants::find()
        .filter(VariantCol::ProductId.eq(id))
        .order_by_asc(VariantCol::Size)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(variant_from_entity)
        .collect();

    Ok(ApiResponse::success(
        "Product",
        ProductWithVariants {
            product: product_from_entity(product),
            variants,
        },
        None,
    ))
}

pub async fn create_product(
    state: &AppState,
    user: &AuthUser,
    payload: CreateProductRequest,
) -> AppResult<ApiResponse<ProductWithVariants>> {
    ensure_admin(user)?;
    if payload.original_price < 0 || payload.sale_price.is_some_and(|p| p < 0) {
        return Err(AppError::BadRequest("price must not be negative".into()));
    }
    if payload.stock < 0 || payload.variants.iter().any(|v| v.quantity < 0) {
        return Err(AppError::BadRequest("stock must not be negative".into()));
    }

    let txn = state.orm.begin().await?;

    let id = Uuid::new_v4();
    let product = ProductActive {
        id: Set(id),
        name: Set(payload.name),
        category: Set(payload.category),
        original_price: Set(payload.original_price),
        sale_price: Set(payload.sale_price),
        description: Set(payload.description),
        status: Set(payload.status.unwrap_or_else(|| "active".to_string())),
        image: Set(payload.image),
        extra_images: Set(serde_json::json!(payload.extra_images)),
        stock: Set(payload.stock),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    let variants = insert_variants(&txn, id, &payload.variants).await?;
    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "product_create",
        Some("products"),
        Some(serde_json::json!({ "product_id": product.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Product created",
        ProductWithVariants {
            product: product_from_entity(product),
            variants,
        },
        None,
    ))
}

pub async fn update_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateProductRequest,
) -> AppResult<ApiResponse<ProductWithVariants>> {
    ensure_admin(user)?;

    let txn = state.orm.begin().await?;
    let product = Products::find_by_id(id)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut active: ProductActive = product.into();
    if let Some(name) = payload.name {
        active.name = Set(name);
    }
    if let Some(category) = payload.category {
        active.category = Set(Some(category));
    }
    if let Some(price) = payload.original_price {
        if price < 0 {
            return Err(AppError::BadRequest("price must not be negative".into()));
        }
        active.original_price = Set(price);
    }
    if let Some(sale_price) = payload.sale_price {
        if sale_price < 0 {
            return Err(AppError::BadRequest("price must not be negative".into()));
        }
        active.sale_price = Set(Some(sale_price));
    }
    if let Some(description) = payload.description {
        active.description = Set(Some(description));
    }
    if let Some(status) = payload.status {
        active.status = Set(status);
    }
    if let Some(image) = payload.image {
        active.image = Set(Some(image));
    }
    if let Some(extra_images) = payload.extra_images {
        active.extra_images = Set(serde_json::json!(extra_images));
    }
    if let Some(stock) = payload.stock {
        if stock < 0 {
            return Err(AppError::BadRequest("stock must not be negative".into()));
        }
        active.stock = Set(stock);
    }
    active.updated_at = Set(Utc::now().into());
    let product = active.update(&txn).await?;

    let variants = match payload.variants {
        Some(inputs) => {
            if inputs.iter().any(|v| v.quantity < 0) {
                return Err(AppError::BadRequest("stock must not be negative".into()));
            }
            ProductVariants::delete_many()
                .filter(VariantCol::ProductId.eq(id))
                .exec(&txn)
                .await?;
            insert_variants(&txn, id, &inputs).await?
        }
        None => ProductVariants::find()
            .filter(VariantCol::ProductId.eq(id))
            .all(&txn)
            .await?
            .into_iter()
            .map(variant_from_entity)
            .collect(),
    };

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "product_update",
        Some("products"),
        Some(serde_json::json!({ "product_id": id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Product updated",
        ProductWithVariants {
            product: product_from_entity(product),
            variants,
        },
        None,
    ))
}

pub async fn delete_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;

    let result = Products::delete_by_id(id).exec(&state.orm).await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "product_delete",
        Some("products"),
        Some(serde_json::json!({ "product_id": id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Product deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

async fn insert_variants(
    txn: &sea_orm::DatabaseTransaction,
    product_id: Uuid,
    inputs: &[VariantInput],
) -> AppResult<Vec<ProductVariant>> {
    let mut variants = Vec::with_capacity(inputs.len());
    for input in inputs {
        let model = VariantActive {
            id: Set(Uuid::new_v4()),
            product_id: Set(product_id),
            size: Set(input.size.clone()),
            color: Set(input.color.clone()),
            quantity: Set(input.quantity),
        }
        .insert(txn)
        .await?;
        variants.push(variant_from_entity(model));
    }
    Ok(variants)
}

pub(crate) fn product_from_entity(model: ProductModel) -> Product {
    Product {
        id: model.id,
        name: model.name,
        category: model.category,
        original_price: model.original_price,
        sale_price: model.sale_price,
        description: model.description,
        status: model.status,
        image: model.image,
        extra_images: model.extra_images,
        stock: model.stock,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    }
}

pub(crate) fn variant_from_entity(model: VariantModel) -> ProductVariant {
    ProductVariant {
        id: model.id,
        product_id: model.product_id,
        size: model.size,
        color: model.color,
        quantity: model.quantity,
    }
}
