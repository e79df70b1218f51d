//! Stock mutation and cart-line primitives shared by the order and payment
//! workflows. Every function here expects to run inside the caller's
//! transaction; none of them commit.

use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait, PaginatorTrait, QueryFilter,
    QuerySelect, Set,
};
use uuid::Uuid;

use crate::entity::{
    cart_items::{ActiveModel as CartItemActive, Column as CartCol, Entity as CartItems},
    order_items::Model as OrderItemModel,
    product_variants::{
        ActiveModel as VariantActive, Column as VariantCol, Entity as ProductVariants,
    },
    products::{ActiveModel as ProductActive, Entity as Products, Model as ProductModel},
};
use crate::error::{AppError, AppResult};

/// Catalog price for one unit: the sale price wins when present and positive.
pub fn unit_price(original_price: i64, sale_price: Option<i64>) -> i64 {
    match sale_price {
        Some(price) if price > 0 => price,
        _ => original_price,
    }
}

/// Outcome of a lenient reservation attempt at payment confirmation.
pub enum LineOutcome {
    Reserved,
    Short { available: i32 },
    /// Product or variant disappeared since the payment session was opened.
    Gone,
}

/// Decrement stock for one requested line, or fail the whole operation.
/// The product row must already be locked by the caller.
pub async fn reserve_line(
    txn: &DatabaseTransaction,
    product: &ProductModel,
    size: &str,
    color: &str,
    quantity: i32,
) -> AppResult<()> {
    let variant = find_variant(txn, product.id, size, color).await?;

    match variant {
        Some(variant) => {
            if variant.quantity < quantity {
                return Err(AppError::InsufficientStock {
                    product: product.name.clone(),
                    size: variant.size.clone(),
                    color: variant.color.clone(),
                    available: variant.quantity,
                });
            }
            let remaining = variant.quantity - quantity;
            let mut active: VariantActive = variant.into();
            active.quantity = Set(remaining);
            active.update(txn).await?;
        }
        None => {
            if has_variants(txn, product.id).await? {
                return Err(AppError::BadRequest(format!(
                    "product {} has no {size}/{color} variant",
                    product.name
                )));
            }
            if product.stock < quantity {
                return Err(AppError::InsufficientStock {
                    product: product.name.clone(),
                    size: String::new(),
                    color: String::new(),
                    available: product.stock,
                });
            }
            let mut active: ProductActive = product.clone().into();
            active.stock = Set(product.stock - quantity);
            active.update(txn).await?;
        }
    }

    Ok(())
}

/// Reservation variant for confirmed payments: the money is already
/// captured, so a short or vanished line is reported instead of failing the
/// confirmation. Quantities still never go negative.
pub async fn reserve_line_lenient(
    txn: &DatabaseTransaction,
    item: &OrderItemModel,
) -> AppResult<LineOutcome> {
    let product = Products::find_by_id(item.product_id)
        .lock(LockType::Update)
        .one(txn)
        .await?;
    let Some(product) = product else {
        return Ok(LineOutcome::Gone);
    };

    match reserve_line(txn, &product, &item.size, &item.color, item.quantity).await {
        Ok(()) => Ok(LineOutcome::Reserved),
        Err(AppError::InsufficientStock { available, .. }) => Ok(LineOutcome::Short { available }),
        Err(AppError::BadRequest(_)) => Ok(LineOutcome::Gone),
        Err(err) => Err(err),
    }
}

/// Return a cancelled line's quantity to stock. Products or variants removed
/// from the catalog since the order was placed are skipped.
pub async fn release_line(txn: &DatabaseTransaction, item: &OrderItemModel) -> AppResult<()> {
    let product = Products::find_by_id(item.product_id)
        .lock(LockType::Update)
        .one(txn)
        .await?;
    let Some(product) = product else {
        return Ok(());
    };

    let variant = find_variant(txn, product.id, &item.size, &item.color).await?;
    match variant {
        Some(variant) => {
            let restored = variant.quantity + item.quantity;
            let mut active: VariantActive = variant.into();
            active.quantity = Set(restored);
            active.update(txn).await?;
        }
        None => {
            if has_variants(txn, product.id).await? {
                return Ok(());
            }
            let restored = product.stock + item.quantity;
            let mut active: ProductActive = product.into();
            active.stock = Set(restored);
            active.update(txn).await?;
        }
    }

    Ok(())
}

/// Drop cart lines matching a purchased (product, size, color) triple,
/// leaving unrelated lines untouched.
pub async fn prune_cart_line(
    txn: &DatabaseTransaction,
    user_id: Uuid,
    product_id: Uuid,
    size: &str,
    color: &str,
) -> AppResult<()> {
    CartItems::delete_many()
        .filter(CartCol::UserId.eq(user_id))
        .filter(CartCol::ProductId.eq(product_id))
        .filter(CartCol::Size.eq(size))
        .filter(CartCol::Color.eq(color))
        .exec(txn)
        .await?;
    Ok(())
}

/// Put a cancelled line back into the customer's cart, merging with any
/// existing line that shares the composite key.
pub async fn restore_cart_line(
    txn: &DatabaseTransaction,
    user_id: Uuid,
    item: &OrderItemModel,
) -> AppResult<()> {
    // Cart lines reference live products; a line for a product that left
    // the catalog cannot come back.
    let product_exists = Products::find_by_id(item.product_id)
        .one(txn)
        .await?
        .is_some();
    if !product_exists {
        return Ok(());
    }

    let existing = CartItems::find()
        .filter(CartCol::UserId.eq(user_id))
        .filter(CartCol::ProductId.eq(item.product_id))
        .filter(CartCol::Size.eq(item.size.as_str()))
        .filter(CartCol::Color.eq(item.color.as_str()))
        .lock(LockType::Update)
        .one(txn)
        .await?;

    match existing {
        Some(line) => {
            let merged = line.quantity + item.quantity;
            let mut active: CartItemActive = line.into();
            active.quantity = Set(merged);
            active.update(txn).await?;
        }
        None => {
            CartItemActive {
                id: Set(Uuid::new_v4()),
                user_id: Set(user_id),
                product_id: Set(item.product_id),
                name: Set(item.name.clone()),
                image: Set(item.image.clone()),
                price: Set(item.price),
                size: Set(item.size.clone()),
                color: Set(item.color.clone()),
                quantity: Set(item.quantity),
                created_at: NotSet,
            }
            .insert(txn)
            .await?;
        }
    }

    Ok(())
}

async fn find_variant(
    txn: &DatabaseTransaction,
    product_id: Uuid,
    size: &str,
    color: &str,
) -> AppResult<Option<crate::entity::product_variants::Model>> {
    let variant = ProductVariants::find()
        .filter(VariantCol::ProductId.eq(product_id))
        .filter(VariantCol::Size.eq(size))
        .filter(VariantCol::Color.eq(color))
        .lock(LockType::Update)
        .one(txn)
        .await?;
    Ok(variant)
}

async fn has_variants(txn: &DatabaseTransaction, product_id: Uuid) -> AppResult<bool> {
    let count = ProductVariants::find()
        .filter(VariantCol::ProductId.eq(product_id))
        .count(txn)
        .await?;
    Ok(count > 0)
}

#[cfg(test)]
mod tests {
    use super::unit_price;

    #[test]
    fn sale_price_overrides_list_price() {
        assert_eq!(unit_price(100_000, Some(80_000)), 80_000);
    }

    #[test]
    fn absent_or_zero_sale_price_falls_back() {
        assert_eq!(unit_price(100_000, None), 100_000);
        assert_eq!(unit_price(100_000, Some(0)), 100_000);
        assert_eq!(unit_price(100_000, Some(-1)), 100_000);
    }
}
