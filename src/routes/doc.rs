use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        auth::{Claims, LoginRequest, LoginResponse, RegisterRequest},
        cart::{AddToCartRequest, CartList, UpdateCartItemRequest},
        orders::{
            CancelOrderRequest, OrderDetail, OrderLineInput, OrderList, PlaceOrderRequest,
            UpdateOrderStatusRequest,
        },
        payments::{
            CallbackAck, CallbackRequest, InitiatePaymentRequest, InitiatePaymentResponse,
            QueryStatusRequest, QueryStatusResponse,
        },
        products::{
            CreateProductRequest, LowStockList, LowStockProduct, ProductList,
            ProductWithVariants, UpdateProductRequest, VariantInput,
        },
        wishlist::{AddWishlistRequest, WishlistProductList},
    },
    models::{
        CartItem, NoteKind, Order, OrderItem, OrderNote, OrderStatus, Product, ProductVariant,
        User, WishlistItem,
    },
    response::{ApiResponse, Meta},
    routes::{admin, auth, cart, health, orders, params, payments, products, wishlist},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::login,
        auth::register,
        products::list_products,
        products::get_product,
        products::create_product,
        products::update_product,
        products::delete_product,
        cart::cart_list,
        cart::add_to_cart,
        cart::update_cart_item,
        cart::remove_from_cart,
        orders::list_orders,
        orders::place_order,
        orders::get_order,
        orders::cancel_order,
        payments::create_payment,
        payments::callback,
        payments::query_status,
        payments::payment_return,
        admin::list_all_orders,
        admin::get_order_admin,
        admin::update_order_status,
        admin::list_low_stock,
        admin::adjust_inventory,
        wishlist::list_wishlist,
        wishlist::add_to_wishlist,
        wishlist::remove_from_wishlist
    ),
    components(
        schemas(
            User,
            Product,
            ProductVariant,
            CartItem,
            Order,
            OrderItem,
            OrderNote,
            OrderStatus,
            NoteKind,
            WishlistItem,
            Claims,
            RegisterRequest,
            LoginRequest,
            LoginResponse,
            CreateProductRequest,
            UpdateProductRequest,
            VariantInput,
            ProductWithVariants,
            ProductList,
            LowStockProduct,
            LowStockList,
            AddToCartRequest,
            UpdateCartItemRequest,
            CartList,
            OrderLineInput,
            PlaceOrderRequest,
            CancelOrderRequest,
            UpdateOrderStatusRequest,
            OrderDetail,
            OrderList,
            InitiatePaymentRequest,
            InitiatePaymentResponse,
            CallbackRequest,
            CallbackAck,
            QueryStatusRequest,
            QueryStatusResponse,
            AddWishlistRequest,
            WishlistProductList,
            admin::LowStockQuery,
            admin::InventoryAdjustRequest,
            payments::ReturnParams,
            params::Pagination,
            params::ProductQuery,
            params::OrderListQuery,
            Meta,
            ApiResponse<ProductWithVariants>,
            ApiResponse<ProductList>,
            ApiResponse<OrderDetail>,
            ApiResponse<OrderList>,
            ApiResponse<InitiatePaymentResponse>,
            ApiResponse<QueryStatusResponse>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Authentication endpoints"),
        (name = "Products", description = "Catalog endpoints"),
        (name = "Cart", description = "Cart endpoints"),
        (name = "Orders", description = "Order endpoints"),
        (name = "Payments", description = "Payment gateway endpoints"),
        (name = "Admin", description = "Admin endpoints"),
        (name = "Wishlist", description = "Wishlist endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
