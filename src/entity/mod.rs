pub mod audit_logs;
pub mod cart_items;
pub mod order_items;
pub mod order_notes;
pub mod orders;
pub mod product_variants;
pub mod products;
pub mod users;
pub mod wishlist_items;

pub use audit_logs::Entity as AuditLogs;
pub use cart_items::Entity as CartItems;
pub use order_items::Entity as OrderItems;
pub use order_notes::Entity as OrderNotes;
pub use orders::Entity as Orders;
pub use product_variants::Entity as ProductVariants;
pub use products::Entity as Products;
pub use users::Entity as Users;
pub use wishlist_items::Entity as WishlistItems;
