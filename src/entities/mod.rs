pub mod cart;
pub mod order;

pub use cart::Entity as Cart;
pub use order::Entity as Order;

pub type CartModel = cart::Model;
pub type OrderModel = order::Model;
