//! Aggregates module
pub mod cart;
pub mod draft;
pub mod order;

pub use cart::{Cart, CartError, CartItem};
pub use draft::{CheckoutLine, DraftError, DraftItem, MenuItem, OrderDraft, PaymentOption};
pub use order::{authorize, Actor, Order, OrderLine, OrderStatus, PaymentMethod, PaymentStatus, Transition, TransitionError};
