//! Application services
//!
//! Each service owns one piece of client state and is the only writer of it.

pub mod cart_store;
pub mod checkout;
pub mod lifecycle;
pub mod notifications;
pub mod shipping;
pub mod submission;

pub use cart_store::CartStore;
pub use checkout::{CheckoutAssembler, CheckoutSource, DraftCache};
pub use lifecycle::{FeedScope, OrderFeed, OrderLifecycle};
pub use notifications::{connect_nats, NotificationBridge, Resync};
pub use shipping::ShippingInfoStore;
pub use submission::{OrderSubmissionService, SubmissionOutcome};
