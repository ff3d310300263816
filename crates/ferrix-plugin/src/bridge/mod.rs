//! Event bridge: registrations, handlers, and the root dispatcher.

pub mod dispatcher;
pub mod handler;
pub mod registration;

pub use dispatcher::{Dispatcher, Subscription};
pub use handler::{ClosureHandler, EventHandler, handler_fn};
pub use registration::EventRegistration;
