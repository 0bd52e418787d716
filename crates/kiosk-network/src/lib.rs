//! Network side of the NFC kiosk.
//!
//! # Components
//!
//! - **WebhookDispatcher**: delivers each accepted scan to the business
//!   system, once, and classifies the answer
//! - **EventBroadcaster**: fans delivery results out to display clients
//! - **KioskServer**: serves the kiosk page and the WebSocket those clients
//!   subscribe through
//!
//! ```text
//! PollLoop ──► WebhookDispatcher ──► POST {"card_id": ..} ──► webhook
//!     │
//!     └──────► EventBroadcaster ──► KioskServer /ws ──► display clients
//! ```

pub mod broadcaster;
pub mod dispatcher;
mod error;
pub mod server;

pub use broadcaster::{EventBroadcaster, Subscription};
pub use dispatcher::{Dispatch, WebhookDispatcher};
pub use error::{NetworkError, Result};
pub use server::KioskServer;
