//! Selfheal Browser - session driver for the application under test
//!
//! Provides:
//! - A [`BrowserDriver`] that navigates, signs in, fuzzes controls and captures screenshots
//! - Ordered console/network/page-error logs with request timing
//! - Selector fallback chains
//! - A [`KeyValueStore`] capability over the page's persisted state
//! - A deterministic [`ScriptedBackend`] for tests; Chrome over CDP with the `cdp` feature
//!
//! # Example
//!
//! ```rust,ignore
//! use selfheal_browser::{BrowserDriver, LaunchOptions};
//!
//! # async fn example() -> Result<(), selfheal_browser::BrowserError> {
//! let driver = BrowserDriver::launch(LaunchOptions::default(), "http://localhost:3000").await?;
//! driver.navigate("/login").await.into_result()?;
//! driver.close().await?;
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod backend;
#[cfg(feature = "cdp")]
pub mod cdp;
pub mod driver;
pub mod error;
pub mod events;
pub mod scripted;
pub mod selector;
pub mod store;

pub use backend::{BrowserBackend, ElementInfo, LaunchOptions, Viewport};
#[cfg(feature = "cdp")]
pub use cdp::CdpBackend;
pub use driver::{
    BrowserDriver, Credentials, InteractionKind, InteractionRecord, NavigationOutcome,
};
pub use error::BrowserError;
pub use events::{BrowserEvent, ConsoleMessage, EventLog, NetworkEvent, NetworkTiming, PageError};
pub use scripted::{ClickAction, ScriptedBackend, ScriptedElement, ScriptedPage};
pub use selector::{Selector, SelectorChain};
pub use store::{BrowserStore, KeyValueStore, MemoryStore, StoreKey};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
