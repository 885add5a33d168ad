//! Extension state machine
//!
//! Derives the user-visible extension state from client snapshots and
//! user intent, once per browsing mode.

pub mod controller;
pub mod machine;
pub mod private;
pub mod state;

pub use controller::{BrowsingMode, ExtensionController};
pub use machine::{ExtensionMachine, Transition};
pub use private::PrivateBrowsingController;
pub use state::{ExtensionKind, ExtensionState, ProxyRule};
