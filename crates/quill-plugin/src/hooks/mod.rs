//! Hook system: registry, dispatcher, and hook definitions.

pub mod definitions;
pub mod dispatcher;
pub mod registry;

pub use definitions::{HookPayload, HookPoint};
pub use dispatcher::{BackgroundOutcome, DispatchOutcome, HookDispatcher};
pub use registry::{HookEntry, HookHandler, HookRegistry};
