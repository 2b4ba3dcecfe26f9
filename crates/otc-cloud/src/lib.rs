//! Open Telekom Cloud provider core
//!
//! Provider-agnostic machinery shared by every managed resource: the
//! wait-for-state poller, error classification and retries, the
//! configuration representation with change detection, and the lifecycle
//! driver that plans and applies create/update/delete.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                 Lifecycle driver                 │
//! │           (plan / refresh / apply)               │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                    otc-cloud                     │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │  trait Resource { create/read/update/... }│   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐ ┌────────────┐ ┌──────────┐   │
//! │  │ wait_for_state│ │   retry    │ │   diff   │   │
//! │  └──────────────┘ └────────────┘ └──────────┘   │
//! └───────┬─────────────────────────────────────────┘
//!         │
//! ┌───────▼───────────────────────────────────────┐
//! │  otc-cloud-services (SFS Turbo, DCS, RDS, ...)  │
//! └────────────────────────────────────────────────┘
//! ```

pub mod action;
pub mod clock;
pub mod data;
pub mod diff;
pub mod error;
pub mod resource;
pub mod retry;
pub mod status;
pub mod waiter;

// Re-exports
pub use action::{ActionResult, ActionType, ApplyResult, Lifecycle};
pub use clock::{Clock, ManualClock, TokioClock};
pub use data::{Projection, ResourceData};
pub use diff::{Delta, Tags, diff};
pub use error::{CloudError, ErrorClass, FieldError, FieldErrors, Result};
pub use resource::{Resource, Timeouts};
pub use retry::{RetryConfig, retry_transient};
pub use status::{ResourceStatus, StatusClass, Transition};
pub use waiter::{Observation, WaitConfig, wait_for_state};
