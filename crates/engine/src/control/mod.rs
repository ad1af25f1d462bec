//! Control-flow composites: branching, iteration, and error recovery.

pub mod capture_errors;
pub mod conditional;
pub mod feature_enabled;
pub mod for_each;
pub mod switch;
pub mod try_except;
pub mod try_until;

pub use capture_errors::CaptureErrors;
pub use conditional::{Condition, Conditional, If};
pub use feature_enabled::FeatureEnabled;
pub use for_each::ForEach;
pub use switch::{Selector, Switch};
pub use try_except::TryExcept;
pub use try_until::{ExhaustedPolicy, TryUntil};

use crate::{context::Context, errors::FlowError};

/// Whether an error-recovery node may intercept `error` under the configured fatal policy.
pub(crate) fn may_intercept(error: &FlowError, context: &Context) -> bool {
    !error.is_fatal() || context.config().fatal_interceptable()
}
