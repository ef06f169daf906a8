pub mod conclusion;
pub mod context;
pub mod decision;
pub mod details;
pub mod reason;

pub use conclusion::{Conclusion, Mode, RuleState};
pub use context::Context;
pub use decision::{Decision, RuleResult};
pub use details::{coerce_extra_value, Headers, IpDetails, RequestDetails, UNSUPPORTED_EXTRA_VALUE};
pub use reason::{EmailType, IdentifiedEntity, Reason};
