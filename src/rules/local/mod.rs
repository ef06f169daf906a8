pub mod bot;
pub mod email;
pub mod filter;
pub mod sensitive_info;

pub use bot::{BotRule, BOT_DENY_TTL_MS};
pub use email::EmailRule;
pub use filter::{FilterAction, FilterRule};
pub use sensitive_info::SensitiveInfoRule;
