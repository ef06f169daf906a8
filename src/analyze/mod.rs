pub mod basic;
pub mod mock;
pub mod traits;

pub use basic::{characteristic_value, BasicAnalyzer, IP_CHARACTERISTIC};
pub use mock::MockAnalyzer;
pub use traits::{AnalyzeError, Analyzer, BotReport, EmailOptions};
