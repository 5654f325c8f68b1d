//! Priority-ranked masking strategies.
//!
//! A strategy is a self-contained masking unit. The [`StrategyManager`]
//! orders strategies by descending priority and hands each value to the
//! first one that wants it. This is an opt-in alternative to the engine's
//! fixed pipeline; the engine never consults strategies on its own.
//!
//! Priority bands used by the built-ins:
//!
//! | band   | range   | built-in                              |
//! |--------|---------|---------------------------------------|
//! | high   | >= 80   | [`FieldPathStrategy`] (80)            |
//! | medium | 50..80  | [`RegexStrategy`] (60)                |
//! | low    | < 50    | [`DataTypeStrategy`] (40)             |

mod builtin;
mod manager;

pub use builtin::{ConditionalStrategy, DataTypeStrategy, FieldPathStrategy, RegexStrategy};
pub use manager::{StrategyManager, StrategyStats};

use crate::error::Result;
use crate::record::Record;
use crate::value::Value;

/// A pluggable masking unit.
pub trait MaskingStrategy: Send + Sync {
    /// Unique name, used in errors and for removal.
    fn name(&self) -> &str;

    /// Higher runs first.
    fn priority(&self) -> i32;

    /// Whether this strategy wants the value at `path`.
    fn should_apply(&self, value: &Value, path: &str, record: &Record) -> bool;

    /// Produce the masked value.
    fn mask(&self, value: &Value, path: &str, record: &Record) -> Result<Value>;

    /// Self-check run at registration; `false` rejects the strategy.
    fn validate(&self) -> bool {
        true
    }
}
