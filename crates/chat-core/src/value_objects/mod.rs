//! Value objects - immutable types that represent domain concepts

mod retention;
mod snowflake;

pub use retention::{RetentionPolicy, RetentionPolicyParseError};
pub use snowflake::{Snowflake, SnowflakeParseError};
