//! SQL text handling: comment stripping and the safety validator.

pub mod comments;
pub mod validator;

pub use comments::strip_comments;
pub use validator::{SqlSafetyValidator, UnsafeSql};
