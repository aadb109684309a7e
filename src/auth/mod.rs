pub mod cookies;
pub mod password;
pub mod tokens;

pub use tokens::{Claims, TokenKeys, TokenPair, TokenType};
