//! # 认证模块
//!
//! 租户管理令牌的签发与校验，以及认证头解析

pub mod header;
pub mod jwt;

pub use header::extract_bearer_token;
pub use jwt::{JwtManager, TOKEN_SUBJECT, TOKEN_TTL_DAYS, TokenClaims};
