//! # 缓存模块
//!
//! 路由映射的进程内缓存

pub mod mapping;

pub use mapping::MappingCache;
