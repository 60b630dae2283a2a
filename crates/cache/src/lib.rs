pub mod expr_cache;

pub use expr_cache::ExpressionCache;
