mod filter;
mod pagination;
mod repository;

pub use filter::*;
pub use pagination::*;
pub use repository::*;
