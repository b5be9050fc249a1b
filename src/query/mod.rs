pub mod filter;
pub mod pagination;
pub mod parser;
pub mod request;
pub mod sort;

pub use filter::{CompareOp, Filter};
pub use pagination::Pagination;
pub use parser::{FilterError, FilterExpr, parse_filter, parse_filter_expr};
pub use request::{
    CountQuery, FindQuery, InsertQuery, ItemRequest, ItemsRequest, RemoveQuery,
    RemoveWithFilterQuery, ReplaceQuery, UpdateQuery, UpdateWithFilterQuery,
};
pub use sort::{SortBy, SortDirection};
