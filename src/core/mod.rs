pub mod config;
pub mod error;
pub mod value;

pub use config::{DaoConfig, LimitConfig, LimitDefault, QueryKeys};
pub use error::{CrudError, ErrorPayload, FieldError, Result};
pub use value::{KeyValue, Row, compare_values, get_in_row, get_present, set_in_row, split_path, values_equal};
