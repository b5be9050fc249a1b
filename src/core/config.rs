/// Maximum number of joins a textual field path may traverse.
pub const DEFAULT_MAX_JOIN_DEPTH: usize = 3;

/// Number of resolved field paths kept per data-access object.
pub const DEFAULT_PATH_CACHE_CAPACITY: usize = 512;

/// Limit applied when a find request does not specify one.
pub const DEFAULT_REQUEST_LIMIT: u64 = 50;

/// Largest limit a find request may ask for.
pub const DEFAULT_MAX_REQUEST_LIMIT: u64 = 500;

/// Data-access configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaoConfig {
    /// Paths whose join depth exceeds this are rejected
    pub max_join_depth: usize,

    /// Capacity of the LRU cache of resolved field paths
    pub path_cache_capacity: usize,
}

impl DaoConfig {
    pub fn new() -> Self {
        Self {
            max_join_depth: DEFAULT_MAX_JOIN_DEPTH,
            path_cache_capacity: DEFAULT_PATH_CACHE_CAPACITY,
        }
    }

    /// Set the maximum join depth
    pub fn max_join_depth(mut self, depth: usize) -> Self {
        self.max_join_depth = depth;
        self
    }

    /// Set the path cache capacity (clamped to at least 1)
    pub fn path_cache_capacity(mut self, capacity: usize) -> Self {
        self.path_cache_capacity = capacity.max(1);
        self
    }
}

impl Default for DaoConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Names of the query-string keys read by the find pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryKeys {
    pub fields: String,
    pub filter: String,
    pub sorts: String,
    pub offset: String,
    pub limit: String,
}

impl Default for QueryKeys {
    fn default() -> Self {
        Self {
            fields: "fields".to_string(),
            filter: "filter".to_string(),
            sorts: "sorts".to_string(),
            offset: "offset".to_string(),
            limit: "limit".to_string(),
        }
    }
}

impl QueryKeys {
    pub fn fields(mut self, key: &str) -> Self {
        self.fields = key.to_string();
        self
    }

    pub fn filter(mut self, key: &str) -> Self {
        self.filter = key.to_string();
        self
    }

    pub fn sorts(mut self, key: &str) -> Self {
        self.sorts = key.to_string();
        self
    }

    pub fn offset(mut self, key: &str) -> Self {
        self.offset = key.to_string();
        self
    }

    pub fn limit(mut self, key: &str) -> Self {
        self.limit = key.to_string();
        self
    }
}

/// What an absent `limit` resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitDefault {
    Value(u64),
    /// Use the configured maximum (unbounded when there is none)
    UseMax,
}

impl Default for LimitDefault {
    fn default() -> Self {
        Self::Value(DEFAULT_REQUEST_LIMIT)
    }
}

/// Pagination bounds for a route group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitConfig {
    pub default_limit: LimitDefault,
    /// `None` disables the maximum
    pub max_limit: Option<u64>,
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            default_limit: LimitDefault::default(),
            max_limit: Some(DEFAULT_MAX_REQUEST_LIMIT),
        }
    }
}

impl LimitConfig {
    /// Limit used when the request does not carry one; `None` means unbounded.
    pub fn resolved_default(&self) -> Option<u64> {
        match self.default_limit {
            LimitDefault::Value(limit) => Some(limit),
            LimitDefault::UseMax => self.max_limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limit_falls_back_to_max() {
        let config = LimitConfig {
            default_limit: LimitDefault::UseMax,
            max_limit: Some(200),
        };
        assert_eq!(config.resolved_default(), Some(200));

        let unbounded = LimitConfig {
            default_limit: LimitDefault::UseMax,
            max_limit: None,
        };
        assert_eq!(unbounded.resolved_default(), None);
        assert_eq!(LimitConfig::default().resolved_default(), Some(50));
    }

    #[test]
    fn query_keys_builder_overrides_single_key() {
        let keys = QueryKeys::default().limit("take");
        assert_eq!(keys.limit, "take");
        assert_eq!(keys.offset, "offset");
    }
}
