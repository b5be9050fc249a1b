#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pagination {
    pub offset: u64,
    /// `None` is unbounded
    pub limit: Option<u64>,
}

impl Pagination {
    pub fn new(offset: u64, limit: Option<u64>) -> Self {
        Self { offset, limit }
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn limit(limit: u64) -> Self {
        Self {
            offset: 0,
            limit: Some(limit),
        }
    }

    /// Applies this window to an already ordered sequence.
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        let offset = usize::try_from(self.offset).unwrap_or(usize::MAX);
        let iter = items.into_iter().skip(offset);
        match self.limit {
            Some(limit) => iter
                .take(usize::try_from(limit).unwrap_or(usize::MAX))
                .collect(),
            None => iter.collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_windows_items() {
        let items: Vec<u32> = (0..10).collect();
        assert_eq!(Pagination::new(2, Some(3)).apply(items.clone()), vec![2, 3, 4]);
        assert_eq!(Pagination::new(8, None).apply(items.clone()), vec![8, 9]);
        assert!(Pagination::limit(0).apply(items).is_empty());
    }
}
