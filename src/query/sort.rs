use crate::schema::Field;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    /// Parses a direction token. An empty token means ascending.
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "" | "asc" | "ascending" => Some(Self::Ascending),
            "desc" | "descending" => Some(Self::Descending),
            _ => None,
        }
    }

    pub fn is_descending(&self) -> bool {
        matches!(self, Self::Descending)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortBy {
    pub field: Field,
    pub direction: SortDirection,
}

impl SortBy {
    pub fn asc(field: &Field) -> Self {
        Self {
            field: field.clone(),
            direction: SortDirection::Ascending,
        }
    }

    pub fn desc(field: &Field) -> Self {
        Self {
            field: field.clone(),
            direction: SortDirection::Descending,
        }
    }
}
