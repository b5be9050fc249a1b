use crate::core::value::display_literal;
use crate::schema::Field;
use serde_json::Value as JsonValue;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

/// Structured filter expression handed to the query engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Compare {
        field: Field,
        op: CompareOp,
        value: JsonValue,
    },
    In {
        field: Field,
        values: Vec<JsonValue>,
    },
    Like {
        field: Field,
        pattern: String,
        case_sensitive: bool,
    },
    IsNull {
        field: Field,
        negated: bool,
    },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn compare(field: &Field, op: CompareOp, value: JsonValue) -> Self {
        Self::Compare {
            field: field.clone(),
            op,
            value,
        }
    }

    pub fn eq(field: &Field, value: JsonValue) -> Self {
        Self::compare(field, CompareOp::Eq, value)
    }

    pub fn in_list(field: &Field, values: Vec<JsonValue>) -> Self {
        Self::In {
            field: field.clone(),
            values,
        }
    }

    pub fn like(field: &Field, pattern: impl Into<String>) -> Self {
        Self::Like {
            field: field.clone(),
            pattern: pattern.into(),
            case_sensitive: true,
        }
    }

    pub fn is_null(field: &Field) -> Self {
        Self::IsNull {
            field: field.clone(),
            negated: false,
        }
    }

    pub fn and(self, other: Filter) -> Self {
        match (self, other) {
            (Self::And(mut left), Self::And(right)) => {
                left.extend(right);
                Self::And(left)
            }
            (Self::And(mut left), right) => {
                left.push(right);
                Self::And(left)
            }
            (left, Self::And(mut right)) => {
                right.insert(0, left);
                Self::And(right)
            }
            (left, right) => Self::And(vec![left, right]),
        }
    }

    pub fn or(self, other: Filter) -> Self {
        match (self, other) {
            (Self::Or(mut left), Self::Or(right)) => {
                left.extend(right);
                Self::Or(left)
            }
            (Self::Or(mut left), right) => {
                left.push(right);
                Self::Or(left)
            }
            (left, Self::Or(mut right)) => {
                right.insert(0, left);
                Self::Or(right)
            }
            (left, right) => Self::Or(vec![left, right]),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// ANDs optional fragments together; `None` when every fragment is absent.
    pub fn all(filters: impl IntoIterator<Item = Option<Filter>>) -> Option<Filter> {
        filters
            .into_iter()
            .flatten()
            .reduce(|memo, next| memo.and(next))
    }

    /// Every field referenced by this filter.
    pub fn fields(&self) -> Vec<&Field> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a Field>) {
        match self {
            Self::Compare { field, .. }
            | Self::In { field, .. }
            | Self::Like { field, .. }
            | Self::IsNull { field, .. } => out.push(field),
            Self::And(filters) | Self::Or(filters) => {
                for filter in filters {
                    filter.collect_fields(out);
                }
            }
            Self::Not(inner) => inner.collect_fields(out),
        }
    }
}

fn write_group(f: &mut fmt::Formatter<'_>, filters: &[Filter], joiner: &str) -> fmt::Result {
    for (index, filter) in filters.iter().enumerate() {
        if index > 0 {
            f.write_str(joiner)?;
        }
        match filter {
            Filter::And(_) | Filter::Or(_) => write!(f, "({filter})")?,
            other => write!(f, "{other}")?,
        }
    }
    Ok(())
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compare { field, op, value } => {
                write!(f, "{field} {} {}", op.symbol(), display_literal(value))
            }
            Self::In { field, values } => {
                let rendered: Vec<String> = values.iter().map(display_literal).collect();
                write!(f, "{field} IN ({})", rendered.join(", "))
            }
            Self::Like {
                field,
                pattern,
                case_sensitive,
            } => {
                let keyword = if *case_sensitive { "LIKE" } else { "ILIKE" };
                write!(f, "{field} {keyword} '{pattern}'")
            }
            Self::IsNull { field, negated } => {
                if *negated {
                    write!(f, "{field} IS NOT NULL")
                } else {
                    write!(f, "{field} IS NULL")
                }
            }
            Self::And(filters) => write_group(f, filters, " AND "),
            Self::Or(filters) => write_group(f, filters, " OR "),
            Self::Not(inner) => write!(f, "NOT ({inner})"),
        }
    }
}
