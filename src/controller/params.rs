use super::request::ApiRequest;
use crate::core::{CrudError, LimitConfig, QueryKeys, Result};
use crate::query::Pagination;

/// Non-empty single value of a query key. Repeated keys are rejected.
pub(crate) fn single_query_value<'a, A>(
    request: &'a ApiRequest<A>,
    key: &str,
) -> Result<Option<&'a str>> {
    match request.query_value(key) {
        None => Ok(None),
        Some(value) => match value.as_single() {
            Some(value) if value.trim().is_empty() => Ok(None),
            Some(value) => Ok(Some(value)),
            None => Err(CrudError::bad_request(format!(
                "Query parameter {key} must not be repeated"
            ))),
        },
    }
}

/// Integral value of a numeric query parameter; fractions truncate.
fn parse_number(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    raw.parse::<i64>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|number| number.is_finite())
            .map(|number| number.trunc() as i64)
    })
}

/// Reads `offset` and `limit` from the query.
///
/// A non-numeric offset reads as 0. A non-numeric or absent limit takes the
/// configured default. Negative values clamp to 0, and a limit above the
/// maximum is rejected whether requested or configured.
pub fn parse_pagination<A>(
    request: &ApiRequest<A>,
    keys: &QueryKeys,
    limits: &LimitConfig,
) -> Result<Pagination> {
    let raw_limit = single_query_value(request, &keys.limit)?;
    let raw_offset = single_query_value(request, &keys.offset)?;

    let offset = raw_offset
        .and_then(parse_number)
        .map(|offset| offset.max(0) as u64)
        .unwrap_or(0);

    let limit = match raw_limit.and_then(parse_number) {
        Some(requested) => Some(requested.max(0) as u64),
        None => limits.resolved_default(),
    };
    if let (Some(limit), Some(max)) = (limit, limits.max_limit) {
        if limit > max {
            return Err(CrudError::bad_request(format!(
                "Cannot set limit above max query limit of {max}"
            )));
        }
    }

    Ok(Pagination::new(offset, limit))
}
