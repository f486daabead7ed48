use clickhouse::query::Query;
use spanlight_core::predicate::{AttributePredicate, PredicateOp, parse_attribute_query};
use spanlight_core::time::DateRange;

pub(crate) enum SqlParam {
    Str(String),
    I64(i64),
}

/// Collects WHERE fragments and the values to bind, in order. All
/// user-supplied values go through `?` placeholders; only fixed column
/// names and interval fragments are ever interpolated into SQL text.
#[derive(Default)]
pub(crate) struct SpanFilter {
    conditions: Vec<String>,
    params: Vec<SqlParam>,
}

impl SpanFilter {
    /// `start >= range.start AND end <= range.end`: the span must lie
    /// entirely inside the window.
    pub fn time_window(range: &DateRange) -> Self {
        let mut filter = Self::default();
        filter.push("start_time_unix_nano >= ?", SqlParam::I64(range.start_unix_nano()));
        filter.push("end_time_unix_nano <= ?", SqlParam::I64(range.end_unix_nano()));
        filter
    }

    /// Bucket queries filter on start time alone so a span is counted
    /// in the bucket it began in.
    pub fn start_window(range: &DateRange) -> Self {
        let mut filter = Self::default();
        filter.push("start_time_unix_nano >= ?", SqlParam::I64(range.start_unix_nano()));
        filter.push("start_time_unix_nano <= ?", SqlParam::I64(range.end_unix_nano()));
        filter
    }

    /// Attach the user's search query: a predicate list when it parses,
    /// otherwise a broad equality match over names, ids, and attribute
    /// arrays.
    pub fn with_search_query(mut self, query: &str) -> Self {
        if query.is_empty() {
            return self;
        }
        match parse_attribute_query(query) {
            Some(predicates) => {
                for predicate in &predicates {
                    self.push_predicate(predicate);
                }
            }
            None => self.push_broad_match(query),
        }
        self
    }

    // Note: has(keys, k) AND has(values, v) does not pin key and value
    // to the same array index, so a span carrying {a: x, b: y} matches
    // a=y. Kept as the store contract the dashboard was built against.
    fn push_predicate(&mut self, predicate: &AttributePredicate) {
        let AttributePredicate { key, value, op } = predicate;
        match op {
            PredicateOp::Eq => {
                self.conditions.push(
                    "((has(resource_attributes.key, ?) AND has(resource_attributes.value, ?)) \
                     OR (has(span_attributes.key, ?) AND has(span_attributes.value, ?)))"
                        .to_string(),
                );
                for param in [key, value, key, value] {
                    self.params.push(SqlParam::Str(param.clone()));
                }
            }
            PredicateOp::Neq => {
                // Both attribute families must disagree with key=value:
                // the key is absent, or present with the value absent.
                self.conditions.push(
                    "((NOT has(resource_attributes.key, ?) \
                      OR (has(resource_attributes.key, ?) AND NOT has(resource_attributes.value, ?))) \
                     AND (NOT has(span_attributes.key, ?) \
                      OR (has(span_attributes.key, ?) AND NOT has(span_attributes.value, ?))))"
                        .to_string(),
                );
                for param in [key, key, value, key, key, value] {
                    self.params.push(SqlParam::Str(param.clone()));
                }
            }
        }
    }

    fn push_broad_match(&mut self, query: &str) {
        self.conditions.push(
            "(name = ? OR scope_name = ? OR trace_id = ? OR span_id = ? \
             OR has(resource_attributes.key, ?) OR has(resource_attributes.value, ?) \
             OR has(span_attributes.key, ?) OR has(span_attributes.value, ?))"
                .to_string(),
        );
        for _ in 0..8 {
            self.params.push(SqlParam::Str(query.to_string()));
        }
    }

    fn push(&mut self, condition: &str, param: SqlParam) {
        self.conditions.push(condition.to_string());
        self.params.push(param);
    }

    pub fn where_clause(&self) -> String {
        self.conditions.join(" AND ")
    }

    pub fn bind(&self, mut query: Query) -> Query {
        for param in &self.params {
            query = match param {
                SqlParam::Str(s) => query.bind(s),
                SqlParam::I64(i) => query.bind(i),
            };
        }
        query
    }

    #[cfg(test)]
    fn param_count(&self) -> usize {
        self.params.len()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn range() -> DateRange {
        DateRange {
            start: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap(),
        }
    }

    #[test]
    fn window_binds_both_bounds() {
        let filter = SpanFilter::time_window(&range());
        assert_eq!(filter.param_count(), 2);
        assert_eq!(
            filter.where_clause(),
            "start_time_unix_nano >= ? AND end_time_unix_nano <= ?"
        );
    }

    #[test]
    fn eq_predicate_checks_both_attribute_families() {
        let filter = SpanFilter::time_window(&range()).with_search_query("service.name=svc");
        assert_eq!(filter.param_count(), 2 + 4);
        let clause = filter.where_clause();
        assert!(clause.contains("has(resource_attributes.key, ?)"));
        assert!(clause.contains("OR (has(span_attributes.key, ?)"));
    }

    #[test]
    fn neq_predicate_requires_both_families_to_disagree() {
        let filter = SpanFilter::time_window(&range()).with_search_query("http.method!=GET");
        assert_eq!(filter.param_count(), 2 + 6);
        let clause = filter.where_clause();
        assert!(clause.contains("NOT has(resource_attributes.value, ?)"));
        assert!(clause.contains(") AND (NOT has(span_attributes.key, ?)"));
    }

    #[test]
    fn predicates_are_anded() {
        let filter = SpanFilter::time_window(&range()).with_search_query("a=b,c!=d");
        assert_eq!(filter.param_count(), 2 + 4 + 6);
        let ands = filter.where_clause().matches(" AND (").count();
        assert!(ands >= 1);
    }

    #[test]
    fn unparseable_query_broad_matches() {
        let filter = SpanFilter::time_window(&range()).with_search_query("GET /checkout");
        assert_eq!(filter.param_count(), 2 + 8);
        assert!(filter.where_clause().contains("name = ? OR scope_name = ?"));
    }

    #[test]
    fn empty_query_adds_nothing() {
        let filter = SpanFilter::time_window(&range()).with_search_query("");
        assert_eq!(filter.param_count(), 2);
    }
}
