//! Search filters over named text fields.

use regex::Regex;

use super::{Entity, Id, Repository, StoreResult};
use crate::models::City;

/// Comparison operator of a [`Condition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// Exact, case-sensitive equality.
    Eq,
    /// Case-sensitive substring match.
    Like,
    /// Case-insensitive substring match.
    ILike,
    /// Case-insensitive anchored pattern: `%` matches any run of characters,
    /// `_` exactly one.
    EqILike,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub field: String,
    pub op: Operator,
    pub value: String,
}

impl Condition {
    pub fn new(field: &str, op: Operator, value: &str) -> Self {
        Self {
            field: field.to_string(),
            op,
            value: value.to_string(),
        }
    }
}

/// Conjunction of conditions. An empty filter matches every record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    pub conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn eq(self, field: &str, value: &str) -> Self {
        self.with(Condition::new(field, Operator::Eq, value))
    }

    pub fn like(self, field: &str, value: &str) -> Self {
        self.with(Condition::new(field, Operator::Like, value))
    }

    pub fn ilike(self, field: &str, value: &str) -> Self {
        self.with(Condition::new(field, Operator::ILike, value))
    }

    pub fn eq_ilike(self, field: &str, pattern: &str) -> Self {
        self.with(Condition::new(field, Operator::EqILike, pattern))
    }

    /// Compile the filter once so it can be evaluated against many records.
    pub fn compile(&self) -> StoreResult<CompiledFilter> {
        let matchers = self
            .conditions
            .iter()
            .map(Matcher::compile)
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(CompiledFilter { matchers })
    }
}

pub struct CompiledFilter {
    matchers: Vec<(String, Matcher)>,
}

impl CompiledFilter {
    pub fn matches<T: Entity>(&self, value: &T) -> bool {
        self.matchers.iter().all(|(field, matcher)| {
            value
                .field(field)
                .map(|text| matcher.is_match(text))
                .unwrap_or(false)
        })
    }
}

enum Matcher {
    Exact(String),
    Contains(String),
    ContainsFolded(String),
    Pattern(Regex),
}

impl Matcher {
    fn compile(condition: &Condition) -> StoreResult<(String, Matcher)> {
        let matcher = match condition.op {
            Operator::Eq => Matcher::Exact(condition.value.clone()),
            Operator::Like => Matcher::Contains(condition.value.clone()),
            Operator::ILike => Matcher::ContainsFolded(condition.value.to_lowercase()),
            Operator::EqILike => Matcher::Pattern(pattern_to_regex(&condition.value)?),
        };
        Ok((condition.field.clone(), matcher))
    }

    fn is_match(&self, text: &str) -> bool {
        match self {
            Matcher::Exact(value) => text == value,
            Matcher::Contains(value) => text.contains(value.as_str()),
            Matcher::ContainsFolded(value) => text.to_lowercase().contains(value.as_str()),
            Matcher::Pattern(regex) => regex.is_match(text),
        }
    }
}

fn pattern_to_regex(pattern: &str) -> StoreResult<Regex> {
    let mut source = String::from("(?is)^");
    for c in pattern.chars() {
        match c {
            '%' => source.push_str(".*"),
            '_' => source.push('.'),
            other => source.push_str(&regex::escape(&other.to_string())),
        }
    }
    source.push('$');
    Ok(Regex::new(&source)?)
}

/// Turn substring searches on a city name into prefix searches.
///
/// `ncc like "ST"` becomes `ncc =ilike "ST%"`; any `%` in the original value
/// is dropped. Empty values are left alone.
pub fn rewrite_city_filter(filter: &Filter) -> Filter {
    let conditions = filter
        .conditions
        .iter()
        .map(|condition| {
            let substring = matches!(condition.op, Operator::Like | Operator::ILike);
            if condition.field == "ncc" && substring && !condition.value.is_empty() {
                let prefix = condition.value.replace('%', "");
                Condition::new("ncc", Operator::EqILike, &format!("{}%", prefix))
            } else {
                condition.clone()
            }
        })
        .collect();
    Filter { conditions }
}

/// City search with the name rewrite applied.
pub fn search_cities(cities: &dyn Repository<City>, filter: &Filter) -> StoreResult<Vec<Id>> {
    cities.search(&rewrite_city_filter(filter))
}
