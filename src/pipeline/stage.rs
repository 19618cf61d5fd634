//! Pipeline stage descriptors and the `Pipeline` builder.

use serde_json::{Map, Value, json};

use super::expr::{Expr, Filter};

/// Sort direction for one sort key.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    fn to_json(self) -> Value {
        match self {
            Self::Ascending => json!(1),
            Self::Descending => json!(-1),
        }
    }
}

/// Group accumulator.
#[derive(Clone, Debug, PartialEq)]
pub enum Accumulator {
    /// Mean of the numeric values; non-numeric values are ignored.
    Avg(Expr),
    /// Sum of the numeric values. `Sum(Expr::lit(1))` counts documents.
    Sum(Expr),
    /// Value from the first document of the group, in input order.
    First(Expr),
}

impl Accumulator {
    pub fn count() -> Self {
        Self::Sum(Expr::lit(1))
    }

    fn to_json(&self) -> Value {
        match self {
            Self::Avg(e) => json!({ "$avg": e.to_json() }),
            Self::Sum(e) => json!({ "$sum": e.to_json() }),
            Self::First(e) => json!({ "$first": e.to_json() }),
        }
    }
}

/// Output field of a project stage.
#[derive(Clone, Debug, PartialEq)]
pub enum Projection {
    /// Copy the field through unchanged (omitted when missing).
    Include,
    Computed(Expr),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stage {
    Match(Filter),
    Group {
        id: Expr,
        accumulators: Vec<(String, Accumulator)>,
    },
    Sort(Vec<(String, SortOrder)>),
    Limit(usize),
    Project(Vec<(String, Projection)>),
}

impl Stage {
    /// Extended-JSON keyword of this stage.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Match(_) => "$match",
            Self::Group { .. } => "$group",
            Self::Sort(_) => "$sort",
            Self::Limit(_) => "$limit",
            Self::Project(_) => "$project",
        }
    }

    pub fn to_json(&self) -> Value {
        let body = match self {
            Self::Match(filter) => filter.to_json(),
            Self::Group { id, accumulators } => {
                let mut obj = Map::new();
                obj.insert("_id".to_string(), id.to_json());
                for (name, acc) in accumulators {
                    obj.insert(name.clone(), acc.to_json());
                }
                Value::Object(obj)
            }
            Self::Sort(keys) => {
                let mut obj = Map::new();
                for (field, order) in keys {
                    obj.insert(field.clone(), order.to_json());
                }
                Value::Object(obj)
            }
            Self::Limit(n) => json!(n),
            Self::Project(fields) => {
                let mut obj = Map::new();
                for (name, proj) in fields {
                    let v = match proj {
                        Projection::Include => json!(1),
                        Projection::Computed(e) => e.to_json(),
                    };
                    obj.insert(name.clone(), v);
                }
                Value::Object(obj)
            }
        };
        let mut stage = Map::new();
        stage.insert(self.name().to_string(), body);
        Value::Object(stage)
    }
}

/// Ordered list of stages. Building a pipeline never touches a store.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn filter(self, filter: Filter) -> Self {
        self.stage(Stage::Match(filter))
    }

    pub fn group(
        self,
        id: Expr,
        accumulators: impl IntoIterator<Item = (&'static str, Accumulator)>,
    ) -> Self {
        let accumulators = accumulators
            .into_iter()
            .map(|(name, acc)| (name.to_string(), acc))
            .collect();
        self.stage(Stage::Group { id, accumulators })
    }

    pub fn sort(self, keys: impl IntoIterator<Item = (&'static str, SortOrder)>) -> Self {
        let keys = keys
            .into_iter()
            .map(|(field, order)| (field.to_string(), order))
            .collect();
        self.stage(Stage::Sort(keys))
    }

    pub fn limit(self, n: usize) -> Self {
        self.stage(Stage::Limit(n))
    }

    pub fn project(self, fields: impl IntoIterator<Item = (&'static str, Projection)>) -> Self {
        let fields = fields
            .into_iter()
            .map(|(name, proj)| (name.to_string(), proj))
            .collect();
        self.stage(Stage::Project(fields))
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Render as a JSON array of stage documents.
    pub fn to_json(&self) -> Value {
        Value::Array(self.stages.iter().map(Stage::to_json).collect())
    }
}

impl std::fmt::Display for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_json())
    }
}
