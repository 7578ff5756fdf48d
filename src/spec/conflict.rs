use crate::core::Value;

/// Which uniqueness constraint an upsert resolves against.
#[derive(Debug, Clone, PartialEq)]
pub enum ConflictTarget {
    PrimaryKey,
    /// Field or many-to-one edge names forming a unique set.
    Columns(Vec<String>),
}

impl ConflictTarget {
    pub fn columns<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        ConflictTarget::Columns(names.into_iter().map(Into::into).collect())
    }
}

/// Per-column choice for a custom conflict resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum Merge {
    New,
    Existing,
    Value(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConflictPolicy {
    /// Overwrite every written column with the attempted insert's value,
    /// except the key, immutable fields and the listed ones.
    UpdateNewValues { ignore: Vec<String> },
    /// Keep the existing row untouched; its id is still reported.
    Ignore,
    /// Skip the insert silently.
    DoNothing,
    Custom(Vec<(String, Merge)>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OnConflict {
    pub target: ConflictTarget,
    pub policy: ConflictPolicy,
}

/// Collects the per-column rules of a custom resolution.
#[derive(Debug, Default)]
pub struct Resolver {
    rules: Vec<(String, Merge)>,
}

impl Resolver {
    pub fn new(mut self, field: &str) -> Self {
        self.rules.push((field.to_string(), Merge::New));
        self
    }

    pub fn existing(mut self, field: &str) -> Self {
        self.rules.push((field.to_string(), Merge::Existing));
        self
    }

    pub fn value(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.rules.push((field.to_string(), Merge::Value(value.into())));
        self
    }

    pub(crate) fn into_rules(self) -> Vec<(String, Merge)> {
        self.rules
    }
}
