//! In-memory representation of a decoded SAS dataset.

/// Variable storage type. SAS only knows two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarType {
    Numeric,
    Character,
}

/// Column metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub label: Option<String>,
    pub format: Option<String>,
    pub var_type: VarType,
    /// Storage length in bytes.
    pub length: usize,
}

/// One of the 28 SAS missing-value codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingValue {
    /// `.`
    Standard,
    /// `._`
    Underscore,
    /// `.A` through `.Z`
    Special(char),
}

/// A single cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Text(String),
    Missing(MissingValue),
}

impl Value {
    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing(_))
    }
}

/// A decoded dataset: variables in file order and row-major values.
///
/// Every row holds exactly `variables.len()` values.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub name: String,
    pub label: Option<String>,
    pub variables: Vec<Variable>,
    pub rows: Vec<Vec<Value>>,
}

impl Dataset {
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Values of one variable, top to bottom.
    pub fn column(&self, index: usize) -> impl Iterator<Item = &Value> + '_ {
        self.rows.iter().filter_map(move |row| row.get(index))
    }
}

/// Empty strings become `None`; used for optional labels and formats.
pub(crate) fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}
