//! Named values: ranges, function tables and dynamic phases referenced by
//! loadings and analyses.

use crate::identifiers::{Id, Identified};

/// Interpolation (and prolongation) policy of a function table side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    Linear,
    Logarithmic,
    Constant,
    None,
}

/// Physical meaning of a table axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParaName {
    NoParaName,
    Frequency,
    Amortissement,
    ParaX,
    Instant,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Arithmetic sequence `start, start+step, ...` with `count` values.
    StepRange {
        id: Id,
        original_id: Option<Id>,
        start: f64,
        step: f64,
        count: usize,
    },
    /// `count` values spread between `start` and `end`.
    SpreadRange {
        id: Id,
        original_id: Option<Id>,
        start: f64,
        end: f64,
        count: usize,
    },
    /// Piecewise function with per-side interpolation and prolongation.
    FunctionTable {
        id: Id,
        original_id: Option<Id>,
        points: Vec<(f64, f64)>,
        interpolation: Interpolation,
        left_prolongation: Interpolation,
        right_prolongation: Interpolation,
        para_x: ParaName,
        para_y: ParaName,
    },
    /// Phase delay of a dynamic excitation.
    DynaPhase {
        id: Id,
        original_id: Option<Id>,
        delay: f64,
    },
}

impl Value {
    pub fn kind_label(&self) -> &'static str {
        match self {
            Value::StepRange { .. } => "step-range",
            Value::SpreadRange { .. } => "spread-range",
            Value::FunctionTable { .. } => "function-table",
            Value::DynaPhase { .. } => "dyna-phase",
        }
    }

    /// Expand range values to their explicit sequence.
    pub fn expand(&self) -> Vec<f64> {
        match self {
            Value::StepRange { start, step, count, .. } => {
                (0..*count).map(|i| start + step * i as f64).collect()
            }
            Value::SpreadRange { start, end, count, .. } => {
                if *count <= 1 {
                    vec![*start]
                } else {
                    let step = (end - start) / (*count as f64 - 1.0);
                    (0..*count).map(|i| start + step * i as f64).collect()
                }
            }
            Value::FunctionTable { points, .. } => points.iter().map(|(x, _)| *x).collect(),
            Value::DynaPhase { delay, .. } => vec![*delay],
        }
    }
}

impl Identified for Value {
    fn id(&self) -> Id {
        match self {
            Value::StepRange { id, .. }
            | Value::SpreadRange { id, .. }
            | Value::FunctionTable { id, .. }
            | Value::DynaPhase { id, .. } => *id,
        }
    }

    fn original_id(&self) -> Option<Id> {
        match self {
            Value::StepRange { original_id, .. }
            | Value::SpreadRange { original_id, .. }
            | Value::FunctionTable { original_id, .. }
            | Value::DynaPhase { original_id, .. } => *original_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_range_expands_arithmetically() {
        let range = Value::StepRange {
            id: 1,
            original_id: None,
            start: 10.0,
            step: 2.5,
            count: 4,
        };
        assert_eq!(range.expand(), vec![10.0, 12.5, 15.0, 17.5]);
    }

    #[test]
    fn spread_range_includes_both_ends() {
        let range = Value::SpreadRange {
            id: 1,
            original_id: None,
            start: 0.0,
            end: 1.0,
            count: 3,
        };
        assert_eq!(range.expand(), vec![0.0, 0.5, 1.0]);
    }
}
