//! Parameter resolution policy.
//!
//! Pure functions deciding the effective value of each declared parameter
//! and whether a step is execution-eligible. All values are strings here;
//! the advisory `ParamKind` is validated, if at all, by the executing
//! capability.

use std::collections::BTreeMap;

use runbook_services::types::ParamSpec;

use crate::step::Step;

/// Effective value of one parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EffectiveValue {
    /// A non-empty user- or AI-supplied value.
    Bound(String),
    /// Fell back to the spec's non-empty default.
    Default(String),
    /// No usable value.
    Missing,
}

impl EffectiveValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            EffectiveValue::Bound(v) | EffectiveValue::Default(v) => Some(v),
            EffectiveValue::Missing => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, EffectiveValue::Missing)
    }
}

/// Resolve one parameter: bound value first, then default, else missing.
/// Empty strings count as absent on both levels.
pub fn effective_value(
    spec: &ParamSpec,
    bound_values: &BTreeMap<String, String>,
) -> EffectiveValue {
    if let Some(value) = bound_values.get(&spec.name) {
        if !value.is_empty() {
            return EffectiveValue::Bound(value.clone());
        }
    }
    match &spec.default_value {
        Some(default) if !default.is_empty() => EffectiveValue::Default(default.clone()),
        _ => EffectiveValue::Missing,
    }
}

/// First required parameter with no effective value, in declared order.
pub fn first_missing_required(step: &Step) -> Option<&ParamSpec> {
    step.param_specs
        .iter()
        .find(|spec| spec.required && effective_value(spec, &step.bound_values).is_missing())
}

/// Effective values for every resolvable parameter. Missing optional
/// parameters are omitted; a missing placeholder never reaches execution.
pub fn resolved_values(step: &Step) -> BTreeMap<String, String> {
    step.param_specs
        .iter()
        .filter_map(|spec| {
            effective_value(spec, &step.bound_values)
                .as_str()
                .map(|v| (spec.name.clone(), v.to_string()))
        })
        .collect()
}
