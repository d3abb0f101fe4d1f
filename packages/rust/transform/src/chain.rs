//! Ordered application of transform steps with addressing and placement.

use harvester_shared::{HarvesterError, Result, TransformStep};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::error::TransformError;
use crate::path::{JsonPath, Step, set_at};
use crate::registry::Transform;

/// A step whose `source` matched nothing. The step was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftMiss {
    pub index: usize,
    pub name: String,
    pub path: String,
}

/// Result of a chain: the transformed value plus the steps skipped on a miss.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainOutput {
    pub value: Value,
    pub misses: Vec<SoftMiss>,
}

/// Apply `steps` in order to a copy of `input`.
///
/// `scope` names the chain in logs and errors (`jobs.<name>.input`,
/// `jobs.<name>.outputs[<n>]`, ...). The first failing step aborts the chain.
#[instrument(skip_all, fields(scope = %scope, steps = steps.len()))]
pub fn apply_chain(scope: &str, steps: &[TransformStep], input: &Value) -> Result<ChainOutput> {
    let mut value = input.clone();
    let mut misses = Vec::new();

    for (index, step) in steps.iter().enumerate() {
        let wrap = |e: TransformError| HarvesterError::Transformation {
            scope: scope.to_string(),
            index,
            name: step.name.clone(),
            message: e.to_string(),
        };
        debug!(index, name = %step.name, "applying transformation");

        let transform = Transform::from_name(&step.name, &step.options).map_err(wrap)?;
        match apply_step(&transform, step, value).map_err(wrap)? {
            StepOutcome::Done(next) => value = next,
            StepOutcome::Missed(unchanged, path) => {
                warn!(index, name = %step.name, path = %path, "source matched nothing, step skipped");
                misses.push(SoftMiss {
                    index,
                    name: step.name.clone(),
                    path,
                });
                value = unchanged;
            }
        }
    }

    Ok(ChainOutput { value, misses })
}

enum StepOutcome {
    Done(Value),
    Missed(Value, String),
}

fn apply_step(
    transform: &Transform,
    step: &TransformStep,
    mut value: Value,
) -> std::result::Result<StepOutcome, TransformError> {
    if !(value.is_object() || value.is_array()) {
        if step.source.is_some() || step.destination.is_some() {
            warn!(
                name = transform.name(),
                "source/destination ignored for a non-container value"
            );
        }
        return transform.apply(value).map(StepOutcome::Done);
    }

    let Some(source) = step.source.as_deref() else {
        return match step.destination.as_deref() {
            Some(key) => {
                let result = transform.apply(value.clone())?;
                insert_root(&mut value, key, result)?;
                Ok(StepOutcome::Done(value))
            }
            None => transform.apply(value).map(StepOutcome::Done),
        };
    };

    let path = JsonPath::parse(source)?;
    let (locations, mut found): (Vec<Vec<Step>>, Vec<Value>) = path
        .locate(&value)
        .into_iter()
        .map(|m| (m.location, m.value.clone()))
        .unzip();

    let argument = match found.len() {
        0 => return Ok(StepOutcome::Missed(value, source.to_string())),
        1 => found.remove(0),
        _ => Value::Array(found),
    };
    let result = transform.apply(argument)?;

    if let Some(key) = step.destination.as_deref() {
        insert_root(&mut value, key, result)?;
        return Ok(StepOutcome::Done(value));
    }

    if let [location] = locations.as_slice() {
        if location.is_empty() {
            return Ok(StepOutcome::Done(result));
        }
        set_at(&mut value, location, result);
        return Ok(StepOutcome::Done(value));
    }

    match result {
        Value::Array(items) if items.len() == locations.len() => {
            for (location, item) in locations.iter().zip(items) {
                if !set_at(&mut value, location, item) {
                    debug!(?location, "match location vanished during write-back");
                }
            }
            Ok(StepOutcome::Done(value))
        }
        other => Err(TransformError::Placement(format!(
            "'{source}' matched {} locations but the result is not an array of that length (got {})",
            locations.len(),
            crate::value::kind_of(&other)
        ))),
    }
}

fn insert_root(
    value: &mut Value,
    key: &str,
    result: Value,
) -> std::result::Result<(), TransformError> {
    match value {
        Value::Object(map) => {
            map.insert(key.to_string(), result);
            Ok(())
        }
        _ => Err(TransformError::Placement(format!(
            "destination '{key}' requires an object root"
        ))),
    }
}
