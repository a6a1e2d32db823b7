use crate::error::ResolveError;
use model::{CheckerSpec, PipelineStage};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Orders the enabled checkers of `stage` so that every checker comes after
/// the checkers it depends on. Among checkers that are ready at the same time
/// the one declared first wins.
///
/// Dependencies are scoped to the stage. A dependency naming a checker of
/// any other stage, earlier ones included, is an
/// [`ResolveError::UnknownDependency`]; stage order already guarantees
/// earlier stages have finished. Dependencies on disabled checkers of the
/// same stage are ignored here; the executor decides what to do with them.
pub fn resolve(stage: &PipelineStage) -> Result<Vec<&CheckerSpec>, ResolveError> {
    let order = resolve_order(stage)?;
    Ok(order.into_iter().map(|idx| &stage.checkers[idx]).collect())
}

/// Same as [`resolve`], returning indices into `stage.checkers`.
pub fn resolve_order(stage: &PipelineStage) -> Result<Vec<usize>, ResolveError> {
    let specs = &stage.checkers;

    let mut index: HashMap<&str, usize> = HashMap::with_capacity(specs.len());
    for (idx, spec) in specs.iter().enumerate() {
        if index.insert(spec.name.as_str(), idx).is_some() {
            return Err(ResolveError::DuplicateChecker {
                stage: stage.name.clone(),
                checker: spec.name.clone(),
            });
        }
    }

    // dependents[a] holds every b with an edge a -> b
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); specs.len()];
    let mut in_degree = vec![0usize; specs.len()];

    for (idx, spec) in specs.iter().enumerate() {
        if !spec.enabled {
            continue;
        }
        for dep in &spec.dependencies {
            let Some(&dep_idx) = index.get(dep.as_str()) else {
                return Err(ResolveError::UnknownDependency {
                    stage: stage.name.clone(),
                    checker: spec.name.clone(),
                    dependency: dep.clone(),
                });
            };
            if !specs[dep_idx].enabled {
                continue;
            }
            dependents[dep_idx].push(idx);
            in_degree[idx] += 1;
        }
    }

    let enabled = specs.iter().filter(|s| s.enabled).count();
    let mut ready: BTreeSet<usize> = (0..specs.len())
        .filter(|&idx| specs[idx].enabled && in_degree[idx] == 0)
        .collect();
    let mut order = Vec::with_capacity(enabled);

    while let Some(idx) = ready.pop_first() {
        order.push(idx);
        for &next in &dependents[idx] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.insert(next);
            }
        }
    }

    if order.len() < enabled {
        let remaining = specs
            .iter()
            .enumerate()
            .filter(|(idx, s)| s.enabled && in_degree[*idx] > 0)
            .map(|(_, s)| s.name.clone())
            .collect();
        return Err(ResolveError::Cycle {
            stage: stage.name.clone(),
            remaining,
        });
    }

    debug!(
        stage = %stage.name,
        order = ?order.iter().map(|&i| specs[i].name.as_str()).collect::<Vec<_>>(),
        "Resolved checker order"
    );
    Ok(order)
}
