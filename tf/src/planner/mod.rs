//! Parallelism planner

pub mod waves;

pub use waves::{ExecutionPlan, Wave, plan};

use std::collections::HashMap;

use crate::domain::Impact;
use crate::error::CoreError;
use crate::state::StateManager;

/// Plan a list from its stored state: pending tasks, in-list `depends_on`
/// edges, declared impacts, and the list's worker cap.
pub async fn plan_list(state: &StateManager, list_id: &str) -> Result<ExecutionPlan, CoreError> {
    let list = state
        .get_list(list_id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("List {}", list_id)))?;
    let tasks = state
        .list_tasks(list_id, Some(crate::domain::TaskStatus::Pending))
        .await?;
    let edges = state.edges_within_list(list_id).await?;

    let mut impacts: HashMap<String, Vec<Impact>> = HashMap::new();
    for impact in state.list_impacts_for_list(list_id).await? {
        impacts.entry(impact.task_id.clone()).or_default().push(impact);
    }

    plan(&tasks, &edges, &impacts, list.max_concurrent as usize)
}
