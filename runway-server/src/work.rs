//! The task body run for each submission: a fixed number of steps with a
//! cooperative checkpoint before each one

use std::time::Duration;

use runway_core::TaskContext;
use tracing::debug;

/// Shape of one submitted task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkPlan {
    pub steps: u32,
    pub step_delay: Duration,
    /// Finish with an error instead of a result
    pub fail: bool,
}

impl Default for WorkPlan {
    fn default() -> Self {
        Self {
            steps: 10,
            step_delay: Duration::from_secs(1),
            fail: false,
        }
    }
}

/// Run `plan`, returning the number of completed steps
pub async fn run_steps(ctx: TaskContext, plan: WorkPlan) -> Result<u32, String> {
    for step in 0..plan.steps {
        ctx.checkpoint().await.map_err(|e| e.to_string())?;
        debug!(task_id = %ctx.task_id(), step, "Running step");
        tokio::time::sleep(plan.step_delay).await;
    }

    if plan.fail {
        return Err(format!("task {} failed after {} steps", ctx.task_id(), plan.steps));
    }
    Ok(plan.steps)
}
