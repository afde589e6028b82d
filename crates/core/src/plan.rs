//! Default phase and substep plan for a prospecting search.
//!
//! Starting a search pre-populates the session's status with every substep
//! below in `pending`, so observers can render the whole pipeline before any
//! work has happened.

use crate::workflow::{Priority, SubStep, WorkflowStage};

/// Number of pipeline phases (search, analysis, filtering, enrichment, scoring).
pub const PHASE_COUNT: u32 = 5;

/// A pipeline phase and the stage the job reports while running it.
#[derive(Debug, Clone, Copy)]
pub struct Phase {
    pub number: u32,
    pub name: &'static str,
    pub stage: WorkflowStage,
}

pub const PHASES: [Phase; PHASE_COUNT as usize] = [
    Phase {
        number: 1,
        name: "Company search",
        stage: WorkflowStage::Searching,
    },
    Phase {
        number: 2,
        name: "Company analysis",
        stage: WorkflowStage::Analyzing,
    },
    Phase {
        number: 3,
        name: "ICP filtering",
        stage: WorkflowStage::Filtering,
    },
    Phase {
        number: 4,
        name: "Data enrichment",
        stage: WorkflowStage::Enriching,
    },
    Phase {
        number: 5,
        name: "Prospect scoring",
        stage: WorkflowStage::Scoring,
    },
];

struct PlannedStep {
    id: &'static str,
    name: &'static str,
    description: &'static str,
    category: &'static str,
    priority: Priority,
    tools: &'static [&'static str],
}

const PLAN: &[PlannedStep] = &[
    PlannedStep {
        id: "1.1",
        name: "Build search queries",
        description: "Turn the request and ICP model into concrete search queries",
        category: "search",
        priority: Priority::High,
        tools: &["llm"],
    },
    PlannedStep {
        id: "1.2",
        name: "Search company sources",
        description: "Run the queries against company search providers",
        category: "search",
        priority: Priority::High,
        tools: &["search-api"],
    },
    PlannedStep {
        id: "1.3",
        name: "Deduplicate candidates",
        description: "Merge duplicate companies returned by different sources",
        category: "search",
        priority: Priority::Medium,
        tools: &[],
    },
    PlannedStep {
        id: "2.1",
        name: "Fetch company websites",
        description: "Collect homepage and about-page content for each candidate",
        category: "analysis",
        priority: Priority::Medium,
        tools: &["web-scraper"],
    },
    PlannedStep {
        id: "2.2",
        name: "Extract company profiles",
        description: "Summarise industry, size and offering from collected content",
        category: "analysis",
        priority: Priority::High,
        tools: &["llm"],
    },
    PlannedStep {
        id: "3.1",
        name: "Apply ICP filters",
        description: "Drop companies outside the ideal customer profile",
        category: "filtering",
        priority: Priority::High,
        tools: &["llm"],
    },
    PlannedStep {
        id: "3.2",
        name: "Apply exclusions",
        description: "Remove existing customers and excluded domains",
        category: "filtering",
        priority: Priority::Low,
        tools: &[],
    },
    PlannedStep {
        id: "4.1",
        name: "Enrich firmographics",
        description: "Add headcount, revenue and location data",
        category: "enrichment",
        priority: Priority::Medium,
        tools: &["enrichment-api"],
    },
    PlannedStep {
        id: "4.2",
        name: "Find decision makers",
        description: "Look up contacts matching the target personas",
        category: "enrichment",
        priority: Priority::Medium,
        tools: &["contact-api"],
    },
    PlannedStep {
        id: "5.1",
        name: "Score prospects",
        description: "Score every remaining company against the ICP model",
        category: "scoring",
        priority: Priority::High,
        tools: &["llm"],
    },
    PlannedStep {
        id: "5.2",
        name: "Rank results",
        description: "Order prospects by score and prepare the summary",
        category: "scoring",
        priority: Priority::Medium,
        tools: &[],
    },
];

/// Every planned substep, in pipeline order, all `pending`.
pub fn default_substeps() -> Vec<SubStep> {
    PLAN.iter()
        .map(|step| {
            SubStep::pending(
                step.id,
                step.name,
                step.description,
                step.category,
                step.priority,
                step.tools.iter().map(|t| t.to_string()).collect(),
            )
        })
        .collect()
}

/// Look up the phase a `"<phase>.<index>"` substep id belongs to.
pub fn phase_of(step_id: &str) -> Option<&'static Phase> {
    let number: u32 = step_id.split('.').next()?.parse().ok()?;
    PHASES.iter().find(|p| p.number == number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{step_order_key, SubStepStatus};

    #[test]
    fn plan_is_pending_and_ordered() {
        let steps = default_substeps();
        assert!(!steps.is_empty());
        assert!(steps.iter().all(|s| s.status == SubStepStatus::Pending));
        assert!(steps
            .windows(2)
            .all(|w| step_order_key(&w[0].id) < step_order_key(&w[1].id)));
    }

    #[test]
    fn every_step_belongs_to_a_phase() {
        for step in default_substeps() {
            assert!(phase_of(&step.id).is_some(), "no phase for {}", step.id);
        }
    }

    #[test]
    fn phases_match_stage_numbering() {
        for phase in PHASES {
            assert_eq!(phase.stage.phase(), Some(phase.number));
        }
    }

    #[test]
    fn phase_of_rejects_malformed_ids() {
        assert!(phase_of("x.1").is_none());
        assert!(phase_of("9.1").is_none());
        assert_eq!(phase_of("4.2").map(|p| p.name), Some("Data enrichment"));
    }
}
