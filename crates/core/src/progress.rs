//! Derives the progress triple (`progress_percentage`, `status_stage`,
//! `status_label`) from an opportunity's accumulated data.
//!
//! Stateless re-derivation: every call walks the full milestone ladder
//! against the current document, so recomputing on unchanged data always
//! yields the same triple. The ladder is an explicit ordered list of steps;
//! the "must reach the previous threshold first" rule is carried by each
//! step's gate rather than scattered guards.

use crate::domain::opportunity::{ManualStatus, Opportunity, StatusStage};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProgressResult {
    pub progress_percentage: u8,
    pub status_stage: StatusStage,
    pub status_label: String,
}

impl ProgressResult {
    fn terminal(stage: StatusStage) -> Self {
        Self { progress_percentage: 0, status_stage: stage, status_label: stage.label().to_string() }
    }
}

struct Milestone {
    /// Minimum progress the ladder must already have reached.
    gate: u8,
    target: u8,
    stage: StatusStage,
    reached: fn(&Opportunity) -> bool,
}

/// Ordered milestone ladder. The 50% expense step is gated on 30, not 40:
/// costing may begin before sizing is settled, so an opportunity can reach
/// 50% with the sizing milestone still open. Observed production behavior,
/// kept as-is pending product clarification.
const LADDER: &[Milestone] = &[
    Milestone {
        gate: 10,
        target: 20,
        stage: StatusStage::Created,
        reached: |opp| matches!(&opp.requirement_summary, Some(s) if !s.trim().is_empty()),
    },
    Milestone {
        gate: 20,
        target: 30,
        stage: StatusStage::Created,
        reached: |opp| opp.details.scope_complete(),
    },
    Milestone {
        gate: 30,
        target: 40,
        stage: StatusStage::InProgress,
        reached: |opp| opp.details.sizing_complete(opp.participants),
    },
    Milestone {
        gate: 30,
        target: 50,
        stage: StatusStage::InProgress,
        reached: |opp| opp.expenses.any_line_entered(),
    },
    Milestone {
        gate: 50,
        target: 60,
        stage: StatusStage::Scheduled,
        reached: |opp| opp.resource_assigned(),
    },
    Milestone {
        gate: 50,
        target: 70,
        stage: StatusStage::Scheduled,
        reached: |opp| opp.documents.has_proposal(),
    },
    Milestone {
        gate: 50,
        target: 80,
        stage: StatusStage::Scheduled,
        reached: |opp| opp.documents.has_po(),
    },
    Milestone {
        gate: 80,
        target: 90,
        stage: StatusStage::Completed,
        reached: |opp| opp.documents.has_invoice(),
    },
    Milestone {
        gate: 90,
        target: 100,
        stage: StatusStage::Completed,
        reached: |opp| opp.documents.delivery_documents.gating_complete(),
    },
];

/// Pure function of the opportunity document; no side effects, no I/O.
pub fn compute(opportunity: &Opportunity) -> ProgressResult {
    match opportunity.common.status {
        ManualStatus::Cancelled => return ProgressResult::terminal(StatusStage::Cancelled),
        ManualStatus::Discontinued => return ProgressResult::terminal(StatusStage::Discontinued),
        ManualStatus::Open => {}
    }

    // Existence of the record is the first milestone.
    let mut progress = 10u8;
    let mut stage = StatusStage::Created;

    for milestone in LADDER {
        if progress >= milestone.gate && (milestone.reached)(opportunity) {
            progress = progress.max(milestone.target);
            stage = milestone.stage;
        }
    }

    ProgressResult {
        progress_percentage: progress,
        status_stage: stage,
        status_label: stage.label().to_string(),
    }
}

/// Apply the derived triple to the document. Client-supplied values for the
/// derived fields are always discarded.
pub fn apply(opportunity: &mut Opportunity) {
    let result = compute(opportunity);
    opportunity.progress_percentage = result.progress_percentage;
    opportunity.status_stage = result.status_stage;
    opportunity.status_label = result.status_label;
}

/// UI guidance only, keyed off the current decile; never used for control
/// flow.
pub fn required_fields_hint(opportunity: &Opportunity) -> &'static str {
    match compute(opportunity).progress_percentage {
        0 => "This opportunity is closed; no further input is expected",
        10 => "Add a requirement summary to move past creation",
        20 => "Complete the scope details for this opportunity type",
        30 => "Enter the sizing figures (participants, team size, or counts)",
        40 => "Record at least one expense line item",
        50 => "Assign an SME or enter trainer details",
        60 => "Upload the proposal document",
        70 => "Upload the purchase order document",
        80 => "Upload the invoice document",
        90 => "Upload the attendance, feedback, assessment and performance documents",
        _ => "All milestones complete",
    }
}
