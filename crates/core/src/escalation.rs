//! Threshold evaluation for financial approval escalation.
//!
//! Pure decision logic: given the submitted margin and contingency figures
//! and the requester's role, decide which approval levels are required.
//! Approver resolution, persistence and notification live in the workflow
//! layer.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::approval::{ApprovalLevel, TriggerReason};
use crate::domain::user::Role;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationInput {
    pub requester_role: Role,
    pub gp_percent: Decimal,
    pub contingency_percent: Decimal,
    pub triggers: Vec<TriggerReason>,
}

/// One approval requirement produced by threshold evaluation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredApproval {
    pub trigger: TriggerReason,
    pub level: ApprovalLevel,
    pub reason: &'static str,
}

/// Both dimensions are evaluated unless the caller narrows the set.
pub fn resolve_triggers(requested: &[TriggerReason]) -> Vec<TriggerReason> {
    let mut triggers: Vec<TriggerReason> = Vec::with_capacity(2);
    for trigger in requested {
        if !triggers.contains(trigger) {
            triggers.push(*trigger);
        }
    }
    if triggers.is_empty() {
        triggers = vec![TriggerReason::Gp, TriggerReason::Contingency];
    }
    triggers
}

/// Independent per trigger; both may fire in one call, producing one
/// approval requirement each.
pub fn evaluate(input: &EscalationInput) -> Vec<RequiredApproval> {
    let mut required = Vec::new();

    if input.triggers.contains(&TriggerReason::Contingency) {
        if let Some(requirement) =
            contingency_requirement(input.contingency_percent, input.requester_role)
        {
            required.push(requirement);
        }
    }

    if input.triggers.contains(&TriggerReason::Gp) {
        if let Some(requirement) = gp_requirement(input.gp_percent) {
            required.push(requirement);
        }
    }

    required
}

fn contingency_requirement(contingency_percent: Decimal, role: Role) -> Option<RequiredApproval> {
    let five = Decimal::new(5, 0);
    let ten = Decimal::new(10, 0);

    if contingency_percent < five {
        return Some(RequiredApproval {
            trigger: TriggerReason::Contingency,
            level: ApprovalLevel::BusinessHead,
            reason: "Contingency < 5%",
        });
    }

    // Sales Managers and Business Heads may self-apply the 5-15% band.
    if contingency_percent < ten && role == Role::SalesExecutive {
        return Some(RequiredApproval {
            trigger: TriggerReason::Contingency,
            level: ApprovalLevel::Manager,
            reason: "Contingency 5-9%",
        });
    }

    None
}

fn gp_requirement(gp_percent: Decimal) -> Option<RequiredApproval> {
    let five = Decimal::new(5, 0);
    let fifteen = Decimal::new(15, 0);

    if gp_percent <= five {
        return Some(RequiredApproval {
            trigger: TriggerReason::Gp,
            level: ApprovalLevel::Director,
            reason: "Sales Profit <= 5%",
        });
    }

    if gp_percent < fifteen {
        return Some(RequiredApproval {
            trigger: TriggerReason::Gp,
            level: ApprovalLevel::Manager,
            reason: "Sales Profit 5-14%",
        });
    }

    None
}

/// Tolerance for deciding whether resubmitted figures actually changed.
pub fn value_tolerance() -> Decimal {
    Decimal::new(1, 2)
}

fn within_tolerance(left: Decimal, right: Decimal) -> bool {
    (left - right).abs() <= value_tolerance()
}

/// True when the submitted figures are unchanged, within tolerance, for
/// every requested trigger. Unchanged figures mean the pending cycle is a
/// duplicate; any change means the pending cycle must be superseded.
pub fn values_unchanged(
    last_gp_percent: Decimal,
    last_contingency_percent: Decimal,
    submitted_gp_percent: Decimal,
    submitted_contingency_percent: Decimal,
    triggers: &[TriggerReason],
) -> bool {
    triggers.iter().all(|trigger| match trigger {
        TriggerReason::Gp => within_tolerance(last_gp_percent, submitted_gp_percent),
        TriggerReason::Contingency => {
            within_tolerance(last_contingency_percent, submitted_contingency_percent)
        }
    })
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use crate::domain::approval::{ApprovalLevel, TriggerReason};
    use crate::domain::user::Role;

    use super::{evaluate, resolve_triggers, values_unchanged, EscalationInput};

    fn input(gp: Decimal, contingency: Decimal, role: Role) -> EscalationInput {
        EscalationInput {
            requester_role: role,
            gp_percent: gp,
            contingency_percent: contingency,
            triggers: vec![TriggerReason::Gp, TriggerReason::Contingency],
        }
    }

    fn pct(value: i64, scale: u32) -> Decimal {
        Decimal::new(value, scale)
    }

    #[test]
    fn gp_at_exactly_five_goes_to_director() {
        let required = evaluate(&input(pct(500, 2), pct(12, 0), Role::SalesExecutive));
        let gp = required.iter().find(|r| r.trigger == TriggerReason::Gp).expect("gp requirement");
        assert_eq!(gp.level, ApprovalLevel::Director);
        assert_eq!(gp.reason, "Sales Profit <= 5%");
    }

    #[test]
    fn gp_just_above_five_goes_to_manager() {
        let required = evaluate(&input(pct(501, 2), pct(12, 0), Role::SalesExecutive));
        let gp = required.iter().find(|r| r.trigger == TriggerReason::Gp).expect("gp requirement");
        assert_eq!(gp.level, ApprovalLevel::Manager);
        assert_eq!(gp.reason, "Sales Profit 5-14%");
    }

    #[test]
    fn gp_just_below_fifteen_still_needs_manager() {
        let required = evaluate(&input(pct(1499, 2), pct(12, 0), Role::SalesExecutive));
        let gp = required.iter().find(|r| r.trigger == TriggerReason::Gp).expect("gp requirement");
        assert_eq!(gp.level, ApprovalLevel::Manager);
    }

    #[test]
    fn gp_at_fifteen_needs_no_approval() {
        let required = evaluate(&input(pct(1500, 2), pct(12, 0), Role::SalesExecutive));
        assert!(required.iter().all(|r| r.trigger != TriggerReason::Gp));
    }

    #[test]
    fn contingency_below_five_escalates_to_business_head_for_any_role() {
        for role in [Role::SalesExecutive, Role::SalesManager, Role::BusinessHead] {
            let required = evaluate(&input(pct(20, 0), pct(499, 2), role));
            let contingency = required
                .iter()
                .find(|r| r.trigger == TriggerReason::Contingency)
                .expect("contingency requirement");
            assert_eq!(contingency.level, ApprovalLevel::BusinessHead);
            assert_eq!(contingency.reason, "Contingency < 5%");
        }
    }

    #[test]
    fn mid_band_contingency_only_escalates_for_sales_executives() {
        let exec = evaluate(&input(pct(20, 0), pct(5, 0), Role::SalesExecutive));
        let requirement = exec
            .iter()
            .find(|r| r.trigger == TriggerReason::Contingency)
            .expect("contingency requirement");
        assert_eq!(requirement.level, ApprovalLevel::Manager);
        assert_eq!(requirement.reason, "Contingency 5-9%");

        for exempt in [Role::SalesManager, Role::BusinessHead] {
            let required = evaluate(&input(pct(20, 0), pct(7, 0), exempt));
            assert!(required.iter().all(|r| r.trigger != TriggerReason::Contingency));
        }
    }

    #[test]
    fn contingency_at_ten_needs_no_approval() {
        let required = evaluate(&input(pct(20, 0), pct(10, 0), Role::SalesExecutive));
        assert!(required.iter().all(|r| r.trigger != TriggerReason::Contingency));
    }

    #[test]
    fn both_dimensions_can_fire_in_one_call() {
        let required = evaluate(&input(pct(3, 0), pct(4, 0), Role::SalesExecutive));
        assert_eq!(required.len(), 2);
        assert!(required
            .iter()
            .any(|r| r.trigger == TriggerReason::Gp && r.level == ApprovalLevel::Director));
        assert!(required.iter().any(
            |r| r.trigger == TriggerReason::Contingency && r.level == ApprovalLevel::BusinessHead
        ));
    }

    #[test]
    fn healthy_figures_need_no_approval() {
        let required = evaluate(&input(pct(25, 0), pct(12, 0), Role::SalesExecutive));
        assert!(required.is_empty());
    }

    #[test]
    fn narrowed_triggers_skip_the_other_dimension() {
        let mut narrowed = input(pct(3, 0), pct(3, 0), Role::SalesExecutive);
        narrowed.triggers = vec![TriggerReason::Gp];

        let required = evaluate(&narrowed);
        assert_eq!(required.len(), 1);
        assert_eq!(required[0].trigger, TriggerReason::Gp);
    }

    #[test]
    fn empty_trigger_set_defaults_to_both() {
        assert_eq!(resolve_triggers(&[]), vec![TriggerReason::Gp, TriggerReason::Contingency]);
        assert_eq!(
            resolve_triggers(&[TriggerReason::Contingency, TriggerReason::Contingency]),
            vec![TriggerReason::Contingency]
        );
    }

    #[test]
    fn unchanged_values_within_tolerance_are_duplicates() {
        assert!(values_unchanged(
            pct(1000, 2),
            pct(700, 2),
            pct(1001, 2),
            pct(700, 2),
            &[TriggerReason::Gp, TriggerReason::Contingency],
        ));
    }

    #[test]
    fn a_changed_value_on_any_trigger_is_not_a_duplicate() {
        assert!(!values_unchanged(
            pct(1000, 2),
            pct(700, 2),
            pct(1000, 2),
            pct(900, 2),
            &[TriggerReason::Gp, TriggerReason::Contingency],
        ));
    }

    #[test]
    fn unrequested_triggers_do_not_affect_duplicate_detection() {
        // Contingency moved, but only gp was requested.
        assert!(values_unchanged(
            pct(1000, 2),
            pct(700, 2),
            pct(1000, 2),
            pct(900, 2),
            &[TriggerReason::Gp],
        ));
    }
}
