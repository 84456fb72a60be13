//! Budget consistency enforcement.
//!
//! Generator-produced numbers are approximate. One deterministic pass over
//! the document removes all drift against the caller's target total without
//! another round-trip to the provider:
//!
//! - item costs are rescaled proportionally, with the last item absorbing
//!   the rounding remainder so the total is exact by construction;
//! - inside each item, breakdowns and partner allocations are corrected by
//!   adjusting only the single largest entry — the fix stays auditable to
//!   one line item instead of smearing across all of them;
//! - activity estimates across work packages get the same largest-entry
//!   treatment against the document target.
//!
//! Enforcement never fails and has no effect beyond the document passed in.

use tracing::debug;

use crate::model::{BudgetItem, Document, PartnerAllocation, PartnerRef};

/// Establish all budget invariants on `doc` against the target total:
/// `Σ item.cost == target`, each item's breakdown and partner allocations
/// sum to its cost, and activity estimates (when tracked) sum to the target.
pub fn enforce_budget(doc: &mut Document, target: i64) {
    rebalance_items(doc, target);
    for item in &mut doc.budget {
        reconcile_breakdown(item);
        reconcile_allocations(item);
    }
    rebalance_activities(doc, target);
}

/// Scale item costs to the target. All items but the last are rounded; the
/// last takes `target - running` so equality is exact rather than a matter
/// of rounding luck.
fn rebalance_items(doc: &mut Document, target: i64) {
    let current: i64 = doc.budget.iter().map(|i| i.cost).sum();

    if current == 0 {
        if target > 0 {
            debug!("no costed budget items — synthesizing one covering {target}");
            doc.budget.push(covering_item(target, &doc.partners));
        }
        return;
    }
    if current == target {
        return;
    }

    let scale = target as f64 / current as f64;
    debug!(
        "rebalancing budget: current={current}, target={target}, scale={scale:.4}"
    );
    if !(0.9..=1.1).contains(&scale) {
        // Narrative text quoting specific amounts is not rewritten; a large
        // rescale is where the prose most likely no longer matches.
        debug!("budget rescale exceeds 10% — narrative amounts may now disagree");
    }

    let n = doc.budget.len();
    let mut running = 0i64;
    for item in doc.budget.iter_mut().take(n - 1) {
        item.cost = (item.cost as f64 * scale).round() as i64;
        running += item.cost;
    }
    if let Some(last) = doc.budget.last_mut() {
        last.cost = target - running;
    }
}

/// The single item synthesized when the generator produced no costed budget
/// at all. Partners, when present, get an even split with the last
/// allocation absorbing the remainder.
fn covering_item(target: i64, partners: &[PartnerRef]) -> BudgetItem {
    let partner_allocations = if partners.is_empty() {
        Vec::new()
    } else {
        let n = partners.len() as i64;
        let share = target / n;
        partners
            .iter()
            .enumerate()
            .map(|(i, p)| PartnerAllocation {
                partner: p.name.clone(),
                amount: if i as i64 == n - 1 {
                    target - share * (n - 1)
                } else {
                    share
                },
            })
            .collect()
    };

    BudgetItem {
        label: "Project budget".into(),
        cost: target,
        description: "Overall project budget across all partners and activities.".into(),
        breakdown: Vec::new(),
        partner_allocations,
    }
}

/// Align a non-empty breakdown with the item cost by adjusting only the
/// entry with the largest current total.
fn reconcile_breakdown(item: &mut BudgetItem) {
    if item.breakdown.is_empty() {
        return;
    }
    let sum: i64 = item.breakdown.iter().map(|b| b.total).sum();
    let diff = item.cost - sum;
    if diff == 0 {
        return;
    }
    if let Some(largest) = item.breakdown.iter_mut().max_by_key(|b| b.total) {
        debug!(
            "breakdown of {:?} off by {diff} — adjusting {:?}",
            item.label, largest.sub_item
        );
        largest.total += diff;
    }
}

/// Align non-empty partner allocations with the item cost, same rule.
fn reconcile_allocations(item: &mut BudgetItem) {
    if item.partner_allocations.is_empty() {
        return;
    }
    let sum: i64 = item.partner_allocations.iter().map(|a| a.amount).sum();
    let diff = item.cost - sum;
    if diff == 0 {
        return;
    }
    if let Some(largest) = item
        .partner_allocations
        .iter_mut()
        .max_by_key(|a| a.amount)
    {
        largest.amount += diff;
    }
}

/// Align activity estimates across all work packages with the target by
/// adjusting only the single largest estimate in the whole document.
/// Skipped when no activity carries an estimate — a document that does not
/// track budget at activity granularity gets no synthetic numbers.
fn rebalance_activities(doc: &mut Document, target: i64) {
    let total: i64 = doc
        .work_packages
        .iter()
        .flat_map(|wp| &wp.activities)
        .map(|a| a.estimated_budget)
        .sum();
    if total == 0 || total == target {
        return;
    }
    let diff = target - total;
    if let Some(largest) = doc
        .work_packages
        .iter_mut()
        .flat_map(|wp| wp.activities.iter_mut())
        .max_by_key(|a| a.estimated_budget)
    {
        debug!(
            "activity estimates off by {diff} — adjusting {:?}",
            largest.name
        );
        largest.estimated_budget += diff;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Activity, BreakdownEntry, WorkPackage};

    fn item(label: &str, cost: i64) -> BudgetItem {
        BudgetItem {
            label: label.into(),
            cost,
            ..Default::default()
        }
    }

    fn doc_with_items(items: Vec<BudgetItem>) -> Document {
        Document {
            budget: items,
            ..Default::default()
        }
    }

    #[test]
    fn rescale_hits_target_exactly() {
        // 180000 → 250000: item1 rounds to 138889, item2 takes the rest.
        let mut doc = doc_with_items(vec![item("a", 100_000), item("b", 80_000)]);
        enforce_budget(&mut doc, 250_000);
        assert_eq!(doc.budget[0].cost, 138_889);
        assert_eq!(doc.budget[1].cost, 111_111);
        assert_eq!(doc.budget.iter().map(|i| i.cost).sum::<i64>(), 250_000);
    }

    #[test]
    fn rescale_downwards() {
        let mut doc = doc_with_items(vec![item("a", 300), item("b", 500), item("c", 200)]);
        enforce_budget(&mut doc, 777);
        assert_eq!(doc.budget.iter().map(|i| i.cost).sum::<i64>(), 777);
    }

    #[test]
    fn single_item_takes_whole_target() {
        let mut doc = doc_with_items(vec![item("only", 123)]);
        enforce_budget(&mut doc, 90_000);
        assert_eq!(doc.budget[0].cost, 90_000);
    }

    #[test]
    fn zero_target_zeroes_everything() {
        let mut doc = doc_with_items(vec![item("a", 10), item("b", 20)]);
        enforce_budget(&mut doc, 0);
        assert_eq!(doc.budget.iter().map(|i| i.cost).sum::<i64>(), 0);
    }

    #[test]
    fn empty_budget_synthesizes_covering_item() {
        let mut doc = doc_with_items(vec![]);
        doc.partners = vec![
            PartnerRef {
                name: "Alpha".into(),
                ..Default::default()
            },
            PartnerRef {
                name: "Beta".into(),
                ..Default::default()
            },
            PartnerRef {
                name: "Gamma".into(),
                ..Default::default()
            },
        ];
        enforce_budget(&mut doc, 100_000);

        assert_eq!(doc.budget.len(), 1);
        let synthesized = &doc.budget[0];
        assert_eq!(synthesized.cost, 100_000);
        // 33333 + 33333 + 33334: even split, remainder on the last partner.
        let amounts: Vec<i64> = synthesized
            .partner_allocations
            .iter()
            .map(|a| a.amount)
            .collect();
        assert_eq!(amounts, [33_333, 33_333, 33_334]);
    }

    #[test]
    fn empty_budget_zero_target_stays_empty() {
        let mut doc = doc_with_items(vec![]);
        enforce_budget(&mut doc, 0);
        assert!(doc.budget.is_empty());
    }

    #[test]
    fn breakdown_corrected_on_largest_entry_only() {
        let mut doc = doc_with_items(vec![BudgetItem {
            label: "equipment".into(),
            cost: 1_000,
            breakdown: vec![
                BreakdownEntry {
                    sub_item: "sensors".into(),
                    quantity: 10,
                    unit_cost: 30,
                    total: 300,
                },
                BreakdownEntry {
                    sub_item: "gateway".into(),
                    quantity: 1,
                    unit_cost: 550,
                    total: 550,
                },
            ],
            ..Default::default()
        }]);
        enforce_budget(&mut doc, 1_000);

        let breakdown = &doc.budget[0].breakdown;
        // 850 ≠ 1000: the 150 gap lands entirely on the largest entry.
        assert_eq!(breakdown[0].total, 300);
        assert_eq!(breakdown[1].total, 700);
    }

    #[test]
    fn allocations_corrected_after_rescale() {
        let mut doc = doc_with_items(vec![BudgetItem {
            label: "staff".into(),
            cost: 100,
            partner_allocations: vec![
                PartnerAllocation {
                    partner: "Alpha".into(),
                    amount: 60,
                },
                PartnerAllocation {
                    partner: "Beta".into(),
                    amount: 40,
                },
            ],
            ..Default::default()
        }]);
        // Rescale doubles the item cost; the allocation gap goes to Alpha.
        enforce_budget(&mut doc, 200);
        assert_eq!(doc.budget[0].cost, 200);
        let allocations = &doc.budget[0].partner_allocations;
        assert_eq!(allocations[0].amount, 160);
        assert_eq!(allocations[1].amount, 40);
        assert_eq!(
            allocations.iter().map(|a| a.amount).sum::<i64>(),
            doc.budget[0].cost
        );
    }

    #[test]
    fn activity_estimates_corrected_on_largest() {
        let mut doc = doc_with_items(vec![item("all", 1_000)]);
        doc.work_packages = vec![
            WorkPackage {
                name: "WP1".into(),
                activities: vec![
                    Activity {
                        name: "survey".into(),
                        estimated_budget: 200,
                        ..Default::default()
                    },
                    Activity {
                        name: "build".into(),
                        estimated_budget: 500,
                        ..Default::default()
                    },
                ],
                ..Default::default()
            },
            WorkPackage {
                name: "WP2".into(),
                activities: vec![Activity {
                    name: "pilot".into(),
                    estimated_budget: 100,
                    ..Default::default()
                }],
                ..Default::default()
            },
        ];
        enforce_budget(&mut doc, 1_000);

        // 800 → 1000: only "build" moves.
        assert_eq!(doc.work_packages[0].activities[0].estimated_budget, 200);
        assert_eq!(doc.work_packages[0].activities[1].estimated_budget, 700);
        assert_eq!(doc.work_packages[1].activities[0].estimated_budget, 100);
    }

    #[test]
    fn untracked_activities_left_alone() {
        let mut doc = doc_with_items(vec![item("all", 1_000)]);
        doc.work_packages = vec![WorkPackage {
            name: "WP1".into(),
            activities: vec![Activity::default(), Activity::default()],
            ..Default::default()
        }];
        enforce_budget(&mut doc, 1_000);
        assert!(
            doc.work_packages[0]
                .activities
                .iter()
                .all(|a| a.estimated_budget == 0)
        );
    }

    #[test]
    fn enforcement_is_idempotent() {
        let mut doc = doc_with_items(vec![item("a", 123), item("b", 456), item("c", 789)]);
        enforce_budget(&mut doc, 50_000);
        let after_first: Vec<i64> = doc.budget.iter().map(|i| i.cost).collect();
        enforce_budget(&mut doc, 50_000);
        let after_second: Vec<i64> = doc.budget.iter().map(|i| i.cost).collect();
        assert_eq!(after_first, after_second);
    }
}
