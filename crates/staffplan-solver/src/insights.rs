//! Operator-facing insights derived from realized schedule metrics

use std::collections::BTreeMap;

use staffplan_core::{
    AvailabilityOutreach, HiringRecommendation, InsightThresholds, Insights, Period,
    RoleRebalancing, ScheduleMetrics, HOURS_EPSILON,
};

use crate::plan::Plan;

pub fn derive(plan: &Plan, metrics: &ScheduleMetrics, thresholds: &InsightThresholds) -> Insights {
    Insights {
        hiring: hiring(plan, metrics, thresholds),
        outreach: outreach(metrics, thresholds),
        rebalancing: rebalancing(metrics, thresholds),
    }
}

/// Periods of the day left short on at least `persistent_unmet_min_days` days
fn hiring(
    plan: &Plan,
    metrics: &ScheduleMetrics,
    thresholds: &InsightThresholds,
) -> Vec<HiringRecommendation> {
    let mut by_period: BTreeMap<Period, Vec<f64>> = BTreeMap::new();
    for entry in &metrics.periods {
        if entry.unmet > 0.0 {
            by_period.entry(entry.period).or_default().push(entry.unmet);
        }
    }

    by_period
        .into_iter()
        .filter(|(_, shortfalls)| shortfalls.len() >= thresholds.persistent_unmet_min_days)
        .map(|(period, shortfalls)| {
            let peak = shortfalls.iter().copied().fold(0.0, f64::max);
            // Period length is the same on every day; day 0 is representative
            let rate = hire_rate(plan, plan.period_index(0, period));
            let suggested_headcount = if rate > 0.0 {
                let needed = (peak / rate - HOURS_EPSILON).ceil();
                if needed >= u32::MAX as f64 {
                    u32::MAX
                } else {
                    needed as u32
                }
            } else {
                0
            };
            HiringRecommendation {
                period,
                days_short: shortfalls.len(),
                total_unmet: shortfalls.iter().sum(),
                peak_unmet: peak,
                suggested_headcount,
            }
        })
        .collect()
}

/// Items one new hire adds in `period`: the best independent role, or when
/// every producer sits in a chain, the best chain's bottleneck stage
fn hire_rate(plan: &Plan, period: usize) -> f64 {
    let independent = plan
        .independent_roles()
        .into_iter()
        .map(|r| plan.capacity(r, period))
        .max()
        .unwrap_or(0);
    let hundredths = if independent > 0 {
        independent * 100
    } else {
        plan.chain_stages
            .iter()
            .zip(&plan.contribution_pct)
            .map(|(stages, pct)| {
                let bottleneck = stages.iter().map(|&r| plan.capacity(r, period)).min();
                bottleneck.unwrap_or(0) * pct
            })
            .max()
            .unwrap_or(0)
    };
    hundredths as f64 / 10_000.0
}

fn outreach(metrics: &ScheduleMetrics, thresholds: &InsightThresholds) -> Vec<AvailabilityOutreach> {
    metrics
        .employees
        .iter()
        .filter(|h| {
            h.preferred_hours > 0.0 && h.hours < thresholds.outreach_fraction * h.preferred_hours
        })
        .map(|h| AvailabilityOutreach {
            employee: h.employee.clone(),
            scheduled_hours: h.hours,
            preferred_hours: h.preferred_hours,
        })
        .collect()
}

/// Chains whose most frequent bottleneck recurs in enough of their active periods
fn rebalancing(metrics: &ScheduleMetrics, thresholds: &InsightThresholds) -> Vec<RoleRebalancing> {
    let mut counts: BTreeMap<&str, BTreeMap<&str, usize>> = BTreeMap::new();
    for output in &metrics.chains {
        *counts
            .entry(output.chain.as_str())
            .or_default()
            .entry(output.bottleneck.as_str())
            .or_default() += 1;
    }

    counts
        .into_iter()
        .filter_map(|(chain, roles)| {
            let active: usize = roles.values().sum();
            // Ties resolve to the alphabetically first role
            let (role, count) = roles
                .into_iter()
                .fold(None, |best: Option<(&str, usize)>, (role, count)| match best {
                    Some((_, top)) if top >= count => best,
                    _ => Some((role, count)),
                })?;
            let share = count as f64 / active as f64;
            (share >= thresholds.bottleneck_recurrence).then(|| RoleRebalancing {
                chain: chain.to_string(),
                role: role.to_string(),
                periods_bottlenecked: count,
                active_periods: active,
            })
        })
        .collect()
}
