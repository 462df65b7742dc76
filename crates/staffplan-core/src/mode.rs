//! Scheduling mode: flexible slots or fixed shifts.

use serde::{Deserialize, Serialize};

use crate::{GridForm, Rules, RulesError};

/// A fixed shift within a day, expressed in slots
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftTemplate {
    pub start_slot: usize,
    pub length_slots: usize,
}

impl ShiftTemplate {
    pub fn new(start_slot: usize, length_slots: usize) -> Self {
        Self {
            start_slot,
            length_slots,
        }
    }

    /// One past the last slot covered
    pub fn end_slot(&self) -> usize {
        self.start_slot + self.length_slots
    }
}

/// How employees are placed on the timeline.
///
/// One model builder entry point dispatches on this tag; callers only choose
/// the variant at configuration time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SchedulingMode {
    /// Employees are assigned slot by slot
    #[default]
    SlotBased,
    /// Employees are assigned whole shifts
    FixedShift {
        shifts_per_day: usize,
        /// Explicit shift layout; empty means an even partition of the day
        #[serde(default)]
        templates: Vec<ShiftTemplate>,
    },
}

impl SchedulingMode {
    /// Derive the mode the rules ask for
    pub fn from_rules(rules: &Rules) -> Result<Self, RulesError> {
        if !rules.fixed_shifts {
            return Ok(Self::SlotBased);
        }
        match rules.shifts_per_day {
            Some(n) if n > 0 => Ok(Self::FixedShift {
                shifts_per_day: n,
                templates: Vec::new(),
            }),
            _ => Err(RulesError::MissingShiftCount),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SlotBased => "slot_based",
            Self::FixedShift { .. } => "fixed_shift",
        }
    }

    /// Form availability and preference grids must take in this mode
    pub fn grid_form(&self) -> GridForm {
        match self {
            Self::SlotBased => GridForm::Slots,
            Self::FixedShift { .. } => GridForm::Shifts,
        }
    }

    /// The mode must agree with the rules' fixed-shift flag and shift count
    pub fn check_rules(&self, rules: &Rules) -> Result<(), RulesError> {
        match self {
            Self::SlotBased if rules.fixed_shifts => Err(RulesError::ModeMismatch {
                mode: self.name(),
                rules_fixed: true,
            }),
            Self::SlotBased => Ok(()),
            Self::FixedShift { .. } if !rules.fixed_shifts => Err(RulesError::ModeMismatch {
                mode: self.name(),
                rules_fixed: false,
            }),
            Self::FixedShift { shifts_per_day, .. } => {
                if *shifts_per_day == 0 {
                    return Err(RulesError::MissingShiftCount);
                }
                match rules.shifts_per_day {
                    Some(n) if n == *shifts_per_day => Ok(()),
                    Some(0) | None => Err(RulesError::MissingShiftCount),
                    Some(_) => Err(RulesError::ModeMismatch {
                        mode: self.name(),
                        rules_fixed: true,
                    }),
                }
            }
        }
    }

    /// Shift layout of one day.
    ///
    /// Without explicit templates the day is split into `shifts_per_day`
    /// contiguous shifts; earlier shifts take the remainder slots. Every shift
    /// must fit in the day and respect the rules' shift length bounds.
    pub fn shift_templates(
        &self,
        rules: &Rules,
        slots_per_day: usize,
    ) -> Result<Vec<ShiftTemplate>, RulesError> {
        let Self::FixedShift {
            shifts_per_day,
            templates,
        } = self
        else {
            return Ok(Vec::new());
        };
        let shifts = *shifts_per_day;
        if shifts == 0 {
            return Err(RulesError::MissingShiftCount);
        }

        let layout = if templates.is_empty() {
            if shifts > slots_per_day {
                return Err(RulesError::TooManyShifts {
                    shifts,
                    slots: slots_per_day,
                });
            }
            let base = slots_per_day / shifts;
            let remainder = slots_per_day % shifts;
            let mut start = 0;
            (0..shifts)
                .map(|i| {
                    let length = base + usize::from(i < remainder);
                    let template = ShiftTemplate::new(start, length);
                    start += length;
                    template
                })
                .collect()
        } else {
            if templates.len() != shifts {
                return Err(RulesError::ShiftTemplate {
                    index: templates.len(),
                    reason: format!("{} templates given for {shifts} shifts", templates.len()),
                });
            }
            templates.clone()
        };

        for (index, template) in layout.iter().enumerate() {
            if template.length_slots == 0 || template.end_slot() > slots_per_day {
                return Err(RulesError::ShiftTemplate {
                    index,
                    reason: format!(
                        "slots {}..{} do not fit a {slots_per_day}-slot day",
                        template.start_slot,
                        template.end_slot()
                    ),
                });
            }
            let hours = template.length_slots as f64 * rules.slot_hours;
            if hours + crate::HOURS_EPSILON < rules.shift_min_hours
                || hours > rules.shift_max_hours + crate::HOURS_EPSILON
            {
                return Err(RulesError::ShiftTemplate {
                    index,
                    reason: format!(
                        "{hours}h lies outside shift bounds {}h..{}h",
                        rules.shift_min_hours, rules.shift_max_hours
                    ),
                });
            }
            if template.length_slots > rules.max_shift_slots() {
                return Err(RulesError::ShiftTemplate {
                    index,
                    reason: format!(
                        "{} slots exceed the consecutive-slot cap of {}",
                        template.length_slots,
                        rules.max_shift_slots()
                    ),
                });
            }
        }
        Ok(layout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fixed_rules(shifts: usize) -> Rules {
        Rules {
            fixed_shifts: true,
            shifts_per_day: Some(shifts),
            ..Rules::default()
        }
    }

    #[test]
    fn mode_follows_fixed_shift_flag() {
        assert_eq!(
            SchedulingMode::from_rules(&Rules::default()),
            Ok(SchedulingMode::SlotBased)
        );
        assert_eq!(
            SchedulingMode::from_rules(&fixed_rules(2)),
            Ok(SchedulingMode::FixedShift {
                shifts_per_day: 2,
                templates: vec![]
            })
        );
    }

    #[test]
    fn even_partition_gives_remainder_to_early_shifts() {
        let mode = SchedulingMode::from_rules(&fixed_rules(3)).unwrap();
        let templates = mode.shift_templates(&fixed_rules(3), 10).unwrap();
        assert_eq!(
            templates,
            vec![
                ShiftTemplate::new(0, 4),
                ShiftTemplate::new(4, 3),
                ShiftTemplate::new(7, 3)
            ]
        );
    }

    #[test]
    fn slot_mode_with_fixed_rules_is_a_mismatch() {
        assert!(matches!(
            SchedulingMode::SlotBased.check_rules(&fixed_rules(2)),
            Err(RulesError::ModeMismatch { .. })
        ));
    }

    #[test]
    fn shift_longer_than_rules_allow_is_rejected() {
        let mode = SchedulingMode::FixedShift {
            shifts_per_day: 1,
            templates: vec![ShiftTemplate::new(0, 12)],
        };
        assert!(matches!(
            mode.shift_templates(&fixed_rules(1), 12),
            Err(RulesError::ShiftTemplate { index: 0, .. })
        ));
    }

    #[test]
    fn shift_longer_than_consecutive_cap_is_rejected() {
        let rules = Rules {
            max_consecutive_slots: 4,
            ..fixed_rules(1)
        };
        let mode = SchedulingMode::from_rules(&rules).unwrap();
        assert!(matches!(
            mode.shift_templates(&rules, 8),
            Err(RulesError::ShiftTemplate { index: 0, .. })
        ));

        let rules = Rules {
            max_consecutive_slots: 4,
            ..fixed_rules(2)
        };
        let mode = SchedulingMode::from_rules(&rules).unwrap();
        assert_eq!(
            mode.shift_templates(&rules, 8),
            Ok(vec![ShiftTemplate::new(0, 4), ShiftTemplate::new(4, 4)])
        );
    }
}
