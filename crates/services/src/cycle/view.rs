//! Read-side policies over the cycle queue: display ordering and the
//! performance summary panel.

use std::collections::HashSet;

use cycle_core::model::{CycleItem, SubjectId};

/// Sort sessions for display: pending before completed, newest-created
/// first within each group.
///
/// This is a read policy, not a storage order: completion state changes
/// over time, so callers recompute it on every read.
#[must_use]
pub fn order_for_display(mut items: Vec<CycleItem>) -> Vec<CycleItem> {
    items.sort_by(|a, b| {
        a.completed()
            .cmp(&b.completed())
            .then_with(|| b.created_at().cmp(&a.created_at()))
            .then_with(|| b.id().value().cmp(&a.id().value()))
    });
    items
}

/// Summary for the performance panel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleOverview {
    pub correct: u32,
    pub wrong: u32,
    pub total: u32,
    pub correct_pct: u8,
    pub wrong_pct: u8,
    pub hours_studied: f64,
    pub hours_to_study: f64,
}

/// Whole-cycle summary.
///
/// Pending repeats of one subject share a single synchronized counter, so
/// the tally is counted once per subject (its first session in queue
/// order) rather than multiplied by frequency. Hours are split across all
/// sessions by completion state.
#[must_use]
pub fn overview(items: &[CycleItem]) -> CycleOverview {
    let mut seen: HashSet<SubjectId> = HashSet::new();
    let mut correct = 0;
    let mut wrong = 0;
    for item in items {
        if seen.insert(item.subject_id()) {
            correct += item.correct();
            wrong += item.wrong();
        }
    }
    summarize(correct, wrong, items)
}

/// Summary restricted to one subject's sessions.
///
/// The tally comes from the subject's first session in queue order; its
/// pending sessions all carry the same synchronized counter.
#[must_use]
pub fn subject_overview(items: &[CycleItem], subject_id: SubjectId) -> CycleOverview {
    let filtered: Vec<&CycleItem> = items
        .iter()
        .filter(|i| i.subject_id() == subject_id)
        .collect();
    let (correct, wrong) = filtered
        .first()
        .map_or((0, 0), |i| (i.correct(), i.wrong()));

    let hours_studied = filtered
        .iter()
        .filter(|i| i.completed())
        .map(|i| i.hours_per_session())
        .sum();
    let hours_to_study = filtered
        .iter()
        .filter(|i| i.is_pending())
        .map(|i| i.hours_per_session())
        .sum();

    with_percentages(correct, wrong, hours_studied, hours_to_study)
}

fn summarize(correct: u32, wrong: u32, items: &[CycleItem]) -> CycleOverview {
    let hours_studied = items
        .iter()
        .filter(|i| i.completed())
        .map(CycleItem::hours_per_session)
        .sum();
    let hours_to_study = items
        .iter()
        .filter(|i| i.is_pending())
        .map(CycleItem::hours_per_session)
        .sum();
    with_percentages(correct, wrong, hours_studied, hours_to_study)
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn with_percentages(correct: u32, wrong: u32, hours_studied: f64, hours_to_study: f64) -> CycleOverview {
    let total = correct + wrong;
    let (correct_pct, wrong_pct) = if total > 0 {
        let pct = ((f64::from(correct) / f64::from(total)) * 100.0).round() as u8;
        (pct, 100 - pct)
    } else {
        (0, 0)
    };

    CycleOverview {
        correct,
        wrong,
        total,
        correct_pct,
        wrong_pct,
        hours_studied,
        hours_to_study,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use cycle_core::interleave::{Baseline, SessionSeed, interleave};
    use cycle_core::model::Subject;
    use cycle_core::time::fixed_now;

    fn build_subject(name: &str, frequency: u32, correct: u32, wrong: u32) -> Subject {
        let mut subject = Subject::new(
            SubjectId::generate(),
            name,
            None,
            2.0,
            frequency,
            fixed_now(),
        )
        .unwrap();
        subject.record_tally(correct, wrong);
        subject
    }

    fn build_items(subjects: &[&Subject]) -> Vec<CycleItem> {
        let seeds: Vec<SessionSeed> = subjects
            .iter()
            .map(|s| SessionSeed::from_subject(s, Baseline::KeepProgress))
            .collect();
        interleave(&seeds, fixed_now())
    }

    #[test]
    fn display_order_puts_pending_first_newest_leading() {
        let math = build_subject("Math", 2, 0, 0);
        let law = build_subject("Law", 2, 0, 0);
        let mut items = build_items(&[&math]);
        let mut later = interleave(
            &[SessionSeed::from_subject(&law, Baseline::Reset)],
            fixed_now() + Duration::minutes(5),
        );
        items.append(&mut later);
        items[0].mark_completed(0, 0, fixed_now());

        let ordered = order_for_display(items);
        let names: Vec<&str> = ordered.iter().map(CycleItem::name).collect();
        assert_eq!(names, vec!["Law", "Law", "Math", "Math"]);
        assert!(ordered.last().unwrap().completed());
    }

    #[test]
    fn overview_counts_each_subject_once() {
        let math = build_subject("Math", 3, 6, 2);
        let law = build_subject("Law", 1, 2, 2);
        let items = build_items(&[&math, &law]);

        let summary = overview(&items);
        // 6+2 from Math once (not tripled), 2+2 from Law
        assert_eq!(summary.correct, 8);
        assert_eq!(summary.wrong, 4);
        assert_eq!(summary.total, 12);
        assert_eq!(summary.correct_pct, 67);
        assert_eq!(summary.wrong_pct, 33);
    }

    #[test]
    fn overview_splits_hours_by_completion() {
        let math = build_subject("Math", 3, 0, 0);
        let mut items = build_items(&[&math]);
        items[0].mark_completed(0, 0, fixed_now());

        let summary = overview(&items);
        assert!((summary.hours_studied - 2.0).abs() < f64::EPSILON);
        assert!((summary.hours_to_study - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn overview_of_empty_cycle_is_zeroed() {
        let summary = overview(&[]);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.correct_pct, 0);
        assert_eq!(summary.wrong_pct, 0);
    }

    #[test]
    fn subject_overview_restricts_to_one_subject() {
        let math = build_subject("Math", 2, 4, 1);
        let law = build_subject("Law", 2, 9, 9);
        let mut items = build_items(&[&math, &law]);
        let math_done = items
            .iter()
            .position(|i| i.subject_id() == math.id())
            .unwrap();
        items[math_done].mark_completed(4, 1, fixed_now());

        let summary = subject_overview(&items, math.id());
        assert_eq!(summary.correct, 4);
        assert_eq!(summary.wrong, 1);
        assert_eq!(summary.correct_pct, 80);
        assert!((summary.hours_studied - 2.0).abs() < f64::EPSILON);
        assert!((summary.hours_to_study - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn subject_overview_of_absent_subject_is_zeroed() {
        let math = build_subject("Math", 1, 3, 3);
        let items = build_items(&[&math]);
        let summary = subject_overview(&items, SubjectId::generate());
        assert_eq!(summary.total, 0);
        assert!((summary.hours_to_study).abs() < f64::EPSILON);
    }
}
