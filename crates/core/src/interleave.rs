use chrono::{DateTime, Duration, Utc};

use crate::model::{CycleItem, ItemId, Subject, SubjectId};

/// Tally baseline for newly generated sessions.
///
/// The keep/reset decision belongs to the cycle service; the interleaver only
/// receives its outcome through [`SessionSeed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Baseline {
    /// Seed new sessions with the subject's current aggregate tally.
    KeepProgress,
    /// Start new sessions from a zeroed tally.
    Reset,
}

/// Per-subject snapshot used to synthesize session placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSeed {
    pub subject_id: SubjectId,
    pub name: String,
    pub notebook_url: Option<String>,
    pub hours_per_session: f64,
    pub frequency: u32,
    pub correct: u32,
    pub wrong: u32,
}

impl SessionSeed {
    /// Snapshot a subject, choosing the tally baseline the caller decided on.
    #[must_use]
    pub fn from_subject(subject: &Subject, baseline: Baseline) -> Self {
        let (correct, wrong) = match baseline {
            Baseline::KeepProgress => (subject.total_correct(), subject.total_wrong()),
            Baseline::Reset => (0, 0),
        };
        Self {
            subject_id: subject.id(),
            name: subject.name().to_owned(),
            notebook_url: subject.notebook_url().map(str::to_owned),
            hours_per_session: subject.total_hours(),
            frequency: subject.frequency(),
            correct,
            wrong,
        }
    }

    // A zero frequency still yields one repeat; a selected subject is never
    // silently dropped.
    fn repeats(&self) -> u32 {
        self.frequency.max(1)
    }
}

/// Build a fairness-ordered sequence of session placeholders.
///
/// Round-robin rotation: round `r` emits one placeholder from every seed
/// whose repeat count exceeds `r`, in seed order, until all seeds are
/// exhausted. Repeats of one subject never cluster while any other subject
/// still has a placeholder left for the round.
///
/// Emitted items carry synthetic creation timestamps `base_time + n·1ms`,
/// strictly increasing in emission order, so the stored sequence can be
/// reconstructed from `created_at` ascending alone.
#[must_use]
pub fn interleave(seeds: &[SessionSeed], base_time: DateTime<Utc>) -> Vec<CycleItem> {
    let total: usize = seeds.iter().map(|s| s.repeats() as usize).sum();
    let mut items = Vec::with_capacity(total);

    let mut round = 0;
    loop {
        let mut emitted = false;
        for seed in seeds {
            if round < seed.repeats() {
                let created_at = base_time + Duration::milliseconds(items.len() as i64);
                items.push(CycleItem::placeholder(
                    ItemId::generate(),
                    seed.subject_id,
                    seed.name.clone(),
                    seed.notebook_url.clone(),
                    seed.hours_per_session,
                    seed.correct,
                    seed.wrong,
                    created_at,
                ));
                emitted = true;
            }
        }
        if !emitted {
            break;
        }
        round += 1;
    }

    items
}
