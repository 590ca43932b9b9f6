//! Spaced Repetition Scheduling Policy
//!
//! Cards move through three phases:
//! - Learning: new cards walk the configured learning steps (seconds) and
//!   graduate onto a day-based interval
//! - Review: graduated cards grow their interval by the card's ease
//! - Relearning: a lapsed review card walks the learning steps again
//!
//! Grades:
//! - Again: failed to recall
//! - Hard: recalled with serious difficulty
//! - Good: recalled after some hesitation
//! - Easy: recalled instantly
//!
//! Everything here is a pure function of the prior state, the grade, the
//! configuration and the instant passed in. Randomness (interval fuzz) is
//! drawn only from the caller's RNG.

use chrono::{DateTime, Duration, Utc};
use rand::rngs::mock::StepRng;
use rand::Rng;

use super::config::SchedulerConfig;
use super::errors::{FlashcardError, Result};
use super::models::{days_to_duration, Grade, SchedulingState};

/// Where a card currently sits in the learning steps or review cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Learning { step: usize },
    Relearning { step: usize },
    Review,
}

fn phase(state: &SchedulingState, step_count: usize) -> Phase {
    let last = step_count.saturating_sub(1);
    let index = state.learning_step_index as usize;

    if state.reps == 0 {
        Phase::Learning { step: index.min(last) }
    } else if index > 0 {
        Phase::Relearning { step: (index - 1).min(last) }
    } else {
        Phase::Review
    }
}

/// Compute the scheduling state that results from grading a card at `now`
///
/// # Errors
/// - `ClockRegression` if `now` is earlier than the card's last review
/// - `InvalidConfig` if the configuration does not validate
/// - `DueOutOfRange` if the resulting due date is not representable
///
/// On error the input is untouched and nothing is returned.
pub fn next_state<R: Rng>(
    state: &SchedulingState,
    grade: Grade,
    config: &SchedulerConfig,
    now: DateTime<Utc>,
    rng: &mut R,
) -> Result<SchedulingState> {
    config.validate()?;

    if let Some(last_reviewed) = state.last_reviewed {
        if now < last_reviewed {
            return Err(FlashcardError::ClockRegression { now, last_reviewed });
        }
    }

    let mut next = state.clone();
    next.last_reviewed = Some(now);

    match phase(state, config.learning_steps.len()) {
        Phase::Learning { step } => grade_learning(&mut next, step, grade, config, now)?,
        Phase::Relearning { step } => grade_relearning(&mut next, step, grade, config, now)?,
        Phase::Review => grade_review(&mut next, grade, config, now, rng)?,
    }

    Ok(next)
}

/// `now` plus a whole number of seconds, failing instead of overflowing
fn after(now: DateTime<Utc>, delay: Duration) -> Result<DateTime<Utc>> {
    now.checked_add_signed(delay)
        .ok_or(FlashcardError::DueOutOfRange { from: now, seconds: delay.num_seconds() })
}

fn after_days(now: DateTime<Utc>, days: f64) -> Result<DateTime<Utc>> {
    after(now, days_to_duration(days))
}

fn step_delay(config: &SchedulerConfig, step: usize) -> Duration {
    Duration::seconds(i64::from(config.learning_steps[step]))
}

fn grade_learning(
    next: &mut SchedulingState,
    step: usize,
    grade: Grade,
    config: &SchedulerConfig,
    now: DateTime<Utc>,
) -> Result<()> {
    let step_count = config.learning_steps.len();

    match grade {
        Grade::Again => {
            next.learning_step_index = 0;
            next.next_due = Some(after(now, step_delay(config, 0))?);
        }
        Grade::Hard => {
            next.learning_step_index = step as u32;
            next.next_due = Some(after(now, step_delay(config, step))?);
        }
        Grade::Good if step + 1 < step_count => {
            next.learning_step_index = (step + 1) as u32;
            next.next_due = Some(after(now, step_delay(config, step + 1))?);
        }
        Grade::Good => graduate(next, config.graduating_interval_days, config, now)?,
        Grade::Easy => graduate(next, config.easy_interval_days, config, now)?,
    }
    Ok(())
}

/// First graduation out of the learning steps; this is the first counted rep
fn graduate(next: &mut SchedulingState, days: f64, config: &SchedulerConfig, now: DateTime<Utc>) -> Result<()> {
    if next.ease < config.ease_floor {
        next.ease = config.starting_ease;
    }
    next.reps += 1;
    next.learning_step_index = 0;
    next.interval = days.min(config.maximum_interval_days);
    next.next_due = Some(after_days(now, next.interval)?);
    Ok(())
}

/// Every relearning grade counts as a rep; first-time learning only counts
/// the graduation.
fn grade_relearning(
    next: &mut SchedulingState,
    step: usize,
    grade: Grade,
    config: &SchedulerConfig,
    now: DateTime<Utc>,
) -> Result<()> {
    let step_count = config.learning_steps.len();
    next.reps += 1;

    match grade {
        Grade::Again => {
            next.learning_step_index = 1;
            next.next_due = Some(after(now, step_delay(config, 0))?);
        }
        Grade::Hard => {
            next.learning_step_index = (step + 1) as u32;
            next.next_due = Some(after(now, step_delay(config, step))?);
        }
        Grade::Good if step + 1 < step_count => {
            next.learning_step_index = (step + 2) as u32;
            next.next_due = Some(after(now, step_delay(config, step + 1))?);
        }
        Grade::Good => regraduate(next, config.graduating_interval_days, config, now)?,
        Grade::Easy => regraduate(next, config.easy_interval_days, config, now)?,
    }
    Ok(())
}

/// Back onto the review cycle, keeping whatever interval survived the lapse
fn regraduate(next: &mut SchedulingState, min_days: f64, config: &SchedulerConfig, now: DateTime<Utc>) -> Result<()> {
    next.learning_step_index = 0;
    next.interval = next.interval.max(min_days).min(config.maximum_interval_days);
    next.next_due = Some(after_days(now, next.interval)?);
    Ok(())
}

fn grade_review<R: Rng>(
    next: &mut SchedulingState,
    grade: Grade,
    config: &SchedulerConfig,
    now: DateTime<Utc>,
    rng: &mut R,
) -> Result<()> {
    let base = next.interval.max(config.graduating_interval_days);
    let ease = next.ease.max(config.ease_floor);
    next.reps += 1;

    match grade {
        Grade::Again => {
            next.interval = (next.interval * config.lapse_interval_multiplier)
                .min(config.maximum_interval_days);
            next.ease = (ease - config.lapse_ease_penalty).max(config.ease_floor);
            next.learning_step_index = 1;
            next.next_due = Some(after(now, step_delay(config, 0))?);
            return Ok(());
        }
        Grade::Hard => {
            next.interval = base * config.hard_interval_multiplier;
            next.ease = (ease - config.hard_ease_penalty).max(config.ease_floor);
        }
        Grade::Good => {
            next.interval = base * ease;
            next.ease = ease;
        }
        Grade::Easy => {
            next.interval = base * ease * config.easy_bonus_multiplier;
            next.ease = ease + config.easy_ease_bonus;
        }
    }

    next.interval = next.interval.min(config.maximum_interval_days);
    next.learning_step_index = 0;
    next.next_due = Some(fuzzed_due(now, next.interval, config.fuzz_fraction, rng)?);
    Ok(())
}

/// `now + interval`, jittered by up to `fraction` of the interval and never
/// earlier than `now`
fn fuzzed_due<R: Rng>(
    now: DateTime<Utc>,
    interval_days: f64,
    fraction: f64,
    rng: &mut R,
) -> Result<DateTime<Utc>> {
    let jitter = if fraction > 0.0 {
        rng.gen_range(-fraction..=fraction)
    } else {
        0.0
    };
    let due = after_days(now, interval_days * (1.0 + jitter))?;
    Ok(due.max(now))
}

/// Set a card's due date by hand. The new date may not be in the past;
/// nothing else about the card changes.
pub fn override_due(
    state: &SchedulingState,
    due: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<SchedulingState> {
    if due < now {
        return Err(FlashcardError::DueInPast { requested: due, now });
    }

    let mut next = state.clone();
    next.next_due = Some(due);
    Ok(next)
}

/// The delay each grade would produce, without fuzz.
/// Used to label the grade buttons.
pub fn preview(
    state: &SchedulingState,
    config: &SchedulerConfig,
    now: DateTime<Utc>,
) -> Result<[(Grade, Duration); 4]> {
    let config = config.without_fuzz();
    let mut rng = StepRng::new(0, 0);

    let mut out = [(Grade::Again, Duration::zero()); 4];
    for (slot, grade) in out.iter_mut().zip(Grade::ALL) {
        let next = next_state(state, grade, &config, now, &mut rng)?;
        let delay = next.next_due.map(|due| due - now).unwrap_or_else(Duration::zero);
        *slot = (grade, delay);
    }
    Ok(out)
}

/// Format a delay to a short human-readable string
pub fn format_interval(delay: Duration) -> String {
    let secs = delay.num_seconds();
    let days = secs as f64 / 86_400.0;

    if secs <= 0 {
        "now".to_string()
    } else if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else if secs < 86_400 {
        format!("{}h", secs / 3600)
    } else if days < 7.0 {
        let rounded = (days * 10.0).round() / 10.0;
        if rounded.fract() == 0.0 {
            format!("{}d", rounded as i64)
        } else {
            format!("{:.1}d", rounded)
        }
    } else if days < 30.0 {
        format!("{}w", (days / 7.0) as i64)
    } else if days < 365.0 {
        format!("{}mo", (days / 30.0) as i64)
    } else {
        format!("{}y", (days / 365.0) as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flashcards::due::classify;
    use crate::flashcards::models::Label;
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
    }

    fn exact_config() -> SchedulerConfig {
        SchedulerConfig::default().without_fuzz()
    }

    fn grade(state: &SchedulingState, g: Grade, at: DateTime<Utc>) -> SchedulingState {
        let mut rng = StdRng::seed_from_u64(7);
        next_state(state, g, &exact_config(), at, &mut rng).unwrap()
    }

    fn review_card(interval: f64, ease: f64) -> SchedulingState {
        SchedulingState {
            reps: 4,
            learning_step_index: 0,
            next_due: Some(now()),
            interval,
            ease,
            last_reviewed: Some(now() - Duration::days(interval as i64)),
        }
    }

    #[test]
    fn test_new_card_good_three_times() {
        let t0 = now();
        let s1 = grade(&SchedulingState::default(), Grade::Good, t0);
        assert_eq!(s1.learning_step_index, 1);
        assert_eq!(s1.next_due, Some(t0 + Duration::seconds(600)));
        assert_eq!(s1.reps, 0);
        assert_eq!(classify(&s1, t0), Label::Learning);

        let t1 = t0 + Duration::seconds(600);
        let s2 = grade(&s1, Grade::Good, t1);
        assert_eq!(s2.learning_step_index, 0);
        assert_eq!(s2.reps, 1);
        assert_eq!(s2.interval, 1.0);
        assert_eq!(s2.next_due, Some(t1 + Duration::days(1)));

        let t2 = t1 + Duration::days(1);
        let s3 = grade(&s2, Grade::Good, t2);
        assert_eq!(s3.interval, 2.5);
        assert_eq!(s3.reps, 2);
        assert_eq!(s3.next_due, Some(t2 + Duration::hours(60)));
        assert_eq!(s3.last_reviewed, Some(t2));
    }

    #[test]
    fn test_again_in_learning_resets_to_first_step() {
        for index in 0..=2 {
            let state = SchedulingState {
                learning_step_index: index,
                next_due: Some(now()),
                ..SchedulingState::default()
            };
            let next = grade(&state, Grade::Again, now());
            assert_eq!(next.learning_step_index, 0);
            assert_eq!(next.next_due, Some(now() + Duration::seconds(60)));
            assert_eq!(next.reps, 0);
        }
    }

    #[test]
    fn test_hard_repeats_step_and_clamps_index() {
        let state = SchedulingState {
            learning_step_index: 1,
            next_due: Some(now()),
            ..SchedulingState::default()
        };
        let next = grade(&state, Grade::Hard, now());
        assert_eq!(next.learning_step_index, 1);
        assert_eq!(next.next_due, Some(now() + Duration::seconds(600)));

        // An index left over from a longer step list is clamped
        let stale = SchedulingState {
            learning_step_index: 7,
            next_due: Some(now()),
            ..SchedulingState::default()
        };
        let next = grade(&stale, Grade::Hard, now());
        assert_eq!(next.learning_step_index, 1);
        assert_eq!(next.next_due, Some(now() + Duration::seconds(600)));
    }

    #[test]
    fn test_easy_graduates_immediately() {
        let next = grade(&SchedulingState::default(), Grade::Easy, now());
        assert_eq!(next.reps, 1);
        assert_eq!(next.learning_step_index, 0);
        assert_eq!(next.interval, 4.0);
        assert_eq!(next.next_due, Some(now() + Duration::days(4)));
    }

    #[test]
    fn test_graduation_initialises_missing_ease() {
        let state = SchedulingState {
            ease: 0.0,
            ..SchedulingState::default()
        };
        let next = grade(&state, Grade::Easy, now());
        assert_eq!(next.ease, 2.5);
    }

    #[test]
    fn test_review_reps_increase_by_one_for_every_grade() {
        for g in Grade::ALL {
            let state = review_card(10.0, 2.0);
            let next = grade(&state, g, now());
            assert_eq!(next.reps, state.reps + 1, "grade {}", g);
        }
    }

    #[test]
    fn test_lapse_enters_relearning() {
        let state = review_card(10.0, 2.0);
        let next = grade(&state, Grade::Again, now());

        assert_eq!(next.next_due, Some(now() + Duration::seconds(60)));
        assert_eq!(next.learning_step_index, 1);
        assert_eq!(next.interval, 0.0);
        assert!((next.ease - 1.8).abs() < 1e-9);
        assert!(next.ease >= 1.3);
        assert_eq!(classify(&next, now()), Label::Relearning);
    }

    #[test]
    fn test_relearning_walks_steps_then_regraduates() {
        let lapsed = grade(&review_card(10.0, 2.0), Grade::Again, now());

        let t1 = now() + Duration::seconds(60);
        let step2 = grade(&lapsed, Grade::Good, t1);
        assert_eq!(step2.learning_step_index, 2);
        assert_eq!(step2.next_due, Some(t1 + Duration::seconds(600)));
        assert_eq!(classify(&step2, t1), Label::Relearning);

        let again = grade(&step2, Grade::Again, t1);
        assert_eq!(again.learning_step_index, 1);
        assert_eq!(again.next_due, Some(t1 + Duration::seconds(60)));

        let t2 = t1 + Duration::seconds(600);
        let back = grade(&step2, Grade::Good, t2);
        assert_eq!(back.learning_step_index, 0);
        assert_eq!(back.interval, 1.0);
        assert_eq!(back.next_due, Some(t2 + Duration::days(1)));
        assert_eq!(back.reps, step2.reps + 1);
        assert_eq!(classify(&back, t2), Label::ReviewNotDue);
    }

    #[test]
    fn test_relearning_keeps_surviving_interval() {
        let config = SchedulerConfig {
            lapse_interval_multiplier: 0.5,
            ..exact_config()
        };
        let mut rng = StdRng::seed_from_u64(1);
        let lapsed = next_state(&review_card(10.0, 2.0), Grade::Again, &config, now(), &mut rng).unwrap();
        assert_eq!(lapsed.interval, 5.0);

        let back = next_state(&lapsed, Grade::Easy, &config, now(), &mut rng).unwrap();
        assert_eq!(back.interval, 5.0);
        assert_eq!(back.learning_step_index, 0);
    }

    #[test]
    fn test_review_good_and_easy_monotonic() {
        for (interval, ease) in [(1.0, 1.3), (3.0, 2.5), (40.0, 1.9)] {
            let state = review_card(interval, ease);
            let good = grade(&state, Grade::Good, now());
            let easy = grade(&state, Grade::Easy, now());
            assert!(good.interval >= state.interval);
            assert!(easy.interval >= good.interval);
            assert!(easy.ease > good.ease);
        }
    }

    #[test]
    fn test_review_hard_penalises_ease() {
        let state = review_card(10.0, 1.4);
        let next = grade(&state, Grade::Hard, now());
        assert!((next.interval - 12.0).abs() < 1e-9);
        assert_eq!(next.ease, 1.3);
    }

    #[test]
    fn test_ease_never_below_floor() {
        let config = SchedulerConfig::default();
        let mut rng = StdRng::seed_from_u64(42);
        let mut state = SchedulingState::default();
        let mut at = now();

        for _ in 0..500 {
            let g = Grade::ALL[rng.gen_range(0..4)];
            state = next_state(&state, g, &config, at, &mut rng).unwrap();
            assert!(state.ease >= config.ease_floor, "ease {} after {}", state.ease, g);
            assert!(state.learning_step_index as usize <= config.learning_steps.len());
            at = state.next_due.unwrap_or(at).max(at);
        }
    }

    #[test]
    fn test_fuzz_stays_in_bounds() {
        let config = SchedulerConfig::default();
        let mut rng = StdRng::seed_from_u64(3);
        let state = review_card(20.0, 2.5);

        for _ in 0..200 {
            let next = next_state(&state, Grade::Good, &config, now(), &mut rng).unwrap();
            let due = next.next_due.unwrap();
            assert_eq!(next.interval, 50.0);
            assert!(due >= now() + days_to_duration(50.0 * 0.95));
            assert!(due <= now() + days_to_duration(50.0 * 1.05));
        }
    }

    #[test]
    fn test_repeated_easy_is_capped_at_maximum_interval() {
        let config = exact_config();
        let mut state = review_card(1.0, 2.5);
        state.last_reviewed = Some(now());

        for _ in 0..40 {
            state = grade(&state, Grade::Easy, now());
            assert!(state.interval <= config.maximum_interval_days);
        }
        assert_eq!(state.interval, config.maximum_interval_days);
        assert_eq!(
            state.next_due,
            Some(now() + days_to_duration(config.maximum_interval_days))
        );
    }

    #[test]
    fn test_huge_stored_interval_is_clamped() {
        let state = SchedulingState {
            reps: 9,
            next_due: Some(now()),
            interval: 1e9,
            last_reviewed: Some(now()),
            ..SchedulingState::default()
        };

        let good = grade(&state, Grade::Good, now());
        assert_eq!(good.interval, exact_config().maximum_interval_days);

        let mut lapsed = state.clone();
        lapsed.learning_step_index = 2;
        let regraduated = grade(&lapsed, Grade::Good, now());
        assert_eq!(regraduated.learning_step_index, 0);
        assert_eq!(regraduated.interval, exact_config().maximum_interval_days);
    }

    #[test]
    fn test_unrepresentable_due_date_is_an_error() {
        let late = DateTime::<Utc>::MAX_UTC - Duration::days(10);
        let state = SchedulingState {
            reps: 3,
            interval: 30.0,
            ..SchedulingState::default()
        };
        let mut rng = StdRng::seed_from_u64(7);

        let result = next_state(&state, Grade::Good, &exact_config(), late, &mut rng);
        assert!(matches!(result, Err(FlashcardError::DueOutOfRange { .. })));
    }

    #[test]
    fn test_clock_regression_rejected() {
        let state = review_card(10.0, 2.5);
        let earlier = state.last_reviewed.unwrap() - Duration::seconds(1);
        let mut rng = StdRng::seed_from_u64(0);

        let result = next_state(&state, Grade::Good, &exact_config(), earlier, &mut rng);
        assert!(matches!(result, Err(FlashcardError::ClockRegression { .. })));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SchedulerConfig {
            learning_steps: Vec::new(),
            ..SchedulerConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(0);
        let result = next_state(&SchedulingState::default(), Grade::Good, &config, now(), &mut rng);
        assert!(matches!(result, Err(FlashcardError::InvalidConfig(_))));
    }

    #[test]
    fn test_override_due() {
        let state = review_card(10.0, 2.5);
        let later = now() + Duration::days(3);

        let moved = override_due(&state, later, now()).unwrap();
        assert_eq!(moved.next_due, Some(later));
        assert_eq!(moved.reps, state.reps);

        let past = override_due(&state, now() - Duration::seconds(1), now());
        assert!(matches!(past, Err(FlashcardError::DueInPast { .. })));
    }

    #[test]
    fn test_preview() {
        let preview = preview(&SchedulingState::default(), &SchedulerConfig::default(), now()).unwrap();
        let delays: Vec<String> = preview.iter().map(|(_, d)| format_interval(*d)).collect();
        assert_eq!(delays, vec!["1m", "1m", "10m", "4d"]);
    }

    #[test]
    fn test_format_interval() {
        assert_eq!(format_interval(Duration::zero()), "now");
        assert_eq!(format_interval(Duration::seconds(30)), "30s");
        assert_eq!(format_interval(Duration::seconds(600)), "10m");
        assert_eq!(format_interval(Duration::hours(5)), "5h");
        assert_eq!(format_interval(Duration::days(1)), "1d");
        assert_eq!(format_interval(Duration::hours(60)), "2.5d");
        assert_eq!(format_interval(Duration::days(14)), "2w");
        assert_eq!(format_interval(Duration::days(90)), "3mo");
        assert_eq!(format_interval(Duration::days(730)), "2y");
    }
}
