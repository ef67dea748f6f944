use chrono::Duration;

const SECONDS_PER_HOUR: f64 = 3600.0;

/// Lengths of the sessions a task of `duration_hours` is divided into when no session may
/// exceed `threshold_hours`. Always at least one entry; the entries sum to the duration.
pub fn split_durations(duration_hours: f64, threshold_hours: f64) -> Vec<Duration> {
    let total = hours_to_seconds(duration_hours).max(1);
    let limit = hours_to_seconds(threshold_hours).max(1);
    split_seconds(total, limit)
        .into_iter()
        .map(Duration::seconds)
        .collect()
}

pub fn split_seconds(total: i64, limit: i64) -> Vec<i64> {
    let limit = limit.max(1);
    if total <= limit {
        return vec![total];
    }

    let count = total / limit + i64::from(total % limit != 0);
    let mut parts = vec![limit; count as usize];
    if let Some(last) = parts.last_mut() {
        *last = total - limit * (count - 1);
    }
    parts
}

pub fn hours_to_seconds(hours: f64) -> i64 {
    if !hours.is_finite() || hours <= 0.0 {
        return 0;
    }
    (hours * SECONDS_PER_HOUR).round() as i64
}

/// `Part 2 of 3`; single sessions carry no note.
pub fn part_note(index: usize, count: usize) -> Option<String> {
    (count > 1).then(|| format!("Part {} of {}", index + 1, count))
}
