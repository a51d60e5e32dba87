//! Bucket-width selection and series densification for volume charts.

use crate::models::ChartPoint;

pub const DAY_MS: i64 = 86_400_000;
pub const WEEK_MS: i64 = 7 * DAY_MS;
pub const MONTH_MS: i64 = 30 * DAY_MS;
pub const YEAR_MS: i64 = 365 * DAY_MS;

/// Upper bound on buckets a single chart request may span.
pub const MAX_CHART_POINTS: i64 = 10_000;

/// Default bucket width for a `[from, to]` range: daily up to 15 days, weekly
/// up to 15 weeks, 30-day buckets up to 15 months, yearly beyond.
pub fn default_bucket_width(date_from: i64, date_to: i64) -> i64 {
    let range = date_to.saturating_sub(date_from);
    if range <= 15 * DAY_MS {
        DAY_MS
    } else if range <= 15 * WEEK_MS {
        WEEK_MS
    } else if range <= 15 * MONTH_MS {
        MONTH_MS
    } else {
        YEAR_MS
    }
}

/// Fills gaps between adjacent buckets that leave at least one whole empty
/// bucket between them. Each inserted point sits on the bucket grid halfway
/// (rounded down) between its neighbours and carries the linearly interpolated
/// volume; insertion repeats until every gap is shorter than two widths.
///
/// `points` must be sorted by date and `width` positive.
pub fn interpolate_gaps(points: &mut Vec<ChartPoint>, width: i64) {
    if width <= 0 {
        return;
    }

    let mut i = 0;
    while i + 1 < points.len() {
        let (left, right) = (points[i], points[i + 1]);
        let span = right.date.checked_sub(left.date).unwrap_or(0);
        let steps = span / width;
        let date = (steps / 2)
            .checked_mul(width)
            .and_then(|offset| left.date.checked_add(offset));

        match date {
            Some(date) if steps >= 2 => {
                let ratio = (date - left.date) as f64 / span as f64;
                points.insert(
                    i + 1,
                    ChartPoint {
                        date,
                        value: left.value + (right.value - left.value) * ratio,
                        interpolated: true,
                    },
                );
            }
            _ => i += 1,
        }
    }
}

/// Extends the series to cover `[date_from, date_to]` by repeating the edge
/// bucket's volume at `width` steps. Empty series stay empty.
pub fn pad_to_range(points: &mut Vec<ChartPoint>, width: i64, date_from: i64, date_to: i64) {
    if width <= 0 {
        return;
    }

    if let Some(first) = points.first().copied() {
        let mut prefix = Vec::new();
        let mut date = first.date;
        while date > date_from {
            let Some(previous) = date.checked_sub(width) else { break };
            date = previous;
            prefix.push(ChartPoint { date, value: first.value, interpolated: true });
        }
        prefix.reverse();
        points.splice(0..0, prefix);
    }

    if let Some(last) = points.last().copied() {
        let mut date = last.date;
        while let Some(next) = date.checked_add(width).filter(|next| *next <= date_to) {
            date = next;
            points.push(ChartPoint { date, value: last.value, interpolated: true });
        }
    }
}
