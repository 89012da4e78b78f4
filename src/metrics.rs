//! Run metrics derived from session counters.
//! Everything here is a pure function of its inputs; the session owns the state.

use crate::config::MetricsConfig;

/// kcal per kg per km, the usual running approximation
const KCAL_PER_KG_KM: f64 = 1.036;

/// Active seconds since `start_ms`, excluding finished pauses and the one in progress.
///
/// Whole seconds, clamped at zero so a clock that steps backwards never yields
/// a negative duration.
pub fn elapsed_seconds(
    now_ms: u64,
    start_ms: u64,
    accumulated_pause_ms: u64,
    pause_start_ms: Option<u64>,
) -> u64 {
    let ongoing_pause = pause_start_ms.map_or(0, |p| now_ms as i64 - p as i64).max(0);
    let active_ms = now_ms as i64 - start_ms as i64 - accumulated_pause_ms as i64 - ongoing_pause;
    (active_ms.max(0) / 1000) as u64
}

pub fn calories(total_distance_m: f64, weight_kg: f64) -> u32 {
    (weight_kg * (total_distance_m / 1000.0) * KCAL_PER_KG_KM).round().max(0.0) as u32
}

/// Lifetime-average pace (min/km); zero distance gives 0, not an error.
pub fn pace_min_per_km(total_distance_m: f64, duration_secs: u64) -> f64 {
    if total_distance_m > 0.0 {
        (duration_secs as f64 / 60.0) / (total_distance_m / 1000.0)
    } else {
        0.0
    }
}

/// Live pace from instantaneous GPS speed, clamped to a plausible running range.
/// None when the runner is effectively standing still.
pub fn realtime_pace(speed_ms: f64, config: &MetricsConfig) -> Option<f64> {
    if speed_ms > config.realtime_pace_min_speed_ms {
        let pace = (1000.0 / speed_ms) / 60.0;
        Some(pace.clamp(config.min_pace_min_per_km, config.max_pace_min_per_km))
    } else {
        None
    }
}

/// `HH:MM:SS`
pub fn format_duration(total_secs: u64) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        total_secs / 3600,
        (total_secs % 3600) / 60,
        total_secs % 60
    )
}

/// `M:SS` per km
pub fn format_pace(min_per_km: f64) -> String {
    if !min_per_km.is_finite() || min_per_km <= 0.0 {
        return "0:00".to_string();
    }
    let minutes = min_per_km.trunc() as u64;
    let seconds = ((min_per_km - min_per_km.trunc()) * 60.0) as u64;
    format!("{}:{:02}", minutes, seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pace_five_km_in_25_minutes() {
        assert_eq!(pace_min_per_km(5000.0, 1500), 5.0);
        assert_eq!(pace_min_per_km(0.0, 1500), 0.0);
    }

    #[test]
    fn test_calories() {
        // 70 * 5 * 1.036 = 362.6
        assert_eq!(calories(5000.0, 70.0), 363);
        assert_eq!(calories(0.0, 70.0), 0);
    }

    #[test]
    fn test_elapsed_excludes_pauses() {
        // 60 s since start, 10 s of finished pause
        assert_eq!(elapsed_seconds(61_000, 1_000, 10_000, None), 50);
        // plus a pause that began 5 s ago
        assert_eq!(elapsed_seconds(61_000, 1_000, 10_000, Some(56_000)), 45);
    }

    #[test]
    fn test_elapsed_clamped_at_zero() {
        assert_eq!(elapsed_seconds(500, 1_000, 0, None), 0);
        assert_eq!(elapsed_seconds(5_000, 0, 9_000, None), 0);
    }

    #[test]
    fn test_realtime_pace() {
        let config = MetricsConfig::default();
        // 1000 / 3.333.. / 60 = 5 min/km
        let pace = realtime_pace(10.0 / 3.0, &config).unwrap();
        assert!((pace - 5.0).abs() < 1e-9);
        assert_eq!(realtime_pace(0.4, &config), None);
        // walking pace clamps to the slow end
        assert_eq!(realtime_pace(0.51, &config), Some(30.0));
        // faster than any runner clamps to the fast end
        assert_eq!(realtime_pace(20.0, &config), Some(2.0));
    }

    #[test]
    fn test_formatting() {
        assert_eq!(format_duration(0), "00:00:00");
        assert_eq!(format_duration(3723), "01:02:03");
        assert_eq!(format_pace(5.5), "5:30");
        assert_eq!(format_pace(0.0), "0:00");
        assert_eq!(format_pace(f64::INFINITY), "0:00");
    }
}
