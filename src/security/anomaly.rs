// src/security/anomaly.rs - Statistical anomaly detection over a session's history
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::BehaviorProfile;

/// Sample-size and window parameters for the z-score checks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticsSettings {
    /// Both the profile's transfer count and the sample window must reach this size
    pub min_samples: usize,
    /// Number of most recent amounts the amount z-score is computed over
    pub amount_window: usize,
    /// Relative deviation from the mean that counts as unusual when the window has no spread
    pub flat_history_tolerance: f64,
}

impl Default for StatisticsSettings {
    fn default() -> Self {
        StatisticsSettings {
            min_samples: 3,
            amount_window: 20,
            flat_history_tolerance: 0.10,
        }
    }
}

/// Frequency and fund-draining checks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VelocitySettings {
    pub window_secs: i64,
    pub rapid_threshold: usize,
    pub sweeping_lookback: usize,
    pub sweeping_min_in_window: usize,
    pub sweeping_mean_multiplier: f64,
}

impl Default for VelocitySettings {
    fn default() -> Self {
        VelocitySettings {
            window_secs: 300,
            rapid_threshold: 3,
            sweeping_lookback: 5,
            sweeping_min_in_window: 2,
            sweeping_mean_multiplier: 20.0,
        }
    }
}

/// Amount signals; `None` means the signal does not apply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmountAnomaly {
    pub ratio: Option<f64>,
    pub z_score: Option<f64>,
    pub sample_size: usize,
    pub window_mean: Option<f64>,
    pub window_std_dev: Option<f64>,
}

impl AmountAnomaly {
    /// Window has enough samples but no spread at all
    pub fn is_flat_history(&self) -> bool {
        self.z_score.is_none() && self.window_std_dev == Some(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VelocityFlags {
    pub in_window: usize,
    pub rapid: bool,
    pub sweeping: bool,
}

/// Population mean and standard deviation, `None` for an empty sample
pub fn mean_and_std_dev(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();

    if mean.is_finite() && std_dev.is_finite() {
        Some((mean, std_dev))
    } else {
        None
    }
}

fn finite(value: f64) -> Option<f64> {
    if value.is_finite() {
        Some(value)
    } else {
        None
    }
}

/// |observed - average duration| / duration std dev
pub fn duration_z_score(observed_secs: f64, profile: &BehaviorProfile, settings: &StatisticsSettings) -> Option<f64> {
    if (profile.total_transactions as usize) < settings.min_samples
        || profile.duration_std_dev <= 0.0
        || observed_secs <= 0.0
    {
        return None;
    }
    finite((observed_secs - profile.average_duration).abs() / profile.duration_std_dev)
}

pub fn amount_anomaly(amount: f64, profile: &BehaviorProfile, settings: &StatisticsSettings) -> AmountAnomaly {
    let ratio = if profile.amount_mean > 0.0 {
        finite(amount / profile.amount_mean)
    } else {
        None
    };

    let window = profile.recent_amounts(settings.amount_window);
    let enough_history = (profile.total_transactions as usize) >= settings.min_samples
        && window.len() >= settings.min_samples;

    let stats = if enough_history { mean_and_std_dev(&window) } else { None };
    let z_score = stats.and_then(|(mean, std_dev)| {
        if std_dev > 0.0 {
            finite((amount - mean).abs() / std_dev)
        } else {
            None
        }
    });

    AmountAnomaly {
        ratio,
        z_score,
        sample_size: window.len(),
        window_mean: stats.map(|(mean, _)| mean),
        window_std_dev: stats.map(|(_, std_dev)| std_dev),
    }
}

/// Rapid-fire and sweeping checks over the most recent history
pub fn velocity_flags(
    amount: f64,
    profile: &BehaviorProfile,
    now: DateTime<Utc>,
    settings: &VelocitySettings,
) -> VelocityFlags {
    let cutoff = now - Duration::seconds(settings.window_secs);
    let in_window = profile
        .recent_transactions
        .iter()
        .filter(|tx| tx.timestamp > cutoff)
        .count();

    let lookback: Vec<_> = profile
        .recent_transactions
        .iter()
        .take(settings.sweeping_lookback)
        .collect();
    let lookback_in_window = lookback.iter().filter(|tx| tx.timestamp > cutoff).count();
    let lookback_total: f64 = lookback.iter().map(|tx| tx.amount).sum::<f64>() + amount;

    let sweeping = lookback_in_window >= settings.sweeping_min_in_window
        && profile.amount_mean > 0.0
        && lookback_total > profile.amount_mean * settings.sweeping_mean_multiplier;

    VelocityFlags {
        in_window,
        rapid: in_window >= settings.rapid_threshold,
        sweeping,
    }
}
