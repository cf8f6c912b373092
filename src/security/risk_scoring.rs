// src/security/risk_scoring.rs - Weighted composite risk scoring
//
// One canonical scoring table. Every sub-score is 0-100; the aggregate is the
// weighted sum clamped to 0-100. Timing red flags can force email verification
// on their own.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{BehaviorProfile, RecommendedAction, RiskLevel, TransactionRequest};
use crate::security::anomaly::{
    amount_anomaly, duration_z_score, velocity_flags, StatisticsSettings, VelocitySettings,
};
use crate::security::heuristics::{address_novelty, time_band, AddressNovelty, TimeBand};
use crate::security::modal_timing::{TimingSettings, TimingSnapshot};

pub const SCORING_TABLE_VERSION: &str = "2";

/// Sub-score weights in percent; must sum to 100
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskWeights {
    pub amount_ratio: u32,
    pub address_novelty: u32,
    pub statistical_anomaly: u32,
    pub time_of_day: u32,
    pub behavioral_timing: u32,
}

impl Default for RiskWeights {
    fn default() -> Self {
        RiskWeights {
            amount_ratio: 25,
            address_novelty: 20,
            statistical_anomaly: 20,
            time_of_day: 10,
            behavioral_timing: 25,
        }
    }
}

impl RiskWeights {
    pub fn total(&self) -> u32 {
        self.amount_ratio
            + self.address_novelty
            + self.statistical_anomaly
            + self.time_of_day
            + self.behavioral_timing
    }
}

/// Inclusive upper bounds of each level; anything above `high` is critical
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelThresholds {
    pub low: u8,
    pub medium: u8,
    pub high: u8,
}

impl Default for LevelThresholds {
    fn default() -> Self {
        LevelThresholds {
            low: 30,
            medium: 60,
            high: 80,
        }
    }
}

impl LevelThresholds {
    pub fn level_for(&self, score: u8) -> RiskLevel {
        if score <= self.low {
            RiskLevel::Low
        } else if score <= self.medium {
            RiskLevel::Medium
        } else if score <= self.high {
            RiskLevel::High
        } else {
            RiskLevel::Critical
        }
    }
}

/// Amount/balance ratio tiers, ascending
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmountTiers {
    pub elevated_ratio: f64,
    pub high_ratio: f64,
    pub very_high_ratio: f64,
}

impl Default for AmountTiers {
    fn default() -> Self {
        AmountTiers {
            elevated_ratio: 0.3,
            high_ratio: 0.5,
            very_high_ratio: 0.8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskSettings {
    pub version: String,
    /// Statistical contribution for a session too young for z-scores; 0 disables it
    pub insufficient_history_risk: u8,
    pub weights: RiskWeights,
    pub levels: LevelThresholds,
    pub amount_tiers: AmountTiers,
    pub statistics: StatisticsSettings,
    pub velocity: VelocitySettings,
}

impl Default for RiskSettings {
    fn default() -> Self {
        RiskSettings {
            version: SCORING_TABLE_VERSION.to_string(),
            insufficient_history_risk: 20,
            weights: RiskWeights::default(),
            levels: LevelThresholds::default(),
            amount_tiers: AmountTiers::default(),
            statistics: StatisticsSettings::default(),
            velocity: VelocitySettings::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFlag {
    InsufficientBalance,
    VeryHighBalanceRatio,
    HighBalanceRatio,
    ElevatedBalanceRatio,
    KnownAddress,
    NewAddress,
    NewAddressHighAmount,
    InsufficientHistory,
    SevereAmountAnomaly,
    AmountAnomaly,
    UnusualAmount,
    ExtremeAmount,
    HighAmount,
    ElevatedAmount,
    DurationAnomaly,
    DurationDeviation,
    RapidTransactions,
    SweepingPattern,
    LateNight,
    Night,
    Evening,
    DirectInvocation,
    VeryFastTransaction,
    FastTransaction,
    FasterThanUsual,
    LowInteraction,
}

impl RiskFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskFlag::InsufficientBalance => "insufficient_balance",
            RiskFlag::VeryHighBalanceRatio => "very_high_balance_ratio",
            RiskFlag::HighBalanceRatio => "high_balance_ratio",
            RiskFlag::ElevatedBalanceRatio => "elevated_balance_ratio",
            RiskFlag::KnownAddress => "known_address",
            RiskFlag::NewAddress => "new_address",
            RiskFlag::NewAddressHighAmount => "new_address_high_amount",
            RiskFlag::InsufficientHistory => "insufficient_history",
            RiskFlag::SevereAmountAnomaly => "severe_amount_anomaly",
            RiskFlag::AmountAnomaly => "amount_anomaly",
            RiskFlag::UnusualAmount => "unusual_amount",
            RiskFlag::ExtremeAmount => "extreme_amount",
            RiskFlag::HighAmount => "high_amount",
            RiskFlag::ElevatedAmount => "elevated_amount",
            RiskFlag::DurationAnomaly => "duration_anomaly",
            RiskFlag::DurationDeviation => "duration_deviation",
            RiskFlag::RapidTransactions => "rapid_transactions",
            RiskFlag::SweepingPattern => "sweeping_pattern",
            RiskFlag::LateNight => "late_night",
            RiskFlag::Night => "night",
            RiskFlag::Evening => "evening",
            RiskFlag::DirectInvocation => "direct_invocation",
            RiskFlag::VeryFastTransaction => "very_fast_transaction",
            RiskFlag::FastTransaction => "fast_transaction",
            RiskFlag::FasterThanUsual => "faster_than_usual",
            RiskFlag::LowInteraction => "low_interaction",
        }
    }

    /// Timing signals that force email verification regardless of the total
    pub fn forces_verification(&self) -> bool {
        matches!(
            self,
            RiskFlag::DirectInvocation
                | RiskFlag::VeryFastTransaction
                | RiskFlag::FastTransaction
                | RiskFlag::LowInteraction
        )
    }
}

impl fmt::Display for RiskFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskReason {
    pub flag: RiskFlag,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubScores {
    pub amount_ratio: u8,
    pub address_novelty: u8,
    pub statistical_anomaly: u8,
    pub time_of_day: u8,
    pub behavioral_timing: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingDetails {
    pub modal_found: bool,
    pub elapsed_seconds: Option<f64>,
    pub interaction_count: u32,
    pub average_duration: f64,
    pub speed_ratio: Option<f64>,
    pub duration_z_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub scoring_version: String,
    pub sub_scores: SubScores,
    pub total_risk_score: u8,
    pub risk_level: RiskLevel,
    pub recommended_action: RecommendedAction,
    pub timing_override: bool,
    pub reasons: Vec<RiskReason>,
    pub timing: TimingDetails,
    pub evaluated_at: DateTime<Utc>,
}

impl RiskAssessment {
    pub fn has_flag(&self, flag: RiskFlag) -> bool {
        self.reasons.iter().any(|r| r.flag == flag)
    }

    pub fn flags(&self) -> Vec<RiskFlag> {
        self.reasons.iter().map(|r| r.flag).collect()
    }

    pub fn requires_email_verification(&self) -> bool {
        self.recommended_action == RecommendedAction::RequireEmailVerification
    }
}

/// Score plus the flags raised while computing it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubScore {
    pub score: u8,
    pub reasons: Vec<RiskReason>,
}

impl SubScore {
    fn new(score: u32) -> Self {
        SubScore {
            score: clamp_score(score),
            reasons: Vec::new(),
        }
    }

    fn flag(mut self, flag: RiskFlag, message: String) -> Self {
        self.reasons.push(RiskReason { flag, message });
        self
    }
}

fn clamp_score(score: u32) -> u8 {
    score.min(100) as u8
}

pub fn amount_ratio_risk(amount: f64, balance: f64, tiers: &AmountTiers) -> SubScore {
    if balance <= 0.0 || !balance.is_finite() {
        return SubScore::new(100).flag(
            RiskFlag::InsufficientBalance,
            format!("No spendable balance ({})", balance),
        );
    }

    let ratio = amount / balance;
    let pct = ratio * 100.0;
    if ratio >= tiers.very_high_ratio {
        SubScore::new(100).flag(
            RiskFlag::VeryHighBalanceRatio,
            format!("Transfer is {:.0}% of the balance", pct),
        )
    } else if ratio >= tiers.high_ratio {
        SubScore::new(70).flag(
            RiskFlag::HighBalanceRatio,
            format!("Transfer is {:.0}% of the balance", pct),
        )
    } else if ratio >= tiers.elevated_ratio {
        SubScore::new(40).flag(
            RiskFlag::ElevatedBalanceRatio,
            format!("Transfer is {:.0}% of the balance", pct),
        )
    } else {
        SubScore::new(10)
    }
}

pub fn address_risk(recipient: &str, amount: f64, profile: &BehaviorProfile) -> SubScore {
    match address_novelty(recipient, amount, profile) {
        AddressNovelty::Known { interactions } => SubScore::new(5).flag(
            RiskFlag::KnownAddress,
            format!("Recipient used {} time(s) before", interactions),
        ),
        AddressNovelty::New => {
            SubScore::new(60).flag(RiskFlag::NewAddress, "First transfer to this recipient".to_string())
        }
        AddressNovelty::NewWithHighAmount => SubScore::new(85).flag(
            RiskFlag::NewAddressHighAmount,
            format!(
                "First transfer to this recipient at more than twice the usual amount ({:.4})",
                profile.amount_mean
            ),
        ),
    }
}

/// Keeps the highest component score and records its reason
fn raise(base: &mut u32, reasons: &mut Vec<RiskReason>, score: u32, flag: RiskFlag, message: String) {
    *base = (*base).max(score);
    reasons.push(RiskReason { flag, message });
}

pub fn statistical_risk(
    amount: f64,
    timing: Option<&TimingSnapshot>,
    profile: &BehaviorProfile,
    now: DateTime<Utc>,
    settings: &RiskSettings,
) -> (SubScore, Option<f64>) {
    let mut reasons = Vec::new();
    let mut base: u32 = 0;

    let anomaly = amount_anomaly(amount, profile, &settings.statistics);
    match anomaly.z_score {
        Some(z) if z > 4.0 => raise(&mut base, &mut reasons, 90, RiskFlag::SevereAmountAnomaly, format!("Amount z-score {:.1}", z)),
        Some(z) if z > 2.0 => raise(&mut base, &mut reasons, 60, RiskFlag::AmountAnomaly, format!("Amount z-score {:.1}", z)),
        Some(_) => base = base.max(10),
        None if anomaly.is_flat_history() => {
            let mean = anomaly.window_mean.unwrap_or(profile.amount_mean);
            if mean > 0.0 && ((amount - mean) / mean).abs() > settings.statistics.flat_history_tolerance {
                raise(
                    &mut base,
                    &mut reasons,
                    50,
                    RiskFlag::UnusualAmount,
                    format!("Amount differs from the constant usual amount {:.4}", mean),
                );
            } else {
                base = base.max(5);
            }
        }
        None => {
            if settings.insufficient_history_risk > 0 {
                raise(
                    &mut base,
                    &mut reasons,
                    settings.insufficient_history_risk as u32,
                    RiskFlag::InsufficientHistory,
                    format!("Only {} completed transfer(s) on record", profile.total_transactions),
                );
            }
        }
    }

    if let Some(ratio) = anomaly.ratio {
        let message = format!("Amount is {:.1}x the average", ratio);
        if ratio >= 10.0 {
            raise(&mut base, &mut reasons, 90, RiskFlag::ExtremeAmount, message);
        } else if ratio >= 5.0 {
            raise(&mut base, &mut reasons, 70, RiskFlag::HighAmount, message);
        } else if ratio >= 2.0 {
            raise(&mut base, &mut reasons, 40, RiskFlag::ElevatedAmount, message);
        }
    }

    let duration_z = timing.and_then(|t| duration_z_score(t.elapsed_seconds, profile, &settings.statistics));
    match duration_z {
        Some(z) if z > 3.0 => raise(&mut base, &mut reasons, 70, RiskFlag::DurationAnomaly, format!("Duration z-score {:.1}", z)),
        Some(z) if z > 2.0 => raise(&mut base, &mut reasons, 45, RiskFlag::DurationDeviation, format!("Duration z-score {:.1}", z)),
        _ => {}
    }

    let velocity = velocity_flags(amount, profile, now, &settings.velocity);
    let mut penalty = 0;
    if velocity.rapid {
        penalty += 25;
        reasons.push(RiskReason {
            flag: RiskFlag::RapidTransactions,
            message: format!(
                "{} transfers in the last {} seconds",
                velocity.in_window, settings.velocity.window_secs
            ),
        });
    }
    if velocity.sweeping {
        penalty += 50;
        reasons.push(RiskReason {
            flag: RiskFlag::SweepingPattern,
            message: format!(
                "Recent transfers plus this one exceed {}x the average amount",
                settings.velocity.sweeping_mean_multiplier
            ),
        });
    }

    (
        SubScore {
            score: clamp_score(base + penalty),
            reasons,
        },
        duration_z,
    )
}

pub fn time_of_day_risk(local_hour: u32) -> SubScore {
    match time_band(local_hour) {
        TimeBand::LateNight => SubScore::new(60).flag(RiskFlag::LateNight, format!("Late-night transfer ({:02}:00)", local_hour)),
        TimeBand::Night => SubScore::new(40).flag(RiskFlag::Night, format!("Night-time transfer ({:02}:00)", local_hour)),
        TimeBand::Evening => SubScore::new(10).flag(RiskFlag::Evening, format!("Evening transfer ({:02}:00)", local_hour)),
        TimeBand::Day => SubScore::new(5),
    }
}

/// DirectInvocationPenalty: a transfer evaluated without any open interaction
/// window scores the fixed penalty instead of zero.
pub fn direct_invocation_penalty(settings: &TimingSettings) -> SubScore {
    SubScore::new(settings.direct_invocation_penalty as u32).flag(
        RiskFlag::DirectInvocation,
        "Signing requested without an open transfer form".to_string(),
    )
}

pub fn behavioral_timing_risk(
    timing: Option<&TimingSnapshot>,
    average_duration: f64,
    settings: &TimingSettings,
) -> (SubScore, Option<f64>) {
    let snapshot = match timing {
        Some(snapshot) => snapshot,
        None => return (direct_invocation_penalty(settings), None),
    };

    let elapsed = snapshot.elapsed_seconds;
    let speed_ratio = if average_duration > 0.0 && elapsed.is_finite() {
        Some(elapsed / average_duration)
    } else {
        None
    };

    let mut sub = match speed_ratio {
        Some(ratio) if ratio <= settings.very_fast_ratio => SubScore::new(settings.very_fast_risk as u32).flag(
            RiskFlag::VeryFastTransaction,
            format!("Completed in {:.1}s against a usual {:.0}s", elapsed, average_duration),
        ),
        Some(ratio) if ratio <= settings.fast_ratio => SubScore::new(settings.fast_risk as u32).flag(
            RiskFlag::FastTransaction,
            format!("Completed in {:.1}s against a usual {:.0}s", elapsed, average_duration),
        ),
        Some(ratio) if ratio <= settings.faster_ratio => SubScore::new(settings.faster_risk as u32).flag(
            RiskFlag::FasterThanUsual,
            format!("Completed in {:.1}s against a usual {:.0}s", elapsed, average_duration),
        ),
        _ => SubScore::new(settings.normal_risk as u32),
    };

    if snapshot.interaction_count < settings.min_interactions && elapsed > settings.low_interaction_after_secs {
        sub.score = clamp_score(sub.score as u32 + settings.low_interaction_penalty as u32);
        sub.reasons.push(RiskReason {
            flag: RiskFlag::LowInteraction,
            message: format!("Only {} interaction(s) in {:.1}s", snapshot.interaction_count, elapsed),
        });
    }

    (sub, speed_ratio)
}

pub struct RiskScoringEngine {
    risk: RiskSettings,
    timing: TimingSettings,
}

impl RiskScoringEngine {
    pub fn new(risk: RiskSettings, timing: TimingSettings) -> Self {
        RiskScoringEngine { risk, timing }
    }

    pub fn settings(&self) -> &RiskSettings {
        &self.risk
    }

    /// Pure evaluation; never fails and never mutates the profile
    pub fn evaluate(
        &self,
        profile: &BehaviorProfile,
        tx: &TransactionRequest,
        timing: Option<&TimingSnapshot>,
        now: DateTime<Utc>,
        local_hour: u32,
    ) -> RiskAssessment {
        let amount = amount_ratio_risk(tx.amount, tx.balance, &self.risk.amount_tiers);
        let address = address_risk(&tx.recipient, tx.amount, profile);
        let (statistical, duration_z) = statistical_risk(tx.amount, timing, profile, now, &self.risk);
        let time_of_day = time_of_day_risk(local_hour);
        let (behavioral, speed_ratio) = behavioral_timing_risk(timing, profile.average_duration, &self.timing);

        let sub_scores = SubScores {
            amount_ratio: amount.score,
            address_novelty: address.score,
            statistical_anomaly: statistical.score,
            time_of_day: time_of_day.score,
            behavioral_timing: behavioral.score,
        };
        let total_risk_score = self.aggregate(&sub_scores);
        let risk_level = self.risk.levels.level_for(total_risk_score);

        let reasons: Vec<RiskReason> = [amount, address, statistical, time_of_day, behavioral]
            .into_iter()
            .flat_map(|sub| sub.reasons)
            .collect();

        let timing_override = reasons.iter().any(|r| r.flag.forces_verification());
        let recommended_action = if timing_override {
            RecommendedAction::RequireEmailVerification
        } else {
            RecommendedAction::for_level(risk_level)
        };

        RiskAssessment {
            scoring_version: self.risk.version.clone(),
            sub_scores,
            total_risk_score,
            risk_level,
            recommended_action,
            timing_override,
            reasons,
            timing: TimingDetails {
                modal_found: timing.is_some(),
                elapsed_seconds: timing.map(|t| t.elapsed_seconds),
                interaction_count: timing.map(|t| t.interaction_count).unwrap_or(0),
                average_duration: profile.average_duration,
                speed_ratio,
                duration_z_score: duration_z,
            },
            evaluated_at: now,
        }
    }

    fn aggregate(&self, scores: &SubScores) -> u8 {
        let w = &self.risk.weights;
        let weighted = scores.amount_ratio as u32 * w.amount_ratio
            + scores.address_novelty as u32 * w.address_novelty
            + scores.statistical_anomaly as u32 * w.statistical_anomaly
            + scores.time_of_day as u32 * w.time_of_day
            + scores.behavioral_timing as u32 * w.behavioral_timing;
        clamp_score(((weighted as f64) / 100.0).round() as u32)
    }
}
