// src/security/heuristics.rs - Address novelty and time-of-day checks
use serde::{Deserialize, Serialize};

use crate::models::BehaviorProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressNovelty {
    Known { interactions: u32 },
    New,
    NewWithHighAmount,
}

/// Read-only; the address set only grows after a completed transfer
pub fn address_novelty(recipient: &str, amount: f64, profile: &BehaviorProfile) -> AddressNovelty {
    if profile.is_known_address(recipient) {
        return AddressNovelty::Known {
            interactions: profile.address_interactions(recipient),
        };
    }

    if profile.amount_mean > 0.0 && amount > profile.amount_mean * 2.0 {
        AddressNovelty::NewWithHighAmount
    } else {
        AddressNovelty::New
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeBand {
    LateNight,
    Night,
    Evening,
    Day,
}

pub fn time_band(local_hour: u32) -> TimeBand {
    match local_hour % 24 {
        2..=4 => TimeBand::LateNight,
        0 | 1 | 5 => TimeBand::Night,
        18..=23 => TimeBand::Evening,
        _ => TimeBand::Day,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{normalize_address, KnownAddress};
    use chrono::Utc;

    #[test]
    fn test_address_novelty_tiers() {
        let now = Utc::now();
        let mut profile = BehaviorProfile::new("s1", 120.0, now);
        profile.amount_mean = 1.0;
        profile.known_addresses.insert(
            normalize_address("0xKnown"),
            KnownAddress { first_seen: now, interaction_count: 5 },
        );

        assert_eq!(
            address_novelty("0xKNOWN", 10.0, &profile),
            AddressNovelty::Known { interactions: 5 }
        );
        assert_eq!(address_novelty("0xnew", 1.5, &profile), AddressNovelty::New);
        assert_eq!(address_novelty("0xnew", 2.5, &profile), AddressNovelty::NewWithHighAmount);
    }

    #[test]
    fn test_fresh_profile_never_flags_high_amount() {
        let profile = BehaviorProfile::new("s1", 120.0, Utc::now());
        assert_eq!(address_novelty("0xnew", 1000.0, &profile), AddressNovelty::New);
    }

    #[test]
    fn test_time_bands() {
        assert_eq!(time_band(3), TimeBand::LateNight);
        assert_eq!(time_band(0), TimeBand::Night);
        assert_eq!(time_band(5), TimeBand::Night);
        assert_eq!(time_band(6), TimeBand::Day);
        assert_eq!(time_band(14), TimeBand::Day);
        assert_eq!(time_band(21), TimeBand::Evening);
    }
}
