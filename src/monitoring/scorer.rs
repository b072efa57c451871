use crate::models::{SignalFeatures, SignalScore, Tier};

/// Composite quality score for a threshold crossing.
///
/// Every bucket contributes independently and an unknown feature contributes
/// nothing. Stateless: the same features always produce the same score.
pub struct SignalScorer;

impl SignalScorer {
    pub fn score(features: &SignalFeatures) -> SignalScore {
        let score = Self::float_points(features.float_shares)
            + Self::relative_volume_points(features.relative_volume)
            + Self::rotation_points(features.volume_float_ratio)
            + Self::rsi_points(features.rsi)
            + Self::move_points(features.abs_pct_change);

        SignalScore {
            score,
            tier: Self::tier_for(score),
        }
    }

    pub fn tier_for(score: i32) -> Tier {
        if score >= 11 {
            Tier::A
        } else if score >= 8 {
            Tier::B
        } else if score >= 5 {
            Tier::C
        } else {
            Tier::D
        }
    }

    // Smaller float is better; a non-positive float is bad data
    fn float_points(float_shares: Option<f64>) -> i32 {
        let millions = match float_shares {
            Some(shares) if shares > 0.0 => shares / 1_000_000.0,
            _ => return 0,
        };

        if millions < 1.0 {
            4
        } else if millions < 3.0 {
            3
        } else if millions < 10.0 {
            2
        } else if millions < 20.0 {
            1
        } else {
            0
        }
    }

    fn relative_volume_points(relative_volume: Option<f64>) -> i32 {
        match relative_volume {
            Some(rv) if rv >= 10.0 => 3,
            Some(rv) if rv >= 5.0 => 2,
            Some(rv) if rv >= 3.0 => 1,
            _ => 0,
        }
    }

    fn rotation_points(ratio: Option<f64>) -> i32 {
        match ratio {
            Some(r) if r >= 2.0 => 3,
            Some(r) if r >= 1.0 => 2,
            Some(r) if r >= 0.5 => 1,
            _ => 0,
        }
    }

    fn rsi_points(rsi: Option<f64>) -> i32 {
        match rsi {
            Some(r) if (35.0..60.0).contains(&r) => 2,
            Some(r) if (60.0..75.0).contains(&r) => 3,
            Some(r) if (75.0..85.0).contains(&r) => 1,
            // Overbought
            Some(r) if r >= 90.0 => -2,
            _ => 0,
        }
    }

    fn move_points(abs_pct_change: f64) -> i32 {
        let mut points = 0;
        if abs_pct_change >= 20.0 {
            points += 1;
        }
        if abs_pct_change >= 30.0 {
            points += 1;
        }
        points
    }
}
