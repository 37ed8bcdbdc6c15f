pub fn sample_to_percent(raw: u16) -> u8 {
    let scaled = u32::from(raw) * 100;
    ((scaled + u32::from(u16::MAX) / 2) / u32::from(u16::MAX)) as u8
}

pub fn percent_to_duty(pct: u8) -> u16 {
    assert!(pct <= 100, "percentage out of range: {pct}");
    let scaled = u32::from(pct) * u32::from(u16::MAX);
    ((scaled + 50) / 100) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    // one percent in duty units, rounded up
    const PERCENT_QUANTUM: u16 = 656;

    #[test]
    fn endpoints_map_exactly() {
        assert_eq!(sample_to_percent(0), 0);
        assert_eq!(sample_to_percent(u16::MAX), 100);
        assert_eq!(percent_to_duty(0), 0);
        assert_eq!(percent_to_duty(100), u16::MAX);
    }

    #[test]
    fn midpoint_rounds_to_half_scale() {
        assert_eq!(sample_to_percent(32767), 50);
        assert_eq!(percent_to_duty(50), 32768);
    }

    #[test]
    fn percent_round_trip_is_exact() {
        for pct in 0..=100_u8 {
            assert_eq!(sample_to_percent(percent_to_duty(pct)), pct);
        }
    }

    #[test]
    fn raw_round_trip_stays_within_one_percent_quantum() {
        for raw in (0..=u16::MAX).step_by(37) {
            let back = percent_to_duty(sample_to_percent(raw));
            let error = i32::from(back) - i32::from(raw);
            assert!(
                error.unsigned_abs() <= u32::from(PERCENT_QUANTUM),
                "raw {raw} round-tripped to {back}"
            );
        }
    }

    #[test]
    fn sample_to_percent_is_monotonic() {
        let mut previous = 0;
        for raw in 0..=u16::MAX {
            let pct = sample_to_percent(raw);
            assert!(pct >= previous, "regression at raw {raw}");
            previous = pct;
        }
    }

    #[test]
    #[should_panic(expected = "percentage out of range")]
    fn out_of_range_percent_panics() {
        let _ = percent_to_duty(101);
    }
}
