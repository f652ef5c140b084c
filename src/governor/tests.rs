//! Unit tests for governor module

#[cfg(test)]
mod tests {
    use super::super::*;

    fn limits(max_hourly: u32, max_daily: u32) -> LimitsConfig {
        LimitsConfig {
            max_hourly,
            max_daily,
            rng_seed: Some(7),
            ..LimitsConfig::default()
        }
    }

    #[test]
    fn test_first_send_is_allowed() {
        let now = Instant::now();
        let mut state = RateState::new(now, Some(1));
        assert_eq!(state.admit(now, &LimitsConfig::default()), Admission::Allow);
    }

    #[test]
    fn test_spacing_after_send() {
        let limits = LimitsConfig {
            rng_seed: Some(1),
            ..LimitsConfig::default()
        };
        let t0 = Instant::now();
        let mut state = RateState::new(t0, limits.rng_seed);
        state.record_send(t0, &limits);

        match state.admit(t0, &limits) {
            Admission::Wait {
                delay,
                reason: WaitReason::Spacing,
            } => {
                assert!(delay >= Duration::from_secs(9));
                assert!(delay <= Duration::from_millis(12_500));
            }
            other => panic!("expected spacing wait, got {:?}", other),
        }

        assert_eq!(state.admit(t0 + Duration::from_secs(13), &limits), Admission::Allow);
    }

    #[test]
    fn test_near_ceiling_adds_spacing_after_threshold() {
        let limits = LimitsConfig {
            max_hourly: 35,
            jitter_min_ms: 0,
            jitter_max_ms: 0,
            human_pauses: false,
            rng_seed: Some(1),
            ..LimitsConfig::default()
        };
        let t0 = Instant::now();
        let mut state = RateState::new(t0, limits.rng_seed);
        let mut t = t0;
        for _ in 0..30 {
            t += Duration::from_secs(60);
            state.record_send(t, &limits);
        }
        // exactly at the threshold: plain spacing
        assert_eq!(
            state.admit(t, &limits),
            Admission::Wait {
                delay: Duration::from_secs(8),
                reason: WaitReason::Spacing
            }
        );

        t += Duration::from_secs(60);
        state.record_send(t, &limits);
        assert_eq!(
            state.admit(t, &limits),
            Admission::Wait {
                delay: Duration::from_secs(10),
                reason: WaitReason::Spacing
            }
        );
    }

    #[test]
    fn test_daily_cap_denies() {
        let limits = limits(100, 3);
        let t0 = Instant::now();
        let mut state = RateState::new(t0, limits.rng_seed);
        for i in 1..=3 {
            state.record_send(t0 + Duration::from_secs(i * 60), &limits);
        }
        let now = t0 + Duration::from_secs(600);
        match state.admit(now, &limits) {
            Admission::Deny { retry_after } => {
                assert!(retry_after > Duration::from_secs(23 * 3600));
            }
            other => panic!("expected deny, got {:?}", other),
        }
        assert!(state.daily_exhausted(now, &limits));

        // next day the window rolls
        let tomorrow = t0 + DAY + Duration::from_secs(3600);
        assert_eq!(state.admit(tomorrow, &limits), Admission::Allow);
    }

    #[test]
    fn test_hourly_ceiling_waits_then_resets() {
        let limits = LimitsConfig {
            hourly_cooldown_secs: 900,
            ..limits(3, 100)
        };
        let t0 = Instant::now();
        let mut state = RateState::new(t0, limits.rng_seed);
        for i in 0..3 {
            state.record_send(t0 + Duration::from_secs(i * 20), &limits);
        }

        let now = t0 + Duration::from_secs(100);
        let delay = match state.admit(now, &limits) {
            Admission::Wait {
                delay,
                reason: WaitReason::HourlyCeiling,
            } => delay,
            other => panic!("expected hourly wait, got {:?}", other),
        };
        // the first send leaves the trailing hour at t0 + 3600
        assert_eq!(delay, Duration::from_secs(3500));

        // still cooling down halfway through
        assert!(matches!(
            state.admit(now + Duration::from_secs(1000), &limits),
            Admission::Wait {
                reason: WaitReason::HourlyCeiling,
                ..
            }
        ));

        assert_eq!(state.admit(now + delay, &limits), Admission::Allow);
        assert_eq!(state.hourly_count, 0);
    }

    #[test]
    fn test_cooldown_floor_applies_when_history_is_old() {
        let limits = LimitsConfig {
            hourly_cooldown_secs: 900,
            ..limits(3, 100)
        };
        let t0 = Instant::now();
        let mut state = RateState::new(t0, limits.rng_seed);
        for i in 0..3 {
            state.record_send(t0 + Duration::from_secs(i * 1000), &limits);
        }
        // counter is at the ceiling but the first send is about to age out
        let now = t0 + Duration::from_secs(3500);
        assert_eq!(
            state.admit(now, &limits),
            Admission::Wait {
                delay: Duration::from_secs(900),
                reason: WaitReason::HourlyCeiling
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_forty_sixth_send_waits_for_hourly_window() {
        let governor = RateGovernor::new(limits(45, 400));
        let mut sent_at = Vec::new();

        for _ in 0..46 {
            let permit = governor.acquire().await.expect("daily cap not reached");
            sent_at.push(Instant::now());
            permit.commit();
        }

        let first = sent_at[0];
        assert!(sent_at[44].duration_since(first) < HOUR);
        assert!(sent_at[45].duration_since(first) >= HOUR);
        for pair in sent_at.windows(2) {
            assert!(pair[1].duration_since(pair[0]) >= Duration::from_secs(9));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_sends_never_exceed_caps() {
        let limits = LimitsConfig {
            max_hourly: 5,
            max_daily: 12,
            min_send_delay_secs: 1,
            jitter_min_ms: 0,
            jitter_max_ms: 500,
            hourly_cooldown_secs: 60,
            human_pauses: false,
            rng_seed: Some(42),
            ..LimitsConfig::default()
        };
        let governor = RateGovernor::new(limits.clone());
        let mut sent_at = Vec::new();

        while sent_at.len() < 40 {
            match governor.acquire().await {
                Some(permit) => {
                    sent_at.push(Instant::now());
                    permit.commit();
                }
                None => tokio::time::sleep(Duration::from_secs(1800)).await,
            }
        }

        for (i, start) in sent_at.iter().enumerate() {
            let in_hour = sent_at[i..]
                .iter()
                .take_while(|t| t.duration_since(*start) < HOUR)
                .count();
            let in_day = sent_at[i..]
                .iter()
                .take_while(|t| t.duration_since(*start) < DAY)
                .count();
            assert!(in_hour <= limits.max_hourly as usize, "hour from send {}", i);
            assert!(in_day <= limits.max_daily as usize, "day from send {}", i);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_permit_records_nothing() {
        let governor = RateGovernor::new(limits(45, 400));
        {
            let _permit = governor.acquire().await.unwrap();
        }
        assert_eq!(governor.snapshot().daily_count, 0);
        assert_eq!(governor.admit().await, Admission::Allow);

        governor.acquire().await.unwrap().commit();
        let snapshot = governor.snapshot();
        assert_eq!(snapshot.daily_count, 1);
        assert_eq!(snapshot.daily_remaining, 399);
        assert_eq!(snapshot.total_sent, 1);
        assert!(snapshot.last_send_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_daily_cap_reached_reflects_state() {
        let governor = RateGovernor::new(LimitsConfig {
            min_send_delay_secs: 0,
            ..limits(45, 2)
        });
        assert!(!governor.daily_cap_reached().await);
        governor.acquire().await.unwrap().commit();
        governor.acquire().await.unwrap().commit();
        assert!(governor.daily_cap_reached().await);
        assert!(governor.acquire().await.is_none());
        assert_eq!(governor.snapshot().daily_remaining, 0);
    }
}
