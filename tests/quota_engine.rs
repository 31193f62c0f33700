use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};
use futures_util::future::join_all;
use listing_quota::config::QuotaSettings;
use listing_quota::pricing::{PricingAuditEventType, PricingDefaults};
use listing_quota::{
    InMemoryDirectory, InMemoryQuotaStore, Phase, PriceUpdate, PricingConfig, QuotaEngine,
    QuotaError, QuotaStore,
};
use serde_json::json;
use uuid::Uuid;

// key: quota-engine-tests -> phase gating, period isolation, concurrency

struct TestClock(Arc<Mutex<DateTime<Utc>>>);

impl TestClock {
    fn new(start: DateTime<Utc>) -> Self {
        Self(Arc::new(Mutex::new(start)))
    }

    fn set(&self, now: DateTime<Utc>) {
        *self.0.lock().unwrap() = now;
    }

    fn engine_clock(&self) -> listing_quota::engine::Clock {
        let inner = self.0.clone();
        Arc::new(move || *inner.lock().unwrap())
    }
}

struct Fixture {
    engine: QuotaEngine,
    store: Arc<InMemoryQuotaStore>,
    directory: Arc<InMemoryDirectory>,
    clock: TestClock,
}

async fn fixture(now: DateTime<Utc>, launch_end: DateTime<Utc>, free_limit: i32) -> Fixture {
    let store = Arc::new(InMemoryQuotaStore::new());
    let directory = Arc::new(InMemoryDirectory::new());
    let mut seed = PricingConfig::with_defaults(&PricingDefaults::default(), now);
    seed.launch_phase_end_date = launch_end;
    store.get_or_create_config(&seed).await.unwrap();

    let clock = TestClock::new(now);
    let settings = QuotaSettings {
        free_listings_per_month: free_limit,
        ..QuotaSettings::default()
    };
    let engine =
        QuotaEngine::new(store.clone(), directory.clone(), settings).with_clock(clock.engine_clock());
    Fixture {
        engine,
        store,
        directory,
        clock,
    }
}

fn mid_march() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap()
}

#[tokio::test]
async fn launch_phase_allows_everyone_until_end_date() {
    let now = mid_march();
    let fx = fixture(now, now + Duration::days(1), 3).await;

    for _ in 0..5 {
        let (allowed, quota) = fx
            .engine
            .can_create_free_listing(Uuid::new_v4())
            .await
            .unwrap();
        assert!(allowed);
        assert!(quota.is_none());
    }
    assert!(fx.engine.is_free_launch_active().await.unwrap());

    fx.clock.set(now + Duration::days(2));
    assert!(!fx.engine.is_free_launch_active().await.unwrap());
    assert_eq!(fx.engine.current_phase().await.unwrap(), Phase::LaunchFree);
    let (allowed, quota) = fx
        .engine
        .can_create_free_listing(Uuid::new_v4())
        .await
        .unwrap();
    assert!(allowed);
    assert_eq!(quota.unwrap().free_listings_used, 0);
}

#[tokio::test]
async fn fourth_free_listing_after_launch_is_refused() {
    let now = mid_march();
    let fx = fixture(now, now - Duration::days(1), 3).await;
    let user = Uuid::new_v4();

    for _ in 0..3 {
        fx.engine.consume_free_listing(user).await.unwrap();
    }
    let err = fx.engine.consume_free_listing(user).await.unwrap_err();
    assert!(matches!(err, QuotaError::QuotaExhausted));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_consumption_never_exceeds_limit() {
    let now = mid_march();
    let limit = 3;
    let extra = 9;
    let fx = fixture(now, now - Duration::days(1), limit).await;
    let user = Uuid::new_v4();

    let tasks = (0..(limit + extra)).map(|_| {
        let engine = fx.engine.clone();
        tokio::spawn(async move { engine.consume_free_listing(user).await })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked"))
        .collect();

    let granted = results.iter().filter(|r| matches!(r, Ok(Some(_)))).count();
    let refused = results
        .iter()
        .filter(|r| matches!(r, Err(QuotaError::QuotaExhausted)))
        .count();
    assert_eq!(granted, limit as usize);
    assert_eq!(refused, extra as usize);

    let period = fx.engine.current_period().unwrap();
    let quota = fx.store.find_quota(user, period).await.unwrap();
    assert_eq!(quota.free_listings_used, limit);
    assert_eq!(fx.store.quota_count().await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_touch_creates_one_row() {
    let now = mid_march();
    let fx = fixture(now, now - Duration::days(1), 3).await;
    let user = Uuid::new_v4();

    let tasks = (0..16).map(|_| {
        let engine = fx.engine.clone();
        tokio::spawn(async move { engine.current_quota(user).await })
    });
    let ids: Vec<Uuid> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap().id)
        .collect();

    assert!(ids.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(fx.store.quota_count().await, 1);
}

#[tokio::test]
async fn periods_are_isolated() {
    let march = mid_march();
    let fx = fixture(march, march - Duration::days(30), 2).await;
    let user = Uuid::new_v4();

    fx.engine.consume_free_listing(user).await.unwrap();
    fx.engine.consume_free_listing(user).await.unwrap();
    assert!(fx.engine.consume_free_listing(user).await.is_err());

    fx.clock.set(Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap());
    let (allowed, quota) = fx.engine.can_create_free_listing(user).await.unwrap();
    assert!(allowed);
    let april = quota.unwrap();
    assert_eq!(april.free_listings_used, 0);
    assert_eq!(april.month, 4);
    fx.engine.consume_free_listing(user).await.unwrap();

    fx.clock.set(Utc.with_ymd_and_hms(2027, 3, 10, 0, 0, 0).unwrap());
    let quota = fx.engine.current_quota(user).await.unwrap();
    assert_eq!(quota.free_listings_used, 0);

    let march_row = fx
        .store
        .find_quota(user, listing_quota::Period::new(3, 2026).unwrap())
        .await
        .unwrap();
    assert_eq!(march_row.free_listings_used, 2);
}

#[tokio::test]
async fn paid_listings_are_recorded_in_every_phase() {
    let now = mid_march();
    let fx = fixture(now, now + Duration::days(30), 3).await;
    let admin = Uuid::new_v4();
    fx.directory.add_user(admin).await;
    let user = Uuid::new_v4();

    assert_eq!(fx.engine.add_paid_listing(user).await.unwrap().paid_listings, 1);
    fx.engine.transition_global_to_next_phase(admin).await.unwrap();
    assert_eq!(fx.engine.add_paid_listing(user).await.unwrap().paid_listings, 2);
    fx.engine.transition_global_to_next_phase(admin).await.unwrap();
    let quota = fx.engine.add_paid_listing(user).await.unwrap();
    assert_eq!(quota.paid_listings, 3);
    assert_eq!(quota.free_listings_used, 0);
}

#[tokio::test]
async fn price_update_is_attributed_to_admin() {
    let now = mid_march();
    let fx = fixture(now, now + Duration::days(30), 3).await;
    let admin = Uuid::new_v4();
    fx.directory.add_user(admin).await;

    fx.engine
        .update_global_prices(
            PriceUpdate::from([("standard_listing_price".to_string(), json!(500))]),
            admin,
        )
        .await
        .unwrap();

    let config = fx.engine.global_config().await.unwrap();
    assert_eq!(config.standard_listing_price, 500);
    assert_eq!(config.updated_by, Some(admin));

    let err = fx
        .engine
        .update_global_prices(
            PriceUpdate::from([("current_phase".to_string(), json!("paid_system"))]),
            admin,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, QuotaError::InvalidPriceField(_)));

    let audit = fx.engine.pricing_audit_log(10).await.unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].event_type, PricingAuditEventType::PricesUpdated);
    assert_eq!(audit[0].admin_id, admin);
}

#[tokio::test]
async fn phase_only_moves_forward() {
    let now = mid_march();
    let fx = fixture(now, now + Duration::days(30), 3).await;
    let admin = Uuid::new_v4();
    fx.directory.add_user(admin).await;

    let config = fx.engine.transition_global_to_next_phase(admin).await.unwrap();
    assert_eq!(config.current_phase, Phase::CreditSystem);
    assert_eq!(config.updated_by, Some(admin));

    let config = fx.engine.transition_global_to_next_phase(admin).await.unwrap();
    assert_eq!(config.current_phase, Phase::PaidSystem);
    assert!(config.paid_system_active);

    let err = fx
        .engine
        .transition_global_to_next_phase(admin)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        QuotaError::InvalidTransition {
            from: Phase::PaidSystem
        }
    ));
    assert_eq!(fx.engine.current_phase().await.unwrap(), Phase::PaidSystem);

    let audit = fx.engine.pricing_audit_log(10).await.unwrap();
    assert_eq!(audit.len(), 2);
    assert_eq!(audit[0].payload["to"], json!("paid_system"));
    assert_eq!(audit[1].payload["from"], json!("launch_free"));
}

#[tokio::test]
async fn concurrent_transitions_are_serialized() {
    let now = mid_march();
    let fx = fixture(now, now + Duration::days(30), 3).await;
    let admin = Uuid::new_v4();
    fx.directory.add_user(admin).await;

    let tasks = (0..5).map(|_| {
        let engine = fx.engine.clone();
        tokio::spawn(async move { engine.transition_global_to_next_phase(admin).await })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 2);
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Err(QuotaError::InvalidTransition { .. })))
            .count(),
        3
    );
    assert_eq!(fx.engine.current_phase().await.unwrap(), Phase::PaidSystem);
}

#[tokio::test]
async fn launch_extension_reopens_free_publishing() {
    let now = mid_march();
    let fx = fixture(now, now - Duration::days(1), 3).await;
    let admin = Uuid::new_v4();
    fx.directory.add_user(admin).await;
    assert!(!fx.engine.is_free_launch_active().await.unwrap());

    let new_end = now + Duration::days(14);
    let config = fx.engine.extend_launch_phase(new_end, admin).await.unwrap();
    assert_eq!(config.launch_phase_end_date, new_end);
    assert!(fx.engine.is_free_launch_active().await.unwrap());
    assert_eq!(fx.engine.days_until_launch_end().await.unwrap(), 14);

    fx.engine.transition_global_to_next_phase(admin).await.unwrap();
    let err = fx
        .engine
        .extend_launch_phase(now + Duration::days(60), admin)
        .await
        .unwrap_err();
    assert!(matches!(err, QuotaError::LaunchPhaseClosed { .. }));
}

#[tokio::test]
async fn stats_report_revenue_outside_launch() {
    let now = mid_march();
    let fx = fixture(now, now - Duration::days(1), 3).await;
    let (alice, bob, carol) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    for user in [alice, bob, carol] {
        fx.directory.add_user(user).await;
    }
    fx.directory.add_listing(true, now - Duration::days(40)).await;
    fx.directory.add_listing(false, now - Duration::days(2)).await;
    fx.directory.add_listing(true, now - Duration::hours(1)).await;

    fx.engine.consume_free_listing(alice).await.unwrap();
    fx.engine.consume_free_listing(alice).await.unwrap();
    fx.engine.add_paid_listing(bob).await.unwrap();
    fx.engine.add_paid_listing(bob).await.unwrap();

    let stats = fx.engine.platform_stats().await.unwrap();
    assert_eq!(stats.total_users, 3);
    assert_eq!(stats.total_listings, 3);
    assert_eq!(stats.active_listings, 2);
    assert_eq!(stats.listings_this_period, 2);
    assert_eq!(stats.free_listings_this_period, 2);
    assert_eq!(stats.paid_listings_this_period, 2);
    assert_eq!(stats.active_users_this_period, 2);
    assert_eq!(stats.estimated_revenue, 1000);
    assert_eq!(stats.period, "03/2026");
}

#[tokio::test]
async fn history_defaults_to_six_periods() {
    let now = mid_march();
    let fx = fixture(now, now - Duration::days(1), 3).await;
    let user = Uuid::new_v4();
    fx.directory.add_user(user).await;

    for month in 1..=12 {
        fx.store
            .get_or_create_quota(user, listing_quota::Period::new(month, 2025).unwrap(), 3, now)
            .await
            .unwrap();
    }

    let history = fx.engine.user_quota_history(user, 0).await.unwrap();
    assert_eq!(history.len(), 6);
    assert_eq!(history[0].month, 12);
    assert_eq!(history[5].month, 7);

    let history = fx.engine.user_quota_history(user, 2).await.unwrap();
    assert_eq!(history.len(), 2);

    let err = fx
        .engine
        .user_quota_history(Uuid::new_v4(), 3)
        .await
        .unwrap_err();
    assert!(matches!(err, QuotaError::InvalidUser(_)));
}
