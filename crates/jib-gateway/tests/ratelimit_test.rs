use std::time::Duration;

use jib_gateway::ratelimit::{OpClass, RateLimiter, RateLimitExceeded, RateLimits};

#[tokio::test(start_paused = true)]
async fn class_window_slides() {
    let limiter = RateLimiter::new(RateLimits::default().with_limit(OpClass::GitPush, 2));

    assert!(limiter.check_and_record(OpClass::GitPush).is_ok());
    assert!(limiter.check_and_record(OpClass::GitPush).is_ok());
    let denied = limiter.check_and_record(OpClass::GitPush).unwrap_err();
    assert!(matches!(
        denied,
        RateLimitExceeded::Class { class: "git_push", count: 2, limit: 2 }
    ));

    // Just inside the window: still full.
    tokio::time::advance(Duration::from_secs(3599)).await;
    assert!(limiter.check_and_record(OpClass::GitPush).is_err());

    // Past the window: the old entries fall out.
    tokio::time::advance(Duration::from_secs(2)).await;
    assert!(limiter.check_and_record(OpClass::GitPush).is_ok());
}

#[tokio::test(start_paused = true)]
async fn combined_counts_every_class() {
    let limiter = RateLimiter::new(RateLimits::default().with_combined(3));

    assert!(limiter.check_and_record(OpClass::GitPush).is_ok());
    assert!(limiter.check_and_record(OpClass::GitFetch).is_ok());
    assert!(limiter.check_and_record(OpClass::GhPrComment).is_ok());

    let denied = limiter.check_and_record(OpClass::GhExecute).unwrap_err();
    assert!(matches!(denied, RateLimitExceeded::Combined { count: 3, limit: 3 }));
    assert!(denied.to_string().contains("Combined rate limit exceeded: 3/3"));
}

#[tokio::test(start_paused = true)]
async fn denied_requests_are_not_recorded() {
    let limiter = RateLimiter::new(RateLimits::default().with_limit(OpClass::GhPrEdit, 1));

    assert!(limiter.check_and_record(OpClass::GhPrEdit).is_ok());
    for _ in 0..10 {
        assert!(limiter.check_and_record(OpClass::GhPrEdit).is_err());
    }

    // Only the single accepted request ages out; denials left no residue.
    tokio::time::advance(Duration::from_secs(3601)).await;
    assert!(limiter.check_and_record(OpClass::GhPrEdit).is_ok());
}

#[test]
fn overrides_never_exceed_the_combined_cap() {
    let limits = RateLimits::default()
        .with_combined(10_000)
        .with_limit(OpClass::GitPush, 9_999);
    let limiter = RateLimiter::new(limits);

    // The cap is 4000; both the combined and the class limit were clamped.
    // Recording 4000 requests must exhaust the combined window.
    for _ in 0..4000 {
        assert!(limiter.check_and_record(OpClass::GitPush).is_ok());
    }
    assert!(limiter.check_and_record(OpClass::GitPush).is_err());
}
