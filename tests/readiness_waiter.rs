#[path = "support/mod.rs"]
mod support;

use safe_ops::readiness::{
    CheckCategory, ReadinessWaiter, ServiceSpec, ServiceStatus, WaitError, WaitOptions,
};
use std::time::Duration;
use support::{graph, policy, service, CallLog, ScriptedProbe};
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn api_ready_on_third_attempt_after_four_seconds() {
    let log = CallLog::new();
    let graph = graph(vec![
        service("db", ScriptedProbe::healthy("db", &log), policy(5, 2, 10)),
        service("cache", ScriptedProbe::healthy("cache", &log), policy(5, 2, 10)),
        service("api", ScriptedProbe::healthy_after("api", 2, &log), policy(5, 2, 60)),
    ]);

    let started = Instant::now();
    let report = ReadinessWaiter::default()
        .wait(&graph)
        .await
        .expect("all services ready");

    assert!(report.all_ready());
    let api = report.service("api").expect("api report");
    assert_eq!(api.status, ServiceStatus::Ready);
    assert_eq!(api.attempts, 3);
    assert_eq!(api.elapsed, Duration::from_secs(4));
    assert_eq!(api.results.len(), 3);
    assert_eq!(
        api.results.iter().map(|result| result.success).collect::<Vec<_>>(),
        [false, false, true]
    );
    assert_eq!(started.elapsed(), Duration::from_secs(4));
    assert_eq!(log.calls(), ["db", "cache", "api", "api", "api"]);
}

#[tokio::test(start_paused = true)]
async fn api_never_ready_times_out_and_stops_the_chain() {
    let log = CallLog::new();
    let graph = graph(vec![
        service("db", ScriptedProbe::healthy("db", &log), policy(5, 2, 10)),
        service("cache", ScriptedProbe::healthy("cache", &log), policy(5, 2, 10)),
        service("api", ScriptedProbe::unhealthy("api", &log), policy(5, 2, 10)),
        service("worker", ScriptedProbe::healthy("worker", &log), policy(5, 2, 10)),
    ]);

    let err = ReadinessWaiter::default()
        .wait(&graph)
        .await
        .expect_err("api never becomes ready");

    let WaitError::Timeout(timeout) = &err else {
        panic!("expected a timeout, got {err:?}");
    };
    assert_eq!(timeout.service, "api");
    assert_eq!(timeout.attempts, 5);
    assert_eq!(timeout.elapsed, Duration::from_secs(8));
    assert!(timeout
        .last_reason
        .as_deref()
        .is_some_and(|reason| reason.contains("api not ready")));
    assert!(err.to_string().contains("service `api` not ready after 5 attempt(s)"));

    assert_eq!(log.count("api"), 5);
    assert_eq!(log.count("worker"), 0);

    let report = err.report();
    assert_eq!(report.service("api").map(|s| s.status), Some(ServiceStatus::TimedOut));
    assert_eq!(
        report.service("worker").map(|s| s.status),
        Some(ServiceStatus::Skipped)
    );
    assert_eq!(report.first_failure().map(|s| s.name.as_str()), Some("api"));
}

#[tokio::test(start_paused = true)]
async fn timeout_ends_retries_before_max_attempts() {
    let log = CallLog::new();
    let graph = graph(vec![service(
        "db",
        ScriptedProbe::unhealthy("db", &log),
        policy(100, 2, 5),
    )]);

    let err = ReadinessWaiter::default()
        .wait(&graph)
        .await
        .expect_err("db never ready");

    // Attempts at 0s, 2s, 4s and 5s; the last sleep is cut to the remaining 1s.
    assert_eq!(err.report().total_attempts(), 4);
    assert_eq!(log.count("db"), 4);
}

#[tokio::test(start_paused = true)]
async fn final_attempt_lands_on_the_timeout_not_past_it() {
    let log = CallLog::new();
    let graph = graph(vec![service(
        "api",
        ScriptedProbe::unhealthy("api", &log),
        policy(100, 3, 10),
    )]);

    let started = Instant::now();
    let err = ReadinessWaiter::default()
        .wait(&graph)
        .await
        .expect_err("api never ready");

    let WaitError::Timeout(timeout) = &err else {
        panic!("expected a timeout, got {err:?}");
    };
    // Attempts at 0s, 3s, 6s, 9s and 10s.
    assert_eq!(timeout.attempts, 5);
    assert_eq!(timeout.elapsed, Duration::from_secs(10));
    assert_eq!(started.elapsed(), Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn healthy_stack_takes_one_attempt_each_and_no_sleep() {
    let log = CallLog::new();
    let graph = graph(
        ["db", "cache", "api"]
            .into_iter()
            .map(|name| service(name, ScriptedProbe::healthy(name, &log), policy(5, 2, 10)))
            .collect(),
    );

    let started = Instant::now();
    let report = ReadinessWaiter::default().wait(&graph).await.expect("ready");

    assert!(report.services.iter().all(|service| service.attempts == 1));
    assert_eq!(report.total_attempts(), 3);
    assert_eq!(started.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn execution_error_fails_without_retrying() {
    let log = CallLog::new();
    let graph = graph(vec![
        service("db", ScriptedProbe::broken("db", &log), policy(5, 2, 10)),
        service("api", ScriptedProbe::healthy("api", &log), policy(5, 2, 10)),
    ]);

    let err = ReadinessWaiter::default()
        .wait(&graph)
        .await
        .expect_err("probe tool missing");

    assert!(matches!(err, WaitError::Execution { ref service, .. } if service == "db"));
    assert_eq!(log.calls(), ["db"]);
    assert_eq!(
        err.report().service("db").map(|s| s.status),
        Some(ServiceStatus::Failed)
    );
}

#[tokio::test(start_paused = true)]
async fn gating_probes_stop_at_first_unhealthy() {
    let log = CallLog::new();
    let spec = ServiceSpec::new("cache", policy(2, 1, 10))
        .with_probe(CheckCategory::Container, ScriptedProbe::unhealthy("container", &log))
        .with_probe(CheckCategory::Port, ScriptedProbe::healthy("port", &log))
        .with_audit_probe(CheckCategory::Health, ScriptedProbe::healthy("audit-only", &log));
    let graph = graph(vec![spec]);

    let _ = ReadinessWaiter::default().wait(&graph).await;

    assert_eq!(log.calls(), ["container", "container"]);
}

#[tokio::test(start_paused = true)]
async fn hanging_probe_counts_as_unhealthy() {
    let log = CallLog::new();
    let spec = ServiceSpec::new("api", policy(2, 1, 30))
        .with_probe(CheckCategory::Health, ScriptedProbe::hanging("api", &log))
        .with_probe_timeout(Duration::from_secs(3));
    let graph = graph(vec![spec]);

    let err = ReadinessWaiter::default()
        .wait(&graph)
        .await
        .expect_err("probe never answers");

    let WaitError::Timeout(timeout) = err else {
        panic!("expected a timeout");
    };
    assert_eq!(timeout.attempts, 2);
    // Two 3s probe timeouts and one 1s interval.
    assert_eq!(timeout.elapsed, Duration::from_secs(7));
    assert!(timeout
        .last_reason
        .is_some_and(|reason| reason.contains("timed out after 3s")));
}

#[tokio::test(start_paused = true)]
async fn keep_going_checks_every_service() {
    let log = CallLog::new();
    let graph = graph(vec![
        service("db", ScriptedProbe::unhealthy("db", &log), policy(2, 1, 10)),
        service("cache", ScriptedProbe::broken("cache", &log), policy(2, 1, 10)),
        service("api", ScriptedProbe::healthy("api", &log), policy(2, 1, 10)),
    ]);

    let report = ReadinessWaiter::new(WaitOptions {
        continue_on_failure: true,
    })
    .wait(&graph)
    .await
    .expect("keep going returns a report");

    let statuses: Vec<_> = report.services.iter().map(|s| s.status).collect();
    assert_eq!(
        statuses,
        [ServiceStatus::TimedOut, ServiceStatus::Failed, ServiceStatus::Ready]
    );
    assert!(!report.all_ready());
    assert_eq!(report.first_failure().map(|s| s.name.as_str()), Some("db"));
}

#[tokio::test(start_paused = true)]
async fn cancelled_before_start_probes_nothing() {
    let log = CallLog::new();
    let graph = graph(vec![
        service("db", ScriptedProbe::healthy("db", &log), policy(5, 2, 10)),
        service("api", ScriptedProbe::healthy("api", &log), policy(5, 2, 10)),
    ]);
    let token = CancellationToken::new();
    token.cancel();

    let err = ReadinessWaiter::default()
        .with_cancellation(token)
        .wait(&graph)
        .await
        .expect_err("cancelled");

    assert!(matches!(err, WaitError::Cancelled { ref service, .. } if service == "db"));
    assert!(log.calls().is_empty());
    assert_eq!(err.report().skipped().collect::<Vec<_>>(), ["api"]);
}

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_retry_sleep() {
    let log = CallLog::new();
    let graph = graph(vec![service(
        "db",
        ScriptedProbe::unhealthy("db", &log),
        policy(10, 2, 60),
    )]);
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        sleep(Duration::from_secs(3)).await;
        trigger.cancel();
    });

    let err = ReadinessWaiter::default()
        .with_cancellation(token)
        .wait(&graph)
        .await
        .expect_err("cancelled mid-wait");

    assert!(matches!(err, WaitError::Cancelled { .. }));
    assert_eq!(log.count("db"), 2);
    assert_eq!(
        err.report().service("db").map(|s| s.status),
        Some(ServiceStatus::Cancelled)
    );
}
