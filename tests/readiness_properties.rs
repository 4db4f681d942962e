#[path = "support/mod.rs"]
mod support;

use proptest::prelude::*;
use safe_ops::audit::ConnectivityAuditor;
use safe_ops::readiness::{ReadinessWaiter, ServiceStatus, WaitError};
use support::{graph, policy, service, CallLog, ScriptedProbe};

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .expect("runtime")
}

/// `Some(n)`: ready after `n` failed attempts. `None`: never ready.
fn readiness_plan() -> impl Strategy<Value = Vec<Option<usize>>> {
    prop::collection::vec(prop::option::weighted(0.8, 0usize..6), 1..6)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn waiter_never_probes_ahead_of_an_unfinished_service(
        plan in readiness_plan(),
        max_attempts in 1u32..6,
    ) {
        let log = CallLog::new();
        let names: Vec<String> = (0..plan.len()).map(|index| format!("svc{index}")).collect();
        let specs = plan
            .iter()
            .zip(&names)
            .map(|(step, name)| {
                let probe = match step {
                    Some(failures) => ScriptedProbe::healthy_after(name, *failures, &log),
                    None => ScriptedProbe::unhealthy(name, &log),
                };
                service(name, probe, policy(max_attempts, 1, 3600))
            })
            .collect();
        let graph = graph(specs);

        let outcome = paused_runtime().block_on(ReadinessWaiter::default().wait(&graph));

        let calls = log.calls();
        let positions: Vec<usize> = calls
            .iter()
            .map(|call| names.iter().position(|name| name == call).expect("known service"))
            .collect();
        prop_assert!(positions.windows(2).all(|pair| pair[0] <= pair[1]));

        let first_stuck = plan
            .iter()
            .position(|step| step.map_or(true, |failures| failures >= max_attempts as usize));
        match first_stuck {
            None => {
                let report = outcome.expect("every service becomes ready");
                prop_assert!(report.all_ready());
                for (step, service) in plan.iter().zip(&report.services) {
                    let expected = step.map(|failures| failures as u32 + 1).unwrap_or_default();
                    prop_assert_eq!(service.attempts, expected);
                }
            }
            Some(stuck) => {
                let err = outcome.expect_err("a service never becomes ready");
                let WaitError::Timeout(timeout) = &err else {
                    return Err(TestCaseError::fail(format!("unexpected error {err:?}")));
                };
                prop_assert_eq!(&timeout.service, &names[stuck]);
                prop_assert_eq!(timeout.attempts, max_attempts);
                prop_assert!(positions.iter().all(|&position| position <= stuck));
                let skipped = err.report().services.iter().filter(|s| s.status == ServiceStatus::Skipped).count();
                prop_assert_eq!(skipped, plan.len() - stuck - 1);
            }
        }
    }

    #[test]
    fn audit_failed_count_matches_failing_services(healthy in prop::collection::vec(any::<bool>(), 1..8)) {
        let log = CallLog::new();
        let specs = healthy
            .iter()
            .enumerate()
            .map(|(index, ok)| {
                let name = format!("svc{index}");
                let probe = if *ok {
                    ScriptedProbe::healthy(&name, &log)
                } else {
                    ScriptedProbe::unhealthy(&name, &log)
                };
                service(&name, probe, policy(3, 1, 10))
            })
            .collect();
        let graph = graph(specs);

        let summary = paused_runtime().block_on(ConnectivityAuditor::default().audit(&graph));

        let failing = healthy.iter().filter(|ok| !**ok).count();
        prop_assert_eq!(summary.failed_count(), failing);
        prop_assert_eq!(summary.total(), healthy.len());
        prop_assert_eq!(log.calls().len(), healthy.len());
        prop_assert_eq!(summary.exit_code(), i32::from(failing > 0));
    }
}
