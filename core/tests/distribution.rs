//! Integration tests for commission distribution.
//!
//! 1. Every hierarchy depth splits exactly one 800 pool
//! 2. A full four-level chain sends nothing to admin
//! 3. An unresolvable initiator sends the whole pool to admin
//! 4. A second trigger for the same customer is skipped
//! 5. A missing procedure engages the fallback path (or errors when disabled)
//! 6. Transient errors are retried through the guard
//! 7. A fallback failure midway is reported as a partial distribution
//! 8. A cycle in the hierarchy stops the walk

use commission_core::{
    clock::{Clock, SystemClock},
    config::{CommissionSchedule, DistributionPolicy, NetworkConfig},
    distribution::{DistributionMethod, DistributionOutcome, DistributionStore, Distributor},
    engine::{NetworkEngine, NewPromoter},
    error::{CommissionError, CommissionResult},
    event::EventSink,
    ledger::{CommissionRecord, CreditTotals, RecipientType},
    pool::Recipient,
    reconciliation::DistributionStatus,
    store::{EventLogEntry, NetworkStore, ProcedureOutcome, DISTRIBUTE_PROCEDURE},
    types::{PromoterId, ADMIN_LEVEL},
};
use chrono::{DateTime, Utc};
use std::cell::Cell;

fn build() -> NetworkEngine {
    let _ = env_logger::builder().is_test(true).try_init();
    NetworkEngine::build_test().expect("build_test failed")
}

fn promoter(engine: &NetworkEngine, id: &str, parent: Option<&str>, pins: i64) {
    engine
        .register_promoter(&NewPromoter {
            promoter_id: id.to_string(),
            parent_promoter_id: parent.map(str::to_string),
            name: format!("Promoter {id}"),
            initial_pins: pins,
        })
        .expect("register promoter");
}

/// p1 (root) <- p2 <- p3 <- p4 <- p5, each with 10 pins.
fn chain_of_five(engine: &NetworkEngine) {
    promoter(engine, "p1", None, 10);
    for i in 2..=5 {
        promoter(engine, &format!("p{i}"), Some(&format!("p{}", i - 1)), 10);
    }
}

fn onboard_ok(engine: &NetworkEngine, initiator: &str) -> (String, DistributionOutcome) {
    let outcome = engine.onboard(initiator, "Customer").expect("onboard");
    let customer_id = outcome.customer.customer_id.clone();
    let dist = outcome.distribution.expect("distribution");
    (customer_id, dist)
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 1: every depth sums to the pool
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn every_depth_distributes_exactly_one_pool() {
    let engine = build();
    chain_of_five(&engine);

    // (initiator, promoter levels, admin remainder)
    let cases = [("p1", 1, 300), ("p2", 2, 200), ("p3", 3, 100), ("p4", 4, 0), ("p5", 4, 0)];
    for (initiator, levels, admin) in cases {
        let (customer_id, dist) = onboard_ok(&engine, initiator);
        assert_eq!(dist.method(), DistributionMethod::Primary);
        let report = dist.report();
        assert!(report.success);
        assert_eq!(report.total_distributed, 800, "initiator {initiator}");
        assert_eq!(report.levels_distributed, levels, "initiator {initiator}");
        assert_eq!(report.admin_fallback_amount, admin, "initiator {initiator}");

        let records = engine.store.commissions_for_customer(&customer_id).unwrap();
        assert_eq!(records.iter().map(|r| r.amount).sum::<i64>(), 800);
        let admin_rows: Vec<_> = records.iter().filter(|r| r.recipient_type == RecipientType::Admin).collect();
        if admin == 0 {
            assert!(admin_rows.is_empty(), "no admin entry for a full chain");
        } else {
            assert_eq!(admin_rows.len(), 1);
            assert_eq!(admin_rows[0].amount, admin);
            assert_eq!(admin_rows[0].level, ADMIN_LEVEL);
            assert!(admin_rows[0].recipient_id.is_none());
        }
        for r in &records {
            assert!(r.transaction_id.starts_with("CMT-"));
            assert_eq!(r.initiator_promoter_id, initiator);
        }
    }
}

#[test]
fn deepest_initiator_pays_the_four_nearest_levels() {
    let engine = build();
    chain_of_five(&engine);

    let (customer_id, _) = onboard_ok(&engine, "p5");
    let records = engine.store.commissions_for_customer(&customer_id).unwrap();
    let paid: Vec<(Option<&str>, u8, i64)> = records
        .iter()
        .map(|r| (r.recipient_id.as_deref(), r.level, r.amount))
        .collect();
    assert_eq!(
        paid,
        vec![
            (Some("p5"), 1, 500),
            (Some("p4"), 2, 100),
            (Some("p3"), 3, 100),
            (Some("p2"), 4, 100),
        ]
    );
    let root = engine.store.ledger_sums("p1").unwrap();
    assert_eq!(root.total, 0, "the fifth level is never paid");
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 3: unresolvable initiator
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn unresolvable_initiator_sends_pool_to_admin() {
    let engine = build();
    let outcome = engine.distribute("cust-orphan", "ghost").unwrap();
    let report = outcome.report();
    assert_eq!(report.total_distributed, 800);
    assert_eq!(report.levels_distributed, 0);
    assert_eq!(report.admin_fallback_amount, 800);

    let records = engine.store.commissions_for_customer("cust-orphan").unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].recipient_type, RecipientType::Admin);
}

#[test]
fn malformed_ids_are_rejected_before_any_write() {
    let engine = build();
    let err = engine.distribute("", "p1").unwrap_err();
    assert!(matches!(err, CommissionError::Validation(_)), "{err}");
    let err = engine.distribute("cust'; DROP TABLE x;--", "p1").unwrap_err();
    assert!(matches!(err, CommissionError::Validation(_)), "{err}");
    assert_eq!(engine.store.commission_count().unwrap(), 0);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 4: idempotence
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn second_trigger_is_skipped_with_prior_totals() {
    let engine = build();
    chain_of_five(&engine);
    let (customer_id, _) = onboard_ok(&engine, "p2");
    let before = engine.store.commission_count().unwrap();

    let again = engine.distribute(&customer_id, "p2").unwrap();
    assert_eq!(again.method(), DistributionMethod::Skipped);
    let summary = again.summary();
    assert!(summary.entries.is_empty());
    assert_eq!(summary.total_distributed, 800);
    assert_eq!(summary.levels_distributed, 2);
    assert_eq!(summary.admin_fallback_amount, 200);
    assert_eq!(summary.duplicate_excess, None);

    assert_eq!(engine.store.commission_count().unwrap(), before);
    assert_eq!(engine.store.count_events_of_type("distribution_skipped").unwrap(), 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 5: fallback path
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn missing_procedure_engages_fallback() {
    let engine = build();
    chain_of_five(&engine);
    engine.store.uninstall_procedure(DISTRIBUTE_PROCEDURE).unwrap();
    assert!(!engine.store.procedure_installed(DISTRIBUTE_PROCEDURE).unwrap());

    let (customer_id, dist) = onboard_ok(&engine, "p3");
    assert_eq!(dist.method(), DistributionMethod::Fallback);
    assert_eq!(dist.report().total_distributed, 800);
    assert_eq!(dist.report().admin_fallback_amount, 100);
    assert_eq!(dist.summary().entries.len(), 4);
    assert!(dist.summary().entries.iter().all(|r| r.id.is_some()));
    assert_eq!(engine.store.count_events_of_type("fallback_engaged").unwrap(), 1);

    let trail: Vec<String> = engine
        .store
        .events_for_subject(&customer_id)
        .unwrap()
        .into_iter()
        .map(|e| e.event_type)
        .collect();
    assert_eq!(trail, vec!["customer_onboarded", "fallback_engaged", "distribution_completed"]);

    // The guard still holds on the fallback path.
    let again = engine.distribute(&customer_id, "p3").unwrap();
    assert_eq!(again.method(), DistributionMethod::Skipped);
    assert_eq!(engine.store.credited_totals(&customer_id).unwrap().total_amount, 800);
}

#[test]
fn reinstalled_procedure_returns_to_primary() {
    let engine = build();
    chain_of_five(&engine);
    engine.store.uninstall_procedure(DISTRIBUTE_PROCEDURE).unwrap();
    let (_, first) = onboard_ok(&engine, "p1");
    assert_eq!(first.method(), DistributionMethod::Fallback);

    engine
        .store
        .install_procedure(DISTRIBUTE_PROCEDURE, 2, engine.clock().now())
        .unwrap();
    let (_, second) = onboard_ok(&engine, "p1");
    assert_eq!(second.method(), DistributionMethod::Primary);
}

#[test]
fn disabled_fallback_surfaces_missing_procedure() {
    let mut config = NetworkConfig::default_test();
    config.distribution.allow_fallback = false;
    let engine = NetworkEngine::build(NetworkStore::in_memory().unwrap(), config).unwrap();
    promoter(&engine, "p1", None, 1);
    engine.store.uninstall_procedure(DISTRIBUTE_PROCEDURE).unwrap();

    let outcome = engine.onboard("p1", "Customer").unwrap();
    let err = outcome.distribution.unwrap_err();
    assert!(err.is_procedure_missing(), "{err}");
    assert_eq!(engine.store.commission_count().unwrap(), 0);

    // The customer exists with no ledger entries; reconciliation lists it.
    let report = engine.reconciliation_report(false).unwrap();
    assert_eq!(report.undistributed_customers, vec![outcome.customer.customer_id.clone()]);
}

// ─────────────────────────────────────────────────────────────────────────────
// Store wrappers for fault injection
// ─────────────────────────────────────────────────────────────────────────────

/// Reports transient errors from the procedure for the first `failures` calls.
/// With `commit_first`, the first failing call still commits underneath.
struct FlakyProcedure<'a> {
    inner: &'a NetworkStore,
    failures: Cell<u32>,
    commit_first: bool,
    calls: Cell<u32>,
}

impl<'a> FlakyProcedure<'a> {
    fn new(inner: &'a NetworkStore, failures: u32, commit_first: bool) -> Self {
        Self {
            inner,
            failures: Cell::new(failures),
            commit_first,
            calls: Cell::new(0),
        }
    }
}

impl EventSink for FlakyProcedure<'_> {
    fn append_event(&self, entry: &EventLogEntry) -> CommissionResult<()> {
        self.inner.append_event(entry)
    }
}

impl DistributionStore for FlakyProcedure<'_> {
    fn call_distribute_procedure(
        &self,
        customer_id: &str,
        initiator_id: &str,
        schedule: &CommissionSchedule,
        now: DateTime<Utc>,
    ) -> CommissionResult<ProcedureOutcome> {
        self.calls.set(self.calls.get() + 1);
        if self.failures.get() > 0 {
            if self.commit_first && self.calls.get() == 1 {
                self.inner
                    .call_distribute_procedure(customer_id, initiator_id, schedule, now)?;
            }
            self.failures.set(self.failures.get() - 1);
            return Err(CommissionError::TransientStore("connection reset".into()));
        }
        self.inner
            .call_distribute_procedure(customer_id, initiator_id, schedule, now)
    }

    fn credited_totals(&self, customer_id: &str) -> CommissionResult<CreditTotals> {
        self.inner.credited_totals(customer_id)
    }

    fn promoter_parent(&self, promoter_id: &str) -> CommissionResult<Option<Option<PromoterId>>> {
        self.inner.promoter_parent(promoter_id)
    }

    fn insert_commission(&self, record: &CommissionRecord) -> CommissionResult<i64> {
        self.inner.insert_commission(record)
    }

    fn invalidate_wallet(&self, wallet_key: &str) -> CommissionResult<()> {
        self.inner.invalidate_wallet(wallet_key)
    }
}

/// No procedure; the n-th ledger insert (1-based) fails.
struct FailingInsert<'a> {
    inner: &'a NetworkStore,
    fail_on: usize,
    inserts: Cell<usize>,
}

impl EventSink for FailingInsert<'_> {
    fn append_event(&self, entry: &EventLogEntry) -> CommissionResult<()> {
        self.inner.append_event(entry)
    }
}

impl DistributionStore for FailingInsert<'_> {
    fn call_distribute_procedure(
        &self,
        _customer_id: &str,
        _initiator_id: &str,
        _schedule: &CommissionSchedule,
        _now: DateTime<Utc>,
    ) -> CommissionResult<ProcedureOutcome> {
        Err(CommissionError::ProcedureNotFound {
            name: DISTRIBUTE_PROCEDURE.to_string(),
        })
    }

    fn credited_totals(&self, customer_id: &str) -> CommissionResult<CreditTotals> {
        self.inner.credited_totals(customer_id)
    }

    fn promoter_parent(&self, promoter_id: &str) -> CommissionResult<Option<Option<PromoterId>>> {
        self.inner.promoter_parent(promoter_id)
    }

    fn insert_commission(&self, record: &CommissionRecord) -> CommissionResult<i64> {
        let n = self.inserts.get() + 1;
        self.inserts.set(n);
        if n == self.fail_on {
            return Err(CommissionError::Other(anyhow::anyhow!("disk I/O error")));
        }
        self.inner.insert_commission(record)
    }

    fn invalidate_wallet(&self, wallet_key: &str) -> CommissionResult<()> {
        self.inner.invalidate_wallet(wallet_key)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 6: transient retry
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn transient_errors_are_retried_on_the_primary_path() {
    let engine = build();
    chain_of_five(&engine);
    let flaky = FlakyProcedure::new(&engine.store, 2, false);
    let policy = DistributionPolicy {
        allow_fallback: true,
        max_transient_retries: 2,
    };
    let schedule = CommissionSchedule::standard();
    let distributor = Distributor::new(&flaky, &schedule, &policy, &SystemClock);

    let outcome = distributor.distribute("cust-retry", "p4").unwrap();
    assert_eq!(outcome.method(), DistributionMethod::Primary);
    assert_eq!(flaky.calls.get(), 3);
    assert_eq!(engine.store.credited_totals("cust-retry").unwrap().total_amount, 800);
    assert_eq!(engine.store.count_events_of_type("fallback_engaged").unwrap(), 0);
}

#[test]
fn retry_after_unseen_commit_is_skipped_by_the_guard() {
    let engine = build();
    chain_of_five(&engine);
    let flaky = FlakyProcedure::new(&engine.store, 1, true);
    let policy = DistributionPolicy::default();
    let schedule = CommissionSchedule::standard();
    let distributor = Distributor::new(&flaky, &schedule, &policy, &SystemClock);

    let outcome = distributor.distribute("cust-unseen", "p2").unwrap();
    assert_eq!(outcome.method(), DistributionMethod::Skipped);
    assert_eq!(outcome.report().total_distributed, 800);
    let totals = engine.store.credited_totals("cust-unseen").unwrap();
    assert_eq!(totals.total_amount, 800, "never credited twice");
}

#[test]
fn exhausted_retries_report_unknown_outcome_without_fallback() {
    let engine = build();
    chain_of_five(&engine);
    let flaky = FlakyProcedure::new(&engine.store, 5, false);
    let policy = DistributionPolicy {
        allow_fallback: true,
        max_transient_retries: 1,
    };
    let schedule = CommissionSchedule::standard();
    let distributor = Distributor::new(&flaky, &schedule, &policy, &SystemClock);

    let err = distributor.distribute("cust-down", "p1").unwrap_err();
    assert!(err.is_transient(), "{err}");
    assert_eq!(flaky.calls.get(), 2);
    assert_eq!(engine.store.commission_count().unwrap(), 0);
    assert_eq!(engine.store.count_events_of_type("fallback_engaged").unwrap(), 0);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 7: partial fallback failure
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn fallback_failure_midway_is_partial_and_reconcilable() {
    let engine = build();
    chain_of_five(&engine);
    let failing = FailingInsert {
        inner: &engine.store,
        fail_on: 3,
        inserts: Cell::new(0),
    };
    let schedule = CommissionSchedule::standard();
    let policy = DistributionPolicy::default();
    let distributor = Distributor::new(&failing, &schedule, &policy, &SystemClock);
    let p5 = Recipient::Promoter("p5".into());
    let p4 = Recipient::Promoter("p4".into());
    assert_eq!(engine.commission_summary(&p5).unwrap().total_earned, 0);
    assert_eq!(engine.commission_summary(&p4).unwrap().total_earned, 0);

    let err = distributor.distribute("cust-partial", "p5").unwrap_err();
    match err {
        CommissionError::PartialDistribution {
            customer_id,
            written,
            planned,
            credited,
            ..
        } => {
            assert_eq!(customer_id, "cust-partial");
            assert_eq!(written, 2);
            assert_eq!(planned, 4);
            assert_eq!(credited, 600);
        }
        other => panic!("expected PartialDistribution, got {other}"),
    }
    assert_eq!(engine.store.count_events_of_type("partial_distribution").unwrap(), 1);

    // Entries that did land are visible through the cached wallets.
    assert!(engine.store.get_wallet("p5").unwrap().unwrap().stale);
    assert_eq!(engine.commission_summary(&p5).unwrap().total_earned, 500);
    assert_eq!(engine.commission_summary(&p4).unwrap().total_earned, 100);

    let report = engine.reconciliation_report(false).unwrap();
    assert!(report.wallet_drift.is_empty());
    assert_eq!(report.distribution_issues.len(), 1);
    let issue = &report.distribution_issues[0];
    assert_eq!(issue.customer_id, "cust-partial");
    assert_eq!(issue.credited_total, 600);
    assert_eq!(issue.status, DistributionStatus::Partial);
    assert!(!report.is_clean());

    // A later trigger sees entries and does not top the customer up.
    let again = engine.distribute("cust-partial", "p5").unwrap();
    assert_eq!(again.method(), DistributionMethod::Skipped);
    assert_eq!(again.report().total_distributed, 600);
}

#[test]
fn fallback_failure_before_any_write_returns_the_store_error() {
    let engine = build();
    chain_of_five(&engine);
    let failing = FailingInsert {
        inner: &engine.store,
        fail_on: 1,
        inserts: Cell::new(0),
    };
    let schedule = CommissionSchedule::standard();
    let policy = DistributionPolicy::default();
    let distributor = Distributor::new(&failing, &schedule, &policy, &SystemClock);

    let err = distributor.distribute("cust-clean-fail", "p5").unwrap_err();
    assert!(matches!(err, CommissionError::Other(_)), "{err}");
    assert_eq!(engine.store.commission_count().unwrap(), 0);
    assert_eq!(engine.store.count_events_of_type("partial_distribution").unwrap(), 0);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 8: cycles
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn cycle_in_hierarchy_stops_the_walk() {
    let engine = build();
    promoter(&engine, "a", None, 1);
    promoter(&engine, "b", Some("a"), 1);
    promoter(&engine, "c", Some("b"), 1);
    engine.store.update_promoter_parent("a", Some("c")).unwrap();

    let (customer_id, dist) = onboard_ok(&engine, "c");
    assert_eq!(dist.method(), DistributionMethod::Primary);
    assert_eq!(dist.report().levels_distributed, 3);
    assert_eq!(dist.report().admin_fallback_amount, 100);

    let recipients: Vec<Option<String>> = engine
        .store
        .commissions_for_customer(&customer_id)
        .unwrap()
        .into_iter()
        .map(|r| r.recipient_id)
        .collect();
    assert_eq!(
        recipients,
        vec![Some("c".into()), Some("b".into()), Some("a".into()), None]
    );
}

#[test]
fn custom_schedule_sets_pool_and_depth() {
    let mut config = NetworkConfig::default_test();
    config.schedule = CommissionSchedule::new(vec![
        commission_core::config::LevelRate { level: 1, amount: 300 },
        commission_core::config::LevelRate { level: 2, amount: 200 },
    ])
    .unwrap();
    let engine = NetworkEngine::build(NetworkStore::in_memory().unwrap(), config).unwrap();
    chain_of_five(&engine);

    let (customer_id, dist) = onboard_ok(&engine, "p5");
    assert_eq!(dist.report().total_distributed, 500);
    assert_eq!(dist.report().levels_distributed, 2);
    assert_eq!(dist.report().admin_fallback_amount, 0);

    let report = engine.reconciliation_report(false).unwrap();
    assert!(report.is_clean(), "{report:?}");
    assert_eq!(report.pool_total, 500);
    assert_eq!(engine.store.credited_totals(&customer_id).unwrap().total_amount, 500);
}
