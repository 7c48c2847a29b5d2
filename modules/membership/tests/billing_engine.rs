mod common;

use chrono::{TimeZone, Utc};
use common::{date, member, Harness};
use membership::contract::client::MembershipApi;
use membership::contract::error::MembershipError;
use membership::contract::model::*;
use membership::domain::error::DomainError;
use membership::gateways::local::MembershipLocalClient;

fn outcome_of<'a>(report: &'a BillingRunReport, user_id: &str) -> &'a RunOutcome {
    &report
        .results
        .iter()
        .find(|r| r.user_id == user_id)
        .unwrap()
        .outcome
}

fn pending_invoice(user_id: &str, month: BillingMonth, due: chrono::NaiveDate) -> Invoice {
    Invoice {
        invoice_number: format!("INV-{}{:02}-OLD", month.year(), month.month()),
        user_id: user_id.to_string(),
        kind: InvoiceKind::Recurring,
        billing_month: month,
        invoice_date: month.first_day(),
        due_date: due,
        plan_id: "basic".into(),
        monthly_fee: 15_000,
        initial_fee: 0,
        subtotal: 15_000,
        tax: 1_500,
        total: 16_500,
        status: InvoiceStatus::Pending,
        created_at: Utc.with_ymd_and_hms(2025, 12, 1, 0, 0, 0).unwrap(),
        paid_at: None,
    }
}

#[tokio::test]
async fn anchor_not_reached_before_contract_day() {
    let h = Harness::new();
    h.add_member(member("abcdef01"));

    let report = h.services.billing.run_monthly(date(2026, 1, 10)).await.unwrap();

    assert_eq!(report.run_date, date(2026, 1, 10));
    assert_eq!(
        outcome_of(&report, "abcdef01"),
        &RunOutcome::Skipped(SkipReason::AnchorNotReached)
    );
    assert!(h.repo.state.lock().invoices.is_empty());
}

#[tokio::test]
async fn invoice_created_once_anchor_passed() {
    let h = Harness::new();
    h.add_member(member("abcdef01"));

    let report = h.services.billing.run_monthly(date(2026, 1, 20)).await.unwrap();

    assert_eq!(
        outcome_of(&report, "abcdef01"),
        &RunOutcome::Created {
            invoice_number: "INV-202601-ABCDEF".into()
        }
    );
    let st = h.repo.state.lock();
    let invoice = &st.invoices[0];
    assert_eq!(invoice.kind, InvoiceKind::Recurring);
    assert_eq!(invoice.billing_month.to_string(), "2026-01");
    assert_eq!(invoice.invoice_date, date(2026, 1, 15));
    assert_eq!(invoice.due_date, date(2026, 1, 31));
    assert_eq!(invoice.plan_id, "premium");
    assert_eq!(invoice.subtotal, 60_000);
    assert_eq!(invoice.tax, 6_000);
    assert_eq!(invoice.total, 66_000);
    assert_eq!(invoice.status, InvoiceStatus::Pending);
}

#[tokio::test]
async fn rerun_in_same_month_skips() {
    let h = Harness::new();
    h.add_member(member("abcdef01"));
    let billing = &h.services.billing;

    billing.run_monthly(date(2026, 1, 20)).await.unwrap();
    let report = billing.run_monthly(date(2026, 1, 25)).await.unwrap();

    assert_eq!(
        outcome_of(&report, "abcdef01"),
        &RunOutcome::Skipped(SkipReason::AlreadyExists)
    );
    assert_eq!(h.repo.state.lock().invoices.len(), 1);
    assert_eq!(h.notifier.sent.lock().len(), 1);
}

#[tokio::test]
async fn month_end_anchor_clamps_to_february() {
    let h = Harness::new();
    let mut m = member("abcdef01");
    m.contract_date_text = Some("2025-10-31".into());
    h.add_member(m);
    let billing = &h.services.billing;

    let early = billing.run_monthly(date(2026, 2, 27)).await.unwrap();
    assert_eq!(
        outcome_of(&early, "abcdef01"),
        &RunOutcome::Skipped(SkipReason::AnchorNotReached)
    );

    let report = billing.run_monthly(date(2026, 2, 28)).await.unwrap();
    assert!(matches!(
        outcome_of(&report, "abcdef01"),
        RunOutcome::Created { .. }
    ));
    let invoice = h.repo.state.lock().invoices[0].clone();
    assert_eq!(invoice.invoice_date, date(2026, 2, 28));
    assert_eq!(invoice.due_date, date(2026, 2, 28));
}

#[tokio::test]
async fn members_without_anchor_or_plan_are_skipped() {
    let h = Harness::new();
    let mut no_anchor = member("aaaaaa01");
    no_anchor.contract_date_text = Some("来月から".into());
    let mut no_date = member("bbbbbb01");
    no_date.contract_date_text = None;
    let mut free = member("cccccc01");
    free.monthly_fee = Some(0);
    h.add_member(no_anchor);
    h.add_member(no_date);
    h.add_member(free);

    let report = h.services.billing.run_monthly(date(2026, 1, 20)).await.unwrap();

    assert_eq!(
        outcome_of(&report, "aaaaaa01"),
        &RunOutcome::Skipped(SkipReason::NoAnchor)
    );
    assert_eq!(
        outcome_of(&report, "bbbbbb01"),
        &RunOutcome::Skipped(SkipReason::NoAnchor)
    );
    assert_eq!(
        outcome_of(&report, "cccccc01"),
        &RunOutcome::Skipped(SkipReason::NoPlan)
    );
    assert!(h.repo.state.lock().invoices.is_empty());
}

#[tokio::test]
async fn legacy_plan_name_bills_catalog_price() {
    let h = Harness::new();
    let mut m = member("abcdef01");
    m.plan_tier = None;
    m.monthly_fee = None;
    m.legacy_plan_name = Some("ライトプラン".into());
    h.add_member(m);

    h.services.billing.run_monthly(date(2026, 1, 20)).await.unwrap();

    let invoice = h.repo.state.lock().invoices[0].clone();
    assert_eq!(invoice.plan_id, "basic");
    assert_eq!(invoice.subtotal, 15_000);
    assert_eq!(invoice.tax, 1_500);
    assert_eq!(invoice.total, 16_500);
}

#[tokio::test]
async fn card_members_are_not_invoiced() {
    let h = Harness::new();
    let mut m = member("abcdef01");
    m.payment_method = PaymentMethod::Card;
    h.add_member(m);

    let report = h.services.billing.run_monthly(date(2026, 1, 20)).await.unwrap();

    assert!(report.results.is_empty());
}

#[tokio::test]
async fn each_created_invoice_notifies_once() {
    let h = Harness::new();
    h.add_member(member("abcdef01"));
    h.add_member(member("fedcba01"));

    h.services.billing.run_monthly(date(2026, 1, 20)).await.unwrap();

    let sent = h.notifier.sent.lock();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].title, "Invoice INV-202601-ABCDEF issued");
    assert_eq!(sent[0].priority, NotificationPriority::High);
    assert_eq!(sent[0].audience, Audience::All);
    assert!(sent[0].content.contains("66000"));
}

#[tokio::test]
async fn notification_failure_keeps_invoice() {
    let h = Harness::new();
    h.add_member(member("abcdef01"));
    *h.notifier.fail.lock() = true;

    let report = h.services.billing.run_monthly(date(2026, 1, 20)).await.unwrap();

    assert!(matches!(
        outcome_of(&report, "abcdef01"),
        RunOutcome::Created { .. }
    ));
    assert_eq!(h.repo.state.lock().invoices.len(), 1);
    assert!(h.notifier.sent.lock().is_empty());
}

#[tokio::test]
async fn storage_failure_does_not_stop_the_batch() {
    let h = Harness::new();
    h.add_member(member("aaaaaa01"));
    h.add_member(member("bbbbbb01"));
    h.add_member(member("cccccc01"));
    h.repo
        .state
        .lock()
        .failing_invoice_users
        .insert("bbbbbb01".into());

    let report = h.services.billing.run_monthly(date(2026, 1, 20)).await.unwrap();

    assert_eq!(report.results.len(), 3);
    assert!(matches!(outcome_of(&report, "aaaaaa01"), RunOutcome::Created { .. }));
    match outcome_of(&report, "bbbbbb01") {
        RunOutcome::Failed { error } => assert!(error.contains("database is locked")),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(matches!(outcome_of(&report, "cccccc01"), RunOutcome::Created { .. }));
}

fn custom_plan_member(id: &str, fee: i64) -> Member {
    let mut m = member(id);
    m.plan_tier = None;
    m.selected_plan_id = Some("custom".into());
    m.monthly_fee = Some(fee);
    m
}

#[tokio::test]
async fn oversized_fee_fails_only_that_member() {
    let h = Harness::new();
    h.add_member(custom_plan_member("abcdef01", i64::MAX / 4));
    h.add_member(member("bbbbbb01"));

    let report = h.services.billing.run_monthly(date(2026, 1, 20)).await.unwrap();

    match outcome_of(&report, "abcdef01") {
        RunOutcome::Failed { error } => assert!(error.contains("out of range")),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(matches!(outcome_of(&report, "bbbbbb01"), RunOutcome::Created { .. }));
    let state = h.repo.state.lock();
    assert_eq!(state.invoices.len(), 1);
    assert_eq!(state.invoices[0].user_id, "bbbbbb01");
}

#[tokio::test]
async fn oversized_fee_rejects_initial_invoice() {
    let h = Harness::new();
    let mut m = custom_plan_member("abcdef01", i64::MAX - 10);
    m.dates_saved = true;
    m.invoice_date = Some(date(2026, 1, 15));
    m.confirmed_due_date = Some(date(2026, 1, 31));
    h.add_member(m);

    match h.services.billing.create_initial_invoice("abcdef01").await {
        Err(DomainError::Validation { field, .. }) => assert_eq!(field, "monthlyFee"),
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(h.repo.state.lock().invoices.is_empty());
    assert!(h.notifier.sent.lock().is_empty());
}

#[tokio::test]
async fn registration_caps_monthly_fee() {
    let h = Harness::new();
    let profile = |fee: i64| NewMember {
        id: "abcdef01".into(),
        email: "abcdef01@example.com".into(),
        role: "member".into(),
        payment_method: PaymentMethod::Invoice,
        contract_date_text: Some("2025-12-15".into()),
        plan_tier: None,
        monthly_fee: Some(fee),
        legacy_plan_name: None,
        selected_plan_id: Some("custom".into()),
    };

    match h.services.members.register(profile(i64::MAX / 4)).await {
        Err(DomainError::Validation { field, .. }) => assert_eq!(field, "monthlyFee"),
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(h.repo.state.lock().members.is_empty());

    let stored = h.services.members.register(profile(80_000)).await.unwrap();
    assert_eq!(stored.monthly_fee, Some(80_000));
}

#[tokio::test]
async fn concurrent_creation_counts_as_existing() {
    let h = Harness::new();
    h.add_member(member("abcdef01"));
    let month = BillingMonth::new(2026, 1).unwrap();
    {
        let mut st = h.repo.state.lock();
        st.invoices
            .push(pending_invoice("abcdef01", month, date(2026, 1, 31)));
        st.stale_lookup_users.insert("abcdef01".into());
    }

    let report = h.services.billing.run_monthly(date(2026, 1, 20)).await.unwrap();

    assert_eq!(
        outcome_of(&report, "abcdef01"),
        &RunOutcome::Skipped(SkipReason::AlreadyExists)
    );
    assert_eq!(h.repo.state.lock().invoices.len(), 1);
}

#[tokio::test]
async fn shared_id_prefix_reports_number_collision() {
    let h = Harness::new();
    h.add_member(member("abcdef-1"));
    h.add_member(member("abcdef-2"));

    let report = h.services.billing.run_monthly(date(2026, 1, 20)).await.unwrap();

    assert!(matches!(outcome_of(&report, "abcdef-1"), RunOutcome::Created { .. }));
    match outcome_of(&report, "abcdef-2") {
        RunOutcome::Failed { error } => assert!(error.starts_with("invoice number collision")),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn overdue_sweep_runs_after_batch() {
    let h = Harness::new();
    h.add_member(member("abcdef01"));
    let december = BillingMonth::new(2025, 12).unwrap();
    h.repo
        .state
        .lock()
        .invoices
        .push(pending_invoice("abcdef01", december, date(2025, 12, 31)));

    let report = h.services.billing.run_monthly(date(2026, 1, 20)).await.unwrap();

    assert_eq!(report.overdue_marked, 1);
    let st = h.repo.state.lock();
    let old = st
        .invoices
        .iter()
        .find(|i| i.billing_month == december)
        .unwrap();
    assert_eq!(old.status, InvoiceStatus::Overdue);
    let fresh = st
        .invoices
        .iter()
        .find(|i| i.billing_month != december)
        .unwrap();
    assert_eq!(fresh.status, InvoiceStatus::Pending);
}

fn with_saved_dates(id: &str) -> Member {
    let mut m = member(id);
    m.plan_tier = Some("basic".into());
    m.monthly_fee = Some(15_000);
    m.dates_saved = true;
    m.invoice_date = Some(date(2026, 1, 15));
    m.confirmed_due_date = Some(date(2026, 1, 31));
    m
}

#[tokio::test]
async fn initial_invoice_adds_initial_fee() {
    let h = Harness::new();
    h.add_member(with_saved_dates("abcdef01"));

    let invoice = h
        .services
        .billing
        .create_initial_invoice("abcdef01")
        .await
        .unwrap();

    assert_eq!(invoice.kind, InvoiceKind::Initial);
    assert_eq!(invoice.invoice_number, "INV-202601-ABCDEF");
    assert_eq!(invoice.invoice_date, date(2026, 1, 15));
    assert_eq!(invoice.due_date, date(2026, 1, 31));
    assert_eq!(invoice.initial_fee, 30_000);
    assert_eq!(invoice.monthly_fee, 15_000);
    assert_eq!(invoice.subtotal, 45_000);
    assert_eq!(invoice.tax, 4_500);
    assert_eq!(invoice.total, 49_500);
    assert_eq!(h.notifier.sent.lock().len(), 1);

    // the monthly run must not bill January twice
    let report = h.services.billing.run_monthly(date(2026, 1, 20)).await.unwrap();
    assert_eq!(
        outcome_of(&report, "abcdef01"),
        &RunOutcome::Skipped(SkipReason::AlreadyExists)
    );
}

#[tokio::test]
async fn initial_invoice_only_once() {
    let h = Harness::new();
    h.add_member(with_saved_dates("abcdef01"));
    let billing = &h.services.billing;

    billing.create_initial_invoice("abcdef01").await.unwrap();
    let err = billing.create_initial_invoice("abcdef01").await.unwrap_err();

    match err {
        DomainError::InvoiceExists {
            user_id,
            billing_month,
        } => {
            assert_eq!(user_id, "abcdef01");
            assert_eq!(billing_month, "2026-01");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn initial_invoice_requires_dates_and_plan() {
    let h = Harness::new();
    h.add_member(member("aaaaaa01"));
    let mut free = with_saved_dates("bbbbbb01");
    free.monthly_fee = Some(0);
    h.add_member(free);
    let billing = &h.services.billing;

    match billing.create_initial_invoice("aaaaaa01").await {
        Err(DomainError::Validation { field, .. }) => assert_eq!(field, "invoiceDates"),
        other => panic!("unexpected result: {other:?}"),
    }
    match billing.create_initial_invoice("bbbbbb01").await {
        Err(DomainError::Validation { field, .. }) => assert_eq!(field, "plan"),
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(matches!(
        billing.create_initial_invoice("ghost").await,
        Err(DomainError::UserNotFound { .. })
    ));
}

#[tokio::test]
async fn mark_paid_stamps_payment_time() {
    let h = Harness::new();
    h.add_member(member("abcdef01"));
    let billing = &h.services.billing;
    billing.run_monthly(date(2026, 1, 20)).await.unwrap();

    let paid = billing.mark_paid("INV-202601-ABCDEF").await.unwrap();
    assert_eq!(paid.status, InvoiceStatus::Paid);
    assert_eq!(paid.paid_at, Some(*h.clock.0.lock()));

    // paid invoices are never swept to overdue
    let report = billing.run_monthly(date(2026, 2, 10)).await.unwrap();
    assert_eq!(report.overdue_marked, 0);

    assert!(matches!(
        billing.mark_paid("INV-209901-NOPE").await,
        Err(DomainError::InvoiceNotFound { .. })
    ));
}

#[tokio::test]
async fn list_invoices_newest_month_first() {
    let h = Harness::new();
    h.add_member(member("abcdef01"));
    let billing = &h.services.billing;
    billing.run_monthly(date(2026, 1, 20)).await.unwrap();
    billing.run_monthly(date(2026, 2, 20)).await.unwrap();

    let invoices = billing.list_invoices("abcdef01").await.unwrap();
    assert_eq!(invoices.len(), 2);
    assert_eq!(invoices[0].invoice_number, "INV-202602-ABCDEF");
    assert_eq!(invoices[1].invoice_number, "INV-202601-ABCDEF");

    assert!(matches!(
        billing.list_invoices("ghost").await,
        Err(DomainError::UserNotFound { .. })
    ));
}

#[tokio::test]
async fn local_client_maps_domain_errors() {
    let h = Harness::new();
    h.add_member(with_saved_dates("abcdef01"));
    let client = MembershipLocalClient::new(h.services.clone());

    assert_eq!(client.today(), date(2026, 1, 20));

    let report = client.run_monthly_billing(date(2026, 1, 20)).await.unwrap();
    assert_eq!(report.results.len(), 1);
    assert_eq!(client.list_invoices("abcdef01").await.unwrap().len(), 1);

    let err = client.list_invoices("ghost").await.unwrap_err();
    assert_eq!(err, MembershipError::not_found("user ghost"));

    let mut sub = common::submission("abcdef01", AgreementKind::InitialInvoiceDates);
    sub.invoice_dates = Some(InvoiceDates {
        invoice_date: date(2026, 1, 15),
        due_date: date(2026, 1, 31),
    });
    assert!(matches!(
        client.submit_consent(sub).await,
        Err(MembershipError::Locked { .. })
    ));
}
