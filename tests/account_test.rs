// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Ledger and account public API integration tests.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::thread;
use timebank::{
    Ledger, MarketError, RequestId, ServiceId, SettlementContext, TimeAccount, TransactionFilter,
    TransactionKind, TransactionStatus, UserId, settle,
};

// === Helper Functions ===

fn context(request: u32) -> SettlementContext {
    SettlementContext {
        service: ServiceId(1),
        request: RequestId(request),
        service_title: "Dog walking".to_string(),
        processed_by: UserId(1),
    }
}

fn ledger_with(balances: &[(u32, Decimal)]) -> Ledger {
    let ledger = Ledger::new();
    for &(user, balance) in balances {
        ledger.open(UserId(user), balance);
    }
    ledger
}

// === Basic Account Tests ===

#[test]
fn new_account_has_zero_figures() {
    let account = TimeAccount::new(UserId(1));
    assert_eq!(account.balance(), Decimal::ZERO);
    assert_eq!(account.total_earned(), Decimal::ZERO);
    assert_eq!(account.total_spent(), Decimal::ZERO);
    assert!(!account.is_positive_balance());
    assert_eq!(account.participation_ratio(), 0.0);
}

#[test]
fn opening_balance_is_not_earnings() {
    let account = TimeAccount::with_opening_balance(UserId(1), dec!(3.00));
    assert_eq!(account.balance(), dec!(3.00));
    assert_eq!(account.opening_balance(), dec!(3.00));
    assert_eq!(account.total_earned(), Decimal::ZERO);
    assert!(account.is_positive_balance());
}

#[test]
fn snapshot_is_consistent() {
    let ledger = ledger_with(&[(1, dec!(5)), (2, dec!(0))]);
    settle(&ledger, UserId(1), UserId(2), dec!(1.5), &context(1)).unwrap();

    let snapshot = ledger.get(UserId(1)).unwrap().snapshot();
    assert_eq!(snapshot.user, UserId(1));
    assert_eq!(snapshot.balance, dec!(3.5));
    assert_eq!(snapshot.total_spent, dec!(1.5));
    assert_eq!(snapshot.total_earned, Decimal::ZERO);
}

// === Ledger Tests ===

#[test]
fn open_twice_keeps_first_grant() {
    let ledger = Ledger::new();
    ledger.open(UserId(1), dec!(3));
    let again = ledger.open(UserId(1), dec!(50));

    assert_eq!(again.balance(), dec!(3));
    assert_eq!(ledger.log().len(), 1);
}

#[test]
fn zero_grant_logs_nothing() {
    let ledger = Ledger::new();
    ledger.open(UserId(1), Decimal::ZERO);
    assert!(ledger.log().is_empty());
}

#[test]
fn get_unknown_user_fails() {
    let ledger = Ledger::new();
    assert_eq!(
        ledger.get(UserId(42)).unwrap_err(),
        MarketError::UserNotFound(UserId(42))
    );
}

#[test]
fn get_or_create_is_idempotent() {
    let ledger = Ledger::new();
    let first = ledger.get_or_create(UserId(1));
    let second = ledger.get_or_create(UserId(1));
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(ledger.accounts().len(), 1);
}

#[test]
fn accounts_are_ordered_by_user() {
    let ledger = ledger_with(&[(3, dec!(1)), (1, dec!(1)), (2, dec!(1))]);
    let users: Vec<_> = ledger.accounts().iter().map(|a| a.user()).collect();
    assert_eq!(users, vec![UserId(1), UserId(2), UserId(3)]);
}

// === Adjustment Tests ===

#[test]
fn positive_adjustment_is_logged_as_bonus() {
    let ledger = ledger_with(&[(1, dec!(3))]);
    let tx = ledger
        .adjust(UserId(1), dec!(2), UserId(99), "Community event")
        .unwrap();

    assert_eq!(tx.kind, TransactionKind::Bonus);
    assert_eq!(tx.amount, dec!(2));
    assert_eq!(tx.context.processed_by, Some(UserId(99)));
    assert_eq!(ledger.get(UserId(1)).unwrap().balance(), dec!(5));
}

#[test]
fn negative_adjustment_can_go_below_zero() {
    let ledger = ledger_with(&[(1, dec!(3))]);
    let tx = ledger
        .adjust(UserId(1), dec!(-4), UserId(99), "Reversal")
        .unwrap();

    assert_eq!(tx.kind, TransactionKind::Adjustment);
    assert_eq!(tx.amount, dec!(4));
    assert_eq!(tx.signed_amount(), dec!(-4));
    assert_eq!(ledger.get(UserId(1)).unwrap().balance(), dec!(-1));
    assert_eq!(ledger.log().net_for(UserId(1)), dec!(-1));
}

#[test]
fn zero_adjustment_rejected() {
    let ledger = ledger_with(&[(1, dec!(3))]);
    assert_eq!(
        ledger
            .adjust(UserId(1), Decimal::ZERO, UserId(99), "noop")
            .unwrap_err(),
        MarketError::InvalidAmount(Decimal::ZERO)
    );
    assert_eq!(ledger.log().len(), 1);
}

// === Settlement Tests ===

#[test]
fn settle_moves_hours_and_logs_pair() {
    let ledger = ledger_with(&[(1, dec!(10)), (2, dec!(3))]);
    let settlement = settle(&ledger, UserId(1), UserId(2), dec!(2), &context(7)).unwrap();

    assert_eq!(ledger.get(UserId(1)).unwrap().balance(), dec!(8));
    assert_eq!(ledger.get(UserId(2)).unwrap().balance(), dec!(5));
    assert_eq!(settlement.debit.status, TransactionStatus::Completed);
    assert!(settlement.debit.processed_at.is_some());
    assert_eq!(settlement.credit.description, "Earned from service: Dog walking");
    assert_eq!(ledger.log().get(settlement.credit.id).unwrap(), settlement.credit);
}

#[test]
fn settle_rejects_non_positive_hours() {
    let ledger = ledger_with(&[(1, dec!(10)), (2, dec!(3))]);
    for hours in [Decimal::ZERO, dec!(-1)] {
        assert_eq!(
            settle(&ledger, UserId(1), UserId(2), hours, &context(1)).unwrap_err(),
            MarketError::InvalidAmount(hours)
        );
    }
}

#[test]
fn settle_rejects_same_party() {
    let ledger = ledger_with(&[(1, dec!(10))]);
    assert_eq!(
        settle(&ledger, UserId(1), UserId(1), dec!(1), &context(1)).unwrap_err(),
        MarketError::SelfRequest
    );
}

#[test]
fn failed_settlement_changes_nothing() {
    let ledger = ledger_with(&[(1, dec!(1)), (2, dec!(3))]);
    let entries = ledger.log().len();

    assert!(matches!(
        settle(&ledger, UserId(1), UserId(2), dec!(2), &context(1)),
        Err(MarketError::InsufficientBalance { .. })
    ));
    assert_eq!(ledger.get(UserId(1)).unwrap().balance(), dec!(1));
    assert_eq!(ledger.get(UserId(2)).unwrap().balance(), dec!(3));
    assert_eq!(ledger.log().len(), entries);
}

#[test]
fn small_fractions_are_exact() {
    let ledger = ledger_with(&[(1, dec!(1)), (2, Decimal::ZERO)]);
    for request in 0..10 {
        settle(&ledger, UserId(1), UserId(2), dec!(0.1), &context(request)).unwrap();
    }
    assert_eq!(ledger.get(UserId(1)).unwrap().balance(), Decimal::ZERO);
    assert_eq!(ledger.get(UserId(2)).unwrap().balance(), dec!(1.0));
}

#[test]
fn history_filters_by_kind_newest_first() {
    let ledger = ledger_with(&[(1, dec!(10)), (2, dec!(3))]);
    settle(&ledger, UserId(1), UserId(2), dec!(1), &context(1)).unwrap();
    settle(&ledger, UserId(2), UserId(1), dec!(2), &context(2)).unwrap();

    let all = ledger.log().history(UserId(1), TransactionFilter::default());
    let kinds: Vec<_> = all.iter().map(|tx| tx.kind).collect();
    assert_eq!(
        kinds,
        vec![
            TransactionKind::Credit,
            TransactionKind::Debit,
            TransactionKind::Bonus
        ]
    );

    let credits = ledger.log().history(
        UserId(1),
        TransactionFilter {
            kind: Some(TransactionKind::Credit),
            ..Default::default()
        },
    );
    assert_eq!(credits.len(), 1);
    assert_eq!(credits[0].context.request, Some(RequestId(2)));
}

// === Multi-threading Tests ===

#[test]
fn concurrent_settlements_never_overdraw() {
    let ledger = Arc::new(ledger_with(&[(1, dec!(10)), (2, Decimal::ZERO)]));
    let mut handles = vec![];

    for request in 0..50u32 {
        let ledger = Arc::clone(&ledger);
        handles.push(thread::spawn(move || {
            settle(&ledger, UserId(1), UserId(2), dec!(1), &context(request)).is_ok()
        }));
    }

    let succeeded = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .filter(|ok| *ok)
        .count();

    assert_eq!(succeeded, 10);
    assert_eq!(ledger.get(UserId(1)).unwrap().balance(), Decimal::ZERO);
    assert_eq!(ledger.get(UserId(2)).unwrap().balance(), dec!(10));
    assert_eq!(ledger.log().len(), 1 + 2 * succeeded);
}

#[test]
fn opposite_direction_settlements_preserve_total() {
    let ledger = Arc::new(ledger_with(&[(1, dec!(100)), (2, dec!(100))]));
    let mut handles = vec![];

    for request in 0..100u32 {
        let ledger = Arc::clone(&ledger);
        let (payer, receiver) = if request % 2 == 0 {
            (UserId(1), UserId(2))
        } else {
            (UserId(2), UserId(1))
        };
        handles.push(thread::spawn(move || {
            let _ = settle(&ledger, payer, receiver, dec!(1.25), &context(request));
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(ledger.total_balance(), dec!(200));
    assert_eq!(ledger.get(UserId(1)).unwrap().balance(), dec!(100));
    for user in [UserId(1), UserId(2)] {
        let account = ledger.get(user).unwrap();
        assert_eq!(ledger.log().net_for(user), account.balance());
    }
}

#[test]
fn concurrent_adjustments_are_atomic() {
    let ledger = Arc::new(Ledger::new());
    let mut handles = vec![];

    for _ in 0..100 {
        let ledger = Arc::clone(&ledger);
        handles.push(thread::spawn(move || {
            ledger
                .adjust(UserId(1), dec!(0.5), UserId(99), "Top-up")
                .unwrap();
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(ledger.get(UserId(1)).unwrap().balance(), dec!(50.0));
    assert_eq!(ledger.log().len(), 100);
}
