use {
    chrono::Utc,
    donation_sync::domain::{
        donation::{Donation, DonationStatus, NewDonation, NewDonationParams},
        event::{CanonicalEvent, EventKind},
        gateway::GatewayName,
        id::EventId,
        money::{Currency, Money, MoneyAmount},
        transition::{Decision, decide},
    },
    proptest::prelude::*,
    uuid::Uuid,
};

const AMOUNT: i64 = 10_000;

fn arb_status() -> impl Strategy<Value = DonationStatus> {
    proptest::sample::select(DonationStatus::ALL.to_vec())
}

fn arb_kind() -> impl Strategy<Value = EventKind> {
    prop_oneof![
        Just(EventKind::PaymentSucceeded),
        Just(EventKind::PaymentFailed { reason: None }),
        Just(EventKind::RequiresAction),
        Just(EventKind::Processing),
        Just(EventKind::Canceled),
        Just(EventKind::DisputeCreated { reason: None }),
        (0i64..=AMOUNT * 2).prop_map(|n| EventKind::Refunded {
            amount_refunded: MoneyAmount::new(n).unwrap()
        }),
        Just(EventKind::Unknown),
    ]
}

fn donation() -> Donation {
    NewDonation::new(NewDonationParams {
        campaign_id: Uuid::now_v7(),
        donor_id: None,
        money: Money::new(MoneyAmount::new(AMOUNT).unwrap(), Currency::Eur),
        payment_method: "card".into(),
        gateway: GatewayName::Stripe,
        anonymous: true,
        recurring: false,
        frequency: None,
        notes: None,
    })
    .unwrap()
    .into_donation()
}

fn event(kind: EventKind, n: usize) -> CanonicalEvent {
    CanonicalEvent {
        gateway: GatewayName::Stripe,
        event_id: EventId::new(format!("evt_{n}")).unwrap(),
        event_type: "test".into(),
        kind,
        external_id: "pi_1".into(),
        intent_id: Some("pi_1".into()),
        transaction_id: Some("ch_1".into()),
        captured: false,
        raw: serde_json::Value::Null,
    }
}

proptest! {
    /// Legal transitions never lower the lifecycle rank, and terminal
    /// statuses have no way out.
    #[test]
    fn transitions_are_monotonic(from in arb_status(), to in arb_status()) {
        if from.can_transition_to(&to) {
            prop_assert!(to.rank() >= from.rank(), "{from} -> {to}");
            prop_assert!(!from.is_terminal());
        }
    }

    /// Any sequence of gateway events: rank never drops, a terminal status
    /// never changes, refunds only grow and never exceed the donation.
    #[test]
    fn event_sequences_never_regress(kinds in prop::collection::vec(arb_kind(), 1..30)) {
        let mut d = donation();
        let now = Utc::now();

        for (n, kind) in kinds.into_iter().enumerate() {
            let before = d.clone();
            let decision = decide(&d, &kind);
            decision.apply(&mut d, &event(kind, n), now);

            prop_assert!(d.status.rank() >= before.status.rank());
            if before.status.is_terminal() {
                prop_assert_eq!(d.status, before.status);
            }
            prop_assert!(d.refunded_amount >= before.refunded_amount);
            prop_assert!(d.refunded_amount <= d.money.amount());
            if matches!(decision, Decision::Illegal | Decision::Deferred) {
                prop_assert_eq!(&d, &before);
            }
        }
    }

    /// Replaying the same event right after it was applied is never an advance.
    #[test]
    fn reapplying_an_event_is_not_an_advance(
        start in arb_status(),
        kind in arb_kind(),
    ) {
        let mut d = donation();
        d.status = start;
        if matches!(start, DonationStatus::PartiallyRefunded) {
            d.refunded_amount = MoneyAmount::new(1).unwrap();
        }
        let first = decide(&d, &kind);
        first.apply(&mut d, &event(kind.clone(), 0), Utc::now());

        let second = decide(&d, &kind);
        prop_assert!(!matches!(second, Decision::Advance { .. }), "{first:?} then {second:?}");
    }

    /// as_str → try_from roundtrip is identity for any status.
    #[test]
    fn status_roundtrip(status in arb_status()) {
        prop_assert_eq!(DonationStatus::try_from(status.as_str()).unwrap(), status);
    }
}
