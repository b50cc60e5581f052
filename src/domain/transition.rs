//! Gateway event → donation status transitions.
//!
//! Everything here is pure. Both store implementations call [`plan`] inside
//! their own transaction and persist whatever it returns.

use {
    super::{
        donation::{Donation, DonationStatus},
        error::PipelineError,
        event::{CanonicalEvent, EventKind},
        money::MoneyAmount,
        payment::Payment,
    },
    chrono::{DateTime, Utc},
    uuid::Uuid,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Advance {
        to: DonationStatus,
        refunded_amount: Option<MoneyAmount>,
    },
    /// Already in the target state, or waiting on the donor.
    Noop,
    /// Status unchanged, donation marked for compliance review.
    FlagForReview,
    /// Stale or contradictory event for the current status.
    Illegal,
    /// Refund or dispute for a donation that has not completed yet. The
    /// success it depends on may still be in flight, so the event is replayed
    /// later instead of being consumed.
    Deferred,
}

fn towards(current: DonationStatus, to: DonationStatus) -> Decision {
    if current == to {
        Decision::Noop
    } else if current.can_transition_to(&to) {
        Decision::Advance {
            to,
            refunded_amount: None,
        }
    } else {
        Decision::Illegal
    }
}

pub fn decide(donation: &Donation, kind: &EventKind) -> Decision {
    use DonationStatus::*;

    let current = donation.status;
    match kind {
        EventKind::PaymentSucceeded => towards(current, Completed),
        EventKind::PaymentFailed { .. } => towards(current, Failed),
        EventKind::Canceled => towards(current, Cancelled),
        EventKind::RequiresAction | EventKind::Processing => towards(current, Processing),
        EventKind::DisputeCreated { .. } => match current {
            Completed | PartiallyRefunded if donation.compliance_review => Decision::Noop,
            Completed | PartiallyRefunded => Decision::FlagForReview,
            Pending | Processing => Decision::Deferred,
            _ => Decision::Illegal,
        },
        EventKind::Refunded { amount_refunded } => {
            decide_refund(donation, *amount_refunded)
        }
        EventKind::StateChanged | EventKind::Unknown => Decision::Illegal,
    }
}

fn decide_refund(donation: &Donation, amount_refunded: MoneyAmount) -> Decision {
    use DonationStatus::*;

    if donation.status.is_open() {
        return Decision::Deferred;
    }
    if !matches!(donation.status, Completed | PartiallyRefunded | Refunded) {
        return Decision::Illegal;
    }
    // cumulative amounts only grow; anything not larger is a redelivery
    if amount_refunded <= donation.refunded_amount || amount_refunded.is_zero() {
        return Decision::Noop;
    }
    if donation.status == Refunded {
        return Decision::Illegal;
    }

    let original = donation.money.amount();
    let capped = amount_refunded.min(original);
    let to = if capped >= original {
        Refunded
    } else {
        PartiallyRefunded
    };
    Decision::Advance {
        to,
        refunded_amount: Some(capped),
    }
}

impl Decision {
    /// Applies the decision to a copy of the donation.
    pub fn apply(&self, donation: &mut Donation, event: &CanonicalEvent, now: DateTime<Utc>) {
        match *self {
            Decision::Advance {
                to,
                refunded_amount,
            } => {
                donation.status = to;
                match to {
                    DonationStatus::Completed => donation.completed_at = Some(now),
                    DonationStatus::Cancelled => donation.cancelled_at = Some(now),
                    _ => {}
                }
                if let Some(amount) = refunded_amount {
                    donation.refunded_amount = amount;
                }
            }
            Decision::FlagForReview => donation.compliance_review = true,
            Decision::Noop | Decision::Illegal | Decision::Deferred => {}
        }

        if !matches!(self, Decision::Illegal | Decision::Deferred) {
            if donation.payment_intent_id.is_none() {
                donation.payment_intent_id = event.intent_id.clone();
            }
            if donation.transaction_id.is_none() {
                donation.transaction_id = event.transaction_id.clone();
            }
        }
    }
}

/// What to persist for one reconciled event.
#[derive(Debug, Clone)]
pub struct ReconciliationPlan {
    pub decision: Decision,
    pub donation: Donation,
    pub donation_changed: bool,
    /// Payment row after the event, and whether it must be written.
    pub payment: Payment,
    pub payment_is_new: bool,
    pub payment_changed: bool,
}

const COMPLETE: Decision = Decision::Advance {
    to: DonationStatus::Completed,
    refunded_amount: None,
};

/// Provider state read after the fact can skip the success: a Mollie payment
/// that was paid and refunded before the worker ran only ever reports the
/// refund. Such an event completes an open donation before it applies.
fn settles_first(donation: &Donation, event: &CanonicalEvent) -> bool {
    event.captured
        && donation.status.is_open()
        && matches!(
            event.kind,
            EventKind::Refunded { .. } | EventKind::DisputeCreated { .. }
        )
}

/// `payment` is the row matching the event's intent, if one exists.
pub fn plan(
    donation: &Donation,
    payment: Option<&Payment>,
    event: &CanonicalEvent,
    now: DateTime<Utc>,
) -> ReconciliationPlan {
    let settles = settles_first(donation, event);
    let mut next = donation.clone();
    if settles {
        COMPLETE.apply(&mut next, event, now);
    }

    let mut decision = decide(&next, &event.kind);
    if settles && decision == Decision::Noop {
        decision = COMPLETE;
    }
    decision.apply(&mut next, event, now);
    let donation_changed = next != *donation;
    if donation_changed {
        next.updated_at = now;
    }

    let (mut payment, payment_is_new) = match payment {
        Some(p) => (p.clone(), false),
        None => (
            Payment::new(
                donation.id,
                event.gateway,
                event.intent_id.clone().or_else(|| donation.payment_intent_id.clone()),
                serde_json::Value::Null,
            ),
            true,
        ),
    };
    let payment_changed = match decision {
        Decision::Illegal | Decision::Deferred => false,
        _ => {
            let txn = event.transaction_id.as_deref();
            let settled = settles && payment.absorb(&EventKind::PaymentSucceeded, txn, &event.raw, now);
            payment.absorb(&event.kind, txn, &event.raw, now) || settled
        }
    };

    ReconciliationPlan {
        decision,
        donation: next,
        donation_changed,
        payment,
        payment_is_new,
        payment_changed,
    }
}

/// Result of applying one webhook to the store.
#[derive(Debug, Clone)]
pub enum ProcessResult {
    Advanced {
        donation: Donation,
        from: DonationStatus,
        attempt_id: Uuid,
    },
    Unchanged {
        donation: Donation,
        attempt_id: Uuid,
    },
    Flagged {
        donation: Donation,
        attempt_id: Uuid,
    },
    /// Illegal transition, logged and ignored.
    Rejected {
        donation: Donation,
        attempt_id: Uuid,
    },
    /// The conditional update lost against a concurrent writer.
    Conflict { donation_id: Uuid },
    /// Event id already processed.
    Duplicate,
}

/// Error for a plan that must not be persisted yet.
pub fn deferred(donation: &Donation, event: &CanonicalEvent) -> PipelineError {
    PipelineError::OutOfOrder(format!(
        "{} event {} for donation {} in status {}",
        event.gateway, event.event_id, donation.id, donation.status
    ))
}

impl ProcessResult {
    pub fn from_plan(plan: &ReconciliationPlan, previous: DonationStatus, attempt_id: Uuid) -> Self {
        let donation = plan.donation.clone();
        match plan.decision {
            Decision::Advance { .. } => Self::Advanced {
                donation,
                from: previous,
                attempt_id,
            },
            Decision::Noop => Self::Unchanged {
                donation,
                attempt_id,
            },
            Decision::FlagForReview => Self::Flagged {
                donation,
                attempt_id,
            },
            Decision::Illegal | Decision::Deferred => Self::Rejected {
                donation,
                attempt_id,
            },
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Advanced { .. } => "advanced",
            Self::Unchanged { .. } => "unchanged",
            Self::Flagged { .. } => "flagged",
            Self::Rejected { .. } => "rejected",
            Self::Conflict { .. } => "conflict",
            Self::Duplicate => "duplicate",
        }
    }
}
