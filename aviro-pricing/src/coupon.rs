use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use aviro_core::model::coupon::Coupon;

/// Why a coupon failed (or skipped) server-side validation. Serialized
/// onto the booking as a lowercase tag for audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CouponReason {
    NotFound,
    Inactive,
    NotStarted,
    Expired,
    MinFareNotMet,
    AirlineMismatch,
    UsageLimitReached,
    PerUserLimit,
    NoServerCheck,
}

impl CouponReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CouponReason::NotFound => "not-found",
            CouponReason::Inactive => "inactive",
            CouponReason::NotStarted => "not-started",
            CouponReason::Expired => "expired",
            CouponReason::MinFareNotMet => "min-fare-not-met",
            CouponReason::AirlineMismatch => "airline-mismatch",
            CouponReason::UsageLimitReached => "usage-limit-reached",
            CouponReason::PerUserLimit => "per-user-limit",
            CouponReason::NoServerCheck => "no-server-check",
        }
    }
}

/// Coupon details supplied inline by the client, accepted when no server
/// record exists but always flagged as unchecked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InlineCoupon {
    pub code: String,
    #[serde(default)]
    pub percent: Option<i64>,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub cap_amount: Option<i64>,
}

/// Clients may send either a bare code or a structured coupon object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CouponInput {
    Code(String),
    Inline(InlineCoupon),
}

impl CouponInput {
    pub fn code(&self) -> &str {
        match self {
            CouponInput::Code(c) => c,
            CouponInput::Inline(i) => &i.code,
        }
    }
}

/// A coupon input paired with whatever the server could look up for it.
#[derive(Debug, Clone)]
pub struct ResolvedCoupon {
    pub input: CouponInput,
    pub coupon: Option<Coupon>,
    /// Prior redemptions by this user, for the per-user limit check.
    pub user_uses: i64,
}

pub(crate) struct Verdict {
    pub validated: bool,
    pub reason: Option<CouponReason>,
}

/// Validate a resolved coupon against a fare. Pure; the caller decides
/// whether an unvalidated discount still applies.
pub(crate) fn validate(
    rc: &ResolvedCoupon,
    seats_total: i64,
    airline: Option<&str>,
    now: DateTime<Utc>,
) -> Verdict {
    let Some(coupon) = &rc.coupon else {
        let reason = match &rc.input {
            CouponInput::Code(_) => CouponReason::NotFound,
            CouponInput::Inline(_) => CouponReason::NoServerCheck,
        };
        return Verdict {
            validated: false,
            reason: Some(reason),
        };
    };

    let fail = |reason| Verdict {
        validated: false,
        reason: Some(reason),
    };

    if !coupon.active {
        return fail(CouponReason::Inactive);
    }
    if coupon.valid_from.map(|t| now < t).unwrap_or(false) {
        return fail(CouponReason::NotStarted);
    }
    if coupon.valid_until.map(|t| now > t).unwrap_or(false) {
        return fail(CouponReason::Expired);
    }
    if coupon.min_fare.map(|m| seats_total < m).unwrap_or(false) {
        return fail(CouponReason::MinFareNotMet);
    }
    if let Some(required) = &coupon.airline {
        if airline != Some(required.as_str()) {
            return fail(CouponReason::AirlineMismatch);
        }
    }
    if let Some(limit) = coupon.usage_limit {
        if coupon.used_count >= limit {
            return fail(CouponReason::UsageLimitReached);
        }
    }
    if let Some(limit) = coupon.per_user_limit {
        if rc.user_uses >= limit {
            return fail(CouponReason::PerUserLimit);
        }
    }

    Verdict {
        validated: true,
        reason: None,
    }
}

/// Discount this coupon would grant on `seats_total`, before any policy
/// decision. Percent discounts are rounded half-up and capped.
pub(crate) fn discount_for(rc: &ResolvedCoupon, seats_total: i64) -> i64 {
    let (percent, amount, cap) = match (&rc.coupon, &rc.input) {
        (Some(c), _) => (c.percent, c.amount, c.cap_amount),
        (None, CouponInput::Inline(i)) => (i.percent, i.amount, i.cap_amount),
        (None, CouponInput::Code(_)) => (None, None, None),
    };

    let mut discount = if let Some(p) = percent {
        crate::engine::round_div(seats_total * p, 100)
    } else {
        amount.unwrap_or(0)
    };
    if let Some(cap) = cap {
        discount = discount.min(cap);
    }
    discount.max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aviro_core::model::coupon::Coupon;
    use chrono::Duration;

    fn resolved(coupon: Coupon) -> ResolvedCoupon {
        ResolvedCoupon {
            input: CouponInput::Code(coupon.code.clone()),
            coupon: Some(coupon),
            user_uses: 0,
        }
    }

    #[test]
    fn unknown_code_is_not_found() {
        let rc = ResolvedCoupon {
            input: CouponInput::Code("NOPE".into()),
            coupon: None,
            user_uses: 0,
        };
        let v = validate(&rc, 1000, None, Utc::now());
        assert!(!v.validated);
        assert_eq!(v.reason, Some(CouponReason::NotFound));
        assert_eq!(discount_for(&rc, 1000), 0);
    }

    #[test]
    fn inline_without_server_record_is_unchecked_but_priced() {
        let rc = ResolvedCoupon {
            input: CouponInput::Inline(InlineCoupon {
                code: "CLIENT10".into(),
                percent: Some(10),
                amount: None,
                cap_amount: None,
            }),
            coupon: None,
            user_uses: 0,
        };
        let v = validate(&rc, 2000, None, Utc::now());
        assert_eq!(v.reason, Some(CouponReason::NoServerCheck));
        assert_eq!(discount_for(&rc, 2000), 200);
    }

    #[test]
    fn window_and_fare_checks() {
        let now = Utc::now();

        let mut c = Coupon::percent_off("EARLY", 10);
        c.valid_from = Some(now + Duration::days(1));
        assert_eq!(
            validate(&resolved(c), 1000, None, now).reason,
            Some(CouponReason::NotStarted)
        );

        let mut c = Coupon::percent_off("LATE", 10);
        c.valid_until = Some(now - Duration::days(1));
        assert_eq!(
            validate(&resolved(c), 1000, None, now).reason,
            Some(CouponReason::Expired)
        );

        let mut c = Coupon::percent_off("BIGSPEND", 10);
        c.min_fare = Some(5000);
        assert_eq!(
            validate(&resolved(c), 1000, None, now).reason,
            Some(CouponReason::MinFareNotMet)
        );
    }

    #[test]
    fn airline_and_usage_checks() {
        let now = Utc::now();

        let mut c = Coupon::percent_off("AIRX", 10);
        c.airline = Some("XX".into());
        assert_eq!(
            validate(&resolved(c.clone()), 1000, Some("YY"), now).reason,
            Some(CouponReason::AirlineMismatch)
        );
        assert!(validate(&resolved(c), 1000, Some("XX"), now).validated);

        let mut c = Coupon::percent_off("USED", 10);
        c.usage_limit = Some(5);
        c.used_count = 5;
        assert_eq!(
            validate(&resolved(c), 1000, None, now).reason,
            Some(CouponReason::UsageLimitReached)
        );

        let mut c = Coupon::percent_off("PERUSER", 10);
        c.per_user_limit = Some(1);
        let mut rc = resolved(c);
        rc.user_uses = 1;
        assert_eq!(
            validate(&rc, 1000, None, now).reason,
            Some(CouponReason::PerUserLimit)
        );
    }

    #[test]
    fn percent_discount_is_capped() {
        let mut c = Coupon::percent_off("CAP", 50);
        c.cap_amount = Some(300);
        assert_eq!(discount_for(&resolved(c), 2000), 300);
    }
}
