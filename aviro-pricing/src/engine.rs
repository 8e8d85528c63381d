use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use aviro_core::model::addon::Addon;
use aviro_core::model::booking::{
    AppliedCoupon, BookingAddon, BookingDiscount, BookingPrice, BookingSeat,
};
use aviro_core::model::flight::Flight;
use aviro_core::model::seatmap::SeatMap;

use crate::coupon::{self, ResolvedCoupon};

/// Integer division rounding half-up. Amounts are non-negative majors.
pub fn round_div(n: i64, d: i64) -> i64 {
    (n + d / 2) / d
}

#[derive(Debug, Error)]
pub enum PricingError {
    #[error("no positive price could be resolved for seat {0}")]
    PricingIncomplete(String),
}

/// Knobs for behavior that is deliberate policy rather than arithmetic.
#[derive(Debug, Clone)]
pub struct PricingPolicy {
    /// Tax rate in basis points applied to the post-discount subtotal.
    pub tax_rate_bp: i64,
    /// When true, a coupon that failed validation still grants its
    /// discount; the failure is only recorded on the booking.
    pub apply_unvalidated_coupons: bool,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            tax_rate_bp: 500,
            apply_unvalidated_coupons: true,
        }
    }
}

/// One requested seat, possibly with a client-side price hint. The hint
/// ranks below anything the server knows.
#[derive(Debug, Clone, Deserialize)]
pub struct SeatSelection {
    pub seat_id: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub price_hint: Option<i64>,
}

/// A requested add-on line: the code plus how many units.
#[derive(Debug, Clone, Deserialize)]
pub struct AddonSelection {
    pub code: String,
    #[serde(default = "default_addon_qty")]
    pub qty: i64,
}

fn default_addon_qty() -> i64 {
    1
}

/// A canonical add-on paired with the quantity the client asked for.
#[derive(Debug, Clone)]
pub struct ResolvedAddon {
    pub addon: Addon,
    pub qty: i64,
}

/// A free-form reduction applied before tax, outside coupon validation.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscountInput {
    #[serde(default)]
    pub name: Option<String>,
    pub amount: i64,
}

pub struct QuoteRequest<'a> {
    pub flight: Option<&'a Flight>,
    pub seat_map: Option<&'a SeatMap>,
    pub seats: &'a [SeatSelection],
    /// Canonical add-ons resolved from the requested codes.
    pub addons: &'a [ResolvedAddon],
    pub discounts: &'a [DiscountInput],
    pub coupons: &'a [ResolvedCoupon],
    pub airline: Option<&'a str>,
    pub currency: &'a str,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Quote {
    pub price: BookingPrice,
    pub seats: Vec<BookingSeat>,
    pub addons: Vec<BookingAddon>,
    pub discounts: Vec<BookingDiscount>,
    pub coupons: Vec<AppliedCoupon>,
}

/// Deterministic server-side pricing. All inputs are passed in; the
/// engine does no I/O and rounds to whole major units at every step.
pub struct PricingEngine {
    policy: PricingPolicy,
}

impl PricingEngine {
    pub fn new(policy: PricingPolicy) -> Self {
        Self { policy }
    }

    pub fn quote(&self, req: &QuoteRequest<'_>) -> Result<Quote, PricingError> {
        let seats = self.price_seats(req)?;
        let seats_total: i64 = seats.iter().map(|s| s.price).sum();

        let addons = self.price_addons(req);
        let addons_total: i64 = addons.iter().map(|a| a.line_total()).sum();

        // Explicit discounts come off first; negative amounts are treated
        // as their magnitude.
        let discounts: Vec<BookingDiscount> = req
            .discounts
            .iter()
            .map(|d| BookingDiscount {
                name: d.name.clone(),
                amount: d.amount.abs(),
            })
            .collect();
        let mut discount_total: i64 = discounts.iter().map(|d| d.amount).sum();

        let mut applied = Vec::with_capacity(req.coupons.len());
        for rc in req.coupons {
            let verdict = coupon::validate(rc, seats_total, req.airline, req.now);
            let computed = coupon::discount_for(rc, seats_total);
            let granted = if verdict.validated || self.policy.apply_unvalidated_coupons {
                computed
            } else {
                0
            };
            if !verdict.validated && granted > 0 {
                debug!(
                    code = rc.input.code(),
                    reason = verdict.reason.map(|r| r.as_str()).unwrap_or(""),
                    granted,
                    "applying discount from unvalidated coupon"
                );
            }
            discount_total += granted;
            applied.push(AppliedCoupon {
                code: rc.input.code().to_string(),
                discount: granted,
                validated: verdict.validated,
                reason: verdict.reason.map(|r| r.as_str().to_string()),
            });
        }

        let taxable = (seats_total + addons_total - discount_total).max(0);
        let tax = round_div(taxable * self.policy.tax_rate_bp, 10_000);

        Ok(Quote {
            price: BookingPrice {
                seats_total,
                addons_total,
                discount_total,
                taxable,
                tax,
                amount: taxable + tax,
                currency: req.currency.to_string(),
            },
            seats,
            addons,
            discounts,
            coupons: applied,
        })
    }

    /// Resolve each seat's price through the fallback chain: seat-map
    /// metadata, the map's own seat price, the client hint, an equal split
    /// of the flight's base fare, and finally a cabin heuristic. The first
    /// positive amount wins; none means the quote cannot be completed.
    fn price_seats(&self, req: &QuoteRequest<'_>) -> Result<Vec<BookingSeat>, PricingError> {
        let base_fare = req.flight.map(|f| f.price.amount).filter(|a| *a > 0);
        let per_seat_split = base_fare
            .filter(|_| !req.seats.is_empty())
            .map(|b| round_div(b, req.seats.len() as i64));

        let mut out = Vec::with_capacity(req.seats.len());
        for sel in req.seats {
            let meta = req.seat_map.and_then(|m| {
                m.meta_for(&sel.seat_id)
                    .or_else(|| sel.label.as_deref().and_then(|l| m.meta_for(l)))
            });
            let seat = req.seat_map.and_then(|m| m.seat(&sel.seat_id));

            let cabin = meta
                .and_then(|m| m.cabin.clone())
                .or_else(|| seat.and_then(|s| s.cabin.clone()));

            let resolved = meta
                .and_then(|m| m.price)
                .filter(|p| *p > 0)
                .map(|p| (p, "seats-meta"))
                .or_else(|| {
                    seat.and_then(|s| s.price)
                        .filter(|p| *p > 0)
                        .map(|p| (p, "seat-map"))
                })
                .or_else(|| {
                    sel.price_hint
                        .filter(|p| *p > 0)
                        .map(|p| (p, "client-hint"))
                })
                .or_else(|| per_seat_split.filter(|p| *p > 0).map(|p| (p, "base-fare-split")))
                .or_else(|| {
                    cabin_heuristic(
                        base_fare,
                        cabin.as_deref(),
                        meta.and_then(|m| m.price_modifier)
                            .or_else(|| seat.and_then(|s| s.price_modifier)),
                    )
                    .map(|p| (p, "cabin-heuristic"))
                });

            let Some((price, source)) = resolved else {
                return Err(PricingError::PricingIncomplete(sel.seat_id.clone()));
            };

            out.push(BookingSeat {
                seat_id: sel.seat_id.clone(),
                label: sel.label.clone(),
                cabin,
                price,
                price_source: source.to_string(),
            });
        }
        Ok(out)
    }

    /// Inactive or airline-restricted add-ons are dropped from the quote
    /// without failing it.
    fn price_addons(&self, req: &QuoteRequest<'_>) -> Vec<BookingAddon> {
        req.addons
            .iter()
            .filter(|r| {
                if !r.addon.active {
                    debug!(code = %r.addon.code, "dropping inactive add-on");
                    return false;
                }
                if let Some(required) = &r.addon.airline {
                    if req.airline != Some(required.as_str()) {
                        debug!(code = %r.addon.code, "dropping add-on restricted to another airline");
                        return false;
                    }
                }
                true
            })
            .map(|r| BookingAddon {
                code: r.addon.code.clone(),
                name: r.addon.name.clone(),
                amount: r.addon.amount,
                qty: r.qty.max(1),
            })
            .collect()
    }
}

/// Last-resort price from cabin class: economy rides the base fare,
/// premium cabins ride the base fare plus the seat's modifier.
fn cabin_heuristic(
    base_fare: Option<i64>,
    cabin: Option<&str>,
    price_modifier: Option<i64>,
) -> Option<i64> {
    let modifier = price_modifier.unwrap_or(0);
    let economy = match cabin.map(|c| c.to_ascii_lowercase()) {
        None => true,
        Some(c) => c.is_empty() || c == "economy",
    };
    let price = match base_fare {
        Some(base) if economy => base,
        Some(base) => base + modifier,
        None => modifier,
    };
    (price > 0).then_some(price)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coupon::{CouponInput, InlineCoupon};
    use aviro_core::model::coupon::Coupon;
    use aviro_core::model::seatmap::{Seat, SeatMap, SeatMeta};
    use aviro_core::model::Money;
    use uuid::Uuid;

    fn flight_with_base(amount: i64) -> Flight {
        let now = Utc::now();
        Flight {
            id: Uuid::new_v4(),
            provider: "manual".into(),
            airline: "AV".into(),
            flight_number: "AV100".into(),
            origin: "LHR".into(),
            destination: "JFK".into(),
            departure_at: now,
            arrival_at: now,
            price: Money::new(amount, "usd"),
            seats_available: 100,
            created_at: now,
            updated_at: now,
        }
    }

    fn map_with_meta(prices: &[(&str, i64)]) -> SeatMap {
        let mut map = SeatMap::new(
            "FL-1",
            prices.iter().map(|(id, _)| Seat::free(*id)).collect(),
        );
        map.seats_meta = prices
            .iter()
            .map(|(id, p)| SeatMeta {
                seat_id: (*id).into(),
                label: None,
                cabin: None,
                price: Some(*p),
                price_modifier: None,
            })
            .collect();
        map
    }

    fn sel(id: &str) -> SeatSelection {
        SeatSelection {
            seat_id: id.into(),
            label: None,
            price_hint: None,
        }
    }

    fn addon_line(addon: Addon, qty: i64) -> ResolvedAddon {
        ResolvedAddon { addon, qty }
    }

    fn resolved_percent(code: &str, percent: i64, cap: Option<i64>) -> ResolvedCoupon {
        let mut c = Coupon::percent_off(code, percent);
        c.cap_amount = cap;
        ResolvedCoupon {
            input: CouponInput::Code(code.into()),
            coupon: Some(c),
            user_uses: 0,
        }
    }

    #[test]
    fn worked_example_totals() {
        let map = map_with_meta(&[("1A", 1000), ("1B", 1200)]);
        let addon = Addon::new("BAG20", "Extra bag", 300);
        let engine = PricingEngine::new(PricingPolicy::default());

        let quote = engine
            .quote(&QuoteRequest {
                flight: None,
                seat_map: Some(&map),
                seats: &[sel("1A"), sel("1B")],
                addons: &[addon_line(addon, 1)],
                discounts: &[],
                coupons: &[resolved_percent("TEN", 10, Some(500))],
                airline: None,
                currency: "usd",
                now: Utc::now(),
            })
            .unwrap();

        assert_eq!(quote.price.seats_total, 2200);
        assert_eq!(quote.price.addons_total, 300);
        assert_eq!(quote.price.discount_total, 220);
        assert_eq!(quote.price.taxable, 2280);
        assert_eq!(quote.price.tax, 114);
        assert_eq!(quote.price.amount, 2394);
        assert!(quote.coupons[0].validated);
    }

    #[test]
    fn addon_quantity_multiplies_the_line() {
        let map = map_with_meta(&[("1A", 1000)]);
        let engine = PricingEngine::new(PricingPolicy::default());
        let quote = engine
            .quote(&QuoteRequest {
                flight: None,
                seat_map: Some(&map),
                seats: &[sel("1A")],
                addons: &[addon_line(Addon::new("MEAL", "Hot meal", 45), 3)],
                discounts: &[],
                coupons: &[],
                airline: None,
                currency: "usd",
                now: Utc::now(),
            })
            .unwrap();
        assert_eq!(quote.addons[0].qty, 3);
        assert_eq!(quote.price.addons_total, 135);
    }

    #[test]
    fn explicit_discounts_come_off_before_tax() {
        let map = map_with_meta(&[("1A", 500), ("1B", 700)]);
        let engine = PricingEngine::new(PricingPolicy::default());
        let quote = engine
            .quote(&QuoteRequest {
                flight: None,
                seat_map: Some(&map),
                seats: &[sel("1A"), sel("1B")],
                addons: &[addon_line(Addon::new("BAG20", "Extra bag", 300), 1)],
                discounts: &[DiscountInput {
                    name: Some("goodwill".into()),
                    amount: 100,
                }],
                coupons: &[],
                airline: None,
                currency: "usd",
                now: Utc::now(),
            })
            .unwrap();
        assert_eq!(quote.price.discount_total, 100);
        assert_eq!(quote.price.taxable, 1_400);
        assert_eq!(quote.price.tax, 70);
        assert_eq!(quote.price.amount, 1_470);
        assert_eq!(quote.discounts.len(), 1);
    }

    #[test]
    fn fallback_chain_prefers_server_knowledge_over_hint() {
        let map = map_with_meta(&[("1A", 900)]);
        let engine = PricingEngine::new(PricingPolicy::default());
        let quote = engine
            .quote(&QuoteRequest {
                flight: Some(&flight_with_base(500)),
                seat_map: Some(&map),
                seats: &[SeatSelection {
                    seat_id: "1A".into(),
                    label: None,
                    price_hint: Some(1),
                }],
                addons: &[],
                discounts: &[],
                coupons: &[],
                airline: None,
                currency: "usd",
                now: Utc::now(),
            })
            .unwrap();
        assert_eq!(quote.seats[0].price, 900);
        assert_eq!(quote.seats[0].price_source, "seats-meta");
    }

    #[test]
    fn base_fare_split_when_map_has_no_prices() {
        let map = SeatMap::new("FL-1", vec![Seat::free("1A"), Seat::free("1B")]);
        let engine = PricingEngine::new(PricingPolicy::default());
        let quote = engine
            .quote(&QuoteRequest {
                flight: Some(&flight_with_base(901)),
                seat_map: Some(&map),
                seats: &[sel("1A"), sel("1B")],
                addons: &[],
                discounts: &[],
                coupons: &[],
                airline: None,
                currency: "usd",
                now: Utc::now(),
            })
            .unwrap();
        // 901 / 2 rounded half-up
        assert_eq!(quote.seats[0].price, 451);
        assert_eq!(quote.seats[0].price_source, "base-fare-split");
    }

    #[test]
    fn cabin_heuristic_adds_modifier_for_premium_cabins() {
        let mut map = SeatMap::new("FL-1", vec![Seat::free("2A")]);
        map.seats_meta = vec![SeatMeta {
            seat_id: "2A".into(),
            label: None,
            cabin: Some("business".into()),
            price: None,
            price_modifier: Some(400),
        }];
        // No flight: the split is unavailable, modifier alone prices it.
        let engine = PricingEngine::new(PricingPolicy::default());
        let quote = engine
            .quote(&QuoteRequest {
                flight: None,
                seat_map: Some(&map),
                seats: &[sel("2A")],
                addons: &[],
                discounts: &[],
                coupons: &[],
                airline: None,
                currency: "usd",
                now: Utc::now(),
            })
            .unwrap();
        assert_eq!(quote.seats[0].price, 400);
        assert_eq!(quote.seats[0].price_source, "cabin-heuristic");
    }

    #[test]
    fn unresolvable_seat_fails_the_quote() {
        let map = SeatMap::new("FL-1", vec![Seat::free("1A")]);
        let engine = PricingEngine::new(PricingPolicy::default());
        let err = engine
            .quote(&QuoteRequest {
                flight: None,
                seat_map: Some(&map),
                seats: &[sel("1A")],
                addons: &[],
                discounts: &[],
                coupons: &[],
                airline: None,
                currency: "usd",
                now: Utc::now(),
            })
            .unwrap_err();
        assert!(matches!(err, PricingError::PricingIncomplete(_)));
    }

    #[test]
    fn mismatched_airline_addon_is_dropped_silently() {
        let map = map_with_meta(&[("1A", 1000)]);
        let mut addon = Addon::new("LOUNGE", "Lounge pass", 150);
        addon.airline = Some("ZZ".into());
        let engine = PricingEngine::new(PricingPolicy::default());
        let quote = engine
            .quote(&QuoteRequest {
                flight: None,
                seat_map: Some(&map),
                seats: &[sel("1A")],
                addons: &[addon_line(addon, 2)],
                discounts: &[],
                coupons: &[],
                airline: Some("AV"),
                currency: "usd",
                now: Utc::now(),
            })
            .unwrap();
        assert!(quote.addons.is_empty());
        assert_eq!(quote.price.addons_total, 0);
    }

    #[test]
    fn unvalidated_coupon_behavior_follows_policy() {
        let map = map_with_meta(&[("1A", 1000)]);
        let inline = ResolvedCoupon {
            input: CouponInput::Inline(InlineCoupon {
                code: "CLIENT10".into(),
                percent: Some(10),
                amount: None,
                cap_amount: None,
            }),
            coupon: None,
            user_uses: 0,
        };

        let lenient = PricingEngine::new(PricingPolicy::default());
        let quote = lenient
            .quote(&QuoteRequest {
                flight: None,
                seat_map: Some(&map),
                seats: &[sel("1A")],
                addons: &[],
                discounts: &[],
                coupons: std::slice::from_ref(&inline),
                airline: None,
                currency: "usd",
                now: Utc::now(),
            })
            .unwrap();
        assert_eq!(quote.price.discount_total, 100);
        assert!(!quote.coupons[0].validated);
        assert_eq!(quote.coupons[0].reason.as_deref(), Some("no-server-check"));

        let strict = PricingEngine::new(PricingPolicy {
            apply_unvalidated_coupons: false,
            ..PricingPolicy::default()
        });
        let quote = strict
            .quote(&QuoteRequest {
                flight: None,
                seat_map: Some(&map),
                seats: &[sel("1A")],
                addons: &[],
                discounts: &[],
                coupons: &[inline],
                airline: None,
                currency: "usd",
                now: Utc::now(),
            })
            .unwrap();
        assert_eq!(quote.price.discount_total, 0);
    }

    #[test]
    fn discounts_never_push_taxable_below_zero() {
        let map = map_with_meta(&[("1A", 100)]);
        let mut c = Coupon::percent_off("HUGE", 10);
        c.percent = None;
        c.amount = Some(5000);
        let engine = PricingEngine::new(PricingPolicy::default());
        let quote = engine
            .quote(&QuoteRequest {
                flight: None,
                seat_map: Some(&map),
                seats: &[sel("1A")],
                addons: &[],
                discounts: &[],
                coupons: &[ResolvedCoupon {
                    input: CouponInput::Code("HUGE".into()),
                    coupon: Some(c),
                    user_uses: 0,
                }],
                airline: None,
                currency: "usd",
                now: Utc::now(),
            })
            .unwrap();
        assert_eq!(quote.price.taxable, 0);
        assert_eq!(quote.price.tax, 0);
        assert_eq!(quote.price.amount, 0);
    }
}
