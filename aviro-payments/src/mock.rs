use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use aviro_core::model::booking::SessionParams;
use aviro_core::payment::{
    CheckoutSession, PaymentIntentInfo, PaymentProcessor, RefundInfo, RefundTarget,
};

#[derive(Clone)]
struct MockSession {
    params: SessionParams,
    payment_intent_id: String,
    paid: bool,
}

/// In-memory processor double. Sessions can be flipped to paid, and the
/// next call can be made to fail, which is all the retry paths need.
pub struct MockProcessor {
    sessions: Mutex<HashMap<String, MockSession>>,
    refunds: Mutex<Vec<(RefundTarget, RefundInfo)>>,
    fail_next: AtomicBool,
    created: Mutex<Vec<SessionParams>>,
}

impl MockProcessor {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            refunds: Mutex::new(Vec::new()),
            fail_next: AtomicBool::new(false),
            created: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_next_call(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Simulate the customer completing checkout.
    pub fn mark_paid(&self, session_id: &str) {
        if let Some(s) = self.sessions.lock().unwrap().get_mut(session_id) {
            s.paid = true;
        }
    }

    pub fn payment_intent_for(&self, session_id: &str) -> Option<String> {
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .map(|s| s.payment_intent_id.clone())
    }

    /// Every set of parameters ever sent to session creation, in order.
    pub fn created_params(&self) -> Vec<SessionParams> {
        self.created.lock().unwrap().clone()
    }

    fn take_failure(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err("simulated processor outage".into());
        }
        Ok(())
    }
}

impl Default for MockProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentProcessor for MockProcessor {
    async fn create_checkout_session(
        &self,
        params: &SessionParams,
    ) -> Result<CheckoutSession, Box<dyn std::error::Error + Send + Sync>> {
        self.take_failure()?;
        self.created.lock().unwrap().push(params.clone());

        let id = format!("cs_{}", Uuid::new_v4().simple());
        let payment_intent_id = format!("pi_{}", Uuid::new_v4().simple());
        self.sessions.lock().unwrap().insert(
            id.clone(),
            MockSession {
                params: params.clone(),
                payment_intent_id: payment_intent_id.clone(),
                paid: false,
            },
        );
        Ok(CheckoutSession {
            url: Some(format!("https://pay.example.test/{id}")),
            payment_intent_id: Some(payment_intent_id),
            payment_status: Some("unpaid".to_string()),
            status: Some("open".to_string()),
            id,
        })
    }

    async fn retrieve_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSession, Box<dyn std::error::Error + Send + Sync>> {
        self.take_failure()?;
        let sessions = self.sessions.lock().unwrap();
        let s = sessions
            .get(session_id)
            .ok_or_else(|| format!("no such session {session_id}"))?;
        Ok(CheckoutSession {
            id: session_id.to_string(),
            url: Some(format!("https://pay.example.test/{session_id}")),
            payment_intent_id: Some(s.payment_intent_id.clone()),
            payment_status: Some(if s.paid { "paid" } else { "unpaid" }.to_string()),
            status: Some(if s.paid { "complete" } else { "open" }.to_string()),
        })
    }

    async fn retrieve_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<PaymentIntentInfo, Box<dyn std::error::Error + Send + Sync>> {
        self.take_failure()?;
        let sessions = self.sessions.lock().unwrap();
        let s = sessions
            .values()
            .find(|s| s.payment_intent_id == payment_intent_id)
            .ok_or_else(|| format!("no such payment intent {payment_intent_id}"))?;
        Ok(PaymentIntentInfo {
            id: payment_intent_id.to_string(),
            status: if s.paid { "succeeded" } else { "requires_payment_method" }.to_string(),
            charge_id: s.paid.then(|| format!("ch_{payment_intent_id}")),
            amount_minor: s.params.amount_minor,
            currency: s.params.currency.clone(),
        })
    }

    async fn create_refund(
        &self,
        target: &RefundTarget,
        amount_minor: Option<i64>,
        reason: Option<&str>,
    ) -> Result<RefundInfo, Box<dyn std::error::Error + Send + Sync>> {
        self.take_failure()?;
        let _ = reason;
        let refund = RefundInfo {
            id: format!("re_{}", Uuid::new_v4().simple()),
            amount_minor: amount_minor.unwrap_or(0),
            currency: "usd".to_string(),
            status: "succeeded".to_string(),
            charge_id: match target {
                RefundTarget::Charge(c) => Some(c.clone()),
                RefundTarget::PaymentIntent(_) => None,
            },
        };
        self.refunds
            .lock()
            .unwrap()
            .push((target.clone(), refund.clone()));
        Ok(refund)
    }

    async fn list_refunds(
        &self,
        target: &RefundTarget,
    ) -> Result<Vec<RefundInfo>, Box<dyn std::error::Error + Send + Sync>> {
        self.take_failure()?;
        Ok(self
            .refunds
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == target)
            .map(|(_, r)| r.clone())
            .collect())
    }
}
