#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use stkpay::{
    CheckoutId, PaymentGateway, PaymentRequest, PaymentRequestHandle, PaymentStatus, Result,
};

/// Gateway that replays scripted answers and records every call.
///
/// A checkout id with no scripted status left keeps answering `pending`.
#[derive(Default)]
pub struct ScriptedGateway {
    initiations: Mutex<VecDeque<(Duration, Result<PaymentRequestHandle>)>>,
    statuses: Mutex<HashMap<CheckoutId, VecDeque<Result<PaymentStatus>>>>,
    initiate_calls: Mutex<Vec<PaymentRequest>>,
    status_calls: Mutex<Vec<CheckoutId>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_initiate(self, result: Result<PaymentRequestHandle>) -> Self {
        self.on_initiate_after(Duration::ZERO, result)
    }

    /// Answer the next initiate call only after `delay`
    pub fn on_initiate_after(self, delay: Duration, result: Result<PaymentRequestHandle>) -> Self {
        self.initiations.lock().unwrap().push_back((delay, result));
        self
    }

    pub fn issue(self, checkout_id: &str) -> Self {
        self.on_initiate(Ok(PaymentRequestHandle::new(checkout_id)))
    }

    pub fn on_status(self, checkout_id: &str, result: Result<PaymentStatus>) -> Self {
        self.statuses
            .lock()
            .unwrap()
            .entry(CheckoutId::new(checkout_id))
            .or_default()
            .push_back(result);
        self
    }

    pub fn initiate_calls(&self) -> Vec<PaymentRequest> {
        self.initiate_calls.lock().unwrap().clone()
    }

    pub fn status_calls(&self) -> Vec<CheckoutId> {
        self.status_calls.lock().unwrap().clone()
    }

    pub fn status_call_count(&self) -> usize {
        self.status_calls.lock().unwrap().len()
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn initiate(&self, request: &PaymentRequest) -> Result<PaymentRequestHandle> {
        self.initiate_calls.lock().unwrap().push(request.clone());
        let next = self.initiations.lock().unwrap().pop_front();
        match next {
            Some((delay, result)) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                result
            }
            None => Err(stkpay::StkPayError::unexpected("no scripted initiation")),
        }
    }

    async fn status(&self, checkout_id: &CheckoutId) -> Result<PaymentStatus> {
        self.status_calls.lock().unwrap().push(checkout_id.clone());
        self.statuses
            .lock()
            .unwrap()
            .get_mut(checkout_id)
            .and_then(|queue| queue.pop_front())
            .unwrap_or(Ok(PaymentStatus::Pending))
    }
}
