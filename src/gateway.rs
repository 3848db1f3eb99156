//! Payment initiation and status seam used by the poller

use crate::client::DashboardClient;
use crate::types::{CheckoutId, PaymentRequest, PaymentRequestHandle, PaymentStatus};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Backend operations the payment poller depends on
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Start a payment request and return the backend's handle for it
    async fn initiate(&self, request: &PaymentRequest) -> Result<PaymentRequestHandle>;

    /// Query the current status of an initiated request
    async fn status(&self, checkout_id: &CheckoutId) -> Result<PaymentStatus>;
}

#[async_trait]
impl PaymentGateway for DashboardClient {
    async fn initiate(&self, request: &PaymentRequest) -> Result<PaymentRequestHandle> {
        let response = self.stk_push(request).await?;
        Ok(PaymentRequestHandle::new(response.checkout_request_id))
    }

    async fn status(&self, checkout_id: &CheckoutId) -> Result<PaymentStatus> {
        self.transaction_status(checkout_id).await
    }
}

#[async_trait]
impl<G: PaymentGateway + ?Sized> PaymentGateway for Arc<G> {
    async fn initiate(&self, request: &PaymentRequest) -> Result<PaymentRequestHandle> {
        (**self).initiate(request).await
    }

    async fn status(&self, checkout_id: &CheckoutId) -> Result<PaymentStatus> {
        (**self).status(checkout_id).await
    }
}
