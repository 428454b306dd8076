use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mercato_shared::Redacted;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentReceipt {
    pub transaction_id: Uuid,
    pub amount: f64,
    pub paid_at: DateTime<Utc>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Charge the buyer identified by `payment_details`
    async fn pay(
        &self,
        amount: f64,
        payment_details: &Redacted<String>,
    ) -> Result<PaymentReceipt, Box<dyn std::error::Error + Send + Sync>>;

    /// Give back a charge made by [`PaymentGateway::pay`]. A receipt is refunded at most once.
    async fn refund(
        &self,
        receipt: &PaymentReceipt,
        payment_details: &Redacted<String>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// In-process gateway for tests and local runs.
#[derive(Default)]
pub struct MockPaymentGateway {
    faulty: AtomicBool,
    refused: Mutex<HashSet<String>>,
    balances: Mutex<HashMap<String, f64>>,
    refunded: Mutex<HashSet<Uuid>>,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the gateway going down
    pub fn set_faulty(&self, faulty: bool) {
        self.faulty.store(faulty, Ordering::SeqCst);
    }

    pub async fn refuse(&self, payment_details: &str) {
        self.refused.lock().await.insert(payment_details.to_string());
    }

    pub async fn balance(&self, payment_details: &str) -> f64 {
        self.balances
            .lock()
            .await
            .get(payment_details)
            .copied()
            .unwrap_or(0.0)
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn pay(
        &self,
        amount: f64,
        payment_details: &Redacted<String>,
    ) -> Result<PaymentReceipt, Box<dyn std::error::Error + Send + Sync>> {
        if self.faulty.load(Ordering::SeqCst) {
            return Err("The payment system is currently not working".into());
        }
        if self.refused.lock().await.contains(payment_details.expose()) {
            return Err("The client with those payment details cannot pay".into());
        }

        *self
            .balances
            .lock()
            .await
            .entry(payment_details.expose().clone())
            .or_insert(0.0) += amount;

        tracing::debug!("Mock payment of {:.2} accepted", amount);
        Ok(PaymentReceipt {
            transaction_id: Uuid::new_v4(),
            amount,
            paid_at: Utc::now(),
        })
    }

    async fn refund(
        &self,
        receipt: &PaymentReceipt,
        payment_details: &Redacted<String>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if self.faulty.load(Ordering::SeqCst) {
            return Err("The payment system is currently not working".into());
        }
        if !self.refunded.lock().await.insert(receipt.transaction_id) {
            return Err(format!("Transaction {} was already refunded", receipt.transaction_id).into());
        }

        *self
            .balances
            .lock()
            .await
            .entry(payment_details.expose().clone())
            .or_insert(0.0) -= receipt.amount;

        tracing::debug!("Mock refund of {:.2} issued", receipt.amount);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_payment() {
        let gateway = MockPaymentGateway::new();
        let card = Redacted::from("card-1");

        let receipt = gateway.pay(25.0, &card).await.unwrap();
        assert_eq!(receipt.amount, 25.0);
        gateway.pay(5.0, &card).await.unwrap();
        assert_eq!(gateway.balance("card-1").await, 30.0);

        gateway.refund(&receipt, &card).await.unwrap();
        assert_eq!(gateway.balance("card-1").await, 5.0);
        assert!(gateway.refund(&receipt, &card).await.is_err());
        assert_eq!(gateway.balance("card-1").await, 5.0);

        gateway.refuse("card-1").await;
        assert!(gateway.pay(1.0, &card).await.is_err());

        gateway.set_faulty(true);
        let err = gateway.pay(1.0, &Redacted::from("card-2")).await.unwrap_err();
        assert!(err.to_string().contains("not working"));
    }
}
