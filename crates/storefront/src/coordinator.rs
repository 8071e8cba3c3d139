//! Order/payment lifecycle coordinator.
//!
//! ```text
//! PENDING | FAILED ──initiate──▶ AWAITING_PAYMENT (attempt ACTIVE)
//! AWAITING_PAYMENT ──ok──────▶ PAID      (attempt CONFIRMED)
//!                  ──cancel──▶ CANCELLED (attempt FAILED)
//!                  ──fail────▶ FAILED    (attempt FAILED, may pay again)
//!                  ──expiry──▶ EXPIRED   (attempt EXPIRED)
//! PENDING | FAILED | AWAITING_PAYMENT ──owner cancel──▶ CANCELLED
//! ```
//!
//! Every arrow is a compare-and-swap in the [`OrderStore`]. A miss means a
//! concurrent request already moved the order; the caller gets the status
//! that won instead of an error.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use crate::catalog::CartLine;
use crate::constants::DEFAULT_PAYMENT_EXPIRY_SECS;
use crate::error::StorefrontError;
use crate::gateway::{CallbackOutcome, CallbackParams, PaymentGateway, PaymentRequest, SignedParams};
use crate::order::{AttemptStatus, Currency, Order, OrderStatus, PaymentAttempt};
use crate::resolver::CartSnapshotResolver;
use crate::store::{AttemptTransition, Catalog, OrderStore};
use crate::unix_now;

/// Coordinator settings, passed in explicitly at construction.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Currency every product and order must be priced in.
    pub currency: Currency,
    /// How long an ACTIVE attempt may wait for a callback.
    pub payment_expiry: Duration,
}

impl CoordinatorConfig {
    pub fn new(currency: Currency) -> Self {
        Self {
            currency,
            payment_expiry: Duration::from_secs(DEFAULT_PAYMENT_EXPIRY_SECS),
        }
    }

    pub fn with_payment_expiry(mut self, expiry: Duration) -> Self {
        self.payment_expiry = expiry;
        self
    }
}

/// Result of [`Coordinator::initiate_payment`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentInitiation {
    /// A new provider session was opened and recorded.
    Opened(PaymentAttempt),
    /// A payment was already in progress; this is its attempt.
    Existing(PaymentAttempt),
    /// No attempt was opened; the order is in this status.
    Unchanged(OrderStatus),
}

impl PaymentInitiation {
    pub fn attempt(&self) -> Option<&PaymentAttempt> {
        match self {
            Self::Opened(a) | Self::Existing(a) => Some(a),
            Self::Unchanged(_) => None,
        }
    }

    pub fn redirect_url(&self) -> Option<&str> {
        self.attempt().and_then(|a| a.redirect_url.as_deref())
    }

    pub fn order_status(&self) -> OrderStatus {
        match self {
            Self::Opened(_) | Self::Existing(_) => OrderStatus::AwaitingPayment,
            Self::Unchanged(status) => *status,
        }
    }

    /// Whether this call opened the payment.
    pub fn applied(&self) -> bool {
        matches!(self, Self::Opened(_))
    }
}

/// Acknowledgment of a verified callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackAck {
    pub order_id: Uuid,
    pub status: OrderStatus,
    /// `false` for duplicates, stale attempts and non-final statuses.
    pub applied: bool,
}

/// Result of a user-driven transition such as a cancel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionOutcome {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub applied: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusView {
    pub attempt: PaymentAttempt,
    pub order_status: OrderStatus,
}

/// Ties the order lifecycle to the payment lifecycle.
pub struct Coordinator<G: PaymentGateway> {
    orders: Arc<dyn OrderStore>,
    catalog: Arc<dyn Catalog>,
    resolver: CartSnapshotResolver,
    gateway: G,
    config: CoordinatorConfig,
}

impl<G: PaymentGateway> Coordinator<G> {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        catalog: Arc<dyn Catalog>,
        gateway: G,
        config: CoordinatorConfig,
    ) -> Self {
        let resolver = CartSnapshotResolver::new(Arc::clone(&catalog), config.currency.clone());
        Self {
            orders,
            catalog,
            resolver,
            gateway,
            config,
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Snapshot the user's cart into a new PENDING order.
    ///
    /// Afterwards the ordered lines are removed from the cart on a
    /// best-effort basis. Lines added or changed while the order was being
    /// created stay in the cart. A failure here does not undo the order.
    pub async fn create_order(&self, user_id: &str) -> Result<Order, StorefrontError> {
        let snapshot = self.resolver.resolve(user_id)?;
        let ordered: Vec<CartLine> = snapshot
            .items()
            .iter()
            .map(|item| CartLine {
                product_id: item.product_id.clone(),
                quantity: item.quantity,
            })
            .collect();
        let order = self.orders.create_order(user_id, snapshot)?;
        tracing::info!(
            order_id = %order.id,
            user_id = %user_id,
            total = order.total,
            currency = %order.currency,
            "order created"
        );

        match self.catalog.remove_ordered_lines(user_id, &ordered) {
            Ok(removed) if removed < ordered.len() => tracing::info!(
                order_id = %order.id,
                kept = ordered.len() - removed,
                "cart changed during checkout, changed lines kept"
            ),
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "failed to clear cart after checkout")
            }
        }
        Ok(order)
    }

    /// Open a payment for the order, or report the one already in flight.
    ///
    /// Gateway errors are returned unchanged and leave the order as it was.
    /// Nothing is persisted before the gateway has answered.
    pub async fn initiate_payment(
        &self,
        order_id: Uuid,
    ) -> Result<PaymentInitiation, StorefrontError> {
        let order = self.orders.get_by_id(order_id)?;
        if let Some(current) = self.in_flight_or_settled(&order)? {
            tracing::debug!(order_id = %order_id, status = %order.status, "no new payment opened");
            return Ok(current);
        }

        let attempt = PaymentAttempt::for_order(&order, unix_now());
        let request = PaymentRequest {
            attempt_id: attempt.id,
            order_id: order.id,
            amount: attempt.amount,
            currency: order.currency.clone(),
            items: order.items.clone(),
        };

        let session = match self.gateway.open_payment(&request).await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(
                    order_id = %order_id,
                    attempt_id = %attempt.id,
                    error = %e,
                    "payment gateway did not open a session"
                );
                return Err(e);
            }
        };

        let transaction_id = session.transaction_id.clone();
        let attempt = attempt.activate(session.transaction_id, session.redirect_url, unix_now());
        if self.orders.begin_payment(order.id, order.status, &attempt)? {
            tracing::info!(
                order_id = %order_id,
                attempt_id = %attempt.id,
                transaction_id = %transaction_id,
                amount = attempt.amount,
                "payment opened"
            );
            return Ok(PaymentInitiation::Opened(attempt));
        }

        tracing::warn!(
            order_id = %order_id,
            transaction_id = %transaction_id,
            "concurrent initiation won, discarding provider session"
        );
        let current = self.orders.get_by_id(order_id)?;
        Ok(self
            .in_flight_or_settled(&current)?
            .unwrap_or(PaymentInitiation::Unchanged(current.status)))
    }

    fn in_flight_or_settled(
        &self,
        order: &Order,
    ) -> Result<Option<PaymentInitiation>, StorefrontError> {
        if order.status.is_terminal() {
            return Ok(Some(PaymentInitiation::Unchanged(order.status)));
        }
        if order.status != OrderStatus::AwaitingPayment {
            return Ok(None);
        }
        match self.orders.active_attempt(order.id)? {
            Some(attempt) => Ok(Some(PaymentInitiation::Existing(attempt))),
            // Settled between the two reads.
            None => Ok(Some(PaymentInitiation::Unchanged(
                self.orders.get_by_id(order.id)?.status,
            ))),
        }
    }

    /// Apply a provider callback.
    ///
    /// `params` are the received parameters (headers or query string) with
    /// lowercased keys, `body` the raw request body. Nothing is read from the
    /// payload before its signature has been verified.
    pub async fn handle_callback(
        &self,
        params: &SignedParams,
        body: &[u8],
    ) -> Result<CallbackAck, StorefrontError> {
        if !self.gateway.verify_signature(params, body) {
            tracing::warn!("callback signature verification failed");
            return Err(StorefrontError::UntrustedCallback);
        }
        let callback = CallbackParams::from_params(params)?;

        let order = self.orders.get_by_id(callback.order_id)?;
        let noop = |status: OrderStatus| CallbackAck {
            order_id: order.id,
            status,
            applied: false,
        };

        if order.status.is_terminal() {
            if callback.outcome == CallbackOutcome::Paid && order.status != OrderStatus::Paid {
                tracing::error!(
                    order_id = %order.id,
                    status = %order.status,
                    transaction_id = %callback.transaction_id,
                    "provider confirmed payment for an order that is no longer payable, refund required"
                );
            } else {
                tracing::info!(
                    order_id = %order.id,
                    status = %order.status,
                    outcome = callback.outcome.as_str(),
                    "callback for settled order acknowledged"
                );
            }
            return Ok(noop(order.status));
        }

        let attempt = match self.orders.get_attempt(callback.attempt_id)? {
            Some(a) if a.order_id == order.id && a.status == AttemptStatus::Active => a,
            other => {
                let attempt_status = other.map(|a| a.status);
                if callback.outcome == CallbackOutcome::Paid {
                    tracing::error!(
                        order_id = %order.id,
                        attempt_id = %callback.attempt_id,
                        attempt_status = ?attempt_status,
                        transaction_id = %callback.transaction_id,
                        "provider confirmed payment for an attempt that is no longer active, refund required"
                    );
                } else {
                    tracing::warn!(
                        order_id = %order.id,
                        attempt_id = %callback.attempt_id,
                        attempt_status = ?attempt_status,
                        "callback for an attempt that is not active, ignoring"
                    );
                }
                return Ok(noop(order.status));
            }
        };

        if callback.amount != attempt.amount {
            tracing::warn!(
                order_id = %order.id,
                expected = attempt.amount,
                received = callback.amount,
                "callback amount does not match attempt"
            );
            return Err(StorefrontError::AmountMismatch {
                expected: attempt.amount,
                received: callback.amount,
            });
        }
        if attempt
            .provider_reference
            .as_deref()
            .is_some_and(|r| r != callback.transaction_id)
        {
            tracing::warn!(
                order_id = %order.id,
                transaction_id = %callback.transaction_id,
                "callback transaction id does not match attempt"
            );
            return Err(StorefrontError::InvalidCallback(
                "transaction id does not match the payment attempt".to_string(),
            ));
        }

        let (order_to, attempt_to) = match callback.outcome {
            CallbackOutcome::Paid => (OrderStatus::Paid, AttemptStatus::Confirmed),
            CallbackOutcome::Cancelled => (OrderStatus::Cancelled, AttemptStatus::Failed),
            CallbackOutcome::Declined => (OrderStatus::Failed, AttemptStatus::Failed),
            CallbackOutcome::Pending => {
                tracing::debug!(order_id = %order.id, "payment still pending at provider");
                return Ok(noop(order.status));
            }
        };

        let move_attempt =
            AttemptTransition::new(attempt.id, AttemptStatus::Active, attempt_to)
                .with_provider_reference(Some(callback.transaction_id.clone()));
        if self
            .orders
            .transition(order.id, order.status, order_to, Some(&move_attempt))?
        {
            tracing::info!(
                order_id = %order.id,
                attempt_id = %attempt.id,
                from = %order.status,
                to = %order_to,
                "payment callback applied"
            );
            return Ok(CallbackAck {
                order_id: order.id,
                status: order_to,
                applied: true,
            });
        }

        let current = self.orders.get_by_id(order.id)?;
        tracing::info!(
            order_id = %order.id,
            status = %current.status,
            "callback lost the race to a concurrent transition"
        );
        Ok(noop(current.status))
    }

    /// Cancel an order on behalf of its owner.
    pub async fn cancel_order(
        &self,
        order_id: Uuid,
        requesting_user_id: &str,
    ) -> Result<TransitionOutcome, StorefrontError> {
        let order = self.orders.get_by_id(order_id)?;
        if !order.is_owned_by(requesting_user_id) {
            return Err(StorefrontError::NotOwner(order_id));
        }
        if order.status.is_terminal() {
            return Ok(TransitionOutcome {
                order_id,
                status: order.status,
                applied: false,
            });
        }

        let applied = match order.status {
            OrderStatus::AwaitingPayment => {
                let attempt = self.orders.active_attempt(order_id)?.map(|a| {
                    AttemptTransition::new(a.id, AttemptStatus::Active, AttemptStatus::Failed)
                });
                self.orders.transition(
                    order_id,
                    OrderStatus::AwaitingPayment,
                    OrderStatus::Cancelled,
                    attempt.as_ref(),
                )?
            }
            status => self
                .orders
                .update_status(order_id, status, OrderStatus::Cancelled)?,
        };

        let status = if applied {
            tracing::info!(order_id = %order_id, from = %order.status, "order cancelled by owner");
            OrderStatus::Cancelled
        } else {
            self.orders.get_by_id(order_id)?.status
        };
        Ok(TransitionOutcome {
            order_id,
            status,
            applied,
        })
    }

    /// Expire ACTIVE attempts older than the payment window.
    ///
    /// Returns how many orders actually moved to EXPIRED. Orders that were
    /// settled in the meantime are left alone.
    pub fn expire_stale_payments(&self, now: i64) -> Result<usize, StorefrontError> {
        let window = i64::try_from(self.config.payment_expiry.as_secs()).unwrap_or(i64::MAX);
        let cutoff = now.saturating_sub(window);

        let mut expired = 0;
        for attempt in self.orders.stale_active_attempts(cutoff)? {
            let move_attempt =
                AttemptTransition::new(attempt.id, AttemptStatus::Active, AttemptStatus::Expired);
            match self.orders.transition(
                attempt.order_id,
                OrderStatus::AwaitingPayment,
                OrderStatus::Expired,
                Some(&move_attempt),
            ) {
                Ok(true) => {
                    expired += 1;
                    tracing::info!(
                        order_id = %attempt.order_id,
                        attempt_id = %attempt.id,
                        "payment expired"
                    );
                }
                Ok(false) => {
                    tracing::debug!(order_id = %attempt.order_id, "settled before expiry");
                }
                Err(e) => {
                    tracing::warn!(order_id = %attempt.order_id, error = %e, "failed to expire payment");
                }
            }
        }
        Ok(expired)
    }

    pub fn order(&self, order_id: Uuid) -> Result<Order, StorefrontError> {
        self.orders.get_by_id(order_id)
    }

    /// The order if it belongs to `user_id`. Other users' orders look absent.
    pub fn order_for_user(&self, order_id: Uuid, user_id: &str) -> Result<Order, StorefrontError> {
        let order = self.orders.get_by_id(order_id)?;
        if !order.is_owned_by(user_id) {
            return Err(StorefrontError::OrderNotFound(order_id));
        }
        Ok(order)
    }

    pub fn orders_for_user(&self, user_id: &str) -> Result<Vec<Order>, StorefrontError> {
        self.orders.list_by_user(user_id)
    }

    pub fn payment_status(
        &self,
        attempt_id: Uuid,
        user_id: &str,
    ) -> Result<PaymentStatusView, StorefrontError> {
        let attempt = self
            .orders
            .get_attempt(attempt_id)?
            .ok_or(StorefrontError::AttemptNotFound(attempt_id))?;
        let order = self
            .order_for_user(attempt.order_id, user_id)
            .map_err(|_| StorefrontError::AttemptNotFound(attempt_id))?;
        Ok(PaymentStatusView {
            attempt,
            order_status: order.status,
        })
    }
}

impl<G: PaymentGateway + 'static> Coordinator<G> {
    /// Spawn the background task that expires stale payments every `interval`.
    ///
    /// `on_expired` is called with the count of every sweep that expired
    /// at least one payment.
    pub fn start_expiry_sweep<F>(
        self: Arc<Self>,
        interval: Duration,
        on_expired: F,
    ) -> tokio::task::JoinHandle<()>
    where
        F: Fn(usize) + Send + 'static,
    {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match self.expire_stale_payments(unix_now()) {
                    Ok(0) => {}
                    Ok(expired) => {
                        tracing::info!(expired, "expired stale payments");
                        on_expired(expired);
                    }
                    Err(e) => tracing::error!(error = %e, "expiry sweep failed"),
                }
            }
        })
    }
}
