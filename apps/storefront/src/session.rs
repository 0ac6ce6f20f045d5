//! # Checkout Session
//!
//! One shopper's cart, coupon field and delivery city.
//!
//! ## Thread Safety
//! The cart and the validator each sit behind a `std::sync::Mutex`. Locks
//! are only held for the synchronous part of an operation and are always
//! released before any `.await` (storage writes, API calls).
//!
//! Every cart change takes a generation number under the cart lock. Writes
//! go through an async lock that remembers the last generation saved, so a
//! slow write of an older cart never lands over a newer one.
//!
//! ## Operation Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  add_item / set_quantity / select_city / ...                            │
//! │     lock cart ─► CartStore command ─► to_persisted() + gen ─► unlock    │
//! │     storage().save_cart(persisted) unless a newer gen was saved         │
//! │                                                                         │
//! │  submit_coupon(code)                                                    │
//! │     lock validator ─► submit() ─► ticket{sequence} ─► unlock            │
//! │     api.lookup_coupon(ticket.request).await                             │
//! │     lock validator ─► receive(sequence, result) ─► unlock               │
//! │        Discarded: a newer edit superseded this lookup                   │
//! │        Applied:   coupon attached to the cart, cart saved               │
//! │                                                                         │
//! │  checkout(address_id)                                                   │
//! │     build_submission ─► api.submit_order ─► reconcile ─► drop ordered   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};
use uuid::Uuid;

use basket_core::persist::PersistedCart;
use basket_core::shipping::ShippingRateResolver;
use basket_core::wire::OrderCreated;
use basket_core::{
    CartLineItem, CartNotice, CartState, CartStore, CoreResult, OrderPricingSnapshot,
    PromotionOutcome, PromotionState, PromotionValidator, RegionalTax,
};
use basket_db::{Database, DbError};

use crate::api::StorefrontApi;
use crate::checkout;
use crate::error::AppResult;

/// A shopper's checkout session.
pub struct CheckoutSession {
    user_id: String,
    cart: Mutex<CartStore>,
    /// Bumped under the cart lock on every change.
    generation: AtomicU64,
    /// Generation of the last cart written to storage.
    saved_generation: tokio::sync::Mutex<u64>,
    promotion: Mutex<PromotionValidator>,
    db: Database,
    api: Arc<dyn StorefrontApi>,
}

impl std::fmt::Debug for CheckoutSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutSession")
            .field("user_id", &self.user_id)
            .field("cart", &self.cart)
            .finish_non_exhaustive()
    }
}

impl CheckoutSession {
    /// Opens a session, restoring the saved cart if there is one.
    ///
    /// Cities come from the local cache; call [`refresh_cities`] to pull the
    /// current list. An unreadable saved cart is discarded with a warning.
    ///
    /// ## Returns
    /// The session and the notices produced while re-validating saved lines
    /// (clamped quantities, dropped items).
    ///
    /// [`refresh_cities`]: CheckoutSession::refresh_cities
    pub async fn open(
        user_id: impl Into<String>,
        db: Database,
        api: Arc<dyn StorefrontApi>,
        tax: RegionalTax,
    ) -> AppResult<(Self, Vec<CartNotice>)> {
        let user_id = user_id.into();
        let resolver = db.cities().resolver().await?;

        let saved = match db.storage().load_cart().await {
            Ok(saved) => saved,
            Err(DbError::Serialization(reason)) => {
                warn!(reason = %reason, "Discarding unreadable saved cart");
                None
            }
            Err(e) => return Err(e.into()),
        };

        let (store, notices) = match saved {
            Some(persisted) => CartStore::restore(persisted, resolver, tax),
            None => (CartStore::new(resolver, tax), Vec::new()),
        };

        info!(
            user_id = %user_id,
            items = store.items().len(),
            restored_notices = notices.len(),
            "Checkout session opened"
        );

        let session = CheckoutSession {
            user_id,
            cart: Mutex::new(store),
            generation: AtomicU64::new(0),
            saved_generation: tokio::sync::Mutex::new(0),
            promotion: Mutex::new(PromotionValidator::new()),
            db,
            api,
        };
        if !notices.is_empty() {
            let (generation, persisted) = {
                let cart = session.cart();
                (session.next_generation(), cart.to_persisted())
            };
            session.persist(generation, &persisted).await;
        }

        Ok((session, notices))
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    fn cart(&self) -> MutexGuard<'_, CartStore> {
        self.cart.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn promotion(&self) -> MutexGuard<'_, PromotionValidator> {
        self.promotion.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Executes a function with read access to the cart.
    pub fn with_cart<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&CartStore) -> R,
    {
        f(&self.cart())
    }

    /// Current price breakdown.
    pub fn snapshot(&self) -> OrderPricingSnapshot {
        self.with_cart(|cart| cart.snapshot().clone())
    }

    /// Current cart contents.
    pub fn cart_state(&self) -> CartState {
        self.with_cart(|cart| cart.state().clone())
    }

    /// Current state of the coupon field.
    pub fn promotion_state(&self) -> PromotionState {
        self.promotion().state().clone()
    }

    /// Must be called with the cart lock held.
    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Runs a cart command, then saves the cart.
    ///
    /// The lock is dropped before the write.
    async fn mutate<F>(&self, command: F) -> AppResult<Vec<CartNotice>>
    where
        F: FnOnce(&mut CartStore) -> CoreResult<Vec<CartNotice>>,
    {
        let (notices, generation, persisted) = {
            let mut cart = self.cart();
            let notices = command(&mut cart)?;
            (notices, self.next_generation(), cart.to_persisted())
        };

        self.persist(generation, &persisted).await;
        Ok(notices)
    }

    /// Saves the cart taken at `generation`, unless a newer one is already
    /// stored. A failed write leaves the in-memory cart as is.
    async fn persist(&self, generation: u64, persisted: &PersistedCart) {
        let mut saved = self.saved_generation.lock().await;
        if *saved > generation {
            debug!(generation, saved = *saved, "Skipping superseded cart write");
            return;
        }

        match self.db.storage().save_cart(persisted).await {
            Ok(()) => *saved = generation,
            Err(e) => warn!(error = %e, generation, "Could not save cart"),
        }
    }

    // -------------------------------------------------------------------------
    // Cart
    // -------------------------------------------------------------------------

    pub async fn add_item(&self, item: CartLineItem) -> AppResult<Vec<CartNotice>> {
        self.mutate(|cart| cart.add_item(item)).await
    }

    pub async fn increment_item(&self, variant_id: &str) -> AppResult<Vec<CartNotice>> {
        self.mutate(|cart| cart.increment_item(variant_id)).await
    }

    pub async fn decrement_item(&self, variant_id: &str) -> AppResult<Vec<CartNotice>> {
        self.mutate(|cart| cart.decrement_item(variant_id)).await
    }

    pub async fn set_quantity(&self, variant_id: &str, quantity: i64) -> AppResult<Vec<CartNotice>> {
        self.mutate(|cart| cart.set_quantity(variant_id, quantity)).await
    }

    pub async fn remove_item(&self, variant_id: &str) -> AppResult<Vec<CartNotice>> {
        self.mutate(|cart| cart.remove_item(variant_id)).await
    }

    /// Empties the cart and drops the coupon.
    pub async fn clear_cart(&self) -> AppResult<()> {
        self.promotion().reset();
        self.mutate(|cart| cart.clear_cart()).await?;
        Ok(())
    }

    /// Selects the delivery city. Unknown or unserviceable cities are
    /// recorded; they block checkout without failing this call.
    pub async fn select_city(&self, city_id: &str) -> AppResult<()> {
        self.mutate(|cart| cart.set_selected_city(city_id)).await?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Coupon
    // -------------------------------------------------------------------------

    /// Looks up `code` and attaches the coupon when the server accepts it.
    ///
    /// ## Returns
    /// - `Applied` / `Rejected`: the server's verdict
    /// - `Discarded`: the shopper edited the code while this lookup ran
    ///
    /// ## Errors
    /// Invalid codes, a lookup already in flight, and transport failures
    /// (retriable). The cart is untouched on every error path.
    pub async fn submit_coupon(&self, code: &str) -> AppResult<PromotionOutcome> {
        let subtotal = self.with_cart(|cart| cart.snapshot().subtotal);
        let ticket = self.promotion().submit(code, &self.user_id, subtotal)?;

        let result = self.api.lookup_coupon(&ticket.request).await;
        let outcome = self.promotion().receive(ticket.sequence, result);

        match outcome {
            PromotionOutcome::Applied(coupon) => {
                info!(code = %coupon.code, "Coupon applied");
                self.mutate(|cart| cart.apply_coupon(coupon.clone())).await?;
                Ok(PromotionOutcome::Applied(coupon))
            }
            PromotionOutcome::Failed(err) => Err(err.into()),
            other => {
                debug!(outcome = ?other, "Coupon lookup finished");
                Ok(other)
            }
        }
    }

    /// The shopper changed the code field; an in-flight lookup no longer
    /// counts.
    pub fn edit_coupon_code(&self) {
        self.promotion().edit_code();
    }

    /// Detaches the coupon.
    pub async fn remove_coupon(&self) -> AppResult<()> {
        self.promotion().reset();
        self.mutate(|cart| cart.remove_coupon()).await?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Cities
    // -------------------------------------------------------------------------

    /// Pulls the city list from the API, caches it locally and re-prices
    /// the cart against it.
    ///
    /// On failure the cached list stays in use.
    pub async fn refresh_cities(&self) -> AppResult<usize> {
        let response = self.api.list_cities().await?;
        let resolver = ShippingRateResolver::from_response(response)?;

        self.db.cities().replace_all(resolver.cities()).await?;

        let count = resolver.len();
        let (generation, persisted) = {
            let mut cart = self.cart();
            cart.replace_cities(resolver);
            (self.next_generation(), cart.to_persisted())
        };
        self.persist(generation, &persisted).await;

        info!(count, "City list refreshed");
        Ok(count)
    }

    // -------------------------------------------------------------------------
    // Checkout
    // -------------------------------------------------------------------------

    /// Places the order and removes the ordered lines from the cart.
    ///
    /// The server's totals are authoritative; a disagreement with the
    /// client quote is logged, not treated as a failure. Once the order is
    /// placed this always returns it: a failed local write is only logged.
    /// Lines added while the order was being submitted stay in the cart.
    pub async fn checkout(&self, address_id: &str) -> AppResult<OrderCreated> {
        let (submission, snapshot) = self.with_cart(|cart| {
            checkout::build_submission(cart, &self.user_id, address_id)
                .map(|submission| (submission, cart.snapshot().clone()))
        })?;

        let key = Uuid::new_v4().to_string();
        let created = self.api.submit_order(&submission, &key).await?;
        checkout::reconcile(&snapshot, &created.order);

        info!(order_id = ?created.order.id, "Order placed");

        self.promotion().reset();
        let (generation, persisted) = {
            let mut cart = self.cart();
            let ordered_coupon = snapshot.applied_coupon.as_ref().map(|a| a.coupon.id.as_str());
            if ordered_coupon.is_some() && cart.coupon().map(|c| c.id.as_str()) == ordered_coupon {
                if let Err(e) = cart.remove_coupon() {
                    warn!(error = %e, "Could not detach ordered coupon");
                }
            }
            for line in &submission.items {
                if cart.state().find(&line.variant_id).is_none() {
                    continue;
                }
                if let Err(e) = cart.remove_item(&line.variant_id) {
                    warn!(variant_id = %line.variant_id, error = %e, "Could not drop ordered line");
                }
            }
            (self.next_generation(), cart.to_persisted())
        };
        self.persist(generation, &persisted).await;

        Ok(created)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use basket_core::wire::{
        Amount, CityListResponse, CityPayload, CouponLookupRequest, CouponLookupResponse,
        CouponPayload, OrderReceipt, OrderSubmission, WireId,
    };
    use basket_core::{
        CityShippingConfig, CoreError, Coupon, DiscountKind, Money, Percent, RejectionReason,
        ShippingStatus, TaxPolicy,
    };
    use basket_db::DbConfig;
    use chrono::{Duration, Utc};
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Notify;

    use crate::error::ErrorCode;

    /// In-process stand-in for the storefront backend.
    #[derive(Default)]
    struct FakeApi {
        coupons: Vec<Coupon>,
        cities: Vec<CityShippingConfig>,
        offline: AtomicBool,
        /// Lookups for "SLOW" signal `entered` and wait for `release`.
        entered: Arc<Notify>,
        release: Arc<Notify>,
        /// When set, order submissions also wait on `entered`/`release`.
        hold_orders: AtomicBool,
        orders: Mutex<Vec<(OrderSubmission, String)>>,
    }

    #[async_trait]
    impl StorefrontApi for FakeApi {
        async fn lookup_coupon(
            &self,
            request: &CouponLookupRequest,
        ) -> CoreResult<CouponLookupResponse> {
            if self.offline.load(Ordering::SeqCst) {
                return Err(CoreError::network("connection refused"));
            }
            if request.code == "SLOW" {
                self.entered.notify_one();
                self.release.notified().await;
            }

            let subtotal: Money = request.subtotal.parse()?;
            let Some(coupon) = self.coupons.iter().find(|c| c.code == request.code) else {
                return Ok(CouponLookupResponse {
                    promo: None,
                    applicable: false,
                    reason: None,
                });
            };
            let applicable = coupon.meets_minimum(subtotal);
            Ok(CouponLookupResponse {
                promo: Some(CouponPayload::from_coupon(coupon)),
                applicable,
                reason: (!applicable).then(|| "below-minimum".to_string()),
            })
        }

        async fn list_cities(&self) -> CoreResult<CityListResponse> {
            if self.offline.load(Ordering::SeqCst) {
                return Err(CoreError::network("connection refused"));
            }
            Ok(CityListResponse {
                data: self.cities.iter().map(CityPayload::from_config).collect(),
            })
        }

        async fn submit_order(
            &self,
            order: &OrderSubmission,
            idempotency_key: &str,
        ) -> CoreResult<OrderCreated> {
            if self.hold_orders.load(Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            self.orders
                .lock()
                .unwrap()
                .push((order.clone(), idempotency_key.to_string()));
            Ok(OrderCreated {
                order: OrderReceipt {
                    id: WireId::from("order-1"),
                    total: Some(Amount::Text("1.00".to_string())),
                    ..Default::default()
                },
            })
        }
    }

    fn coupon(code: &str, off_cents: i64, min_cents: i64) -> Coupon {
        let now = Utc::now();
        Coupon {
            id: format!("id-{}", code),
            code: code.to_string(),
            discount: DiscountKind::Fixed {
                amount: Money::from_cents(off_cents),
            },
            min_order_value: Money::from_cents(min_cents),
            max_discount: None,
            start_date: now - Duration::days(1),
            end_date: now + Duration::days(30),
            usage_limit: None,
            per_user_limit: None,
            usage_count: 0,
            is_first_order: false,
            is_active: true,
        }
    }

    fn city(id: &str, serviceable: bool) -> CityShippingConfig {
        CityShippingConfig {
            city_id: id.to_string(),
            name: id.to_uppercase(),
            shipping_fee: Money::from_cents(1500),
            has_shipping: serviceable,
            free_shipping_threshold: Some(Money::from_cents(20000)),
            always_charge_shipping: false,
        }
    }

    fn api() -> FakeApi {
        FakeApi {
            coupons: vec![
                coupon("TENOFF", 1000, 0),
                coupon("SLOW", 500, 0),
                coupon("BIGSPEND", 1000, 100_000),
            ],
            cities: vec![city("riyadh", true), city("tabuk", false)],
            ..Default::default()
        }
    }

    fn mug(quantity: i64) -> CartLineItem {
        CartLineItem::new("MUG", "Mug", Money::from_cents(2000), 10).with_quantity(quantity)
    }

    async fn open(db: &Database, api: Arc<FakeApi>) -> (CheckoutSession, Vec<CartNotice>) {
        CheckoutSession::open("u-1", db.clone(), api, RegionalTax::default())
            .await
            .unwrap()
    }

    async fn memory_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_cart_survives_reopen() {
        let db = memory_db().await;
        let api = Arc::new(api());

        let (session, _) = open(&db, api.clone()).await;
        session.refresh_cities().await.unwrap();
        session.add_item(mug(2)).await.unwrap();
        session.select_city("riyadh").await.unwrap();
        session.submit_coupon("tenoff").await.unwrap();
        let before = session.snapshot();
        drop(session);

        let (reopened, notices) = open(&db, api).await;
        assert!(notices.is_empty());
        assert_eq!(reopened.snapshot(), before);
        assert_eq!(before.subtotal.cents(), 4000);
        assert_eq!(before.discount_amount.cents(), 1000);
        assert_eq!(before.shipping_amount.cents(), 1500);
        assert_eq!(before.total.cents(), 4500);
    }

    #[tokio::test]
    async fn test_coupon_verdicts() {
        let db = memory_db().await;
        let (session, _) = open(&db, Arc::new(api())).await;
        session.add_item(mug(1)).await.unwrap();

        let outcome = session.submit_coupon("NOPE").await.unwrap();
        assert_eq!(outcome, PromotionOutcome::Rejected(RejectionReason::NotFound));
        assert!(session.cart_state().coupon.is_none());

        let outcome = session.submit_coupon("BIGSPEND").await.unwrap();
        assert_eq!(outcome, PromotionOutcome::Rejected(RejectionReason::BelowMinimum));
        assert!(session.cart_state().coupon.is_none());

        let outcome = session.submit_coupon("TENOFF").await.unwrap();
        assert!(matches!(outcome, PromotionOutcome::Applied(_)));
        assert_eq!(session.snapshot().discount_amount.cents(), 1000);

        session.remove_coupon().await.unwrap();
        assert_eq!(session.snapshot().discount_amount.cents(), 0);
        assert_eq!(session.promotion_state(), PromotionState::Idle);
    }

    #[tokio::test]
    async fn test_network_failure_is_retriable_and_harmless() {
        let db = memory_db().await;
        let api = Arc::new(api());
        let (session, _) = open(&db, api.clone()).await;
        session.add_item(mug(1)).await.unwrap();
        let before = session.snapshot();

        api.offline.store(true, Ordering::SeqCst);
        let err = session.submit_coupon("TENOFF").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NetworkError);
        assert!(err.retriable);
        assert_eq!(session.snapshot(), before);
        assert_eq!(session.promotion_state(), PromotionState::Idle);

        api.offline.store(false, Ordering::SeqCst);
        let outcome = session.submit_coupon("TENOFF").await.unwrap();
        assert!(matches!(outcome, PromotionOutcome::Applied(_)));
    }

    #[tokio::test]
    async fn test_stale_lookup_is_discarded() {
        let db = memory_db().await;
        let api = Arc::new(api());
        let (session, _) = open(&db, api.clone()).await;
        let session = Arc::new(session);
        session.add_item(mug(1)).await.unwrap();

        let slow = {
            let session = session.clone();
            tokio::spawn(async move { session.submit_coupon("SLOW").await })
        };
        api.entered.notified().await;

        // A second submit while validating is refused
        let err = session.submit_coupon("TENOFF").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::LookupInFlight);

        session.edit_coupon_code();
        let outcome = session.submit_coupon("TENOFF").await.unwrap();
        assert!(matches!(outcome, PromotionOutcome::Applied(_)));

        api.release.notify_one();
        let late = slow.await.unwrap().unwrap();
        assert_eq!(late, PromotionOutcome::Discarded);

        let coupon = session.cart_state().coupon.unwrap();
        assert_eq!(coupon.code, "TENOFF");
    }

    #[tokio::test]
    async fn test_checkout_requires_serviceable_city() {
        let db = memory_db().await;
        let api = Arc::new(api());
        let (session, _) = open(&db, api.clone()).await;
        session.refresh_cities().await.unwrap();
        session.add_item(mug(1)).await.unwrap();

        let err = session.checkout("addr-1").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::CheckoutBlocked);

        session.select_city("tabuk").await.unwrap();
        assert!(matches!(
            session.snapshot().shipping,
            ShippingStatus::Unavailable { .. }
        ));
        let err = session.checkout("addr-1").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::CheckoutBlocked);

        assert!(api.orders.lock().unwrap().is_empty());
        assert_eq!(session.cart_state().items.len(), 1);
    }

    #[tokio::test]
    async fn test_checkout_submits_and_clears() {
        let db = memory_db().await;
        let api = Arc::new(api());
        let tax = RegionalTax::uniform(TaxPolicy::Percentage {
            rate: Percent::from_whole(15),
        });
        let (session, _) = CheckoutSession::open("u-1", db.clone(), api.clone(), tax)
            .await
            .unwrap();
        session.refresh_cities().await.unwrap();
        session.add_item(mug(3)).await.unwrap();
        session.select_city("riyadh").await.unwrap();
        session.submit_coupon("TENOFF").await.unwrap();

        let created = session.checkout("addr-9").await.unwrap();
        assert_eq!(created.order.id, WireId::from("order-1"));

        {
            let orders = api.orders.lock().unwrap();
            assert_eq!(orders.len(), 1);
            let (submission, key) = &orders[0];
            assert_eq!(submission.address_id, "addr-9");
            assert_eq!(submission.promo_code_id.as_deref(), Some("id-TENOFF"));
            assert_eq!(submission.tax_percent, "15.00");
            assert_eq!(submission.items[0].quantity, 3);
            assert!(Uuid::parse_str(key).is_ok());
        }

        assert!(session.cart_state().items.is_empty());
        assert!(session.cart_state().coupon.is_none());
        let stored = db.storage().load_cart().await.unwrap().unwrap();
        assert!(stored.items.is_empty());
        assert!(stored.coupon.is_none());
        assert_eq!(stored.city_id.as_deref(), Some("riyadh"));
    }

    async fn ready_session(db: &Database, api: Arc<FakeApi>) -> CheckoutSession {
        let (session, _) = open(db, api).await;
        session.refresh_cities().await.unwrap();
        session.add_item(mug(2)).await.unwrap();
        session.select_city("riyadh").await.unwrap();
        session
    }

    #[tokio::test]
    async fn test_checkout_returns_order_when_storage_fails() {
        let db = memory_db().await;
        let api = Arc::new(api());
        let session = ready_session(&db, api.clone()).await;

        db.close().await;
        let created = session.checkout("addr-1").await.unwrap();

        assert_eq!(created.order.id, WireId::from("order-1"));
        assert_eq!(api.orders.lock().unwrap().len(), 1);
        assert!(session.cart_state().items.is_empty());
    }

    #[tokio::test]
    async fn test_checkout_keeps_lines_added_during_submit() {
        let db = memory_db().await;
        let api = Arc::new(api());
        let session = Arc::new(ready_session(&db, api.clone()).await);
        api.hold_orders.store(true, Ordering::SeqCst);

        let placing = {
            let session = session.clone();
            tokio::spawn(async move { session.checkout("addr-1").await })
        };
        api.entered.notified().await;

        let tea = CartLineItem::new("TEA", "Tea", Money::from_cents(700), 5);
        session.add_item(tea).await.unwrap();
        api.release.notify_one();
        placing.await.unwrap().unwrap();

        let state = session.cart_state();
        assert_eq!(state.items.len(), 1);
        assert_eq!(state.items[0].variant_id, "TEA");

        let submitted = &api.orders.lock().unwrap()[0].0;
        assert_eq!(submitted.items.len(), 1);
        assert_eq!(submitted.items[0].variant_id, "MUG");

        let stored = db.storage().load_cart().await.unwrap().unwrap();
        assert_eq!(stored.items.len(), 1);
        assert_eq!(stored.items[0].variant_id, "TEA");
    }

    #[tokio::test]
    async fn test_older_cart_write_never_lands_last() {
        let db = memory_db().await;
        let (session, _) = open(&db, Arc::new(api())).await;

        let newer = PersistedCart {
            items: vec![mug(2)],
            ..Default::default()
        };
        let older = PersistedCart {
            items: vec![mug(1)],
            ..Default::default()
        };
        session.persist(2, &newer).await;
        session.persist(1, &older).await;

        let stored = db.storage().load_cart().await.unwrap().unwrap();
        assert_eq!(stored.items[0].quantity, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_mutations_save_latest_cart() {
        let db = memory_db().await;
        let (session, _) = open(&db, Arc::new(api())).await;
        let session = Arc::new(session);

        let mut tasks = Vec::new();
        for i in 0..20 {
            let session = session.clone();
            tasks.push(tokio::spawn(async move {
                let item = CartLineItem::new(format!("V{}", i), "Item", Money::from_cents(100), 5);
                session.add_item(item).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let stored = db.storage().load_cart().await.unwrap().unwrap();
        assert_eq!(stored.items.len(), 20);
        assert_eq!(stored, session.with_cart(CartStore::to_persisted));
    }

    #[tokio::test]
    async fn test_cached_cities_used_when_offline() {
        let db = memory_db().await;
        let api = Arc::new(api());
        {
            let (session, _) = open(&db, api.clone()).await;
            assert_eq!(session.refresh_cities().await.unwrap(), 2);
        }

        api.offline.store(true, Ordering::SeqCst);
        let (session, _) = open(&db, api.clone()).await;
        let err = session.refresh_cities().await.unwrap_err();
        assert!(err.retriable);

        session.add_item(mug(1)).await.unwrap();
        session.select_city("riyadh").await.unwrap();
        assert!(session.snapshot().is_checkout_ready());
    }

    #[tokio::test]
    async fn test_withdrawn_city_not_quoted_offline() {
        let db = memory_db().await;
        {
            let (session, _) = open(&db, Arc::new(api())).await;
            session.refresh_cities().await.unwrap();
        }

        let shrunk = FakeApi {
            cities: vec![city("riyadh", true)],
            ..api()
        };
        {
            let (session, _) = open(&db, Arc::new(shrunk)).await;
            assert_eq!(session.refresh_cities().await.unwrap(), 1);
        }
        assert!(db.cities().get("tabuk").await.unwrap().is_none());

        let offline = api();
        offline.offline.store(true, Ordering::SeqCst);
        let (session, _) = open(&db, Arc::new(offline)).await;
        session.add_item(mug(1)).await.unwrap();
        session.select_city("tabuk").await.unwrap();
        assert!(!session.snapshot().is_checkout_ready());
        assert!(session.with_cart(|cart| cart.resolver().resolve("tabuk").is_err()));
    }

    #[tokio::test]
    async fn test_restore_clamps_saved_lines() {
        let db = memory_db().await;
        let saved = PersistedCart {
            items: vec![
                mug(50),
                CartLineItem::new("GONE", "Sold out", Money::from_cents(500), 0),
            ],
            ..Default::default()
        };
        db.storage().save_cart(&saved).await.unwrap();

        let (session, notices) = open(&db, Arc::new(api())).await;
        let state = session.cart_state();
        assert_eq!(state.items.len(), 1);
        assert_eq!(state.items[0].quantity, 10);
        assert!(notices.contains(&CartNotice::ItemRemoved {
            variant_id: "GONE".to_string()
        }));

        // The cleaned-up cart was written back
        let stored = db.storage().load_cart().await.unwrap().unwrap();
        assert_eq!(stored.items.len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_saved_cart_is_discarded() {
        let db = memory_db().await;
        db.storage()
            .put(basket_core::persist::STORAGE_KEY, "{broken")
            .await
            .unwrap();

        let (session, notices) = open(&db, Arc::new(api())).await;
        assert!(notices.is_empty());
        assert!(session.cart_state().items.is_empty());
    }
}
