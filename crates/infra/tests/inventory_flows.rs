//! End-to-end inventory flows against the in-memory store, through the public
//! engine API only.

use std::sync::Arc;

use proptest::prelude::*;
use stockledger_core::{
    Decimal, InventoryError, ProductId, ReservationId, SupplierId, TransferId, UserId, WarehouseId,
};
use stockledger_infra::engine::{RegisterAdjustment, RegisterOutflow};
use stockledger_infra::{CoreSettings, InMemoryInventoryStore, InventoryCore, SweepOptions};
use stockledger_inventory::{
    CancelTransfer, ConfirmTransfer, CreateTransfer, MovementKind, ReservationState, ReserveStock,
    StockKey, StockLine,
};
use stockledger_parties::RegisterSupplier;
use stockledger_products::Product;
use stockledger_purchasing::{PurchaseLineInput, RegisterPurchase};

type Core = InventoryCore<InMemoryInventoryStore>;

fn d(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn core() -> Core {
    InventoryCore::new(Arc::new(InMemoryInventoryStore::new()), CoreSettings::default())
}

async fn product(core: &Core) -> ProductId {
    let id = ProductId::new();
    let product = Product::active(id, format!("SKU-{id}"), "Green beans 60kg").unwrap();
    core.sync_product(&product).await.unwrap();
    id
}

async fn supplier(core: &Core) -> SupplierId {
    core.register_supplier(RegisterSupplier {
        supplier_id: None,
        name: "Finca La Esperanza".to_string(),
        tax_id: "900123456-1".to_string(),
        contact: None,
        actor: UserId::new(),
    })
    .await
    .unwrap()
    .supplier()
    .id
}

async fn buy(core: &Core, supplier_id: SupplierId, product_id: ProductId, qty: &str, cost: &str) {
    core.register_purchase(RegisterPurchase {
        supplier_id,
        reference: None,
        lines: vec![PurchaseLineInput {
            product_id,
            quantity: d(qty),
            unit_cost: d(cost),
        }],
        actor: UserId::new(),
    })
    .await
    .unwrap();
}

fn default_key(core: &Core, product_id: ProductId) -> StockKey {
    StockKey::new(product_id, core.settings().default_warehouse_id)
}

fn reserve(key: StockKey, qty: &str) -> ReserveStock {
    ReserveStock {
        product_id: key.product_id,
        warehouse_id: key.warehouse_id,
        location_id: key.location_id,
        quantity: d(qty),
        linked_transaction_id: None,
        linked_detail_id: None,
        expires_at: None,
        reason: None,
        actor: UserId::new(),
    }
}

fn transfer(product_id: ProductId, from: WarehouseId, to: WarehouseId, qty: &str) -> CreateTransfer {
    CreateTransfer {
        product_id,
        origin_warehouse_id: from,
        destination_warehouse_id: to,
        quantity: d(qty),
        reference: None,
        actor: UserId::new(),
    }
}

async fn available_committed(core: &Core, key: StockKey) -> (Decimal, Decimal) {
    let lines = core.stock_by_product(key.product_id).await.unwrap();
    lines
        .into_iter()
        .find(|l| l.key == key)
        .map(|l| (l.available, l.committed))
        .unwrap_or((Decimal::ZERO, Decimal::ZERO))
}

#[tokio::test]
async fn weighted_average_of_two_purchases() {
    let core = core();
    let supplier_id = supplier(&core).await;
    let product_id = product(&core).await;

    buy(&core, supplier_id, product_id, "10", "5").await;
    buy(&core, supplier_id, product_id, "10", "7").await;

    let snapshot = core.get_stock(product_id).await.unwrap();
    assert_eq!(snapshot.line.available, d("20"));
    assert_eq!(snapshot.line.average_cost, d("6"));
    assert!(snapshot.recent_movements.iter().all(|m| m.kind == MovementKind::Inbound));
}

#[tokio::test]
async fn reserve_then_confirm_appends_one_outflow() {
    let core = core();
    let supplier_id = supplier(&core).await;
    let product_id = product(&core).await;
    let key = default_key(&core, product_id);
    buy(&core, supplier_id, product_id, "20", "3").await;

    let reservation = core.reserve_stock(reserve(key, "5")).await.unwrap();
    assert_eq!(available_committed(&core, key).await, (d("15"), d("5")));

    core.confirm_reservation(reservation.id, UserId::new()).await.unwrap();
    assert_eq!(available_committed(&core, key).await, (d("15"), d("0")));

    let movements = core.list_recent_movements(product_id, 10).await.unwrap();
    let outflows: Vec<_> = movements.iter().filter(|m| m.kind == MovementKind::Outbound).collect();
    assert_eq!(outflows.len(), 1);
    assert_eq!(outflows[0].quantity, d("5"));
    assert!(core.verify_stock_line(key).await.unwrap().consistent);
}

#[tokio::test]
async fn reserve_release_is_exactly_conserved() {
    let core = core();
    let supplier_id = supplier(&core).await;
    let product_id = product(&core).await;
    let key = default_key(&core, product_id);
    buy(&core, supplier_id, product_id, "7.125", "1").await;
    let before = available_committed(&core, key).await;

    let reservation = core.reserve_stock(reserve(key, "2.5")).await.unwrap();
    core.release_reservation(reservation.id, UserId::new(), "not needed")
        .await
        .unwrap();
    assert_eq!(available_committed(&core, key).await, before);

    // No ledger entry for pure reservation moves.
    assert_eq!(core.list_recent_movements(product_id, 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn terminal_states_reject_repeated_transitions() {
    let core = core();
    let supplier_id = supplier(&core).await;
    let product_id = product(&core).await;
    let key = default_key(&core, product_id);
    buy(&core, supplier_id, product_id, "10", "1").await;

    let reservation = core.reserve_stock(reserve(key, "4")).await.unwrap();
    core.expire_reservation(reservation.id, UserId::SYSTEM).await.unwrap();
    let after_first = available_committed(&core, key).await;
    let movements = core.list_recent_movements(product_id, 50).await.unwrap().len();

    let second: Vec<InventoryError> = vec![
        core.confirm_reservation(reservation.id, UserId::new()).await.unwrap_err(),
        core.release_reservation(reservation.id, UserId::new(), "x").await.unwrap_err(),
        core.cancel_reservation(reservation.id, UserId::new(), "x").await.unwrap_err(),
        core.expire_reservation(reservation.id, UserId::SYSTEM).await.unwrap_err(),
    ];
    for err in second {
        assert_eq!(err.code(), "RESERVATION_NOT_ACTIVE");
    }

    let elsewhere = WarehouseId::new();
    let t = core
        .create_transfer(transfer(product_id, key.warehouse_id, elsewhere, "2"))
        .await
        .unwrap();
    core.confirm_transfer(t.id, ConfirmTransfer { actor: UserId::new(), notes: None })
        .await
        .unwrap();
    let after_transfer = available_committed(&core, key).await;
    let movements_after_transfer = core.list_recent_movements(product_id, 50).await.unwrap().len();
    assert_eq!(movements_after_transfer, movements + 2);

    for err in [
        core.confirm_transfer(t.id, ConfirmTransfer { actor: UserId::new(), notes: None })
            .await
            .unwrap_err(),
        core.cancel_transfer(t.id, CancelTransfer { actor: UserId::new(), reason: None })
            .await
            .unwrap_err(),
    ] {
        assert_eq!(err.code(), "TRANSFER_NOT_PENDING");
    }

    assert_eq!(after_first, (d("10"), d("0")));
    assert_eq!(available_committed(&core, key).await, after_transfer);
    assert_eq!(
        core.list_recent_movements(product_id, 50).await.unwrap().len(),
        movements_after_transfer
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reservations_never_oversell() {
    let core = Arc::new(core());
    let supplier_id = supplier(&core).await;
    let product_id = product(&core).await;
    buy(&core, supplier_id, product_id, "10", "3").await;
    let key = default_key(&core, product_id);

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..30 {
        let core = core.clone();
        tasks.spawn(async move { core.reserve_stock(reserve(key, "1")).await });
    }
    let (mut granted, mut refused) = (0, 0);
    while let Some(joined) = tasks.join_next().await {
        match joined.unwrap() {
            Ok(_) => granted += 1,
            Err(err) => {
                assert_eq!(err.code(), "INSUFFICIENT_STOCK");
                refused += 1;
            }
        }
    }

    assert_eq!((granted, refused), (10, 20));
    assert_eq!(available_committed(&core, key).await, (d("0"), d("10")));
}

#[tokio::test]
async fn sweep_leaves_confirmed_reservations_alone() {
    let core = core();
    let supplier_id = supplier(&core).await;
    let product_id = product(&core).await;
    buy(&core, supplier_id, product_id, "8", "2").await;
    let key = default_key(&core, product_id);

    let mut cmd = reserve(key, "5");
    cmd.expires_at = Some(chrono::Utc::now() + chrono::Duration::minutes(1));
    let reservation = core.reserve_stock(cmd).await.unwrap();
    core.confirm_reservation(reservation.id, UserId::new()).await.unwrap();

    let later = chrono::Utc::now() + chrono::Duration::hours(2);
    let report = core
        .sweep_expired_reservations_at(SweepOptions::default(), later)
        .await
        .unwrap();
    assert_eq!((report.released_count, report.failed), (0, 0));
    assert_eq!(
        core.get_reservation(reservation.id).await.unwrap().state,
        ReservationState::Confirmed
    );
    assert_eq!(available_committed(&core, key).await, (d("3"), d("0")));
}

#[tokio::test]
async fn transfer_conserves_system_wide_quantity() {
    let core = core();
    let supplier_id = supplier(&core).await;
    let product_id = product(&core).await;
    let origin = default_key(&core, product_id);
    let destination = StockKey::new(product_id, WarehouseId::new());
    buy(&core, supplier_id, product_id, "12", "4").await;

    let total = |lines: Vec<StockLine>| -> Decimal {
        lines.iter().map(|l| l.available).sum()
    };

    let t = core
        .create_transfer(transfer(product_id, origin.warehouse_id, destination.warehouse_id, "5"))
        .await
        .unwrap();
    core.confirm_transfer(t.id, ConfirmTransfer { actor: UserId::new(), notes: None })
        .await
        .unwrap();
    assert_eq!(available_committed(&core, origin).await.0, d("7"));
    assert_eq!(available_committed(&core, destination).await.0, d("5"));
    assert_eq!(total(core.stock_by_product(product_id).await.unwrap()), d("12"));

    let t = core
        .create_transfer(transfer(product_id, origin.warehouse_id, destination.warehouse_id, "3"))
        .await
        .unwrap();
    core.cancel_transfer(t.id, CancelTransfer { actor: UserId::new(), reason: Some("recount".into()) })
        .await
        .unwrap();
    assert_eq!(available_committed(&core, origin).await.0, d("7"));
    assert_eq!(available_committed(&core, destination).await.0, d("5"));

    for key in [origin, destination] {
        assert!(core.verify_stock_line(key).await.unwrap().consistent);
    }
}

#[tokio::test]
async fn duplicate_product_purchase_has_no_side_effects() {
    let core = core();
    let supplier_id = supplier(&core).await;
    let product_id = product(&core).await;

    let line = PurchaseLineInput {
        product_id,
        quantity: d("1"),
        unit_cost: d("1"),
    };
    let err = core
        .register_purchase(RegisterPurchase {
            supplier_id,
            reference: None,
            lines: vec![line.clone(), line],
            actor: UserId::new(),
        })
        .await
        .unwrap_err();
    assert_eq!(err, InventoryError::DuplicateProductInPurchase(product_id));
    assert!(core.store().purchases().await.is_empty());
    assert_eq!(core.store().movement_count().await, 0);
}

#[tokio::test]
async fn get_stock_of_new_product_serializes_zero_strings() {
    let core = core();
    let product_id = product(&core).await;

    let snapshot = core.get_stock(product_id).await.unwrap();
    let json = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(json["line"]["available"], "0");
    assert_eq!(json["line"]["committed"], "0");
    assert_eq!(json["line"]["average_cost"], "0");
    assert_eq!(json["recent_movements"], serde_json::json!([]));
}

#[derive(Debug, Clone)]
enum Op {
    Purchase(u32),
    Outflow(u32),
    AdjustDown(u32),
    Reserve(u32),
    ConfirmReservation,
    ReleaseReservation,
    Dispatch(u32),
    ConfirmTransfer,
    CancelTransfer,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1u32..20).prop_map(Op::Purchase),
        (1u32..20).prop_map(Op::Outflow),
        (1u32..20).prop_map(Op::AdjustDown),
        (1u32..20).prop_map(Op::Reserve),
        Just(Op::ConfirmReservation),
        Just(Op::ReleaseReservation),
        (1u32..20).prop_map(Op::Dispatch),
        Just(Op::ConfirmTransfer),
        Just(Op::CancelTransfer),
    ]
}

async fn run_ops(ops: Vec<Op>) {
    let core = core();
    let supplier_id = supplier(&core).await;
    let product_id = product(&core).await;
    let origin = default_key(&core, product_id);
    let destination = StockKey::new(product_id, WarehouseId::new());
    let actor = UserId::new();

    let mut reservations: Vec<ReservationId> = Vec::new();
    let mut transfers: Vec<TransferId> = Vec::new();

    for op in ops {
        // Failures are expected (insufficient stock, terminal states); only
        // the invariants below matter.
        let _ = match op {
            Op::Purchase(q) => core
                .register_purchase(RegisterPurchase {
                    supplier_id,
                    reference: None,
                    lines: vec![PurchaseLineInput {
                        product_id,
                        quantity: Decimal::from(q),
                        unit_cost: Decimal::from(q % 7 + 1),
                    }],
                    actor,
                })
                .await
                .map(|_| ()),
            Op::Outflow(q) => core
                .register_outflow(RegisterOutflow {
                    product_id,
                    quantity: Decimal::from(q),
                    reference: None,
                    actor,
                })
                .await
                .map(|_| ()),
            Op::AdjustDown(q) => core
                .register_adjustment(RegisterAdjustment {
                    product_id,
                    quantity: Decimal::from(q),
                    reason: "cycle count".to_string(),
                    increment: false,
                    actor,
                })
                .await
                .map(|_| ()),
            Op::Reserve(q) => core
                .reserve_stock(reserve(origin, &q.to_string()))
                .await
                .map(|r| reservations.push(r.id)),
            Op::ConfirmReservation => match reservations.first() {
                Some(id) => core.confirm_reservation(*id, actor).await.map(|_| ()),
                None => Ok(()),
            },
            Op::ReleaseReservation => match reservations.last() {
                Some(id) => core.release_reservation(*id, actor, "prop").await.map(|_| ()),
                None => Ok(()),
            },
            Op::Dispatch(q) => core
                .create_transfer(transfer(
                    product_id,
                    origin.warehouse_id,
                    destination.warehouse_id,
                    &q.to_string(),
                ))
                .await
                .map(|t| transfers.push(t.id)),
            Op::ConfirmTransfer => match transfers.first() {
                Some(id) => core
                    .confirm_transfer(*id, ConfirmTransfer { actor, notes: None })
                    .await
                    .map(|_| ()),
                None => Ok(()),
            },
            Op::CancelTransfer => match transfers.last() {
                Some(id) => core
                    .cancel_transfer(*id, CancelTransfer { actor, reason: None })
                    .await
                    .map(|_| ()),
                None => Ok(()),
            },
        };

        for key in [origin, destination] {
            let (available, committed) = available_committed(&core, key).await;
            assert!(available >= Decimal::ZERO, "available went negative on {key}");
            assert!(committed >= Decimal::ZERO, "committed went negative on {key}");
        }
    }

    for key in [origin, destination] {
        let report = core.verify_stock_line(key).await.unwrap();
        assert!(report.consistent, "ledger disagrees with aggregate: {report:?}");
    }
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 256, .. ProptestConfig::default() })]

    #[test]
    fn stock_never_goes_negative_and_ledger_stays_complete(ops in prop::collection::vec(op(), 1..25)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(run_ops(ops));
    }
}
