use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::Utc;
use uuid::Uuid;

use stockflow_core::{AggregateId, TenantId};
use stockflow_inventory::{AllocationPlanner, InventoryLedger, VariantId, WarehouseId};

fn warehouse(n: u128) -> WarehouseId {
    WarehouseId::new(AggregateId::from_uuid(Uuid::from_u128(n + 1)))
}

/// Ledger with one variant spread over `warehouses` positions of uneven
/// depth, so the planner has real sorting/tie-breaking work to do.
fn seeded_ledger(variant: VariantId, warehouses: u128) -> InventoryLedger {
    let mut ledger = InventoryLedger::new(TenantId::new());
    for n in 0..warehouses {
        let qty = 10 + ((n * 37) % 90) as i64;
        ledger
            .increase(variant, warehouse(n), qty, None, None, Utc::now())
            .unwrap();
    }
    ledger
}

fn bench_reserve(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocation_reserve");

    for warehouses in [4u128, 16, 64] {
        let variant = VariantId::new(AggregateId::new());
        let ledger = seeded_ledger(variant, warehouses);
        // Demand spanning several warehouses.
        let requested = (warehouses as i64) * 8;

        group.throughput(Throughput::Elements(warehouses as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(warehouses),
            &warehouses,
            |b, _| {
                b.iter(|| {
                    let mut working = ledger.clone();
                    let allocations = AllocationPlanner::reserve(
                        &mut working,
                        variant,
                        black_box(requested),
                        Utc::now(),
                    )
                    .unwrap();
                    black_box(allocations)
                })
            },
        );
    }

    group.finish();
}

fn bench_fulfill_cycle(c: &mut Criterion) {
    let variant = VariantId::new(AggregateId::new());
    let ledger = seeded_ledger(variant, 8);

    c.bench_function("allocation_reserve_fulfill_cycle", |b| {
        b.iter(|| {
            let mut working = ledger.clone();
            let mut allocations =
                AllocationPlanner::reserve(&mut working, variant, black_box(40), Utc::now())
                    .unwrap();
            for allocation in &mut allocations {
                let qty = allocation.quantity();
                AllocationPlanner::fulfill(&mut working, allocation, qty).unwrap();
                working
                    .decrease(
                        allocation.variant_id(),
                        allocation.warehouse_id(),
                        qty,
                        None,
                        None,
                        Utc::now(),
                    )
                    .unwrap();
            }
            black_box(working)
        })
    });
}

criterion_group!(benches, bench_reserve, bench_fulfill_cycle);
criterion_main!(benches);
