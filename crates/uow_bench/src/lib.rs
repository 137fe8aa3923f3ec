//! Benchmark utilities.

use rand::Rng;
use uow_core::SharedEntity;
use uow_testkit::domain;

/// Builds an unsaved order with `lines` lines of random quantity.
pub fn random_order(lines: usize) -> SharedEntity {
    let mut rng = rand::thread_rng();
    let order = domain::order(&format!("R-{}", rng.gen::<u32>()));
    for _ in 0..lines {
        domain::add_line(&order, rng.gen_range(1..100), None);
    }
    order
}

/// Builds `count` unsaved products with random prices.
pub fn random_products(count: usize) -> Vec<SharedEntity> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|i| domain::product(&format!("p{i}"), rng.gen_range(1..10_000)))
        .collect()
}
