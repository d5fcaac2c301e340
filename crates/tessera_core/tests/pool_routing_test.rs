//! Integration tests for pool routing and budgets.

use std::sync::Arc;
use std::thread;

use tessera_core::{
    tags, MemoryCategory, MemoryConfig, MemoryRegistry, PoolId, PoolKey,
};

#[test]
fn test_blocks_route_to_their_size_class() {
    let registry = MemoryRegistry::new(MemoryConfig::default());
    for size in [0usize, 1, 4, 5, 16, 17, 100, 176, 177, 10_000] {
        let block = registry.allocate(MemoryCategory::Geometry, size).unwrap();
        assert_eq!(block.len(), size);
        assert!(block.capacity() >= size);
        assert_eq!(block.origin().pool, PoolKey::Sized(PoolId::for_size(size)));
        assert_eq!(block.origin().registry, registry.id());
        registry.deallocate(MemoryCategory::Geometry, block);
    }
    // Overflow requests share one pool.
    let stats = registry.stats();
    let overflow: Vec<_> = stats
        .pools
        .iter()
        .filter(|(key, _)| *key == PoolKey::Sized(PoolId::OVERFLOW))
        .collect();
    assert_eq!(overflow.len(), 1);
    assert_eq!(overflow[0].1.allocations, 2);
}

#[test]
fn test_category_accounting() {
    let registry = MemoryRegistry::new(MemoryConfig::default());
    let geometry = registry.allocate_in::<tags::Geometry>(64).unwrap();
    let animation = registry.allocate_in::<tags::Animation>(32).unwrap();

    let stats = registry.stats();
    assert_eq!(stats.live_bytes_in(MemoryCategory::Geometry), 64);
    assert_eq!(stats.live_bytes_in(MemoryCategory::Animation), 32);
    assert_eq!(stats.live_blocks_in(MemoryCategory::General), 0);

    registry.deallocate_in::<tags::Geometry>(geometry);
    registry.deallocate_in::<tags::Animation>(animation);
    assert_eq!(registry.stats().total_live_blocks(), 0);
}

#[test]
fn test_block_contents_survive_until_free() {
    let registry = MemoryRegistry::new(MemoryConfig::default());
    let mut blocks: Vec<_> = (0..64u8)
        .map(|i| {
            let mut block = registry
                .allocate(MemoryCategory::SceneObjects, usize::from(i) * 5)
                .unwrap();
            block.fill(i);
            block
        })
        .collect();

    for (i, block) in blocks.iter().enumerate() {
        assert!(block.iter().all(|&b| usize::from(b) == i));
    }
    for block in blocks.drain(..) {
        registry.deallocate(MemoryCategory::SceneObjects, block);
    }
}

#[test]
fn test_budget_covers_aligned_pools() {
    let registry = MemoryRegistry::new(MemoryConfig::default().with_budget(4096));
    let big = registry
        .allocate_aligned(MemoryCategory::RenderSystem, 64, 3000)
        .unwrap();
    assert!(registry
        .allocate_aligned(MemoryCategory::RenderSystem, 64, 3000)
        .is_none());
    assert!(registry.stats().reserved_bytes <= 4096);
    registry.deallocate_aligned(MemoryCategory::RenderSystem, big);

    let again = registry
        .allocate_aligned(MemoryCategory::RenderSystem, 64, 2500)
        .unwrap();
    assert_eq!(again.as_ptr() as usize % 64, 0);
    registry.deallocate_aligned(MemoryCategory::RenderSystem, again);
}

#[test]
fn test_concurrent_allocate_free() {
    let registry = Arc::new(MemoryRegistry::new(MemoryConfig::default()));
    let handles: Vec<_> = (0..8usize)
        .map(|t| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                let category = MemoryCategory::ALL[t % MemoryCategory::COUNT];
                for i in 0..2_000usize {
                    let block = registry.allocate(category, (i + t) % 400).unwrap();
                    registry.deallocate(category, block);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let stats = registry.stats();
    assert_eq!(stats.total_live_blocks(), 0);
    let allocations: u64 = stats.pools.iter().map(|(_, p)| p.allocations).sum();
    assert_eq!(allocations, 16_000);
    assert!(stats.pools.iter().all(|(_, p)| p.live == 0));
}
