//! Compaction, arena growth, and randomized structural-invariant checks.

use batch2d::renderer::v2;
use batch2d::{DrawMode, Material, MeshPrimitive, PrimitiveKey, PrimitiveStore, Renderer, Vertex2D};
use rand::{rngs::SmallRng, Rng, SeedableRng};

fn mesh(z: f32, material: Material, vertices: usize, seed: f32) -> MeshPrimitive {
    let verts = (0..vertices)
        .map(|i| v2([seed + i as f32, z], [0.0, 1.0], [seed, 0.0, 0.0, 1.0]))
        .collect();
    MeshPrimitive::new(DrawMode::TriangleList, material)
        .with_vertices(verts)
        .with_z(z)
}

fn assert_slots_match(renderer: &Renderer, store: &PrimitiveStore, keys: &[PrimitiveKey]) {
    for &key in keys {
        let expected = store.get(key).unwrap().world_vertex_data();
        assert_eq!(
            renderer.slot_data(key).unwrap(),
            expected,
            "slot bytes drifted from the primitive bytes"
        );
    }
}

#[test]
fn compress_closes_interior_gaps() {
    let mut store = PrimitiveStore::new();
    let mut renderer = Renderer::new();

    let sizes = [3usize, 2, 4, 2, 3];
    let keys: Vec<_> = sizes
        .iter()
        .enumerate()
        .map(|(i, &n)| store.insert(mesh(0.0, Material::flat(), n, i as f32)))
        .collect();
    for &key in &keys {
        renderer.add_primitive(&mut store, key).unwrap();
    }
    renderer.prepare(&mut store, None);

    renderer.remove_primitive(&mut store, keys[1]).unwrap();
    renderer.remove_primitive(&mut store, keys[3]).unwrap();
    renderer.compress_batches();
    renderer.prepare(&mut store, None);

    let info = renderer.batch_info(0).unwrap();
    let total: usize = sizes.iter().sum::<usize>() * Vertex2D::FLOATS;
    assert_eq!(info.capacity, total, "compaction must not shrink the batch");
    assert_eq!(info.used_capacity, (3 + 4 + 3) * Vertex2D::FLOATS);
    // three occupants packed back to back, one trailing empty slot
    assert_eq!(info.slot_count, 4);
    let survivors = [keys[0], keys[2], keys[4]];
    let mut expected_offset = 0;
    for &key in &survivors {
        let slot = renderer.slot_of(key).unwrap();
        assert_eq!(slot.offset, expected_offset);
        expected_offset += slot.len;
    }
    assert_slots_match(&renderer, &store, &survivors);
    renderer.check_invariants();

    // compaction settles: the next frame has nothing left to copy
    renderer.prepare(&mut store, None);
    assert_eq!(renderer.stats().units_copied, 0);
}

#[test]
fn compress_without_gaps_changes_nothing() {
    let mut store = PrimitiveStore::new();
    let mut renderer = Renderer::new();

    let keys: Vec<_> = (0..3)
        .map(|i| store.insert(mesh(0.0, Material::flat(), 3, i as f32)))
        .collect();
    for &key in &keys {
        renderer.add_primitive(&mut store, key).unwrap();
    }
    renderer.prepare(&mut store, None);
    let before: Vec<_> = keys.iter().map(|&k| renderer.slot_of(k)).collect();

    renderer.compress_batches();
    renderer.prepare(&mut store, None);

    let after: Vec<_> = keys.iter().map(|&k| renderer.slot_of(k)).collect();
    assert_eq!(before, after);
    assert_eq!(renderer.stats().units_copied, 0);
    assert_slots_match(&renderer, &store, &keys);
}

#[test]
fn arena_relocation_preserves_every_slot() {
    let mut store = PrimitiveStore::new();
    let mut renderer = Renderer::new();
    let mut keys = Vec::new();

    // 48 units apiece; the arena starts at 256 units and must reallocate
    // several times along the way
    for i in 0..12 {
        let key = store.insert(mesh(i as f32, Material::flat(), 6, i as f32));
        renderer.add_primitive(&mut store, key).unwrap();
        keys.push(key);
        renderer.prepare(&mut store, None);
        assert_slots_match(&renderer, &store, &keys);
    }
    assert_eq!(renderer.arena_len(), 12 * 6 * Vertex2D::FLOATS);
    renderer.check_invariants();
}

#[test]
fn randomized_churn_keeps_the_invariants() {
    let mut store = PrimitiveStore::new();
    let mut renderer = Renderer::new();
    let mut rng = SmallRng::seed_from_u64(0x5eed);
    let mut live: Vec<PrimitiveKey> = Vec::new();
    let mut seed = 0.0f32;

    for _ in 0..300 {
        let roll: u32 = rng.gen_range(0..10);
        if roll < 6 || live.is_empty() {
            seed += 1.0;
            let z = rng.gen_range(0..3) as f32;
            let n = rng.gen_range(1..=6);
            let material = if rng.gen_bool(0.5) {
                Material::flat()
            } else {
                Material::textured(1)
            };
            let key = store.insert(mesh(z, material, n, seed));
            renderer.add_primitive(&mut store, key).unwrap();
            live.push(key);
        } else if roll < 9 {
            let index = rng.gen_range(0..live.len());
            let key = live.swap_remove(index);
            renderer.remove_primitive(&mut store, key).unwrap();
            store.remove(key);
        } else {
            renderer.compress_batches();
        }

        renderer.prepare(&mut store, None);
        renderer.check_invariants();
        assert_slots_match(&renderer, &store, &live);
    }
}
