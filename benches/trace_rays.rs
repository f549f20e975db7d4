use std::time::Duration;

use criterion::{Criterion, criterion_group, criterion_main};
use lightbake::{
    AggregateMesh, CoherentRayCache, LightRay, SceneConfig, TraceFlags, TraceSettings,
    geometry::{FloatType, TexturePoint, WorldPoint},
    material::MaterialElement,
    mesh::{BspSurfaceData, BspTriangle, Mesh, MeshFlags, MeshGeometry, ObjectGuid, StaticLightingVertex},
};

/// Builds a field of small tilted quads, enough to give the kDOP a few levels.
fn build_scene(side: usize) -> AggregateMesh {
    let mut aggregate = AggregateMesh::new(SceneConfig::default());
    aggregate.reserve_memory(side * side, side * side * 4, side * side * 2);

    for row in 0..side {
        for column in 0..side {
            let base = WorldPoint::new(column as FloatType * 2.0, row as FloatType * 2.0, 0.0);
            let tilt = ((row * 31 + column * 17) % 7) as FloatType * 0.1;
            let corner = |dx: FloatType, dy: FloatType| {
                let mut v = StaticLightingVertex {
                    world_position: WorldPoint::new(
                        base.x + dx,
                        base.y + dy,
                        tilt * (dx + dy),
                    ),
                    ..Default::default()
                };
                v.texture_coordinates[0] = TexturePoint::new(dx, dy);
                v.texture_coordinates[1] = TexturePoint::new(dx, dy);
                v
            };
            let geometry = BspSurfaceData::new(
                vec![
                    corner(0.0, 0.0),
                    corner(1.5, 0.0),
                    corner(1.5, 1.5),
                    corner(0.0, 1.5),
                ],
                vec![
                    BspTriangle {
                        indices: [0, 1, 2],
                        element_index: 0,
                    },
                    BspTriangle {
                        indices: [0, 2, 3],
                        element_index: 0,
                    },
                ],
            )
            .unwrap();
            let mesh = Mesh::new(
                ObjectGuid([row as u32, column as u32, 0, 0]),
                (row * side + column) as i32,
                0,
                MeshFlags::default(),
                0,
                vec![MaterialElement::opaque()],
                MeshGeometry::Bsp(geometry),
            )
            .unwrap();
            aggregate.add_mesh(mesh, None);
        }
    }

    aggregate.prepare_for_raytracing();
    aggregate
}

fn rays(count: usize, side: usize, coherent: bool) -> Vec<LightRay> {
    (0..count)
        .map(|i| {
            let spread = if coherent { 0.01 } else { 1.9 };
            let x = (i % 64) as FloatType * spread + side as FloatType * 0.5;
            let y = (i / 64) as FloatType * spread + side as FloatType * 0.5;
            LightRay::new(
                WorldPoint::new(x, y, 10.0),
                WorldPoint::new(x, y, -10.0),
                TraceFlags::empty(),
            )
        })
        .collect()
}

fn criterion_benchmark(c: &mut Criterion) {
    let _ = env_logger::try_init();

    const SIDE: usize = 32;
    let aggregate = build_scene(SIDE);

    let boolean = TraceSettings::default();
    let closest = TraceSettings {
        find_closest_intersection: true,
        ..Default::default()
    };

    c.bench_function("boolean_coherent", |b| {
        let batch = rays(4096, SIDE, true);
        b.iter(|| {
            let mut cache = CoherentRayCache::default();
            let mut hits = 0usize;
            for ray in &batch {
                hits += aggregate
                    .intersect_light_ray(ray, boolean, Some(&mut cache))
                    .intersects() as usize;
            }
            hits
        })
    });

    c.bench_function("boolean_incoherent", |b| {
        let batch = rays(4096, SIDE, false);
        b.iter(|| {
            let mut hits = 0usize;
            for ray in &batch {
                hits += aggregate
                    .intersect_light_ray(ray, boolean, None)
                    .intersects() as usize;
            }
            hits
        })
    });

    c.bench_function("closest_hit", |b| {
        let batch = rays(4096, SIDE, false);
        b.iter(|| {
            let mut hits = 0usize;
            for ray in &batch {
                hits += aggregate
                    .intersect_light_ray(ray, closest, None)
                    .intersects() as usize;
            }
            hits
        })
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(30).measurement_time(Duration::from_secs(20));
    targets = criterion_benchmark
}
criterion_main!(benches);
