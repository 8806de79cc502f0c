use criterion::{criterion_group, criterion_main, Criterion, black_box};

use chisel::mesh::isosurface::{CpuIsosurfaceKernel, IsoParams, IsosurfaceConfig, IsosurfaceKernel};
use chisel::mesh::GreedyMeshBuilder;
use chisel::voxel::brush::{CarveRequest, CarvingEngine, ToolShape};
use chisel::voxel::VoxelChunk;
use chisel::streaming::disk_io::{self, SaveFormat};

use glam::{UVec3, Vec3};

fn carved_stone(size: u32) -> VoxelChunk {
    let mut chunk = VoxelChunk::filled(UVec3::splat(size)).unwrap();
    let mut engine = CarvingEngine::new();
    let r = size as f32 * 0.2;
    for i in 0..6 {
        let t = i as f32 / 5.0;
        let center = Vec3::new(t * size as f32, size as f32 * 0.7, size as f32 * 0.5);
        engine.carve(&mut chunk, &CarveRequest::new(ToolShape::sphere(center, r)));
    }
    chunk
}

fn bench_carve_sphere_100(c: &mut Criterion) {
    let base = VoxelChunk::filled(UVec3::splat(100)).unwrap();
    let request = CarveRequest::new(ToolShape::sphere(Vec3::splat(50.0), 10.0));

    c.bench_function("carve_sphere_r10_100", |b| {
        b.iter_batched(
            || base.clone(),
            |mut chunk| {
                let mut engine = CarvingEngine::new();
                engine.carve(&mut chunk, black_box(&request))
            },
            criterion::BatchSize::LargeInput,
        );
    });
}

fn bench_carve_strided(c: &mut Criterion) {
    let base = VoxelChunk::filled(UVec3::splat(100)).unwrap();
    let request = CarveRequest::new(ToolShape::sphere(Vec3::splat(50.0), 20.0)).with_stride(6);

    c.bench_function("carve_sphere_r20_stride6_100", |b| {
        b.iter_batched(
            || base.clone(),
            |mut chunk| {
                let mut engine = CarvingEngine::new();
                engine.carve(&mut chunk, black_box(&request))
            },
            criterion::BatchSize::LargeInput,
        );
    });
}

fn bench_greedy_rebuild_64(c: &mut Criterion) {
    let mut chunk = carved_stone(64);
    let builder = GreedyMeshBuilder::new();

    c.bench_function("greedy_rebuild_64", |b| {
        b.iter(|| builder.rebuild(black_box(&mut chunk)));
    });
}

fn bench_cpu_isosurface_64(c: &mut Criterion) {
    let chunk = carved_stone(64);
    let params = IsoParams::new(chunk.dims(), &IsosurfaceConfig::default());
    let mut kernel = CpuIsosurfaceKernel::new();

    c.bench_function("cpu_isosurface_64", |b| {
        b.iter(|| {
            kernel.submit(black_box(&chunk), &params).unwrap();
            kernel.synchronize().unwrap()
        });
    });
}

fn bench_codec_lz4_100(c: &mut Criterion) {
    let chunk = carved_stone(100);
    let bytes = disk_io::save_as(&chunk, SaveFormat::Lz4);

    c.bench_function("encode_lz4_100", |b| {
        b.iter(|| disk_io::save_as(black_box(&chunk), SaveFormat::Lz4));
    });
    c.bench_function("decode_lz4_100", |b| {
        b.iter(|| disk_io::load(black_box(&bytes)).unwrap());
    });
}

criterion_group!(
    benches,
    bench_carve_sphere_100,
    bench_carve_strided,
    bench_greedy_rebuild_64,
    bench_cpu_isosurface_64,
    bench_codec_lz4_100,
);
criterion_main!(benches);
