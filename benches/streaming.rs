use criterion::{criterion_group, criterion_main, Criterion, black_box};
use std::sync::Arc;

use slabstream::core::StreamingConfig;
use slabstream::io::{FileSystem, ImmediateQueue, MemoryFileSystem};
use slabstream::pack::{AssetId, AssetInfo, ImageInfo, PackReader, PackWriter, PixelFormat, TextInfo};
use slabstream::resource::{ImmediateUpload, ResourceManager, ResourceState};
use slabstream::streaming::AssetManager;

const ASSETS: u32 = 64;

fn text_pack(size: usize) -> Vec<u8> {
    let mut writer = PackWriter::new();
    let payload = vec![0xAB; size];
    for id in 0..ASSETS {
        writer.add_asset(id, &AssetInfo::Text(TextInfo { length: size as u32, encoding: 0 }), &payload);
    }
    writer.finish()
}

fn manager(capacity: usize, pack: Vec<u8>) -> AssetManager {
    let fs = Arc::new(MemoryFileSystem::new());
    fs.insert("bench.pak", pack);
    let assets = AssetManager::with_capacity(capacity, fs, Arc::new(ImmediateQueue));
    assets.load("bench.pak").unwrap().unwrap();
    assets
}

fn bench_cache_hit(c: &mut Criterion) {
    let assets = manager(1 << 20, text_pack(1024));
    let asset = assets.find(AssetId(0)).unwrap();
    assets.request(&asset);

    c.bench_function("cache_request_hit", |b| {
        b.iter(|| black_box(assets.request(black_box(&asset))));
    });
}

fn bench_cache_eviction_churn(c: &mut Criterion) {
    // Room for a quarter of the pack, so cycling through it always evicts
    let assets = manager(16 * 4096, text_pack(4096));
    let descriptors: Vec<_> = (0..ASSETS).filter_map(|id| assets.find(AssetId(id))).collect();

    c.bench_function("cache_request_evicting", |b| {
        let mut next = 0;
        b.iter(|| {
            let asset = &descriptors[next % descriptors.len()];
            next += 1;
            black_box(assets.request(asset))
        });
    });
}

fn bench_pack_parse(c: &mut Criterion) {
    let fs = MemoryFileSystem::new();
    fs.insert("bench.pak", text_pack(256));
    let file = fs.open("bench.pak").unwrap();

    c.bench_function("pack_parse_64_assets", |b| {
        b.iter(|| PackReader::parse(black_box(file.as_ref())).unwrap());
    });
}

fn bench_resource_request_ready(c: &mut Criterion) {
    let mut writer = PackWriter::new();
    let info = AssetInfo::Image(ImageInfo { width: 16, height: 16, mip_levels: 1, format: PixelFormat::Rgba8 });
    writer.add_asset(0, &info, &[0u8; 1024]);
    let assets = Arc::new(manager(1 << 20, writer.finish()));

    let config = StreamingConfig::default();
    let resources = ResourceManager::new(&config, assets.clone(), Arc::new(ImmediateUpload::new()));
    let texture = resources.create_texture(&assets.find(AssetId(0)).unwrap()).unwrap();
    while resources.request(texture) != ResourceState::Ready {}

    c.bench_function("resource_request_ready", |b| {
        b.iter(|| black_box(resources.request(black_box(texture))));
    });
}

criterion_group!(
    benches,
    bench_cache_hit,
    bench_cache_eviction_churn,
    bench_pack_parse,
    bench_resource_request_ready,
);
criterion_main!(benches);
