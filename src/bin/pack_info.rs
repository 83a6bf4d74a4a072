//! Inspect pack files: list descriptors and optionally verify payloads.
//!
//! Usage: cargo run --release --bin pack_info -- [--root <dir>] [--config <file>] [--verify] [--warm] <pack>...

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use slabstream::core::{logging, StreamingConfig};
use slabstream::io::{DiskFileSystem, ThreadPoolQueue};
use slabstream::pack::{AssetDescriptor, AssetId, AssetInfo, Compression};
use slabstream::streaming::{read_payload, AssetManager};

struct Args {
    root: PathBuf,
    config: Option<PathBuf>,
    verify: bool,
    warm: bool,
    packs: Vec<String>,
}

fn parse_args() -> Option<Args> {
    let mut args = Args {
        root: PathBuf::from("."),
        config: None,
        verify: false,
        warm: false,
        packs: Vec::new(),
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--root" => args.root = PathBuf::from(iter.next()?),
            "--config" => args.config = Some(PathBuf::from(iter.next()?)),
            "--verify" => args.verify = true,
            "--warm" => args.warm = true,
            _ if arg.starts_with("--") => return None,
            _ => args.packs.push(arg),
        }
    }
    (!args.packs.is_empty()).then_some(args)
}

fn describe(info: &AssetInfo) -> String {
    match info {
        AssetInfo::Text(t) => format!("text {} bytes", t.length),
        AssetInfo::Image(i) => format!("image {}x{} {:?} mips={}", i.width, i.height, i.format, i.mip_levels),
        AssetInfo::Font(f) => format!("font {} glyphs, atlas {}x{}", f.glyph_count, f.atlas_width, f.atlas_height),
        AssetInfo::Mesh(m) => format!("mesh {} verts, {} indices", m.vertex_count, m.index_count),
        AssetInfo::Material(m) => format!("material {} textures, {} params", m.texture_count, m.param_count),
        AssetInfo::Model(m) => format!("model {} meshes, {} materials", m.mesh_count, m.material_count),
        AssetInfo::Catalog(c) => format!("catalog {} entries", c.entry_count),
    }
}

fn print_asset(asset: &AssetDescriptor) {
    let data = asset.data();
    let stored = match data.compression {
        Compression::None => String::new(),
        Compression::Lz4 => format!(" (lz4 {} bytes)", data.stored_size),
    };
    println!("  {:>8}  {:>10}{}  {}", asset.id().to_string(), data.size, stored, describe(asset.info()));
}

/// Pull every asset through the cache and wait until it is resident or has
/// failed.
fn warm(assets: &AssetManager, descriptors: &[Arc<AssetDescriptor>]) {
    let start = Instant::now();
    let mut pending: Vec<_> = descriptors.to_vec();
    while !pending.is_empty() && start.elapsed() < Duration::from_secs(30) {
        pending.retain(|asset| assets.request(asset).is_none());
        std::thread::sleep(Duration::from_millis(1));
    }
    let stats = assets.stats();
    println!(
        "Warmed {} assets in {:.1?}: {} misses, {} evictions, {} failed, {} still pending",
        descriptors.len(),
        start.elapsed(),
        stats.misses,
        stats.evictions,
        stats.loads_failed,
        pending.len()
    );
}

fn main() -> ExitCode {
    logging::init();

    let Some(args) = parse_args() else {
        eprintln!("Usage: pack_info [--root <dir>] [--config <file>] [--verify] [--warm] <pack>...");
        return ExitCode::FAILURE;
    };

    let config = match &args.config {
        Some(path) => match StreamingConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load config {}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => StreamingConfig::default(),
    };

    let queue = match ThreadPoolQueue::new(config.worker_threads) {
        Ok(queue) => Arc::new(queue),
        Err(e) => {
            eprintln!("Failed to start worker pool: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let fs = Arc::new(DiskFileSystem::new(args.root.clone()));
    let assets = AssetManager::new(&config, fs, queue);

    let mut failed = false;
    let mut all = Vec::new();
    for name in &args.packs {
        let pack = match assets.load(name) {
            Ok(Some(pack)) => pack,
            Ok(None) => {
                eprintln!("{}: not found", name);
                failed = true;
                continue;
            }
            Err(e) => {
                eprintln!("{}: {}", name, e);
                failed = true;
                continue;
            }
        };

        println!("=== {} ({} assets, ids {:?}) ===", pack.name(), pack.asset_count(), pack.ids());
        let descriptors: Vec<_> = pack.ids().filter_map(|id| assets.find(AssetId(id))).collect();
        for asset in &descriptors {
            print_asset(asset);
            if !args.verify {
                continue;
            }
            if let Err(e) = read_payload(asset) {
                eprintln!("  {}: {}", asset.id(), e);
                failed = true;
            }
        }
        all.extend(descriptors);
    }

    if args.warm {
        warm(&assets, &all);
    }

    if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}
