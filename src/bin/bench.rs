use anyhow::{bail, Result};
use burn::tensor::backend::Backend;
use burn::tensor::{Distribution, Tensor};
use compom::config::{load_config, PomConfig};
use compom::model::compom::ComPom;
use compom::perf;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
struct BenchArgs {
    iters: usize,
    batch: usize,
    seq: usize,
    chunks: usize,
}

fn parse_args() -> (Option<String>, BenchArgs) {
    let mut config_path = None;
    let mut args = BenchArgs {
        iters: 5,
        batch: 4,
        seq: 256,
        chunks: 8,
    };

    let mut argv = std::env::args().skip(1);
    while let Some(arg) = argv.next() {
        let target = match arg.as_str() {
            "--config" => {
                config_path = argv.next();
                continue;
            }
            "--iters" => &mut args.iters,
            "--batch" => &mut args.batch,
            "--seq" => &mut args.seq,
            "--chunks" => &mut args.chunks,
            _ => continue,
        };
        if let Some(value) = argv.next() {
            *target = value.parse().unwrap_or(*target);
        }
    }

    args.iters = args.iters.max(1);
    args.chunks = args.chunks.clamp(1, args.seq.max(1));
    (config_path, args)
}

impl BenchArgs {
    fn validate(&self) -> Result<()> {
        if self.seq == 0 || self.batch == 0 {
            bail!("--seq and --batch must be positive (got seq={}, batch={})", self.seq, self.batch);
        }
        Ok(())
    }
}

/// `(start, len)` of each streaming chunk; the last chunk takes the remainder.
fn chunk_spans(seq: usize, chunks: usize) -> Vec<(usize, usize)> {
    if seq == 0 || chunks == 0 {
        return Vec::new();
    }
    let chunk_len = seq / chunks;
    (0..chunks)
        .map(|chunk| {
            let start = chunk * chunk_len;
            let len = if chunk + 1 == chunks { seq - start } else { chunk_len };
            (start, len)
        })
        .filter(|&(_, len)| len > 0)
        .collect()
}

fn average_ms(durations: &[Duration]) -> f64 {
    let total: f64 = durations.iter().map(|d| d.as_secs_f64() * 1000.0).sum();
    total / durations.len() as f64
}

fn run_bench<B: Backend>(name: &str, device: &B::Device, config: &PomConfig, args: BenchArgs) -> Result<()> {
    let layer = ComPom::<B>::from_config(config, device)?;
    let input = Tensor::<B, 3>::random(
        [args.batch, args.seq, config.dim],
        Distribution::Normal(0.0, 1.0),
        device,
    );

    let mut one_shot = Vec::with_capacity(args.iters);
    for _ in 0..args.iters {
        let start = Instant::now();
        let out = layer.forward(input.clone(), None, None)?;
        let _ = out.into_data();
        one_shot.push(start.elapsed());
    }

    let spans = chunk_spans(args.seq, args.chunks);
    let mut streaming = Vec::with_capacity(args.iters);
    for _ in 0..args.iters {
        let start = Instant::now();
        let mut state = None;
        for &(start, len) in &spans {
            let piece = input.clone().narrow(1, start, len);
            let (out, next) = layer.state_forward(piece, None, state.as_ref())?;
            let _ = out.into_data();
            state = Some(next);
        }
        streaming.push(start.elapsed());
    }

    println!(
        "{name}: forward avg {:.2} ms, state_forward avg {:.2} ms over {} iters (batch={}, seq={}, chunks={})",
        average_ms(&one_shot),
        average_ms(&streaming),
        args.iters,
        args.batch,
        args.seq,
        args.chunks
    );
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_writer(std::io::stderr)
        .init();

    let (config_path, args) = parse_args();
    args.validate()?;
    let config = match config_path {
        Some(path) => load_config(path)?,
        None => PomConfig::new(256, 3, 2),
    };

    #[cfg(feature = "backend-ndarray")]
    {
        use burn_ndarray::{NdArray, NdArrayDevice};
        let device = NdArrayDevice::default();
        run_bench::<NdArray<f32>>("ndarray", &device, &config, args)?;
    }

    #[cfg(feature = "backend-wgpu")]
    {
        use burn_wgpu::{Wgpu, WgpuDevice};
        let device = WgpuDevice::default();
        run_bench::<Wgpu>("wgpu", &device, &config, args)?;
    }

    eprintln!("{}", perf::report());
    Ok(())
}
