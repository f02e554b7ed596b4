use std::{fs, io};

#[derive(clap::Parser)]
#[derive(Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    // The path to the desired scene (JSON)
    #[clap(long, value_parser, default_value_t = String::from("scenes/default.json"))]
    path: String,

    // A full config (JSON), flags below override it
    #[clap(long, value_parser)]
    config: Option<String>,

    #[clap(long = "batch-size", value_parser)]
    batch_size: Option<usize>,

    #[clap(long = "batch-count", value_parser)]
    batch_count: Option<usize>,

    #[clap(long, value_parser)]
    bounces: Option<usize>,

    #[clap(long, value_parser = ["cpu", "gpu"])]
    backend: Option<String>,

    #[clap(long = "workgroup-size", value_parser)]
    workgroup_size: Option<u32>,

    #[clap(long, value_parser)]
    seed: Option<u64>,

    #[clap(long = "t-min", value_parser, allow_hyphen_values = true)]
    compute_t_min: Option<f32>,

    #[clap(long = "t-max", value_parser)]
    compute_t_max: Option<f32>,

    #[clap(long = "eps", value_parser)]
    compute_eps: Option<f32>,

    #[clap(long = "roughness", value_parser)]
    compute_roughness: Option<f32>,

    #[clap(long, short, action)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    use clap::Parser as _;

    let args = Args::parse();

    let Args {
        path,
        config,
        batch_size,
        batch_count,
        bounces,
        backend,
        workgroup_size,
        seed,
        compute_t_min,
        compute_t_max,
        compute_eps,
        compute_roughness,
        verbose,
    } = args;

    simple_logger::SimpleLogger::new()
        .with_level(if verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info })
        .init()?;

    let config_default: lt::Config = match config {
        Some(config) => {
            let config_reader = io::BufReader::new(fs::File::open(config)?);

            serde_json::from_reader(config_reader)?
        },
        None => lt::Config::default(),
    };

    // Re-validated as a whole, any of the three may have changed
    let tracer_default = config_default.tracer;
    let tracer = lt::TracerConfig::new(
        batch_size.unwrap_or(tracer_default.batch_size()),
        batch_count.unwrap_or(tracer_default.batch_count()),
        bounces.unwrap_or(tracer_default.light_path_length()),
    )?;

    let compute_default = config_default.compute;
    let compute = lt::ComputeConfig {
        t_min: compute_t_min.unwrap_or(compute_default.t_min),
        t_max: compute_t_max.unwrap_or(compute_default.t_max),
        eps: compute_eps.unwrap_or(compute_default.eps),
        roughness: compute_roughness.unwrap_or(compute_default.roughness),
    };

    let backend = match backend.as_deref() {
        Some("cpu") => lt::Backend::Cpu,
        Some("gpu") => lt::Backend::Gpu,
        _ => config_default.backend,
    };

    let config = lt::Config {
        tracer,
        compute,
        backend,
        workgroup: workgroup_size.unwrap_or(config_default.workgroup),
        seed: seed.or(config_default.seed),
    };

    let scene_reader = io::BufReader::new({
        fs::File::open(path)?
    });

    let scene: lt::scene::Scene = //
        serde_json::from_reader(scene_reader)?;

    let data = lt::trace(&config, &scene)?;
    let layout = data.layout();

    for bounce in 0..layout.light_path_length() {
        let segment = layout.bounce_segment(bounce);

        let hits = data.intersections[segment.clone()]
            .iter()
            .filter(|intrs| !intrs.is_miss(data.primitive_count))
            .count();

        let live = data.rays[segment.clone()]
            .iter()
            .filter(|ray| !ray.is_degenerate())
            .count();

        println!(
            "bounce {}: {} live rays, {} hits, {} misses",
            bounce, live, hits, segment.len() - hits,
        );
    }

    Ok(())
}
