use std::{fs, path};
use std::io::Write as _;

use lt::geom::light;
use lt::scene;

fn main() -> anyhow::Result<()> {
    simple_logger::SimpleLogger::new().init()?;

    let parsed = clap::Command::new(env!("CARGO_BIN_NAME"))
        .arg(
            clap::Arg::new("out")
                .long("out")
                .number_of_values(1)
                .required(true))
        .arg(
            clap::Arg::new("light")
                .long("light")
                .number_of_values(4)
                .allow_hyphen_values(true)
                .value_parser(clap::value_parser!(f64)))
        .arg(
            clap::Arg::new("segment")
                .long("segment")
                .number_of_values(4)
                .allow_hyphen_values(true)
                .value_parser(clap::value_parser!(f32))
                .action(clap::ArgAction::Append))
        .arg(
            clap::Arg::new("polygon")
                .long("polygon")
                .min_values(6)
                .allow_hyphen_values(true)
                .value_parser(clap::value_parser!(f32)))
        .get_matches();

    let light = {
        let values = parsed
            .get_many::<f64>("light")
            .unwrap_or_default()
            .copied()
            .collect::<Vec<_>>();

        match values[..] {
            [] => light::Light::default(),
            [x, y, initial_angle, range] => //
                light::Light::new([x as f32, y as f32], initial_angle, range),
            _ => anyhow::bail!("Flag --light expects 4 float values"),
        }
    };

    let mut scene = scene::Scene::new(light);

    let segments = parsed
        .get_many::<f32>("segment")
        .unwrap_or_default()
        .copied()
        .collect::<Vec<_>>();

    for values in segments.chunks(4) {
        let [x0, y0, x1, y1] = values[..] else {
            anyhow::bail!("Flag --segment expects 4 float values");
        };

        scene.add_segment([x0, y0], [x1, y1]);
    }

    let polygon = parsed
        .get_many::<f32>("polygon")
        .unwrap_or_default()
        .copied()
        .collect::<Vec<_>>();

    if polygon.len() % 2 != 0 {
        anyhow::bail!("Flag --polygon expects pairs of float values");
    }

    // Closed loop through every point
    let points = polygon
        .chunks_exact(2)
        .map(|pair| [pair[0], pair[1]])
        .collect::<Vec<_>>();

    scene.add_polyline(&points, true);

    if scene.primitives.is_empty() {
        log::warn!("Scene has no primitives, every ray will miss");
    }

    let out = parsed
        .get_one::<String>("out")
        .map(path::PathBuf::from)
        .ok_or_else(|| anyhow::anyhow!("Flag --out is required"))?;

    fs::File::create(out)?
        .write_all(serde_json::to_string_pretty(&scene)?.as_bytes())?;

    Ok(())
}
