use std::{fs, io};

fn main() -> anyhow::Result<()> {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init()?;

    let mut config = lt::Config::default();

    let scene_reader = io::BufReader::new({
        fs::File::open("scenes/default.json")?
    });

    let scene: lt::scene::Scene = //
        serde_json::from_reader(scene_reader)?;

    let data = match lt::trace(&config, &scene) {
        Err(lt::Error::DeviceUnavailable) => {
            log::warn!("No GPU adapter found, falling back to the CPU");

            config.backend = lt::Backend::Cpu;
            lt::trace(&config, &scene)?
        },
        result => result?,
    };

    log::info!(
        "{} of {} ray segments ended on a surface, {} vertices ready to draw",
        data.hit_count(),
        data.rays.len(),
        data.line_vertices().len(),
    );

    Ok(())
}
