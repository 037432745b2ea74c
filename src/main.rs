use anyhow::{bail, Context, Result};
use flowbox::{build_simulation, FieldDescription, Simulation, TypeTag, DEFAULT_SEED};
use std::path::PathBuf;
use std::time::Instant;

struct Options {
    file: PathBuf,
    p_type: TypeTag,
    v_type: TypeTag,
    vf_type: TypeTag,
    steps: usize,
    checkpoint: usize,
    seed: u64,
    save: Option<PathBuf>,
    load: Option<PathBuf>,
}

impl Options {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let mut opts = Self {
            file: PathBuf::from("data/default.txt"),
            p_type: TypeTag::Fixed(32, 16),
            v_type: TypeTag::Fixed(32, 16),
            vf_type: TypeTag::Fixed(32, 16),
            steps: 10_000,
            checkpoint: 1,
            seed: DEFAULT_SEED,
            save: None,
            load: None,
        };
        while let Some(flag) = args.next() {
            let value = args
                .next()
                .with_context(|| format!("missing value for {flag}"))?;
            match flag.as_str() {
                "--file" => opts.file = PathBuf::from(value),
                "--p-type" => opts.p_type = value.parse()?,
                "--v-type" => opts.v_type = value.parse()?,
                "--v-flow-type" => opts.vf_type = value.parse()?,
                "--steps" => opts.steps = value.parse().context("--steps expects an integer")?,
                "--checkpoint" => {
                    opts.checkpoint = value.parse().context("--checkpoint expects an integer")?
                }
                "--seed" => opts.seed = value.parse().context("--seed expects an integer")?,
                "--save" => opts.save = Some(PathBuf::from(value)),
                "--load" => opts.load = Some(PathBuf::from(value)),
                other => bail!("unknown flag {other}"),
            }
        }
        Ok(opts)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let opts = Options::parse(std::env::args().skip(1))?;
    let text = std::fs::read_to_string(&opts.file)
        .with_context(|| format!("reading field file {}", opts.file.display()))?;
    let desc = FieldDescription::parse(&text)?;

    let mut sim = build_simulation(&desc, opts.p_type, opts.v_type, opts.vf_type, opts.seed)?;
    if let Some(load) = &opts.load {
        sim.load_state(load)
            .with_context(|| format!("restoring checkpoint {}", load.display()))?;
    }

    let start = Instant::now();
    sim.run(opts.steps, opts.checkpoint, opts.save.as_deref())?;
    if let Some(save) = &opts.save {
        sim.save_state(save)
            .with_context(|| format!("writing checkpoint {}", save.display()))?;
    }
    log::info!("simulation took {} ms", start.elapsed().as_millis());
    Ok(())
}
